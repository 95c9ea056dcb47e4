//! Outbound dispatcher loop.
//!
//! Forwards at most one queued frame per tick. On idle ticks with
//! polling enabled it runs a memory poll step every few ticks, on this
//! task, which is why poll reads must never go through the queue.
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::time::{interval_at, Instant, MissedTickBehavior};

use crate::session::Session;

/// Frames and acknowledgments waiting for the dispatcher.
#[derive(Debug, Default)]
pub(crate) struct OutboundQueue {
    frames: Mutex<VecDeque<String>>,
}

impl OutboundQueue {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    fn frames(&self) -> MutexGuard<'_, VecDeque<String>> {
        self.frames.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn push(&self, frame: String) {
        self.frames().push_back(frame);
    }

    pub(crate) fn pop(&self) -> Option<String> {
        self.frames().pop_front()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.frames().is_empty()
    }

    pub(crate) fn clear(&self) {
        self.frames().clear();
    }
}

/// Run until the session ends.
pub(crate) async fn run(session: Arc<Session>) {
    let period = session.options.dispatcher_tick;
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut idle_ticks = 0u32;
    tracing::debug!(?period, "dispatcher started");

    while session.loops_running() {
        ticker.tick().await;
        if !session.loops_running() {
            break;
        }
        if let Some(frame) = session.outbound.pop() {
            tracing::debug!(frame = %frame, "forwarding");
            if let Err(e) = session.transport.send(&frame) {
                tracing::warn!(frame = %frame, error = %e, "send failed");
            }
        } else if session.flags.read_enabled() {
            idle_ticks += 1;
            if idle_ticks >= session.options.poll_every_idle_ticks {
                idle_ticks = 0;
                session.poll_step().await;
            }
        }
    }
    tracing::debug!("dispatcher stopped");
}
