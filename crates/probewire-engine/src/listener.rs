//! Inbound listener loop.
use std::sync::Arc;

use tokio::time::{interval_at, Instant, MissedTickBehavior};

use crate::executor::Submission;
use crate::session::Session;

/// Run until the session ends.
///
/// Each tick pumps one receive from the transport. When no request
/// holds the execution slot, whatever arrived is unsolicited: halts are
/// reported and everything else is discarded.
pub(crate) async fn run(session: Arc<Session>) {
    let period = session.options.listener_tick;
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    tracing::debug!(?period, "listener started");

    while session.loops_running() {
        ticker.tick().await;
        if !session.loops_running() {
            break;
        }
        if let Err(e) = session.transport.receive_once() {
            tracing::debug!(error = %e, "receive failed");
        }
        if let Ok(mut inbound) = session.slot.try_lock() {
            session.discard_stale(&mut inbound, Submission::Queued);
        }
    }
    tracing::debug!("listener stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::events::DebugEvent;
    use crate::fake::{test_session, FakeTransport};
    use crate::session::Lifecycle;

    #[tokio::test(start_paused = true)]
    async fn unsolicited_halt_is_reported_and_acknowledged() {
        let fake = FakeTransport::new();
        let session = Arc::new(test_session(fake.clone()));
        fake.attach(session.inbound_tx.clone());
        session.set_lifecycle(Lifecycle::Active);
        let mut events = session.events.subscribe();

        let handle = tokio::spawn(run(Arc::clone(&session)));
        fake.inject("+$T02thread:1;#E3");

        let event = tokio::time::timeout(Duration::from_secs(1), events.recv())
            .await
            .expect("halt event")
            .unwrap();
        assert_eq!(event, DebugEvent::Halted(vec![1]));
        assert_eq!(session.outbound.pop().as_deref(), Some("+"));
        assert!(fake.receive_count() >= 1);

        session.set_lifecycle(Lifecycle::Disconnected);
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn leaves_inbound_alone_while_slot_is_held() {
        let fake = FakeTransport::new();
        let session = Arc::new(test_session(fake.clone()));
        fake.attach(session.inbound_tx.clone());
        session.set_lifecycle(Lifecycle::Active);

        let mut inbound = session.slot.lock().await;
        let handle = tokio::spawn(run(Arc::clone(&session)));
        fake.inject("+$OK#9A");
        tokio::time::sleep(session.options.listener_tick * 3).await;

        assert_eq!(inbound.try_recv().ok().as_deref(), Some("+$OK#9A"));
        drop(inbound);

        session.set_lifecycle(Lifecycle::Disconnected);
        handle.await.unwrap();
    }
}
