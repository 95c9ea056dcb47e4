//! Scripted in-memory transport for engine tests.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use probewire_core::frame::{self, ACK};
use probewire_core::{HexInterpreter, WatchRegistry};

use crate::error::TransportError;
use crate::options::EngineOptions;
use crate::session::Session;
use crate::transport::{InboundSender, Transport};

/// Computes replies for one sent frame.
pub(crate) type Responder = Box<dyn Fn(&str) -> Vec<String> + Send + Sync>;

#[derive(Default)]
struct FakeState {
    inbound: Option<InboundSender>,
    sent: Vec<String>,
    script: VecDeque<String>,
    responder: Option<Responder>,
    refuse: bool,
    connected: bool,
    receives: usize,
    reset_modes: Vec<bool>,
}

/// Records every frame and answers from a script or a responder.
///
/// Acknowledgments are recorded but never answered.
#[derive(Default)]
pub(crate) struct FakeTransport {
    state: Mutex<FakeState>,
}

impl FakeTransport {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Answer the n-th non-ack frame with the n-th reply.
    pub(crate) fn scripted<I, S>(replies: I) -> Arc<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let fake = Self::default();
        fake.state().script = replies.into_iter().map(Into::into).collect();
        Arc::new(fake)
    }

    pub(crate) fn responding(responder: impl Fn(&str) -> Vec<String> + Send + Sync + 'static) -> Arc<Self> {
        let fake = Self::default();
        fake.state().responder = Some(Box::new(responder));
        Arc::new(fake)
    }

    pub(crate) fn refusing() -> Arc<Self> {
        let fake = Self::default();
        fake.state().refuse = true;
        Arc::new(fake)
    }

    fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap()
    }

    pub(crate) fn sent(&self) -> Vec<String> {
        self.state().sent.clone()
    }

    /// Sent frames other than acknowledgments.
    pub(crate) fn frames(&self) -> Vec<String> {
        self.state()
            .sent
            .iter()
            .filter(|f| *f != ACK)
            .cloned()
            .collect()
    }

    pub(crate) fn acks(&self) -> usize {
        self.state().sent.iter().filter(|f| *f == ACK).count()
    }

    pub(crate) fn is_connected(&self) -> bool {
        self.state().connected
    }

    pub(crate) fn receive_count(&self) -> usize {
        self.state().receives
    }

    pub(crate) fn reset_modes(&self) -> Vec<bool> {
        self.state().reset_modes.clone()
    }

    /// Deliver bytes the target sent on its own, split like a socket read.
    pub(crate) fn inject(&self, bytes: &str) {
        if let Some(tx) = &self.state().inbound {
            deliver(tx, bytes);
        }
    }

    /// Connect without going through the async trait method.
    pub(crate) fn attach(&self, inbound: InboundSender) {
        let mut state = self.state();
        state.inbound = Some(inbound);
        state.connected = true;
    }
}

fn deliver(tx: &InboundSender, bytes: &str) {
    let mut pending = bytes.to_string();
    for message in frame::drain_messages(&mut pending) {
        tx.send(message).unwrap();
    }
    if !pending.is_empty() {
        tx.send(pending).unwrap();
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn connect(&self, _port: &str, inbound: InboundSender) -> Result<(), TransportError> {
        if self.state().refuse {
            return Err(std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused").into());
        }
        self.attach(inbound);
        Ok(())
    }

    fn disconnect(&self) {
        let mut state = self.state();
        state.inbound = None;
        state.connected = false;
    }

    fn send(&self, frame: &str) -> Result<(), TransportError> {
        let mut state = self.state();
        if !state.connected {
            return Err(TransportError::NotConnected);
        }
        state.sent.push(frame.to_string());
        if frame == ACK {
            return Ok(());
        }
        let replies = match &state.responder {
            Some(respond) => respond(frame),
            None => state.script.pop_front().into_iter().collect(),
        };
        if let Some(tx) = &state.inbound {
            deliver(tx, &replies.concat());
        }
        Ok(())
    }

    fn receive_once(&self) -> Result<(), TransportError> {
        self.state().receives += 1;
        Ok(())
    }

    fn set_reset_mode(&self, enabled: bool) {
        self.state().reset_modes.push(enabled);
    }
}

/// Short loop periods so queued frames never wait out a response window.
pub(crate) fn fast_options() -> EngineOptions {
    EngineOptions {
        dispatcher_tick: Duration::from_millis(5),
        listener_tick: Duration::from_millis(5),
        ..EngineOptions::default()
    }
}

/// A session over `fake` with default options and an empty registry.
pub(crate) fn test_session(fake: Arc<FakeTransport>) -> Session {
    Session::new(
        fake,
        Arc::new(HexInterpreter::new()),
        Arc::new(tokio::sync::Mutex::new(WatchRegistry::new())),
        EngineOptions::default(),
    )
}
