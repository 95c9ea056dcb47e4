//! The session object shared by callers and the two loops.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use probewire_core::{PayloadDecoder, WatchRegistry};
use tokio::sync::{broadcast, mpsc, watch};

use crate::breakpoint::BreakpointTable;
use crate::dispatcher::OutboundQueue;
use crate::error::EngineError;
use crate::events::{DebugEvent, EVENT_CAPACITY};
use crate::options::EngineOptions;
use crate::transport::{InboundReceiver, InboundSender, Transport};

/// Observable state of a debug session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No session.
    Disconnected,
    /// The transport is opening the port.
    Connecting,
    /// Connected, nothing in flight.
    Idle,
    /// An explicit command holds the engine.
    CommandInFlight,
    /// A memory read holds the engine.
    ReadInFlight,
    /// The target is being told to detach.
    Disconnecting,
}

/// Coarse lifecycle; the in-flight substates come from [`SessionFlags`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Lifecycle {
    Disconnected,
    Connecting,
    Active,
    Disconnecting,
}

/// What a request is for; decides which in-progress flag it raises.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Purpose {
    Command,
    Read,
}

/// Flags consulted across tasks.
pub(crate) struct SessionFlags {
    command_in_progress: AtomicBool,
    read_in_progress: watch::Sender<bool>,
    read_enabled: AtomicBool,
}

impl SessionFlags {
    fn new() -> Self {
        Self {
            command_in_progress: AtomicBool::new(false),
            read_in_progress: watch::Sender::new(false),
            read_enabled: AtomicBool::new(false),
        }
    }

    /// Raise the flag for `purpose` until the returned guard drops.
    pub(crate) fn begin(&self, purpose: Purpose) -> InFlight<'_> {
        match purpose {
            Purpose::Command => self.command_in_progress.store(true, Ordering::Release),
            Purpose::Read => {
                self.read_in_progress.send_replace(true);
            }
        }
        InFlight {
            flags: self,
            purpose,
        }
    }

    pub(crate) fn command_in_progress(&self) -> bool {
        self.command_in_progress.load(Ordering::Acquire)
    }

    pub(crate) fn read_in_progress(&self) -> bool {
        *self.read_in_progress.borrow()
    }

    /// Watch the read flag; used by the busy gate.
    pub(crate) fn watch_reads(&self) -> watch::Receiver<bool> {
        self.read_in_progress.subscribe()
    }

    pub(crate) fn read_enabled(&self) -> bool {
        self.read_enabled.load(Ordering::Acquire)
    }

    pub(crate) fn set_read_enabled(&self, enabled: bool) {
        self.read_enabled.store(enabled, Ordering::Release);
    }

    fn reset(&self) {
        self.command_in_progress.store(false, Ordering::Release);
        self.read_in_progress.send_replace(false);
        self.read_enabled.store(false, Ordering::Release);
    }
}

/// Clears an in-progress flag on drop.
pub(crate) struct InFlight<'a> {
    flags: &'a SessionFlags,
    purpose: Purpose,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        match self.purpose {
            Purpose::Command => self
                .flags
                .command_in_progress
                .store(false, Ordering::Release),
            Purpose::Read => {
                self.flags.read_in_progress.send_replace(false);
            }
        }
    }
}

/// Everything one debug session owns.
pub(crate) struct Session {
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) decoder: Arc<dyn PayloadDecoder>,
    pub(crate) registry: Arc<tokio::sync::Mutex<WatchRegistry>>,
    pub(crate) options: EngineOptions,
    /// The exclusive execution slot. Holding it is the only way to read
    /// the inbound channel.
    pub(crate) slot: tokio::sync::Mutex<InboundReceiver>,
    pub(crate) inbound_tx: InboundSender,
    pub(crate) outbound: OutboundQueue,
    pub(crate) events: broadcast::Sender<DebugEvent>,
    pub(crate) flags: SessionFlags,
    lifecycle: Mutex<Lifecycle>,
    breakpoints: Mutex<BreakpointTable>,
}

impl Session {
    pub(crate) fn new(
        transport: Arc<dyn Transport>,
        decoder: Arc<dyn PayloadDecoder>,
        registry: Arc<tokio::sync::Mutex<WatchRegistry>>,
        options: EngineOptions,
    ) -> Self {
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            transport,
            decoder,
            registry,
            options,
            slot: tokio::sync::Mutex::new(inbound_rx),
            inbound_tx,
            outbound: OutboundQueue::new(),
            events,
            flags: SessionFlags::new(),
            lifecycle: Mutex::new(Lifecycle::Disconnected),
            breakpoints: Mutex::new(BreakpointTable::new()),
        }
    }

    pub(crate) fn state(&self) -> SessionState {
        match self.lifecycle() {
            Lifecycle::Disconnected => SessionState::Disconnected,
            Lifecycle::Connecting => SessionState::Connecting,
            Lifecycle::Active if self.flags.command_in_progress() => SessionState::CommandInFlight,
            Lifecycle::Active if self.flags.read_in_progress() => SessionState::ReadInFlight,
            Lifecycle::Active => SessionState::Idle,
            Lifecycle::Disconnecting => SessionState::Disconnecting,
        }
    }

    pub(crate) fn lifecycle(&self) -> Lifecycle {
        *self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn set_lifecycle(&self, next: Lifecycle) {
        *self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner) = next;
    }

    /// Move from `Disconnected` to `Connecting`, refusing if a session
    /// is already running or being opened.
    pub(crate) fn begin_connect(&self) -> Result<(), EngineError> {
        let mut lifecycle = self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner);
        if *lifecycle != Lifecycle::Disconnected {
            return Err(EngineError::AlreadyActive);
        }
        *lifecycle = Lifecycle::Connecting;
        Ok(())
    }

    /// Move from `Active` to `Disconnecting`. Only one caller wins.
    pub(crate) fn begin_disconnect(&self) -> bool {
        let mut lifecycle = self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner);
        if *lifecycle != Lifecycle::Active {
            return false;
        }
        *lifecycle = Lifecycle::Disconnecting;
        true
    }

    /// The loops keep running through the detach.
    pub(crate) fn loops_running(&self) -> bool {
        matches!(self.lifecycle(), Lifecycle::Active | Lifecycle::Disconnecting)
    }

    pub(crate) fn is_active(&self) -> bool {
        self.lifecycle() == Lifecycle::Active
    }

    pub(crate) fn require_active(&self) -> Result<(), EngineError> {
        if self.is_active() {
            Ok(())
        } else {
            Err(EngineError::Inactive)
        }
    }

    pub(crate) fn breakpoints(&self) -> MutexGuard<'_, BreakpointTable> {
        self.breakpoints.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Clear per-session state after the loops have stopped.
    pub(crate) fn teardown(&self) {
        self.breakpoints().clear();
        self.outbound.clear();
        self.flags.reset();
    }
}
