//! Public debugger operations.
use std::sync::{Arc, Mutex, PoisonError};

use probewire_core::command::STATUS_WORD_LEN;
use probewire_core::{Command, DataType, DecodeError, PayloadDecoder, ThreadSel, WatchEntry, WatchRegistry};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::breakpoint::Breakpoint;
use crate::error::EngineError;
use crate::events::DebugEvent;
use crate::executor::{Expect, Request, Submission};
use crate::options::EngineOptions;
use crate::session::{Lifecycle, Session, SessionState};
use crate::transport::Transport;
use crate::{dispatcher, listener};

/// The program image the target is expected to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetImage {
    /// Display name of the project.
    pub name: String,
    /// Expected code CRC as hex, compared case-insensitively.
    pub code_crc: String,
}

/// Drives one target over a [`Transport`].
///
/// Operations may be called from any number of tasks; they are
/// serialized internally so only one waits for a response at a time.
pub struct DebuggerService {
    session: Arc<Session>,
    image: Mutex<Option<TargetImage>>,
    loops: Mutex<Vec<JoinHandle<()>>>,
}

impl DebuggerService {
    /// Create a service. No connection is made until
    /// [`start_session`](Self::start_session).
    pub fn new(
        transport: Arc<dyn Transport>,
        decoder: Arc<dyn PayloadDecoder>,
        registry: Arc<tokio::sync::Mutex<WatchRegistry>>,
        options: EngineOptions,
    ) -> Self {
        Self {
            session: Arc::new(Session::new(transport, decoder, registry, options)),
            image: Mutex::new(None),
            loops: Mutex::new(Vec::new()),
        }
    }

    /// Subscribe to halt and watch-update events.
    pub fn subscribe(&self) -> broadcast::Receiver<DebugEvent> {
        self.session.events.subscribe()
    }

    /// Current session state.
    pub fn state(&self) -> SessionState {
        self.session.state()
    }

    /// Breakpoints the target has acknowledged.
    pub fn breakpoints(&self) -> Vec<Breakpoint> {
        self.session.breakpoints().all().copied().collect()
    }

    /// Connect to `port` and start the dispatcher and listener loops.
    ///
    /// Must be called inside a tokio runtime.
    ///
    /// # Errors
    ///
    /// [`EngineError::AlreadyActive`] if a session is running, or
    /// [`EngineError::Connect`] if the transport cannot open the port.
    pub async fn start_session(&self, image: TargetImage, port: &str) -> Result<(), EngineError> {
        let session = &self.session;
        session.begin_connect()?;
        tracing::info!(port, project = %image.name, "starting debug session");

        if let Err(e) = session.transport.connect(port, session.inbound_tx.clone()).await {
            session.set_lifecycle(Lifecycle::Disconnected);
            tracing::warn!(port, error = %e, "connect failed");
            return Err(EngineError::Connect {
                port: port.to_string(),
                reason: e.to_string(),
            });
        }

        *self.image.lock().unwrap_or_else(PoisonError::into_inner) = Some(image);
        session.flags.set_read_enabled(session.options.poll_enabled);
        session.set_lifecycle(Lifecycle::Active);

        let handles = [
            tokio::spawn(dispatcher::run(Arc::clone(session))),
            tokio::spawn(listener::run(Arc::clone(session))),
        ];
        self.loops
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend(handles);
        Ok(())
    }

    /// Detach from the target and end the session.
    ///
    /// Does nothing when no session is active or another caller is
    /// already stopping it. The target is told to detach first; the
    /// session ends whether or not it answers.
    pub async fn stop_session(&self) {
        let session = &self.session;
        if !session.begin_disconnect() {
            return;
        }
        session.flags.set_read_enabled(false);

        let detach = Request::command(
            &Command::StopDebug,
            session.options.resume_attempts,
            Expect::Ok,
        );
        match session.execute(detach).await {
            Ok(_) => tracing::info!("target detached"),
            Err(e) => tracing::warn!(error = %e, "detach not acknowledged"),
        }

        session.set_lifecycle(Lifecycle::Disconnected);
        let handles: Vec<_> = self
            .loops
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();
        for handle in handles {
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "session loop failed");
            }
        }

        // Acknowledgments still queued would otherwise be lost.
        while let Some(frame) = session.outbound.pop() {
            if let Err(e) = session.transport.send(&frame) {
                tracing::debug!(frame = %frame, error = %e, "flush failed");
                break;
            }
        }
        session.transport.disconnect();
        session.teardown();
        *self.image.lock().unwrap_or_else(PoisonError::into_inner) = None;
        tracing::info!("debug session closed");
    }

    /// Reset the target and wait for the stop-notification that follows.
    ///
    /// The halt is published to subscribers like any other.
    ///
    /// # Errors
    ///
    /// [`EngineError::NoResponse`] if the target never reports the halt.
    pub async fn reset(&self) -> Result<bool, EngineError> {
        let session = &self.session;
        session.require_active()?;
        session.transport.set_reset_mode(true);
        let result = session
            .execute(Request::command(
                &Command::Reset,
                session.options.attempts,
                Expect::Stop,
            ))
            .await;
        session.transport.set_reset_mode(false);
        settle("reset", result.map(|_| true), false)
    }

    /// Read the task-presence word.
    ///
    /// Returns `None` when the engine was busy or the target refused.
    /// An undecodable answer is logged and also yields `None`.
    pub async fn query_task_status(&self) -> Result<Option<i64>, EngineError> {
        let result = self.query(Command::TaskStatus).await;
        let message = match settle("task status", result.map(Some), None)? {
            Some(message) => message,
            None => return Ok(None),
        };
        match self
            .session
            .decoder
            .decode_memory_value(&message, DataType::Int32)
        {
            Ok(status) => {
                tracing::debug!(status, "task status");
                Ok(Some(status))
            }
            Err(e) => {
                tracing::warn!(error = %e, response = ?message, "task status undecodable");
                Ok(None)
            }
        }
    }

    /// Compare the target's code CRC with the session's image.
    pub async fn check_code_crc(&self) -> Result<bool, EngineError> {
        let result = self.query(Command::CodeCrc).await;
        let Some(message) = settle("code crc", result.map(Some), None)? else {
            return Ok(false);
        };
        let actual = self
            .session
            .decoder
            .decode_crc(&message, usize::from(STATUS_WORD_LEN))?;
        let expected = self
            .image
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|image| image.code_crc.clone())
            .unwrap_or_default();
        let matches = actual.eq_ignore_ascii_case(expected.trim());
        if !matches {
            tracing::warn!(%actual, %expected, "code CRC mismatch");
        }
        Ok(matches)
    }

    /// Install a hardware breakpoint.
    pub async fn set_breakpoint(&self, address: u32, thread: u32) -> Result<bool, EngineError> {
        let installed = self
            .control(
                Command::SetBreakpoint { address, thread },
                self.session.options.attempts,
            )
            .await?;
        if installed {
            self.session.breakpoints().add(address, thread);
        }
        Ok(installed)
    }

    /// Remove a hardware breakpoint.
    pub async fn remove_breakpoint(&self, address: u32, thread: u32) -> Result<bool, EngineError> {
        let removed = self
            .control(
                Command::RemoveBreakpoint { address, thread },
                self.session.options.attempts,
            )
            .await?;
        if removed {
            self.session.breakpoints().remove(address, thread);
        }
        Ok(removed)
    }

    /// Read a watched location.
    ///
    /// Explicit reads pass [`Submission::Queued`]; [`Submission::Direct`]
    /// is for callers that run on the dispatcher.
    ///
    /// # Errors
    ///
    /// [`EngineError::Busy`] while another request holds the engine.
    pub async fn read_memory(
        &self,
        entry: &WatchEntry,
        submission: Submission,
    ) -> Result<i64, EngineError> {
        self.session.read_memory(entry, submission).await
    }

    /// Write the entry's pending value to the target.
    pub async fn write_memory(&self, entry: &WatchEntry) -> Result<bool, EngineError> {
        self.session.require_active()?;
        let value = entry.new_value.as_deref().ok_or(DecodeError::Empty)?;
        let data = self.session.decoder.encode_for_write(value, entry.data_type)?;
        self.control(
            Command::WriteMemory {
                address: entry.address,
                size: entry.size,
                data,
            },
            self.session.options.attempts,
        )
        .await
    }

    /// Resume every task.
    pub async fn continue_all(&self) -> Result<bool, EngineError> {
        self.resume(Command::Continue(ThreadSel::All), None).await
    }

    /// Resume one task.
    pub async fn continue_task(&self, thread: u32) -> Result<bool, EngineError> {
        self.resume(Command::Continue(ThreadSel::Task(thread)), Some(thread))
            .await
    }

    /// Single-step one task.
    pub async fn step_task(&self, thread: u32) -> Result<bool, EngineError> {
        self.resume(Command::Step(thread), Some(thread)).await
    }

    /// Halt every task.
    pub async fn stop_all(&self) -> Result<bool, EngineError> {
        self.control(Command::Stop(ThreadSel::All), self.session.options.attempts)
            .await
    }

    /// Halt one task.
    pub async fn stop_task(&self, thread: u32) -> Result<bool, EngineError> {
        self.control(
            Command::Stop(ThreadSel::Task(thread)),
            self.session.options.attempts,
        )
        .await
    }

    /// Turn background polling of watched entries on or off.
    pub fn set_background_poll_enabled(&self, enabled: bool) {
        tracing::info!(enabled, "background polling");
        self.session.flags.set_read_enabled(enabled);
    }

    async fn query(&self, command: Command) -> Result<String, EngineError> {
        self.session.require_active()?;
        self.session
            .execute(Request::command(
                &command,
                self.session.options.attempts,
                Expect::Payload,
            ))
            .await
    }

    async fn control(&self, command: Command, attempts: u32) -> Result<bool, EngineError> {
        self.session.require_active()?;
        let result = self
            .session
            .execute(Request::command(&command, attempts, Expect::Ok))
            .await;
        settle(command.body().as_str(), result.map(|_| true), false)
    }

    async fn resume(&self, command: Command, thread: Option<u32>) -> Result<bool, EngineError> {
        let resumed = self
            .control(command, self.session.options.resume_attempts)
            .await?;
        if resumed {
            self.session.breakpoints().clear_hits(thread);
        }
        Ok(resumed)
    }
}

/// Turn soft failures into `fallback`; hard failures propagate.
fn settle<T>(what: &str, result: Result<T, EngineError>, fallback: T) -> Result<T, EngineError> {
    match result {
        Ok(value) => Ok(value),
        Err(EngineError::Busy) => {
            tracing::info!(what, "engine busy, request skipped");
            Ok(fallback)
        }
        Err(EngineError::Protocol { frame, response }) => {
            tracing::warn!(what, %frame, response = ?response, "target rejected request");
            Ok(fallback)
        }
        Err(e) => Err(e),
    }
}
