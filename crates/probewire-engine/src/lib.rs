//! probewire-engine: the command/response engine for a remote target.
//!
//! One request/response rendezvous is outstanding at a time. Frames are
//! either queued for the outbound dispatcher or sent directly from the
//! caller; inbound messages are pumped by the listener into a single
//! channel that only the holder of the execution slot may read.

mod breakpoint;
mod dispatcher;
mod error;
mod events;
mod executor;
mod halt;
mod listener;
mod options;
mod poller;
mod service;
mod session;
pub mod transport;

#[cfg(test)]
mod fake;

pub use breakpoint::{Breakpoint, BreakpointTable};
pub use error::{EngineError, TransportError};
pub use events::DebugEvent;
pub use executor::Submission;
pub use options::EngineOptions;
pub use service::{DebuggerService, TargetImage};
pub use session::SessionState;
pub use transport::{InboundSender, TcpTransport, Transport};
