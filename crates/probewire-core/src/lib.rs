//! probewire-core: protocol vocabulary for the probewire target debugger.
//!
//! This crate holds everything that does not touch a transport: frame
//! construction and checksums, command bodies, response classification,
//! the default payload interpreter, and the watched-memory registry.

pub mod command;
pub mod error;
pub mod frame;
pub mod interpreter;
pub mod logging;
pub mod response;
pub mod watch;

// Re-export key types for convenience.
pub use command::{Command, ThreadSel};
pub use error::DecodeError;
pub use frame::{checksum, Frame};
pub use interpreter::{HexInterpreter, PayloadDecoder};
pub use response::Response;
pub use watch::{DataType, WatchEntry, WatchId, WatchRegistry, WatchValue};
