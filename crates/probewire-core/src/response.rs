//! Classification of inbound messages.

use crate::frame::{CHECKSUM_DELIMITER, NOT_READY};

/// Marker contained in a successful acknowledgment from the target.
pub const OK_MARKER: &str = "$OK";

/// Marker the target uses for a rejected command.
///
/// The leading `+` and the `$` before the checksum are what the target
/// actually emits today; `$E02#a7` is not matched.
pub const ERROR_MARKER: &str = "+$E02$a7";

/// Prefix of a stop-notification reporting halted tasks.
pub const STOP_MARKER: &str = "$T02thread";

/// Start of the halt-status payload inside a stop-notification.
pub const HALT_PREFIX: &str = "$T02";

/// An inbound message, classified.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Response<'a> {
    /// The target cannot answer yet (or sent nothing).
    NotReady,
    /// The target rejected the command.
    Error,
    /// The target accepted the command.
    Ok,
    /// One or more tasks halted; carries the halt-status text.
    Stop(&'a str),
    /// Anything else: a data answer for the caller's decoder.
    Payload(&'a str),
}

impl<'a> Response<'a> {
    /// Classify a raw inbound message.
    pub fn classify(message: &'a str) -> Self {
        if message.is_empty() || message == NOT_READY {
            Response::NotReady
        } else if message.contains(ERROR_MARKER) {
            Response::Error
        } else if message.contains(OK_MARKER) {
            Response::Ok
        } else if message.contains(STOP_MARKER) {
            Response::Stop(stop_payload(message).unwrap_or(message))
        } else {
            Response::Payload(message)
        }
    }
}

/// Extract the halt-status text of a stop-notification.
///
/// Runs from the `$T02` marker up to (not including) the checksum
/// delimiter, or to the end of the message when there is none.
pub fn stop_payload(message: &str) -> Option<&str> {
    let start = message.find(HALT_PREFIX)?;
    let rest = &message[start..];
    Some(match rest.find(CHECKSUM_DELIMITER) {
        Some(end) => &rest[..end],
        None => rest,
    })
}
