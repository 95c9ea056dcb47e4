//! Engine error types.

use probewire_core::DecodeError;
use thiserror::Error;

/// Errors raised by a [`Transport`](crate::Transport).
#[derive(Debug, Error)]
pub enum TransportError {
    /// No connection is open.
    #[error("transport not connected")]
    NotConnected,

    /// The target closed the connection.
    #[error("connection closed by target")]
    Closed,

    /// Socket-level failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors from debugger operations.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The transport could not open the port.
    #[error("failed to connect to {port}: {reason}")]
    Connect {
        /// The port that was tried.
        port: String,
        /// Why the connection failed.
        reason: String,
    },

    /// No debug session is running.
    #[error("no debug session is active")]
    Inactive,

    /// A session is already running or connecting.
    #[error("a debug session is already active")]
    AlreadyActive,

    /// Another request holds the engine.
    #[error("engine busy")]
    Busy,

    /// The target answered with its error marker.
    #[error("target rejected {frame}: {response:?}")]
    Protocol {
        /// The frame that was rejected.
        frame: String,
        /// The raw response.
        response: String,
    },

    /// Every attempt timed out.
    #[error("no response to {frame} after {attempts} attempts")]
    NoResponse {
        /// The unanswered frame.
        frame: String,
        /// How many attempts were made.
        attempts: u32,
    },

    /// Transport failure outside the attempt loop.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// The response could not be interpreted.
    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_connect_display() {
        let err = EngineError::Connect {
            port: "10.0.0.2:3333".into(),
            reason: "connection refused".into(),
        };
        assert_eq!(
            err.to_string(),
            "failed to connect to 10.0.0.2:3333: connection refused"
        );
    }

    #[test]
    fn error_session_state_display() {
        assert_eq!(EngineError::Inactive.to_string(), "no debug session is active");
        assert_eq!(
            EngineError::AlreadyActive.to_string(),
            "a debug session is already active"
        );
        assert_eq!(EngineError::Busy.to_string(), "engine busy");
    }

    #[test]
    fn error_protocol_display_quotes_response() {
        let err = EngineError::Protocol {
            frame: "$Z1,1A,1#86".into(),
            response: "+$E02$a7".into(),
        };
        assert_eq!(err.to_string(), "target rejected $Z1,1A,1#86: \"+$E02$a7\"");
    }

    #[test]
    fn error_no_response_display() {
        let err = EngineError::NoResponse {
            frame: "$?#3F".into(),
            attempts: 3,
        };
        assert_eq!(err.to_string(), "no response to $?#3F after 3 attempts");
    }

    #[test]
    fn error_from_transport_error() {
        let err: EngineError = TransportError::Closed.into();
        assert!(matches!(err, EngineError::Transport(TransportError::Closed)));
        assert_eq!(
            err.to_string(),
            "transport error: connection closed by target"
        );
    }

    #[test]
    fn error_from_decode_error() {
        let err: EngineError = DecodeError::Empty.into();
        assert!(matches!(err, EngineError::Decode(_)));
        assert!(err.to_string().starts_with("decode error: "));
    }

    #[test]
    fn transport_error_from_io() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        let err: TransportError = io.into();
        assert_eq!(err.to_string(), "I/O error: refused");
    }
}
