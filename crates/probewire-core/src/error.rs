//! Payload decoding errors.

use thiserror::Error;

use crate::watch::DataType;

/// Errors from decoding target responses or encoding values for the target.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// The response carried no payload bytes.
    #[error("empty payload")]
    Empty,

    /// The payload contained characters that are not hex digits.
    #[error("invalid hex payload: {0}")]
    InvalidHex(String),

    /// The payload was shorter than the requested width.
    #[error("payload too short: expected {expected} bytes, got {got}")]
    Truncated {
        /// Bytes required.
        expected: usize,
        /// Bytes present.
        got: usize,
    },

    /// A value to be written could not be parsed as a number.
    #[error("invalid number: {0}")]
    InvalidNumber(String),

    /// A value to be written does not fit the declared data type.
    #[error("value {value} out of range for {data_type}")]
    OutOfRange {
        /// The rejected value.
        value: i64,
        /// The declared type of the target location.
        data_type: DataType,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_empty_display() {
        assert_eq!(DecodeError::Empty.to_string(), "empty payload");
    }

    #[test]
    fn error_invalid_hex_display() {
        let err = DecodeError::InvalidHex("0G".into());
        assert_eq!(err.to_string(), "invalid hex payload: 0G");
    }

    #[test]
    fn error_truncated_display() {
        let err = DecodeError::Truncated {
            expected: 4,
            got: 2,
        };
        assert_eq!(
            err.to_string(),
            "payload too short: expected 4 bytes, got 2"
        );
    }

    #[test]
    fn error_out_of_range_display() {
        let err = DecodeError::OutOfRange {
            value: 300,
            data_type: DataType::Uint8,
        };
        assert_eq!(err.to_string(), "value 300 out of range for uint8_t");
    }

    #[test]
    fn error_invalid_number_display() {
        let err = DecodeError::InvalidNumber("abc".into());
        assert_eq!(err.to_string(), "invalid number: abc");
    }
}
