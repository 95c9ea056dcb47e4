//! Payload interpretation: response text into values and back.

use regex::Regex;

use crate::error::DecodeError;
use crate::frame::{CHECKSUM_DELIMITER, FRAME_START};
use crate::watch::DataType;

/// Decodes target payloads and encodes values for writes.
///
/// The engine only frames, sequences and acknowledges; what a payload
/// means is decided here.
pub trait PayloadDecoder: Send + Sync {
    /// Decode a memory read response as a value of `data_type`.
    fn decode_memory_value(&self, message: &str, data_type: DataType) -> Result<i64, DecodeError>;

    /// Decode a CRC word of `len` bytes, rendered as uppercase hex.
    fn decode_crc(&self, message: &str, len: usize) -> Result<String, DecodeError>;

    /// Decode per-task halt statuses from one or more stop-notifications.
    fn decode_halt_statuses(&self, messages: &[&str]) -> Result<Vec<i32>, DecodeError>;

    /// Encode a user-entered value as hex bytes for a memory write.
    fn encode_for_write(&self, value: &str, data_type: DataType) -> Result<String, DecodeError>;
}

/// Default interpreter for little-endian targets speaking hex payloads.
#[derive(Debug)]
pub struct HexInterpreter {
    halt_fields: Regex,
}

impl HexInterpreter {
    /// Create the interpreter.
    pub fn new() -> Self {
        // `thread` optionally followed by `:` and hex fields split by `;` or `,`
        let halt_fields = Regex::new(r"thread:?([0-9A-Fa-f;,]*)").expect("halt regex is valid");
        Self { halt_fields }
    }
}

impl Default for HexInterpreter {
    fn default() -> Self {
        Self::new()
    }
}

impl PayloadDecoder for HexInterpreter {
    fn decode_memory_value(&self, message: &str, data_type: DataType) -> Result<i64, DecodeError> {
        let bytes = hex_bytes(payload_text(message))?;
        let raw = little_endian(&bytes, usize::from(data_type.size()))?;
        if data_type.is_signed() {
            let shift = 64 - u32::from(data_type.size()) * 8;
            Ok(((raw << shift) as i64) >> shift)
        } else {
            Ok(raw as i64)
        }
    }

    fn decode_crc(&self, message: &str, len: usize) -> Result<String, DecodeError> {
        let bytes = hex_bytes(payload_text(message))?;
        let raw = little_endian(&bytes, len)?;
        Ok(format!("{raw:0width$X}", width = len * 2))
    }

    fn decode_halt_statuses(&self, messages: &[&str]) -> Result<Vec<i32>, DecodeError> {
        let mut statuses = Vec::new();
        for message in messages {
            for caps in self.halt_fields.captures_iter(message) {
                let fields = caps.get(1).map_or("", |m| m.as_str());
                for field in fields.split([';', ',']).filter(|f| !f.is_empty()) {
                    let status = i32::from_str_radix(field, 16)
                        .map_err(|_| DecodeError::InvalidHex(field.to_string()))?;
                    statuses.push(status);
                }
            }
        }
        tracing::trace!(?statuses, "decoded halt statuses");
        Ok(statuses)
    }

    fn encode_for_write(&self, value: &str, data_type: DataType) -> Result<String, DecodeError> {
        let parsed = parse_number(value)?;
        let (min, max) = data_type.range();
        if parsed < min || parsed > max {
            return Err(DecodeError::OutOfRange {
                value: parsed,
                data_type,
            });
        }
        let bytes = (parsed as u64).to_le_bytes();
        Ok(bytes[..usize::from(data_type.size())]
            .iter()
            .map(|b| format!("{b:02X}"))
            .collect())
    }
}

/// Strip leading acks, the frame start and the checksum.
fn payload_text(message: &str) -> &str {
    let text = message.trim_start_matches('+');
    let text = text.strip_prefix(FRAME_START).unwrap_or(text);
    match text.find(CHECKSUM_DELIMITER) {
        Some(end) => &text[..end],
        None => text,
    }
}

fn hex_bytes(text: &str) -> Result<Vec<u8>, DecodeError> {
    if text.is_empty() {
        return Err(DecodeError::Empty);
    }
    if text.len() % 2 != 0 || !text.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(DecodeError::InvalidHex(text.to_string()));
    }
    (0..text.len())
        .step_by(2)
        .map(|i| {
            u8::from_str_radix(&text[i..i + 2], 16)
                .map_err(|_| DecodeError::InvalidHex(text.to_string()))
        })
        .collect()
}

fn little_endian(bytes: &[u8], width: usize) -> Result<u64, DecodeError> {
    if bytes.len() < width {
        return Err(DecodeError::Truncated {
            expected: width,
            got: bytes.len(),
        });
    }
    Ok(bytes[..width]
        .iter()
        .rev()
        .fold(0u64, |acc, b| (acc << 8) | u64::from(*b)))
}

fn parse_number(value: &str) -> Result<i64, DecodeError> {
    let trimmed = value.trim();
    let (negative, digits) = match trimmed.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, trimmed),
    };
    let magnitude = match digits
        .strip_prefix("0x")
        .or_else(|| digits.strip_prefix("0X"))
    {
        Some(hex) => i64::from_str_radix(hex, 16),
        None => digits.parse::<i64>(),
    }
    .map_err(|_| DecodeError::InvalidNumber(value.to_string()))?;
    Ok(if negative { -magnitude } else { magnitude })
}
