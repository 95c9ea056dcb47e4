//! Frame codec: `$body#checksum` framing for the remote protocol.
//!
//! The checksum is the 8-bit wrapping sum of the body's UTF-8 bytes,
//! rendered as uppercase hex without zero padding. A sum below `0x10`
//! therefore yields a single-digit checksum field; targets that insist on
//! two digits will reject such frames.

use std::fmt;

use crate::response::ERROR_MARKER;

/// Leading character of every frame.
pub const FRAME_START: char = '$';

/// Separates the body from the checksum.
pub const CHECKSUM_DELIMITER: char = '#';

/// Acknowledgment emitted for every response the engine consumes.
pub const ACK: &str = "+";

/// Sentinel the target sends while it cannot answer yet.
pub const NOT_READY: &str = "-\0";

/// Compute the 8-bit checksum of a frame body.
pub fn checksum_byte(body: &str) -> u8 {
    body.bytes().fold(0u8, |sum, b| sum.wrapping_add(b))
}

/// Render the checksum field for a frame body.
pub fn checksum(body: &str) -> String {
    format!("{:X}", checksum_byte(body))
}

/// A complete outbound frame.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Frame(String);

impl Frame {
    /// Build a frame from a command body.
    pub fn new(body: &str) -> Self {
        Self(format!(
            "{FRAME_START}{body}{CHECKSUM_DELIMITER}{}",
            checksum(body)
        ))
    }

    /// The wire text of the frame.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The body between `$` and `#`.
    pub fn body(&self) -> &str {
        split(&self.0).map_or("", |(body, _)| body)
    }

    /// The checksum text after `#`.
    pub fn checksum_field(&self) -> &str {
        split(&self.0).map_or("", |(_, sum)| sum)
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Frame {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Split frame text into `(body, checksum)`.
///
/// Returns `None` if the text does not start with `$` or has no `#`.
pub fn split(text: &str) -> Option<(&str, &str)> {
    let rest = text.strip_prefix(FRAME_START)?;
    rest.rsplit_once(CHECKSUM_DELIMITER)
}

/// Check that the checksum field of `text` matches its body.
pub fn verify(text: &str) -> bool {
    split(text).is_some_and(|(body, sum)| {
        u8::from_str_radix(sum, 16).is_ok_and(|parsed| parsed == checksum_byte(body))
    })
}

/// Split the next complete inbound message off the front of `buffer`.
///
/// A message is a run of acknowledgments followed by one `$body#xx`
/// frame, the not-ready sentinel, or the target's error literal. Bare
/// acknowledgments and partial frames stay in `buffer` until the rest
/// arrives. Bytes that cannot start a message are dropped.
pub fn take_message(buffer: &mut String) -> Option<String> {
    let error_body = &ERROR_MARKER[ACK.len()..];
    loop {
        let acks = buffer.len() - buffer.trim_start_matches(ACK).len();
        let rest = &buffer[acks..];
        if rest.is_empty() || NOT_READY.starts_with(rest) {
            return None;
        }
        if rest.starts_with(NOT_READY) {
            buffer.drain(..acks + NOT_READY.len());
            return Some(NOT_READY.to_string());
        }
        if rest.starts_with(error_body) {
            buffer.drain(..acks + error_body.len());
            return Some(ERROR_MARKER.to_string());
        }
        if !rest.starts_with(FRAME_START) {
            let first = rest.chars().next().map_or(1, char::len_utf8);
            let skip = rest[first..]
                .find(|c| matches!(c, FRAME_START | '+' | '-'))
                .map_or(rest.len(), |i| i + first);
            tracing::debug!(dropped = %rest[..skip].escape_debug(), "skipping non-frame bytes");
            buffer.drain(..acks + skip);
            continue;
        }

        let hash = rest.find(CHECKSUM_DELIMITER)?;
        let tail = &rest[hash + 1..];
        let digits = tail
            .chars()
            .take(2)
            .take_while(char::is_ascii_hexdigit)
            .count();
        // A short checksum is complete only once something follows it.
        if digits < 2 && tail.len() == digits {
            return None;
        }
        let end = acks + hash + 1 + digits;
        let message = buffer[..end].to_string();
        buffer.drain(..end);
        return Some(message);
    }
}

/// Split every complete message off the front of `buffer`.
pub fn drain_messages(buffer: &mut String) -> Vec<String> {
    std::iter::from_fn(|| take_message(buffer)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stop_debug_frame_matches_fixed_command() {
        // 0x44 + 0x3B + 0x34 = 0xB3
        assert_eq!(checksum("D;4"), "B3");
        assert_eq!(Frame::new("D;4").as_str(), "$D;4#B3");
    }

    #[test]
    fn checksum_wraps_at_256() {
        // 3 * 0x7B = 0x171 -> 0x71
        assert_eq!(checksum_byte("{{{"), 0x71);
    }

    #[test]
    fn checksum_is_not_zero_padded() {
        // 0x61 + 0x61 + 0x41 = 0x103 -> 0x03
        let frame = Frame::new("aaA");
        assert_eq!(frame.as_str(), "$aaA#3");
        assert_eq!(frame.checksum_field(), "3");
    }

    #[test]
    fn empty_body_frame() {
        assert_eq!(Frame::new("").as_str(), "$#0");
    }

    #[test]
    fn frame_accessors_split_body_and_checksum() {
        let frame = Frame::new("vCont;c:-1");
        assert_eq!(frame.body(), "vCont;c:-1");
        assert_eq!(frame.checksum_field(), "40");
        assert_eq!(frame.to_string(), "$vCont;c:-1#40");
    }

    #[test]
    fn body_containing_hash_splits_on_last_delimiter() {
        let frame = Frame::new("a#b");
        assert_eq!(frame.body(), "a#b");
        assert!(verify(frame.as_str()));
    }

    #[test]
    fn built_frames_always_verify() {
        let bodies = [
            "?",
            "Z1,1A,1",
            "m20000000,4",
            "M20000100,4:0A000000",
            "vCont;t:-1",
            "aaA",
            "",
        ];
        for body in bodies {
            let frame = Frame::new(body);
            assert!(verify(frame.as_str()), "frame {frame} failed to verify");
            assert_eq!(frame.body(), body);
        }
    }

    #[test]
    fn verify_rejects_bad_checksum_and_malformed_text() {
        assert!(!verify("$D;4#B4"));
        assert!(!verify("D;4#B3"));
        assert!(!verify("$D;4"));
        assert!(!verify("$D;4#ZZ"));
    }

    fn drain(text: &str) -> (Vec<String>, String) {
        let mut buffer = text.to_string();
        let messages = drain_messages(&mut buffer);
        (messages, buffer)
    }

    #[test]
    fn coalesced_reply_and_stop_split_into_two_messages() {
        let (messages, rest) = drain("+$OK#9A$T02thread:1;#E3");
        assert_eq!(messages, ["+$OK#9A", "$T02thread:1;#E3"]);
        assert!(rest.is_empty());
    }

    #[test]
    fn partial_frame_waits_for_the_rest() {
        let mut buffer = "+$T02thr".to_string();
        assert!(drain_messages(&mut buffer).is_empty());
        buffer.push_str("ead:1;#E");
        assert!(drain_messages(&mut buffer).is_empty());
        buffer.push('3');
        assert_eq!(drain_messages(&mut buffer), ["+$T02thread:1;#E3"]);
        assert!(buffer.is_empty());
    }

    #[test]
    fn bare_acks_are_held_until_a_frame_follows() {
        let mut buffer = ACK.to_string();
        assert!(drain_messages(&mut buffer).is_empty());
        assert_eq!(buffer, "+");
        buffer.push_str("$OK#9A");
        assert_eq!(drain_messages(&mut buffer), ["+$OK#9A"]);
    }

    #[test]
    fn not_ready_and_error_literal_are_messages_of_their_own() {
        let (messages, rest) = drain("-\0+$OK#9A+$E02$a7");
        assert_eq!(messages, [NOT_READY, "+$OK#9A", ERROR_MARKER]);
        assert!(rest.is_empty());

        let (messages, rest) = drain("-");
        assert!(messages.is_empty());
        assert_eq!(rest, "-");
    }

    #[test]
    fn single_digit_checksum_ends_where_the_next_frame_starts() {
        let (messages, rest) = drain("$aaA#3$OK#9A");
        assert_eq!(messages, ["$aaA#3", "$OK#9A"]);
        assert!(rest.is_empty());
    }

    #[test]
    fn bytes_before_a_frame_are_dropped() {
        let (messages, rest) = drain("xy$OK#9A");
        assert_eq!(messages, ["$OK#9A"]);
        assert!(rest.is_empty());
    }
}
