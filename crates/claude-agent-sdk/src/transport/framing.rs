//! NDJSON reassembly (spec §4.2 "NDJSON framing", §8 invariant 3/4).
//!
//! stdout is a UTF-8 byte stream, not guaranteed to be chunked on line
//! boundaries. We accumulate into a buffer and attempt to decode it as a
//! single JSON value after each newline-terminated chunk; a successful
//! decode clears the buffer, a partial-JSON failure keeps accumulating, and
//! exceeding the configured size limit is a hard decode error.

use serde_json::Value;

use crate::error::SdkError;

pub(crate) struct Reassembler {
    buffer: String,
    limit: usize,
}

pub(crate) enum Step {
    /// The line was blank after trimming; nothing to do.
    Empty,
    /// Still accumulating a partial JSON value.
    Pending,
    /// A complete JSON value was decoded; the buffer has been cleared.
    Decoded(Value),
}

impl Reassembler {
    pub(crate) fn new(limit: usize) -> Self {
        Self {
            buffer: String::new(),
            limit,
        }
    }

    /// Feed one newline-delimited chunk (already stripped of its trailing
    /// `\n` by the caller's line reader).
    pub(crate) fn push_line(&mut self, line: &str) -> Result<Step, SdkError> {
        let trimmed = line.trim();
        if trimmed.is_empty() && self.buffer.is_empty() {
            return Ok(Step::Empty);
        }

        if !self.buffer.is_empty() {
            self.buffer.push('\n');
        }
        self.buffer.push_str(trimmed);

        if self.buffer.len() > self.limit {
            let buffer_size = self.buffer.len();
            let limit = self.limit;
            self.buffer.clear();
            return Err(SdkError::DecodeError { buffer_size, limit });
        }

        match serde_json::from_str::<Value>(&self.buffer) {
            Ok(value) => {
                self.buffer.clear();
                Ok(Step::Decoded(value))
            }
            Err(_) => Ok(Step::Pending),
        }
    }

    /// Called at stdout EOF: emit whatever complete value remains, if any.
    pub(crate) fn finish(&mut self) -> Option<Value> {
        if self.buffer.trim().is_empty() {
            return None;
        }
        let value = serde_json::from_str::<Value>(&self.buffer).ok();
        self.buffer.clear();
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_single_complete_line() {
        let mut r = Reassembler::new(1024);
        match r.push_line(r#"{"type":"system"}"#).unwrap() {
            Step::Decoded(v) => assert_eq!(v["type"], "system"),
            _ => panic!("expected a decoded value"),
        }
    }

    #[test]
    fn reassembles_a_value_split_across_two_chunks() {
        let mut r = Reassembler::new(1024);
        assert!(matches!(
            r.push_line(r#"{"type":"system","subtype":"#).unwrap(),
            Step::Pending
        ));
        match r.push_line(r#""init","data":{}}"#).unwrap() {
            Step::Decoded(v) => {
                assert_eq!(v["type"], "system");
                assert_eq!(v["subtype"], "init");
            }
            _ => panic!("expected a decoded value after the second chunk"),
        }
    }

    #[test]
    fn blank_lines_are_skipped() {
        let mut r = Reassembler::new(1024);
        assert!(matches!(r.push_line("").unwrap(), Step::Empty));
        assert!(matches!(r.push_line("   ").unwrap(), Step::Empty));
    }

    #[test]
    fn overflow_raises_decode_error_and_resets() {
        let mut r = Reassembler::new(16);
        let err = r.push_line(&"x".repeat(17)).unwrap_err();
        assert!(matches!(err, SdkError::DecodeError { limit: 16, .. }));
        // The buffer was cleared, so a fresh valid value decodes normally.
        match r.push_line(r#"{"a":1}"#).unwrap() {
            Step::Decoded(v) => assert_eq!(v["a"], 1),
            _ => panic!("expected recovery after overflow"),
        }
    }

    #[test]
    fn finish_emits_trailing_complete_value() {
        let mut r = Reassembler::new(1024);
        assert!(matches!(r.push_line(r#"{"a":1}"#).unwrap(), Step::Decoded(_)));
        assert!(r.finish().is_none());

        let mut r = Reassembler::new(1024);
        r.buffer.push_str(r#"{"a":1}"#);
        assert_eq!(r.finish().unwrap()["a"], 1);
    }

    #[test]
    fn finish_discards_incomplete_trailing_value() {
        let mut r = Reassembler::new(1024);
        r.buffer.push_str(r#"{"a":"#);
        assert!(r.finish().is_none());
    }
}
