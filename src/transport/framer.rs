//! Byte stream to line framing.
//!
//! The bridge terminates every line with `\r\n`. Reads from a serial port land
//! at arbitrary boundaries, so bytes are buffered until a full line is present.

use bytes::BytesMut;
use tracing::warn;

/// Maximum buffered bytes without a terminator before the buffer is dropped
pub const MAX_LINE_LENGTH: usize = 512;

const DELIMITER: &[u8] = b"\r\n";

/// Accumulates raw bytes and yields complete lines
#[derive(Debug)]
pub struct LineFramer {
    buffer: BytesMut,
    max_line_length: usize,
}

impl Default for LineFramer {
    fn default() -> Self {
        Self::new()
    }
}

impl LineFramer {
    pub fn new() -> Self {
        Self::with_max_line_length(MAX_LINE_LENGTH)
    }

    pub fn with_max_line_length(max_line_length: usize) -> Self {
        LineFramer {
            buffer: BytesMut::with_capacity(max_line_length * 2),
            max_line_length,
        }
    }

    /// Add received bytes to the buffer
    pub fn push(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Next complete, non-empty line, or `None` if more data is needed
    pub fn next_line(&mut self) -> Option<String> {
        loop {
            match find_delimiter(&self.buffer) {
                Some(end) => {
                    let line = self.buffer.split_to(end);
                    let _ = self.buffer.split_to(DELIMITER.len());
                    if line.is_empty() {
                        continue;
                    }
                    return Some(String::from_utf8_lossy(&line).into_owned());
                }
                None => {
                    if self.buffer.len() > self.max_line_length {
                        warn!(
                            "Discarding {} buffered bytes without line terminator",
                            self.buffer.len()
                        );
                        self.buffer.clear();
                    }
                    return None;
                }
            }
        }
    }

    /// Push bytes and collect every line completed by them
    pub fn feed(&mut self, data: &[u8]) -> Vec<String> {
        self.push(data);
        std::iter::from_fn(|| self.next_line()).collect()
    }

    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}

fn find_delimiter(buffer: &[u8]) -> Option<usize> {
    buffer
        .windows(DELIMITER.len())
        .position(|window| window == DELIMITER)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_complete_lines() {
        let mut framer = LineFramer::new();
        let lines = framer.feed(b">>> INSEN_FW_V2.1\r\n>>> CONTROLLERS|0_PS4\r\n");
        assert_eq!(lines, vec![">>> INSEN_FW_V2.1", ">>> CONTROLLERS|0_PS4"]);
        assert_eq!(framer.buffered_len(), 0);
    }

    #[test]
    fn test_partial_line() {
        let mut framer = LineFramer::new();
        assert!(framer.feed(b">>> INPUT|0|1,").is_empty());
        assert!(framer.feed(b"2|3,4|5,6|03|1|87\r").is_empty());

        let lines = framer.feed(b"\n");
        assert_eq!(lines, vec![">>> INPUT|0|1,2|3,4|5,6|03|1|87"]);
    }

    #[test]
    fn test_empty_lines_are_skipped() {
        let mut framer = LineFramer::new();
        let lines = framer.feed(b"\r\n\r\nready\r\n");
        assert_eq!(lines, vec!["ready"]);
    }

    #[test]
    fn test_bare_newline_is_not_a_terminator() {
        let mut framer = LineFramer::new();
        let lines = framer.feed(b"one\ntwo\r\n");
        assert_eq!(lines, vec!["one\ntwo"]);
    }

    #[test]
    fn test_overlong_garbage_is_dropped() {
        let mut framer = LineFramer::with_max_line_length(8);
        assert!(framer.feed(b"0123456789abcdef").is_empty());
        assert_eq!(framer.buffered_len(), 0);

        assert_eq!(framer.feed(b"ok\r\n"), vec!["ok"]);
    }
}
