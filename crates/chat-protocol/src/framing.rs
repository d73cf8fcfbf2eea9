//! Incremental CRLF framing for the stream transport.
//!
//! A TCP read can end anywhere: in the middle of a line, right between
//! `\r` and `\n`, or after several lines at once. [`LineFramer`] keeps the
//! bytes it has seen so far and hands out complete frames one by one; the
//! trailing partial frame stays buffered and seeds the next read.

use bytes::{Buf, Bytes, BytesMut};

use crate::error::ProtocolError;
use crate::wire_types::LINE_DELIMITER;

/// Default upper bound for a single frame (delimiter excluded).
pub const DEFAULT_MAX_FRAME_LEN: usize = 4096;

#[derive(Debug)]
pub struct LineFramer {
    buf: BytesMut,
    max_frame_len: usize,
}

impl Default for LineFramer {
    fn default() -> Self {
        LineFramer::new(DEFAULT_MAX_FRAME_LEN)
    }
}

impl LineFramer {
    pub fn new(max_frame_len: usize) -> Self {
        LineFramer {
            buf: BytesMut::with_capacity(max_frame_len.min(64 * 1024)),
            max_frame_len,
        }
    }

    /// Append freshly read bytes.
    pub fn extend(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Pop the next complete frame, without its delimiter.
    ///
    /// Empty frames (`\r\n\r\n`) are skipped. Returns `Ok(None)` when only a
    /// partial frame (or nothing) is buffered.
    pub fn next_frame(&mut self) -> Result<Option<Bytes>, ProtocolError> {
        loop {
            match find_delimiter(&self.buf) {
                Some(pos) => {
                    let frame = self.buf.split_to(pos).freeze();
                    self.buf.advance(LINE_DELIMITER.len());

                    if frame.is_empty() {
                        continue;
                    }
                    if frame.len() > self.max_frame_len {
                        return Err(ProtocolError::FrameTooLong(frame.len()));
                    }
                    return Ok(Some(frame));
                }
                None => {
                    // A lone trailing '\r' may still become a delimiter.
                    if self.buf.len() > self.max_frame_len + 1 {
                        return Err(ProtocolError::FrameTooLong(self.buf.len()));
                    }
                    return Ok(None);
                }
            }
        }
    }

    #[cfg(test)]
    fn drain_frames(&mut self) -> Result<Vec<Bytes>, ProtocolError> {
        let mut frames = Vec::new();
        while let Some(frame) = self.next_frame()? {
            frames.push(frame);
        }
        Ok(frames)
    }

    #[cfg(test)]
    fn pending(&self) -> &[u8] {
        &self.buf
    }
}

fn find_delimiter(buf: &[u8]) -> Option<usize> {
    buf.windows(LINE_DELIMITER.len())
        .position(|w| w == LINE_DELIMITER)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reassembles_across_chunk_boundary() {
        let mut framer = LineFramer::default();

        framer.extend(b"AUTH a b c\r\nJOIN ch");
        let first = framer.drain_frames().unwrap();
        assert_eq!(first, vec![Bytes::from_static(b"AUTH a b c")]);
        assert_eq!(framer.pending(), b"JOIN ch");

        framer.extend(b"annel\r\n");
        let second = framer.drain_frames().unwrap();
        assert_eq!(second, vec![Bytes::from_static(b"JOIN channel")]);
        assert!(framer.pending().is_empty());
    }

    #[test]
    fn delimiter_split_between_reads() {
        let mut framer = LineFramer::default();
        framer.extend(b"BYE\r");
        assert_eq!(framer.next_frame().unwrap(), None);
        framer.extend(b"\n");
        assert_eq!(framer.next_frame().unwrap(), Some(Bytes::from_static(b"BYE")));
    }

    #[test]
    fn skips_empty_frames() {
        let mut framer = LineFramer::default();
        framer.extend(b"\r\n\r\nBYE\r\n\r\n");
        assert_eq!(framer.drain_frames().unwrap(), vec![Bytes::from_static(b"BYE")]);
    }

    #[test]
    fn bare_newline_is_not_a_delimiter() {
        let mut framer = LineFramer::default();
        framer.extend(b"MSG FROM a IS x\ny\r\n");
        assert_eq!(
            framer.drain_frames().unwrap(),
            vec![Bytes::from_static(b"MSG FROM a IS x\ny")]
        );
    }

    #[test]
    fn oversized_partial_frame_is_rejected() {
        let mut framer = LineFramer::new(8);
        framer.extend(b"0123456789");
        assert_eq!(framer.next_frame(), Err(ProtocolError::FrameTooLong(10)));
    }
}
