//! Newline-delimited text frames
//!
//! Every query and every response travels as one line of UTF-8 text
//! terminated by `\n`. A trailing `\r` is stripped and blank lines are
//! skipped. Lines longer than the codec's limit, and lines that are not
//! UTF-8, are reported as [`Frame::Rejected`] so the reader can answer
//! them and carry on with the next line.

use crate::error::{FrameError, ProtocolError};
use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

/// Default limit for one frame, in bytes, not counting the `\n`
pub const DEFAULT_MAX_FRAME_LENGTH: usize = 64 * 1024;

/// One decoded line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Rejected(FrameError),
}

/// Codec for newline-delimited frames
#[derive(Debug, Clone)]
pub struct LineCodec {
    max_length: usize,
    /// Where the next newline search starts; bytes before it hold none
    next_index: usize,
    /// Skipping the rest of an oversized line
    discarding: bool,
}

impl LineCodec {
    pub fn new() -> Self {
        Self::with_max_length(DEFAULT_MAX_FRAME_LENGTH)
    }

    pub fn with_max_length(max_length: usize) -> Self {
        Self {
            max_length,
            next_index: 0,
            discarding: false,
        }
    }

    pub fn max_length(&self) -> usize {
        self.max_length
    }

    fn too_long(&self) -> Frame {
        Frame::Rejected(FrameError::TooLong {
            limit: self.max_length,
        })
    }

    /// Frame for a complete line without its `\n`; `None` for blank lines
    fn frame_from(&self, line: &[u8]) -> Option<Frame> {
        let line = line.strip_suffix(b"\r").unwrap_or(line);
        if line.len() > self.max_length {
            return Some(self.too_long());
        }
        match std::str::from_utf8(line) {
            Ok(text) if text.trim().is_empty() => None,
            Ok(text) => Some(Frame::Text(text.to_string())),
            Err(e) => Some(Frame::Rejected(FrameError::InvalidUtf8 {
                valid_up_to: e.valid_up_to(),
            })),
        }
    }
}

impl Default for LineCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for LineCodec {
    type Item = Frame;
    type Error = ProtocolError;

    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<Frame>, ProtocolError> {
        loop {
            let newline = buf[self.next_index..]
                .iter()
                .position(|b| *b == b'\n')
                .map(|offset| self.next_index + offset);

            match (self.discarding, newline) {
                (true, Some(end)) => {
                    buf.advance(end + 1);
                    self.next_index = 0;
                    self.discarding = false;
                    return Ok(Some(self.too_long()));
                }
                (true, None) => {
                    buf.clear();
                    self.next_index = 0;
                    return Ok(None);
                }
                (false, Some(end)) => {
                    let line = buf.split_to(end + 1);
                    self.next_index = 0;
                    if let Some(frame) = self.frame_from(&line[..end]) {
                        return Ok(Some(frame));
                    }
                }
                (false, None) => {
                    // One extra byte for a `\r` that may precede the newline
                    if buf.len() > self.max_length + 1 {
                        buf.clear();
                        self.next_index = 0;
                        self.discarding = true;
                    } else {
                        self.next_index = buf.len();
                    }
                    return Ok(None);
                }
            }
        }
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<Frame>, ProtocolError> {
        if let Some(frame) = self.decode(buf)? {
            return Ok(Some(frame));
        }
        if self.discarding {
            self.discarding = false;
            return Ok(Some(self.too_long()));
        }
        // A final line without its newline still counts
        let line = buf.split_to(buf.len());
        self.next_index = 0;
        Ok(self.frame_from(&line))
    }
}

impl<T: AsRef<str>> Encoder<T> for LineCodec {
    type Error = ProtocolError;

    fn encode(&mut self, item: T, dst: &mut BytesMut) -> Result<(), ProtocolError> {
        let text = item.as_ref();
        if text.contains('\n') {
            return Err(FrameError::EmbeddedNewline.into());
        }
        dst.reserve(text.len() + 1);
        dst.put_slice(text.as_bytes());
        dst.put_u8(b'\n');
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_all(codec: &mut LineCodec, input: &[u8]) -> Vec<Frame> {
        let mut buf = BytesMut::from(input);
        let mut frames = Vec::new();
        while let Some(frame) = codec.decode(&mut buf).unwrap() {
            frames.push(frame);
        }
        frames
    }

    fn text(s: &str) -> Frame {
        Frame::Text(s.to_string())
    }

    #[test]
    fn test_splits_lines() {
        let mut codec = LineCodec::new();
        let frames = decode_all(&mut codec, b"CREATE { \"a\" = [] };\r\n\n  \nsecond\npartial");
        assert_eq!(frames, vec![text("CREATE { \"a\" = [] };"), text("second")]);
    }

    #[test]
    fn test_line_split_across_reads() {
        let mut codec = LineCodec::new();
        let mut buf = BytesMut::from(&b"CREATE { \"a\""[..]);
        assert_eq!(codec.decode(&mut buf).unwrap(), None);

        buf.extend_from_slice(b" = [] };\n");
        assert_eq!(
            codec.decode(&mut buf).unwrap(),
            Some(text("CREATE { \"a\" = [] };"))
        );
        assert!(buf.is_empty());
    }

    #[test]
    fn test_oversized_line_is_rejected_and_skipped() {
        let mut codec = LineCodec::with_max_length(8);
        let mut buf = BytesMut::from(&b"0123456789abcdef"[..]);
        assert_eq!(codec.decode(&mut buf).unwrap(), None);
        assert!(buf.is_empty());

        buf.extend_from_slice(b"ghij\nok\n");
        assert_eq!(
            codec.decode(&mut buf).unwrap(),
            Some(Frame::Rejected(FrameError::TooLong { limit: 8 }))
        );
        assert_eq!(codec.decode(&mut buf).unwrap(), Some(text("ok")));
    }

    #[test]
    fn test_complete_oversized_line() {
        let mut codec = LineCodec::with_max_length(4);
        let frames = decode_all(&mut codec, b"abcdefg\nabcd\r\n");
        assert_eq!(
            frames,
            vec![Frame::Rejected(FrameError::TooLong { limit: 4 }), text("abcd")]
        );
    }

    #[test]
    fn test_invalid_utf8() {
        let mut codec = LineCodec::new();
        let frames = decode_all(&mut codec, b"ab\xFF\nnext\n");
        assert_eq!(
            frames,
            vec![
                Frame::Rejected(FrameError::InvalidUtf8 { valid_up_to: 2 }),
                text("next")
            ]
        );
    }

    #[test]
    fn test_final_line_without_newline() {
        let mut codec = LineCodec::new();
        let mut buf = BytesMut::from(&b"one\ntwo"[..]);
        assert_eq!(codec.decode_eof(&mut buf).unwrap(), Some(text("one")));
        assert_eq!(codec.decode_eof(&mut buf).unwrap(), Some(text("two")));
        assert_eq!(codec.decode_eof(&mut buf).unwrap(), None);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_encode() {
        let mut codec = LineCodec::new();
        let mut dst = BytesMut::new();
        codec.encode("{\"success\":true}", &mut dst).unwrap();
        assert_eq!(&dst[..], b"{\"success\":true}\n");

        let err = codec.encode("a\nb", &mut dst).unwrap_err();
        assert!(matches!(err, ProtocolError::Frame(FrameError::EmbeddedNewline)));
    }
}
