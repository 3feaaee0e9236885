//! Line-oriented decoder for the backend's `data: <json>` stream.
//!
//! Bytes are buffered until a newline arrives, so a frame split across
//! network reads (or a multi-byte character split across reads) decodes
//! the same as one delivered whole. A corrupt frame is dropped and the
//! decoder moves on to the next line.

use serde_json::Value;

use crate::models::StreamEvent;

const DATA_PREFIX: &str = "data:";
const DONE_SENTINEL: &str = "[DONE]";

/// One decoded frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Event(StreamEvent),
    /// The literal `data: [DONE]` terminator.
    Done,
}

/// Incremental frame decoder. Feed it raw chunks with [`push`](Self::push)
/// and call [`finish`](Self::finish) when the underlying stream ends.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    pending: Vec<u8>,
    dropped: usize,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consume one chunk and return every frame it completes.
    pub fn push(&mut self, chunk: impl AsRef<[u8]>) -> Vec<Frame> {
        self.pending.extend_from_slice(chunk.as_ref());
        let mut frames = Vec::new();
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            if let Some(frame) = self.decode_line(&line[..pos]) {
                frames.push(frame);
            }
        }
        frames
    }

    /// Flush a trailing line that never received its newline.
    pub fn finish(&mut self) -> Option<Frame> {
        if self.pending.is_empty() {
            return None;
        }
        let line = std::mem::take(&mut self.pending);
        self.decode_line(&line)
    }

    /// Number of `data:` lines dropped because their payload was not JSON.
    pub fn dropped(&self) -> usize {
        self.dropped
    }

    fn decode_line(&mut self, raw: &[u8]) -> Option<Frame> {
        let line = String::from_utf8_lossy(raw);
        let line = line.trim_end_matches('\r');
        let payload = line.strip_prefix(DATA_PREFIX)?.trim();
        if payload.is_empty() {
            return None;
        }
        if payload == DONE_SENTINEL {
            return Some(Frame::Done);
        }
        match serde_json::from_str::<Value>(payload) {
            Ok(value) => Some(Frame::Event(StreamEvent::from_payload(&value))),
            Err(e) => {
                self.dropped += 1;
                tracing::warn!(error = %e, "dropping unparseable stream frame");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn answer(frame: &Frame) -> Option<&str> {
        match frame {
            Frame::Event(ev) => ev.answer.as_deref(),
            Frame::Done => None,
        }
    }

    #[test]
    fn decodes_complete_lines() {
        let mut dec = FrameDecoder::new();
        let frames = dec.push(
            "data: {\"code\":0,\"data\":{\"answer\":\"Hi\"}}\n\ndata: [DONE]\n",
        );
        assert_eq!(frames.len(), 2);
        assert_eq!(answer(&frames[0]), Some("Hi"));
        assert_eq!(frames[1], Frame::Done);
    }

    #[test]
    fn buffers_partial_lines_across_pushes() {
        let mut dec = FrameDecoder::new();
        assert!(dec.push("data: {\"code\":0,\"da").is_empty());
        assert!(dec.push("ta\":{\"answer\":\"Hel").is_empty());
        let frames = dec.push("lo\"}}\r\n");
        assert_eq!(frames.len(), 1);
        assert_eq!(answer(&frames[0]), Some("Hello"));
    }

    #[test]
    fn split_multibyte_character_survives() {
        let bytes = "data: {\"code\":0,\"data\":{\"answer\":\"café\"}}\n".as_bytes();
        // Lands between the two bytes of 'é'.
        let split = bytes.len() - 5;
        let mut dec = FrameDecoder::new();
        assert_eq!(bytes[split - 1], 0xC3);
        assert!(dec.push(&bytes[..split]).is_empty());
        let frames = dec.push(&bytes[split..]);
        assert_eq!(answer(&frames[0]), Some("café"));
    }

    #[test]
    fn ignores_foreign_lines_and_drops_corrupt_frames() {
        let mut dec = FrameDecoder::new();
        let frames = dec.push(
            "event: message\n: keepalive\ndata: {not json\ndata: {\"code\":0,\"data\":{\"answer\":\"ok\"}}\n",
        );
        assert_eq!(frames.len(), 1);
        assert_eq!(answer(&frames[0]), Some("ok"));
        assert_eq!(dec.dropped(), 1);
    }

    #[test]
    fn finish_flushes_unterminated_tail() {
        let mut dec = FrameDecoder::new();
        assert!(dec.push("data:[DONE]").is_empty());
        assert_eq!(dec.finish(), Some(Frame::Done));
        assert_eq!(dec.finish(), None);
    }
}
