//! Incremental SSE decoder for chunked response bodies
//!
//! Buffers raw bytes, so a frame (or a multi-byte UTF-8 sequence) split
//! across reads decodes the same as one delivered whole.

/// Payload sent by the server to close the stream
pub const DONE_SENTINEL: &str = "[DONE]";
/// Prefix of plain-text error frames
pub const ERROR_PREFIX: &str = "[ERROR]";

/// One decoded `data:` unit
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// JSON payload (not yet parsed)
    Data(String),
    /// `[ERROR] ...` line, kept verbatim
    ErrorLine(String),
    /// `[DONE]` terminator
    Done,
}

impl Frame {
    fn classify(payload: String) -> Self {
        if payload.trim() == DONE_SENTINEL {
            Frame::Done
        } else if payload.starts_with(ERROR_PREFIX) {
            Frame::ErrorLine(payload)
        } else {
            Frame::Data(payload)
        }
    }
}

/// Server-Sent Events decoder
///
/// Lines are split on `\n` (a trailing `\r` is dropped). Consecutive `data:`
/// lines are joined with `\n` and emitted as one frame at the next blank
/// line. `event:`, `id:`, `retry:` and `:` comment lines are ignored.
///
/// Once [`Frame::Done`] has been produced the decoder is closed: later bytes
/// are discarded.
///
/// # Example
/// ```
/// use qbank_chat::stream::{Frame, SseDecoder};
///
/// let mut decoder = SseDecoder::new();
/// assert!(decoder.push(b"data: {\"type\":\"tu").is_empty());
/// assert_eq!(
///     decoder.push(b"rn-end\"}\n\ndata: [DONE]\n\n"),
///     vec![Frame::Data("{\"type\":\"turn-end\"}".to_string()), Frame::Done]
/// );
/// assert!(decoder.is_done());
/// ```
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    data_lines: Vec<String>,
    done: bool,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// True after `[DONE]` was decoded
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Push incoming bytes and extract every frame they complete
    ///
    /// Incomplete lines and frames stay buffered for the next `push()` or
    /// `finish()`.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<Frame> {
        if self.done {
            return Vec::new();
        }
        self.buffer.extend_from_slice(bytes);

        let mut frames = Vec::new();
        let mut consumed = 0;
        while let Some(offset) = self.buffer[consumed..].iter().position(|b| *b == b'\n') {
            let end = consumed + offset;
            let line = String::from_utf8_lossy(&self.buffer[consumed..end]).into_owned();
            consumed = end + 1;

            if let Some(frame) = self.process_line(&line) {
                let is_done = frame == Frame::Done;
                frames.push(frame);
                if is_done {
                    self.close();
                    return frames;
                }
            }
        }
        self.buffer.drain(..consumed);

        frames
    }

    /// Flush whatever is buffered when the body ends
    ///
    /// Handles a last frame that lacks its terminating blank line.
    pub fn finish(&mut self) -> Vec<Frame> {
        if self.done {
            return Vec::new();
        }

        let mut frames = Vec::new();
        if !self.buffer.is_empty() {
            let rest = String::from_utf8_lossy(&self.buffer).into_owned();
            self.buffer.clear();
            if let Some(frame) = self.process_line(&rest) {
                frames.push(frame);
            }
        }
        if let Some(frame) = self.take_frame() {
            frames.push(frame);
        }
        if frames.contains(&Frame::Done) {
            self.close();
        }

        frames
    }

    fn process_line(&mut self, line: &str) -> Option<Frame> {
        let line = line.strip_suffix('\r').unwrap_or(line);

        if line.is_empty() {
            return self.take_frame();
        }
        if line.starts_with(':') {
            return None;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        if field == "data" {
            self.data_lines.push(value.to_string());
        }
        None
    }

    fn take_frame(&mut self) -> Option<Frame> {
        if self.data_lines.is_empty() {
            return None;
        }
        let payload = std::mem::take(&mut self.data_lines).join("\n");
        Some(Frame::classify(payload))
    }

    fn close(&mut self) {
        self.done = true;
        self.buffer.clear();
        self.data_lines.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data(s: &str) -> Frame {
        Frame::Data(s.to_string())
    }

    #[test]
    fn test_single_complete_event() {
        let mut decoder = SseDecoder::new();
        let frames = decoder.push(b"data: {\"hello\":\"world\"}\n\n");
        assert_eq!(frames, vec![data("{\"hello\":\"world\"}")]);
    }

    #[test]
    fn test_multiple_events_in_one_chunk() {
        let mut decoder = SseDecoder::new();
        let frames = decoder.push(b"data: {\"a\":1}\n\ndata: {\"b\":2}\n\n");
        assert_eq!(frames, vec![data("{\"a\":1}"), data("{\"b\":2}")]);
    }

    #[test]
    fn test_event_split_across_chunks() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.push(b"data: {\"text\":\"hel").is_empty());
        assert!(decoder.push(b"lo\"}\n").is_empty());
        assert_eq!(decoder.push(b"\n"), vec![data("{\"text\":\"hello\"}")]);
    }

    #[test]
    fn test_multibyte_char_split_across_chunks() {
        let bytes = "data: {\"text\":\"문제\"}\n\n".as_bytes();
        // split inside the first Hangul syllable
        let split = bytes.iter().position(|b| *b >= 0x80).unwrap() + 1;

        let mut decoder = SseDecoder::new();
        assert!(decoder.push(&bytes[..split]).is_empty());
        assert_eq!(
            decoder.push(&bytes[split..]),
            vec![data("{\"text\":\"문제\"}")]
        );
    }

    #[test]
    fn test_crlf_line_endings() {
        let mut decoder = SseDecoder::new();
        let frames = decoder.push(b"data: {\"a\":1}\r\n\r\n");
        assert_eq!(frames, vec![data("{\"a\":1}")]);
    }

    #[test]
    fn test_multi_line_data_joined() {
        let mut decoder = SseDecoder::new();
        let frames = decoder.push(b"data: line one\ndata: line two\n\n");
        assert_eq!(frames, vec![data("line one\nline two")]);
    }

    #[test]
    fn test_non_data_lines_ignored() {
        let mut decoder = SseDecoder::new();
        let frames =
            decoder.push(b": keepalive\nevent: message\nid: 7\ndata: {\"x\":1}\nretry: 10\n\n");
        assert_eq!(frames, vec![data("{\"x\":1}")]);
    }

    #[test]
    fn test_done_and_error_sentinels() {
        let mut decoder = SseDecoder::new();
        let frames = decoder.push(b"data: [ERROR] upstream timeout\n\ndata: [DONE]\n\n");
        assert_eq!(
            frames,
            vec![
                Frame::ErrorLine("[ERROR] upstream timeout".to_string()),
                Frame::Done
            ]
        );
    }

    #[test]
    fn test_nothing_decoded_after_done() {
        let mut decoder = SseDecoder::new();
        let frames = decoder.push(b"data: [DONE]\n\ndata: {\"late\":true}\n\n");
        assert_eq!(frames, vec![Frame::Done]);
        assert!(decoder.is_done());

        assert!(decoder.push(b"data: {\"later\":true}\n\n").is_empty());
        assert!(decoder.finish().is_empty());
    }

    #[test]
    fn test_final_event_without_trailing_newline() {
        let mut decoder = SseDecoder::new();
        assert_eq!(decoder.push(b"data: {\"a\":1}\n\n"), vec![data("{\"a\":1}")]);
        assert!(decoder.push(b"data: {\"b\":2}").is_empty());
        assert_eq!(decoder.finish(), vec![data("{\"b\":2}")]);
        assert!(decoder.finish().is_empty());
    }
}
