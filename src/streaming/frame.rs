use crate::error::Result;
use bytes::{Buf, Bytes, BytesMut};
use futures::{Stream, StreamExt};
use std::collections::VecDeque;
use std::pin::Pin;

/// Literal data payload that ends a stream.
pub const DONE_SENTINEL: &str = "[DONE]";

/// One blank-line-terminated block of an SSE stream.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WireEvent {
    /// The `event:` field, if present (last write wins).
    pub event: Option<String>,
    /// All `data:` lines of the block joined with `\n`.
    pub data: String,
    /// The `id:` field; never contains a null character.
    pub id: Option<String>,
}

impl WireEvent {
    /// Whether this event ends the stream (`data: [DONE]` or `event: done`).
    pub fn is_terminal(&self) -> bool {
        self.data == DONE_SENTINEL || self.event.as_deref() == Some("done")
    }
}

/// Incremental SSE parser that buffers partial lines and partial UTF-8
/// code points across chunk boundaries.
pub struct SseFrameParser {
    /// Undecoded tail bytes (an incomplete code point at most)
    pending: BytesMut,
    /// Decoded text not yet terminated by a newline
    text: String,
    event: Option<String>,
    data: Vec<String>,
    id: Option<String>,
    terminated: bool,
}

impl SseFrameParser {
    pub fn new() -> Self {
        Self {
            pending: BytesMut::with_capacity(8),
            text: String::with_capacity(4096),
            event: None,
            data: Vec::new(),
            id: None,
            terminated: false,
        }
    }

    /// Feed raw bytes and return every event completed by them.
    ///
    /// Once a terminal event has been produced the parser ignores further input.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<WireEvent> {
        if self.terminated {
            return Vec::new();
        }

        self.decode(chunk);

        let text = std::mem::take(&mut self.text);
        let mut events = Vec::new();
        let mut start = 0;

        while let Some(offset) = text[start..].find('\n') {
            let end = start + offset;
            let line = &text[start..end];
            start = end + 1;

            let line = line.strip_suffix('\r').unwrap_or(line);
            if let Some(event) = self.process_line(line) {
                let terminal = event.is_terminal();
                events.push(event);
                if terminal {
                    tracing::debug!("SSE stream reached terminal event");
                    self.terminate();
                    return events;
                }
            }
        }

        self.text = text[start..].to_string();
        events
    }

    /// Signal end of input; flushes a trailing block that was not
    /// terminated by a blank line.
    pub fn finish(&mut self) -> Option<WireEvent> {
        if self.terminated {
            return None;
        }

        if !self.pending.is_empty() {
            // A truncated code point at end of input
            self.text.push(char::REPLACEMENT_CHARACTER);
            self.pending.clear();
        }

        let rest = std::mem::take(&mut self.text);
        let rest = rest.strip_suffix('\r').unwrap_or(&rest);
        let mut flushed = None;
        if !rest.is_empty() {
            flushed = self.process_line(rest);
        }
        if flushed.is_none() {
            flushed = self.flush();
        }

        self.terminated = true;
        flushed
    }

    /// Whether the stream has ended, by a terminal event or by [`finish`](Self::finish).
    pub fn is_terminated(&self) -> bool {
        self.terminated
    }

    fn decode(&mut self, chunk: &[u8]) {
        self.pending.extend_from_slice(chunk);

        loop {
            match std::str::from_utf8(&self.pending) {
                Ok(s) => {
                    self.text.push_str(s);
                    self.pending.clear();
                    return;
                }
                Err(e) => {
                    let valid = e.valid_up_to();
                    self.text
                        .push_str(&String::from_utf8_lossy(&self.pending[..valid]));
                    match e.error_len() {
                        Some(invalid) => {
                            self.text.push(char::REPLACEMENT_CHARACTER);
                            self.pending.advance(valid + invalid);
                        }
                        None => {
                            // Incomplete sequence, wait for the next chunk
                            self.pending.advance(valid);
                            return;
                        }
                    }
                }
            }
        }
    }

    fn process_line(&mut self, line: &str) -> Option<WireEvent> {
        if line.is_empty() {
            return self.flush();
        }

        if line.starts_with(':') {
            return None;
        }

        let (field, value) = match line.find(':') {
            Some(idx) => (&line[..idx], &line[idx + 1..]),
            None => (line, ""),
        };
        let value = value.strip_prefix(' ').unwrap_or(value);

        match field {
            "event" => self.event = Some(value.to_string()),
            "data" => self.data.push(value.to_string()),
            "id" => {
                if !value.contains('\0') {
                    self.id = Some(value.to_string());
                }
            }
            // Reconnection delay has no meaning without reconnects
            "retry" => {}
            _ => {}
        }

        None
    }

    fn flush(&mut self) -> Option<WireEvent> {
        if self.event.is_none() && self.data.is_empty() && self.id.is_none() {
            return None;
        }

        Some(WireEvent {
            event: self.event.take(),
            data: std::mem::take(&mut self.data).join("\n"),
            id: self.id.take(),
        })
    }

    fn terminate(&mut self) {
        self.terminated = true;
        self.pending.clear();
        self.text.clear();
        self.event = None;
        self.data.clear();
        self.id = None;
    }
}

impl Default for SseFrameParser {
    fn default() -> Self {
        Self::new()
    }
}

struct FrameState<S> {
    source: Pin<Box<S>>,
    parser: SseFrameParser,
    ready: VecDeque<WireEvent>,
    failed: bool,
}

/// Lazily parse a byte stream into wire events.
///
/// The sequence ends after a terminal event, at end of input, or after the
/// first read error (which is yielded once).
pub fn frames<S>(source: S) -> impl Stream<Item = Result<WireEvent>> + Send
where
    S: Stream<Item = Result<Bytes>> + Send,
{
    let state = FrameState {
        source: Box::pin(source),
        parser: SseFrameParser::new(),
        ready: VecDeque::new(),
        failed: false,
    };

    futures::stream::unfold(state, |mut state| async move {
        loop {
            if let Some(event) = state.ready.pop_front() {
                return Some((Ok(event), state));
            }
            if state.failed || state.parser.is_terminated() {
                return None;
            }

            match state.source.next().await {
                Some(Ok(chunk)) => state.ready.extend(state.parser.feed(&chunk)),
                Some(Err(e)) => {
                    state.failed = true;
                    return Some((Err(e), state));
                }
                None => state.ready.extend(state.parser.finish()),
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AssistError;

    fn parse_all(chunks: &[&[u8]]) -> Vec<WireEvent> {
        let mut parser = SseFrameParser::new();
        let mut events = Vec::new();
        for chunk in chunks {
            events.extend(parser.feed(chunk));
        }
        events.extend(parser.finish());
        events
    }

    #[test]
    fn test_basic_events() {
        let events = parse_all(&[b"data: hello\n\ndata: world\n\n"]);
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].data, "hello");
        assert_eq!(events[1].data, "world");
        assert!(events[0].event.is_none());
    }

    #[test]
    fn test_event_and_id_fields() {
        let events = parse_all(&[b"event: message\nid: 42\ndata: {\"a\":1}\n\n"]);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event.as_deref(), Some("message"));
        assert_eq!(events[0].id.as_deref(), Some("42"));
        assert_eq!(events[0].data, "{\"a\":1}");
    }

    #[test]
    fn test_event_name_last_write_wins() {
        let events = parse_all(&[b"event: a\nevent: b\ndata: x\n\n"]);
        assert_eq!(events[0].event.as_deref(), Some("b"));
    }

    #[test]
    fn test_multiline_data_joined() {
        let events = parse_all(&[b"data: line1\ndata: line2\ndata:line3\n\n"]);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data, "line1\nline2\nline3");
    }

    #[test]
    fn test_comments_ignored() {
        let events = parse_all(&[b": keep-alive\n\n:another\ndata: x\n\n"]);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data, "x");
    }

    #[test]
    fn test_id_with_null_discarded() {
        let events = parse_all(&[b"id: bad\0id\ndata: x\n\n"]);
        assert_eq!(events.len(), 1);
        assert!(events[0].id.is_none());
    }

    #[test]
    fn test_retry_and_unknown_fields_ignored() {
        let events = parse_all(&[b"retry: 3000\nfoo: bar\ndata: x\n\n"]);
        assert_eq!(events.len(), 1);
        assert_eq!(
            events[0],
            WireEvent {
                event: None,
                data: "x".to_string(),
                id: None
            }
        );
    }

    #[test]
    fn test_line_without_colon_is_field_with_empty_value() {
        let events = parse_all(&[b"data\n\n"]);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data, "");
    }

    #[test]
    fn test_only_one_leading_space_stripped() {
        let events = parse_all(&[b"data:   indented\n\n"]);
        assert_eq!(events[0].data, "  indented");
    }

    #[test]
    fn test_crlf_line_endings() {
        let events = parse_all(&[b"event: x\r\ndata: y\r\n\r\n"]);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event.as_deref(), Some("x"));
        assert_eq!(events[0].data, "y");
    }

    #[test]
    fn test_consecutive_blank_lines_yield_nothing() {
        let events = parse_all(&[b"\n\n\ndata: x\n\n\n\n"]);
        assert_eq!(events.len(), 1);
    }

    #[test]
    fn test_split_line_across_chunks() {
        let mut parser = SseFrameParser::new();
        assert!(parser.feed(b"data: hel").is_empty());
        let events = parser.feed(b"lo\n\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data, "hello");
    }

    #[test]
    fn test_multibyte_char_split_across_chunks() {
        let bytes = "data: héllo 🦀\n\n".as_bytes();
        // Split inside the 4-byte crab
        let crab = bytes.len() - 4;
        let events = parse_all(&[&bytes[..crab], &bytes[crab..]]);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data, "héllo 🦀");

        // Split inside the 2-byte é
        let events = parse_all(&[&bytes[..8], &bytes[8..]]);
        assert_eq!(events[0].data, "héllo 🦀");
    }

    #[test]
    fn test_invalid_utf8_replaced_not_fatal() {
        let events = parse_all(&[b"data: a\xffb\n\n"]);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data, "a\u{FFFD}b");
    }

    #[test]
    fn test_trailing_block_flushed_on_finish() {
        let events = parse_all(&[b"data: one\n\ndata: two"]);
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].data, "two");

        let events = parse_all(&[b"data: one\n\ndata: two\n"]);
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].data, "two");
    }

    #[test]
    fn test_done_sentinel_terminates() {
        let mut parser = SseFrameParser::new();
        let events = parser.feed(b"data: a\n\ndata: [DONE]\n\ndata: after\n\n");
        assert_eq!(events.len(), 2);
        assert!(events[1].is_terminal());
        assert!(parser.is_terminated());
        assert!(parser.feed(b"data: later\n\n").is_empty());
        assert!(parser.finish().is_none());
    }

    #[test]
    fn test_done_event_name_terminates() {
        let mut parser = SseFrameParser::new();
        let events = parser.feed(b"event: done\ndata: {}\n\ndata: after\n\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event.as_deref(), Some("done"));
        assert!(parser.is_terminated());
    }

    #[tokio::test]
    async fn test_frames_stream_adapter() {
        let chunks: Vec<Result<Bytes>> = vec![
            Ok(Bytes::from_static(b"data: a\n")),
            Ok(Bytes::from_static(b"\ndata: b")),
        ];
        let events: Vec<_> = frames(futures::stream::iter(chunks)).collect().await;
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].as_ref().unwrap().data, "a");
        assert_eq!(events[1].as_ref().unwrap().data, "b");
    }

    #[tokio::test]
    async fn test_frames_stops_after_terminal() {
        let chunks: Vec<Result<Bytes>> = vec![
            Ok(Bytes::from_static(b"data: [DONE]\n\n")),
            Err(AssistError::Transport("should never be read".to_string())),
        ];
        let events: Vec<_> = frames(futures::stream::iter(chunks)).collect().await;
        assert_eq!(events.len(), 1);
        assert!(events[0].is_ok());
    }

    #[tokio::test]
    async fn test_frames_yields_read_error_once() {
        let chunks: Vec<Result<Bytes>> = vec![
            Ok(Bytes::from_static(b"data: a\n\n")),
            Err(AssistError::Transport("connection reset".to_string())),
            Ok(Bytes::from_static(b"data: b\n\n")),
        ];
        let events: Vec<_> = frames(futures::stream::iter(chunks)).collect().await;
        assert_eq!(events.len(), 2);
        assert!(events[0].is_ok());
        assert!(matches!(events[1], Err(AssistError::Transport(_))));
    }
}
