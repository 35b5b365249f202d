//! Incremental decoding of `text/event-stream` bodies.

use std::collections::VecDeque;

use argon_core::StreamChunk;
use futures::{Stream, StreamExt, stream};
use serde_json::Value;
use tracing::trace;

use crate::convert::parse_chunk;
use crate::error::GeminiError;

/// Splits a byte stream into server-sent event payloads.
///
/// Only `data` fields are kept; multi-line data is joined with `\n`. Bytes are
/// buffered until a full line is available, so UTF-8 sequences split across
/// network reads decode correctly.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    data: Vec<String>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds `bytes` and returns the payloads of every event they complete.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(bytes);

        let mut events = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            let mut line = String::from_utf8_lossy(&line[..line.len() - 1]).into_owned();
            if line.ends_with('\r') {
                line.pop();
            }
            if let Some(event) = self.process_line(&line) {
                events.push(event);
            }
        }
        events
    }

    /// Flushes a trailing event not terminated by a blank line.
    pub fn finish(&mut self) -> Option<String> {
        if !self.buffer.is_empty() {
            let rest = std::mem::take(&mut self.buffer);
            let line = String::from_utf8_lossy(&rest).into_owned();
            if let Some(event) = self.process_line(line.trim_end_matches('\r')) {
                return Some(event);
            }
        }
        self.dispatch()
    }

    fn process_line(&mut self, line: &str) -> Option<String> {
        if line.is_empty() {
            return self.dispatch();
        }
        if line.starts_with(':') {
            return None;
        }
        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        if field == "data" {
            self.data.push(value.to_string());
        }
        None
    }

    fn dispatch(&mut self) -> Option<String> {
        if self.data.is_empty() {
            return None;
        }
        let payload = self.data.join("\n");
        self.data.clear();
        Some(payload)
    }
}

struct DecodeState<S> {
    body: S,
    decoder: SseDecoder,
    ready: VecDeque<String>,
    done: bool,
}

/// Decodes a streamed `streamGenerateContent` body into chunks.
///
/// The stream ends after the first error.
pub fn decode_chunks<S, B, E>(
    body: S,
) -> impl Stream<Item = Result<StreamChunk, GeminiError>> + Send + 'static
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Into<GeminiError> + Send + 'static,
{
    let state = DecodeState {
        body: Box::pin(body),
        decoder: SseDecoder::new(),
        ready: VecDeque::new(),
        done: false,
    };

    stream::unfold(Some(state), |state| async move {
        let mut state = state?;
        loop {
            if let Some(payload) = state.ready.pop_front() {
                trace!(%payload, "SSE event");
                let parsed = serde_json::from_str::<Value>(&payload)
                    .map_err(GeminiError::from)
                    .and_then(|value| parse_chunk(&value));
                return match parsed {
                    Ok(chunk) => Some((Ok(chunk), Some(state))),
                    Err(e) => Some((Err(e), None)),
                };
            }
            if state.done {
                return None;
            }
            match state.body.next().await {
                Some(Ok(bytes)) => {
                    let events = state.decoder.push(bytes.as_ref());
                    state.ready.extend(events);
                }
                Some(Err(e)) => return Some((Err(e.into()), None)),
                None => {
                    state.done = true;
                    state.ready.extend(state.decoder.finish());
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_events_on_blank_lines() {
        let mut decoder = SseDecoder::new();
        let events = decoder.push(b"data: {\"a\":1}\n\ndata: {\"b\":2}\n\n");
        assert_eq!(events, vec!["{\"a\":1}", "{\"b\":2}"]);
    }

    #[test]
    fn buffers_partial_lines() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.push(b"data: {\"te").is_empty());
        assert!(decoder.push(b"xt\":\"h\"}\r\n").is_empty());
        assert_eq!(decoder.push(b"\r\n"), vec!["{\"text\":\"h\"}"]);
    }

    #[test]
    fn utf8_split_across_reads() {
        let bytes = "data: °C\n\n".as_bytes();
        // Split inside the two-byte degree sign.
        let (head, tail) = bytes.split_at(7);
        let mut decoder = SseDecoder::new();
        assert!(decoder.push(head).is_empty());
        assert_eq!(decoder.push(tail), vec!["°C"]);
    }

    #[test]
    fn ignores_comments_and_other_fields() {
        let mut decoder = SseDecoder::new();
        let events = decoder.push(b": keep-alive\nevent: message\nid: 3\ndata: x\ndata: y\n\n");
        assert_eq!(events, vec!["x\ny"]);
    }

    #[test]
    fn finish_flushes_unterminated_event() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.push(b"data: tail").is_empty());
        assert_eq!(decoder.finish().as_deref(), Some("tail"));
        assert_eq!(decoder.finish(), None);
    }

    type Body = stream::Iter<std::vec::IntoIter<Result<Vec<u8>, GeminiError>>>;

    fn body(parts: &[&str]) -> Body {
        let parts: Vec<Result<Vec<u8>, GeminiError>> =
            parts.iter().map(|p| Ok(p.as_bytes().to_vec())).collect();
        stream::iter(parts)
    }

    #[tokio::test]
    async fn decodes_chunk_stream() {
        let chunks: Vec<_> = decode_chunks(body(&[
            "data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"It's \"}]}}]}\n\n",
            "data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"sunny\"}]},",
            "\"groundingMetadata\":{\"groundingChunks\":[{\"web\":{\"uri\":\"https://a\"}}]}}]}\n\n",
        ]))
        .collect()
        .await;

        assert_eq!(chunks.len(), 2);
        let second = chunks[1].as_ref().unwrap();
        assert_eq!(second.text.as_deref(), Some("sunny"));
        assert_eq!(second.citations, vec!["https://a"]);
    }

    #[tokio::test]
    async fn stops_after_bad_payload() {
        let items: Vec<_> = decode_chunks(body(&["data: not json\n\n", "data: {}\n\n"]))
            .collect()
            .await;
        assert_eq!(items.len(), 1);
        assert!(matches!(items[0], Err(GeminiError::Json(_))));
    }

    #[tokio::test]
    async fn in_band_error_is_reported() {
        let items: Vec<_> = decode_chunks(body(&[
            "data: {\"error\":{\"code\":404,\"message\":\"Requested entity was not found.\"}}\n\n",
        ]))
        .collect()
        .await;
        assert_eq!(items.len(), 1);
        assert!(matches!(items[0], Err(GeminiError::Api { status: 404, .. })));
    }
}
