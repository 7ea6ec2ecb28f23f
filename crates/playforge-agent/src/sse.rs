//! Server-sent event decoding for streamed chat completions.
//!
//! Bytes arrive in arbitrary slices, so the decoder buffers until a full
//! line is available before interpreting it. Only `data:` lines carry
//! payload; `[DONE]` is the explicit end-of-stream marker.

use futures::{Stream, StreamExt};
use serde::Deserialize;
use std::collections::VecDeque;
use std::fmt::Display;
use std::pin::Pin;
use tracing::{debug, trace};

use crate::{ProviderError, StreamEvent};

const DONE_MARKER: &str = "[DONE]";

#[derive(Debug, Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    #[serde(default)]
    error: Option<StreamErrorBody>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: Option<StreamDelta>,
}

#[derive(Debug, Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamErrorBody {
    #[serde(default)]
    message: Option<String>,
}

/// Incremental SSE line decoder
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a slice of bytes, returning every event completed by it
    pub fn feed(&mut self, bytes: &[u8]) -> Result<Vec<StreamEvent>, ProviderError> {
        self.buffer.extend_from_slice(bytes);

        let mut events = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            if let Some(event) = Self::parse_line(&line)? {
                events.push(event);
            }
        }
        Ok(events)
    }

    /// Flush a trailing line that was not newline-terminated
    pub fn finish(&mut self) -> Result<Vec<StreamEvent>, ProviderError> {
        if self.buffer.is_empty() {
            return Ok(Vec::new());
        }
        let line = std::mem::take(&mut self.buffer);
        Ok(Self::parse_line(&line)?.into_iter().collect())
    }

    fn parse_line(raw: &[u8]) -> Result<Option<StreamEvent>, ProviderError> {
        let line = std::str::from_utf8(raw)
            .map_err(|e| ProviderError::Protocol(format!("Stream is not valid UTF-8: {}", e)))?;
        let line = line.trim_end_matches(['\n', '\r']);

        // Blank lines separate events; ':' lines are keep-alive comments
        if line.is_empty() || line.starts_with(':') {
            return Ok(None);
        }

        let Some(payload) = line.strip_prefix("data:") else {
            trace!(line, "Ignoring non-data SSE field");
            return Ok(None);
        };
        let payload = payload.strip_prefix(' ').unwrap_or(payload);

        if payload.trim() == DONE_MARKER {
            return Ok(Some(StreamEvent::Done));
        }

        let chunk: StreamChunk = serde_json::from_str(payload)
            .map_err(|e| ProviderError::Protocol(format!("Invalid stream chunk: {}", e)))?;

        if let Some(error) = chunk.error {
            return Err(ProviderError::Upstream {
                status: 200,
                message: error
                    .message
                    .unwrap_or_else(|| "Provider reported an error mid-stream".to_string()),
            });
        }

        let text = chunk
            .choices
            .into_iter()
            .filter_map(|c| c.delta.and_then(|d| d.content))
            .collect::<String>();

        if text.is_empty() {
            Ok(None)
        } else {
            Ok(Some(StreamEvent::Delta(text)))
        }
    }
}

struct DecodeState<S> {
    bytes: Pin<Box<S>>,
    decoder: SseDecoder,
    pending: VecDeque<StreamEvent>,
    exhausted: bool,
    finished: bool,
}

/// Turn a raw byte stream into stream events.
///
/// The output ends right after `Done`, after the first error, or when the
/// bytes run out. Running out of bytes without `Done` is left for the
/// consumer to judge.
pub fn decode_event_stream<S, B, E>(
    bytes: S,
) -> impl Stream<Item = Result<StreamEvent, ProviderError>> + Send
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Display + Send + 'static,
{
    let state = DecodeState {
        bytes: Box::pin(bytes),
        decoder: SseDecoder::new(),
        pending: VecDeque::new(),
        exhausted: false,
        finished: false,
    };

    futures::stream::unfold(state, |mut state| async move {
        loop {
            if state.finished {
                return None;
            }

            if let Some(event) = state.pending.pop_front() {
                if event == StreamEvent::Done {
                    debug!("Stream end marker received");
                    state.finished = true;
                }
                return Some((Ok(event), state));
            }

            if state.exhausted {
                return None;
            }

            match state.bytes.next().await {
                Some(Ok(chunk)) => match state.decoder.feed(chunk.as_ref()) {
                    Ok(events) => state.pending.extend(events),
                    Err(e) => {
                        state.finished = true;
                        return Some((Err(e), state));
                    }
                },
                Some(Err(e)) => {
                    state.finished = true;
                    return Some((Err(ProviderError::Transport(e.to_string())), state));
                }
                None => {
                    state.exhausted = true;
                    match state.decoder.finish() {
                        Ok(events) => state.pending.extend(events),
                        Err(e) => {
                            state.finished = true;
                            return Some((Err(e), state));
                        }
                    }
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn delta(text: &str) -> String {
        format!(
            "data: {}\n\n",
            serde_json::json!({"choices": [{"index": 0, "delta": {"content": text}}]})
        )
    }

    #[test]
    fn test_decodes_deltas_and_done() {
        let mut decoder = SseDecoder::new();
        let input = format!("{}{}data: [DONE]\n\n", delta("# Over"), delta("fitting"));
        let events = decoder.feed(input.as_bytes()).unwrap();
        assert_eq!(
            events,
            vec![
                StreamEvent::Delta("# Over".into()),
                StreamEvent::Delta("fitting".into()),
                StreamEvent::Done,
            ]
        );
    }

    #[test]
    fn test_lines_split_across_feeds() {
        let mut decoder = SseDecoder::new();
        let input = delta("<!DOCTYPE html>");
        let (head, tail) = input.split_at(17);
        assert!(decoder.feed(head.as_bytes()).unwrap().is_empty());
        let events = decoder.feed(tail.as_bytes()).unwrap();
        assert_eq!(events, vec![StreamEvent::Delta("<!DOCTYPE html>".into())]);
    }

    #[test]
    fn test_multibyte_character_split_across_feeds() {
        let mut decoder = SseDecoder::new();
        let input = delta("naïve");
        let bytes = input.as_bytes();
        let split = input.find('ï').unwrap() + 1;
        assert!(decoder.feed(&bytes[..split]).unwrap().is_empty());
        let events = decoder.feed(&bytes[split..]).unwrap();
        assert_eq!(events, vec![StreamEvent::Delta("naïve".into())]);
    }

    #[test]
    fn test_ignores_comments_role_chunks_and_crlf() {
        let mut decoder = SseDecoder::new();
        let input = ": keep-alive\r\n\r\ndata: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\r\n\r\nevent: message\r\ndata: [DONE]\r\n";
        let events = decoder.feed(input.as_bytes()).unwrap();
        assert_eq!(events, vec![StreamEvent::Done]);
    }

    #[test]
    fn test_error_chunk_is_upstream_error() {
        let mut decoder = SseDecoder::new();
        let input = "data: {\"error\": {\"message\": \"overloaded\"}}\n";
        let err = decoder.feed(input.as_bytes()).unwrap_err();
        assert!(matches!(err, ProviderError::Upstream { message, .. } if message == "overloaded"));
    }

    #[test]
    fn test_garbage_payload_is_protocol_error() {
        let mut decoder = SseDecoder::new();
        let err = decoder.feed(b"data: {not json\n").unwrap_err();
        assert!(matches!(err, ProviderError::Protocol(_)));
    }

    #[test]
    fn test_finish_flushes_unterminated_line() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.feed(b"data: [DONE]").unwrap().is_empty());
        assert_eq!(decoder.finish().unwrap(), vec![StreamEvent::Done]);
    }

    #[tokio::test]
    async fn test_decode_event_stream_stops_after_done() {
        let parts: Vec<Result<Vec<u8>, std::io::Error>> = vec![
            Ok(delta("a").into_bytes()),
            Ok(b"data: [DONE]\n\n".to_vec()),
            Ok(delta("after").into_bytes()),
        ];
        let events: Vec<_> = decode_event_stream(futures::stream::iter(parts))
            .collect()
            .await;
        assert_eq!(events.len(), 2);
        assert_eq!(events[0], Ok(StreamEvent::Delta("a".into())));
        assert_eq!(events[1], Ok(StreamEvent::Done));
    }

    #[tokio::test]
    async fn test_decode_event_stream_reports_transport_failure() {
        let parts: Vec<Result<Vec<u8>, std::io::Error>> = vec![
            Ok(delta("partial").into_bytes()),
            Err(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                "connection reset",
            )),
        ];
        let events: Vec<_> = decode_event_stream(futures::stream::iter(parts))
            .collect()
            .await;
        assert_eq!(events.len(), 2);
        assert!(matches!(events[1], Err(ProviderError::Transport(_))));
    }

    #[tokio::test]
    async fn test_decode_event_stream_without_done_just_ends() {
        let parts: Vec<Result<Vec<u8>, std::io::Error>> = vec![Ok(delta("only").into_bytes())];
        let events: Vec<_> = decode_event_stream(futures::stream::iter(parts))
            .collect()
            .await;
        assert_eq!(events, vec![Ok(StreamEvent::Delta("only".into()))]);
    }
}
