//! Incremental decoder for the agent's reply event stream
//!
//! The wire format is line-oriented SSE: one `event:` line, one or more
//! `data:` lines, records separated by a blank line, comment lines starting
//! with `:`. A malformed record is dropped, never surfaced as an error.

use futures::{Stream, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

/// A typed event decoded from the reply stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// Incremental reply fragment (not cumulative)
    Text {
        /// The text fragment
        chunk: String,
    },

    /// Terminal marker; `full_text` is authoritative when no `Text` events
    /// were received
    Done {
        /// The complete reply text
        full_text: String,
        /// Model that produced the reply, when reported
        model: Option<String>,
    },

    /// Terminal failure; the stream is considered failed
    Error {
        /// Human-readable error message
        message: String,
    },
}

impl StreamEvent {
    /// Whether this event terminates the stream
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Done { .. } | Self::Error { .. })
    }
}

#[derive(Deserialize)]
struct TextPayload {
    chunk: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DonePayload {
    full_text: String,
    #[serde(default)]
    model: Option<String>,
}

#[derive(Deserialize)]
struct ErrorPayload {
    message: String,
}

/// Incremental SSE record decoder.
///
/// Feed one line at a time; a [`StreamEvent`] is produced when a blank line
/// completes a decodable record. After a terminal event the decoder stays
/// silent — at most one terminal event is ever delivered per stream.
#[derive(Debug, Default)]
pub struct SseDecoder {
    event_type: String,
    data: String,
    finished: bool,
}

impl SseDecoder {
    /// Create a new decoder
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a single line (without its trailing newline)
    pub fn feed_line(&mut self, line: &str) -> Option<StreamEvent> {
        if self.finished {
            return None;
        }

        let line = line.strip_suffix('\r').unwrap_or(line);

        if line.is_empty() {
            return self.flush_record();
        }

        if line.starts_with(':') {
            // Comment line
            return None;
        }

        if let Some(value) = line.strip_prefix("event:") {
            self.event_type = value.trim().to_string();
        } else if let Some(value) = line.strip_prefix("data:") {
            self.data.push_str(value.strip_prefix(' ').unwrap_or(value));
        }
        // Other field lines are ignored.

        None
    }

    /// Flush a trailing record when the stream ends without a final blank
    /// line
    pub fn finish(&mut self) -> Option<StreamEvent> {
        if self.finished {
            return None;
        }
        self.flush_record()
    }

    fn flush_record(&mut self) -> Option<StreamEvent> {
        let event_type = std::mem::take(&mut self.event_type);
        let data = std::mem::take(&mut self.data);

        if event_type.is_empty() || data.is_empty() {
            return None;
        }

        let event = match event_type.as_str() {
            "text" => serde_json::from_str::<TextPayload>(&data)
                .map(|p| StreamEvent::Text { chunk: p.chunk }),
            "done" => serde_json::from_str::<DonePayload>(&data).map(|p| StreamEvent::Done {
                full_text: p.full_text,
                model: p.model,
            }),
            "error" => serde_json::from_str::<ErrorPayload>(&data)
                .map(|p| StreamEvent::Error { message: p.message }),
            // The server may push pre-synthesized audio hints; this client
            // performs its own synthesis, so the event is discarded.
            "audio" => return None,
            other => {
                tracing::trace!(event_type = other, "ignoring unknown stream event");
                return None;
            }
        };

        match event {
            Ok(event) => {
                if event.is_terminal() {
                    self.finished = true;
                }
                Some(event)
            }
            Err(e) => {
                tracing::debug!(event_type = %event_type, error = %e, "dropping malformed stream record");
                None
            }
        }
    }
}

/// Decode a raw byte stream (e.g. a response body) into typed events.
///
/// Records split across network chunks and CRLF line endings are handled;
/// a transport error mid-stream ends the event stream.
pub fn decode_stream<S, B, E>(body: S) -> ReceiverStream<StreamEvent>
where
    S: Stream<Item = std::result::Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    let (tx, rx) = mpsc::channel(32);

    tokio::spawn(async move {
        let mut decoder = SseDecoder::new();
        let mut buf: Vec<u8> = Vec::new();
        let mut body = std::pin::pin!(body);

        while let Some(chunk) = body.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(e) => {
                    tracing::warn!(error = %e, "reply stream transport error");
                    break;
                }
            };

            buf.extend_from_slice(chunk.as_ref());

            while let Some(pos) = buf.iter().position(|&b| b == b'\n') {
                let line: Vec<u8> = buf.drain(..=pos).collect();
                let line = String::from_utf8_lossy(&line[..line.len() - 1]);
                if let Some(event) = decoder.feed_line(&line) {
                    if tx.send(event).await.is_err() {
                        return;
                    }
                }
            }
        }

        if !buf.is_empty() {
            let line = String::from_utf8_lossy(&buf);
            if let Some(event) = decoder.feed_line(&line) {
                let _ = tx.send(event).await;
                return;
            }
        }

        if let Some(event) = decoder.finish() {
            let _ = tx.send(event).await;
        }
    });

    ReceiverStream::new(rx)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_all(input: &str) -> Vec<StreamEvent> {
        let mut decoder = SseDecoder::new();
        let mut events: Vec<StreamEvent> = input
            .lines()
            .filter_map(|line| decoder.feed_line(line))
            .collect();
        if let Some(event) = decoder.finish() {
            events.push(event);
        }
        events
    }

    #[test]
    fn test_decode_text_event() {
        let events = decode_all("event: text\ndata: {\"chunk\":\"hi\"}\n\n");
        assert_eq!(
            events,
            vec![StreamEvent::Text {
                chunk: "hi".to_string()
            }]
        );
    }

    #[test]
    fn test_decode_done_event() {
        let events =
            decode_all("event: done\ndata: {\"fullText\":\"all of it\",\"model\":\"m1\"}\n\n");
        assert_eq!(
            events,
            vec![StreamEvent::Done {
                full_text: "all of it".to_string(),
                model: Some("m1".to_string()),
            }]
        );
    }

    #[test]
    fn test_decode_done_without_model() {
        let events = decode_all("event: done\ndata: {\"fullText\":\"reply\"}\n\n");
        assert_eq!(
            events,
            vec![StreamEvent::Done {
                full_text: "reply".to_string(),
                model: None,
            }]
        );
    }

    #[test]
    fn test_unknown_event_type_is_no_event() {
        let events = decode_all("event: bogus\ndata: {}\n\n");
        assert!(events.is_empty());
    }

    #[test]
    fn test_audio_hint_is_ignored_by_design() {
        let events = decode_all("event: audio\ndata: {\"url\":\"http://x/a.mp3\"}\n\n");
        assert!(events.is_empty());
    }

    #[test]
    fn test_malformed_payload_is_dropped() {
        let input = "event: text\ndata: {not json}\n\nevent: text\ndata: {\"chunk\":\"ok\"}\n\n";
        let events = decode_all(input);
        assert_eq!(
            events,
            vec![StreamEvent::Text {
                chunk: "ok".to_string()
            }]
        );
    }

    #[test]
    fn test_comment_lines_ignored() {
        let events = decode_all(": keepalive\nevent: text\n: another comment\ndata: {\"chunk\":\"x\"}\n\n");
        assert_eq!(events.len(), 1);
    }

    #[test]
    fn test_multiple_data_lines_concatenate() {
        let events = decode_all("event: text\ndata: {\"chunk\":\ndata: \"split\"}\n\n");
        assert_eq!(
            events,
            vec![StreamEvent::Text {
                chunk: "split".to_string()
            }]
        );
    }

    #[test]
    fn test_decode_is_idempotent_per_record() {
        let record = "event: text\ndata: {\"chunk\":\"same\"}\n\n";
        assert_eq!(decode_all(record), decode_all(record));
    }

    #[test]
    fn test_nothing_after_terminal_event() {
        let input = "event: done\ndata: {\"fullText\":\"end\"}\n\nevent: text\ndata: {\"chunk\":\"late\"}\n\n";
        let events = decode_all(input);
        assert_eq!(events.len(), 1);
        assert!(events[0].is_terminal());
    }

    #[test]
    fn test_error_event_is_terminal() {
        let events = decode_all("event: error\ndata: {\"message\":\"boom\"}\n\n");
        assert_eq!(
            events,
            vec![StreamEvent::Error {
                message: "boom".to_string()
            }]
        );
    }

    #[test]
    fn test_blank_line_without_record_is_noop() {
        let events = decode_all("\n\nevent: text\ndata: {\"chunk\":\"a\"}\n\n");
        assert_eq!(events.len(), 1);
    }

    #[test]
    fn test_crlf_lines() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.feed_line("event: text\r").is_none());
        assert!(decoder.feed_line("data: {\"chunk\":\"crlf\"}\r").is_none());
        let event = decoder.feed_line("\r").unwrap();
        assert_eq!(
            event,
            StreamEvent::Text {
                chunk: "crlf".to_string()
            }
        );
    }

    #[test]
    fn test_trailing_record_flushed_at_stream_end() {
        // No final blank line; finish() must still deliver the record.
        let events = decode_all("event: done\ndata: {\"fullText\":\"tail\"}");
        assert_eq!(events.len(), 1);
    }

    #[tokio::test]
    async fn test_decode_stream_across_chunk_splits() {
        let chunks: Vec<std::result::Result<&[u8], std::io::Error>> = vec![
            Ok(b"event: te"),
            Ok(b"xt\ndata: {\"chunk\":\"he"),
            Ok(b"llo\"}\n\nevent: done\ndata: {\"fullText\":\"hello\"}\n\n"),
        ];
        let body = futures::stream::iter(chunks);
        let events: Vec<StreamEvent> = decode_stream(body).collect().await;
        assert_eq!(
            events,
            vec![
                StreamEvent::Text {
                    chunk: "hello".to_string()
                },
                StreamEvent::Done {
                    full_text: "hello".to_string(),
                    model: None,
                },
            ]
        );
    }
}
