use futures_util::StreamExt;
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::api::BackendClient;
use crate::events::BackendEvent;

/// Shown when the stream or request dies without a server-supplied message.
pub const GENERIC_FAILURE: &str =
    "The assistant is unavailable. Check that the backend is running and send again.";

/// Wire shape of one stream line: `{ text?, finish?, buffer?, error? }`.
#[derive(Deserialize)]
struct RawEvent {
    text: Option<String>,
    finish: Option<bool>,
    buffer: Option<String>,
    error: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// Fragment to append to the in-progress reply.
    Text(String),
    /// Terminal: commit the server buffer if present, else the accumulation.
    Finish { buffer: Option<String> },
    /// Terminal: the backend reported a failure mid-turn.
    Error { text: Option<String> },
}

impl StreamEvent {
    /// Decode one line of the stream. Accepts both bare JSON lines and
    /// SSE-framed `data: {...}` lines; blank lines and comments yield None.
    pub fn decode(line: &str) -> Option<Self> {
        let payload = line.trim();
        let payload = payload.strip_prefix("data:").map(str::trim).unwrap_or(payload);
        if payload.is_empty() || !payload.starts_with('{') {
            return None;
        }

        let raw: RawEvent = serde_json::from_str(payload).ok()?;
        if raw.error == Some(true) {
            Some(StreamEvent::Error { text: raw.text })
        } else if raw.finish == Some(true) {
            Some(StreamEvent::Finish { buffer: raw.buffer })
        } else {
            raw.text.map(StreamEvent::Text)
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, StreamEvent::Text(_))
    }
}

/// Per-turn consumer state: the accumulation buffer and a closed flag.
/// Lives on the UI loop; the reader task only ever sends decoded events.
#[derive(Debug, Default)]
pub struct StreamSession {
    buffer: String,
    closed: bool,
}

impl StreamSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Text accumulated so far, rendered as the in-progress reply.
    pub fn buffer(&self) -> &str {
        &self.buffer
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Feed one event. Returns the message to commit when the event is
    /// terminal. Events after close are ignored.
    pub fn apply(&mut self, event: StreamEvent) -> Option<String> {
        if self.closed {
            return None;
        }

        match event {
            StreamEvent::Text(fragment) => {
                self.buffer.push_str(&fragment);
                None
            }
            StreamEvent::Finish { buffer } => {
                self.closed = true;
                let committed = buffer.unwrap_or_else(|| std::mem::take(&mut self.buffer));
                self.buffer.clear();
                Some(committed)
            }
            StreamEvent::Error { text } => {
                self.closed = true;
                self.buffer.clear();
                Some(text.unwrap_or_else(|| GENERIC_FAILURE.to_string()))
            }
        }
    }

    /// The connection dropped without a terminal event. At most one generic
    /// failure message comes out of a session.
    pub fn fail_transport(&mut self) -> Option<String> {
        if self.closed {
            return None;
        }
        self.closed = true;
        self.buffer.clear();
        Some(GENERIC_FAILURE.to_string())
    }
}

/// Read the streaming chat endpoint for one turn, forwarding decoded events
/// tagged with `turn`. Returns after the first terminal event or transport
/// failure; dropping the response closes the connection.
pub fn spawn_stream(
    client: BackendClient,
    message: String,
    turn: u64,
    tx: mpsc::UnboundedSender<BackendEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let response = match client.open_chat_stream(&message).await {
            Ok(response) => response,
            Err(e) => {
                warn!(turn, error = %e, "chat stream failed to open");
                let _ = tx.send(BackendEvent::StreamDropped { turn });
                return;
            }
        };

        let mut body = response.bytes_stream();
        let mut pending = String::new();

        while let Some(item) = body.next().await {
            let chunk = match item {
                Ok(chunk) => chunk,
                Err(e) => {
                    warn!(turn, error = %e, "chat stream dropped mid-turn");
                    let _ = tx.send(BackendEvent::StreamDropped { turn });
                    return;
                }
            };

            pending.push_str(&String::from_utf8_lossy(&chunk));
            while let Some(pos) = pending.find('\n') {
                let line: String = pending.drain(..=pos).collect();
                if let Some(event) = StreamEvent::decode(&line) {
                    let terminal = event.is_terminal();
                    if tx.send(BackendEvent::Stream { turn, event }).is_err() {
                        return;
                    }
                    if terminal {
                        debug!(turn, "chat stream finished");
                        return;
                    }
                }
            }
        }

        // Ended without a newline-terminated terminal event; a final partial
        // line may still carry it.
        if let Some(event) = StreamEvent::decode(&pending) {
            let terminal = event.is_terminal();
            if tx.send(BackendEvent::Stream { turn, event }).is_err() || terminal {
                return;
            }
        }

        let _ = tx.send(BackendEvent::StreamDropped { turn });
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(s: &str) -> StreamEvent {
        StreamEvent::Text(s.to_string())
    }

    #[test]
    fn decodes_fragment_lines() {
        assert_eq!(StreamEvent::decode(r#"{"text":"hi"}"#), Some(text("hi")));
        assert_eq!(
            StreamEvent::decode("data: {\"text\":\"hi\"}\n"),
            Some(text("hi"))
        );
    }

    #[test]
    fn decodes_terminal_lines() {
        assert_eq!(
            StreamEvent::decode(r#"{"finish":true,"buffer":"full"}"#),
            Some(StreamEvent::Finish {
                buffer: Some("full".to_string())
            })
        );
        assert_eq!(
            StreamEvent::decode(r#"{"finish":true}"#),
            Some(StreamEvent::Finish { buffer: None })
        );
        assert_eq!(
            StreamEvent::decode(r#"{"error":true,"text":"boom"}"#),
            Some(StreamEvent::Error {
                text: Some("boom".to_string())
            })
        );
    }

    #[test]
    fn error_flag_wins_over_text_field() {
        // An error event may carry text; it must not decode as a fragment.
        let event = StreamEvent::decode(r#"{"error":true,"text":"X","finish":true}"#);
        assert_eq!(
            event,
            Some(StreamEvent::Error {
                text: Some("X".to_string())
            })
        );
    }

    #[test]
    fn skips_blank_and_malformed_lines() {
        assert_eq!(StreamEvent::decode(""), None);
        assert_eq!(StreamEvent::decode("   "), None);
        assert_eq!(StreamEvent::decode(": keep-alive"), None);
        assert_eq!(StreamEvent::decode("{not json"), None);
        assert_eq!(StreamEvent::decode(r#"{"done":true}"#), None);
    }

    #[test]
    fn fragments_concatenate_in_order() {
        let mut session = StreamSession::new();
        assert_eq!(session.apply(text("a")), None);
        assert_eq!(session.apply(text("b")), None);
        assert_eq!(session.buffer(), "ab");

        let committed = session.apply(StreamEvent::Finish { buffer: None });
        assert_eq!(committed.as_deref(), Some("ab"));
        assert!(session.is_closed());
        assert_eq!(session.buffer(), "");
    }

    #[test]
    fn server_buffer_overrides_accumulated_fragments() {
        let mut session = StreamSession::new();
        session.apply(text("par"));
        session.apply(text("tial"));

        let committed = session.apply(StreamEvent::Finish {
            buffer: Some("full".to_string()),
        });
        assert_eq!(committed.as_deref(), Some("full"));
    }

    #[test]
    fn payload_error_commits_its_message_and_closes() {
        let mut session = StreamSession::new();
        session.apply(text("half"));

        let committed = session.apply(StreamEvent::Error {
            text: Some("X".to_string()),
        });
        assert_eq!(committed.as_deref(), Some("X"));
        assert!(session.is_closed());

        // Nothing from this instance is accepted afterwards.
        assert_eq!(session.apply(text("late")), None);
        assert_eq!(session.buffer(), "");
        assert_eq!(session.apply(StreamEvent::Finish { buffer: None }), None);
    }

    #[test]
    fn payload_error_without_text_uses_generic_message() {
        let mut session = StreamSession::new();
        let committed = session.apply(StreamEvent::Error { text: None });
        assert_eq!(committed.as_deref(), Some(GENERIC_FAILURE));
    }

    #[test]
    fn transport_drop_commits_one_generic_message() {
        let mut session = StreamSession::new();
        session.apply(text("par"));

        assert_eq!(session.fail_transport().as_deref(), Some(GENERIC_FAILURE));
        // A second drop notification adds nothing.
        assert_eq!(session.fail_transport(), None);
    }

    #[test]
    fn transport_drop_after_terminal_event_adds_nothing() {
        let mut session = StreamSession::new();
        session.apply(text("a"));
        let committed = session.apply(StreamEvent::Finish { buffer: None });
        assert_eq!(committed.as_deref(), Some("a"));

        assert_eq!(session.fail_transport(), None);
    }
}
