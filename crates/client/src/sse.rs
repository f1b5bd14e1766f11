//! Server-Sent Events decoder and snapshot payload parser.
//!
//! [`SseDecoder`] turns raw body bytes into [`SseEvent`]s following
//! the `text/event-stream` rules: LF, CRLF or CR line endings,
//! `:` comment lines, multi-line `data:` joined with `\n`, and dispatch
//! on a blank line. Chunk boundaries may fall anywhere, including
//! between a CR and its LF.
//!
//! [`parse_snapshot`] decodes an event's data into a
//! [`StatusSnapshot`]. Failures are [`MalformedMessage`]s, which the
//! stream subscriber discards.

use audiogen_core::status::StatusSnapshot;

/// Event type used when a frame has no `event:` field.
pub const DEFAULT_EVENT_TYPE: &str = "message";

/// Event types whose data carries a status snapshot.
pub const SNAPSHOT_EVENT_TYPES: [&str; 2] = [DEFAULT_EVENT_TYPE, "progress"];

/// One dispatched Server-Sent Event.
///
/// `id` and `retry` are part of the event-stream format and are decoded
/// so frames compare whole in tests. The tracker never reconnects a
/// stream, so they only show up in stream diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseEvent {
    /// The `event:` field, or `"message"` when absent.
    pub event: String,
    /// All `data:` lines joined with `\n`.
    pub data: String,
    /// Last event ID seen on the stream, if any.
    pub id: Option<String>,
    /// Reconnection delay requested by the server, in milliseconds.
    pub retry: Option<u64>,
}

impl SseEvent {
    /// Whether this event type carries a status snapshot.
    pub fn carries_snapshot(&self) -> bool {
        SNAPSHOT_EVENT_TYPES.contains(&self.event.as_str())
    }
}

/// Incremental `text/event-stream` decoder.
#[derive(Debug, Default)]
pub struct SseDecoder {
    line: Vec<u8>,
    /// A CR just ended a line; swallow an immediately following LF.
    skip_lf: bool,
    seen_first_line: bool,
    event_type: Option<String>,
    data: Option<String>,
    last_id: Option<String>,
    retry: Option<u64>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk of body bytes, returning every event it completes.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        let mut events = Vec::new();
        for &byte in chunk {
            if self.skip_lf {
                self.skip_lf = false;
                if byte == b'\n' {
                    continue;
                }
            }
            match byte {
                b'\n' => self.end_line(&mut events),
                b'\r' => {
                    self.end_line(&mut events);
                    self.skip_lf = true;
                }
                _ => self.line.push(byte),
            }
        }
        events
    }

    fn end_line(&mut self, events: &mut Vec<SseEvent>) {
        let raw = std::mem::take(&mut self.line);
        let decoded = String::from_utf8_lossy(&raw);
        let mut line: &str = &decoded;
        if !self.seen_first_line {
            self.seen_first_line = true;
            line = line.strip_prefix('\u{feff}').unwrap_or(line);
        }
        if let Some(event) = self.process_line(line) {
            events.push(event);
        }
    }

    fn process_line(&mut self, line: &str) -> Option<SseEvent> {
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

        match field {
            "event" => self.event_type = Some(value.to_string()),
            "data" => match self.data.as_mut() {
                Some(data) => {
                    data.push('\n');
                    data.push_str(value);
                }
                None => self.data = Some(value.to_string()),
            },
            "id" if !value.contains('\0') => self.last_id = Some(value.to_string()),
            "retry" => {
                if let Ok(ms) = value.parse::<u64>() {
                    self.retry = Some(ms);
                }
            }
            _ => {}
        }
        None
    }

    fn dispatch(&mut self) -> Option<SseEvent> {
        let event_type = self.event_type.take();
        let data = self.data.take()?;
        Some(SseEvent {
            event: event_type
                .filter(|t| !t.is_empty())
                .unwrap_or_else(|| DEFAULT_EVENT_TYPE.to_string()),
            data,
            id: self.last_id.clone(),
            retry: self.retry,
        })
    }
}

/// A push payload that could not be used as a snapshot.
#[derive(Debug, thiserror::Error)]
pub enum MalformedMessage {
    /// Empty or whitespace-only data, typically a keepalive.
    #[error("empty payload")]
    Empty,

    /// Data that is not a valid snapshot document.
    #[error("invalid snapshot JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Decode an event's data into a [`StatusSnapshot`].
pub fn parse_snapshot(data: &str) -> Result<StatusSnapshot, MalformedMessage> {
    if data.trim().is_empty() {
        return Err(MalformedMessage::Empty);
    }
    Ok(StatusSnapshot::from_json(data)?)
}
