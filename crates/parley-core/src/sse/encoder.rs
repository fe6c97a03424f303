//! SSE event encoding.
//!
//! Produces the exact `text/event-stream` framing:
//!
//! ```text
//! id: <id>
//! event: <type>
//! retry: <ms>
//! data: <line 1>
//! data: <line 2>
//!
//! ```
//!
//! `id` and `event` have raw CR/LF escaped so they cannot break framing.
//! Data is split on `\n` and each physical line gets its own `data:` field.

use std::borrow::Cow;
use std::fmt;
use std::io::{self, Write};

use bytes::Bytes;
use serde::Serialize;

/// Payload of the completion sentinel event.
pub const DONE_MARKER: &str = "[DONE]";

/// Response headers for an SSE transport.
pub const SSE_HEADERS: [(&str, &str); 4] = [
    ("content-type", "text/event-stream"),
    ("cache-control", "no-cache"),
    ("connection", "keep-alive"),
    ("x-accel-buffering", "no"),
];

/// Payload carried by an event.
///
/// Primitives render via their natural text form. Structured values are
/// held as serialized JSON, so an empty object still renders as `{}`.
#[derive(Debug, Clone, PartialEq)]
pub enum EventData {
    Text(String),
    Bytes(Vec<u8>),
    Int(i64),
    UInt(u64),
    Float(f64),
    Bool(bool),
    Json(String),
}

impl EventData {
    /// Serialize any structured value as a JSON payload.
    pub fn json<T: Serialize + ?Sized>(value: &T) -> Result<Self, serde_json::Error> {
        serde_json::to_string(value).map(EventData::Json)
    }

    fn render(&self) -> Cow<'_, str> {
        match self {
            EventData::Text(s) | EventData::Json(s) => Cow::Borrowed(s),
            EventData::Bytes(b) => String::from_utf8_lossy(b),
            EventData::Int(v) => Cow::Owned(v.to_string()),
            EventData::UInt(v) => Cow::Owned(v.to_string()),
            EventData::Float(v) => Cow::Owned(v.to_string()),
            EventData::Bool(v) => Cow::Owned(v.to_string()),
        }
    }
}

impl From<String> for EventData {
    fn from(value: String) -> Self {
        EventData::Text(value)
    }
}

impl From<&str> for EventData {
    fn from(value: &str) -> Self {
        EventData::Text(value.to_string())
    }
}

impl From<Vec<u8>> for EventData {
    fn from(value: Vec<u8>) -> Self {
        EventData::Bytes(value)
    }
}

impl From<Bytes> for EventData {
    fn from(value: Bytes) -> Self {
        EventData::Bytes(value.to_vec())
    }
}

impl From<i64> for EventData {
    fn from(value: i64) -> Self {
        EventData::Int(value)
    }
}

impl From<i32> for EventData {
    fn from(value: i32) -> Self {
        EventData::Int(value.into())
    }
}

impl From<u64> for EventData {
    fn from(value: u64) -> Self {
        EventData::UInt(value)
    }
}

impl From<u32> for EventData {
    fn from(value: u32) -> Self {
        EventData::UInt(value.into())
    }
}

impl From<f64> for EventData {
    fn from(value: f64) -> Self {
        EventData::Float(value)
    }
}

impl From<bool> for EventData {
    fn from(value: bool) -> Self {
        EventData::Bool(value)
    }
}

impl From<serde_json::Value> for EventData {
    fn from(value: serde_json::Value) -> Self {
        EventData::Json(value.to_string())
    }
}

/// One Server-Sent Event.
///
/// Absent fields are not emitted. A `None` payload is the only way to emit
/// an event without `data:` lines.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SseEvent {
    pub id: Option<String>,
    pub event: Option<String>,
    /// Reconnection hint in milliseconds; emitted only when non-zero.
    pub retry: Option<u64>,
    pub data: Option<EventData>,
}

impl SseEvent {
    pub fn new() -> Self {
        Self::default()
    }

    /// A typed event carrying `data`.
    pub fn named(event: impl Into<String>, data: impl Into<EventData>) -> Self {
        Self::new().event(event).data(data)
    }

    /// The data-only `[DONE]` completion sentinel.
    pub fn done() -> Self {
        Self::new().data(DONE_MARKER)
    }

    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn event(mut self, event: impl Into<String>) -> Self {
        self.event = Some(event.into());
        self
    }

    pub fn retry(mut self, millis: u64) -> Self {
        self.retry = Some(millis);
        self
    }

    pub fn data(mut self, data: impl Into<EventData>) -> Self {
        self.data = Some(data.into());
        self
    }

    /// Encode into an owned buffer ready to hand to a transport.
    pub fn to_bytes(&self) -> Bytes {
        Bytes::from(self.to_string())
    }
}

impl fmt::Display for SseEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(id) = self.id.as_deref().filter(|s| !s.is_empty()) {
            writeln!(f, "id: {}", escape_field(id))?;
        }
        if let Some(event) = self.event.as_deref().filter(|s| !s.is_empty()) {
            writeln!(f, "event: {}", escape_field(event))?;
        }
        if let Some(retry) = self.retry.filter(|ms| *ms > 0) {
            writeln!(f, "retry: {retry}")?;
        }
        if let Some(data) = &self.data {
            for line in data.render().split('\n') {
                writeln!(f, "data: {line}")?;
            }
        }
        writeln!(f)
    }
}

/// Write one event to `sink` and flush it immediately.
pub fn encode<W: Write>(event: &SseEvent, sink: &mut W) -> io::Result<()> {
    sink.write_all(event.to_string().as_bytes())?;
    sink.flush()
}

fn escape_field(value: &str) -> Cow<'_, str> {
    if value.contains(['\n', '\r']) {
        Cow::Owned(value.replace('\n', "\\n").replace('\r', "\\r"))
    } else {
        Cow::Borrowed(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    /// Minimal SSE grammar parser: returns (id, event, retry, data lines) per event.
    #[derive(Debug, Default, PartialEq)]
    struct Parsed {
        id: Option<String>,
        event: Option<String>,
        retry: Option<u64>,
        data: Vec<String>,
    }

    fn parse(wire: &str) -> Vec<Parsed> {
        let mut events = Vec::new();
        let mut current = Parsed::default();
        for line in wire.split('\n') {
            if line.is_empty() {
                if current != Parsed::default() {
                    events.push(std::mem::take(&mut current));
                }
                continue;
            }
            let (field, value) = line.split_once(':').unwrap_or((line, ""));
            let value = value.strip_prefix(' ').unwrap_or(value);
            match field {
                "id" => current.id = Some(value.to_string()),
                "event" => current.event = Some(value.to_string()),
                "retry" => current.retry = value.parse().ok(),
                "data" => current.data.push(value.to_string()),
                _ => {}
            }
        }
        events
    }

    #[test]
    fn test_message_event_with_json_payload() {
        let event = SseEvent::named("message", json!({"content": "hi", "delta": "hi"}));
        assert_eq!(
            event.to_string(),
            "event: message\ndata: {\"content\":\"hi\",\"delta\":\"hi\"}\n\n"
        );
    }

    #[test]
    fn test_all_fields_in_order() {
        let event = SseEvent::new().id("42").event("update").retry(3000).data("x");
        assert_eq!(
            event.to_string(),
            "id: 42\nevent: update\nretry: 3000\ndata: x\n\n"
        );
    }

    #[test]
    fn test_empty_fields_are_omitted() {
        let event = SseEvent::new().id("").event("").retry(0).data("x");
        assert_eq!(event.to_string(), "data: x\n\n");
    }

    #[test]
    fn test_no_data_emits_only_terminator() {
        assert_eq!(SseEvent::new().to_string(), "\n");
        assert_eq!(SseEvent::new().event("ping").to_string(), "event: ping\n\n");
    }

    #[test]
    fn test_empty_object_still_emitted() {
        let event = SseEvent::new().data(json!({}));
        assert_eq!(event.to_string(), "data: {}\n\n");
    }

    #[test]
    fn test_multiline_data_split_per_line() {
        let event = SseEvent::new().data("line one\nline two\n");
        assert_eq!(
            event.to_string(),
            "data: line one\ndata: line two\ndata: \n\n"
        );
    }

    #[test]
    fn test_id_and_event_escape_newlines() {
        let event = SseEvent::new().id("a\nb").event("c\rd").data("ok");
        assert_eq!(
            event.to_string(),
            "id: a\\nb\nevent: c\\rd\ndata: ok\n\n"
        );
    }

    #[test]
    fn test_primitive_payloads_render_naturally() {
        assert_eq!(SseEvent::new().data(7i64).to_string(), "data: 7\n\n");
        assert_eq!(SseEvent::new().data(7u32).to_string(), "data: 7\n\n");
        assert_eq!(SseEvent::new().data(1.5f64).to_string(), "data: 1.5\n\n");
        assert_eq!(SseEvent::new().data(true).to_string(), "data: true\n\n");
        assert_eq!(
            SseEvent::new().data(b"raw".to_vec()).to_string(),
            "data: raw\n\n"
        );
    }

    #[test]
    fn test_struct_payload_keeps_field_order() {
        #[derive(Serialize)]
        struct Chunk<'a> {
            message_id: &'a str,
            delta: &'a str,
        }
        let data = EventData::json(&Chunk {
            message_id: "m1",
            delta: "d",
        })
        .unwrap();
        assert_eq!(
            SseEvent::new().data(data).to_string(),
            "data: {\"message_id\":\"m1\",\"delta\":\"d\"}\n\n"
        );
    }

    #[test]
    fn test_done_sentinel() {
        assert_eq!(SseEvent::done().to_string(), "data: [DONE]\n\n");
    }

    #[test]
    fn test_encode_writes_and_flushes() {
        let mut buf: Vec<u8> = Vec::new();
        encode(&SseEvent::named("message", "a"), &mut buf).unwrap();
        encode(&SseEvent::done(), &mut buf).unwrap();
        assert_eq!(
            String::from_utf8(buf).unwrap(),
            "event: message\ndata: a\n\ndata: [DONE]\n\n"
        );
    }

    #[test]
    fn test_roundtrip_through_parser() {
        let events = vec![
            SseEvent::new().id("1").event("message").data("hello\nworld"),
            SseEvent::new().retry(1500).data(json!({"k": [1, 2]})),
            SseEvent::new().event("stopped").data("m-9"),
        ];
        let wire: String = events.iter().map(|e| e.to_string()).collect();
        let parsed = parse(&wire);

        assert_eq!(parsed.len(), 3);
        assert_eq!(parsed[0].id.as_deref(), Some("1"));
        assert_eq!(parsed[0].event.as_deref(), Some("message"));
        assert_eq!(parsed[0].data, vec!["hello", "world"]);
        assert_eq!(parsed[1].retry, Some(1500));
        assert_eq!(parsed[1].data, vec![r#"{"k":[1,2]}"#]);
        assert_eq!(parsed[2].event.as_deref(), Some("stopped"));
        assert_eq!(parsed[2].data, vec!["m-9"]);
    }
}
