//! Decoding of raw transport messages.

use thiserror::Error;

use crate::domain::{AnalyticsEvent, IngestMessage, RawMessage};

#[derive(Debug, Error)]
#[error("Failed to decode {what}: {source}")]
pub struct DecodeError {
    what: &'static str,
    #[source]
    source: serde_json::Error,
}

/// Decode a raw message. Absent or empty input decodes to `None`.
pub fn decode_message(raw: Option<RawMessage>) -> Result<Option<IngestMessage>, DecodeError> {
    let Some(raw) = raw.filter(|r| !r.is_empty()) else {
        return Ok(None);
    };

    let parsed = match raw {
        RawMessage::Structured(value) => serde_json::from_value(value),
        RawMessage::Text(text) => serde_json::from_str(&text),
    };

    parsed.map(Some).map_err(|source| DecodeError {
        what: "ingest message",
        source,
    })
}

/// Decode the event payload carried by a message
pub fn decode_event(payload: serde_json::Value) -> Result<AnalyticsEvent, DecodeError> {
    AnalyticsEvent::from_value(payload).map_err(|source| DecodeError {
        what: "event payload",
        source,
    })
}
