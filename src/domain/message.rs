//! Ingestion messages as delivered by the transport layer.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Transport header carrying the connection id. Takes precedence over the
/// id embedded in the message body.
pub const CONNECTION_IDS_HEADER: &str = "connection_ids";

/// Headers attached by the transport (not the original HTTP headers)
pub type TransportHeaders = HashMap<String, String>;

/// Raw inbound message, either already parsed or still serialized
#[derive(Debug, Clone)]
pub enum RawMessage {
    /// Pre-parsed structured value
    Structured(serde_json::Value),

    /// Serialized JSON text
    Text(String),
}

impl RawMessage {
    /// Whether the message carries nothing worth decoding
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Structured(value) => value.is_null(),
            Self::Text(text) => text.trim().is_empty(),
        }
    }
}

impl From<String> for RawMessage {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<&str> for RawMessage {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl From<serde_json::Value> for RawMessage {
    fn from(value: serde_json::Value) -> Self {
        Self::Structured(value)
    }
}

/// Envelope carrying one raw event plus routing metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestMessage {
    /// Message type (e.g. "track", "page", "identify")
    #[serde(rename = "type")]
    pub message_type: String,

    /// Unique id assigned at ingestion
    pub message_id: String,

    /// Connection the message was routed to
    #[serde(default)]
    pub connection_id: String,

    /// How the event reached the ingest endpoint ("browser" or "s2s")
    #[serde(default)]
    pub ingest_type: IngestType,

    /// When the ingest endpoint accepted the message
    #[serde(default)]
    pub message_created: Option<DateTime<Utc>>,

    /// Write key used by the client, if any
    #[serde(default)]
    pub write_key: Option<String>,

    /// Where the request came from
    #[serde(default)]
    pub origin: Origin,

    /// Raw event payload
    pub http_payload: serde_json::Value,

    /// Original request headers
    #[serde(default)]
    pub http_headers: HashMap<String, String>,
}

/// Ingestion channel
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IngestType {
    #[default]
    Browser,
    S2s,
}

/// Origin of the ingest request
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Origin {
    #[serde(default)]
    pub base_url: Option<String>,

    #[serde(default)]
    pub slug: Option<String>,

    #[serde(default)]
    pub source_id: Option<String>,

    #[serde(default)]
    pub domain: Option<String>,
}
