//! Derived per-event context handed to functions.
//!
//! Built fresh for every message and never persisted.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::connection::ConnectionOptions;
use super::event::Geo;
use super::message::IngestType;

/// Read-only enrichment context visible to every function in the chain
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventContext {
    /// Original request headers
    pub headers: HashMap<String, String>,

    /// Resolved or client-supplied geography
    pub geo: Option<Geo>,

    /// Parsed user agent (empty when absent or unparsable)
    pub ua: UserAgent,

    /// Delivery attempt number, 0 for the first attempt
    pub retries: u32,

    pub source: SourceDescriptor,
    pub destination: DestinationDescriptor,
    pub connection: ConnectionDescriptor,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceDescriptor {
    #[serde(rename = "type")]
    pub ingest_type: IngestType,
    pub id: String,
    pub domain: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DestinationDescriptor {
    pub id: String,
    #[serde(rename = "type")]
    pub destination_type: String,
    pub updated_at: DateTime<Utc>,
    pub hash: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionDescriptor {
    pub id: String,
    pub options: ConnectionOptions,
}

/// Parsed user agent. Every field is best effort.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserAgent {
    pub browser: NameVersion,
    pub os: NameVersion,
    pub device: Device,
    pub bot: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NameVersion {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub device_type: Option<DeviceType>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceType {
    Desktop,
    Mobile,
    Tablet,
}

/// Correlation keys for metrics emission
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsMeta {
    pub workspace_id: String,
    pub message_id: String,
    pub stream_id: String,
    pub destination_id: String,
    pub connection_id: String,
    pub retries: u32,
}
