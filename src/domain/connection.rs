//! Connection records owned by the configuration store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A source/stream paired with a destination, enriched with destination
/// credentials and options. Read-only to the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrichedConnection {
    pub id: String,
    pub workspace_id: String,
    pub stream_id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream_name: Option<String>,

    pub destination_id: String,

    /// Destination type (selects `builtin.destination.<type>`)
    #[serde(rename = "type")]
    pub destination_type: String,

    pub updated_at: DateTime<Utc>,

    #[serde(default)]
    pub credentials: Value,

    #[serde(default)]
    pub credentials_hash: String,

    #[serde(default)]
    pub options: ConnectionOptions,
}

/// Per-connection transform options
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionOptions {
    /// Functions applied before the destination, in order
    #[serde(default)]
    pub functions: Vec<FunctionRef>,

    #[serde(default)]
    pub user_recognition: bool,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Reference to a function in the chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionRef {
    /// `udf.<id>` or `builtin.<kind>.<name>`
    pub function_id: String,
}

/// User function definition as stored in the configuration store
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionConfig {
    pub id: String,
    pub workspace_id: String,

    #[serde(default)]
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}
