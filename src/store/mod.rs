//! Per-workspace state stores available to functions.
//!
//! Two interchangeable implementations exist: a document store (SQLite
//! backed, with an optional process-wide read cache for fast-path
//! workspaces) and a TTL store whose entries always expire. Which one a
//! message gets is decided by [`StoreSelector`], configured once at
//! startup.

pub mod document;
pub mod selector;
pub mod ttl;

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use document::{Document, DocumentBackend, DocumentStore, LocalCache, SqliteDocumentBackend};
pub use selector::{
    DocumentStoreFactory, FastPathWorkspaces, StoreFactory, StoreSelector, TtlStoreFactory,
};
pub use ttl::{MemoryTtlBackend, TtlBackend, TtlStore};

/// Default expiry of TTL store entries (31 days)
pub const DEFAULT_TTL: Duration = Duration::from_secs(60 * 60 * 24 * 31);

/// Key-value state scoped to one workspace
#[async_trait]
pub trait Store: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Value>>;

    /// Store a value. `ttl` of `None` uses the implementation's default.
    async fn set(&self, key: &str, value: Value, ttl: Option<Duration>) -> Result<()>;

    async fn del(&self, key: &str) -> Result<()>;

    /// Atomically add `by` to an integer value and return the new value.
    /// An absent or expired key counts as 0.
    async fn incr(&self, key: &str, by: i64) -> Result<i64>;

    /// Remaining lifetime of a key; `None` if absent or non-expiring
    async fn ttl(&self, key: &str) -> Result<Option<Duration>>;

    fn descriptor(&self) -> StoreDescriptor;
}

/// Which backend serves a store, for logging and tests
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreDescriptor {
    pub kind: StoreKind,
    pub workspace_id: String,

    /// Fast-path workspace (document store with local cache)
    pub fast: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreKind {
    Document,
    Ttl,
}
