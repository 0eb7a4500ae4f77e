//! Interfaces to the services surrounding the pipeline.
//!
//! Each collaborator is consumed through a trait so the handler can be
//! driven by fakes in tests. One concrete implementation of each ships
//! with the crate.

pub mod anonymous;
pub mod config_store;
pub mod events_log;
pub mod geo;
pub mod metrics;

use anyhow::Result;
use async_trait::async_trait;

use crate::domain::{AnalyticsEvent, EnrichedConnection, FuncLogEntry, FunctionConfig, Geo, MetricsMeta};

pub use anonymous::MemoryAnonymousEventsStore;
pub use config_store::{credentials_hash, ConfigSnapshot, ConfigStoreHandle, ConfigWatchHandle};
pub use events_log::{FileEventsLog, LogEntry, LogLevel};
pub use geo::{GeoEntry, TableGeoResolver};
pub use metrics::{MetricsTotals, TracingMetrics};

/// Read-only view of connection and function configuration
pub trait ConfigStore: Send + Sync {
    /// Whether the store holds a usable configuration
    fn enabled(&self) -> bool;

    /// Look up a connection by id
    fn enriched_connection(&self, connection_id: &str) -> Option<EnrichedConnection>;

    /// Look up a user function definition within a workspace
    fn function(&self, workspace_id: &str, function_id: &str) -> Option<FunctionConfig>;
}

/// Resolves an IP address to geographic data
#[async_trait]
pub trait GeoResolver: Send + Sync {
    /// `Ok(None)` when the address is not covered by the database
    async fn resolve(&self, ip: &str) -> Result<Option<Geo>>;
}

/// Receives execution logs for metric emission
pub trait Metrics: Send + Sync {
    fn log_metrics(&self, meta: &MetricsMeta, exec_log: &[FuncLogEntry]) -> Result<()>;
}

/// Append-only durable event log
#[async_trait]
pub trait EventsLog: Send + Sync {
    async fn append(&self, entry: LogEntry) -> Result<()>;
}

/// Process-wide store of events seen before a user was identified
#[async_trait]
pub trait AnonymousEventsStore: Send + Sync {
    /// Remember an anonymous event
    async fn add_event(
        &self,
        workspace_id: &str,
        anonymous_id: &str,
        event: &AnalyticsEvent,
    ) -> Result<()>;

    /// Remove and return every event remembered for an anonymous id
    async fn take_events(&self, workspace_id: &str, anonymous_id: &str) -> Result<Vec<AnalyticsEvent>>;
}
