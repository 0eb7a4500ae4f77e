//! Privileged context for built-in functions.

use std::fmt;
use std::sync::Arc;

use crate::adapters::{AnonymousEventsStore, EventsLog};
use crate::domain::{EnrichedConnection, IngestMessage, MetricsMeta};
use crate::store::Store;

/// Handles visible to built-in functions only. Never passed to user
/// functions.
pub struct SystemContext {
    /// Process-wide, shared by every message
    pub anonymous_events_store: Arc<dyn AnonymousEventsStore>,
    pub metrics_meta: MetricsMeta,

    /// Store selected for this message's workspace
    pub store: Arc<dyn Store>,
    pub events_store: Arc<dyn EventsLog>,
}

impl SystemContext {
    pub fn assemble(
        anonymous_events_store: Arc<dyn AnonymousEventsStore>,
        metrics_meta: MetricsMeta,
        store: Arc<dyn Store>,
        events_store: Arc<dyn EventsLog>,
    ) -> Self {
        Self {
            anonymous_events_store,
            metrics_meta,
            store,
            events_store,
        }
    }
}

impl fmt::Debug for SystemContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SystemContext")
            .field("metrics_meta", &self.metrics_meta)
            .field("store", &self.store.descriptor())
            .finish_non_exhaustive()
    }
}

/// Correlation keys for one message
pub fn metrics_meta(message: &IngestMessage, connection: &EnrichedConnection, retries: u32) -> MetricsMeta {
    MetricsMeta {
        workspace_id: connection.workspace_id.clone(),
        message_id: message.message_id.clone(),
        stream_id: connection.stream_id.clone(),
        destination_id: connection.destination_id.clone(),
        connection_id: connection.id.clone(),
        retries,
    }
}
