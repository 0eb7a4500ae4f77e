//! Per-message orchestration.
//!
//! [`Rotor`] holds the process-scoped collaborators and turns one raw
//! message into a chain result:
//! decode → resolve → enrich → select store → assemble system context →
//! run chain → finalize.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, instrument};

use crate::adapters::{
    AnonymousEventsStore, ConfigStore, EventsLog, GeoResolver, MemoryAnonymousEventsStore, Metrics,
};
use crate::domain::{ChainResult, RawMessage, TransportHeaders};
use crate::functions::FunctionRegistry;
use crate::store::{FastPathWorkspaces, MemoryTtlBackend, StoreSelector, DEFAULT_TTL};

use super::chain::{build_function_chain, run_chain, FunctionsFilter};
use super::decoder::{decode_event, decode_message};
use super::enrich::{ContextBuilder, GeoLookup};
use super::error::HandlerError;
use super::finalize::finalize_result;
use super::resolver::{require_enabled, resolve_connection};
use super::system::{metrics_meta, SystemContext};

/// Default execution budget of a chain step
pub const DEFAULT_EXECUTION_BUDGET: Duration = Duration::from_millis(15_000);

/// Per-call options
#[derive(Clone)]
pub struct HandlerOptions {
    /// Delivery attempt number reported by the transport
    pub retries: u32,

    /// Time budget of each chain step
    pub execution_budget: Duration,

    /// Budget for outbound requests made by functions
    pub fetch_timeout: Duration,

    /// Restricts which chain functions run
    pub functions_filter: Option<FunctionsFilter>,
}

impl Default for HandlerOptions {
    fn default() -> Self {
        Self {
            retries: 0,
            execution_budget: DEFAULT_EXECUTION_BUDGET,
            fetch_timeout: DEFAULT_EXECUTION_BUDGET,
            functions_filter: None,
        }
    }
}

impl fmt::Debug for HandlerOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerOptions")
            .field("retries", &self.retries)
            .field("execution_budget", &self.execution_budget)
            .field("fetch_timeout", &self.fetch_timeout)
            .field("functions_filter", &self.functions_filter.is_some())
            .finish()
    }
}

/// Message handler with its process-scoped collaborators
pub struct Rotor {
    anonymous_events_store: Arc<dyn AnonymousEventsStore>,
    selector: StoreSelector,
    events_log: Arc<dyn EventsLog>,
    registry: FunctionRegistry,
    metrics: Option<Arc<dyn Metrics>>,
    context_builder: ContextBuilder,
    geo_failures: AtomicU64,
}

impl Rotor {
    pub fn builder(events_log: Arc<dyn EventsLog>) -> RotorBuilder {
        RotorBuilder::new(events_log)
    }

    /// Number of geo resolutions that failed since startup
    pub fn geo_failures(&self) -> u64 {
        self.geo_failures.load(Ordering::Relaxed)
    }

    pub fn registry(&self) -> &FunctionRegistry {
        &self.registry
    }

    /// Process one message.
    ///
    /// Returns `Ok(None)` for an empty message. A chain failure is returned
    /// as [`HandlerError::Chain`] carrying the result; metrics are recorded
    /// either way.
    #[instrument(skip_all, fields(retries = options.retries))]
    pub async fn handle(
        &self,
        config_store: Option<&dyn ConfigStore>,
        message: Option<RawMessage>,
        headers: &TransportHeaders,
        options: HandlerOptions,
    ) -> Result<Option<ChainResult>, HandlerError> {
        if message.as_ref().map_or(true, RawMessage::is_empty) {
            return Ok(None);
        }

        let config_store = require_enabled(config_store)?;
        let Some(mut message) = decode_message(message)? else {
            return Ok(None);
        };
        let connection = resolve_connection(config_store, &message, headers)?;

        debug!(
            "Processing {} Message ID: {} for: {} ({} → {}({}))",
            message.message_type,
            message.message_id,
            connection.id,
            connection.stream_id,
            connection.destination_id,
            connection.destination_type
        );

        let mut event = decode_event(std::mem::take(&mut message.http_payload))?;
        let enrichment = self
            .context_builder
            .build(&mut event, &message, &connection, options.retries)
            .await;
        if enrichment.geo_lookup == GeoLookup::Failed {
            self.geo_failures.fetch_add(1, Ordering::Relaxed);
        }

        let meta = metrics_meta(&message, &connection, options.retries);
        let store = self.selector.select(&connection.workspace_id);
        let system = Arc::new(SystemContext::assemble(
            Arc::clone(&self.anonymous_events_store),
            meta.clone(),
            Arc::clone(&store),
            Arc::clone(&self.events_log),
        ));

        let chain = build_function_chain(
            &connection,
            config_store,
            &self.registry,
            options.functions_filter.as_ref(),
            options.execution_budget,
        )?;

        let result = run_chain(
            &chain,
            event,
            Arc::clone(&self.events_log),
            store,
            Arc::new(enrichment.context),
            system,
            options.fetch_timeout,
        )
        .await;

        finalize_result(result, &connection.id, &meta, self.metrics.as_deref()).map(Some)
    }
}

/// Builder for [`Rotor`]
pub struct RotorBuilder {
    events_log: Arc<dyn EventsLog>,
    anonymous_events_store: Option<Arc<dyn AnonymousEventsStore>>,
    selector: Option<StoreSelector>,
    registry: Option<FunctionRegistry>,
    metrics: Option<Arc<dyn Metrics>>,
    geo: Option<Arc<dyn GeoResolver>>,
}

impl RotorBuilder {
    pub fn new(events_log: Arc<dyn EventsLog>) -> Self {
        Self {
            events_log,
            anonymous_events_store: None,
            selector: None,
            registry: None,
            metrics: None,
            geo: None,
        }
    }

    pub fn anonymous_events_store(mut self, store: Arc<dyn AnonymousEventsStore>) -> Self {
        self.anonymous_events_store = Some(store);
        self
    }

    pub fn store_selector(mut self, selector: StoreSelector) -> Self {
        self.selector = Some(selector);
        self
    }

    pub fn registry(mut self, registry: FunctionRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn metrics(mut self, metrics: Arc<dyn Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn geo_resolver(mut self, geo: Arc<dyn GeoResolver>) -> Self {
        self.geo = Some(geo);
        self
    }

    /// Unset collaborators default to in-memory implementations and the
    /// built-in function registry.
    pub fn build(self) -> Rotor {
        Rotor {
            anonymous_events_store: self
                .anonymous_events_store
                .unwrap_or_else(|| Arc::new(MemoryAnonymousEventsStore::new())),
            selector: self.selector.unwrap_or_else(|| {
                StoreSelector::new(
                    None,
                    FastPathWorkspaces::default(),
                    Arc::new(MemoryTtlBackend::new()),
                    DEFAULT_TTL,
                )
            }),
            events_log: self.events_log,
            registry: self.registry.unwrap_or_else(FunctionRegistry::with_builtins),
            metrics: self.metrics,
            context_builder: ContextBuilder::new(self.geo),
            geo_failures: AtomicU64::new(0),
        }
    }
}
