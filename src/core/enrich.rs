//! Enrichment context construction.
//!
//! Geography supplied by the client is trusted as-is. Otherwise the IP is
//! resolved when a resolver is configured. Enrichment problems never fail
//! the message; they only leave fields empty.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::adapters::GeoResolver;
use crate::domain::{
    AnalyticsEvent, ConnectionDescriptor, DestinationDescriptor, EnrichedConnection, EventContext,
    IngestMessage, SourceDescriptor,
};

use super::useragent::parse_user_agent;

/// How the event's geography was obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeoLookup {
    /// Non-empty geo already present on the event
    Supplied,

    /// Resolved from the event's IP
    Resolved,

    /// Resolver had no data for the IP
    NotFound,

    /// Resolver returned an error
    Failed,

    /// No resolver configured or no IP on the event
    Skipped,
}

/// Result of enriching one event
#[derive(Debug, Clone)]
pub struct Enrichment {
    pub context: EventContext,
    pub geo_lookup: GeoLookup,
}

/// Builds the per-event enrichment context
#[derive(Clone, Default)]
pub struct ContextBuilder {
    geo: Option<Arc<dyn GeoResolver>>,
}

impl ContextBuilder {
    pub fn new(geo: Option<Arc<dyn GeoResolver>>) -> Self {
        Self { geo }
    }

    /// Enrich `event` in place and derive its context.
    ///
    /// After this call `event.context` is always present and `context.geo`
    /// holds the geography used for the context (removed when there is none).
    pub async fn build(
        &self,
        event: &mut AnalyticsEvent,
        message: &IngestMessage,
        connection: &EnrichedConnection,
        retries: u32,
    ) -> Enrichment {
        let supplied = event.geo().filter(|g| !g.is_empty());
        let ip = event.ip().map(str::to_string);

        let (geo, geo_lookup) = match (supplied, &self.geo, ip) {
            (Some(geo), _, _) => (Some(geo), GeoLookup::Supplied),
            (None, Some(resolver), Some(ip)) => match resolver.resolve(&ip).await {
                Ok(Some(geo)) => (Some(geo), GeoLookup::Resolved),
                Ok(None) => {
                    debug!(%ip, "No geo data for address");
                    (None, GeoLookup::NotFound)
                }
                Err(e) => {
                    warn!(%ip, error = %e, "Geo resolution failed");
                    (None, GeoLookup::Failed)
                }
            },
            _ => (None, GeoLookup::Skipped),
        };

        event.set_geo(geo.clone());
        let ua = parse_user_agent(event.user_agent());

        let context = EventContext {
            headers: message.http_headers.clone(),
            geo,
            ua,
            retries,
            source: SourceDescriptor {
                ingest_type: message.ingest_type,
                id: connection.stream_id.clone(),
                domain: message.origin.domain.clone(),
            },
            destination: DestinationDescriptor {
                id: connection.destination_id.clone(),
                destination_type: connection.destination_type.clone(),
                updated_at: connection.updated_at,
                hash: connection.credentials_hash.clone(),
            },
            connection: ConnectionDescriptor {
                id: connection.id.clone(),
                options: connection.options.clone(),
            },
        };

        Enrichment {
            context,
            geo_lookup,
        }
    }
}
