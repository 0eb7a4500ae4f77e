//! Connection resolution against the configuration store.

use crate::adapters::ConfigStore;
use crate::domain::{EnrichedConnection, IngestMessage, TransportHeaders, CONNECTION_IDS_HEADER};

use super::error::HandlerError;

/// Fail unless a usable configuration store was supplied
pub fn require_enabled(store: Option<&dyn ConfigStore>) -> Result<&dyn ConfigStore, HandlerError> {
    match store {
        Some(store) if store.enabled() => Ok(store),
        _ => Err(HandlerError::ConfigUnavailable),
    }
}

/// Connection id for a message. The transport header wins over the body.
pub fn connection_id(message: &IngestMessage, headers: &TransportHeaders) -> Option<String> {
    headers
        .get(CONNECTION_IDS_HEADER)
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .or_else(|| Some(message.connection_id.trim()).filter(|v| !v.is_empty()))
        .map(str::to_string)
}

/// Look up the enriched connection a message is routed to
pub fn resolve_connection(
    store: &dyn ConfigStore,
    message: &IngestMessage,
    headers: &TransportHeaders,
) -> Result<EnrichedConnection, HandlerError> {
    let id = connection_id(message, headers).ok_or(HandlerError::MissingConnectionId)?;
    store
        .enriched_connection(&id)
        .ok_or(HandlerError::UnknownConnection(id))
}
