//! Per-workspace store selection.
//!
//! The backend strategy is fixed at startup: when a document store is
//! configured every workspace gets a document store (fast-path workspaces
//! with the shared local cache); otherwise every workspace gets a TTL
//! store. Missing document-store configuration is a normal state.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use super::document::{DocumentBackend, DocumentStore, LocalCache};
use super::ttl::{TtlBackend, TtlStore};
use super::Store;

/// Entries held by the fast-path local cache
const LOCAL_CACHE_CAPACITY: usize = 10_000;

/// Workspaces granted the fast-path document store
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FastPathWorkspaces(HashSet<String>);

impl FastPathWorkspaces {
    /// Parse a comma-separated list; empty items are ignored
    pub fn from_csv(csv: &str) -> Self {
        Self(
            csv.split(',')
                .map(str::trim)
                .filter(|id| !id.is_empty())
                .map(str::to_string)
                .collect(),
        )
    }

    pub fn contains(&self, workspace_id: &str) -> bool {
        self.0.contains(workspace_id)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<S: Into<String>> FromIterator<S> for FastPathWorkspaces {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

/// Creates a fresh store for one invocation
pub trait StoreFactory: Send + Sync {
    fn create(&self, workspace_id: &str) -> Arc<dyn Store>;
}

/// Document stores, cached for fast-path workspaces
pub struct DocumentStoreFactory {
    backend: Arc<dyn DocumentBackend>,
    fast_workspaces: FastPathWorkspaces,
    cache: Arc<LocalCache>,
}

impl DocumentStoreFactory {
    pub fn new(backend: Arc<dyn DocumentBackend>, fast_workspaces: FastPathWorkspaces) -> Self {
        Self {
            backend,
            fast_workspaces,
            cache: Arc::new(LocalCache::new(LOCAL_CACHE_CAPACITY)),
        }
    }
}

impl StoreFactory for DocumentStoreFactory {
    fn create(&self, workspace_id: &str) -> Arc<dyn Store> {
        let cache = self
            .fast_workspaces
            .contains(workspace_id)
            .then(|| Arc::clone(&self.cache));
        Arc::new(DocumentStore::new(
            workspace_id,
            Arc::clone(&self.backend),
            cache,
        ))
    }
}

/// TTL stores with a fixed default expiry
pub struct TtlStoreFactory {
    backend: Arc<dyn TtlBackend>,
    ttl: Duration,
}

impl TtlStoreFactory {
    pub fn new(backend: Arc<dyn TtlBackend>, ttl: Duration) -> Self {
        Self { backend, ttl }
    }
}

impl StoreFactory for TtlStoreFactory {
    fn create(&self, workspace_id: &str) -> Arc<dyn Store> {
        Arc::new(TtlStore::new(workspace_id, Arc::clone(&self.backend), self.ttl))
    }
}

/// Strategy chosen once at startup
pub struct StoreSelector {
    factory: Box<dyn StoreFactory>,
}

impl StoreSelector {
    /// Document store when a backend is configured, TTL store otherwise
    pub fn new(
        document_backend: Option<Arc<dyn DocumentBackend>>,
        fast_workspaces: FastPathWorkspaces,
        ttl_backend: Arc<dyn TtlBackend>,
        ttl: Duration,
    ) -> Self {
        let factory: Box<dyn StoreFactory> = match document_backend {
            Some(backend) => Box::new(DocumentStoreFactory::new(backend, fast_workspaces)),
            None => Box::new(TtlStoreFactory::new(ttl_backend, ttl)),
        };
        Self { factory }
    }

    /// Selector over a custom strategy
    pub fn with_factory(factory: impl StoreFactory + 'static) -> Self {
        Self {
            factory: Box::new(factory),
        }
    }

    /// Store for one message of `workspace_id`
    pub fn select(&self, workspace_id: &str) -> Arc<dyn Store> {
        self.factory.create(workspace_id)
    }
}
