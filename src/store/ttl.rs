//! TTL-bounded cache store.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::Mutex;
use tokio::time::Instant;

use super::{Store, StoreDescriptor, StoreKind};

/// Key-value cache where every key carries an expiry
#[async_trait]
pub trait TtlBackend: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Value>>;
    async fn set_ex(&self, key: &str, value: Value, ttl: Duration) -> Result<()>;
    async fn del(&self, key: &str) -> Result<()>;

    /// Add `by` to an integer key, keeping its expiry; new keys get `ttl`
    async fn incr_by(&self, key: &str, by: i64, ttl: Duration) -> Result<i64>;

    async fn ttl(&self, key: &str) -> Result<Option<Duration>>;
}

/// In-process TTL cache. Expired keys are purged lazily on access.
#[derive(Default)]
pub struct MemoryTtlBackend {
    entries: Mutex<HashMap<String, (Value, Instant)>>,
}

impl MemoryTtlBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TtlBackend for MemoryTtlBackend {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        let mut entries = self.entries.lock().await;
        match entries.get(key) {
            Some((_, expires)) if *expires <= Instant::now() => {
                entries.remove(key);
                Ok(None)
            }
            Some((value, _)) => Ok(Some(value.clone())),
            None => Ok(None),
        }
    }

    async fn set_ex(&self, key: &str, value: Value, ttl: Duration) -> Result<()> {
        let mut entries = self.entries.lock().await;
        entries.insert(key.to_string(), (value, Instant::now() + ttl));
        Ok(())
    }

    async fn del(&self, key: &str) -> Result<()> {
        self.entries.lock().await.remove(key);
        Ok(())
    }

    async fn incr_by(&self, key: &str, by: i64, ttl: Duration) -> Result<i64> {
        let mut entries = self.entries.lock().await;
        let now = Instant::now();
        let (current, expires) = match entries.get(key) {
            Some((value, expires)) if *expires > now => (
                value
                    .as_i64()
                    .with_context(|| format!("Value of {} is not an integer", key))?,
                *expires,
            ),
            _ => (0, now + ttl),
        };
        let next = current.checked_add(by).context("Counter overflow")?;
        entries.insert(key.to_string(), (json!(next), expires));
        Ok(next)
    }

    async fn ttl(&self, key: &str) -> Result<Option<Duration>> {
        let entries = self.entries.lock().await;
        Ok(entries
            .get(key)
            .map(|(_, expires)| expires.saturating_duration_since(Instant::now()))
            .filter(|remaining| !remaining.is_zero()))
    }
}

/// Workspace-scoped store over a TTL backend
pub struct TtlStore {
    workspace_id: String,
    backend: Arc<dyn TtlBackend>,
    default_ttl: Duration,
}

impl TtlStore {
    pub fn new(workspace_id: impl Into<String>, backend: Arc<dyn TtlBackend>, default_ttl: Duration) -> Self {
        Self {
            workspace_id: workspace_id.into(),
            backend,
            default_ttl,
        }
    }

    fn key(&self, key: &str) -> String {
        format!("store:{}:{}", self.workspace_id, key)
    }
}

#[async_trait]
impl Store for TtlStore {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        self.backend.get(&self.key(key)).await
    }

    async fn set(&self, key: &str, value: Value, ttl: Option<Duration>) -> Result<()> {
        self.backend
            .set_ex(&self.key(key), value, ttl.unwrap_or(self.default_ttl))
            .await
    }

    async fn del(&self, key: &str) -> Result<()> {
        self.backend.del(&self.key(key)).await
    }

    async fn incr(&self, key: &str, by: i64) -> Result<i64> {
        self.backend.incr_by(&self.key(key), by, self.default_ttl).await
    }

    async fn ttl(&self, key: &str) -> Result<Option<Duration>> {
        self.backend.ttl(&self.key(key)).await
    }

    fn descriptor(&self) -> StoreDescriptor {
        StoreDescriptor {
            kind: StoreKind::Ttl,
            workspace_id: self.workspace_id.clone(),
            fast: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test(start_paused = true)]
    async fn test_entries_expire() {
        let store = TtlStore::new("ws", Arc::new(MemoryTtlBackend::new()), Duration::from_secs(10));

        store.set("short", json!(1), Some(Duration::from_secs(1))).await.unwrap();
        store.set("default", json!(2), None).await.unwrap();
        assert_eq!(store.ttl("default").await.unwrap(), Some(Duration::from_secs(10)));

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(store.get("short").await.unwrap(), None);
        assert_eq!(store.get("default").await.unwrap(), Some(json!(2)));

        tokio::time::advance(Duration::from_secs(10)).await;
        assert_eq!(store.get("default").await.unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_increments_keep_expiry() {
        let store = Arc::new(TtlStore::new("ws", Arc::new(MemoryTtlBackend::new()), Duration::from_secs(10)));

        let tasks: Vec<_> = (0..20)
            .map(|_| {
                let store = Arc::clone(&store);
                tokio::spawn(async move { store.incr("hits", 1).await })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }
        assert_eq!(store.get("hits").await.unwrap(), Some(json!(20)));

        tokio::time::advance(Duration::from_secs(6)).await;
        assert_eq!(store.incr("hits", 1).await.unwrap(), 21);
        assert_eq!(store.ttl("hits").await.unwrap(), Some(Duration::from_secs(4)));

        tokio::time::advance(Duration::from_secs(5)).await;
        assert_eq!(store.incr("hits", 1).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_keys_are_namespaced() {
        let backend: Arc<dyn TtlBackend> = Arc::new(MemoryTtlBackend::new());
        let a = TtlStore::new("ws-a", Arc::clone(&backend), Duration::from_secs(60));
        let b = TtlStore::new("ws-b", Arc::clone(&backend), Duration::from_secs(60));

        a.set("key", json!("a"), None).await.unwrap();
        assert_eq!(b.get("key").await.unwrap(), None);
        assert_eq!(backend.get("store:ws-a:key").await.unwrap(), Some(json!("a")));

        a.del("key").await.unwrap();
        assert_eq!(a.get("key").await.unwrap(), None);
    }
}
