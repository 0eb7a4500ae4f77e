//! Document-store backed state.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;

use super::{Store, StoreDescriptor, StoreKind};

/// Stored value with optional expiry
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub value: Value,
    pub expires_at: Option<DateTime<Utc>>,
}

impl Document {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map(|at| at <= now).unwrap_or(false)
    }
}

/// Persistent document storage, namespaced by workspace
#[async_trait]
pub trait DocumentBackend: Send + Sync {
    async fn get(&self, namespace: &str, key: &str) -> Result<Option<Document>>;
    async fn put(&self, namespace: &str, key: &str, document: Document) -> Result<()>;
    async fn delete(&self, namespace: &str, key: &str) -> Result<()>;

    /// Add `by` to an integer document, keeping its expiry
    async fn incr(&self, namespace: &str, key: &str, by: i64) -> Result<i64>;
}

/// SQLite document backend. One connection, serialized behind a mutex and
/// driven from the blocking pool.
pub struct SqliteDocumentBackend {
    conn: Arc<Mutex<Connection>>,
}

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS documents (
    namespace TEXT NOT NULL,
    key TEXT NOT NULL,
    value TEXT NOT NULL,
    expires_at INTEGER,
    PRIMARY KEY (namespace, key)
)";

impl SqliteDocumentBackend {
    /// Open a database file, or an in-memory database for `:memory:`
    pub fn open(location: &str) -> Result<Self> {
        let conn = if location == ":memory:" {
            Connection::open_in_memory()
        } else {
            Connection::open(Path::new(location))
        }
        .with_context(|| format!("Failed to open document store: {}", location))?;

        conn.execute(SCHEMA, [])
            .context("Failed to create documents table")?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn in_memory() -> Result<Self> {
        Self::open(":memory:")
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let guard = conn
                .lock()
                .map_err(|_| anyhow::anyhow!("Document store connection poisoned"))?;
            f(&guard)
        })
        .await
        .context("Document store task failed")?
    }
}

#[async_trait]
impl DocumentBackend for SqliteDocumentBackend {
    async fn get(&self, namespace: &str, key: &str) -> Result<Option<Document>> {
        let (namespace, key) = (namespace.to_string(), key.to_string());
        self.with_conn(move |conn| {
            let row: Option<(String, Option<i64>)> = conn
                .query_row(
                    "SELECT value, expires_at FROM documents WHERE namespace = ?1 AND key = ?2",
                    params![namespace, key],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()
                .context("Failed to read document")?;

            match row {
                None => Ok(None),
                Some((raw, expires_at)) => Ok(Some(Document {
                    value: serde_json::from_str(&raw).context("Corrupt document value")?,
                    expires_at: expires_at.and_then(DateTime::from_timestamp_millis),
                })),
            }
        })
        .await
    }

    async fn put(&self, namespace: &str, key: &str, document: Document) -> Result<()> {
        let (namespace, key) = (namespace.to_string(), key.to_string());
        let raw = serde_json::to_string(&document.value).context("Failed to serialize document")?;
        let expires_at = document.expires_at.map(|at| at.timestamp_millis());
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO documents (namespace, key, value, expires_at) VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(namespace, key) DO UPDATE SET value = excluded.value, expires_at = excluded.expires_at",
                params![namespace, key, raw, expires_at],
            )
            .context("Failed to write document")?;
            Ok(())
        })
        .await
    }

    async fn incr(&self, namespace: &str, key: &str, by: i64) -> Result<i64> {
        let (namespace, key) = (namespace.to_string(), key.to_string());
        self.with_conn(move |conn| {
            let tx = conn
                .unchecked_transaction()
                .context("Failed to begin counter update")?;
            let row: Option<(String, Option<i64>)> = tx
                .query_row(
                    "SELECT value, expires_at FROM documents WHERE namespace = ?1 AND key = ?2",
                    params![namespace, key],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()
                .context("Failed to read document")?;

            let now = Utc::now().timestamp_millis();
            let (current, expires_at) = match row {
                Some((raw, expires_at)) if expires_at.map_or(true, |at| at > now) => {
                    let value: Value =
                        serde_json::from_str(&raw).context("Corrupt document value")?;
                    let current = value
                        .as_i64()
                        .with_context(|| format!("Document {} is not an integer", key))?;
                    (current, expires_at)
                }
                _ => (0, None),
            };
            let next = current.checked_add(by).context("Counter overflow")?;

            tx.execute(
                "INSERT INTO documents (namespace, key, value, expires_at) VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(namespace, key) DO UPDATE SET value = excluded.value, expires_at = excluded.expires_at",
                params![namespace, key, next.to_string(), expires_at],
            )
            .context("Failed to write document")?;
            tx.commit().context("Failed to commit counter update")?;
            Ok(next)
        })
        .await
    }

    async fn delete(&self, namespace: &str, key: &str) -> Result<()> {
        let (namespace, key) = (namespace.to_string(), key.to_string());
        self.with_conn(move |conn| {
            conn.execute(
                "DELETE FROM documents WHERE namespace = ?1 AND key = ?2",
                params![namespace, key],
            )
            .context("Failed to delete document")?;
            Ok(())
        })
        .await
    }
}

/// Process-wide read cache shared by fast-path workspaces.
///
/// Cleared wholesale once `capacity` entries are held.
pub struct LocalCache {
    entries: Mutex<HashMap<(String, String), Document>>,
    capacity: usize,
}

impl LocalCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            capacity,
        }
    }

    fn get(&self, namespace: &str, key: &str) -> Option<Document> {
        let entries = self.entries.lock().unwrap_or_else(|p| p.into_inner());
        entries
            .get(&(namespace.to_string(), key.to_string()))
            .cloned()
    }

    fn put(&self, namespace: &str, key: &str, document: Document) {
        let mut entries = self.entries.lock().unwrap_or_else(|p| p.into_inner());
        if entries.len() >= self.capacity {
            entries.clear();
        }
        entries.insert((namespace.to_string(), key.to_string()), document);
    }

    fn remove(&self, namespace: &str, key: &str) {
        let mut entries = self.entries.lock().unwrap_or_else(|p| p.into_inner());
        entries.remove(&(namespace.to_string(), key.to_string()));
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|p| p.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Workspace-scoped store over a document backend
pub struct DocumentStore {
    workspace_id: String,
    backend: Arc<dyn DocumentBackend>,
    cache: Option<Arc<LocalCache>>,
}

impl DocumentStore {
    pub fn new(
        workspace_id: impl Into<String>,
        backend: Arc<dyn DocumentBackend>,
        cache: Option<Arc<LocalCache>>,
    ) -> Self {
        Self {
            workspace_id: workspace_id.into(),
            backend,
            cache,
        }
    }

    async fn load(&self, key: &str) -> Result<Option<Document>> {
        let now = Utc::now();

        if let Some(cache) = &self.cache {
            if let Some(doc) = cache.get(&self.workspace_id, key) {
                if !doc.is_expired(now) {
                    return Ok(Some(doc));
                }
                cache.remove(&self.workspace_id, key);
            }
        }

        let doc = self
            .backend
            .get(&self.workspace_id, key)
            .await?
            .filter(|d| !d.is_expired(now));

        if let (Some(cache), Some(doc)) = (&self.cache, &doc) {
            cache.put(&self.workspace_id, key, doc.clone());
        }

        Ok(doc)
    }
}

#[async_trait]
impl Store for DocumentStore {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.load(key).await?.map(|d| d.value))
    }

    async fn set(&self, key: &str, value: Value, ttl: Option<Duration>) -> Result<()> {
        let expires_at = match ttl {
            Some(ttl) => Some(
                Utc::now()
                    + chrono::Duration::from_std(ttl).context("TTL out of range")?,
            ),
            None => None,
        };
        let doc = Document { value, expires_at };

        self.backend
            .put(&self.workspace_id, key, doc.clone())
            .await?;
        if let Some(cache) = &self.cache {
            cache.put(&self.workspace_id, key, doc);
        }
        Ok(())
    }

    async fn del(&self, key: &str) -> Result<()> {
        if let Some(cache) = &self.cache {
            cache.remove(&self.workspace_id, key);
        }
        self.backend.delete(&self.workspace_id, key).await
    }

    async fn incr(&self, key: &str, by: i64) -> Result<i64> {
        let next = self.backend.incr(&self.workspace_id, key, by).await?;
        if let Some(cache) = &self.cache {
            cache.remove(&self.workspace_id, key);
        }
        Ok(next)
    }

    async fn ttl(&self, key: &str) -> Result<Option<Duration>> {
        let now = Utc::now();
        Ok(self
            .load(key)
            .await?
            .and_then(|d| d.expires_at)
            .and_then(|at| (at - now).to_std().ok()))
    }

    fn descriptor(&self) -> StoreDescriptor {
        StoreDescriptor {
            kind: StoreKind::Document,
            workspace_id: self.workspace_id.clone(),
            fast: self.cache.is_some(),
        }
    }
}
