//! YAML-backed configuration-store snapshots.
//!
//! A snapshot is an immutable view of connections and function
//! definitions. `ConfigStoreHandle` holds the current snapshot and can
//! swap it when the backing file changes. Callers keep whatever snapshot
//! they obtained for the duration of one message, so a reload never
//! changes configuration mid-message; a slightly stale snapshot is
//! accepted.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{mpsc, Arc, RwLock};
use std::time::Duration;

use anyhow::{Context, Result};
use notify::RecursiveMode;
use notify_debouncer_mini::new_debouncer;
use serde::Deserialize;
use sha2::{Digest, Sha256};

use super::ConfigStore;
use crate::domain::{EnrichedConnection, FunctionConfig};

/// Raw snapshot file schema (matches YAML structure)
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SnapshotFile {
    #[serde(default = "default_enabled")]
    enabled: bool,
    #[serde(default)]
    connections: Vec<EnrichedConnection>,
    #[serde(default)]
    functions: Vec<FunctionConfig>,
}

fn default_enabled() -> bool {
    true
}

/// Immutable configuration snapshot
#[derive(Debug, Clone, Default)]
pub struct ConfigSnapshot {
    enabled: bool,
    connections: HashMap<String, EnrichedConnection>,
    functions: HashMap<(String, String), FunctionConfig>,
}

impl ConfigSnapshot {
    /// Build an enabled snapshot from records
    pub fn new(connections: Vec<EnrichedConnection>, functions: Vec<FunctionConfig>) -> Self {
        let connections = connections
            .into_iter()
            .map(|mut c| {
                if c.credentials_hash.is_empty() {
                    c.credentials_hash = credentials_hash(&c.credentials);
                }
                (c.id.clone(), c)
            })
            .collect();

        let functions = functions
            .into_iter()
            .map(|f| ((f.workspace_id.clone(), f.id.clone()), f))
            .collect();

        Self {
            enabled: true,
            connections,
            functions,
        }
    }

    /// A snapshot that refuses to serve configuration
    pub fn disabled() -> Self {
        Self::default()
    }

    /// Parse a snapshot from YAML content
    pub fn from_yaml(content: &str) -> Result<Self> {
        let file: SnapshotFile =
            serde_yaml::from_str(content).context("Failed to parse configuration snapshot")?;

        let mut snapshot = Self::new(file.connections, file.functions);
        snapshot.enabled = file.enabled;
        Ok(snapshot)
    }

    /// Load a snapshot from a YAML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read configuration snapshot: {}", path.display()))?;

        Self::from_yaml(&content)
    }

    /// All connections, sorted by id
    pub fn connections(&self) -> Vec<&EnrichedConnection> {
        let mut connections: Vec<_> = self.connections.values().collect();
        connections.sort_by(|a, b| a.id.cmp(&b.id));
        connections
    }
}

impl ConfigStore for ConfigSnapshot {
    fn enabled(&self) -> bool {
        self.enabled
    }

    fn enriched_connection(&self, connection_id: &str) -> Option<EnrichedConnection> {
        self.connections.get(connection_id).cloned()
    }

    fn function(&self, workspace_id: &str, function_id: &str) -> Option<FunctionConfig> {
        self.functions
            .get(&(workspace_id.to_string(), function_id.to_string()))
            .cloned()
    }
}

/// Hex SHA-256 of serialized credentials
pub fn credentials_hash(credentials: &serde_json::Value) -> String {
    let mut hasher = Sha256::new();
    hasher.update(credentials.to_string().as_bytes());
    hex::encode(hasher.finalize())
}

/// Holder of the current snapshot
pub struct ConfigStoreHandle {
    path: Option<PathBuf>,
    current: RwLock<Option<Arc<ConfigSnapshot>>>,
}

impl ConfigStoreHandle {
    /// Handle serving a fixed snapshot
    pub fn new(snapshot: ConfigSnapshot) -> Self {
        Self {
            path: None,
            current: RwLock::new(Some(Arc::new(snapshot))),
        }
    }

    /// Handle with no snapshot loaded yet
    pub fn empty() -> Self {
        Self {
            path: None,
            current: RwLock::new(None),
        }
    }

    /// Handle backed by a YAML file, loaded immediately
    pub fn from_file(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let snapshot = ConfigSnapshot::from_file(&path)?;
        Ok(Self {
            path: Some(path),
            current: RwLock::new(Some(Arc::new(snapshot))),
        })
    }

    /// Snapshot to use for the next message
    pub fn current(&self) -> Option<Arc<ConfigSnapshot>> {
        self.current
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Swap in a new snapshot
    pub fn replace(&self, snapshot: ConfigSnapshot) {
        *self
            .current
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(Arc::new(snapshot));
    }

    /// Re-read the backing file. On error the previous snapshot stays.
    pub fn reload(&self) -> Result<()> {
        let path = self
            .path
            .as_ref()
            .context("Configuration store has no backing file")?;
        let snapshot = ConfigSnapshot::from_file(path)?;
        tracing::info!(
            path = %path.display(),
            connections = snapshot.connections.len(),
            "Configuration snapshot reloaded"
        );
        self.replace(snapshot);
        Ok(())
    }

    /// Watch the backing file and reload it on change
    pub fn watch(self: &Arc<Self>) -> Result<ConfigWatchHandle> {
        let path = self
            .path
            .clone()
            .context("Configuration store has no backing file")?;
        let watch_dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));

        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let handle = Arc::clone(self);

        let task = tokio::task::spawn_blocking(move || {
            if let Err(e) = run_watcher(&handle, &path, &watch_dir, stop_rx) {
                tracing::error!("Configuration watcher error: {}", e);
            }
        });

        Ok(ConfigWatchHandle { stop_tx, task })
    }
}

/// Handle to stop a configuration watcher
pub struct ConfigWatchHandle {
    stop_tx: mpsc::Sender<()>,
    task: tokio::task::JoinHandle<()>,
}

impl ConfigWatchHandle {
    pub async fn stop(self) -> Result<()> {
        let _ = self.stop_tx.send(());
        self.task.await?;
        Ok(())
    }
}

fn run_watcher(
    handle: &ConfigStoreHandle,
    path: &Path,
    watch_dir: &Path,
    stop_rx: mpsc::Receiver<()>,
) -> Result<()> {
    let (tx, rx) = mpsc::channel();
    let mut debouncer = new_debouncer(Duration::from_millis(500), tx)?;
    debouncer
        .watcher()
        .watch(watch_dir, RecursiveMode::NonRecursive)?;

    let file_name = path.file_name().map(|n| n.to_os_string());
    tracing::info!("Watching {} for configuration changes", path.display());

    loop {
        if stop_rx.try_recv().is_ok() {
            tracing::info!("Configuration watcher stopping");
            break;
        }

        match rx.recv_timeout(Duration::from_millis(250)) {
            Ok(Ok(events)) => {
                let touched = events
                    .iter()
                    .any(|e| e.path.file_name().map(|n| n.to_os_string()) == file_name);
                if touched {
                    if let Err(e) = handle.reload() {
                        tracing::warn!("Keeping previous configuration snapshot: {:#}", e);
                    }
                }
            }
            Ok(Err(e)) => {
                tracing::warn!("Configuration watcher error: {:?}", e);
            }
            Err(mpsc::RecvTimeoutError::Timeout) => {}
            Err(mpsc::RecvTimeoutError::Disconnected) => {
                tracing::error!("Configuration watcher channel disconnected");
                break;
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const SNAPSHOT_YAML: &str = r#"
connections:
  - id: conn-1
    workspaceId: ws-1
    streamId: stream-1
    destinationId: dest-1
    type: log
    updatedAt: "2024-05-01T10:00:00Z"
    credentials:
      url: https://example.com/hook
    options:
      userRecognition: true
      functions:
        - functionId: udf.enrich
functions:
  - id: enrich
    workspaceId: ws-1
    name: Enrich
"#;

    #[test]
    fn test_snapshot_parsing() {
        let snapshot = ConfigSnapshot::from_yaml(SNAPSHOT_YAML).unwrap();
        assert!(snapshot.enabled());

        let connection = snapshot.enriched_connection("conn-1").unwrap();
        assert_eq!(connection.workspace_id, "ws-1");
        assert_eq!(connection.destination_type, "log");
        assert!(connection.options.user_recognition);
        assert_eq!(connection.options.functions[0].function_id, "udf.enrich");

        assert!(snapshot.function("ws-1", "enrich").is_some());
        assert!(snapshot.function("ws-2", "enrich").is_none());
        assert!(snapshot.enriched_connection("missing").is_none());
    }

    #[test]
    fn test_credentials_hash_filled_in() {
        let snapshot = ConfigSnapshot::from_yaml(SNAPSHOT_YAML).unwrap();
        let connection = snapshot.enriched_connection("conn-1").unwrap();
        assert_eq!(connection.credentials_hash.len(), 64);
        assert_eq!(connection.credentials_hash, credentials_hash(&connection.credentials));
    }

    #[test]
    fn test_disabled_snapshot() {
        let snapshot = ConfigSnapshot::from_yaml("enabled: false\n").unwrap();
        assert!(!snapshot.enabled());
        assert!(!ConfigSnapshot::disabled().enabled());
    }

    #[test]
    fn test_reload_keeps_previous_on_error() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("connections.yaml");
        std::fs::write(&path, SNAPSHOT_YAML).unwrap();

        let handle = ConfigStoreHandle::from_file(&path).unwrap();
        assert!(handle.current().unwrap().enriched_connection("conn-1").is_some());

        std::fs::write(&path, "connections: [not: valid").unwrap();
        assert!(handle.reload().is_err());
        assert!(handle.current().unwrap().enriched_connection("conn-1").is_some());

        std::fs::write(&path, "connections: []\n").unwrap();
        handle.reload().unwrap();
        assert!(handle.current().unwrap().enriched_connection("conn-1").is_none());
    }

    #[test]
    fn test_empty_handle() {
        let handle = ConfigStoreHandle::empty();
        assert!(handle.current().is_none());
        assert!(handle.reload().is_err());
    }
}
