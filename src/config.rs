//! Process configuration for rotor.
//!
//! Configuration sources (highest priority first):
//! 1. Environment variables (ROTOR_DOCUMENT_STORE, FAST_STORE_WORKSPACE_ID, ...)
//! 2. Config file (.rotor/config.yaml)
//! 3. Defaults (~/.rotor)
//!
//! Config file discovery:
//! - Searches current directory and parents for .rotor/config.yaml
//! - Paths in config file are relative to the config file's parent directory

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::adapters::GeoEntry;
use crate::core::DEFAULT_EXECUTION_BUDGET;
use crate::store::{FastPathWorkspaces, DEFAULT_TTL};

pub const ENV_DOCUMENT_STORE: &str = "ROTOR_DOCUMENT_STORE";
pub const ENV_DOCUMENT_STORE_ALIAS: &str = "MONGODB_URL";
pub const ENV_FAST_WORKSPACES: &str = "FAST_STORE_WORKSPACE_ID";
pub const ENV_STORE_TTL: &str = "ROTOR_STORE_TTL_SECONDS";
pub const ENV_EVENTS_LOG: &str = "ROTOR_EVENTS_LOG";
pub const ENV_FETCH_TIMEOUT: &str = "ROTOR_FETCH_TIMEOUT_MS";

/// Raw config file schema (matches YAML structure)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub store: StoreConfig,
    /// Durable event log (relative to .rotor/)
    pub events_log: Option<String>,
    pub fetch_timeout_ms: Option<u64>,
    /// Configuration-store snapshot (relative to .rotor/)
    pub snapshot: Option<String>,
    #[serde(default)]
    pub geo: Vec<GeoEntry>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StoreConfig {
    /// Document store location; SQLite path or `:memory:`
    pub document: Option<String>,
    #[serde(default)]
    pub fast_workspaces: Vec<String>,
    pub ttl_seconds: Option<u64>,
}

/// Resolved configuration
#[derive(Debug, Clone)]
pub struct RotorConfig {
    /// Document store location; `None` selects the TTL store
    pub document_store: Option<String>,
    pub fast_workspaces: FastPathWorkspaces,
    pub store_ttl: Duration,
    pub events_log: PathBuf,
    pub fetch_timeout: Duration,
    pub snapshot: Option<PathBuf>,
    pub geo: Vec<GeoEntry>,
    /// Path to config file (if found)
    pub config_file: Option<PathBuf>,
}

impl RotorConfig {
    /// Load from the process environment and the discovered config file
    pub fn load() -> Result<Self> {
        let config_file = find_config_file();
        Self::load_with(|key| std::env::var(key).ok(), config_file.as_deref())
    }

    /// Load with an explicit variable lookup and config file
    pub fn load_with(lookup: impl Fn(&str) -> Option<String>, config_file: Option<&Path>) -> Result<Self> {
        let env = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let (file, base_dir) = match config_file {
            Some(path) => {
                let file = load_config_file(path)?;
                let base_dir = path.parent().unwrap_or(Path::new(".")).to_path_buf();
                (file, Some(base_dir))
            }
            None => (ConfigFile::default(), None),
        };
        let relative = |p: &str| match &base_dir {
            Some(base) => resolve_path(base, p),
            None => PathBuf::from(p),
        };

        let document_store = env(ENV_DOCUMENT_STORE)
            .or_else(|| env(ENV_DOCUMENT_STORE_ALIAS))
            .or(file.store.document);

        let fast_workspaces = match env(ENV_FAST_WORKSPACES) {
            Some(csv) => FastPathWorkspaces::from_csv(&csv),
            None => file
                .store
                .fast_workspaces
                .iter()
                .map(|w| w.trim())
                .filter(|w| !w.is_empty())
                .collect(),
        };

        let store_ttl = match env(ENV_STORE_TTL) {
            Some(v) => Duration::from_secs(parse_number(ENV_STORE_TTL, &v)?),
            None => file
                .store
                .ttl_seconds
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_TTL),
        };

        let fetch_timeout = match env(ENV_FETCH_TIMEOUT) {
            Some(v) => Duration::from_millis(parse_number(ENV_FETCH_TIMEOUT, &v)?),
            None => file
                .fetch_timeout_ms
                .map(Duration::from_millis)
                .unwrap_or(DEFAULT_EXECUTION_BUDGET),
        };

        let events_log = match (env(ENV_EVENTS_LOG), &file.events_log) {
            (Some(path), _) => PathBuf::from(path),
            (None, Some(path)) => relative(path),
            (None, None) => rotor_home()?.join("events.jsonl"),
        };

        Ok(Self {
            document_store,
            fast_workspaces,
            store_ttl,
            events_log,
            fetch_timeout,
            snapshot: file.snapshot.as_deref().map(relative),
            geo: file.geo,
            config_file: config_file.map(Path::to_path_buf),
        })
    }
}

/// Default state directory (~/.rotor)
pub fn rotor_home() -> Result<PathBuf> {
    Ok(dirs::home_dir()
        .context("Failed to determine home directory")?
        .join(".rotor"))
}

fn parse_number(key: &str, value: &str) -> Result<u64> {
    value
        .trim()
        .parse()
        .with_context(|| format!("{} must be a non-negative integer, got '{}'", key, value))
}

/// Find config file by searching current directory and parents
pub fn find_config_file() -> Option<PathBuf> {
    let mut current = std::env::current_dir().ok()?;

    loop {
        let config_path = current.join(".rotor").join("config.yaml");
        if config_path.exists() {
            return Some(config_path);
        }

        if !current.pop() {
            break;
        }
    }

    None
}

/// Load and parse config file
fn load_config_file(path: &Path) -> Result<ConfigFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Resolve a path that may be relative to the config file's directory
fn resolve_path(base: &Path, path_str: &str) -> PathBuf {
    let path = PathBuf::from(path_str);
    if path.is_absolute() {
        path
    } else {
        base.join(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn env_of(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    fn write_config(temp: &TempDir, content: &str) -> PathBuf {
        let dir = temp.path().join(".rotor");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.yaml");
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_defaults_without_file() {
        let config = RotorConfig::load_with(env_of(&[]), None).unwrap();

        assert!(config.document_store.is_none());
        assert!(config.fast_workspaces.is_empty());
        assert_eq!(config.store_ttl, DEFAULT_TTL);
        assert_eq!(config.fetch_timeout, Duration::from_millis(15_000));
        assert!(config.events_log.ends_with(".rotor/events.jsonl"));
        assert!(config.snapshot.is_none());
    }

    #[test]
    fn test_config_file_parsing() {
        let temp = TempDir::new().unwrap();
        let path = write_config(
            &temp,
            r#"
version: "1"
store:
  document: ":memory:"
  fast_workspaces: [ws-a, " ", ws-b]
  ttl_seconds: 60
events_log: logs/events.jsonl
fetch_timeout_ms: 500
snapshot: snapshot.yaml
geo:
  - prefix: "10."
    geo:
      city: { name: Lisbon }
"#,
        );

        let config = RotorConfig::load_with(env_of(&[]), Some(&path)).unwrap();
        let base = temp.path().join(".rotor");

        assert_eq!(config.document_store.as_deref(), Some(":memory:"));
        assert_eq!(config.fast_workspaces.len(), 2);
        assert!(config.fast_workspaces.contains("ws-b"));
        assert_eq!(config.store_ttl, Duration::from_secs(60));
        assert_eq!(config.fetch_timeout, Duration::from_millis(500));
        assert_eq!(config.events_log, base.join("logs/events.jsonl"));
        assert_eq!(config.snapshot, Some(base.join("snapshot.yaml")));
        assert_eq!(config.geo.len(), 1);
    }

    #[test]
    fn test_env_overrides_file() {
        let temp = TempDir::new().unwrap();
        let path = write_config(&temp, "store:\n  document: file.db\n  fast_workspaces: [ws-a]\n");

        let config = RotorConfig::load_with(
            env_of(&[
                (ENV_DOCUMENT_STORE_ALIAS, "alias.db"),
                (ENV_FAST_WORKSPACES, "ws-x,,ws-y"),
                (ENV_FETCH_TIMEOUT, "250"),
                (ENV_EVENTS_LOG, "/tmp/rotor.jsonl"),
            ]),
            Some(&path),
        )
        .unwrap();

        assert_eq!(config.document_store.as_deref(), Some("alias.db"));
        assert!(!config.fast_workspaces.contains("ws-a"));
        assert_eq!(config.fast_workspaces.len(), 2);
        assert_eq!(config.fetch_timeout, Duration::from_millis(250));
        assert_eq!(config.events_log, PathBuf::from("/tmp/rotor.jsonl"));

        let primary = RotorConfig::load_with(
            env_of(&[(ENV_DOCUMENT_STORE, "primary.db"), (ENV_DOCUMENT_STORE_ALIAS, "alias.db")]),
            None,
        )
        .unwrap();
        assert_eq!(primary.document_store.as_deref(), Some("primary.db"));
    }

    #[test]
    fn test_invalid_number() {
        let err = RotorConfig::load_with(env_of(&[(ENV_STORE_TTL, "soon")]), None).unwrap_err();
        assert!(err.to_string().contains(ENV_STORE_TTL));
    }
}
