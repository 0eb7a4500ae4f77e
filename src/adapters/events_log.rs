//! Append-only durable event log with file-based persistence.
//!
//! Entries are stored as newline-delimited JSON (JSONL). Appends take an
//! exclusive lock so several processes can share one log file.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use tokio::fs::{self, File};
use tokio::io::{AsyncBufReadExt, BufReader};
use uuid::Uuid;

use super::EventsLog;

/// A single entry in the event log
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,

    /// Connection the entry belongs to
    pub actor_id: String,

    pub level: LogLevel,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,

    pub message: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl LogEntry {
    pub fn new(actor_id: impl Into<String>, level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            actor_id: actor_id.into(),
            level,
            function_id: None,
            message_id: None,
            message: message.into(),
            data: None,
        }
    }

    pub fn with_function(mut self, function_id: impl Into<String>) -> Self {
        self.function_id = Some(function_id.into());
        self
    }

    pub fn with_message_id(mut self, message_id: impl Into<String>) -> Self {
        self.message_id = Some(message_id.into());
        self
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        };
        f.pad(s)
    }
}

/// JSONL file event log
pub struct FileEventsLog {
    path: PathBuf,
}

impl FileEventsLog {
    /// Open (and create the parent directory of) a log file
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create log directory: {}", parent.display()))?;
        }
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Replay all entries in order
    pub async fn replay(&self) -> Result<Vec<LogEntry>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let file = File::open(&self.path)
            .await
            .with_context(|| format!("Failed to open events log: {}", self.path.display()))?;

        let mut lines = BufReader::new(file).lines();
        let mut entries = Vec::new();

        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }
            let entry: LogEntry = serde_json::from_str(&line)
                .with_context(|| format!("Failed to parse log entry: {}", line))?;
            entries.push(entry);
        }

        Ok(entries)
    }

    /// Entries for one connection, most recent last
    pub async fn entries_for(&self, actor_id: &str) -> Result<Vec<LogEntry>> {
        let entries = self.replay().await?;
        Ok(entries.into_iter().filter(|e| e.actor_id == actor_id).collect())
    }
}

#[async_trait]
impl EventsLog for FileEventsLog {
    async fn append(&self, entry: LogEntry) -> Result<()> {
        let path = self.path.clone();
        let json = serde_json::to_string(&entry).context("Failed to serialize log entry")?;

        tokio::task::spawn_blocking(move || -> Result<()> {
            let mut file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .with_context(|| format!("Failed to open events log: {}", path.display()))?;

            file.lock_exclusive()
                .context("Failed to acquire lock on events log")?;
            writeln!(file, "{}", json).context("Failed to write log entry")?;
            file.flush().context("Failed to flush log entry")?;

            // Lock is released when file is dropped
            Ok(())
        })
        .await
        .context("Events log writer task failed")?
    }
}
