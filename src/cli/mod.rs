//! Command-line interface for rotor.
//!
//! Provides commands for processing single messages, running a stdin
//! message loop, inspecting configured connections and replaying the
//! durable event log.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};

use crate::adapters::{
    ConfigStore, ConfigStoreHandle, FileEventsLog, GeoResolver, TableGeoResolver, TracingMetrics,
};
use crate::config::RotorConfig;
use crate::core::{FunctionsFilter, HandlerError, HandlerOptions, Rotor};
use crate::domain::{RawMessage, TransportHeaders};
use crate::store::{DocumentBackend, MemoryTtlBackend, SqliteDocumentBackend, StoreSelector};

/// rotor - Per-message orchestrator for an event-ingestion pipeline
#[derive(Parser, Debug)]
#[command(name = "rotor")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Configuration-store snapshot (YAML)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Process a single message and print the chain result
    Process {
        /// Message file (JSON)
        #[arg(short, long)]
        message: PathBuf,

        /// Transport header as key=value (repeatable)
        #[arg(long = "header", value_parser = parse_header)]
        headers: Vec<(String, String)>,

        /// Delivery attempt number
        #[arg(short, long, default_value = "0")]
        retries: u32,

        /// Only run functions whose id matches one of these globs
        #[arg(short, long)]
        functions: Vec<String>,

        /// Execution budget per function in milliseconds
        #[arg(long)]
        timeout_ms: Option<u64>,
    },

    /// Process newline-delimited messages from stdin
    Run {
        /// Execution budget per function in milliseconds
        #[arg(long)]
        timeout_ms: Option<u64>,
    },

    /// List connections of the configuration snapshot
    Connections,

    /// Replay the durable event log
    Logs {
        /// Only entries for this connection
        #[arg(short, long)]
        connection: Option<String>,

        /// Maximum number of entries to show (most recent)
        #[arg(short, long, default_value = "50")]
        limit: usize,
    },

    /// Show resolved configuration (debug)
    Config,
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(self) -> Result<()> {
        let config = RotorConfig::load()?;
        let snapshot_path = self.config.or_else(|| config.snapshot.clone());

        match self.command {
            Commands::Process {
                message,
                headers,
                retries,
                functions,
                timeout_ms,
            } => {
                let options = handler_options(&config, retries, &functions, timeout_ms)?;
                process_message(&config, snapshot_path, &message, headers, options).await
            }
            Commands::Run { timeout_ms } => {
                let options = handler_options(&config, 0, &[], timeout_ms)?;
                run_loop(&config, snapshot_path, options).await
            }
            Commands::Connections => list_connections(snapshot_path),
            Commands::Logs { connection, limit } => show_logs(&config, connection, limit).await,
            Commands::Config => {
                show_config(&config, snapshot_path.as_deref());
                Ok(())
            }
        }
    }
}

fn parse_header(s: &str) -> Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{}'", s))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("empty header name in '{}'", s));
    }
    Ok((key.to_string(), value.to_string()))
}

/// Compile glob patterns into a function filter
pub fn glob_filter(patterns: &[String]) -> Result<Option<FunctionsFilter>> {
    if patterns.is_empty() {
        return Ok(None);
    }
    let patterns = patterns
        .iter()
        .map(|p| glob::Pattern::new(p).with_context(|| format!("Invalid function pattern: {}", p)))
        .collect::<Result<Vec<_>>>()?;

    let filter: FunctionsFilter = Arc::new(move |id: &str| patterns.iter().any(|p| p.matches(id)));
    Ok(Some(filter))
}

fn handler_options(
    config: &RotorConfig,
    retries: u32,
    functions: &[String],
    timeout_ms: Option<u64>,
) -> Result<HandlerOptions> {
    let budget = timeout_ms
        .map(Duration::from_millis)
        .unwrap_or(config.fetch_timeout);
    Ok(HandlerOptions {
        retries,
        execution_budget: budget,
        fetch_timeout: config.fetch_timeout,
        functions_filter: glob_filter(functions)?,
    })
}

/// Assemble the handler and its process-scoped collaborators
pub async fn build_rotor(config: &RotorConfig) -> Result<Rotor> {
    let events_log = FileEventsLog::open(&config.events_log).await?;

    let document_backend = match &config.document_store {
        Some(location) => {
            let backend = SqliteDocumentBackend::open(location)
                .with_context(|| format!("Failed to open document store: {}", location))?;
            Some(Arc::new(backend) as Arc<dyn DocumentBackend>)
        }
        None => None,
    };
    let selector = StoreSelector::new(
        document_backend,
        config.fast_workspaces.clone(),
        Arc::new(MemoryTtlBackend::new()),
        config.store_ttl,
    );

    let mut builder = Rotor::builder(Arc::new(events_log))
        .store_selector(selector)
        .metrics(Arc::new(TracingMetrics::new()));
    if !config.geo.is_empty() {
        let geo: Arc<dyn GeoResolver> = Arc::new(TableGeoResolver::new(config.geo.clone()));
        builder = builder.geo_resolver(geo);
    }

    Ok(builder.build())
}

fn open_config_store(snapshot_path: Option<PathBuf>) -> Result<ConfigStoreHandle> {
    match snapshot_path {
        Some(path) => ConfigStoreHandle::from_file(path),
        None => {
            warn!("No configuration snapshot given; messages will be rejected");
            Ok(ConfigStoreHandle::empty())
        }
    }
}

/// Process one message file
async fn process_message(
    config: &RotorConfig,
    snapshot_path: Option<PathBuf>,
    message_path: &Path,
    headers: Vec<(String, String)>,
    options: HandlerOptions,
) -> Result<()> {
    let content = std::fs::read_to_string(message_path)
        .with_context(|| format!("Failed to read message file: {}", message_path.display()))?;

    let store = open_config_store(snapshot_path)?;
    let rotor = build_rotor(config).await?;
    let headers: TransportHeaders = headers.into_iter().collect();

    let snapshot = store.current();
    let outcome = rotor
        .handle(
            snapshot.as_deref().map(|s| s as &dyn ConfigStore),
            Some(RawMessage::Text(content)),
            &headers,
            options,
        )
        .await;

    match outcome {
        Ok(Some(result)) => {
            println!("{}", serde_json::to_string_pretty(&result)?);
            Ok(())
        }
        Ok(None) => {
            eprintln!("[Empty message, nothing to do]");
            Ok(())
        }
        Err(e) => {
            if let Some(result) = e.chain_result() {
                println!("{}", serde_json::to_string_pretty(result)?);
            }
            let retry = if e.is_retryable() { "retryable" } else { "not retryable" };
            anyhow::bail!("{} ({})", e, retry)
        }
    }
}

/// Process newline-delimited messages from stdin until EOF
async fn run_loop(
    config: &RotorConfig,
    snapshot_path: Option<PathBuf>,
    options: HandlerOptions,
) -> Result<()> {
    let store = Arc::new(open_config_store(snapshot_path.clone())?);
    let watcher = match snapshot_path {
        Some(_) => Some(store.watch()?),
        None => None,
    };
    let rotor = build_rotor(config).await?;
    let headers = TransportHeaders::new();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let (mut processed, mut failed) = (0u64, 0u64);

    while let Some(line) = lines.next_line().await? {
        let snapshot = store.current();
        let outcome = rotor
            .handle(
                snapshot.as_deref().map(|s| s as &dyn ConfigStore),
                Some(RawMessage::Text(line)),
                &headers,
                options.clone(),
            )
            .await;

        match outcome {
            Ok(Some(result)) => {
                processed += 1;
                println!("{}", serde_json::to_string(&result)?);
            }
            Ok(None) => {}
            Err(e) => {
                failed += 1;
                report_failure(&e);
            }
        }
    }

    info!(processed, failed, geo_failures = rotor.geo_failures(), "Input exhausted");

    if let Some(watcher) = watcher {
        watcher.stop().await?;
    }
    Ok(())
}

fn report_failure(e: &HandlerError) {
    match e.chain_result() {
        Some(result) => error!(
            connection = %result.connection_id,
            retryable = e.is_retryable(),
            "{}",
            e
        ),
        None => error!(retryable = e.is_retryable(), "{}", e),
    }
}

/// List connections of the snapshot
fn list_connections(snapshot_path: Option<PathBuf>) -> Result<()> {
    let path = snapshot_path.context("No configuration snapshot given (use --config)")?;
    let store = ConfigStoreHandle::from_file(path)?;
    let Some(snapshot) = store.current() else {
        println!("No connections found");
        return Ok(());
    };

    let connections = snapshot.connections();
    if connections.is_empty() {
        println!("No connections found");
        return Ok(());
    }

    println!(
        "{:<24} {:<16} {:<16} {:<16} {:<10}",
        "CONNECTION", "WORKSPACE", "STREAM", "DESTINATION", "TYPE"
    );
    println!("{}", "-".repeat(86));

    for c in connections {
        println!(
            "{:<24} {:<16} {:<16} {:<16} {:<10}",
            c.id, c.workspace_id, c.stream_id, c.destination_id, c.destination_type
        );
    }

    Ok(())
}

/// Replay the event log
async fn show_logs(config: &RotorConfig, connection: Option<String>, limit: usize) -> Result<()> {
    let log = FileEventsLog::open(&config.events_log).await?;
    let entries = match connection {
        Some(id) => log.entries_for(&id).await?,
        None => log.replay().await?,
    };

    if entries.is_empty() {
        println!("No log entries found");
        return Ok(());
    }

    let skip = entries.len().saturating_sub(limit);
    for entry in entries.into_iter().skip(skip) {
        println!(
            "{} {:<5} {:<24} {:<40} {}",
            entry.timestamp.format("%Y-%m-%d %H:%M:%S"),
            entry.level,
            entry.actor_id,
            entry.function_id.as_deref().unwrap_or("-"),
            entry.message
        );
    }

    Ok(())
}

fn show_config(config: &RotorConfig, snapshot_path: Option<&Path>) {
    println!("Rotor Configuration");
    println!("===================");
    println!();

    match &config.config_file {
        Some(path) => println!("Config file: {}", path.display()),
        None => println!("Config file: (none found, using defaults)"),
    }
    match snapshot_path {
        Some(path) => println!("Snapshot:    {}", path.display()),
        None => println!("Snapshot:    (none)"),
    }

    println!();
    println!("Store:");
    match &config.document_store {
        Some(location) => println!("  Document:        {}", location),
        None => println!("  TTL:             {}s", config.store_ttl.as_secs()),
    }
    println!("  Fast workspaces: {}", config.fast_workspaces.len());

    println!();
    println!("Events log:    {}", config.events_log.display());
    println!("Fetch timeout: {}ms", config.fetch_timeout.as_millis());
    println!("Geo entries:   {}", config.geo.len());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_header() {
        assert_eq!(
            parse_header("connection_ids=conn-1").unwrap(),
            ("connection_ids".to_string(), "conn-1".to_string())
        );
        assert_eq!(parse_header("k=a=b").unwrap().1, "a=b");
        assert!(parse_header("novalue").is_err());
        assert!(parse_header("=x").is_err());
    }

    #[test]
    fn test_glob_filter() {
        assert!(glob_filter(&[]).unwrap().is_none());

        let filter = glob_filter(&["udf.*".to_string(), "builtin.destination.log".to_string()])
            .unwrap()
            .unwrap();
        assert!(filter("udf.enrich"));
        assert!(filter("builtin.destination.log"));
        assert!(!filter("builtin.destination.webhook"));

        assert!(glob_filter(&["[".to_string()]).is_err());
    }
}
