//! rotor - Per-message orchestrator for an event-ingestion pipeline
//!
//! Takes one raw ingest message, resolves the connection it is routed to,
//! enriches the event, and runs the connection's function chain against a
//! per-workspace state store.
//!
//! # Architecture
//!
//! Each message flows through fixed stages:
//! - decode the transport message and its event payload
//! - resolve the connection (transport header wins over the body)
//! - build the enrichment context (geo, user agent, descriptors)
//! - select the workspace store and assemble the system context
//! - run the function chain, each step bounded by a time budget
//! - finalize: stamp the connection id, forward metrics, classify failures
//!
//! # Modules
//!
//! - `adapters`: Collaborator traits and their implementations
//! - `core`: Orchestration logic (decoder, resolver, chain, handler)
//! - `domain`: Data structures (message, event, connection, result)
//! - `functions`: User and built-in chain functions
//! - `store`: Document and TTL state stores
//! - `cli`: Command-line interface
//!
//! # Usage
//!
//! ```bash
//! # Process one message
//! rotor --config snapshot.yaml process --message message.json
//!
//! # Process newline-delimited messages from stdin
//! cat messages.jsonl | rotor --config snapshot.yaml run
//! ```

pub mod adapters;
pub mod cli;
pub mod config;
pub mod core;
pub mod domain;
pub mod functions;
pub mod store;

// Re-export main types at crate root for convenience
pub use core::{HandlerError, HandlerOptions, Rotor, RotorBuilder};
pub use domain::{AnalyticsEvent, ChainResult, IngestMessage, RawMessage, TransportHeaders};
