//! Core orchestration logic.
//!
//! This module contains:
//! - Decoder: raw transport message to typed message and event
//! - Resolver: connection lookup with header precedence
//! - Enrich: geo and user agent enrichment context
//! - System: privileged context for built-in functions
//! - Chain: function chain building and bounded execution
//! - Handler: the per-message orchestrator

pub mod chain;
pub mod decoder;
pub mod enrich;
pub mod error;
pub mod finalize;
pub mod handler;
pub mod resolver;
pub mod system;
pub mod useragent;

pub use chain::{
    build_function_chain, check_error, run_chain, ChainFailure, ChainStep, FunctionChain,
    FunctionsFilter, StepFunction,
};
pub use decoder::{decode_event, decode_message, DecodeError};
pub use enrich::{ContextBuilder, Enrichment, GeoLookup};
pub use error::HandlerError;
pub use finalize::finalize_result;
pub use handler::{HandlerOptions, Rotor, RotorBuilder, DEFAULT_EXECUTION_BUDGET};
pub use resolver::{connection_id, require_enabled, resolve_connection};
pub use system::{metrics_meta, SystemContext};
pub use useragent::parse_user_agent;
