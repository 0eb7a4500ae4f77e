//! Functions executed in a connection's chain.
//!
//! User functions and built-in functions implement distinct traits. Only
//! built-ins are handed the [`SystemContext`]; user functions see the
//! event, its enrichment context, the workspace store and a logger.

pub mod destinations;
pub mod recognition;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::adapters::{EventsLog, LogEntry, LogLevel};
use crate::core::SystemContext;
use crate::domain::{AnalyticsEvent, ErrorClass, EventContext};
use crate::store::Store;

pub use destinations::{LogDestination, WebhookDestination};
pub use recognition::UserRecognition;

/// Prefix of user function ids in connection options
pub const UDF_PREFIX: &str = "udf.";

/// Prefix of built-in function ids
pub const BUILTIN_PREFIX: &str = "builtin.";

/// Prefix of destination functions (`builtin.destination.<type>`)
pub const DESTINATION_PREFIX: &str = "builtin.destination.";

pub const USER_RECOGNITION_ID: &str = "builtin.transformation.user-recognition";

/// What a function did with its event
#[derive(Debug, Clone, PartialEq)]
pub enum FunctionOutcome {
    /// Pass the (possibly modified) event on
    Event(AnalyticsEvent),

    /// Replace the event with several; each continues down the chain
    Events(Vec<AnalyticsEvent>),

    /// Stop processing this event
    Drop,
}

/// Function failure, classified for redelivery
#[derive(Debug, Clone, Error)]
pub enum FunctionError {
    #[error("{0}")]
    Retryable(String),

    #[error("{0}")]
    Fatal(String),
}

impl FunctionError {
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::Retryable(_) => ErrorClass::Retryable,
            Self::Fatal(_) => ErrorClass::Fatal,
        }
    }
}

impl From<anyhow::Error> for FunctionError {
    fn from(error: anyhow::Error) -> Self {
        Self::Fatal(format!("{:#}", error))
    }
}

pub type FunctionResult = Result<FunctionOutcome, FunctionError>;

/// Context shared with every function
#[derive(Clone)]
pub struct FunctionContext {
    pub event: Arc<EventContext>,
    pub store: Arc<dyn Store>,
    pub log: FunctionLog,

    /// Budget for outbound requests made by the function
    pub fetch_timeout: Duration,
}

impl fmt::Debug for FunctionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionContext")
            .field("connection", &self.event.connection.id)
            .field("store", &self.store.descriptor())
            .field("fetch_timeout", &self.fetch_timeout)
            .finish()
    }
}

/// Context handed to built-in functions only
#[derive(Clone)]
pub struct BuiltinContext {
    pub function: FunctionContext,

    /// Destination credentials of the connection
    pub props: Arc<serde_json::Value>,

    pub system: Arc<SystemContext>,
}

/// Logger writing to the durable event log under the function's id.
///
/// Logging is best effort: failures are reported through tracing only.
#[derive(Clone)]
pub struct FunctionLog {
    events_log: Arc<dyn EventsLog>,
    connection_id: String,
    function_id: String,
    message_id: String,
}

impl FunctionLog {
    pub fn new(
        events_log: Arc<dyn EventsLog>,
        connection_id: impl Into<String>,
        function_id: impl Into<String>,
        message_id: impl Into<String>,
    ) -> Self {
        Self {
            events_log,
            connection_id: connection_id.into(),
            function_id: function_id.into(),
            message_id: message_id.into(),
        }
    }

    pub async fn info(&self, message: impl Into<String>) {
        self.write(LogLevel::Info, message.into()).await
    }

    pub async fn warn(&self, message: impl Into<String>) {
        self.write(LogLevel::Warn, message.into()).await
    }

    pub async fn error(&self, message: impl Into<String>) {
        self.write(LogLevel::Error, message.into()).await
    }

    async fn write(&self, level: LogLevel, message: String) {
        let entry = LogEntry::new(&self.connection_id, level, message)
            .with_function(&self.function_id)
            .with_message_id(&self.message_id);
        if let Err(e) = self.events_log.append(entry).await {
            tracing::warn!(function = %self.function_id, error = %e, "Failed to write function log");
        }
    }
}

/// Function authored by a workspace user
#[async_trait]
pub trait UserFunction: Send + Sync {
    async fn exec(&self, event: AnalyticsEvent, ctx: FunctionContext) -> FunctionResult;
}

/// Function shipped with the pipeline
#[async_trait]
pub trait BuiltinFunction: Send + Sync {
    async fn exec(&self, event: AnalyticsEvent, ctx: BuiltinContext) -> FunctionResult;
}

/// Functions available for chain building, by id
#[derive(Default, Clone)]
pub struct FunctionRegistry {
    builtin: HashMap<String, Arc<dyn BuiltinFunction>>,
    user: HashMap<String, Arc<dyn UserFunction>>,
}

impl FunctionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in the crate ships
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register_builtin(format!("{}log", DESTINATION_PREFIX), LogDestination);
        registry.register_builtin(
            format!("{}webhook", DESTINATION_PREFIX),
            WebhookDestination::new(),
        );
        registry.register_builtin(USER_RECOGNITION_ID, UserRecognition);
        registry
    }

    /// Register a built-in under its full id (`builtin.…`)
    pub fn register_builtin(&mut self, id: impl Into<String>, function: impl BuiltinFunction + 'static) {
        self.builtin.insert(id.into(), Arc::new(function));
    }

    /// Register a user function under its bare id (without `udf.`)
    pub fn register_user(&mut self, id: impl Into<String>, function: impl UserFunction + 'static) {
        self.user.insert(id.into(), Arc::new(function));
    }

    pub fn builtin(&self, id: &str) -> Option<Arc<dyn BuiltinFunction>> {
        self.builtin.get(id).cloned()
    }

    pub fn user(&self, id: &str) -> Option<Arc<dyn UserFunction>> {
        self.user.get(id).cloned()
    }
}
