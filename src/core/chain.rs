//! Function chain building and execution.
//!
//! Steps run strictly in configured order; later steps may rely on store
//! writes made by earlier ones. Every step runs on its own task bounded by
//! the execution budget, so a hung or panicking function becomes a failed
//! step instead of stalling the message.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::Value;
use tracing::{debug, error, warn};

use crate::adapters::{ConfigStore, EventsLog, LogEntry, LogLevel};
use crate::domain::{
    AnalyticsEvent, ChainResult, EnrichedConnection, ErrorClass, EventContext, FuncLogEntry,
    FunctionKind, StepStatus,
};
use crate::functions::{
    BuiltinContext, BuiltinFunction, FunctionContext, FunctionLog, FunctionOutcome,
    FunctionRegistry, UserFunction, BUILTIN_PREFIX, DESTINATION_PREFIX, UDF_PREFIX,
    USER_RECOGNITION_ID,
};
use crate::store::Store;

use super::error::HandlerError;
use super::system::SystemContext;

/// Predicate over function ids deciding which steps run
pub type FunctionsFilter = Arc<dyn Fn(&str) -> bool + Send + Sync>;

/// Executable function of a step
#[derive(Clone)]
pub enum StepFunction {
    Builtin(Arc<dyn BuiltinFunction>),
    User(Arc<dyn UserFunction>),
}

impl StepFunction {
    pub fn kind(&self) -> FunctionKind {
        match self {
            Self::Builtin(_) => FunctionKind::Builtin,
            Self::User(_) => FunctionKind::User,
        }
    }
}

/// One step of a chain
#[derive(Clone)]
pub struct ChainStep {
    pub id: String,
    pub function: StepFunction,
}

/// Ordered functions for one connection
#[derive(Clone)]
pub struct FunctionChain {
    pub steps: Vec<ChainStep>,

    /// Destination credentials handed to built-ins
    pub props: Arc<Value>,

    /// Execution budget per step
    pub budget: Duration,
}

impl FunctionChain {
    pub fn ids(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.id.as_str()).collect()
    }
}

/// Build the chain configured for a connection
pub fn build_function_chain(
    connection: &EnrichedConnection,
    config_store: &dyn ConfigStore,
    registry: &FunctionRegistry,
    filter: Option<&FunctionsFilter>,
    budget: Duration,
) -> Result<FunctionChain, HandlerError> {
    let mut ids: Vec<String> = connection
        .options
        .functions
        .iter()
        .map(|f| f.function_id.clone())
        .collect();
    if connection.options.user_recognition {
        ids.push(USER_RECOGNITION_ID.to_string());
    }
    ids.push(format!("{}{}", DESTINATION_PREFIX, connection.destination_type));

    let mut steps = Vec::with_capacity(ids.len());
    for id in ids {
        if let Some(filter) = filter {
            if !filter(&id) {
                debug!(function = %id, "Function filtered out");
                continue;
            }
        }

        let function = resolve_function(connection, config_store, registry, &id).ok_or_else(|| {
            HandlerError::UnknownFunction {
                connection_id: connection.id.clone(),
                function_id: id.clone(),
            }
        })?;
        steps.push(ChainStep { id, function });
    }

    Ok(FunctionChain {
        steps,
        props: Arc::new(connection.credentials.clone()),
        budget,
    })
}

fn resolve_function(
    connection: &EnrichedConnection,
    config_store: &dyn ConfigStore,
    registry: &FunctionRegistry,
    id: &str,
) -> Option<StepFunction> {
    if let Some(udf_id) = id.strip_prefix(UDF_PREFIX) {
        config_store.function(&connection.workspace_id, udf_id)?;
        return registry.user(udf_id).map(StepFunction::User);
    }
    if id.starts_with(BUILTIN_PREFIX) {
        return registry.builtin(id).map(StepFunction::Builtin);
    }
    None
}

/// Failure of a single step
struct StepFailure {
    status: StepStatus,
    class: ErrorClass,
    message: String,
}

/// Run a chain against one event.
///
/// Stops after the first failing step, or once no events remain.
pub async fn run_chain(
    chain: &FunctionChain,
    event: AnalyticsEvent,
    events_log: Arc<dyn EventsLog>,
    store: Arc<dyn Store>,
    ctx: Arc<EventContext>,
    system: Arc<SystemContext>,
    fetch_timeout: Duration,
) -> ChainResult {
    let started = Instant::now();
    let connection_id = ctx.connection.id.clone();
    let message_id = system.metrics_meta.message_id.clone();

    let mut events = vec![event];
    let mut exec_log = Vec::new();

    for step in &chain.steps {
        let function_ctx = FunctionContext {
            event: Arc::clone(&ctx),
            store: Arc::clone(&store),
            log: FunctionLog::new(Arc::clone(&events_log), &connection_id, &step.id, &message_id),
            fetch_timeout,
        };

        let mut next = Vec::with_capacity(events.len());
        let mut halted = false;

        for (index, event) in events.into_iter().enumerate() {
            if halted {
                next.push(event);
                continue;
            }

            let step_start = Instant::now();
            let outcome = exec_step(step, chain, event.clone(), function_ctx.clone(), &system).await;
            let duration_ms = step_start.elapsed().as_millis() as u64;
            let entry = FuncLogEntry::new(&step.id, step.function.kind(), index, StepStatus::Completed);

            match outcome {
                Ok(FunctionOutcome::Event(event)) => {
                    exec_log.push(entry.with_duration(duration_ms));
                    next.push(event);
                }
                Ok(FunctionOutcome::Events(events)) => {
                    exec_log.push(entry.with_duration(duration_ms));
                    next.extend(events);
                }
                Ok(FunctionOutcome::Drop) => {
                    debug!(function = %step.id, "Event dropped");
                    exec_log.push(FuncLogEntry {
                        status: StepStatus::Dropped,
                        ..entry.with_duration(duration_ms)
                    });
                }
                Err(failure) => {
                    error!(
                        function = %step.id,
                        status = ?failure.status,
                        error = %failure.message,
                        "Function failed"
                    );
                    log_failure(&events_log, &connection_id, &message_id, &step.id, &failure).await;
                    exec_log.push(
                        FuncLogEntry {
                            status: failure.status,
                            ..entry
                        }
                        .with_duration(duration_ms)
                        .with_error(failure.class, failure.message),
                    );
                    next.push(event);
                    halted = true;
                }
            }
        }

        events = next;
        if halted || events.is_empty() {
            break;
        }
    }

    ChainResult {
        connection_id,
        exec_log,
        events,
        duration_ms: started.elapsed().as_millis() as u64,
    }
}

async fn exec_step(
    step: &ChainStep,
    chain: &FunctionChain,
    event: AnalyticsEvent,
    ctx: FunctionContext,
    system: &Arc<SystemContext>,
) -> Result<FunctionOutcome, StepFailure> {
    let handle = match &step.function {
        StepFunction::User(function) => {
            let function = Arc::clone(function);
            tokio::spawn(async move { function.exec(event, ctx).await })
        }
        StepFunction::Builtin(function) => {
            let function = Arc::clone(function);
            let ctx = BuiltinContext {
                function: ctx,
                props: Arc::clone(&chain.props),
                system: Arc::clone(system),
            };
            tokio::spawn(async move { function.exec(event, ctx).await })
        }
    };
    let abort = handle.abort_handle();

    match tokio::time::timeout(chain.budget, handle).await {
        Ok(Ok(Ok(outcome))) => Ok(outcome),
        Ok(Ok(Err(e))) => Err(StepFailure {
            status: StepStatus::Failed,
            class: e.class(),
            message: e.to_string(),
        }),
        Ok(Err(join_error)) => Err(StepFailure {
            status: StepStatus::Failed,
            class: ErrorClass::Fatal,
            message: format!("Function panicked: {}", join_error),
        }),
        Err(_) => {
            abort.abort();
            Err(StepFailure {
                status: StepStatus::TimedOut,
                class: ErrorClass::Retryable,
                message: format!("Function timed out after {:?}", chain.budget),
            })
        }
    }
}

async fn log_failure(
    events_log: &Arc<dyn EventsLog>,
    connection_id: &str,
    message_id: &str,
    function_id: &str,
    failure: &StepFailure,
) {
    let entry = LogEntry::new(
        connection_id,
        LogLevel::Error,
        format!("Function execution failed: {}", failure.message),
    )
    .with_function(function_id)
    .with_message_id(message_id);

    if let Err(e) = events_log.append(entry).await {
        warn!(function = %function_id, error = %e, "Failed to record function failure");
    }
}

/// Chain-level failure derived from an execution log
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainFailure {
    pub class: ErrorClass,
    pub function_id: String,
    pub message: String,
}

/// Classify the first failed step of a result, if any
pub fn check_error(result: &ChainResult) -> Option<ChainFailure> {
    let failed = result.first_failure()?;
    let (class, message) = match &failed.error {
        Some(error) => (error.class, error.message.clone()),
        None => (ErrorClass::Fatal, format!("{:?}", failed.status)),
    };
    Some(ChainFailure {
        class,
        function_id: failed.function_id.clone(),
        message,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::StepError;

    #[test]
    fn test_check_error_uses_first_failure() {
        let result = ChainResult {
            exec_log: vec![
                FuncLogEntry::new("udf.ok", FunctionKind::User, 0, StepStatus::Completed),
                FuncLogEntry::new("udf.slow", FunctionKind::User, 0, StepStatus::TimedOut)
                    .with_error(ErrorClass::Retryable, "timed out"),
                FuncLogEntry::new("udf.bad", FunctionKind::User, 0, StepStatus::Failed)
                    .with_error(ErrorClass::Fatal, "bad"),
            ],
            ..Default::default()
        };

        let failure = check_error(&result).unwrap();
        assert_eq!(failure.class, ErrorClass::Retryable);
        assert_eq!(failure.function_id, "udf.slow");
    }

    #[test]
    fn test_check_error_without_details() {
        let mut entry = FuncLogEntry::new("udf.x", FunctionKind::User, 0, StepStatus::Failed);
        entry.error = None;
        let result = ChainResult {
            exec_log: vec![entry],
            ..Default::default()
        };
        assert_eq!(check_error(&result).unwrap().class, ErrorClass::Fatal);

        let ok = ChainResult {
            exec_log: vec![FuncLogEntry {
                error: Some(StepError {
                    class: ErrorClass::Fatal,
                    message: "ignored".into(),
                }),
                ..FuncLogEntry::new("udf.y", FunctionKind::User, 0, StepStatus::Dropped)
            }],
            ..Default::default()
        };
        assert!(check_error(&ok).is_none());
    }
}
