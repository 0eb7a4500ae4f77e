//! Chain execution results.

use serde::{Deserialize, Serialize};

use super::event::AnalyticsEvent;

/// Outcome of running a function chain against one message
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainResult {
    /// Connection the message was processed for. Always set on results
    /// returned by the handler, whatever the chain outcome.
    pub connection_id: String,

    /// One entry per executed step, in execution order
    pub exec_log: Vec<FuncLogEntry>,

    /// Events remaining after the last step
    pub events: Vec<AnalyticsEvent>,

    /// Wall-clock time spent in the chain
    pub duration_ms: u64,
}

impl ChainResult {
    /// First failed step, if any
    pub fn first_failure(&self) -> Option<&FuncLogEntry> {
        self.exec_log.iter().find(|e| e.status.is_failure())
    }

    /// True when no step failed
    pub fn is_success(&self) -> bool {
        self.first_failure().is_none()
    }
}

/// Record of a single function execution
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FuncLogEntry {
    pub function_id: String,
    pub function_kind: FunctionKind,

    /// Index of the event within the step's input
    pub event_index: usize,

    pub status: StepStatus,
    pub duration_ms: u64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<StepError>,
}

impl FuncLogEntry {
    pub fn new(
        function_id: impl Into<String>,
        function_kind: FunctionKind,
        event_index: usize,
        status: StepStatus,
    ) -> Self {
        Self {
            function_id: function_id.into(),
            function_kind,
            event_index,
            status,
            duration_ms: 0,
            error: None,
        }
    }

    pub fn with_duration(mut self, duration_ms: u64) -> Self {
        self.duration_ms = duration_ms;
        self
    }

    pub fn with_error(mut self, class: ErrorClass, message: impl Into<String>) -> Self {
        self.error = Some(StepError {
            class,
            message: message.into(),
        });
        self
    }
}

/// Who authored the function
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FunctionKind {
    Builtin,
    User,
}

/// Outcome of one step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    /// Function returned one or more events
    Completed,

    /// Function dropped the event
    Dropped,

    /// Function returned an error or panicked
    Failed,

    /// Function exceeded the execution budget
    TimedOut,
}

impl StepStatus {
    pub fn is_failure(self) -> bool {
        matches!(self, Self::Failed | Self::TimedOut)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepError {
    pub class: ErrorClass,
    pub message: String,
}

/// Chain-level error classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    /// Transient; the transport may redeliver
    Retryable,

    /// Redelivery would fail the same way
    Fatal,
}

impl std::fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Retryable => write!(f, "retryable"),
            Self::Fatal => write!(f, "fatal"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_failure() {
        let result = ChainResult {
            exec_log: vec![
                FuncLogEntry::new("udf.a", FunctionKind::User, 0, StepStatus::Completed),
                FuncLogEntry::new("udf.b", FunctionKind::User, 0, StepStatus::TimedOut)
                    .with_error(ErrorClass::Retryable, "timed out"),
            ],
            ..Default::default()
        };

        assert!(!result.is_success());
        assert_eq!(result.first_failure().unwrap().function_id, "udf.b");
    }

    #[test]
    fn test_dropped_is_not_failure() {
        let result = ChainResult {
            exec_log: vec![FuncLogEntry::new(
                "udf.a",
                FunctionKind::User,
                0,
                StepStatus::Dropped,
            )
            .with_duration(3)],
            ..Default::default()
        };

        assert!(result.is_success());
        assert_eq!(result.exec_log[0].duration_ms, 3);
    }
}
