//! Result finalization.

use tracing::warn;

use crate::adapters::Metrics;
use crate::domain::{ChainResult, MetricsMeta};

use super::chain::check_error;
use super::error::HandlerError;

/// Stamp the connection id, forward metrics, then surface any chain failure.
///
/// Metrics are recorded before the failure is raised so failed chains are
/// counted too. Metric errors are logged and otherwise ignored.
pub fn finalize_result(
    mut result: ChainResult,
    connection_id: &str,
    meta: &MetricsMeta,
    metrics: Option<&dyn Metrics>,
) -> Result<ChainResult, HandlerError> {
    result.connection_id = connection_id.to_string();

    if let Some(metrics) = metrics {
        if let Err(e) = metrics.log_metrics(meta, &result.exec_log) {
            warn!(connection = %connection_id, error = %e, "Failed to log metrics");
        }
    }

    match check_error(&result) {
        Some(failure) => Err(HandlerError::Chain {
            class: failure.class,
            function_id: failure.function_id,
            message: failure.message,
            result: Box::new(result),
        }),
        None => Ok(result),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ErrorClass, FuncLogEntry, FunctionKind, StepStatus};
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recording {
        calls: Mutex<Vec<usize>>,
        fail: bool,
    }

    impl Metrics for Recording {
        fn log_metrics(&self, _meta: &MetricsMeta, exec_log: &[FuncLogEntry]) -> anyhow::Result<()> {
            self.calls.lock().unwrap().push(exec_log.len());
            if self.fail {
                anyhow::bail!("metrics sink down");
            }
            Ok(())
        }
    }

    fn meta() -> MetricsMeta {
        MetricsMeta {
            connection_id: "conn-1".into(),
            ..Default::default()
        }
    }

    #[test]
    fn test_success_sets_connection_id() {
        let metrics = Recording::default();
        let result = finalize_result(ChainResult::default(), "conn-1", &meta(), Some(&metrics)).unwrap();
        assert_eq!(result.connection_id, "conn-1");
        assert_eq!(*metrics.calls.lock().unwrap(), vec![0]);
    }

    #[test]
    fn test_failure_records_metrics_first() {
        let metrics = Recording::default();
        let result = ChainResult {
            exec_log: vec![FuncLogEntry::new("udf.a", FunctionKind::User, 0, StepStatus::Failed)
                .with_error(ErrorClass::Fatal, "boom")],
            ..Default::default()
        };

        let err = finalize_result(result, "conn-1", &meta(), Some(&metrics)).unwrap_err();
        assert_eq!(*metrics.calls.lock().unwrap(), vec![1]);
        assert!(!err.is_retryable());
        assert_eq!(err.chain_result().unwrap().connection_id, "conn-1");
    }

    #[test]
    fn test_metrics_error_is_swallowed() {
        let metrics = Recording {
            fail: true,
            ..Default::default()
        };
        assert!(finalize_result(ChainResult::default(), "conn-1", &meta(), Some(&metrics)).is_ok());
        assert!(finalize_result(ChainResult::default(), "conn-1", &meta(), None).is_ok());
    }
}
