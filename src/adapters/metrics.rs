//! Metrics sink emitting structured tracing events.

use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::Result;
use tracing::info;

use super::Metrics;
use crate::domain::{FuncLogEntry, MetricsMeta, StepStatus};

/// Emits one `rotor::metrics` event per step and keeps running totals
#[derive(Debug, Default)]
pub struct TracingMetrics {
    success: AtomicU64,
    dropped: AtomicU64,
    failed: AtomicU64,
}

/// Running totals since process start
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MetricsTotals {
    pub success: u64,
    pub dropped: u64,
    pub failed: u64,
}

impl TracingMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn totals(&self) -> MetricsTotals {
        MetricsTotals {
            success: self.success.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

impl Metrics for TracingMetrics {
    fn log_metrics(&self, meta: &MetricsMeta, exec_log: &[FuncLogEntry]) -> Result<()> {
        for entry in exec_log {
            let counter = match entry.status {
                StepStatus::Completed => &self.success,
                StepStatus::Dropped => &self.dropped,
                StepStatus::Failed | StepStatus::TimedOut => &self.failed,
            };
            counter.fetch_add(1, Ordering::Relaxed);

            info!(
                target: "rotor::metrics",
                workspace_id = %meta.workspace_id,
                message_id = %meta.message_id,
                stream_id = %meta.stream_id,
                destination_id = %meta.destination_id,
                connection_id = %meta.connection_id,
                retries = meta.retries,
                function_id = %entry.function_id,
                status = ?entry.status,
                duration_ms = entry.duration_ms,
                "function executed"
            );
        }
        Ok(())
    }
}
