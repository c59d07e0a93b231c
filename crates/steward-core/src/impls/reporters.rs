//! Reporter sinks.
//!
//! どの sink も失敗しない。スケジューリング結果には影響しません。

use std::sync::{Arc, Mutex, PoisonError};

use metrics::{counter, describe_counter, describe_histogram, histogram};
use tracing::{debug, info, warn};

use crate::domain::{ExecutionReport, ReportedOutcome};
use crate::ports::Reporter;

pub const EXECUTIONS_TOTAL: &str = "steward_task_executions_total";
pub const DURATION_SECONDS: &str = "steward_task_duration_seconds";

/// Structured log line per attempt.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingReporter;

impl Reporter for TracingReporter {
    fn report(&self, report: &ExecutionReport) {
        let disposition = serde_json::to_string(&report.disposition).unwrap_or_default();
        match &report.outcome {
            ReportedOutcome::Success => info!(
                instance_id = %report.instance_id,
                identity = %report.identity,
                attempt = report.attempt,
                duration_ms = report.duration_ms,
                %disposition,
                "task succeeded"
            ),
            ReportedOutcome::RetryableFailure(reason) | ReportedOutcome::TerminalFailure(reason) => {
                warn!(
                    instance_id = %report.instance_id,
                    identity = %report.identity,
                    attempt = report.attempt,
                    duration_ms = report.duration_ms,
                    outcome = report.outcome.label(),
                    %reason,
                    %disposition,
                    "task failed"
                )
            }
            ReportedOutcome::LeaseExpired => warn!(
                instance_id = %report.instance_id,
                identity = %report.identity,
                attempt = report.attempt,
                %disposition,
                "lease expired before the attempt settled"
            ),
            // error レベルのログは engine が 1 回だけ出す
            ReportedOutcome::UnknownTask => debug!(
                instance_id = %report.instance_id,
                identity = %report.identity,
                %disposition,
                "unknown task reported"
            ),
        }
    }
}

/// `metrics` facade: execution counter and duration histogram.
#[derive(Debug, Clone, Copy)]
pub struct MetricsReporter;

impl MetricsReporter {
    pub fn new() -> Self {
        describe_counter!(
            EXECUTIONS_TOTAL,
            "Task execution attempts, labelled by identity and outcome"
        );
        describe_histogram!(
            DURATION_SECONDS,
            "Wall-clock duration of task execution attempts in seconds"
        );
        Self
    }
}

impl Default for MetricsReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl Reporter for MetricsReporter {
    fn report(&self, report: &ExecutionReport) {
        counter!(
            EXECUTIONS_TOTAL,
            "identity" => report.identity.to_string(),
            "outcome" => report.outcome.label()
        )
        .increment(1);

        // UnknownTask / LeaseExpired は実行していないので duration は記録しない
        if matches!(
            report.outcome,
            ReportedOutcome::Success
                | ReportedOutcome::RetryableFailure(_)
                | ReportedOutcome::TerminalFailure(_)
        ) {
            histogram!(DURATION_SECONDS, "identity" => report.identity.to_string())
                .record(report.duration_ms as f64 / 1000.0);
        }
    }
}

/// Keeps every report in memory.
#[derive(Debug, Default)]
pub struct RecordingReporter {
    reports: Mutex<Vec<ExecutionReport>>,
}

impl RecordingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reports(&self) -> Vec<ExecutionReport> {
        self.reports
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn len(&self) -> usize {
        self.reports.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Reporter for RecordingReporter {
    fn report(&self, report: &ExecutionReport) {
        self.reports
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(report.clone());
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoopReporter;

impl Reporter for NoopReporter {
    fn report(&self, _report: &ExecutionReport) {}
}

/// Forwards each report to every inner sink, in order.
#[derive(Clone, Default)]
pub struct FanoutReporter {
    sinks: Vec<Arc<dyn Reporter>>,
}

impl FanoutReporter {
    pub fn with(mut self, sink: Arc<dyn Reporter>) -> Self {
        self.sinks.push(sink);
        self
    }
}

impl Reporter for FanoutReporter {
    fn report(&self, report: &ExecutionReport) {
        for sink in &self.sinks {
            sink.report(report);
        }
    }
}
