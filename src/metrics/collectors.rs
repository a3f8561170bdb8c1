//! High-level recording interface over the raw Prometheus metrics.
//!
//! Every method is a no-op until `init_metrics()` has run, so library users
//! that never export metrics pay nothing for them.

use super::prometheus::{
    REPORT_PERSISTS, TASKS_IN_FLIGHT, TASKS_TOTAL, TASK_DURATION, TASK_SCORE,
};
use crate::report::EvalResult;

/// Metrics collector for one benchmark run.
#[derive(Debug, Clone)]
pub struct MetricsCollector {
    benchmark: String,
}

impl MetricsCollector {
    /// Create a collector that labels everything with `benchmark`.
    pub fn new(benchmark: impl Into<String>) -> Self {
        Self {
            benchmark: benchmark.into(),
        }
    }

    /// Record that a task started executing.
    pub fn task_started(&self) {
        if let Some(in_flight) = TASKS_IN_FLIGHT.get() {
            in_flight.inc();
        }
    }

    /// Record a finished task.
    pub fn task_finished(&self, result: &EvalResult) {
        if let Some(in_flight) = TASKS_IN_FLIGHT.get() {
            in_flight.dec();
        }

        let status = if result.is_completed() { "ok" } else { "error" };
        if let Some(tasks_total) = TASKS_TOTAL.get() {
            tasks_total
                .with_label_values(&[self.benchmark.as_str(), status])
                .inc();
        }

        if result.is_completed() {
            if let Some(duration) = TASK_DURATION.get() {
                duration
                    .with_label_values(&[self.benchmark.as_str()])
                    .observe(result.wall_time_ms as f64 / 1000.0);
            }
            if let Some(score) = TASK_SCORE.get() {
                score
                    .with_label_values(&[self.benchmark.as_str()])
                    .observe(result.score);
            }
        }

        tracing::trace!(
            benchmark = %self.benchmark,
            task_id = %result.task_id,
            status = status,
            "Recorded task metric"
        );
    }

    /// Record a report write.
    pub fn report_persisted(&self, success: bool) {
        let outcome = if success { "ok" } else { "error" };
        if let Some(persists) = REPORT_PERSISTS.get() {
            persists.with_label_values(&[outcome]).inc();
        }
    }
}
