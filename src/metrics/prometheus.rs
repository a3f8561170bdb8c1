//! Prometheus metrics registration and export.
//!
//! Defines every metric a run records and the text export used by
//! `--metrics-out`.

use prometheus::{
    CounterVec, Encoder, Gauge, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder,
};
use std::sync::OnceLock;

/// Global Prometheus registry for all rlm-eval metrics.
pub static REGISTRY: OnceLock<Registry> = OnceLock::new();

/// Finished tasks, labeled by benchmark and status (`ok` / `error`).
pub static TASKS_TOTAL: OnceLock<CounterVec> = OnceLock::new();

/// Driver wall time per task in seconds, labeled by benchmark.
pub static TASK_DURATION: OnceLock<HistogramVec> = OnceLock::new();

/// Scores of completed tasks, labeled by benchmark.
pub static TASK_SCORE: OnceLock<HistogramVec> = OnceLock::new();

/// Tasks currently executing.
pub static TASKS_IN_FLIGHT: OnceLock<Gauge> = OnceLock::new();

/// Report writes, labeled by outcome (`ok` / `error`).
pub static REPORT_PERSISTS: OnceLock<CounterVec> = OnceLock::new();

/// Initialize all metrics and register them with the registry.
///
/// Safe to call more than once; only the first call's metrics are kept.
///
/// # Errors
///
/// Returns a `prometheus::Error` if a metric definition is invalid.
pub fn init_metrics() -> Result<(), prometheus::Error> {
    let registry = Registry::new();

    let tasks_total = CounterVec::new(
        Opts::new("rlm_eval_tasks_total", "Total number of finished tasks"),
        &["benchmark", "status"],
    )?;

    let task_duration = HistogramVec::new(
        HistogramOpts::new(
            "rlm_eval_task_duration_seconds",
            "Driver wall time per task in seconds",
        )
        .buckets(vec![1.0, 5.0, 15.0, 30.0, 60.0, 120.0, 300.0, 600.0]),
        &["benchmark"],
    )?;

    let task_score = HistogramVec::new(
        HistogramOpts::new("rlm_eval_task_score", "Distribution of task scores")
            .buckets(vec![0.1, 0.2, 0.3, 0.4, 0.5, 0.6, 0.7, 0.8, 0.9, 1.0]),
        &["benchmark"],
    )?;

    let tasks_in_flight = Gauge::new("rlm_eval_tasks_in_flight", "Tasks currently executing")?;

    let report_persists = CounterVec::new(
        Opts::new("rlm_eval_report_persists_total", "Total report writes"),
        &["outcome"],
    )?;

    registry.register(Box::new(tasks_total.clone()))?;
    registry.register(Box::new(task_duration.clone()))?;
    registry.register(Box::new(task_score.clone()))?;
    registry.register(Box::new(tasks_in_flight.clone()))?;
    registry.register(Box::new(report_persists.clone()))?;

    // Already-set cells mean an earlier init won; keep its metrics.
    let _ = REGISTRY.set(registry);
    let _ = TASKS_TOTAL.set(tasks_total);
    let _ = TASK_DURATION.set(task_duration);
    let _ = TASK_SCORE.set(task_score);
    let _ = TASKS_IN_FLIGHT.set(tasks_in_flight);
    let _ = REPORT_PERSISTS.set(report_persists);

    tracing::debug!("Prometheus metrics initialized");

    Ok(())
}

/// Export all registered metrics in Prometheus text format.
///
/// Returns a comment line instead of failing when metrics were never
/// initialized or encoding fails.
pub fn export_metrics() -> String {
    let Some(registry) = REGISTRY.get() else {
        return "# Metrics not initialized. Call init_metrics() first.\n".to_string();
    };

    let encoder = TextEncoder::new();
    let metric_families = registry.gather();

    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        return format!("# Error encoding metrics: {}\n", e);
    }

    String::from_utf8(buffer)
        .unwrap_or_else(|e| format!("# Error converting metrics to UTF-8: {}\n", e))
}
