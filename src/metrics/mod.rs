//! Prometheus metrics for evaluation runs.
//!
//! # Example
//!
//! ```ignore
//! use rlm_eval::metrics::{init_metrics, export_metrics, MetricsCollector};
//!
//! init_metrics()?;
//! let collector = MetricsCollector::new("s-niah");
//! collector.task_started();
//! collector.task_finished(&result);
//!
//! std::fs::write("metrics.prom", export_metrics())?;
//! ```

pub mod collectors;
pub mod prometheus;

pub use collectors::MetricsCollector;
pub use prometheus::{export_metrics, init_metrics};

pub use prometheus::{
    REGISTRY, REPORT_PERSISTS, TASKS_IN_FLIGHT, TASKS_TOTAL, TASK_DURATION, TASK_SCORE,
};
