//! rlm-eval: evaluation harness for recursive language model agents.
//!
//! Runs an agent against benchmark tasks with bounded concurrency, scores
//! each answer, and keeps a report on disk that doubles as the checkpoint
//! for resuming an interrupted run.

pub mod cli;
pub mod config;
pub mod datasets;
pub mod error;
pub mod metrics;
pub mod report;
pub mod runner;
pub mod scheduler;
pub mod scoring;
pub mod storage;

// Re-export commonly used types
pub use config::EvalConfig;
pub use datasets::{Benchmark, Task, TaskSource};
pub use error::{ConfigError, DatasetError, DriverError, HarnessError, ScoringError};
pub use report::{AggregateStats, BenchmarkReport, EvalResult};
pub use runner::{Driver, DriverOptions, DriverRegistry, DriverSettings, InvocationResult};
pub use scheduler::{run_harness, HarnessConfig, ProgressInfo, ProgressSink};
pub use scoring::ScoringFn;
pub use storage::StorageError;
