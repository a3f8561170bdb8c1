//! Bounded-concurrency task scheduling with resumable progress.
//!
//! # Architecture
//!
//! ```text
//!   tasks ──► partition ──► resolved (from output file) ──────────────┐
//!                 │                                                   │
//!                 ▼                                                   ▼
//!             pending ──► WorkerPool (N workers) ──► collector ──► results
//!                              │                        │
//!                         TaskRunner                persist + progress
//!                   (driver call, scoring)
//! ```
//!
//! The collector is the only writer of the in-memory result list and of the
//! output file, so persistence needs no locking.
//!
//! # Example
//!
//! ```rust,ignore
//! use rlm_eval::scheduler::{run_harness, HarnessConfig, StderrProgress};
//!
//! let config = HarnessConfig::new("s-niah", "gpt-4o", "results/run.json")
//!     .with_concurrency(3);
//! let report = run_harness(tasks, driver, scorer, &config, Some(&StderrProgress)).await?;
//! println!("mean score: {:.4}", report.aggregate.mean_score);
//! ```

pub mod harness;
pub mod progress;
pub mod worker_pool;

pub use harness::{
    count_trace_iterations, run_harness, run_with_runner, HarnessConfig, TaskRunner,
    CALL_GUARD_SLACK, DEFAULT_CONCURRENCY,
};
pub use progress::{format_elapsed, ProgressInfo, ProgressSink, StderrProgress};
pub use worker_pool::{PoolConfig, PoolError, PoolStats, TaskExecutor, WorkerPool};
