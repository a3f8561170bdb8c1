//! Durable storage for run reports.
//!
//! The report file is both the final output of a run and its resumption
//! checkpoint:
//!
//! ```text
//! run start ─► load(path) ─► {taskId → EvalResult} ─► skip those tasks
//! each completion ─► persist(path, full report)   (full rewrite)
//! ```
//!
//! `load` never fails; a missing or corrupt file means the run starts over.

pub mod results;

pub use results::{load, load_results, persist, read_report, StorageError};
