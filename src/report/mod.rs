//! Per-task results, the persisted run report and statistics over both.
//!
//! - **types**: `EvalResult`, `BenchmarkReport`, the on-disk JSON shape
//! - **aggregate**: order statistics and `AggregateStats`
//! - **analysis**: post-hoc behavioural analysis for the `analyze` command

pub mod aggregate;
pub mod analysis;
pub mod types;

pub use aggregate::{mean, median, percentile, sorted, std_dev, AggregateStats};
pub use analysis::{find_latest_result, Analysis};
pub use types::{BenchmarkReport, EvalResult, RunConfig};
