//! Persisted result and report types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::aggregate::AggregateStats;

/// Outcome of one task in one run.
///
/// Immutable once recorded; `task_id` is unique within a report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvalResult {
    pub task_id: String,
    pub query: String,
    pub expected_answer: String,
    pub generated_answer: String,
    /// Score in `[0, 1]`.
    pub score: f64,
    pub iterations: u32,
    pub wall_time_ms: u64,
    /// Set when the task failed; the score is then 0 and the answer empty.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace: Option<String>,
}

impl EvalResult {
    /// Builds a failed result carrying `error`.
    ///
    /// Used when a task could not produce an answer at all (driver error,
    /// scoring failure, panic): every measured quantity is zeroed.
    pub fn failed(
        task_id: impl Into<String>,
        query: impl Into<String>,
        expected_answer: impl Into<String>,
        error: impl Into<String>,
    ) -> Self {
        Self {
            task_id: task_id.into(),
            query: query.into(),
            expected_answer: expected_answer.into(),
            generated_answer: String::new(),
            score: 0.0,
            iterations: 0,
            wall_time_ms: 0,
            error: Some(error.into()),
            trace: None,
        }
    }

    /// Returns true if the task completed without error.
    pub fn is_completed(&self) -> bool {
        self.error.is_none()
    }
}

/// Limits and scheduling parameters a run was made with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunConfig {
    pub driver: String,
    pub max_iterations: u32,
    pub max_depth: u32,
    pub concurrency: usize,
}

/// Full state of a run: the unit of durable storage and of resumption.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkReport {
    pub benchmark: String,
    pub model: String,
    pub config: RunConfig,
    pub timestamp: DateTime<Utc>,
    pub results: Vec<EvalResult>,
    pub aggregate: AggregateStats,
}

impl BenchmarkReport {
    /// Builds a report stamped now, with the aggregate recomputed from
    /// `results`.
    pub fn new(
        benchmark: impl Into<String>,
        model: impl Into<String>,
        config: RunConfig,
        results: Vec<EvalResult>,
    ) -> Self {
        let aggregate = AggregateStats::compute(&results);
        Self {
            benchmark: benchmark.into(),
            model: model.into(),
            config,
            timestamp: Utc::now(),
            results,
            aggregate,
        }
    }

    /// Looks up a result by task id.
    pub fn result(&self, task_id: &str) -> Option<&EvalResult> {
        self.results.iter().find(|r| r.task_id == task_id)
    }
}
