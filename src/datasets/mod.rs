//! Task sources for the supported benchmarks.
//!
//! Every source produces an ordered list of [`Task`]s up front; the harness
//! never asks a source for more work once scheduling has started.
//!
//! - **S-NIAH**: synthetic single needle in a haystack, fully deterministic
//! - **OOLONG**: long-context aggregation questions from pre-downloaded JSONL
//! - **ARC**: ARC-AGI grid puzzles from the evaluation challenge files

pub mod arc;
pub mod oolong;
pub mod sniah;

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::DatasetError;

pub use arc::{ArcOptions, ArcSource};
pub use oolong::{OolongOptions, OolongSource};
pub use sniah::{SniahOptions, SniahSource};

/// One unit of evaluation work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    /// Unique within a task list.
    pub id: String,
    pub query: String,
    /// Long input streamed to the agent; may be absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    pub expected_answer: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl Task {
    pub fn new(
        id: impl Into<String>,
        query: impl Into<String>,
        expected_answer: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            query: query.into(),
            context: None,
            expected_answer: expected_answer.into(),
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// Something that can produce the task list for a run.
pub trait TaskSource {
    /// Benchmark name recorded in the report.
    fn name(&self) -> &str;

    /// Produces the full ordered task list.
    fn load(&self) -> Result<Vec<Task>, DatasetError>;
}

/// The built-in benchmarks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Benchmark {
    SNiah,
    Oolong,
    Arc,
}

impl Benchmark {
    pub const ALL: [Benchmark; 3] = [Benchmark::SNiah, Benchmark::Oolong, Benchmark::Arc];

    pub fn as_str(&self) -> &'static str {
        match self {
            Benchmark::SNiah => "s-niah",
            Benchmark::Oolong => "oolong",
            Benchmark::Arc => "arc",
        }
    }
}

impl fmt::Display for Benchmark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Benchmark {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Benchmark::ALL
            .into_iter()
            .find(|b| b.as_str() == s)
            .ok_or_else(|| {
                format!(
                    "unknown benchmark '{s}' (expected one of: s-niah, oolong, arc)"
                )
            })
    }
}

/// Keeps at most `max_tasks` tasks, preserving order.
pub fn truncate(mut tasks: Vec<Task>, max_tasks: Option<usize>) -> Vec<Task> {
    if let Some(max) = max_tasks {
        tasks.truncate(max);
    }
    tasks
}
