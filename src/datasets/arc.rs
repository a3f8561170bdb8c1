//! ARC-AGI evaluation loader.
//!
//! Each challenge is handed to the agent as JSON (`train` pairs plus `test`
//! inputs); the expected answer is the JSON solution grid, or the list of
//! grids when a challenge has several test inputs.

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{Task, TaskSource};
use crate::error::DatasetError;

pub const CHALLENGES_FILE: &str = "arc-agi_evaluation_challenges.json";

pub const SOLUTIONS_FILE: &str = "arc-agi_evaluation_solutions.json";

/// Grids are kept as raw JSON so they serialize back unchanged.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArcChallenge {
    pub train: Vec<Value>,
    pub test: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArcOptions {
    pub data_dir: PathBuf,
    /// Restrict to these problem ids; empty means all.
    pub selected_problems: Vec<String>,
}

impl ArcOptions {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            selected_problems: Vec::new(),
        }
    }

    pub fn with_selected_problems(mut self, ids: Vec<String>) -> Self {
        self.selected_problems = ids;
        self
    }
}

#[derive(Debug, Clone)]
pub struct ArcSource {
    options: ArcOptions,
}

impl ArcSource {
    pub fn new(options: ArcOptions) -> Self {
        Self { options }
    }

    fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T, DatasetError> {
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }
}

impl TaskSource for ArcSource {
    fn name(&self) -> &str {
        "arc"
    }

    fn load(&self) -> Result<Vec<Task>, DatasetError> {
        let dir = &self.options.data_dir;
        let challenges_path = dir.join(CHALLENGES_FILE);
        let solutions_path = dir.join(SOLUTIONS_FILE);
        if !challenges_path.is_file() || !solutions_path.is_file() {
            return Err(DatasetError::MissingDataDir(format!(
                "{} (expected {CHALLENGES_FILE} and {SOLUTIONS_FILE})",
                dir.display()
            )));
        }

        // Ordered by problem id.
        let challenges: BTreeMap<String, ArcChallenge> = Self::read_json(&challenges_path)?;
        let solutions: BTreeMap<String, Vec<Value>> = Self::read_json(&solutions_path)?;

        let selected: HashSet<&str> = self
            .options
            .selected_problems
            .iter()
            .map(String::as_str)
            .collect();

        challenges
            .iter()
            .filter(|(id, _)| selected.is_empty() || selected.contains(id.as_str()))
            .map(|(id, challenge)| {
                let solution = solutions
                    .get(id)
                    .ok_or_else(|| DatasetError::MissingSolution(id.clone()))?;
                build_task(id, challenge, solution)
            })
            .collect()
    }
}

fn build_task(id: &str, challenge: &ArcChallenge, solution: &[Value]) -> Result<Task, DatasetError> {
    let context = serde_json::to_string(challenge)?;

    let expected = if challenge.test.len() == 1 {
        let first = solution
            .first()
            .ok_or_else(|| DatasetError::MissingSolution(id.to_string()))?;
        serde_json::to_string(first)?
    } else {
        serde_json::to_string(solution)?
    };

    Ok(Task::new(format!("arc-{id}"), build_query(challenge.test.len()), expected)
        .with_context(context)
        .with_metadata("numTrainExamples", challenge.train.len())
        .with_metadata("numTestInputs", challenge.test.len()))
}

/// Instructions for the agent; the challenge JSON arrives as its input.
pub fn build_query(num_tests: usize) -> String {
    let return_format = if num_tests == 1 {
        "Return the output as a JSON 2D array of integers, e.g.: [[1,2,3],[4,5,6]]".to_string()
    } else {
        format!(
            "There are {num_tests} test inputs. Return an array of {num_tests} output grids as JSON, e.g.: [[[1,2],[3,4]], [[5,6],[7,8]]]"
        )
    };

    format!(
        "You are solving an ARC-AGI task. The task data is available in the input file ($RLM_INPUT) as a JSON string.

The JSON contains:
- \"train\": Training examples, each with \"input\" and \"output\" grids (2D arrays of ints 0-9)
- \"test\": Test inputs with \"input\" grids only (you must predict the outputs)

Analyze all training examples to discover the transformation rule that maps each input to its output. The rule must be consistent across ALL training examples. Then apply it to the test input(s).

{return_format}

Return ONLY the raw JSON grid(s). No explanation, no markdown, no wrapping."
    )
}
