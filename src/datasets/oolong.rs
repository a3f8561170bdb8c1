//! OOLONG-synth loader.
//!
//! Reads pre-downloaded `.jsonl` / `.json` files from a data directory,
//! filters rows by source dataset and context length, and turns each row
//! into a task.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};
use walkdir::WalkDir;

use super::{Task, TaskSource};
use crate::error::DatasetError;

pub const DEFAULT_DATASET_FILTER: &str = "trec_coarse";

pub const DEFAULT_CONTEXT_LEN: u64 = 131072;

/// One row of the OOLONG-synth data files.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct OolongRow {
    pub id: Value,
    pub context_len: u64,
    pub dataset: String,
    pub context_window_text: String,
    pub question: String,
    pub task_group: String,
    pub task: String,
    pub answer: Value,
    pub answer_type: String,
    pub input_subset: Value,
    pub num_labels: Value,
    pub context_window_id: Value,
}

/// Loader parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OolongOptions {
    pub data_dir: PathBuf,
    pub dataset_filter: String,
    /// `None` keeps every context length.
    pub context_len: Option<u64>,
}

impl OolongOptions {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            dataset_filter: DEFAULT_DATASET_FILTER.to_string(),
            context_len: Some(DEFAULT_CONTEXT_LEN),
        }
    }

    pub fn with_dataset_filter(mut self, filter: impl Into<String>) -> Self {
        self.dataset_filter = filter.into();
        self
    }

    pub fn with_context_len(mut self, context_len: Option<u64>) -> Self {
        self.context_len = context_len;
        self
    }
}

#[derive(Debug, Clone)]
pub struct OolongSource {
    options: OolongOptions,
}

impl OolongSource {
    pub fn new(options: OolongOptions) -> Self {
        Self { options }
    }

    /// Reads every row from the data directory.
    ///
    /// Malformed lines and files are skipped; an empty directory is an error.
    pub fn load_rows(&self) -> Result<Vec<OolongRow>, DatasetError> {
        let dir = &self.options.data_dir;
        if !dir.is_dir() {
            return Err(DatasetError::MissingDataDir(dir.display().to_string()));
        }

        let files: Vec<PathBuf> = WalkDir::new(dir)
            .min_depth(1)
            .max_depth(1)
            .sort_by_file_name()
            .into_iter()
            .filter_map(Result::ok)
            .filter(|entry| entry.file_type().is_file())
            .map(|entry| entry.into_path())
            .filter(|path| is_data_file(path))
            .collect();

        if files.is_empty() {
            return Err(DatasetError::NoDataFiles(dir.display().to_string()));
        }

        let mut rows = Vec::new();
        for file in &files {
            let content = fs::read_to_string(file)?;
            if file.extension().is_some_and(|ext| ext == "jsonl") {
                rows.extend(parse_jsonl(&content, file));
            } else {
                rows.extend(parse_json(&content, file));
            }
        }
        Ok(rows)
    }

    /// Applies the dataset and context-length filters, with fallbacks.
    pub fn select(&self, rows: Vec<OolongRow>) -> Vec<OolongRow> {
        let filter = &self.options.dataset_filter;
        let matching: Vec<OolongRow> = rows
            .iter()
            .filter(|row| &row.dataset == filter)
            .cloned()
            .collect();

        let mut selected = if matching.is_empty() {
            let mut available: Vec<&str> = rows.iter().map(|r| r.dataset.as_str()).collect();
            available.sort_unstable();
            available.dedup();
            warn!(
                filter = %filter,
                available = %available.join(", "),
                "No rows for dataset filter, falling back to all rows"
            );
            rows
        } else {
            matching
        };

        if let Some(wanted) = self.options.context_len {
            if selected.iter().any(|row| row.context_len == wanted) {
                selected.retain(|row| row.context_len == wanted);
            } else if let Some(largest) = selected.iter().map(|row| row.context_len).max() {
                warn!(
                    requested = wanted,
                    using = largest,
                    "No rows with requested context length, using largest available"
                );
                selected.retain(|row| row.context_len == largest);
            }
        }

        selected
    }
}

impl TaskSource for OolongSource {
    fn name(&self) -> &str {
        "oolong"
    }

    fn load(&self) -> Result<Vec<Task>, DatasetError> {
        let rows = self.select(self.load_rows()?);
        let filter = &self.options.dataset_filter;

        Ok(rows
            .into_iter()
            .enumerate()
            .map(|(index, row)| {
                Task::new(
                    format!("oolong-{filter}-{index}"),
                    row.question,
                    normalize_answer(&answer_text(&row.answer)),
                )
                .with_context(row.context_window_text)
                .with_metadata("dataset", row.dataset)
                .with_metadata("contextLen", row.context_len)
                .with_metadata("taskGroup", row.task_group)
                .with_metadata("task", row.task)
                .with_metadata("answerType", row.answer_type)
                .with_metadata("inputSubset", row.input_subset)
                .with_metadata("numLabels", row.num_labels)
                .with_metadata("contextWindowId", row.context_window_id)
            })
            .collect())
    }
}

fn is_data_file(path: &Path) -> bool {
    path.extension()
        .is_some_and(|ext| ext == "jsonl" || ext == "json")
}

fn parse_jsonl(content: &str, file: &Path) -> Vec<OolongRow> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter_map(|line| match serde_json::from_str(line) {
            Ok(row) => Some(row),
            Err(e) => {
                debug!(file = %file.display(), error = %e, "Skipping malformed line");
                None
            }
        })
        .collect()
}

fn parse_json(content: &str, file: &Path) -> Vec<OolongRow> {
    match serde_json::from_str::<Value>(content) {
        Ok(Value::Array(items)) => items
            .into_iter()
            .filter_map(|item| serde_json::from_value(item).ok())
            .collect(),
        Ok(item) => serde_json::from_value(item).into_iter().collect(),
        Err(e) => {
            debug!(file = %file.display(), error = %e, "Skipping malformed file");
            Vec::new()
        }
    }
}

fn answer_text(answer: &Value) -> String {
    match answer {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Unwraps a Python list literal to its first element.
///
/// `"['abbreviation']"` becomes `abbreviation`, `"[42, 7]"` becomes `42`;
/// anything that is not a bracketed list is returned trimmed.
pub fn normalize_answer(raw: &str) -> String {
    let trimmed = raw.trim();
    let Some(inner) = trimmed
        .strip_prefix('[')
        .and_then(|rest| rest.strip_suffix(']'))
        .filter(|inner| !inner.is_empty())
    else {
        return trimmed.to_string();
    };

    let mut current = String::new();
    let mut quote: Option<char> = None;
    for ch in inner.chars() {
        match quote {
            None if ch == '\'' || ch == '"' => quote = Some(ch),
            Some(q) if ch == q => quote = None,
            None if ch == ',' => break,
            _ => current.push(ch),
        }
    }

    let first = current.trim();
    if first.is_empty() {
        trimmed.to_string()
    } else {
        first.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn row(dataset: &str, context_len: u64, answer: &str) -> String {
        serde_json::json!({
            "id": 1,
            "context_len": context_len,
            "dataset": dataset,
            "context_window_text": format!("{dataset} context"),
            "question": format!("question about {dataset}"),
            "task_group": "counting",
            "task": "most_frequent_label",
            "answer": answer,
            "answer_type": "LABEL",
            "input_subset": "False",
            "num_labels": 6,
            "context_window_id": 3,
        })
        .to_string()
    }

    fn write_rows(dir: &Path, name: &str, rows: &[String]) {
        fs::write(dir.join(name), rows.join("\n")).unwrap();
    }

    #[test]
    fn test_normalize_answer() {
        assert_eq!(normalize_answer("['abbreviation']"), "abbreviation");
        assert_eq!(normalize_answer("['more common than']"), "more common than");
        assert_eq!(normalize_answer("[42]"), "42");
        assert_eq!(normalize_answer("['a, b', 'c']"), "a, b");
        assert_eq!(normalize_answer("  plain  "), "plain");
        assert_eq!(normalize_answer("[]"), "[]");
        assert_eq!(normalize_answer("['']"), "['']");
    }

    #[test]
    fn test_missing_dir_and_empty_dir() {
        let dir = TempDir::new().unwrap();
        let missing = OolongSource::new(OolongOptions::new(dir.path().join("absent")));
        assert!(matches!(missing.load(), Err(DatasetError::MissingDataDir(_))));

        fs::write(dir.path().join("README.md"), "docs").unwrap();
        let empty = OolongSource::new(OolongOptions::new(dir.path()));
        assert!(matches!(empty.load(), Err(DatasetError::NoDataFiles(_))));
    }

    #[test]
    fn test_filters_dataset_and_context_len() {
        let dir = TempDir::new().unwrap();
        write_rows(
            dir.path(),
            "part-0.jsonl",
            &[
                row("trec_coarse", 131072, "['abbreviation']"),
                row("trec_coarse", 65536, "['entity']"),
                "{ not json".to_string(),
                row("spam", 131072, "['spam']"),
                row("trec_coarse", 131072, "[7]"),
            ],
        );

        let tasks = OolongSource::new(OolongOptions::new(dir.path())).load().unwrap();

        assert_eq!(tasks.len(), 2);
        assert_eq!(tasks[0].id, "oolong-trec_coarse-0");
        assert_eq!(tasks[0].expected_answer, "abbreviation");
        assert_eq!(tasks[0].context.as_deref(), Some("trec_coarse context"));
        assert_eq!(tasks[0].metadata["taskGroup"], "counting");
        assert_eq!(tasks[1].expected_answer, "7");
    }

    #[test]
    fn test_dataset_fallback_to_all_rows() {
        let dir = TempDir::new().unwrap();
        write_rows(
            dir.path(),
            "rows.jsonl",
            &[row("spam", 1024, "['ham']"), row("agnews", 1024, "['sports']")],
        );

        let tasks = OolongSource::new(
            OolongOptions::new(dir.path())
                .with_dataset_filter("trec_coarse")
                .with_context_len(Some(1024)),
        )
        .load()
        .unwrap();

        assert_eq!(tasks.len(), 2);
        assert_eq!(tasks[1].id, "oolong-trec_coarse-1");
    }

    #[test]
    fn test_context_len_fallback_to_largest() {
        let dir = TempDir::new().unwrap();
        let rows = format!(
            "[{}, {}, {}]",
            row("trec_coarse", 1024, "['a']"),
            row("trec_coarse", 4096, "['b']"),
            row("trec_coarse", 2048, "['c']")
        );
        fs::write(dir.path().join("rows.json"), rows).unwrap();

        let tasks = OolongSource::new(OolongOptions::new(dir.path())).load().unwrap();

        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].expected_answer, "b");
        assert_eq!(tasks[0].metadata["contextLen"], 4096);
    }

    #[test]
    fn test_no_context_len_filter() {
        let dir = TempDir::new().unwrap();
        write_rows(
            dir.path(),
            "rows.jsonl",
            &[row("trec_coarse", 1024, "['a']"), row("trec_coarse", 4096, "['b']")],
        );

        let tasks = OolongSource::new(OolongOptions::new(dir.path()).with_context_len(None))
            .load()
            .unwrap();
        assert_eq!(tasks.len(), 2);
    }
}
