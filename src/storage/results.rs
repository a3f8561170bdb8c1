//! JSON result store.
//!
//! One report file per run, rewritten in full after every task completion.
//! The same file is the resumption checkpoint for the next invocation.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use crate::report::{BenchmarkReport, EvalResult};

/// Errors that can occur while writing or strictly reading a report.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Failed to read or write the report file.
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Failed to serialize or deserialize the report.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StorageError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Only `results` matters for resumption; the rest of the document is
/// recomputed on every write.
#[derive(Deserialize)]
struct ResumeView {
    results: Vec<EvalResult>,
}

/// Loads prior results in file order.
///
/// A missing, unreadable or corrupt file yields an empty list.
pub async fn load_results(path: &Path) -> Vec<EvalResult> {
    let content = match fs::read_to_string(path).await {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Vec::new(),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Could not read result file, starting fresh");
            return Vec::new();
        }
    };

    match serde_json::from_str::<ResumeView>(&content) {
        Ok(view) => {
            debug!(path = %path.display(), count = view.results.len(), "Loaded prior results");
            view.results
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Result file is corrupt, starting fresh");
            Vec::new()
        }
    }
}

/// Loads prior results keyed by task id.
///
/// Never fails: absence and corruption both mean "no prior progress".
pub async fn load(path: &Path) -> HashMap<String, EvalResult> {
    load_results(path)
        .await
        .into_iter()
        .map(|result| (result.task_id.clone(), result))
        .collect()
}

/// Overwrites `path` with `report`, creating parent directories as needed.
pub async fn persist(path: &Path, report: &BenchmarkReport) -> Result<(), StorageError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .await
            .map_err(|e| StorageError::io(parent, e))?;
    }

    let json = serde_json::to_string_pretty(report)?;

    let mut file = fs::File::create(path)
        .await
        .map_err(|e| StorageError::io(path, e))?;
    file.write_all(json.as_bytes())
        .await
        .map_err(|e| StorageError::io(path, e))?;
    file.sync_all().await.map_err(|e| StorageError::io(path, e))?;

    Ok(())
}

/// Reads a full report, failing on absence or corruption.
///
/// Used for analysis, where a bad file should be reported rather than
/// silently treated as empty.
pub async fn read_report(path: &Path) -> Result<BenchmarkReport, StorageError> {
    let content = fs::read_to_string(path)
        .await
        .map_err(|e| StorageError::io(path, e))?;
    Ok(serde_json::from_str(&content)?)
}
