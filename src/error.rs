//! Error types for rlm-eval operations.
//!
//! Defines the error enums for each subsystem:
//! - Driver construction and invocation
//! - Scoring functions
//! - Task sources (datasets)
//! - Run profile configuration
//! - Harness setup
//!
//! Per-task failures never surface as these errors to the caller of the
//! harness; they are folded into the task's result instead.

use thiserror::Error;

use crate::storage::StorageError;

/// Errors that can occur while constructing or calling a driver.
#[derive(Debug, Error)]
pub enum DriverError {
    #[error("Unknown driver '{name}' (available: {available})")]
    UnknownDriver { name: String, available: String },

    #[error("Driver '{driver}' is misconfigured: {reason}")]
    Misconfigured { driver: String, reason: String },

    #[error("Failed to prepare working directory: {0}")]
    WorkDir(String),

    #[error("Driver call failed: {0}")]
    CallFailed(String),

    #[error("Driver did not return within {0:?}")]
    Unresponsive(std::time::Duration),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors that can occur while scoring an answer.
#[derive(Debug, Error)]
pub enum ScoringError {
    #[error("Scoring rejected answer: {0}")]
    Rejected(String),

    #[error("Scoring produced a non-finite value: {0}")]
    NonFinite(f64),
}

/// Errors that can occur while loading tasks.
#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("Data directory not found: {0}")]
    MissingDataDir(String),

    #[error("No data files found in {0}")]
    NoDataFiles(String),

    #[error("No solution found for ARC task {0}")]
    MissingSolution(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors that can occur while loading a run profile.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Invalid config value: {0}")]
    Invalid(String),
}

/// Setup failures that abort a run before or after scheduling.
#[derive(Debug, Error)]
pub enum HarnessError {
    #[error("Concurrency must be at least 1")]
    ZeroConcurrency,

    #[error("Duplicate task id in task list: {0}")]
    DuplicateTask(String),

    #[error("Dataset error: {0}")]
    Dataset(#[from] DatasetError),

    #[error("Driver error: {0}")]
    Driver(#[from] DriverError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_driver_display() {
        let err = DriverError::UnknownDriver {
            name: "sprite".to_string(),
            available: "local, ssh".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("sprite"));
        assert!(msg.contains("local, ssh"));
    }

    #[test]
    fn test_harness_error_from_dataset() {
        let err: HarnessError = DatasetError::NoDataFiles("/data/oolong".to_string()).into();
        assert!(err.to_string().contains("/data/oolong"));
    }

    #[test]
    fn test_scoring_error_display() {
        let err = ScoringError::NonFinite(f64::NAN);
        assert!(err.to_string().contains("non-finite"));
    }
}
