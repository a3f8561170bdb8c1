//! YAML run profiles.
//!
//! A profile pre-fills `rlm-eval run` flags so a benchmark setup can be
//! checked in and repeated. Every field is optional; values given on the
//! command line win over the profile, and the profile wins over built-in
//! defaults.
//!
//! ```yaml
//! benchmark: oolong
//! model: anthropic/claude-sonnet-4
//! driver: ssh
//! host: eval@gpu-box
//! concurrency: 8
//! context_len: 131072
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::datasets::Benchmark;
use crate::error::ConfigError;

/// Run profile loaded from `--config`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EvalConfig {
    pub benchmark: Option<Benchmark>,
    pub model: Option<String>,
    pub driver: Option<String>,
    pub host: Option<String>,
    pub concurrency: Option<usize>,
    pub max_iterations: Option<u32>,
    pub max_depth: Option<u32>,
    pub timeout_secs: Option<u64>,
    pub max_tasks: Option<usize>,

    // S-NIAH
    pub tasks_per_length: Option<usize>,
    pub context_lengths: Option<Vec<usize>>,
    pub seed: Option<u64>,

    // OOLONG
    pub context_len: Option<u64>,
    pub dataset_filter: Option<String>,

    // ARC
    pub selected_problems: Option<Vec<String>>,

    pub data_dir: Option<PathBuf>,
    pub results_dir: Option<PathBuf>,

    // Driver construction
    pub rlm_path: Option<PathBuf>,
    pub tree_root: Option<PathBuf>,
    pub mock_dir: Option<PathBuf>,
    pub remote_command: Option<String>,
    pub connect_timeout_secs: Option<u64>,
}

impl EvalConfig {
    /// Reads and validates a profile from disk.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_yaml(&content)
    }

    /// Parses and validates a profile. An empty document is an empty profile.
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: Self = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.concurrency == Some(0) {
            return Err(ConfigError::Invalid("concurrency must be at least 1".to_string()));
        }
        if self.timeout_secs == Some(0) {
            return Err(ConfigError::Invalid("timeout_secs must be at least 1".to_string()));
        }
        if self.tasks_per_length == Some(0) {
            return Err(ConfigError::Invalid(
                "tasks_per_length must be at least 1".to_string(),
            ));
        }
        if self.context_lengths.as_ref().is_some_and(|l| l.is_empty()) {
            return Err(ConfigError::Invalid("context_lengths must not be empty".to_string()));
        }
        Ok(())
    }
}
