//! Configuration for driver construction and per-call limits.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default maximum loop iterations for the invoked agent.
pub const DEFAULT_MAX_ITERATIONS: u32 = 15;

/// Default maximum recursion depth for the invoked agent.
pub const DEFAULT_MAX_DEPTH: u32 = 2;

/// Default wall-clock limit for a single call.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(300);

/// Per-call limits handed to [`Driver::call`](super::Driver::call).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriverOptions {
    /// Maximum loop iterations the agent may take.
    pub max_iterations: u32,
    /// Maximum recursion depth the agent may reach.
    pub max_depth: u32,
    /// Wall-clock limit for the call.
    pub timeout: Duration,
}

impl DriverOptions {
    /// Creates options with the default limits.
    pub fn new() -> Self {
        Self {
            max_iterations: DEFAULT_MAX_ITERATIONS,
            max_depth: DEFAULT_MAX_DEPTH,
            timeout: DEFAULT_CALL_TIMEOUT,
        }
    }

    /// Sets the iteration limit.
    pub fn with_max_iterations(mut self, max_iterations: u32) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Sets the recursion depth limit.
    pub fn with_max_depth(mut self, max_depth: u32) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Sets the call timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl Default for DriverOptions {
    fn default() -> Self {
        Self::new()
    }
}

/// Construction-time settings passed to every driver factory.
///
/// Drivers read everything they need from here instead of the process
/// environment, so concurrent calls never observe each other's settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DriverSettings {
    /// Model identifier forwarded to the agent as `RLM_MODEL`.
    pub model: Option<String>,
    /// Remote host (`user@host`) for the ssh driver.
    pub host: Option<String>,
    /// Explicit path to the agent executable.
    pub rlm_path: Option<PathBuf>,
    /// Fixed working-directory root; a fresh temp dir per call when unset.
    pub tree_root: Option<PathBuf>,
    /// Mock response directory forwarded as `_RLM_MOCK_DIR`.
    pub mock_dir: Option<PathBuf>,
    /// Command run on the remote host.
    pub remote_command: Option<String>,
    /// ssh `ConnectTimeout` in seconds.
    pub connect_timeout_secs: Option<u64>,
}

impl DriverSettings {
    /// Creates empty settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the model identifier.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Sets the remote host.
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    /// Sets the agent executable path.
    pub fn with_rlm_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.rlm_path = Some(path.into());
        self
    }

    /// Sets a fixed working-directory root.
    pub fn with_tree_root(mut self, path: impl Into<PathBuf>) -> Self {
        self.tree_root = Some(path.into());
        self
    }

    /// Sets the mock response directory.
    pub fn with_mock_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.mock_dir = Some(path.into());
        self
    }

    /// Sets the command run on the remote host.
    pub fn with_remote_command(mut self, command: impl Into<String>) -> Self {
        self.remote_command = Some(command.into());
        self
    }

    /// Sets the ssh connection timeout.
    pub fn with_connect_timeout_secs(mut self, secs: u64) -> Self {
        self.connect_timeout_secs = Some(secs);
        self
    }
}
