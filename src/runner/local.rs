//! Local subprocess driver.
//!
//! Spawns the agent binary directly, with a private working-directory root
//! per call, and recovers iteration count and trace location afterwards.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use tracing::debug;

use super::config::{DriverOptions, DriverSettings};
use super::driver::Driver;
use super::process::{invoke, InvokeRequest};
use super::result::InvocationResult;
use crate::error::DriverError;

/// Agent executable name used when no checked-in copy exists.
pub const RLM_BINARY: &str = "rlm";

/// Prefix of per-call working-directory roots.
const TREE_ROOT_PREFIX: &str = "rlm-eval-";

/// Structured metadata line the agent prints on stderr.
static META_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"rlm-meta: (\{.*\})").expect("static regex is valid"));

/// Driver that runs the agent as a child of this process.
#[derive(Debug, Clone)]
pub struct LocalDriver {
    rlm_path: PathBuf,
    tree_root: Option<PathBuf>,
    mock_dir: Option<PathBuf>,
    model: Option<String>,
}

impl LocalDriver {
    /// Registry name.
    pub const NAME: &'static str = "local";

    /// Builds the driver from settings, locating the binary if not given.
    pub fn from_settings(settings: &DriverSettings) -> Self {
        Self {
            rlm_path: settings.rlm_path.clone().unwrap_or_else(find_rlm_binary),
            tree_root: settings.tree_root.clone(),
            mock_dir: settings.mock_dir.clone(),
            model: settings.model.clone(),
        }
    }

    /// Path of the executable this driver launches.
    pub fn rlm_path(&self) -> &Path {
        &self.rlm_path
    }

    /// Working-directory root for one call.
    fn prepare_tree_root(&self) -> Result<PathBuf, DriverError> {
        if let Some(root) = &self.tree_root {
            return Ok(root.clone());
        }
        let dir = tempfile::Builder::new()
            .prefix(TREE_ROOT_PREFIX)
            .tempdir()
            .map_err(|e| DriverError::WorkDir(e.to_string()))?;
        // Kept on disk: the trace outlives the call.
        Ok(dir.keep())
    }

    fn build_request(
        &self,
        query: &str,
        context: Option<&str>,
        options: &DriverOptions,
        tree_root: &Path,
    ) -> InvokeRequest {
        let mut request = InvokeRequest::new(&self.rlm_path)
            .arg(query)
            .with_stdin(context.map(str::to_string))
            .with_timeout(options.timeout)
            .with_env("RLM_MAX_ITERATIONS", options.max_iterations.to_string())
            .with_env("RLM_MAX_DEPTH", options.max_depth.to_string())
            .with_env("_RLM_TREE_ROOT", tree_root.display().to_string());

        if let Some(mock_dir) = &self.mock_dir {
            request = request.with_env("_RLM_MOCK_DIR", mock_dir.display().to_string());
        }
        if let Some(model) = &self.model {
            request = request.with_env("RLM_MODEL", model.clone());
        }
        request
    }
}

#[async_trait]
impl Driver for LocalDriver {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn call(
        &self,
        query: &str,
        context: Option<&str>,
        options: &DriverOptions,
    ) -> Result<InvocationResult, DriverError> {
        let tree_root = self.prepare_tree_root()?;
        let request = self.build_request(query, context, options, &tree_root);

        let output = invoke(&request).await;

        let iterations = parse_iterations(&output.stderr);
        let trace = resolve_trace(&tree_root).await;
        debug!(
            trace = %trace.display(),
            iterations = ?iterations,
            exit_code = output.exit_code,
            "Local call finished"
        );

        let mut result = InvocationResult::new(
            output.stdout.trim(),
            output.exit_code,
            output.wall_time_ms,
            trace.display().to_string(),
        );
        if let Some(iterations) = iterations {
            result = result.with_iterations(iterations);
        }
        Ok(result)
    }
}

/// Checked-in binary next to the crate, else a bare name for `PATH` lookup.
pub fn find_rlm_binary() -> PathBuf {
    let checked_in = Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("..")
        .join("bin")
        .join(RLM_BINARY);
    if checked_in.is_file() {
        return checked_in;
    }
    PathBuf::from(RLM_BINARY)
}

/// Extracts `iterations` from the `rlm-meta: {...}` line on stderr.
pub fn parse_iterations(stderr: &str) -> Option<u32> {
    let captures = META_LINE.captures(stderr)?;
    let meta: serde_json::Value = serde_json::from_str(captures.get(1)?.as_str()).ok()?;
    meta.get("iterations")?
        .as_u64()
        .and_then(|n| u32::try_from(n).ok())
}

/// The agent writes its workdir as a child of the tree root; fall back to
/// the root itself when nothing was written.
pub async fn resolve_trace(tree_root: &Path) -> PathBuf {
    let Ok(mut entries) = tokio::fs::read_dir(tree_root).await else {
        return tree_root.to_path_buf();
    };

    let mut dirs = Vec::new();
    while let Ok(Some(entry)) = entries.next_entry().await {
        if entry.file_type().await.is_ok_and(|t| t.is_dir()) {
            dirs.push(entry.path());
        }
    }
    dirs.sort();

    dirs.pop().unwrap_or_else(|| tree_root.to_path_buf())
}
