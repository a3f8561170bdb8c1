//! Result of a single driver call.

use serde::{Deserialize, Serialize};

/// What a driver hands back for one query.
///
/// Consumed immediately by the scheduler to build an `EvalResult`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvocationResult {
    /// Final answer printed by the agent, trimmed.
    pub answer: String,
    /// Exit code of the invoked process.
    pub exit_code: i32,
    /// Wall-clock time of the call in milliseconds.
    pub wall_time_ms: u64,
    /// Opaque locator for post-hoc inspection.
    pub trace: String,
    /// Iteration count reported by the agent, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iterations: Option<u32>,
}

impl InvocationResult {
    /// Creates a result for a call that exited with `exit_code`.
    pub fn new(
        answer: impl Into<String>,
        exit_code: i32,
        wall_time_ms: u64,
        trace: impl Into<String>,
    ) -> Self {
        Self {
            answer: answer.into(),
            exit_code,
            wall_time_ms,
            trace: trace.into(),
            iterations: None,
        }
    }

    /// Sets the reported iteration count.
    pub fn with_iterations(mut self, iterations: u32) -> Self {
        self.iterations = Some(iterations);
        self
    }

    /// Returns true if the process exited with code 0.
    pub fn is_success(&self) -> bool {
        self.exit_code == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invocation_result_success() {
        let result = InvocationResult::new("crimson-falcon-4821", 0, 1200, "/tmp/rlm-eval-x/123");
        assert!(result.is_success());
        assert_eq!(result.iterations, None);
    }

    #[test]
    fn test_invocation_result_with_iterations() {
        let result = InvocationResult::new("", 2, 50, "ssh://box").with_iterations(4);
        assert!(!result.is_success());
        assert_eq!(result.iterations, Some(4));
    }

    #[test]
    fn test_invocation_result_serialization_skips_missing_iterations() {
        let result = InvocationResult::new("42", 0, 10, "trace");
        let json = serde_json::to_string(&result).unwrap();
        assert!(json.contains("\"wallTimeMs\":10"));
        assert!(!json.contains("iterations"));
    }
}
