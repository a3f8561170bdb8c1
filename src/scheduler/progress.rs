//! Per-completion progress reporting.
//!
//! The harness emits one [`ProgressInfo`] after every finished task; where it
//! goes is up to the [`ProgressSink`] the caller supplies.

use std::io::Write;
use std::time::Duration;

/// Snapshot emitted after each task completion.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressInfo {
    /// Finished tasks, including ones resumed from a previous run.
    pub completed: usize,
    pub total: usize,
    /// Score of the task that just finished.
    pub score: f64,
    /// Mean score over all results without an error.
    pub mean_score: f64,
    /// Wall time since scheduling started, see [`format_elapsed`].
    pub elapsed: String,
}

impl ProgressInfo {
    /// Single-line rendering: `[c/t] score: x.xx | mean: x.xx | elapsed: e`.
    pub fn line(&self) -> String {
        format!(
            "[{}/{}] score: {:.2} | mean: {:.2} | elapsed: {}",
            self.completed, self.total, self.score, self.mean_score, self.elapsed
        )
    }
}

/// Receiver of progress snapshots.
pub trait ProgressSink: Send + Sync {
    fn report(&self, progress: &ProgressInfo);
}

impl<F> ProgressSink for F
where
    F: Fn(&ProgressInfo) + Send + Sync,
{
    fn report(&self, progress: &ProgressInfo) {
        self(progress)
    }
}

/// Rewrites a single status line on stderr.
#[derive(Debug, Clone, Copy, Default)]
pub struct StderrProgress;

impl ProgressSink for StderrProgress {
    fn report(&self, progress: &ProgressInfo) {
        let mut stderr = std::io::stderr().lock();
        // Progress output is best effort.
        let _ = write!(stderr, "\r{}", progress.line());
        let _ = stderr.flush();
    }
}

/// Compact elapsed time: `42s`, `3m07s`, `2h05m`.
pub fn format_elapsed(elapsed: Duration) -> String {
    let seconds = elapsed.as_secs();
    let minutes = seconds / 60;
    let hours = minutes / 60;

    if hours > 0 {
        format!("{}h{:02}m", hours, minutes % 60)
    } else if minutes > 0 {
        format!("{}m{:02}s", minutes, seconds % 60)
    } else {
        format!("{}s", seconds)
    }
}
