//! Post-hoc analysis of a persisted report.
//!
//! Everything here is derived from a [`BenchmarkReport`] plus, for the
//! recursion rate, a best-effort look at each result's trace directory.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::Serialize;
use walkdir::WalkDir;

use super::aggregate::{mean, median, percentile};
use super::types::{BenchmarkReport, EvalResult};

/// Number of score histogram buckets: ten of width 0.1 plus exact 1.0.
pub const SCORE_BUCKETS: usize = 11;

const BAR_WIDTH: usize = 30;

/// Distribution summary of one measured quantity.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Distribution {
    pub mean: f64,
    pub p20: f64,
    pub median: f64,
    pub p80: f64,
    pub min: f64,
    pub max: f64,
    pub total: f64,
}

impl Distribution {
    fn of(values: &[f64]) -> Self {
        let min = values.iter().copied().reduce(f64::min).unwrap_or(0.0);
        let max = values.iter().copied().reduce(f64::max).unwrap_or(0.0);
        Self {
            mean: mean(values),
            p20: percentile(values, 20.0),
            median: median(values),
            p80: percentile(values, 80.0),
            min,
            max,
            total: values.iter().sum(),
        }
    }
}

/// Counts behind the behavioural rates.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Behavior {
    /// Completed tasks answered in a single iteration.
    pub eager_returns: usize,
    /// Completed tasks with a positive score after more than one iteration.
    pub self_corrections: usize,
    /// Completed tasks whose trace has a non-empty `children` directory.
    pub recursive: usize,
    pub completed: usize,
    pub errored: usize,
    pub total: usize,
}

impl Behavior {
    pub fn eager_return_rate(&self) -> f64 {
        ratio(self.eager_returns, self.completed)
    }

    pub fn self_correction_rate(&self) -> f64 {
        ratio(self.self_corrections, self.completed)
    }

    pub fn recursive_rate(&self) -> f64 {
        ratio(self.recursive, self.completed)
    }

    pub fn error_rate(&self) -> f64 {
        ratio(self.errored, self.total)
    }
}

/// Success (score > 0) among completed tasks with a given iteration count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IterationBucket {
    pub iterations: u32,
    pub total: usize,
    pub success: usize,
}

/// Mean outcome for one S-NIAH context length.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextLengthRow {
    pub context_length: u64,
    pub mean_score: f64,
    pub mean_iterations: f64,
    pub count: usize,
}

/// Everything the `analyze` command reports.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Analysis {
    pub source: PathBuf,
    pub benchmark: String,
    pub model: String,
    pub timestamp: String,
    pub completed_tasks: usize,
    pub failed_tasks: usize,
    pub iterations: Distribution,
    /// Wall time in seconds.
    pub wall_time_secs: Distribution,
    pub behavior: Behavior,
    pub score_histogram: [usize; SCORE_BUCKETS],
    pub success_by_iterations: Vec<IterationBucket>,
    pub context_lengths: Vec<ContextLengthRow>,
    pub mean_score: f64,
    pub median_score: f64,
}

impl Analysis {
    /// Analyzes `report`, read from `source`.
    pub fn from_report(source: impl Into<PathBuf>, report: &BenchmarkReport) -> Self {
        let completed: Vec<&EvalResult> =
            report.results.iter().filter(|r| r.is_completed()).collect();

        let iterations: Vec<f64> = completed.iter().map(|r| f64::from(r.iterations)).collect();
        let wall_times: Vec<f64> = completed
            .iter()
            .map(|r| r.wall_time_ms as f64 / 1000.0)
            .collect();

        Self {
            source: source.into(),
            benchmark: report.benchmark.clone(),
            model: report.model.clone(),
            timestamp: report.timestamp.to_rfc3339(),
            completed_tasks: report.aggregate.completed_tasks,
            failed_tasks: report.aggregate.failed_tasks,
            iterations: Distribution::of(&iterations),
            wall_time_secs: Distribution::of(&wall_times),
            behavior: behavior(&report.results, &completed),
            score_histogram: score_histogram(&completed),
            success_by_iterations: success_by_iterations(&completed),
            context_lengths: context_lengths(&report.results),
            mean_score: report.aggregate.mean_score,
            median_score: report.aggregate.median_score,
        }
    }
}

fn ratio(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64
    }
}

fn behavior(all: &[EvalResult], completed: &[&EvalResult]) -> Behavior {
    Behavior {
        eager_returns: completed.iter().filter(|r| r.iterations == 1).count(),
        self_corrections: completed
            .iter()
            .filter(|r| r.score > 0.0 && r.iterations > 1)
            .count(),
        recursive: completed
            .iter()
            .filter_map(|r| r.trace.as_deref())
            .filter(|trace| has_children(Path::new(trace)))
            .count(),
        completed: completed.len(),
        errored: all.iter().filter(|r| !r.is_completed()).count(),
        total: all.len(),
    }
}

/// Best effort: unreadable or remote traces count as non-recursive.
fn has_children(trace: &Path) -> bool {
    std::fs::read_dir(trace.join("children"))
        .map(|mut entries| entries.next().is_some())
        .unwrap_or(false)
}

/// Bucket `i` holds scores in `[i/10, (i+1)/10)`; the last holds exactly 1.0.
pub fn score_histogram(completed: &[&EvalResult]) -> [usize; SCORE_BUCKETS] {
    let mut buckets = [0usize; SCORE_BUCKETS];
    for result in completed {
        let index = ((result.score * 10.0).floor().max(0.0) as usize).min(SCORE_BUCKETS - 1);
        buckets[index] += 1;
    }
    buckets
}

fn success_by_iterations(completed: &[&EvalResult]) -> Vec<IterationBucket> {
    let mut groups: BTreeMap<u32, (usize, usize)> = BTreeMap::new();
    for result in completed {
        let entry = groups.entry(result.iterations).or_default();
        entry.0 += 1;
        if result.score > 0.0 {
            entry.1 += 1;
        }
    }
    groups
        .into_iter()
        .map(|(iterations, (total, success))| IterationBucket {
            iterations,
            total,
            success,
        })
        .collect()
}

/// Groups `s-niah-<len>-<i>` results by context length.
fn context_lengths(results: &[EvalResult]) -> Vec<ContextLengthRow> {
    let mut groups: BTreeMap<u64, (Vec<f64>, Vec<f64>)> = BTreeMap::new();
    for result in results {
        let Some(rest) = result.task_id.strip_prefix("s-niah-") else {
            continue;
        };
        let Some(length) = rest.split('-').next().and_then(|s| s.parse::<u64>().ok()) else {
            continue;
        };
        let entry = groups.entry(length).or_default();
        entry.0.push(result.score);
        entry.1.push(f64::from(result.iterations));
    }
    groups
        .into_iter()
        .map(|(context_length, (scores, iterations))| ContextLengthRow {
            context_length,
            mean_score: mean(&scores),
            mean_iterations: mean(&iterations),
            count: scores.len(),
        })
        .collect()
}

/// Newest report in `dir`: the last `*.json` file by name.
///
/// Report file names embed a sortable timestamp, so name order is time order.
pub fn find_latest_result(dir: &Path) -> Option<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| path.extension().is_some_and(|ext| ext == "json"))
        .collect();
    files.sort();
    files.pop()
}

fn format_length(len: u64) -> String {
    const KIB: u64 = 1024;
    const MIB: u64 = 1024 * 1024;
    if len >= MIB {
        format!("{:.0}M", len as f64 / MIB as f64)
    } else if len >= KIB {
        format!("{:.0}K", len as f64 / KIB as f64)
    } else {
        len.to_string()
    }
}

impl fmt::Display for Analysis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Analysis of: {}", self.source.display())?;
        writeln!(
            f,
            "Benchmark: {} | Model: {} | {}",
            self.benchmark, self.model, self.timestamp
        )?;
        writeln!(
            f,
            "Tasks: {} completed, {} failed",
            self.completed_tasks, self.failed_tasks
        )?;
        writeln!(f)?;

        let it = &self.iterations;
        writeln!(f, "=== Iteration Statistics ===")?;
        writeln!(f, "  Mean:    {:.2}", it.mean)?;
        writeln!(f, "  P20:     {:.2}", it.p20)?;
        writeln!(f, "  Median:  {:.2}", it.median)?;
        writeln!(f, "  P80:     {:.2}", it.p80)?;
        writeln!(f, "  Min:     {}", it.min)?;
        writeln!(f, "  Max:     {}", it.max)?;
        writeln!(f)?;

        let wt = &self.wall_time_secs;
        writeln!(f, "=== Wall Time (seconds) ===")?;
        writeln!(f, "  Mean:    {:.2}s", wt.mean)?;
        writeln!(f, "  Median:  {:.2}s", wt.median)?;
        writeln!(f, "  P20:     {:.2}s", wt.p20)?;
        writeln!(f, "  P80:     {:.2}s", wt.p80)?;
        writeln!(f, "  Min:     {:.2}s", wt.min)?;
        writeln!(f, "  Max:     {:.2}s", wt.max)?;
        writeln!(f, "  Total:   {:.1}s", wt.total)?;
        writeln!(f)?;

        let b = &self.behavior;
        writeln!(f, "=== Behavioral Patterns ===")?;
        if b.completed == 0 {
            writeln!(f, "  No completed tasks to analyze.")?;
        } else {
            writeln!(
                f,
                "  Eager return rate:    {:.1}% ({}/{})",
                b.eager_return_rate() * 100.0,
                b.eager_returns,
                b.completed
            )?;
            writeln!(
                f,
                "  Self-correction rate: {:.1}% ({}/{})",
                b.self_correction_rate() * 100.0,
                b.self_corrections,
                b.completed
            )?;
            writeln!(
                f,
                "  Recursive usage:      {:.1}% ({}/{})",
                b.recursive_rate() * 100.0,
                b.recursive,
                b.completed
            )?;
            writeln!(
                f,
                "  Error rate:           {:.1}% ({}/{})",
                b.error_rate() * 100.0,
                b.errored,
                b.total
            )?;
        }
        writeln!(f)?;

        writeln!(f, "=== Score Distribution ===")?;
        let max_count = self.score_histogram.iter().copied().max().unwrap_or(0).max(1);
        for (i, count) in self.score_histogram.iter().enumerate() {
            let label = if i < SCORE_BUCKETS - 1 {
                format!("[{:.1}, {:.1})", i as f64 / 10.0, (i + 1) as f64 / 10.0)
            } else {
                "[1.0]       ".to_string()
            };
            let bar_len = (*count as f64 / max_count as f64 * BAR_WIDTH as f64).round() as usize;
            writeln!(f, "  {label} {} {count}", "#".repeat(bar_len))?;
        }
        writeln!(f)?;

        writeln!(f, "=== Success Rate by Iteration Count ===")?;
        for bucket in &self.success_by_iterations {
            writeln!(
                f,
                "  {} iterations: {:.0}% success ({}/{})",
                bucket.iterations,
                ratio(bucket.success, bucket.total) * 100.0,
                bucket.success,
                bucket.total
            )?;
        }
        writeln!(f)?;

        if !self.context_lengths.is_empty() {
            writeln!(f, "=== Context Length Analysis (S-NIAH) ===")?;
            for row in &self.context_lengths {
                writeln!(
                    f,
                    "  {:>5}: score {:.2} | iterations {:.1} | n={}",
                    format_length(row.context_length),
                    row.mean_score,
                    row.mean_iterations,
                    row.count
                )?;
            }
            writeln!(f)?;
        }

        writeln!(f, "=== Summary ===")?;
        writeln!(f, "  Mean score:     {:.4}", self.mean_score)?;
        write!(f, "  Median score:   {:.4}", self.median_score)
    }
}
