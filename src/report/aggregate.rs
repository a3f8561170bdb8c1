//! Order statistics and the run-level aggregate.
//!
//! Every helper defines its value over an empty input as 0.

use serde::{Deserialize, Serialize};

use super::types::EvalResult;

/// Returns a sorted copy of `values`.
pub fn sorted(values: &[f64]) -> Vec<f64> {
    let mut out = values.to_vec();
    out.sort_by(|a, b| a.total_cmp(b));
    out
}

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Middle value; the average of the two middle values for even lengths.
pub fn median(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let s = sorted(values);
    let mid = s.len() / 2;
    if s.len() % 2 == 1 {
        s[mid]
    } else {
        (s[mid - 1] + s[mid]) / 2.0
    }
}

/// Nearest-rank percentile: index `ceil(p/100 * n) - 1`, clamped to `[0, n-1]`.
pub fn percentile(values: &[f64], p: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let s = sorted(values);
    let rank = (p / 100.0 * s.len() as f64).ceil() as i64 - 1;
    let index = rank.clamp(0, s.len() as i64 - 1) as usize;
    s[index]
}

/// Population standard deviation.
pub fn std_dev(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let m = mean(values);
    let variance = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64;
    variance.sqrt()
}

/// Summary statistics over a result set.
///
/// Score, iteration and wall-time statistics only cover completed results;
/// failed results are counted but otherwise ignored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateStats {
    pub mean_score: f64,
    pub median_score: f64,
    pub std_score: f64,
    pub p25_score: f64,
    pub p75_score: f64,
    pub mean_iterations: f64,
    pub median_iterations: f64,
    pub mean_wall_time_ms: f64,
    pub total_wall_time_ms: u64,
    pub completed_tasks: usize,
    pub failed_tasks: usize,
}

impl AggregateStats {
    /// Recomputes the aggregate from scratch.
    pub fn compute(results: &[EvalResult]) -> Self {
        let (completed, failed): (Vec<&EvalResult>, Vec<&EvalResult>) =
            results.iter().partition(|r| r.is_completed());

        let scores: Vec<f64> = completed.iter().map(|r| r.score).collect();
        let iterations: Vec<f64> = completed.iter().map(|r| f64::from(r.iterations)).collect();
        let wall_times: Vec<f64> = completed.iter().map(|r| r.wall_time_ms as f64).collect();

        Self {
            mean_score: mean(&scores),
            median_score: median(&scores),
            std_score: std_dev(&scores),
            p25_score: percentile(&scores, 25.0),
            p75_score: percentile(&scores, 75.0),
            mean_iterations: mean(&iterations),
            median_iterations: median(&iterations),
            mean_wall_time_ms: mean(&wall_times),
            total_wall_time_ms: completed.iter().map(|r| r.wall_time_ms).sum(),
            completed_tasks: completed.len(),
            failed_tasks: failed.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(id: &str, score: f64, iterations: u32, wall_time_ms: u64) -> EvalResult {
        EvalResult {
            task_id: id.to_string(),
            query: "q".to_string(),
            expected_answer: "a".to_string(),
            generated_answer: "a".to_string(),
            score,
            iterations,
            wall_time_ms,
            error: None,
            trace: None,
        }
    }

    #[test]
    fn test_score_statistics() {
        let scores = [0.0, 0.5, 1.0, 1.0];
        assert!((mean(&scores) - 0.625).abs() < 1e-12);
        assert!((median(&scores) - 0.75).abs() < 1e-12);
        assert_eq!(percentile(&scores, 25.0), 0.0);
        assert_eq!(percentile(&scores, 75.0), 1.0);
    }

    #[test]
    fn test_empty_inputs_are_zero() {
        assert_eq!(mean(&[]), 0.0);
        assert_eq!(median(&[]), 0.0);
        assert_eq!(percentile(&[], 50.0), 0.0);
        assert_eq!(std_dev(&[]), 0.0);
        assert_eq!(AggregateStats::compute(&[]), AggregateStats::default());
    }

    #[test]
    fn test_percentile_edges() {
        let values = [3.0, 1.0, 2.0];
        assert_eq!(percentile(&values, 0.0), 1.0);
        assert_eq!(percentile(&values, 100.0), 3.0);
        assert_eq!(median(&values), 2.0);
    }

    #[test]
    fn test_population_std_dev() {
        let values = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        assert!((std_dev(&values) - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_aggregate_skips_failed_results() {
        let results = vec![
            result("a", 0.0, 1, 100),
            result("b", 0.5, 2, 200),
            result("c", 1.0, 3, 300),
            result("d", 1.0, 4, 400),
            EvalResult::failed("e", "q", "a", "exit code 2"),
        ];

        let stats = AggregateStats::compute(&results);

        assert_eq!(stats.completed_tasks, 4);
        assert_eq!(stats.failed_tasks, 1);
        assert!((stats.mean_score - 0.625).abs() < 1e-12);
        assert!((stats.median_score - 0.75).abs() < 1e-12);
        assert_eq!(stats.p25_score, 0.0);
        assert_eq!(stats.p75_score, 1.0);
        assert!((stats.mean_iterations - 2.5).abs() < 1e-12);
        assert!((stats.median_iterations - 2.5).abs() < 1e-12);
        assert!((stats.mean_wall_time_ms - 250.0).abs() < 1e-12);
        assert_eq!(stats.total_wall_time_ms, 1000);
    }
}
