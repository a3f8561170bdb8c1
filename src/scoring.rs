//! Scoring functions: `(expected, actual) -> score in [0, 1]`.
//!
//! All built-in scorers are pure and total; they return 0 for empty or
//! malformed answers instead of failing.

use std::collections::HashMap;
use std::sync::{Arc, LazyLock};

use regex::Regex;

use crate::datasets::Benchmark;
use crate::error::ScoringError;

/// Scoring function as the harness consumes it.
///
/// Custom scorers may refuse an input by returning an error; the harness
/// records that as a failed task.
pub type ScoringFn = Arc<dyn Fn(&str, &str) -> Result<f64, ScoringError> + Send + Sync>;

static TOKEN_SEPARATOR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\s\p{P}]+").expect("static regex is valid"));

/// Base of the numeric OOLONG score: each unit of error costs a quarter.
const NUMERIC_DECAY: f64 = 0.75;

/// Trimmed, case-insensitive equality.
pub fn exact_match(expected: &str, actual: &str) -> f64 {
    if expected.trim().to_lowercase() == actual.trim().to_lowercase() {
        1.0
    } else {
        0.0
    }
}

/// Numeric answers score `0.75^|diff|`; text answers score 1 when the
/// expected label appears anywhere in the answer.
pub fn oolong_score(expected: &str, actual: &str) -> f64 {
    let expected = expected.trim();
    let actual = actual.trim();

    if let (Some(e), Some(a)) = (parse_number(expected), parse_number(actual)) {
        return NUMERIC_DECAY.powf((e - a).abs());
    }

    if actual.to_lowercase().contains(&expected.to_lowercase()) {
        1.0
    } else {
        0.0
    }
}

fn parse_number(s: &str) -> Option<f64> {
    if s.is_empty() {
        return None;
    }
    s.parse::<f64>().ok().filter(|n| n.is_finite())
}

fn tokenize(s: &str) -> Vec<String> {
    TOKEN_SEPARATOR
        .split(&s.to_lowercase())
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// Token-level F1 over lowercase words.
pub fn f1_score(expected: &str, actual: &str) -> f64 {
    let expected_tokens = tokenize(expected);
    let actual_tokens = tokenize(actual);

    match (expected_tokens.is_empty(), actual_tokens.is_empty()) {
        (true, true) => return 1.0,
        (true, false) | (false, true) => return 0.0,
        _ => {}
    }

    let mut remaining: HashMap<&str, usize> = HashMap::new();
    for token in &expected_tokens {
        *remaining.entry(token.as_str()).or_default() += 1;
    }

    let mut true_positives = 0usize;
    for token in &actual_tokens {
        if let Some(count) = remaining.get_mut(token.as_str()).filter(|c| **c > 0) {
            *count -= 1;
            true_positives += 1;
        }
    }

    if true_positives == 0 {
        return 0.0;
    }
    let precision = true_positives as f64 / actual_tokens.len() as f64;
    let recall = true_positives as f64 / expected_tokens.len() as f64;
    2.0 * precision * recall / (precision + recall)
}

/// Structural JSON equality, for ARC grids.
pub fn grid_match(expected: &str, actual: &str) -> f64 {
    let parse = |s: &str| serde_json::from_str::<serde_json::Value>(s.trim()).ok();
    match (parse(expected), parse(actual)) {
        (Some(e), Some(a)) if e == a => 1.0,
        _ => 0.0,
    }
}

/// Wraps an infallible scorer.
pub fn infallible<F>(f: F) -> ScoringFn
where
    F: Fn(&str, &str) -> f64 + Send + Sync + 'static,
{
    Arc::new(
        move |expected: &str, actual: &str| -> Result<f64, ScoringError> {
            Ok(f(expected, actual))
        },
    )
}

/// Default scorer for each benchmark.
pub fn scorer_for(benchmark: Benchmark) -> ScoringFn {
    match benchmark {
        Benchmark::SNiah => infallible(exact_match),
        Benchmark::Oolong => infallible(oolong_score),
        Benchmark::Arc => infallible(grid_match),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_exact_match() {
        assert_eq!(exact_match("crimson-falcon-4821", "  Crimson-Falcon-4821\n"), 1.0);
        assert_eq!(exact_match("crimson-falcon-4821", "crimson-falcon-4822"), 0.0);
        assert_eq!(exact_match("x", ""), 0.0);
    }

    #[test]
    fn test_oolong_numeric() {
        assert_eq!(oolong_score("42", "42"), 1.0);
        assert!(close(oolong_score("42", "40"), 0.5625));
        assert!(close(oolong_score("3", " 4 "), 0.75));
    }

    #[test]
    fn test_oolong_text() {
        assert_eq!(oolong_score("abbreviation", "Label: Abbreviation"), 1.0);
        assert_eq!(
            oolong_score("more common than", "Answer: spam is more common than ham"),
            1.0
        );
        assert_eq!(oolong_score("entity", "location"), 0.0);
        assert_eq!(oolong_score("7", ""), 0.0);
        assert_eq!(oolong_score("7", "about 7"), 1.0);
    }

    #[test]
    fn test_f1_score() {
        assert_eq!(f1_score("", ""), 1.0);
        assert_eq!(f1_score("a", ""), 0.0);
        assert_eq!(f1_score("", "a"), 0.0);
        assert_eq!(f1_score("The quick fox", "the, QUICK fox!"), 1.0);
        // precision 1/2, recall 1/3
        assert!(close(f1_score("red green blue", "red yellow"), 0.4));
        assert!(close(f1_score("red red", "red"), 2.0 / 3.0));
        assert_eq!(f1_score("alpha", "beta"), 0.0);
    }

    #[test]
    fn test_grid_match() {
        assert_eq!(grid_match("[[1,2],[3,4]]", " [[1, 2], [3, 4]]\n"), 1.0);
        assert_eq!(grid_match("[[1,2],[3,4]]", "[[1,2],[3,5]]"), 0.0);
        assert_eq!(grid_match("[[1]]", "the answer is [[1]]"), 0.0);
        assert_eq!(grid_match("[[1]]", ""), 0.0);
    }

    #[test]
    fn test_scorer_for() {
        let sniah = scorer_for(Benchmark::SNiah);
        assert_eq!(sniah("abc", "ABC").unwrap(), 1.0);
        let arc = scorer_for(Benchmark::Arc);
        assert_eq!(arc("[[0]]", "[[0]]").unwrap(), 1.0);
        let oolong = scorer_for(Benchmark::Oolong);
        assert!(close(oolong("10", "9").unwrap(), 0.75));
    }
}
