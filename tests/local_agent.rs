//! Full runs through the local driver against a scripted stand-in agent.

#![cfg(unix)]

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tempfile::TempDir;

use rlm_eval::runner::LocalDriver;
use rlm_eval::scoring::{exact_match, infallible};
use rlm_eval::{run_harness, DriverOptions, DriverSettings, HarnessConfig, Task};

/// Answers with the first line of its context and leaves two iteration
/// files in its trace. `fail` exits 3, `hang` never returns.
const FAKE_AGENT: &str = r#"#!/bin/sh
trace="$_RLM_TREE_ROOT/run-$$/trace"
mkdir -p "$trace"
: > "$trace/000-response.md"
: > "$trace/001-response.md"
case "$1" in
  fail) echo "model unavailable" >&2; exit 3 ;;
  hang) exec sleep 30 ;;
esac
read -r first
cat > /dev/null
echo "$first"
"#;

fn install_agent(dir: &Path) -> PathBuf {
    let path = dir.join("rlm");
    fs::write(&path, FAKE_AGENT).unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    path
}

fn remove_tree_root(trace: Option<&str>) {
    if let Some(root) = trace.and_then(|t| Path::new(t).parent()) {
        if root.file_name().is_some_and(|n| n.to_string_lossy().starts_with("rlm-eval-")) {
            let _ = fs::remove_dir_all(root);
        }
    }
}

#[tokio::test]
async fn test_local_driver_run() {
    let bin = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();
    let agent = install_agent(bin.path());

    let driver = Arc::new(LocalDriver::from_settings(
        &DriverSettings::new().with_rlm_path(&agent).with_model("mock/model"),
    ));
    let config = HarnessConfig::new("s-niah", "mock/model", out.path().join("run.json"))
        .with_concurrency(2)
        .with_driver_options(DriverOptions::new().with_timeout(Duration::from_millis(300)));

    let tasks = vec![
        Task::new("ok", "What is the code?", "crimson-falcon-4821")
            .with_context("crimson-falcon-4821\nfiller text follows"),
        Task::new("wrong", "What is the code?", "amber-wolf-1000")
            .with_context("silver-hawk-2000\n"),
        Task::new("fail", "fail", "x"),
        Task::new("hang", "hang", "x"),
    ];

    let start = Instant::now();
    let report = run_harness(tasks, driver, infallible(exact_match), &config, None)
        .await
        .unwrap();
    assert!(start.elapsed() < Duration::from_secs(10));

    let ok = report.result("ok").unwrap();
    assert_eq!(ok.score, 1.0);
    assert_eq!(ok.generated_answer, "crimson-falcon-4821");
    assert_eq!(ok.iterations, 2);
    let trace = Path::new(ok.trace.as_deref().unwrap());
    assert!(trace.file_name().unwrap().to_string_lossy().starts_with("run-"));

    let wrong = report.result("wrong").unwrap();
    assert_eq!(wrong.score, 0.0);
    assert!(wrong.error.is_none());

    let fail = report.result("fail").unwrap();
    assert_eq!(fail.error.as_deref(), Some("exit code 3"));
    assert_eq!(fail.generated_answer, "");

    let hang = report.result("hang").unwrap();
    assert!(hang.error.is_some());
    assert_eq!(hang.score, 0.0);

    assert_eq!(report.aggregate.completed_tasks, 2);
    assert_eq!(report.aggregate.failed_tasks, 2);
    assert_eq!(report.aggregate.mean_score, 0.5);

    for result in &report.results {
        remove_tree_root(result.trace.as_deref());
    }
}
