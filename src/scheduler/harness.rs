//! Benchmark run loop.
//!
//! Resumes from the output file, schedules every pending task on the worker
//! pool, and rewrites the full report after each completion.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::progress::{format_elapsed, ProgressInfo, ProgressSink};
use super::worker_pool::{PoolConfig, TaskExecutor, WorkerPool};
use crate::datasets::Task;
use crate::error::{DriverError, HarnessError, ScoringError};
use crate::metrics::MetricsCollector;
use crate::report::{BenchmarkReport, EvalResult, RunConfig};
use crate::runner::{Driver, DriverOptions, LocalDriver};
use crate::scoring::ScoringFn;
use crate::storage;

/// Default number of tasks in flight.
pub const DEFAULT_CONCURRENCY: usize = 5;

/// Extra time a driver gets beyond its own timeout before the call is
/// abandoned.
pub const CALL_GUARD_SLACK: Duration = Duration::from_secs(5);

/// Files the agent writes per iteration under `<trace>/trace/`.
const RESPONSE_SUFFIX: &str = "-response.md";

/// Configuration for one harness run.
#[derive(Debug, Clone)]
pub struct HarnessConfig {
    pub benchmark: String,
    pub model: String,
    /// Recorded in the report's `config.driver`.
    pub driver_name: String,
    pub concurrency: usize,
    /// Report file; also the resumption checkpoint.
    pub output_path: PathBuf,
    pub driver_options: DriverOptions,
}

impl HarnessConfig {
    pub fn new(
        benchmark: impl Into<String>,
        model: impl Into<String>,
        output_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            benchmark: benchmark.into(),
            model: model.into(),
            driver_name: LocalDriver::NAME.to_string(),
            concurrency: DEFAULT_CONCURRENCY,
            output_path: output_path.into(),
            driver_options: DriverOptions::default(),
        }
    }

    pub fn with_driver_name(mut self, name: impl Into<String>) -> Self {
        self.driver_name = name.into();
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn with_driver_options(mut self, options: DriverOptions) -> Self {
        self.driver_options = options;
        self
    }

    /// The `config` block written into every report.
    pub fn run_config(&self) -> RunConfig {
        RunConfig {
            driver: self.driver_name.clone(),
            max_iterations: self.driver_options.max_iterations,
            max_depth: self.driver_options.max_depth,
            concurrency: self.concurrency,
        }
    }
}

/// Why a single task produced no score.
#[derive(Debug, Error)]
enum TaskFailure {
    #[error(transparent)]
    Driver(#[from] DriverError),
    #[error(transparent)]
    Scoring(#[from] ScoringError),
}

/// Runs one task: driver call, iteration count, scoring.
pub struct TaskRunner {
    driver: Arc<dyn Driver>,
    scoring_fn: ScoringFn,
    options: DriverOptions,
    guard_slack: Duration,
}

impl TaskRunner {
    pub fn new(driver: Arc<dyn Driver>, scoring_fn: ScoringFn, options: DriverOptions) -> Self {
        Self {
            driver,
            scoring_fn,
            options,
            guard_slack: CALL_GUARD_SLACK,
        }
    }

    /// Overrides [`CALL_GUARD_SLACK`].
    pub fn with_guard_slack(mut self, slack: Duration) -> Self {
        self.guard_slack = slack;
        self
    }

    /// Executes `task` once. Every failure is folded into the result.
    pub async fn run(&self, task: &Task) -> EvalResult {
        match self.try_run(task).await {
            Ok(result) => result,
            Err(e) => {
                warn!(task_id = %task.id, error = %e, "Task failed");
                EvalResult::failed(&task.id, &task.query, &task.expected_answer, e.to_string())
            }
        }
    }

    async fn try_run(&self, task: &Task) -> Result<EvalResult, TaskFailure> {
        let guard = self.options.timeout + self.guard_slack;
        let call = self
            .driver
            .call(&task.query, task.context.as_deref(), &self.options);
        let invocation = tokio::time::timeout(guard, call)
            .await
            .map_err(|_| DriverError::Unresponsive(guard))??;

        let iterations = match invocation.iterations {
            Some(n) => n,
            None => count_trace_iterations(Path::new(&invocation.trace)).await,
        }
        .max(1);

        let trace = Some(invocation.trace).filter(|t| !t.is_empty());

        if invocation.exit_code != 0 {
            debug!(task_id = %task.id, exit_code = invocation.exit_code, "Agent exited non-zero");
            return Ok(EvalResult {
                task_id: task.id.clone(),
                query: task.query.clone(),
                expected_answer: task.expected_answer.clone(),
                generated_answer: String::new(),
                score: 0.0,
                iterations,
                wall_time_ms: invocation.wall_time_ms,
                error: Some(format!("exit code {}", invocation.exit_code)),
                trace,
            });
        }

        let score = (self.scoring_fn)(&task.expected_answer, &invocation.answer)?;
        if !score.is_finite() {
            return Err(ScoringError::NonFinite(score).into());
        }

        Ok(EvalResult {
            task_id: task.id.clone(),
            query: task.query.clone(),
            expected_answer: task.expected_answer.clone(),
            generated_answer: invocation.answer,
            score: score.clamp(0.0, 1.0),
            iterations,
            wall_time_ms: invocation.wall_time_ms,
            error: None,
            trace,
        })
    }
}

#[async_trait]
impl TaskExecutor for TaskRunner {
    async fn execute(&self, task: Task) -> EvalResult {
        self.run(&task).await
    }
}

/// Counts `*-response.md` files in `<trace>/trace/`.
///
/// Best effort: any filesystem problem counts as zero.
pub async fn count_trace_iterations(trace: &Path) -> u32 {
    // An empty trace would resolve `trace/` against the working directory.
    if trace.as_os_str().is_empty() {
        return 0;
    }
    let Ok(mut entries) = tokio::fs::read_dir(trace.join("trace")).await else {
        return 0;
    };

    let mut count = 0;
    while let Ok(Some(entry)) = entries.next_entry().await {
        if entry.file_name().to_string_lossy().ends_with(RESPONSE_SUFFIX) {
            count += 1;
        }
    }
    count
}

/// Runs every task not already recorded in `config.output_path`.
///
/// # Errors
///
/// Fails before dispatch on a zero concurrency or duplicate task ids, and
/// after the run if the final report cannot be written. Per-task failures
/// never surface here.
pub async fn run_harness(
    tasks: Vec<Task>,
    driver: Arc<dyn Driver>,
    scoring_fn: ScoringFn,
    config: &HarnessConfig,
    progress: Option<&dyn ProgressSink>,
) -> Result<BenchmarkReport, HarnessError> {
    let runner = TaskRunner::new(driver, scoring_fn, config.driver_options.clone());
    run_with_runner(tasks, runner, config, progress).await
}

/// [`run_harness`] with a preconfigured [`TaskRunner`].
pub async fn run_with_runner(
    tasks: Vec<Task>,
    runner: TaskRunner,
    config: &HarnessConfig,
    progress: Option<&dyn ProgressSink>,
) -> Result<BenchmarkReport, HarnessError> {
    if config.concurrency == 0 {
        return Err(HarnessError::ZeroConcurrency);
    }

    let mut ids = HashSet::with_capacity(tasks.len());
    for task in &tasks {
        if !ids.insert(task.id.as_str()) {
            return Err(HarnessError::DuplicateTask(task.id.clone()));
        }
    }

    let total = tasks.len();
    let mut done: HashSet<String> = HashSet::new();
    let mut results: Vec<EvalResult> = storage::load_results(&config.output_path)
        .await
        .into_iter()
        .filter(|r| ids.contains(r.task_id.as_str()) && done.insert(r.task_id.clone()))
        .collect();

    let pending: Vec<Task> = tasks
        .into_iter()
        .filter(|t| !done.contains(&t.id))
        .collect();

    let run_id = Uuid::new_v4();
    if !results.is_empty() {
        info!(
            "Resuming: {} tasks already completed, {} remaining",
            results.len(),
            pending.len()
        );
    }
    info!(
        run_id = %run_id,
        benchmark = %config.benchmark,
        driver = %runner.driver.name(),
        pending = pending.len(),
        concurrency = config.concurrency,
        "Starting run"
    );

    let run_config = config.run_config();
    let metrics = MetricsCollector::new(&config.benchmark);
    let started = Instant::now();

    if !pending.is_empty() {
        let pool_config = PoolConfig::new(config.concurrency);
        let (mut pool, submitter) = WorkerPool::start(&pool_config, Arc::new(runner), metrics.clone())
            .map_err(|_| HarnessError::ZeroConcurrency)?;

        let producer = tokio::spawn(async move {
            for task in pending {
                if submitter.send(task).await.is_err() {
                    break;
                }
            }
        });

        while let Some(result) = pool.next_completion().await {
            let score = result.score;
            results.push(result);

            let report = BenchmarkReport::new(
                &config.benchmark,
                &config.model,
                run_config.clone(),
                std::mem::take(&mut results),
            );
            match storage::persist(&config.output_path, &report).await {
                Ok(()) => metrics.report_persisted(true),
                Err(e) => {
                    metrics.report_persisted(false);
                    error!(path = %config.output_path.display(), error = %e, "Failed to persist report");
                }
            }

            if let Some(sink) = progress {
                sink.report(&ProgressInfo {
                    completed: report.results.len(),
                    total,
                    score,
                    mean_score: report.aggregate.mean_score,
                    elapsed: format_elapsed(started.elapsed()),
                });
            }
            results = report.results;
        }

        if let Err(e) = producer.await {
            error!(error = %e, "Task producer panicked");
        }
        let stats = pool.stats();
        pool.join().await;
        debug!(
            completed = stats.tasks_completed,
            failed = stats.tasks_failed,
            peak_active = stats.peak_active,
            "Worker pool drained"
        );
    }

    let report = BenchmarkReport::new(&config.benchmark, &config.model, run_config, results);
    let persisted = storage::persist(&config.output_path, &report).await;
    metrics.report_persisted(persisted.is_ok());
    persisted?;

    info!(
        run_id = %run_id,
        completed = report.aggregate.completed_tasks,
        failed = report.aggregate.failed_tasks,
        elapsed = %format_elapsed(started.elapsed()),
        "Run finished"
    );

    Ok(report)
}
