//! Fixed-size worker pool for task execution.
//!
//! `num_workers` workers share one bounded job channel. Each worker pulls a
//! task, runs it to completion, and sends the result back over a
//! completions channel to a single consumer.
//!
//! ```text
//!  submitter ──► [bounded job channel] ──► worker-0 ─┐
//!                                     ├──► worker-1 ─┼──► [completions] ──► collector
//!                                     └──► worker-N ─┘
//! ```
//!
//! Submission blocks while the job channel is full, so at most
//! `num_workers` tasks run and at most `queue_capacity` wait at any time.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error};

use crate::datasets::Task;
use crate::metrics::MetricsCollector;
use crate::report::EvalResult;

/// Errors that can occur when starting the pool.
#[derive(Debug, Error)]
pub enum PoolError {
    /// A pool needs at least one worker.
    #[error("Worker pool needs at least one worker")]
    NoWorkers,
}

/// Executes one task to a result.
///
/// Implementations must fold every failure into the returned result; the
/// pool additionally converts a panic into a failed result.
#[async_trait]
pub trait TaskExecutor: Send + Sync + 'static {
    async fn execute(&self, task: Task) -> EvalResult;
}

/// Configuration for the worker pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
    /// Number of worker tasks to spawn.
    pub num_workers: usize,
    /// Capacity of the job channel.
    pub queue_capacity: usize,
}

impl PoolConfig {
    /// Creates a configuration whose queue holds one job per worker.
    pub fn new(num_workers: usize) -> Self {
        Self {
            num_workers,
            queue_capacity: num_workers.max(1),
        }
    }

    /// Sets the job channel capacity.
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity.max(1);
        self
    }
}

/// Statistics about the worker pool.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PoolStats {
    pub num_workers: usize,
    /// Workers currently executing a task.
    pub active_workers: usize,
    /// Highest number of simultaneously executing tasks observed.
    pub peak_active: usize,
    /// Tasks that finished without an error.
    pub tasks_completed: u64,
    /// Tasks that finished with an error.
    pub tasks_failed: u64,
}

impl PoolStats {
    pub fn total_processed(&self) -> u64 {
        self.tasks_completed + self.tasks_failed
    }
}

struct SharedPoolStats {
    tasks_completed: AtomicU64,
    tasks_failed: AtomicU64,
    active_workers: AtomicU64,
    peak_active: AtomicU64,
}

impl SharedPoolStats {
    fn new() -> Self {
        Self {
            tasks_completed: AtomicU64::new(0),
            tasks_failed: AtomicU64::new(0),
            active_workers: AtomicU64::new(0),
            peak_active: AtomicU64::new(0),
        }
    }

    fn increment_active(&self) {
        let now = self.active_workers.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_active.fetch_max(now, Ordering::SeqCst);
    }

    fn decrement_active(&self) {
        self.active_workers.fetch_sub(1, Ordering::SeqCst);
    }

    fn record(&self, result: &EvalResult) {
        if result.is_completed() {
            self.tasks_completed.fetch_add(1, Ordering::SeqCst);
        } else {
            self.tasks_failed.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn to_pool_stats(&self, num_workers: usize) -> PoolStats {
        PoolStats {
            num_workers,
            active_workers: self.active_workers.load(Ordering::SeqCst) as usize,
            peak_active: self.peak_active.load(Ordering::SeqCst) as usize,
            tasks_completed: self.tasks_completed.load(Ordering::SeqCst),
            tasks_failed: self.tasks_failed.load(Ordering::SeqCst),
        }
    }
}

/// Running pool of workers.
pub struct WorkerPool {
    num_workers: usize,
    completions_rx: mpsc::Receiver<EvalResult>,
    worker_handles: Vec<JoinHandle<()>>,
    stats: Arc<SharedPoolStats>,
}

impl WorkerPool {
    /// Spawns the workers and returns the pool with its job submitter.
    ///
    /// The pool keeps no sender of its own: workers exit once every clone of
    /// the submitter has been dropped and the queue is drained.
    ///
    /// # Errors
    ///
    /// Returns `PoolError::NoWorkers` if `config.num_workers` is 0.
    pub fn start(
        config: &PoolConfig,
        executor: Arc<dyn TaskExecutor>,
        metrics: MetricsCollector,
    ) -> Result<(Self, mpsc::Sender<Task>), PoolError> {
        if config.num_workers == 0 {
            return Err(PoolError::NoWorkers);
        }

        let (job_tx, job_rx) = mpsc::channel(config.queue_capacity);
        let (completions_tx, completions_rx) = mpsc::channel(config.num_workers);
        let job_rx = Arc::new(Mutex::new(job_rx));
        let stats = Arc::new(SharedPoolStats::new());

        let worker_handles = (0..config.num_workers)
            .map(|i| {
                let worker = Worker {
                    id: format!("worker-{i}"),
                    jobs: Arc::clone(&job_rx),
                    completions: completions_tx.clone(),
                    executor: Arc::clone(&executor),
                    stats: Arc::clone(&stats),
                    metrics: metrics.clone(),
                };
                tokio::spawn(worker.run())
            })
            .collect();

        debug!(num_workers = config.num_workers, "Worker pool started");

        let pool = Self {
            num_workers: config.num_workers,
            completions_rx,
            worker_handles,
            stats,
        };
        Ok((pool, job_tx))
    }

    /// Next finished result, or `None` once all workers have exited.
    pub async fn next_completion(&mut self) -> Option<EvalResult> {
        self.completions_rx.recv().await
    }

    /// Waits for every worker to exit.
    pub async fn join(mut self) {
        for handle in self.worker_handles.drain(..) {
            if let Err(e) = handle.await {
                error!(error = %e, "Worker task panicked");
            }
        }
    }

    pub fn stats(&self) -> PoolStats {
        self.stats.to_pool_stats(self.num_workers)
    }
}

struct Worker {
    id: String,
    jobs: Arc<Mutex<mpsc::Receiver<Task>>>,
    completions: mpsc::Sender<EvalResult>,
    executor: Arc<dyn TaskExecutor>,
    stats: Arc<SharedPoolStats>,
    metrics: MetricsCollector,
}

impl Worker {
    async fn run(self) {
        debug!(worker_id = %self.id, "Worker started");

        loop {
            // The lock is only held while waiting for the next job.
            let next = { self.jobs.lock().await.recv().await };
            let Some(task) = next else {
                break;
            };

            self.stats.increment_active();
            self.metrics.task_started();

            let result = self.execute_isolated(task).await;

            self.stats.decrement_active();
            self.stats.record(&result);
            self.metrics.task_finished(&result);

            if self.completions.send(result).await.is_err() {
                debug!(worker_id = %self.id, "Collector gone, stopping");
                break;
            }
        }

        debug!(worker_id = %self.id, "Worker stopped");
    }

    /// Runs the task on its own tokio task so a panic only fails that task.
    async fn execute_isolated(&self, task: Task) -> EvalResult {
        let task_id = task.id.clone();
        let query = task.query.clone();
        let expected = task.expected_answer.clone();

        let executor = Arc::clone(&self.executor);
        match tokio::spawn(async move { executor.execute(task).await }).await {
            Ok(result) => result,
            Err(e) => {
                error!(worker_id = %self.id, task_id = %task_id, error = %e, "Task panicked");
                EvalResult::failed(task_id, query, expected, format!("task panicked: {e}"))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};

    struct SleepExecutor {
        delay: Duration,
    }

    #[async_trait]
    impl TaskExecutor for SleepExecutor {
        async fn execute(&self, task: Task) -> EvalResult {
            tokio::time::sleep(self.delay).await;
            if task.id == "boom" {
                panic!("executor exploded");
            }
            EvalResult {
                task_id: task.id,
                query: task.query,
                expected_answer: task.expected_answer.clone(),
                generated_answer: task.expected_answer,
                score: 1.0,
                iterations: 1,
                wall_time_ms: self.delay.as_millis() as u64,
                error: None,
                trace: None,
            }
        }
    }

    async fn run_pool(workers: usize, ids: Vec<String>, delay: Duration) -> (Vec<EvalResult>, PoolStats) {
        let executor = Arc::new(SleepExecutor { delay });
        let (mut pool, submitter) =
            WorkerPool::start(&PoolConfig::new(workers), executor, MetricsCollector::new("test"))
                .unwrap();

        let producer = tokio::spawn(async move {
            for id in ids {
                submitter.send(Task::new(id, "q", "a")).await.unwrap();
            }
        });

        let mut results = Vec::new();
        while let Some(result) = pool.next_completion().await {
            results.push(result);
        }
        producer.await.unwrap();
        let stats = pool.stats();
        pool.join().await;
        (results, stats)
    }

    #[test]
    fn test_zero_workers_rejected() {
        let executor = Arc::new(SleepExecutor {
            delay: Duration::ZERO,
        });
        let err = WorkerPool::start(&PoolConfig::new(0), executor, MetricsCollector::new("test"))
            .err()
            .unwrap();
        assert!(matches!(err, PoolError::NoWorkers));
    }

    #[tokio::test]
    async fn test_all_tasks_processed_once() {
        let ids: Vec<String> = (0..7).map(|i| format!("t{i}")).collect();
        let (results, stats) = run_pool(3, ids, Duration::from_millis(5)).await;

        let mut seen: Vec<&str> = results.iter().map(|r| r.task_id.as_str()).collect();
        seen.sort();
        assert_eq!(seen, vec!["t0", "t1", "t2", "t3", "t4", "t5", "t6"]);
        assert_eq!(stats.tasks_completed, 7);
        assert_eq!(stats.active_workers, 0);
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded() {
        let ids: Vec<String> = (0..10).map(|i| format!("t{i}")).collect();
        let start = Instant::now();
        let (results, stats) = run_pool(3, ids, Duration::from_millis(100)).await;
        let elapsed = start.elapsed();

        assert_eq!(results.len(), 10);
        assert_eq!(stats.peak_active, 3);
        assert!(elapsed >= Duration::from_millis(380), "{elapsed:?}");
        assert!(elapsed < Duration::from_millis(900), "{elapsed:?}");
    }

    #[tokio::test]
    async fn test_panic_becomes_failed_result() {
        let ids = vec!["ok".to_string(), "boom".to_string()];
        let (results, stats) = run_pool(2, ids, Duration::ZERO).await;

        let failed = results.iter().find(|r| r.task_id == "boom").unwrap();
        assert_eq!(failed.score, 0.0);
        assert!(failed.error.as_deref().unwrap().contains("panicked"));
        assert_eq!(stats.tasks_failed, 1);
        assert_eq!(stats.tasks_completed, 1);
    }

    #[tokio::test]
    async fn test_empty_queue_drains() {
        let (results, stats) = run_pool(4, Vec::new(), Duration::ZERO).await;
        assert!(results.is_empty());
        assert_eq!(stats.total_processed(), 0);
    }
}
