//! CLI command definitions for rlm-eval.
//!
//! `run` executes a benchmark against the agent and writes a resumable
//! report; `analyze` summarises a report after the fact.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context};
use chrono::{DateTime, Utc};
use clap::Parser;
use serde::Serialize;
use tracing::info;

use crate::config::EvalConfig;
use crate::datasets::oolong::{DEFAULT_CONTEXT_LEN, DEFAULT_DATASET_FILTER};
use crate::datasets::sniah::DEFAULT_TASKS_PER_LENGTH;
use crate::datasets::{
    truncate, ArcOptions, ArcSource, Benchmark, OolongOptions, OolongSource, SniahOptions,
    SniahSource, Task, TaskSource,
};
use crate::error::DatasetError;
use crate::metrics::{export_metrics, init_metrics};
use crate::report::{find_latest_result, AggregateStats, Analysis, BenchmarkReport};
use crate::runner::{
    DriverOptions, DriverRegistry, DriverSettings, LocalDriver, DEFAULT_MAX_DEPTH,
    DEFAULT_MAX_ITERATIONS,
};
use crate::scheduler::{run_harness, HarnessConfig, StderrProgress, DEFAULT_CONCURRENCY};
use crate::scoring::scorer_for;
use crate::storage;

/// Default directory for report files.
const DEFAULT_RESULTS_DIR: &str = "results";

/// Parent of the per-benchmark data directories (`data/oolong`, `data/arc`).
const DEFAULT_DATA_ROOT: &str = "data";

/// Evaluation harness for recursive language model agents.
#[derive(Parser)]
#[command(name = "rlm-eval")]
#[command(about = "Run RLM agents against long-context benchmarks and analyze the results")]
#[command(version)]
#[command(
    long_about = "rlm-eval runs an RLM agent against S-NIAH, OOLONG or ARC tasks with bounded concurrency.\n\nEvery completed task is written to the report immediately; re-running the same command with the same --output resumes where it stopped.\n\nExample usage:\n  rlm-eval run --benchmark s-niah --model anthropic/claude-sonnet-4\n  rlm-eval run --benchmark oolong --model anthropic/claude-sonnet-4 --driver ssh --host eval@box\n  rlm-eval analyze"
)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,
}

/// Available CLI subcommands.
#[derive(clap::Subcommand)]
pub enum Commands {
    /// Run a benchmark and write a resumable report.
    Run(Box<RunArgs>),

    /// Analyze a report written by `run`.
    Analyze(AnalyzeArgs),
}

/// Arguments for `rlm-eval run`.
///
/// Options left unset fall back to the `--config` profile, then to the
/// built-in defaults shown in the help.
#[derive(Parser, Debug, Default)]
pub struct RunArgs {
    /// Benchmark to run: s-niah, oolong or arc.
    #[arg(short, long)]
    pub benchmark: Option<Benchmark>,

    /// Model identifier passed to the agent (e.g. anthropic/claude-sonnet-4).
    #[arg(short, long, env = "RLM_EVAL_MODEL")]
    pub model: Option<String>,

    /// Driver: local, ssh, or a registered custom driver [default: local].
    #[arg(short, long)]
    pub driver: Option<String>,

    /// Remote host for the ssh driver.
    #[arg(long, env = "RLM_EVAL_HOST")]
    pub host: Option<String>,

    /// Tasks in flight at once [default: 5].
    #[arg(short, long)]
    pub concurrency: Option<usize>,

    /// Max agent loop iterations [default: 15].
    #[arg(long)]
    pub max_iterations: Option<u32>,

    /// Max agent recursion depth [default: 2].
    #[arg(long)]
    pub max_depth: Option<u32>,

    /// Per-task timeout in seconds [default: 300].
    #[arg(long)]
    pub timeout_secs: Option<u64>,

    /// Limit the number of tasks [default: all].
    #[arg(short = 'n', long)]
    pub max_tasks: Option<usize>,

    /// S-NIAH: tasks per context length [default: 8].
    #[arg(long)]
    pub tasks_per_length: Option<usize>,

    /// OOLONG: context length filter [default: 131072].
    #[arg(long)]
    pub context_len: Option<u64>,

    /// OOLONG: dataset filter [default: trec_coarse].
    #[arg(long)]
    pub dataset_filter: Option<String>,

    /// OOLONG/ARC: data directory [default: data/<benchmark>].
    #[arg(long)]
    pub data_dir: Option<PathBuf>,

    /// Path to the rlm binary for the local driver.
    #[arg(long)]
    pub rlm_path: Option<PathBuf>,

    /// Report file [default: <results-dir>/<benchmark>_<model>_<timestamp>.json].
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Directory for auto-named reports [default: results].
    #[arg(long)]
    pub results_dir: Option<PathBuf>,

    /// YAML run profile.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Write Prometheus metrics to this file when the run ends.
    #[arg(long)]
    pub metrics_out: Option<PathBuf>,

    /// Print the summary as JSON.
    #[arg(short = 'j', long)]
    pub json: bool,
}

/// Arguments for `rlm-eval analyze`.
#[derive(Parser, Debug)]
pub struct AnalyzeArgs {
    /// Report to analyze [default: newest *.json in --results-dir].
    pub path: Option<PathBuf>,

    /// Directory searched when no path is given.
    #[arg(long, default_value = DEFAULT_RESULTS_DIR)]
    pub results_dir: PathBuf,

    /// Output JSON instead of text.
    #[arg(short = 'j', long)]
    pub json: bool,
}

/// Parse CLI arguments and return the Cli struct.
///
/// This allows main.rs to access CLI arguments (like log_level) before running commands.
pub fn parse_cli() -> Cli {
    Cli::parse()
}

/// Run the CLI by parsing arguments and executing the command.
pub async fn run() -> anyhow::Result<()> {
    run_with_cli(parse_cli()).await
}

/// Run the CLI with the parsed arguments and the built-in drivers.
pub async fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    run_with_registry(cli, &DriverRegistry::with_builtins()).await
}

/// Run the CLI with a caller-supplied driver registry.
///
/// Lets an embedding binary register custom drivers that `--driver` can then
/// name.
pub async fn run_with_registry(cli: Cli, registry: &DriverRegistry) -> anyhow::Result<()> {
    match cli.command {
        Commands::Run(args) => run_run_command(*args, registry).await,
        Commands::Analyze(args) => run_analyze_command(args).await,
    }
}

// ============================================================================
// run
// ============================================================================

/// Fully resolved `run` parameters.
#[derive(Debug, Clone)]
struct RunPlan {
    benchmark: Benchmark,
    model: String,
    driver: String,
    concurrency: usize,
    options: DriverOptions,
    settings: DriverSettings,
    max_tasks: Option<usize>,
    sniah: SniahOptions,
    oolong: OolongOptions,
    arc: ArcOptions,
    output: PathBuf,
    metrics_out: Option<PathBuf>,
    json: bool,
}

impl RunPlan {
    /// Merges flags over `profile` over defaults.
    fn resolve(args: RunArgs, profile: EvalConfig, now: DateTime<Utc>) -> anyhow::Result<Self> {
        let benchmark = args
            .benchmark
            .or(profile.benchmark)
            .ok_or_else(|| anyhow!("--benchmark is required (s-niah, oolong or arc)"))?;
        let model = args
            .model
            .or(profile.model)
            .ok_or_else(|| anyhow!("--model is required"))?;

        let driver = args
            .driver
            .or(profile.driver)
            .unwrap_or_else(|| LocalDriver::NAME.to_string());

        let timeout_secs = args.timeout_secs.or(profile.timeout_secs);
        let mut options = DriverOptions::new()
            .with_max_iterations(
                args.max_iterations
                    .or(profile.max_iterations)
                    .unwrap_or(DEFAULT_MAX_ITERATIONS),
            )
            .with_max_depth(args.max_depth.or(profile.max_depth).unwrap_or(DEFAULT_MAX_DEPTH));
        if let Some(secs) = timeout_secs {
            options = options.with_timeout(Duration::from_secs(secs));
        }

        let mut settings = DriverSettings::new().with_model(&model);
        if let Some(host) = args.host.or(profile.host) {
            settings = settings.with_host(host);
        }
        if let Some(path) = args.rlm_path.or(profile.rlm_path) {
            settings = settings.with_rlm_path(path);
        }
        if let Some(path) = profile.tree_root {
            settings = settings.with_tree_root(path);
        }
        if let Some(path) = profile.mock_dir {
            settings = settings.with_mock_dir(path);
        }
        if let Some(command) = profile.remote_command {
            settings = settings.with_remote_command(command);
        }
        if let Some(secs) = profile.connect_timeout_secs {
            settings = settings.with_connect_timeout_secs(secs);
        }

        let data_dir = args
            .data_dir
            .or(profile.data_dir)
            .unwrap_or_else(|| Path::new(DEFAULT_DATA_ROOT).join(benchmark.as_str()));

        let mut sniah = SniahOptions::default().with_tasks_per_length(
            args.tasks_per_length
                .or(profile.tasks_per_length)
                .unwrap_or(DEFAULT_TASKS_PER_LENGTH),
        );
        if let Some(lengths) = profile.context_lengths {
            sniah = sniah.with_context_lengths(lengths);
        }
        if let Some(seed) = profile.seed {
            sniah = sniah.with_seed(seed);
        }

        let oolong = OolongOptions::new(&data_dir)
            .with_dataset_filter(
                args.dataset_filter
                    .or(profile.dataset_filter)
                    .unwrap_or_else(|| DEFAULT_DATASET_FILTER.to_string()),
            )
            .with_context_len(Some(
                args.context_len
                    .or(profile.context_len)
                    .unwrap_or(DEFAULT_CONTEXT_LEN),
            ));

        let arc = ArcOptions::new(&data_dir)
            .with_selected_problems(profile.selected_problems.unwrap_or_default());

        let output = match args.output {
            Some(path) => path,
            None => {
                let results_dir = args
                    .results_dir
                    .or(profile.results_dir)
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_RESULTS_DIR));
                results_dir.join(default_output_name(benchmark, &model, now))
            }
        };

        Ok(Self {
            benchmark,
            model,
            driver,
            concurrency: args
                .concurrency
                .or(profile.concurrency)
                .unwrap_or(DEFAULT_CONCURRENCY),
            options,
            settings,
            max_tasks: args.max_tasks.or(profile.max_tasks),
            sniah,
            oolong,
            arc,
            output,
            metrics_out: args.metrics_out,
            json: args.json,
        })
    }

    fn load_tasks(&self) -> Result<Vec<Task>, DatasetError> {
        let tasks = match self.benchmark {
            Benchmark::SNiah => {
                eprintln!(
                    "Generating S-NIAH tasks ({} per context length)...",
                    self.sniah.tasks_per_length
                );
                SniahSource::new(self.sniah.clone()).load()?
            }
            Benchmark::Oolong => {
                eprintln!(
                    "Loading OOLONG tasks (filter: {}, context-len: {})...",
                    self.oolong.dataset_filter,
                    self.oolong
                        .context_len
                        .map(|len| len.to_string())
                        .unwrap_or_else(|| "any".to_string())
                );
                OolongSource::new(self.oolong.clone()).load()?
            }
            Benchmark::Arc => {
                eprintln!("Loading ARC tasks from {}...", self.arc.data_dir.display());
                ArcSource::new(self.arc.clone()).load()?
            }
        };
        Ok(truncate(tasks, self.max_tasks))
    }

    fn harness_config(&self) -> HarnessConfig {
        HarnessConfig::new(self.benchmark.as_str(), &self.model, &self.output)
            .with_driver_name(&self.driver)
            .with_concurrency(self.concurrency)
            .with_driver_options(self.options.clone())
    }
}

/// Model id made safe for a file name: `/` becomes `_`, anything outside
/// `[A-Za-z0-9_-]` is dropped.
fn sanitize_model(model: &str) -> String {
    model
        .replace('/', "_")
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '-')
        .collect()
}

/// `<benchmark>_<model>_<YYYY-MM-DDTHH-MM-SSZ>.json`
fn default_output_name(benchmark: Benchmark, model: &str, now: DateTime<Utc>) -> String {
    format!(
        "{}_{}_{}.json",
        benchmark,
        sanitize_model(model),
        now.format("%Y-%m-%dT%H-%M-%SZ")
    )
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RunSummary<'a> {
    benchmark: &'a str,
    model: &'a str,
    output: &'a Path,
    aggregate: &'a AggregateStats,
}

/// Human-readable end-of-run summary.
fn format_summary(report: &BenchmarkReport, output: &Path) -> String {
    let agg = &report.aggregate;
    let mut lines = vec![
        "=== Eval Summary ===".to_string(),
        format!("Benchmark:    {}", report.benchmark),
        format!("Model:        {}", report.model),
        format!(
            "Tasks:        {} completed, {} failed",
            agg.completed_tasks, agg.failed_tasks
        ),
        String::new(),
        format!("Mean score:   {:.4}", agg.mean_score),
        format!("Median score: {:.4}", agg.median_score),
        format!("Std score:    {:.4}", agg.std_score),
        format!("P25 score:    {:.4}", agg.p25_score),
        format!("P75 score:    {:.4}", agg.p75_score),
        String::new(),
        format!("Mean iterations:  {:.1}", agg.mean_iterations),
        format!("Mean wall time:   {:.1}s", agg.mean_wall_time_ms / 1000.0),
        format!(
            "Total wall time:  {:.1}s",
            agg.total_wall_time_ms as f64 / 1000.0
        ),
        String::new(),
        format!("Results saved to: {}", output.display()),
    ];
    lines.push(String::new());
    lines.join("\n")
}

async fn run_run_command(args: RunArgs, registry: &DriverRegistry) -> anyhow::Result<()> {
    let profile = match &args.config {
        Some(path) => EvalConfig::load(path)
            .with_context(|| format!("Failed to load run profile {}", path.display()))?,
        None => EvalConfig::default(),
    };
    let plan = RunPlan::resolve(args, profile, Utc::now())?;

    let driver = registry.create(&plan.driver, &plan.settings)?;
    let tasks = plan.load_tasks()?;
    eprintln!("Loaded {} tasks", tasks.len());

    if plan.metrics_out.is_some() {
        init_metrics().map_err(|e| anyhow!("Failed to initialize metrics: {}", e))?;
    }

    eprintln!("Output: {}", plan.output.display());
    eprintln!("Driver: {}, Concurrency: {}", plan.driver, plan.concurrency);
    eprintln!(
        "Max iterations: {}, Max depth: {}",
        plan.options.max_iterations, plan.options.max_depth
    );
    eprintln!();

    let report = run_harness(
        tasks,
        driver,
        scorer_for(plan.benchmark),
        &plan.harness_config(),
        Some(&StderrProgress),
    )
    .await?;

    eprint!("\n\n");

    if let Some(path) = &plan.metrics_out {
        std::fs::write(path, export_metrics())
            .map_err(|e| anyhow!("Failed to write metrics to {}: {}", path.display(), e))?;
        info!(path = %path.display(), "Metrics written");
    }

    if plan.json {
        let summary = RunSummary {
            benchmark: &report.benchmark,
            model: &report.model,
            output: &plan.output,
            aggregate: &report.aggregate,
        };
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print!("{}", format_summary(&report, &plan.output));
    }

    Ok(())
}

// ============================================================================
// analyze
// ============================================================================

async fn run_analyze_command(args: AnalyzeArgs) -> anyhow::Result<()> {
    let path = match args.path {
        Some(path) => path,
        None => find_latest_result(&args.results_dir).ok_or_else(|| {
            anyhow!(
                "No result files found in {}",
                args.results_dir.display()
            )
        })?,
    };

    let report = storage::read_report(&path)
        .await
        .with_context(|| format!("Failed to read report {}", path.display()))?;
    let analysis = Analysis::from_report(&path, &report);

    if args.json {
        println!("{}", serde_json::to_string_pretty(&analysis)?);
    } else {
        print!("{analysis}");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DriverError;
    use crate::runner::{Driver, InvocationResult};
    use async_trait::async_trait;
    use chrono::TimeZone;
    use clap::CommandFactory;
    use std::sync::Arc;
    use tempfile::TempDir;

    #[test]
    fn test_cli_parses() {
        // Verify CLI definition is valid
        Cli::command().debug_assert();
    }

    #[test]
    fn test_run_command_flags() {
        let cli = Cli::try_parse_from([
            "rlm-eval",
            "run",
            "--benchmark",
            "oolong",
            "--model",
            "anthropic/claude-sonnet-4",
            "--driver",
            "ssh",
            "--host",
            "eval@box",
            "-c",
            "3",
            "--max-tasks",
            "10",
            "--json",
        ])
        .expect("should parse");

        match cli.command {
            Commands::Run(args) => {
                assert_eq!(args.benchmark, Some(Benchmark::Oolong));
                assert_eq!(args.model.as_deref(), Some("anthropic/claude-sonnet-4"));
                assert_eq!(args.driver.as_deref(), Some("ssh"));
                assert_eq!(args.host.as_deref(), Some("eval@box"));
                assert_eq!(args.concurrency, Some(3));
                assert_eq!(args.max_tasks, Some(10));
                assert!(args.json);
            }
            _ => panic!("Expected Run command"),
        }
    }

    #[test]
    fn test_run_rejects_unknown_benchmark() {
        let result = Cli::try_parse_from(["rlm-eval", "run", "--benchmark", "mmlu"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_analyze_defaults() {
        let cli = Cli::try_parse_from(["rlm-eval", "analyze"]).expect("should parse");
        match cli.command {
            Commands::Analyze(args) => {
                assert!(args.path.is_none());
                assert_eq!(args.results_dir, PathBuf::from(DEFAULT_RESULTS_DIR));
                assert!(!args.json);
            }
            _ => panic!("Expected Analyze command"),
        }
    }

    #[test]
    fn test_log_level_is_global() {
        let cli = Cli::try_parse_from(["rlm-eval", "analyze", "--log-level", "debug"])
            .expect("should parse");
        assert_eq!(cli.log_level, "debug");
    }

    #[test]
    fn test_default_output_name() {
        let now = Utc.with_ymd_and_hms(2025, 3, 9, 14, 5, 7).unwrap();
        assert_eq!(
            default_output_name(Benchmark::SNiah, "anthropic/claude-sonnet-4.5", now),
            "s-niah_anthropic_claude-sonnet-45_2025-03-09T14-05-07Z.json"
        );
    }

    #[test]
    fn test_plan_defaults() {
        let args = RunArgs {
            benchmark: Some(Benchmark::SNiah),
            model: Some("m".to_string()),
            ..Default::default()
        };
        let plan = RunPlan::resolve(args, EvalConfig::default(), Utc::now()).unwrap();

        assert_eq!(plan.driver, "local");
        assert_eq!(plan.concurrency, DEFAULT_CONCURRENCY);
        assert_eq!(plan.options.max_iterations, DEFAULT_MAX_ITERATIONS);
        assert_eq!(plan.options.max_depth, DEFAULT_MAX_DEPTH);
        assert_eq!(plan.sniah.tasks_per_length, DEFAULT_TASKS_PER_LENGTH);
        assert_eq!(plan.oolong.context_len, Some(DEFAULT_CONTEXT_LEN));
        assert_eq!(plan.oolong.data_dir, PathBuf::from("data/s-niah"));
        assert!(plan.output.starts_with(DEFAULT_RESULTS_DIR));
    }

    #[test]
    fn test_plan_flags_override_profile() {
        let profile = EvalConfig {
            benchmark: Some(Benchmark::Oolong),
            model: Some("profile-model".to_string()),
            concurrency: Some(8),
            max_depth: Some(4),
            dataset_filter: Some("spam".to_string()),
            ..Default::default()
        };
        let args = RunArgs {
            model: Some("flag-model".to_string()),
            concurrency: Some(2),
            output: Some(PathBuf::from("/tmp/out.json")),
            ..Default::default()
        };
        let plan = RunPlan::resolve(args, profile, Utc::now()).unwrap();

        assert_eq!(plan.benchmark, Benchmark::Oolong);
        assert_eq!(plan.model, "flag-model");
        assert_eq!(plan.concurrency, 2);
        assert_eq!(plan.options.max_depth, 4);
        assert_eq!(plan.oolong.dataset_filter, "spam");
        assert_eq!(plan.output, PathBuf::from("/tmp/out.json"));
        assert_eq!(plan.settings.model.as_deref(), Some("flag-model"));
    }

    #[test]
    fn test_plan_requires_benchmark_and_model() {
        let err = RunPlan::resolve(RunArgs::default(), EvalConfig::default(), Utc::now())
            .unwrap_err();
        assert!(err.to_string().contains("--benchmark"));

        let args = RunArgs {
            benchmark: Some(Benchmark::Arc),
            ..Default::default()
        };
        let err = RunPlan::resolve(args, EvalConfig::default(), Utc::now()).unwrap_err();
        assert!(err.to_string().contains("--model"));
    }

    #[test]
    fn test_format_summary() {
        let report = BenchmarkReport::new(
            "s-niah",
            "m",
            crate::report::RunConfig {
                driver: "local".to_string(),
                max_iterations: 15,
                max_depth: 2,
                concurrency: 5,
            },
            Vec::new(),
        );
        let text = format_summary(&report, Path::new("results/x.json"));
        assert!(text.starts_with("=== Eval Summary ===\n"));
        assert!(text.contains("Tasks:        0 completed, 0 failed"));
        assert!(text.contains("Mean score:   0.0000"));
        assert!(text.contains("Results saved to: results/x.json"));
    }

    struct ParrotDriver;

    #[async_trait]
    impl Driver for ParrotDriver {
        fn name(&self) -> &str {
            "parrot"
        }

        async fn call(
            &self,
            query: &str,
            _context: Option<&str>,
            _options: &DriverOptions,
        ) -> Result<InvocationResult, DriverError> {
            Ok(InvocationResult::new(query, 0, 5, "").with_iterations(1))
        }
    }

    #[tokio::test]
    async fn test_run_then_analyze_with_custom_driver() {
        let dir = TempDir::new().unwrap();
        let output = dir.path().join("run.json");

        let mut registry = DriverRegistry::with_builtins();
        registry.register("parrot", |_: &DriverSettings| {
            Ok(Arc::new(ParrotDriver) as Arc<dyn Driver>)
        });

        let cli = Cli::try_parse_from([
            "rlm-eval",
            "run",
            "--benchmark",
            "s-niah",
            "--model",
            "mock",
            "--driver",
            "parrot",
            "--tasks-per-length",
            "1",
            "--max-tasks",
            "2",
            "--output",
            output.to_str().unwrap(),
        ])
        .unwrap();
        run_with_registry(cli, &registry).await.unwrap();

        let report = storage::read_report(&output).await.unwrap();
        assert_eq!(report.results.len(), 2);
        assert_eq!(report.config.driver, "parrot");

        let cli = Cli::try_parse_from([
            "rlm-eval",
            "analyze",
            "--results-dir",
            dir.path().to_str().unwrap(),
        ])
        .unwrap();
        run_with_registry(cli, &registry).await.unwrap();
    }

    #[tokio::test]
    async fn test_analyze_empty_dir_fails() {
        let dir = TempDir::new().unwrap();
        let cli = Cli::try_parse_from([
            "rlm-eval",
            "analyze",
            "--results-dir",
            dir.path().to_str().unwrap(),
        ])
        .unwrap();
        let err = run_with_cli(cli).await.unwrap_err();
        assert!(err.to_string().contains("No result files"));
    }
}
