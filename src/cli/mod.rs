//! Command-line interface for rlm-eval.
//!
//! Provides the `run` command, which executes a benchmark, and the `analyze`
//! command, which summarises a finished report.

mod commands;

pub use commands::{
    parse_cli, run, run_with_cli, run_with_registry, AnalyzeArgs, Cli, Commands, RunArgs,
};
