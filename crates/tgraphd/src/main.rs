//! tgraphd: load a transition graph and drive it to the end.
//!
//! Actions run against a simulated executor: each one takes `--delay-ms`
//! and confirms, unless it is named by `--fail` (reports failure) or
//! `--hang` (never reports, so its timer expires).
//!
//! # Usage
//!
//! ```text
//! tgraphd run --graph graphs/web-stack.json --config tgraph.toml --fail 3
//! tgraphd show --graph graphs/web-stack.json
//! tgraphd score add 600000 INFINITY
//! ```

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use tgraph_core::diagnostics;
use tgraph_core::{AbortMode, Graph, TransitionStatus, unpack_graph};
use tgraph_exec::{Driver, EngineConfig, SimulatedExecutor};
use tgraph_score::Score;

const DEFAULT_FILTER: &str = "info,tgraphd=debug,tgraph=debug";

#[derive(Parser)]
#[command(name = "tgraphd", about = "Transition graph executor")]
struct Cli {
    /// Write logs as JSON.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Drive a graph against the simulated executor.
    Run {
        /// Graph document (JSON).
        #[arg(long)]
        graph: PathBuf,

        /// Engine config (TOML).
        #[arg(long)]
        config: Option<PathBuf>,

        /// Action ids that report failure.
        #[arg(long = "fail")]
        fail: Vec<i32>,

        /// Action ids that never report.
        #[arg(long = "hang")]
        hang: Vec<i32>,

        /// Override the batch limit.
        #[arg(long)]
        batch_limit: Option<u32>,

        /// Simulated run time per action.
        #[arg(long, default_value = "100")]
        delay_ms: u64,

        /// Request a graceful abort after this many milliseconds.
        #[arg(long)]
        abort_after_ms: Option<u64>,

        /// Print the final summary as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Print a graph without running it.
    Show {
        #[arg(long)]
        graph: PathBuf,

        #[arg(long)]
        config: Option<PathBuf>,

        #[arg(long)]
        json: bool,
    },

    /// Score arithmetic.
    Score {
        #[command(subcommand)]
        op: ScoreCommand,
    },
}

#[derive(Subcommand)]
enum ScoreCommand {
    /// Parse score text and print the normalized value.
    Parse {
        #[arg(allow_hyphen_values = true)]
        text: String,

        /// Engine config providing the colour bands.
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Add two scores with saturation.
    Add {
        #[arg(allow_hyphen_values = true)]
        a: String,

        #[arg(allow_hyphen_values = true)]
        b: String,

        /// Engine config providing the colour bands.
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    match cli.command {
        Command::Run {
            graph,
            config,
            fail,
            hang,
            batch_limit,
            delay_ms,
            abort_after_ms,
            json,
        } => {
            let config = load_config(config.as_deref())?;
            let mut graph = load_graph(&graph, &config)?;
            if let Some(limit) = batch_limit {
                graph.set_batch_limit(limit);
            }
            let executor = SimulatedExecutor::new(Duration::from_millis(delay_ms))
                .fail(fail)
                .hang(hang);
            run_graph(graph, &config, executor, abort_after_ms, json).await
        }
        Command::Show {
            graph,
            config,
            json,
        } => {
            let config = load_config(config.as_deref())?;
            let graph = load_graph(&graph, &config)?;
            show_graph(&graph, &config, json)?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Score { op } => {
            println!("{}", score_command(op)?);
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn init_tracing(json: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

fn load_config(path: Option<&Path>) -> anyhow::Result<EngineConfig> {
    match path {
        Some(path) => Ok(EngineConfig::from_file(path)?),
        None => Ok(EngineConfig::default()),
    }
}

fn load_graph(path: &Path, config: &EngineConfig) -> anyhow::Result<Graph> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read graph {}", path.display()))?;
    let mut graph = unpack_graph(&text, &config.scores)
        .with_context(|| format!("failed to unpack graph {}", path.display()))?;
    config.apply_to(&mut graph)?;
    Ok(graph)
}

async fn run_graph(
    graph: Graph,
    config: &EngineConfig,
    executor: SimulatedExecutor,
    abort_after_ms: Option<u64>,
    json: bool,
) -> anyhow::Result<ExitCode> {
    let driver = Driver::new(graph, config.policy(), Arc::new(executor.clone()));

    if let Some(ms) = abort_after_ms {
        let handle = driver.handle();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(ms)).await;
            info!(after_ms = ms, "requesting graceful abort");
            handle.abort(AbortMode::Stop, "abort timer expired");
        });
    }

    let handle = driver.handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown signal received");
            handle.abort(AbortMode::Terminate, "interrupted");
        }
    });

    let report = driver.run().await;

    if json {
        println!("{}", serde_json::to_string_pretty(&report.summary)?);
    } else {
        for line in &report.diagnostics {
            println!("{line}");
        }
        println!(
            "transition {}: {}",
            report.summary.transition_id, report.status
        );
        if !report.failed_actions().is_empty() {
            let ids: Vec<String> = report.failed_actions().iter().map(i32::to_string).collect();
            println!("failed actions: {}", ids.join(" "));
        }
        if let Some(reason) = &report.abort_reason {
            println!("aborted: {reason}");
        }
        println!(
            "executor: {} dispatched, peak {} running",
            executor.log().dispatched.len(),
            executor.log().peak_running
        );
    }

    Ok(ExitCode::from(exit_status(report.status)))
}

fn exit_status(status: TransitionStatus) -> u8 {
    if status == TransitionStatus::Complete { 0 } else { 1 }
}

fn show_graph(graph: &Graph, config: &EngineConfig, json: bool) -> anyhow::Result<()> {
    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&diagnostics::summarize(graph))?
        );
        return Ok(());
    }
    let lines = diagnostics::render_graph(graph, &config.policy().readiness);
    if lines.is_empty() {
        println!("Empty transition graph {}", graph.id());
    }
    for line in lines {
        println!("{line}");
    }
    Ok(())
}

fn score_command(op: ScoreCommand) -> anyhow::Result<Score> {
    match op {
        ScoreCommand::Parse { text, config } => {
            let config = load_config(config.as_deref())?;
            Ok(Score::parse(Some(text.as_str()), &config.scores))
        }
        ScoreCommand::Add { a, b, config } => {
            let bands = load_config(config.as_deref())?.scores;
            Ok(Score::parse(Some(a.as_str()), &bands) + Score::parse(Some(b.as_str()), &bands))
        }
    }
}
