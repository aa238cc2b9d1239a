//! stackrun - Dependency-ordered stack runner
//!
//! CLI entry point.

// Allow multiple crate versions from dependencies (can't easily control)
#![allow(clippy::multiple_crate_versions)]

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;

use stackrun::cli::{render_history, render_run_summary};
use stackrun::log::jsonl::JsonlLogger;
use stackrun::log::{LogSettings, RenderMode};
use stackrun::plan::config::PlanConfig;
use stackrun::plan::executor::{PlanExecutor, RunSummary};

/// Dependency-ordered stack runner
///
/// Runs each stack's command once the stacks it requires have completed,
/// with a live status table that redraws in place.
#[derive(Parser, Debug)]
#[command(name = "stackrun", version, about)]
struct Cli {
    /// Path to the stacks.toml plan
    #[arg(long, default_value = "stacks.toml")]
    config: PathBuf,

    /// Directory for the run history (.stackrun by default)
    #[arg(long, default_value = ".stackrun")]
    log_dir: PathBuf,

    /// Print status updates as scrolling lines instead of redrawing
    #[arg(long)]
    no_redraw: bool,

    /// Override the plan's max_parallel setting (0 = unlimited)
    #[arg(long)]
    max_parallel: Option<usize>,

    /// Show recorded history instead of running the plan
    #[arg(long)]
    history: bool,
}

/// Apply command-line overrides to a loaded plan.
fn apply_overrides(mut plan: PlanConfig, cli: &Cli) -> PlanConfig {
    if let Some(max_parallel) = cli.max_parallel {
        plan.global.max_parallel = max_parallel;
    }
    plan
}

/// Append every outcome of a run to the history log.
fn record_history(logger: &JsonlLogger, summary: &RunSummary) -> Result<()> {
    for outcome in &summary.outcomes {
        logger
            .append(outcome)
            .context("Failed to write to history log")?;
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let logger = JsonlLogger::new(&cli.log_dir).context("Failed to initialize history log")?;

    if cli.history {
        let outcomes = logger.read_all().context("Failed to read history log")?;
        render_history(&outcomes);
        return Ok(());
    }

    let plan = PlanConfig::from_path(&cli.config)
        .with_context(|| format!("Failed to load plan from '{}'", cli.config.display()))?;
    let plan = apply_overrides(plan, &cli);

    stackrun::log::init(&LogSettings {
        mode: RenderMode::detect(cli.no_redraw),
        ..LogSettings::default()
    })
    .context("Failed to initialize logging")?;

    let summary = PlanExecutor::new(plan).run().await?;

    record_history(&logger, &summary)?;
    render_run_summary(&summary);

    if summary.success() {
        Ok(())
    } else {
        std::process::exit(1);
    }
}
