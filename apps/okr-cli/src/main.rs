//! # okr-cli
//!
//! Command-line interface for the OKR progress engine.
//!
//! Everything lives under `<project-root>/.okr/`:
//! - `okr objective create/list/show/cancel/activate`: manage objectives
//! - `okr kr add/update/delete`: manage key results
//! - `okr task link/unlink/status`: connect tasks and report their status
//! - `okr recalc`: rebuild all derived progress from the stored leaves

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use okr_goal::OkrConfig;
use tracing_subscriber::EnvFilter;

/// Used when RUST_LOG is unset or empty.
const DEFAULT_LOG_FILTER: &str = "okr_goal=info,okr=info";

/// OKR tracker: objectives, key results, and automatic progress roll-up.
#[derive(Parser)]
#[command(name = "okr", version, about)]
struct Cli {
    /// Project root directory (defaults to current directory).
    #[arg(long, default_value = ".")]
    project_root: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage objectives.
    Objective {
        #[command(subcommand)]
        command: commands::objective::ObjectiveCommands,
    },
    /// Manage key results.
    Kr {
        #[command(subcommand)]
        command: commands::kr::KrCommands,
    },
    /// Link tasks to key results and report task status.
    Task {
        #[command(subcommand)]
        command: commands::task::TaskCommands,
    },
    /// Recompute every key result and objective.
    Recalc,
}

fn main() -> anyhow::Result<()> {
    // Logs go to stderr so table output on stdout stays clean.
    tracing_subscriber::fmt()
        .with_env_filter(log_filter(std::env::var("RUST_LOG").ok().as_deref()))
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    let cli = Cli::parse();
    let project_root = cli.project_root.canonicalize().unwrap_or(cli.project_root);
    let config = OkrConfig::for_project(&project_root);
    tracing::debug!("Project root: {}", project_root.display());

    match &cli.command {
        Commands::Objective { command } => commands::objective::execute(command, &config),
        Commands::Kr { command } => commands::kr::execute(command, &config),
        Commands::Task { command } => commands::task::execute(command, &config),
        Commands::Recalc => commands::recalc::execute(&config),
    }
}

/// RUST_LOG wins when set; an unparseable value falls back to the default.
fn log_filter(rust_log: Option<&str>) -> EnvFilter {
    match rust_log.map(str::trim).filter(|s| !s.is_empty()) {
        Some(directives) => EnvFilter::try_new(directives).unwrap_or_else(|e| {
            eprintln!("ignoring invalid RUST_LOG '{}': {}", directives, e);
            EnvFilter::new(DEFAULT_LOG_FILTER)
        }),
        None => EnvFilter::new(DEFAULT_LOG_FILTER),
    }
}
