//! cvsweep CLI for cross-validated model evaluation and hyperparameter sweeps.

mod commands;

use clap::Parser;
use cvsweep_core::Budget;
use std::path::PathBuf;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// cvsweep: stratified k-fold evaluation and hyperparameter sweeps
#[derive(Parser, Debug)]
#[command(name = "cvsweep", version, about, long_about = None)]
struct Cli {
    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Options shared by every command that evaluates models.
#[derive(clap::Args, Debug, Clone)]
pub(crate) struct EvalArgs {
    /// Dataset file (.json or .csv)
    #[arg(short, long)]
    data: PathBuf,

    /// Sweep configuration file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Number of folds
    #[arg(short, long)]
    k: Option<usize>,

    /// Seed for fold partitioning and sampling
    #[arg(long)]
    seed: Option<u64>,

    /// Comma-separated metric names (first one is the default objective)
    #[arg(long, value_delimiter = ',')]
    metrics: Option<Vec<String>>,
}

#[derive(clap::Subcommand, Debug)]
pub(crate) enum Commands {
    /// Run a hyperparameter sweep and record every trial
    Sweep {
        #[command(flatten)]
        eval: EvalArgs,

        /// Output directory for trials.jsonl and artifacts
        #[arg(short, long)]
        out: Option<PathBuf>,

        /// Trial count or "exhaustive"
        #[arg(short, long)]
        budget: Option<Budget>,

        /// Default model when the search space has no `model` key
        #[arg(short, long)]
        model: Option<String>,

        /// Hold out this fraction of samples and score the best configuration on it
        #[arg(long)]
        holdout: Option<f64>,

        /// Concurrent trials
        #[arg(long)]
        trial_workers: Option<usize>,
    },
    /// Cross-validate a single configuration
    Run {
        #[command(flatten)]
        eval: EvalArgs,

        /// Model name
        #[arg(short, long)]
        model: String,

        /// Hyperparameters as key=value pairs
        #[arg(short, long = "param")]
        params: Vec<String>,
    },
    /// List registered models
    Models,
    /// List registered metrics
    Metrics,
    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(clap::Subcommand, Debug)]
pub(crate) enum ConfigAction {
    /// Write the default configuration to the user config file
    Init,
    /// Print the effective configuration
    Show {
        /// Configuration file layered over the defaults
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 if cli.quiet => "error",
        0 => "info",
        1 => "debug",
        _ => "trace",
    };

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::new(filter));

    // JSON file layer for structured logging
    let log_dir = directories::ProjectDirs::from("dev", "cvsweep", "cvsweep")
        .map(|d| d.data_dir().join("logs"))
        .unwrap_or_else(|| PathBuf::from("."));
    let _ = std::fs::create_dir_all(&log_dir);
    let file_appender = tracing_appender::rolling::daily(&log_dir, "cvsweep.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);
    let json_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(non_blocking)
        .with_filter(EnvFilter::new("debug"));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    commands::handle_command(cli.command).await
}
