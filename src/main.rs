//! Decision engine - main entry point
//!
//! This binary provides two subcommands:
//! - replay: Drive the engine bar-by-bar over historical CSV data
//! - score: Print the market condition and confidence breakdown for a symbol

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod commands;

#[derive(Parser, Debug)]
#[command(name = "decision-engine")]
#[command(about = "Rule-based decision engine: signal scoring, sizing, and adaptive exits", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Replay the engine over historical data for the configured instruments
    Replay {
        /// Path to configuration file
        #[arg(short, long, default_value = "configs/engine.json")]
        config: String,

        /// Account equity (overrides config file)
        #[arg(long)]
        equity: Option<f64>,

        /// Run instruments sequentially instead of in parallel
        #[arg(long)]
        sequential: bool,
    },

    /// Score the latest snapshot of one symbol in both directions
    Score {
        /// Path to configuration file
        #[arg(short, long, default_value = "configs/engine.json")]
        config: String,

        /// Symbol to score
        #[arg(short, long)]
        symbol: String,
    },
}

fn setup_logging(verbose: bool, command_name: &str) -> Result<()> {
    std::fs::create_dir_all("logs")?;

    let log_filename = format!(
        "{}_{}.log",
        command_name,
        chrono::Local::now().format("%Y-%m-%d_%H-%M-%S")
    );
    let log_path = PathBuf::from("logs").join(&log_filename);

    let level = if verbose { "debug" } else { "info" };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let file_appender = tracing_appender::rolling::never("logs", &log_filename);

    let console_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_line_number(true)
        .with_file(true)
        .with_ansi(true);

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(file_appender)
        .with_target(true)
        .with_line_number(true)
        .with_file(true)
        .with_ansi(false);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .init();

    info!("Logging initialized");
    info!("Log file: {}", log_path.display());

    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let command_name = match &cli.command {
        Commands::Replay { .. } => "replay",
        Commands::Score { .. } => "score",
    };

    setup_logging(cli.verbose, command_name)?;

    match cli.command {
        Commands::Replay {
            config,
            equity,
            sequential,
        } => commands::replay::run(config, equity, sequential),

        Commands::Score { config, symbol } => commands::score::run(config, symbol),
    }
}
