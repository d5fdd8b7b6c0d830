//! FX regime attribution - main entry point
//!
//! This binary provides five subcommands:
//! - detect: Classify the current market regime
//! - analyze: Run full performance attribution over a trade history
//! - backtest: Run the reference SMA-crossover backtest
//! - optimize: Grid-search strategy parameters per detected regime
//! - walkforward: Run rolling walk-forward validation

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod commands;

#[derive(Parser, Debug)]
#[command(name = "fx-attribution")]
#[command(about = "Forex regime detection and performance attribution with walk-forward analysis", long_about = None)]
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
    /// Detect the current market regime across the configured pairs
    Detect {
        /// Path to configuration file
        #[arg(short, long, default_value = "configs/default.json")]
        config: String,

        /// Pairs to evaluate (comma-separated, overrides config). E.g., "EURUSD,GBPUSD"
        #[arg(short, long)]
        pairs: Option<String>,

        /// Generate synthetic candles instead of loading CSV files
        #[arg(long)]
        synthetic: bool,

        /// Seed for synthetic data (random when omitted)
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Run full performance attribution over a trade history
    Analyze {
        /// Path to configuration file
        #[arg(short, long, default_value = "configs/default.json")]
        config: String,

        /// Trades CSV to analyze; runs the reference backtest when omitted
        #[arg(short, long)]
        trades: Option<String>,

        /// Analysis start date (YYYY-MM-DD)
        #[arg(long)]
        start: Option<String>,

        /// Analysis end date (YYYY-MM-DD)
        #[arg(long)]
        end: Option<String>,

        /// Write the full attribution report to this JSON file
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Generate synthetic candles instead of loading CSV files
        #[arg(long)]
        synthetic: bool,

        /// Seed for synthetic data (random when omitted)
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Run the reference SMA-crossover backtest
    Backtest {
        /// Path to configuration file
        #[arg(short, long, default_value = "configs/default.json")]
        config: String,

        /// Pair to backtest (overrides the first configured pair)
        #[arg(short, long)]
        pair: Option<String>,

        /// Backtest start date (YYYY-MM-DD)
        #[arg(long)]
        start: Option<String>,

        /// Backtest end date (YYYY-MM-DD)
        #[arg(long)]
        end: Option<String>,

        /// Generate synthetic candles instead of loading CSV files
        #[arg(long)]
        synthetic: bool,

        /// Seed for synthetic data (random when omitted)
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Grid-search strategy parameters per detected regime
    Optimize {
        /// Path to configuration file
        #[arg(short, long, default_value = "configs/default.json")]
        config: String,

        /// Pair to optimize (overrides the first configured pair)
        #[arg(short, long)]
        pair: Option<String>,

        /// Search start date (YYYY-MM-DD)
        #[arg(long)]
        start: Option<String>,

        /// Search end date (YYYY-MM-DD)
        #[arg(long)]
        end: Option<String>,

        /// Grid override as name=v1,v2,... (repeatable). E.g., --grid fast_period=5,10
        #[arg(long)]
        grid: Vec<String>,

        /// Number of top results to show
        #[arg(short, long, default_value = "10")]
        top: usize,

        /// Generate synthetic candles instead of loading CSV files
        #[arg(long)]
        synthetic: bool,

        /// Seed for synthetic data (random when omitted)
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Run rolling walk-forward validation
    Walkforward {
        /// Path to configuration file
        #[arg(short, long, default_value = "configs/default.json")]
        config: String,

        /// Pair to validate (overrides the first configured pair)
        #[arg(short, long)]
        pair: Option<String>,

        /// Analysis start date (YYYY-MM-DD)
        #[arg(long)]
        start: Option<String>,

        /// Analysis end date (YYYY-MM-DD)
        #[arg(long)]
        end: Option<String>,

        /// Write the walk-forward report to this JSON file
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Generate synthetic candles instead of loading CSV files
        #[arg(long)]
        synthetic: bool,

        /// Seed for synthetic data (random when omitted)
        #[arg(long)]
        seed: Option<u64>,
    },
}

fn setup_logging(verbose: bool, command_name: &str, file_only: bool) -> Result<()> {
    // Create logs directory
    std::fs::create_dir_all("logs")?;

    // Create log file with naming pattern: {command}_{date}.log
    let log_filename = format!(
        "{}_{}.log",
        command_name,
        chrono::Local::now().format("%Y-%m-%d_%H-%M-%S")
    );
    let log_path = PathBuf::from("logs").join(&log_filename);

    let level = if verbose { "debug" } else { "info" };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    // File appender
    let file_appender = tracing_appender::rolling::never("logs", &log_filename);

    if file_only {
        // For optimizer: only log to file, keep console clean for progress bar
        let file_layer = tracing_subscriber::fmt::layer()
            .with_writer(file_appender)
            .with_target(true)
            .with_line_number(true)
            .with_file(true)
            .with_ansi(false);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(file_layer)
            .init();
    } else {
        let console_layer = tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_thread_ids(false)
            .with_thread_names(false)
            .with_line_number(true)
            .with_file(true)
            .with_ansi(true);

        // File layer - same format but without ANSI colors
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
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Determine command name and whether to use file-only logging
    let (command_name, file_only) = match &cli.command {
        Commands::Detect { .. } => ("detect", false),
        Commands::Analyze { .. } => ("analyze", false),
        Commands::Backtest { .. } => ("backtest", false),
        Commands::Optimize { .. } => ("optimize", true), // File-only for clean progress bar
        Commands::Walkforward { .. } => ("walkforward", false),
    };

    setup_logging(cli.verbose, command_name, file_only)?;

    // Execute command
    match cli.command {
        Commands::Detect {
            config,
            pairs,
            synthetic,
            seed,
        } => commands::detect::run(config, pairs, synthetic, seed).await,

        Commands::Analyze {
            config,
            trades,
            start,
            end,
            output,
            synthetic,
            seed,
        } => commands::analyze::run(config, trades, start, end, output, synthetic, seed).await,

        Commands::Backtest {
            config,
            pair,
            start,
            end,
            synthetic,
            seed,
        } => commands::backtest::run(config, pair, start, end, synthetic, seed).await,

        Commands::Optimize {
            config,
            pair,
            start,
            end,
            grid,
            top,
            synthetic,
            seed,
        } => commands::optimize::run(config, pair, start, end, grid, top, synthetic, seed).await,

        Commands::Walkforward {
            config,
            pair,
            start,
            end,
            output,
            synthetic,
            seed,
        } => commands::walkforward::run(config, pair, start, end, output, synthetic, seed).await,
    }
}
