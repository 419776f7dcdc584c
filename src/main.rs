//! Opening range breakout signals - main entry point
//!
//! This binary provides two subcommands:
//! - replay: Run a tick CSV through the live session stack
//! - show-config: Print the effective, validated configuration

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod commands;

#[derive(Parser, Debug)]
#[command(name = "orb-signal")]
#[command(about = "Opening range breakout/retest signal engine", long_about = None)]
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
    /// Replay recorded ticks through the session loop
    Replay {
        /// Path to configuration file
        #[arg(short, long, default_value = "configs/nifty.json")]
        config: String,

        /// Tick CSV (timestamp,price)
        #[arg(short, long)]
        ticks: String,

        /// One-minute candle CSV used to seed the opening range on late starts
        #[arg(long)]
        history: Option<String>,

        /// Sleep between ticks in milliseconds
        #[arg(long)]
        pace_ms: Option<u64>,
    },

    /// Print the effective configuration
    ShowConfig {
        /// Path to configuration file
        #[arg(short, long, default_value = "configs/nifty.json")]
        config: String,
    },
}

fn setup_logging(verbose: bool, command_name: &str) -> Result<()> {
    std::fs::create_dir_all("logs")?;

    // {command}_{date}.log
    let log_filename = format!(
        "{}_{}.log",
        command_name,
        chrono::Local::now().format("%Y-%m-%d_%H-%M-%S")
    );
    let log_path = PathBuf::from("logs").join(&log_filename);

    // Filter out noisy HTTP crates
    let level = if verbose { "debug" } else { "info" };
    let filter_str = format!(
        "{},hyper=warn,hyper_util=warn,reqwest=warn,rustls=warn,h2=warn",
        level
    );
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&filter_str));

    let file_appender = tracing_appender::rolling::never("logs", &log_filename);

    // Console goes to stderr so command output on stdout stays parseable
    let console_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
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
        Commands::ShowConfig { .. } => "show_config",
    };

    setup_logging(cli.verbose, command_name)?;

    match cli.command {
        Commands::Replay {
            config,
            ticks,
            history,
            pace_ms,
        } => commands::replay::run(config, ticks, history, pace_ms),

        Commands::ShowConfig { config } => commands::show_config::run(config),
    }
}
