//! CLI commands implementation.
//!
//! This module contains the CLI parser and dispatches to command-specific modules.

mod convert;
mod history;
mod inspect;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use docbatch::{Config, DevicePreference};

pub use convert::ConvertArgs;

#[derive(Parser)]
#[command(name = "docbatch")]
#[command(about = "Concurrent document-to-Markdown conversion")]
#[command(version)]
pub struct Cli {
    /// Config file path (overrides auto-discovery)
    #[arg(short, long, global = true, env = "DOCBATCH_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Check if verbose mode is enabled (for early logging setup).
pub fn is_verbose() -> bool {
    std::env::args().any(|arg| arg == "-v" || arg == "--verbose")
}

#[derive(Subcommand)]
enum Commands {
    /// Convert documents to Markdown
    Convert(ConvertArgs),

    /// Check input files before converting
    Validate {
        /// Files or directories
        #[arg(required = true)]
        inputs: Vec<PathBuf>,
        /// Walk directories recursively
        #[arg(short, long)]
        recursive: bool,
    },

    /// Estimate conversion time
    Estimate {
        /// Files or directories
        #[arg(required = true)]
        inputs: Vec<PathBuf>,
        /// Number of workers to assume (default: from config)
        #[arg(short, long)]
        workers: Option<usize>,
        /// Walk directories recursively
        #[arg(short, long)]
        recursive: bool,
    },

    /// Show GPU detection and the device a run would use
    Devices {
        /// Device preference (default: from config)
        #[arg(long, value_enum)]
        device: Option<DevicePreference>,
    },

    /// Show the configured backend chain and availability
    Backends,

    /// Show conversion statistics and recent conversions
    History {
        /// Number of recent conversions to list
        #[arg(short = 'n', long, default_value = "10")]
        limit: usize,
        /// List only failed conversions
        #[arg(long)]
        failed: bool,
    },
}

/// Parse arguments, load configuration and run the selected command.
pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = match cli.config {
        Some(ref path) => Config::load_from_path(path).await?,
        None => Config::load().await,
    };

    match cli.command {
        Commands::Convert(args) => convert::cmd_convert(&config, args).await,
        Commands::Validate { inputs, recursive } => {
            inspect::cmd_validate(&config, &inputs, recursive).await
        }
        Commands::Estimate {
            inputs,
            workers,
            recursive,
        } => inspect::cmd_estimate(&config, &inputs, workers, recursive).await,
        Commands::Devices { device } => inspect::cmd_devices(&config, device).await,
        Commands::Backends => inspect::cmd_backends(&config).await,
        Commands::History { limit, failed } => history::cmd_history(&config, limit, failed).await,
    }
}
