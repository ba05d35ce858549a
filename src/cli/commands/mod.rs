//! CLI commands implementation.
//!
//! This module contains the CLI parser and dispatches to command-specific modules.

mod config_cmd;
mod harvest;
mod plan;

use std::path::PathBuf;

use anyhow::Context;
use chrono::{Duration, Local, NaiveDate};
use clap::{Parser, Subcommand};

use rangeharvest::config::Config;

#[derive(Parser)]
#[command(name = "harvest")]
#[command(about = "Range-chunked harvesting of the economic calendar")]
#[command(version)]
pub struct Cli {
    /// Config file path (overrides auto-discovery)
    #[arg(short, long, global = true, env = "HARVEST_CONFIG")]
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

/// Date window arguments shared by `run` and `plan`.
#[derive(clap::Args, Debug, Clone)]
struct WindowArgs {
    /// First day to harvest, YYYY-MM-DD (default: today)
    #[arg(long)]
    start: Option<NaiveDate>,
    /// Last day to harvest, inclusive (default: start + 14 days)
    #[arg(long)]
    end: Option<NaiveDate>,
    /// Days per chunk (default: from config, 7)
    #[arg(short, long)]
    interval: Option<i64>,
}

impl WindowArgs {
    fn resolve(&self) -> (NaiveDate, NaiveDate) {
        let start = self.start.unwrap_or_else(|| Local::now().date_naive());
        let end = self.end.unwrap_or(start + Duration::days(14));
        (start, end)
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Harvest a date window, one artifact per chunk
    Run {
        #[command(flatten)]
        window: WindowArgs,
        /// Category labels to select, comma separated (default: from config)
        #[arg(short, long, value_delimiter = ',')]
        targets: Vec<String>,
        /// Output directory for chunk artifacts
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Skip chunks that already have an artifact
        #[arg(short, long)]
        resume: bool,
        /// Show the browser window
        #[arg(long)]
        headed: bool,
        /// Connect to a running browser's DevTools endpoint instead of launching one
        #[arg(long)]
        remote_url: Option<String>,
    },

    /// Print the chunk plan for a window without opening a browser
    Plan {
        #[command(flatten)]
        window: WindowArgs,
    },

    /// Print the effective configuration
    Config {
        /// Output format
        #[arg(long, value_enum, default_value = "toml")]
        format: config_cmd::ConfigFormat,
    },
}

/// Run the CLI.
pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = Config::load(cli.config.as_deref())
        .await
        .context("Failed to load configuration")?;

    match cli.command {
        Commands::Run {
            window,
            targets,
            output,
            resume,
            headed,
            remote_url,
        } => {
            let (start, end) = window.resolve();
            let options = harvest::HarvestOptions {
                start,
                end,
                interval: window.interval,
                targets,
                output,
                resume,
                headed,
                remote_url,
            };
            harvest::cmd_harvest(config, options).await
        }
        Commands::Plan { window } => {
            let (start, end) = window.resolve();
            plan::cmd_plan(&config, start, end, window.interval)
        }
        Commands::Config { format } => config_cmd::cmd_config_show(&config, format),
    }
}
