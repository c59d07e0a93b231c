//! steward - durable background task scheduler CLI.

use std::path::PathBuf;

use anyhow::Result;
use chrono::{DateTime, Utc};
use clap::{ArgGroup, Parser, Subcommand};
use steward_core::domain::{RunStatus, Scalar};

mod commands;
mod config;
mod logging;
mod tasks;

#[derive(Parser)]
#[command(name = "steward")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Config file (default: $STEWARD_CONFIG, then ./steward.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Overrides [store].database_url
    #[arg(long, env = "STEWARD_DATABASE_URL", global = true)]
    database_url: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List registered task identities
    Tasks,

    /// Submit a one-off or recurring task instance
    #[command(group(ArgGroup::new("when").args(["every", "at"])))]
    Submit {
        identity: String,

        /// Task parameter as key=value (repeatable)
        #[arg(short, long = "param", value_parser = parse_param)]
        params: Vec<(String, Scalar)>,

        /// Recur every N seconds, first run now
        #[arg(long, value_name = "SECS")]
        every: Option<u32>,

        /// Run once at this RFC 3339 instant (default: now)
        #[arg(long)]
        at: Option<DateTime<Utc>>,
    },

    /// Run a single tick and print what it did
    Tick,

    /// Run engine workers until Ctrl-C
    Run {
        /// Overrides [scheduler].workers
        #[arg(long)]
        workers: Option<usize>,
    },

    /// List runs and counts by status
    Status {
        #[arg(long)]
        status: Option<RunStatus>,
    },

    /// Delete finished runs older than the retention window
    Prune {
        /// Overrides [scheduler].retention
        #[arg(long, value_name = "SECS")]
        older_than: Option<u64>,
    },
}

fn parse_param(raw: &str) -> Result<(String, Scalar), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{raw}'"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("empty parameter name in '{raw}'"));
    }
    let Ok(value) = value.parse::<Scalar>();
    Ok((key.to_string(), value))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose, cli.json_logs);

    let (mut app, source) = config::ConfigLoader::new().load(cli.config.as_deref())?;
    if let Some(url) = cli.database_url {
        app.store.database_url = url;
    }
    tracing::debug!(config = ?source, database_url = %app.store.database_url, "configuration loaded");

    match cli.command {
        Command::Tasks => commands::tasks()?,
        Command::Submit {
            identity,
            params,
            every,
            at,
        } => commands::submit(&app, identity, params, every, at).await?,
        Command::Tick => commands::tick(&app).await?,
        Command::Run { workers } => commands::run(&app, workers).await?,
        Command::Status { status } => commands::status(&app, status).await?,
        Command::Prune { older_than } => commands::prune(&app, older_than).await?,
    }

    Ok(())
}
