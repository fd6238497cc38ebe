//! feedwatch entry point.
//!
//! Runs one change detection pass, or prints stored state, as JSON on stdout.
//! Logging goes to stderr so stdout stays machine-readable.

use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use feedwatch_client::{ArticleExtractor, FetchClient, FetchConfig};
use feedwatch_core::{AppConfig, LedgerDb};

mod run;

use run::{ChangeDetectionRun, RunOptions};

#[derive(Debug, Parser)]
#[command(name = "feedwatch", version, about = "Detect silent edits to articles from an RSS feed")]
struct Cli {
    /// TOML config file (overrides FEEDWATCH_CONFIG_FILE)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(flatten)]
    overrides: Overrides,

    #[command(subcommand)]
    command: Option<Command>,
}

/// Flags that take precedence over the environment and the config file.
#[derive(Debug, Args, Serialize)]
struct Overrides {
    /// RSS feed URL to ingest
    #[arg(long, global = true)]
    #[serde(skip_serializing_if = "Option::is_none")]
    feed_url: Option<String>,

    /// Staleness and retention threshold in seconds
    #[arg(long, global = true)]
    #[serde(skip_serializing_if = "Option::is_none")]
    threshold_secs: Option<u64>,

    /// User-Agent sent with every request
    #[arg(long, global = true)]
    #[serde(skip_serializing_if = "Option::is_none")]
    user_agent: Option<String>,

    /// SQLite database holding the ledger and change batches
    #[arg(long, global = true, value_name = "PATH")]
    #[serde(skip_serializing_if = "Option::is_none")]
    db_path: Option<PathBuf>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run change detection once (default)
    Run,
    /// Print stored changed articles, oldest first
    Changes {
        /// Only changes detected at or after this RFC 3339 time
        #[arg(long)]
        since: Option<DateTime<Utc>>,
    },
    /// Print the persisted ledger
    Ledger,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .json()
        .init();

    let cli = Cli::parse();
    let config = AppConfig::load_with(cli.config.as_deref(), &cli.overrides).context("failed to load configuration")?;

    let db = LedgerDb::open(&config.db_path)
        .await
        .with_context(|| format!("failed to open database {}", config.db_path.display()))?;

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => {
            let fetcher = FetchClient::new(FetchConfig::from(&config))?;
            let extractor = ArticleExtractor::from_config(&config);

            tracing::info!(feed_url = ?config.feed_url, threshold_secs = config.threshold_secs, "starting run");
            let summary = ChangeDetectionRun::new(&fetcher, &extractor, &db, RunOptions::from(&config))
                .execute(Utc::now())
                .await;
            tracing::info!(
                changed = summary.changed,
                inserted = summary.inserted,
                failed = summary.failed,
                "run finished"
            );

            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        Command::Changes { since } => {
            let changes = db.list_changes(since).await?;
            println!("{}", serde_json::to_string_pretty(&changes)?);
        }
        Command::Ledger => {
            let records = db.load_ledger().await?;
            println!("{}", serde_json::to_string_pretty(&records)?);
        }
    }

    Ok(())
}
