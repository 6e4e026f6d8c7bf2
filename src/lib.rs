pub mod cli;
pub mod context;
pub mod db;
pub mod error;
pub mod history;
pub mod settings;
pub mod sorting;
pub mod statistics;
pub mod utils;
pub mod watcher;

use anyhow::{Context, Result};
use chrono::{Duration, Utc};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;

use cli::{Cli, Command};
use db::{Database, HistoryFilter};
use history::HistoryLedger;
use settings::{default_config_path, KnownFolders, RawSettings, Settings};
use sorting::Sorter;
use utils::log_file::{DailyLogFile, TeeWriter};
use watcher::WatchController;

pub fn run() -> Result<()> {
    let cli = Cli::parse();

    let config_path = cli.config.clone().unwrap_or_else(default_config_path);
    let raw = RawSettings::load_or_init(&config_path)
        .with_context(|| format!("failed to load config {}", config_path.display()))?;

    init_logging(cli.verbose, raw.log_dir());
    log::debug!("Using config {}", config_path.display());

    let settings = raw
        .resolve(&KnownFolders::detect())
        .with_context(|| format!("invalid config {}", config_path.display()))?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;

    runtime.block_on(async move {
        let database = Database::new(settings.database_path())?;
        log::debug!("Using database {}", database.path().display());
        match cli.command.unwrap_or(Command::Run) {
            Command::Run => watch_until_interrupted(settings, database).await,
            Command::History {
                room,
                category,
                outcome,
                days,
                limit,
            } => {
                let filter = HistoryFilter {
                    room,
                    category,
                    outcome,
                    since: days.map(|days| Utc::now() - Duration::days(i64::from(days))),
                    limit: Some(limit),
                };
                let ledger = HistoryLedger::new(database, settings.enable_history);
                let records = ledger.list_current(Utc::now(), &filter).await?;
                println!("{}", serde_json::to_string_pretty(&records)?);
                Ok(())
            }
            Command::Stats { since } => {
                let stats = database.list_daily_stats(since).await?;
                println!("{}", serde_json::to_string_pretty(&stats)?);
                Ok(())
            }
        }
    })
}

/// Logs to stderr and, unless `log_dir` is `None`, to a dated file there.
fn init_logging(verbose: bool, log_dir: Option<PathBuf>) {
    let mut builder = env_logger::Builder::new();
    // RUST_LOG, when set, overrides the default level
    builder
        .filter_level(if verbose {
            log::LevelFilter::Debug
        } else {
            log::LevelFilter::Info
        })
        .parse_default_env();

    let opened = log_dir.map(|dir| DailyLogFile::open(dir.clone()).map_err(|err| (dir, err)));
    let mut file_error = None;
    match opened {
        Some(Ok(file)) => {
            builder.target(env_logger::Target::Pipe(Box::new(TeeWriter::new(file))));
        }
        Some(Err(err)) => file_error = Some(err),
        None => {}
    }
    builder.init();

    if let Some((dir, err)) = file_error {
        log::warn!("Logging to the terminal only; cannot open {}: {err}", dir.display());
    }
}

async fn watch_until_interrupted(settings: Settings, database: Database) -> Result<()> {
    log::info!("roomsort starting up...");

    let sorter = Sorter::new(Arc::new(settings), database);
    let mut controller = WatchController::new();
    controller.start(sorter.clone())?;

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl-C")?;
    log::info!("Interrupted; finishing the current file");

    controller.stop().await?;

    let snapshot = sorter.snapshot().await;
    log::info!(
        "Session totals: {} moved, {} skipped, {} failed, {} left in place",
        snapshot.outcomes.moved,
        snapshot.outcomes.skipped,
        snapshot.outcomes.failed,
        snapshot.outcomes.untouched
    );
    Ok(())
}
