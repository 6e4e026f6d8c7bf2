use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::db::MoveOutcome;
use crate::sorting::classifier::Category;

#[derive(Parser, Debug)]
#[command(name = "roomsort")]
#[command(version, about = "Sorts chat downloads into per-room, per-category folders", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Path to config.json (created with defaults when missing)
    #[arg(long, global = true, env = "ROOMSORT_CONFIG")]
    pub config: Option<PathBuf>,

    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Watch the download folder and sort files as they arrive (default)
    Run,
    /// Print recorded moves as JSON, newest first
    History {
        #[arg(long)]
        room: Option<String>,
        #[arg(long, value_parser = parse_category)]
        category: Option<Category>,
        #[arg(long, value_parser = parse_outcome)]
        outcome: Option<MoveOutcome>,
        /// Only moves from the last N days
        #[arg(long)]
        days: Option<u32>,
        #[arg(long, default_value_t = 50)]
        limit: usize,
    },
    /// Print per-day move counts as JSON
    Stats {
        /// Only days on or after this date (YYYY-MM-DD)
        #[arg(long)]
        since: Option<chrono::NaiveDate>,
    },
}

fn parse_category(raw: &str) -> Result<Category, String> {
    Category::parse(raw).ok_or_else(|| {
        let known: Vec<&str> = Category::ALL.iter().map(|c| c.as_str()).collect();
        format!("unknown category '{raw}' (expected one of {})", known.join(", "))
    })
}

fn parse_outcome(raw: &str) -> Result<MoveOutcome, String> {
    match raw.to_ascii_lowercase().as_str() {
        "moved" => Ok(MoveOutcome::Moved),
        "skipped" => Ok(MoveOutcome::Skipped),
        "failed" => Ok(MoveOutcome::Failed),
        _ => Err(format!("unknown outcome '{raw}' (expected moved, skipped or failed)")),
    }
}
