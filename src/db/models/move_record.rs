//! Move history data models.
//!
//! One `MoveRecord` is written per file the sorter acted on. Records are
//! append-only; pruning is the only way they leave the ledger.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

use crate::sorting::classifier::Category;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum MoveOutcome {
    Moved,
    Skipped,
    Failed,
}

impl MoveOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            MoveOutcome::Moved => "Moved",
            MoveOutcome::Skipped => "Skipped",
            MoveOutcome::Failed => "Failed",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MoveRecord {
    pub id: String,
    pub source_path: PathBuf,
    /// Where the file went, or would have gone for `Skipped`/`Failed`.
    pub dest_path: PathBuf,
    pub room: String,
    pub category: Category,
    pub timestamp: DateTime<Utc>,
    pub outcome: MoveOutcome,
    pub error: Option<String>,
}

impl MoveRecord {
    pub fn new(
        source_path: PathBuf,
        dest_path: PathBuf,
        room: String,
        category: Category,
        timestamp: DateTime<Utc>,
        outcome: MoveOutcome,
        error: Option<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            source_path,
            dest_path,
            room,
            category,
            timestamp,
            outcome,
            error,
        }
    }
}

/// Narrows a history listing. Empty filter lists everything, newest first.
#[derive(Debug, Clone, Default)]
pub struct HistoryFilter {
    pub room: Option<String>,
    pub category: Option<Category>,
    pub outcome: Option<MoveOutcome>,
    pub since: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}
