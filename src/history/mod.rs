//! Append-only ledger of move decisions, pruned to a rolling window.

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use log::info;

use crate::db::{Database, HistoryFilter, MoveRecord};

pub const RETENTION_DAYS: i64 = 30;

#[derive(Clone)]
pub struct HistoryLedger {
    db: Database,
    enabled: bool,
}

impl HistoryLedger {
    pub fn new(db: Database, enabled: bool) -> Self {
        Self { db, enabled }
    }

    pub async fn append(&self, record: &MoveRecord) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }
        self.db.insert_move_record(record).await
    }

    /// Drops records older than [`RETENTION_DAYS`] before `now`.
    pub async fn prune(&self, now: DateTime<Utc>) -> Result<u64> {
        if !self.enabled {
            return Ok(0);
        }
        let cutoff = now - Duration::days(RETENTION_DAYS);
        let removed = self.db.delete_move_records_before(cutoff).await?;
        if removed > 0 {
            info!("Pruned {removed} move records older than {RETENTION_DAYS} days");
        }
        Ok(removed)
    }

    pub async fn list(&self, filter: &HistoryFilter) -> Result<Vec<MoveRecord>> {
        if !self.enabled {
            return Ok(Vec::new());
        }
        self.db.list_move_records(filter).await
    }

    /// Prunes as of `now`, then lists. This is what a reader outside the
    /// watch loop should call, so records past retention never show up even
    /// when no watcher has run for days.
    pub async fn list_current(
        &self,
        now: DateTime<Utc>,
        filter: &HistoryFilter,
    ) -> Result<Vec<MoveRecord>> {
        self.prune(now).await?;
        self.list(filter).await
    }
}
