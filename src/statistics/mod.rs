mod types;

pub use types::{OutcomeCounters, StatisticsSnapshot, SystemMetrics};

use anyhow::Result;
use chrono::{DateTime, Local, NaiveDate, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use sysinfo::{Pid, ProcessesToUpdate, System};
use tokio::sync::Mutex;

use crate::db::{DailyStat, Database, MoveOutcome};
use crate::sorting::classifier::Category;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct StatKey {
    room: String,
    category: Category,
    day: NaiveDate,
}

impl StatKey {
    fn into_stat(self, count: u64) -> DailyStat {
        DailyStat {
            room: self.room,
            category: self.category,
            day: self.day,
            count,
        }
    }
}

/// In-memory move counters. Nothing here can fail a move: recording only
/// touches memory, and persistence happens separately through [`flush`].
///
/// [`flush`]: StatisticsAggregator::flush
pub struct StatisticsAggregator {
    inner: Arc<Mutex<StatsState>>,
    enabled: bool,
}

struct StatsState {
    counts: HashMap<StatKey, u64>,
    unflushed: HashMap<StatKey, u64>,
    outcomes: OutcomeCounters,
    system: System,
    pid: Pid,
}

impl StatisticsAggregator {
    pub fn new(enabled: bool) -> Self {
        let mut system = System::new();
        let pid = Pid::from_u32(std::process::id());

        // Initial refresh to establish baseline for CPU calculation
        system.refresh_processes(ProcessesToUpdate::Some(&[pid]));

        Self {
            inner: Arc::new(Mutex::new(StatsState {
                counts: HashMap::new(),
                unflushed: HashMap::new(),
                outcomes: OutcomeCounters::default(),
                system,
                pid,
            })),
            enabled,
        }
    }

    /// Counts one completed move, bucketed by the local day of `timestamp`.
    pub async fn record(&self, room: &str, category: Category, timestamp: DateTime<Utc>) {
        if !self.enabled {
            return;
        }
        let key = StatKey {
            room: room.to_string(),
            category,
            day: timestamp.with_timezone(&Local).date_naive(),
        };
        let mut state = self.inner.lock().await;
        *state.counts.entry(key.clone()).or_insert(0) += 1;
        *state.unflushed.entry(key).or_insert(0) += 1;
    }

    pub async fn record_outcome(&self, outcome: MoveOutcome) {
        if !self.enabled {
            return;
        }
        let mut state = self.inner.lock().await;
        match outcome {
            MoveOutcome::Moved => state.outcomes.moved += 1,
            MoveOutcome::Skipped => state.outcomes.skipped += 1,
            MoveOutcome::Failed => state.outcomes.failed += 1,
        }
    }

    pub async fn record_untouched(&self) {
        if !self.enabled {
            return;
        }
        self.inner.lock().await.outcomes.untouched += 1;
    }

    pub async fn snapshot(&self) -> StatisticsSnapshot {
        let mut state = self.inner.lock().await;
        let pid = state.pid;

        // Refresh to get current CPU/RAM
        state.system.refresh_processes(ProcessesToUpdate::Some(&[pid]));

        let system = state
            .system
            .process(pid)
            .map(|process| SystemMetrics {
                cpu_percent: process.cpu_usage(),
                memory_mb: process.memory() as f64 / 1024.0 / 1024.0,
            })
            .unwrap_or_default();

        let mut entries: Vec<DailyStat> = state
            .counts
            .iter()
            .map(|(key, count)| key.clone().into_stat(*count))
            .collect();
        entries.sort_by(|a, b| {
            b.day
                .cmp(&a.day)
                .then_with(|| a.room.cmp(&b.room))
                .then_with(|| a.category.cmp(&b.category))
        });

        StatisticsSnapshot {
            taken_at: Utc::now(),
            entries,
            outcomes: state.outcomes,
            system,
        }
    }

    /// Writes counts recorded since the last flush. On failure the counts
    /// are kept for the next attempt.
    pub async fn flush(&self, db: &Database) -> Result<usize> {
        let pending: Vec<DailyStat> = {
            let mut state = self.inner.lock().await;
            state
                .unflushed
                .drain()
                .map(|(key, count)| key.into_stat(count))
                .collect()
        };
        if pending.is_empty() {
            return Ok(0);
        }

        match db.add_daily_stats(&pending).await {
            Ok(()) => Ok(pending.len()),
            Err(err) => {
                let mut state = self.inner.lock().await;
                for stat in pending {
                    let count = stat.count;
                    let key = StatKey {
                        room: stat.room,
                        category: stat.category,
                        day: stat.day,
                    };
                    *state.unflushed.entry(key).or_insert(0) += count;
                }
                Err(err)
            }
        }
    }
}

impl Clone for StatisticsAggregator {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            enabled: self.enabled,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn at(day: u32, hour: u32) -> DateTime<Utc> {
        Local
            .with_ymd_and_hms(2026, 10, day, hour, 0, 0)
            .unwrap()
            .with_timezone(&Utc)
    }

    #[tokio::test]
    async fn counts_by_room_category_and_day() {
        let stats = StatisticsAggregator::new(true);
        stats.record("Friends", Category::Image, at(19, 9)).await;
        stats.record("Friends", Category::Image, at(19, 23)).await;
        stats.record("Friends", Category::Image, at(20, 1)).await;
        stats.record("Work", Category::Document, at(19, 10)).await;

        let snapshot = stats.snapshot().await;
        assert_eq!(snapshot.total_moved(), 4);
        assert_eq!(snapshot.entries.len(), 3);
        assert_eq!(snapshot.entries[0].day, NaiveDate::from_ymd_opt(2026, 10, 20).unwrap());

        let friends_19 = snapshot
            .entries
            .iter()
            .find(|e| e.room == "Friends" && e.day.to_string() == "2026-10-19")
            .unwrap();
        assert_eq!(friends_19.count, 2);
    }

    #[tokio::test]
    async fn disabled_aggregator_stays_empty() {
        let stats = StatisticsAggregator::new(false);
        stats.record("Friends", Category::Image, Utc::now()).await;
        stats.record_outcome(MoveOutcome::Moved).await;
        let snapshot = stats.snapshot().await;
        assert!(snapshot.entries.is_empty());
        assert_eq!(snapshot.outcomes, OutcomeCounters::default());
    }

    #[tokio::test]
    async fn flush_persists_only_new_deltas() {
        let temp = TempDir::new().unwrap();
        let db = Database::new(temp.path().join("stats.sqlite3")).unwrap();
        let stats = StatisticsAggregator::new(true);

        stats.record("Friends", Category::Image, at(19, 9)).await;
        stats.record("Friends", Category::Image, at(19, 10)).await;
        assert_eq!(stats.flush(&db).await.unwrap(), 1);
        assert_eq!(stats.flush(&db).await.unwrap(), 0);

        stats.record("Friends", Category::Image, at(19, 11)).await;
        stats.flush(&db).await.unwrap();

        let stored = db.list_daily_stats(None).await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].count, 3);

        // The in-memory view keeps the whole run.
        assert_eq!(stats.snapshot().await.total_moved(), 3);
    }

    #[tokio::test]
    async fn failed_flush_keeps_counts_for_the_next_one() {
        let temp = TempDir::new().unwrap();
        let db = Database::new(temp.path().join("stats.sqlite3")).unwrap();
        let stats = StatisticsAggregator::new(true);

        db.execute(|conn| {
            conn.execute_batch("DROP TABLE daily_stats;")?;
            Ok(())
        })
        .await
        .unwrap();

        stats.record("Friends", Category::Image, at(19, 9)).await;
        stats.record("Friends", Category::Image, at(19, 10)).await;
        assert!(stats.flush(&db).await.is_err());

        // More arrive while the store is down.
        stats.record("Friends", Category::Image, at(19, 11)).await;

        db.execute(|conn| {
            conn.execute_batch(include_str!("../db/schemas/schema_v2.sql"))?;
            Ok(())
        })
        .await
        .unwrap();

        assert_eq!(stats.flush(&db).await.unwrap(), 1);
        let stored = db.list_daily_stats(None).await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].count, 3);
        assert_eq!(stats.flush(&db).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn outcome_counters_track_every_disposition() {
        let stats = StatisticsAggregator::new(true);
        stats.record_outcome(MoveOutcome::Moved).await;
        stats.record_outcome(MoveOutcome::Skipped).await;
        stats.record_outcome(MoveOutcome::Failed).await;
        stats.record_untouched().await;

        let outcomes = stats.snapshot().await.outcomes;
        assert_eq!(
            outcomes,
            OutcomeCounters {
                moved: 1,
                skipped: 1,
                failed: 1,
                untouched: 1,
            }
        );
    }
}
