use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::db::DailyStat;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SystemMetrics {
    pub cpu_percent: f32,
    pub memory_mb: f64,
}

/// What happened to every file the watcher promoted this run.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct OutcomeCounters {
    pub moved: u64,
    pub skipped: u64,
    pub failed: u64,
    pub untouched: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatisticsSnapshot {
    pub taken_at: DateTime<Utc>,
    /// Completed moves per room, category and local day, this run only.
    pub entries: Vec<DailyStat>,
    pub outcomes: OutcomeCounters,
    pub system: SystemMetrics,
}

impl StatisticsSnapshot {
    pub fn total_moved(&self) -> u64 {
        self.entries.iter().map(|entry| entry.count).sum()
    }
}
