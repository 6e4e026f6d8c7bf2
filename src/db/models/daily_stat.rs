use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::sorting::classifier::Category;

/// Persisted count of completed moves for one room, category and local day.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DailyStat {
    pub room: String,
    pub category: Category,
    pub day: NaiveDate,
    pub count: u64,
}
