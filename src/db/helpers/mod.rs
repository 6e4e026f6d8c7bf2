use std::convert::TryFrom;

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, NaiveDate, Utc};

use crate::db::models::MoveOutcome;
use crate::sorting::classifier::Category;

pub const DAY_FORMAT: &str = "%Y-%m-%d";

pub fn to_i64(value: u64) -> Result<i64> {
    i64::try_from(value).map_err(|_| anyhow!("value {value} exceeds SQLite INTEGER range"))
}

pub fn to_u64(value: i64, field: &str) -> Result<u64> {
    u64::try_from(value).map_err(|_| anyhow!("{field} contains negative value {value}"))
}

pub fn parse_datetime(value: &str, field: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .with_context(|| format!("failed to parse {field}"))
}

pub fn parse_day(value: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value, DAY_FORMAT)
        .with_context(|| format!("failed to parse day '{value}'"))
}

pub fn parse_outcome(value: &str) -> Result<MoveOutcome> {
    match value {
        "Moved" => Ok(MoveOutcome::Moved),
        "Skipped" => Ok(MoveOutcome::Skipped),
        "Failed" => Ok(MoveOutcome::Failed),
        other => Err(anyhow!("unknown move outcome {other}")),
    }
}

pub fn parse_category(value: &str) -> Result<Category> {
    Category::parse(value).ok_or_else(|| anyhow!("unknown category {value}"))
}

/// Wraps a conversion failure so it can leave a `query_map` closure.
pub fn invalid_data(err: anyhow::Error) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        0,
        rusqlite::types::Type::Text,
        Box::new(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            err.to_string(),
        )),
    )
}
