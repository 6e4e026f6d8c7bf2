use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, params_from_iter, types::Value, Row};
use std::path::PathBuf;

use crate::db::{
    helpers::{invalid_data, parse_category, parse_datetime, parse_outcome, to_i64},
    models::{HistoryFilter, MoveRecord},
    Database,
};

fn row_to_move_record(row: &Row) -> Result<MoveRecord, rusqlite::Error> {
    let category: String = row.get("category")?;
    let timestamp: String = row.get("timestamp")?;
    let outcome: String = row.get("outcome")?;

    Ok(MoveRecord {
        id: row.get("id")?,
        source_path: PathBuf::from(row.get::<_, String>("source_path")?),
        dest_path: PathBuf::from(row.get::<_, String>("dest_path")?),
        room: row.get("room")?,
        category: parse_category(&category).map_err(invalid_data)?,
        timestamp: parse_datetime(&timestamp, "timestamp").map_err(invalid_data)?,
        outcome: parse_outcome(&outcome).map_err(invalid_data)?,
        error: row.get("error")?,
    })
}

impl Database {
    pub async fn insert_move_record(&self, record: &MoveRecord) -> Result<()> {
        let record = record.clone();
        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO move_records (
                    id, source_path, dest_path, room, category,
                    timestamp, timestamp_ms, outcome, error
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    record.id,
                    record.source_path.to_string_lossy(),
                    record.dest_path.to_string_lossy(),
                    record.room,
                    record.category.as_str(),
                    record.timestamp.to_rfc3339(),
                    record.timestamp.timestamp_millis(),
                    record.outcome.as_str(),
                    record.error,
                ],
            )
            .with_context(|| "failed to insert move record")?;
            Ok(())
        })
        .await
    }

    /// Deletes every record stamped strictly before `cutoff`.
    pub async fn delete_move_records_before(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        self.execute(move |conn| {
            let removed = conn
                .execute(
                    "DELETE FROM move_records WHERE timestamp_ms < ?1",
                    params![cutoff.timestamp_millis()],
                )
                .with_context(|| "failed to prune move records")?;
            Ok(removed as u64)
        })
        .await
    }

    pub async fn list_move_records(&self, filter: &HistoryFilter) -> Result<Vec<MoveRecord>> {
        let filter = filter.clone();
        self.execute(move |conn| {
            let mut sql = String::from(
                "SELECT id, source_path, dest_path, room, category,
                        timestamp, outcome, error
                 FROM move_records
                 WHERE 1 = 1",
            );
            let mut values: Vec<Value> = Vec::new();

            if let Some(room) = &filter.room {
                sql.push_str(" AND room = ?");
                values.push(Value::Text(room.clone()));
            }
            if let Some(category) = filter.category {
                sql.push_str(" AND category = ?");
                values.push(Value::Text(category.as_str().to_string()));
            }
            if let Some(outcome) = filter.outcome {
                sql.push_str(" AND outcome = ?");
                values.push(Value::Text(outcome.as_str().to_string()));
            }
            if let Some(since) = filter.since {
                sql.push_str(" AND timestamp_ms >= ?");
                values.push(Value::Integer(since.timestamp_millis()));
            }
            sql.push_str(" ORDER BY timestamp_ms DESC, rowid DESC");
            if let Some(limit) = filter.limit {
                sql.push_str(" LIMIT ?");
                values.push(Value::Integer(to_i64(limit as u64)?));
            }

            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params_from_iter(values), row_to_move_record)?;

            let mut records = Vec::new();
            for record in rows {
                records.push(record?);
            }
            Ok(records)
        })
        .await
    }
}
