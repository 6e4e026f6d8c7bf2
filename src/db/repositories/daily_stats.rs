use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use rusqlite::params;

use crate::db::{
    helpers::{invalid_data, parse_category, parse_day, to_i64, to_u64, DAY_FORMAT},
    models::DailyStat,
    Database,
};

impl Database {
    /// Adds each entry's count onto the stored total for its key.
    pub async fn add_daily_stats(&self, deltas: &[DailyStat]) -> Result<()> {
        if deltas.is_empty() {
            return Ok(());
        }
        let deltas = deltas.to_vec();
        self.execute(move |conn| {
            let tx = conn.transaction()?;
            {
                let mut stmt = tx.prepare(
                    "INSERT INTO daily_stats (room, category, day, count, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5)
                     ON CONFLICT (room, category, day)
                     DO UPDATE SET count = count + excluded.count,
                                   updated_at = excluded.updated_at",
                )?;
                let updated_at = Utc::now().to_rfc3339();
                for delta in &deltas {
                    stmt.execute(params![
                        delta.room,
                        delta.category.as_str(),
                        delta.day.format(DAY_FORMAT).to_string(),
                        to_i64(delta.count)?,
                        updated_at,
                    ])
                    .with_context(|| "failed to upsert daily stat")?;
                }
            }
            tx.commit().context("failed to commit daily stats")?;
            Ok(())
        })
        .await
    }

    pub async fn list_daily_stats(&self, since: Option<NaiveDate>) -> Result<Vec<DailyStat>> {
        let since = since
            .map(|day| day.format(DAY_FORMAT).to_string())
            .unwrap_or_default();
        self.execute(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT room, category, day, count
                 FROM daily_stats
                 WHERE day >= ?1
                 ORDER BY day DESC, room ASC, category ASC",
            )?;

            let rows = stmt.query_map(params![since], |row| {
                let category: String = row.get(1)?;
                let day: String = row.get(2)?;
                let count: i64 = row.get(3)?;
                Ok(DailyStat {
                    room: row.get(0)?,
                    category: parse_category(&category).map_err(invalid_data)?,
                    day: parse_day(&day).map_err(invalid_data)?,
                    count: to_u64(count, "count").map_err(invalid_data)?,
                })
            })?;

            let mut stats = Vec::new();
            for stat in rows {
                stats.push(stat?);
            }
            Ok(stats)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sorting::classifier::Category;
    use tempfile::TempDir;

    fn stat(room: &str, category: Category, day: NaiveDate, count: u64) -> DailyStat {
        DailyStat {
            room: room.into(),
            category,
            day,
            count,
        }
    }

    #[tokio::test]
    async fn deltas_accumulate_per_key() {
        let temp = TempDir::new().unwrap();
        let db = Database::new(temp.path().join("stats.sqlite3")).unwrap();
        let day = NaiveDate::from_ymd_opt(2026, 10, 19).unwrap();
        let before = NaiveDate::from_ymd_opt(2026, 10, 18).unwrap();

        db.add_daily_stats(&[
            stat("Friends", Category::Image, day, 2),
            stat("Friends", Category::Video, day, 1),
            stat("Work", Category::Document, before, 4),
        ])
        .await
        .unwrap();
        db.add_daily_stats(&[stat("Friends", Category::Image, day, 3)])
            .await
            .unwrap();

        let all = db.list_daily_stats(None).await.unwrap();
        assert_eq!(all.len(), 3);
        let images = all
            .iter()
            .find(|s| s.room == "Friends" && s.category == Category::Image)
            .unwrap();
        assert_eq!(images.count, 5);

        let today = db.list_daily_stats(Some(day)).await.unwrap();
        assert_eq!(today.len(), 2);
        assert!(today.iter().all(|s| s.day == day));
    }
}
