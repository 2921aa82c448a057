use anyhow::Result;
use chrono::NaiveDate;
use rusqlite::params;

use crate::db::{
    helpers::{format_date, parse_date},
    models::{DailyTotal, TopicTotal},
    Database,
};

impl Database {
    /// Recorded daily totals within `[from, to]`, ascending by date. Days
    /// without a row are absent.
    pub async fn daily_totals(
        &self,
        user_id: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<DailyTotal>> {
        let user_id = user_id.to_string();
        self.execute(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT date, total_minutes FROM daily_aggregates
                 WHERE user_id = ?1 AND date BETWEEN ?2 AND ?3
                 ORDER BY date ASC",
            )?;
            let mut rows = stmt.query(params![user_id, format_date(&from), format_date(&to)])?;
            let mut totals = Vec::new();
            while let Some(row) = rows.next()? {
                let date: String = row.get(0)?;
                totals.push(DailyTotal {
                    date: parse_date(&date, "date")?,
                    minutes: row.get(1)?,
                });
            }
            Ok(totals)
        })
        .await
    }

    pub async fn lifetime_minutes(&self, user_id: &str) -> Result<i64> {
        let user_id = user_id.to_string();
        self.execute(move |conn| {
            let total: i64 = conn.query_row(
                "SELECT COALESCE(SUM(total_minutes), 0) FROM daily_aggregates WHERE user_id = ?1",
                params![user_id],
                |row| row.get(0),
            )?;
            Ok(total)
        })
        .await
    }

    /// Dates with a positive total, most recent first.
    pub async fn active_dates(&self, user_id: &str) -> Result<Vec<NaiveDate>> {
        let user_id = user_id.to_string();
        self.execute(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT date FROM daily_aggregates
                 WHERE user_id = ?1 AND total_minutes > 0
                 ORDER BY date DESC",
            )?;
            let mut rows = stmt.query(params![user_id])?;
            let mut dates = Vec::new();
            while let Some(row) = rows.next()? {
                let date: String = row.get(0)?;
                dates.push(parse_date(&date, "date")?);
            }
            Ok(dates)
        })
        .await
    }

    pub async fn topic_totals(&self, user_id: &str) -> Result<Vec<TopicTotal>> {
        let user_id = user_id.to_string();
        self.execute(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT a.topic_id, t.name, a.total_minutes
                 FROM topic_aggregates a
                 JOIN topics t ON t.id = a.topic_id
                 WHERE a.user_id = ?1 AND a.total_minutes > 0
                 ORDER BY a.total_minutes DESC, t.name ASC",
            )?;
            let mut rows = stmt.query(params![user_id])?;
            let mut totals = Vec::new();
            while let Some(row) = rows.next()? {
                totals.push(TopicTotal {
                    topic_id: row.get(0)?,
                    topic_name: row.get(1)?,
                    minutes: row.get(2)?,
                });
            }
            Ok(totals)
        })
        .await
    }
}
