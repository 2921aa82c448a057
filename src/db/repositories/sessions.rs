use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, params_from_iter, types::Value, Row, Transaction};

use crate::db::{
    helpers::{
        format_date, format_datetime, is_foreign_key_violation, is_unique_violation,
        parse_datetime, parse_kind, parse_optional_datetime, start_of_day,
    },
    models::{FinalizeOutcome, InsertOutcome, SessionFilter, StudySession},
    Database,
};

const SESSION_COLUMNS: &str =
    "id, user_id, kind, started_at, ended_at, duration_minutes, topic_id, created_at";

fn row_to_session(row: &Row) -> Result<StudySession> {
    let kind: String = row.get("kind")?;
    let started_at: String = row.get("started_at")?;
    let ended_at: Option<String> = row.get("ended_at")?;
    let created_at: String = row.get("created_at")?;

    Ok(StudySession {
        id: row.get("id")?,
        user_id: row.get("user_id")?,
        kind: parse_kind(&kind)?,
        started_at: parse_datetime(&started_at, "started_at")?,
        ended_at: parse_optional_datetime(ended_at, "ended_at")?,
        duration_minutes: row.get("duration_minutes")?,
        topic_id: row.get("topic_id")?,
        created_at: parse_datetime(&created_at, "created_at")?,
    })
}

fn select_session(tx: &Transaction<'_>, session_id: &str) -> Result<Option<StudySession>> {
    let mut stmt = tx.prepare(&format!(
        "SELECT {SESSION_COLUMNS} FROM study_sessions WHERE id = ?1"
    ))?;
    let mut rows = stmt.query(params![session_id])?;
    match rows.next()? {
        Some(row) => Ok(Some(row_to_session(row)?)),
        None => Ok(None),
    }
}

fn add_daily_minutes(
    tx: &Transaction<'_>,
    session: &StudySession,
    minutes: i64,
    now: &str,
) -> Result<()> {
    tx.execute(
        "INSERT INTO daily_aggregates (user_id, date, total_minutes, updated_at)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(user_id, date) DO UPDATE
         SET total_minutes = daily_aggregates.total_minutes + excluded.total_minutes,
             updated_at = excluded.updated_at",
        params![
            session.user_id,
            format_date(&session.attributed_date()),
            minutes,
            now,
        ],
    )
    .context("failed to update daily aggregate")?;
    Ok(())
}

fn add_topic_minutes(
    tx: &Transaction<'_>,
    user_id: &str,
    topic_id: &str,
    minutes: i64,
    now: &str,
) -> Result<()> {
    tx.execute(
        "INSERT INTO topic_aggregates (user_id, topic_id, total_minutes, updated_at)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(user_id, topic_id) DO UPDATE
         SET total_minutes = topic_aggregates.total_minutes + excluded.total_minutes,
             updated_at = excluded.updated_at",
        params![user_id, topic_id, minutes, now],
    )
    .context("failed to update topic aggregate")?;
    Ok(())
}

impl Database {
    /// Inserts an open session. The partial unique index on open rows turns a
    /// concurrent second start into `ActiveExists` instead of a duplicate.
    pub async fn insert_session(&self, session: &StudySession) -> Result<InsertOutcome> {
        let record = session.clone();
        self.execute(move |conn| {
            let result = conn.execute(
                "INSERT INTO study_sessions (id, user_id, kind, started_at, ended_at, duration_minutes, topic_id, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    record.id,
                    record.user_id,
                    record.kind.as_str(),
                    format_datetime(&record.started_at),
                    record.ended_at.as_ref().map(format_datetime),
                    record.duration_minutes,
                    record.topic_id,
                    format_datetime(&record.created_at),
                ],
            );

            match result {
                Ok(_) => Ok(InsertOutcome::Inserted),
                Err(err) if is_unique_violation(&err) => Ok(InsertOutcome::ActiveExists),
                Err(err) if is_foreign_key_violation(&err) => Ok(InsertOutcome::UnknownTopic),
                Err(err) => Err(anyhow::Error::new(err).context("failed to insert session")),
            }
        })
        .await
    }

    pub async fn get_session(&self, session_id: &str) -> Result<Option<StudySession>> {
        let session_id = session_id.to_string();
        self.execute(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {SESSION_COLUMNS} FROM study_sessions WHERE id = ?1"
            ))?;
            let mut rows = stmt.query(params![session_id])?;
            let session = match rows.next()? {
                Some(row) => Some(row_to_session(row)?),
                None => None,
            };
            Ok(session)
        })
        .await
    }

    pub async fn get_active_session(&self, user_id: &str) -> Result<Option<StudySession>> {
        let user_id = user_id.to_string();
        self.execute(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {SESSION_COLUMNS} FROM study_sessions
                 WHERE user_id = ?1 AND ended_at IS NULL
                 LIMIT 1"
            ))?;
            let mut rows = stmt.query(params![user_id])?;
            let session = match rows.next()? {
                Some(row) => Some(row_to_session(row)?),
                None => None,
            };
            Ok(session)
        })
        .await
    }

    /// Every session that has not been finalized, oldest first.
    pub async fn list_open_sessions(&self) -> Result<Vec<StudySession>> {
        self.execute(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {SESSION_COLUMNS} FROM study_sessions
                 WHERE ended_at IS NULL
                 ORDER BY started_at ASC"
            ))?;

            let mut rows = stmt.query([])?;
            let mut sessions = Vec::new();
            while let Some(row) = rows.next()? {
                sessions.push(row_to_session(row)?);
            }
            Ok(sessions)
        })
        .await
    }

    /// Hard-deletes the user's open session, returning the ids removed.
    pub async fn delete_active_sessions(&self, user_id: &str) -> Result<Vec<String>> {
        let user_id = user_id.to_string();
        self.execute(move |conn| {
            let tx = conn.transaction()?;

            let ids = {
                let mut stmt = tx.prepare(
                    "SELECT id FROM study_sessions WHERE user_id = ?1 AND ended_at IS NULL",
                )?;
                let ids = stmt
                    .query_map(params![user_id], |row| row.get::<_, String>(0))?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                ids
            };

            tx.execute(
                "DELETE FROM study_sessions WHERE user_id = ?1 AND ended_at IS NULL",
                params![user_id],
            )
            .context("failed to delete active session")?;

            tx.commit()?;
            Ok(ids)
        })
        .await
    }

    /// Sets the end of an open session and applies its aggregate deltas in
    /// one transaction. The conditional update is the only place a session
    /// transitions to ended, so a second caller always sees `AlreadyEnded`.
    pub async fn finalize_session(
        &self,
        session_id: &str,
        ended_at: DateTime<Utc>,
        duration_minutes: i64,
        now: DateTime<Utc>,
    ) -> Result<FinalizeOutcome> {
        let session_id = session_id.to_string();
        self.execute(move |conn| {
            let tx = conn.transaction()?;

            let Some(current) = select_session(&tx, &session_id)? else {
                return Ok(FinalizeOutcome::Missing);
            };
            if current.ended_at.is_some() {
                return Ok(FinalizeOutcome::AlreadyEnded);
            }

            let changed = tx
                .execute(
                    "UPDATE study_sessions
                     SET ended_at = ?1,
                         duration_minutes = ?2
                     WHERE id = ?3 AND ended_at IS NULL",
                    params![format_datetime(&ended_at), duration_minutes, session_id],
                )
                .context("failed to mark session ended")?;
            if changed == 0 {
                return Ok(FinalizeOutcome::AlreadyEnded);
            }

            if duration_minutes > 0 {
                let now = format_datetime(&now);
                add_daily_minutes(&tx, &current, duration_minutes, &now)?;
                if let Some(topic_id) = current.topic_id.as_deref() {
                    add_topic_minutes(&tx, &current.user_id, topic_id, duration_minutes, &now)?;
                }
            }

            let finalized = select_session(&tx, &session_id)?
                .context("session vanished inside finalize transaction")?;
            tx.commit().context("failed to commit finalize transaction")?;

            Ok(FinalizeOutcome::Finalized(finalized))
        })
        .await
    }

    /// One page of a user's sessions, newest first, plus the unpaged count.
    pub async fn list_sessions(
        &self,
        user_id: &str,
        filter: &SessionFilter,
    ) -> Result<(Vec<StudySession>, u64)> {
        let mut clauses = vec!["user_id = ?".to_string()];
        let mut values = vec![Value::Text(user_id.to_string())];

        if let Some(kind) = filter.kind {
            clauses.push("kind = ?".into());
            values.push(Value::Text(kind.as_str().into()));
        }
        if let Some(from) = filter.from {
            clauses.push("started_at >= ?".into());
            values.push(Value::Text(start_of_day(&from)));
        }
        if let Some(to) = filter.to.and_then(|to| to.succ_opt()) {
            clauses.push("started_at < ?".into());
            values.push(Value::Text(start_of_day(&to)));
        }

        let page = filter.effective_page();
        let page_size = filter.effective_page_size();
        let offset = i64::from(page - 1) * i64::from(page_size);
        let where_sql = clauses.join(" AND ");

        self.execute(move |conn| {
            let total: i64 = conn
                .query_row(
                    &format!("SELECT COUNT(*) FROM study_sessions WHERE {where_sql}"),
                    params_from_iter(values.iter()),
                    |row| row.get(0),
                )
                .context("failed to count sessions")?;

            let mut paged = values.clone();
            paged.push(Value::Integer(i64::from(page_size)));
            paged.push(Value::Integer(offset));

            let mut stmt = conn.prepare(&format!(
                "SELECT {SESSION_COLUMNS} FROM study_sessions
                 WHERE {where_sql}
                 ORDER BY created_at DESC
                 LIMIT ? OFFSET ?"
            ))?;
            let mut rows = stmt.query(params_from_iter(paged.iter()))?;
            let mut sessions = Vec::new();
            while let Some(row) = rows.next()? {
                sessions.push(row_to_session(row)?);
            }

            Ok((sessions, total.max(0) as u64))
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{models::SessionKind, test_support::temp_database};
    use chrono::{Duration, NaiveDate, TimeZone};

    fn open_session(id: &str, user: &str, started_at: DateTime<Utc>) -> StudySession {
        StudySession {
            id: id.into(),
            user_id: user.into(),
            kind: SessionKind::Learning,
            started_at,
            ended_at: None,
            duration_minutes: None,
            topic_id: None,
            created_at: started_at,
        }
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 4, 10, 8, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn second_open_session_reports_conflict() {
        let (_dir, db) = temp_database();
        let first = db.insert_session(&open_session("s1", "u1", t0())).await.unwrap();
        let second = db.insert_session(&open_session("s2", "u1", t0())).await.unwrap();
        let other_user = db.insert_session(&open_session("s3", "u2", t0())).await.unwrap();

        assert_eq!(first, InsertOutcome::Inserted);
        assert_eq!(second, InsertOutcome::ActiveExists);
        assert_eq!(other_user, InsertOutcome::Inserted);
    }

    #[tokio::test]
    async fn unknown_topic_is_reported() {
        let (_dir, db) = temp_database();
        let mut session = open_session("s1", "u1", t0());
        session.topic_id = Some("no-such-topic".into());
        assert_eq!(db.insert_session(&session).await.unwrap(), InsertOutcome::UnknownTopic);
        assert!(db.get_active_session("u1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn finalize_applies_daily_total_once() {
        let (_dir, db) = temp_database();
        db.insert_session(&open_session("s1", "u1", t0())).await.unwrap();
        let end = t0() + Duration::minutes(37);

        let first = db.finalize_session("s1", end, 37, end).await.unwrap();
        let second = db.finalize_session("s1", end, 37, end).await.unwrap();

        match first {
            FinalizeOutcome::Finalized(session) => {
                assert_eq!(session.ended_at, Some(end));
                assert_eq!(session.duration_minutes, Some(37));
            }
            other => panic!("unexpected outcome {other:?}"),
        }
        assert_eq!(second, FinalizeOutcome::AlreadyEnded);

        let day = NaiveDate::from_ymd_opt(2026, 4, 10).unwrap();
        let totals = db.daily_totals("u1", day, day).await.unwrap();
        assert_eq!(totals.len(), 1);
        assert_eq!(totals[0].minutes, 37);
    }

    #[tokio::test]
    async fn finalize_of_cancelled_session_is_missing() {
        let (_dir, db) = temp_database();
        db.insert_session(&open_session("s1", "u1", t0())).await.unwrap();
        let removed = db.delete_active_sessions("u1").await.unwrap();
        assert_eq!(removed, vec!["s1".to_string()]);

        let outcome = db.finalize_session("s1", t0(), 0, t0()).await.unwrap();
        assert_eq!(outcome, FinalizeOutcome::Missing);
        assert!(db.get_session("s1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn zero_duration_records_end_without_aggregates() {
        let (_dir, db) = temp_database();
        db.insert_session(&open_session("s1", "u1", t0())).await.unwrap();

        let outcome = db.finalize_session("s1", t0(), 0, t0()).await.unwrap();
        assert!(matches!(outcome, FinalizeOutcome::Finalized(ref s) if s.duration_minutes == Some(0)));
        assert_eq!(db.lifetime_minutes("u1").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn list_sessions_filters_and_pages() {
        let (_dir, db) = temp_database();
        for day in 0..5i64 {
            let start = t0() + Duration::days(day);
            let mut session = open_session(&format!("s{day}"), "u1", start);
            if day % 2 == 1 {
                session.kind = SessionKind::Rest;
            }
            db.insert_session(&session).await.unwrap();
            db.finalize_session(&session.id, start + Duration::minutes(10), 10, start)
                .await
                .unwrap();
        }

        let (page, total) = db
            .list_sessions(
                "u1",
                &SessionFilter {
                    page_size: Some(2),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(total, 5);
        assert_eq!(
            page.iter().map(|s| s.id.as_str()).collect::<Vec<_>>(),
            vec!["s4", "s3"]
        );

        let (learning, total) = db
            .list_sessions(
                "u1",
                &SessionFilter {
                    kind: Some(SessionKind::Learning),
                    from: Some(NaiveDate::from_ymd_opt(2026, 4, 11).unwrap()),
                    to: Some(NaiveDate::from_ymd_opt(2026, 4, 12).unwrap()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(total, 1);
        assert_eq!(learning[0].id, "s2");
    }
}
