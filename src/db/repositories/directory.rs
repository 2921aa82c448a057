use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};
use uuid::Uuid;

use crate::db::{
    helpers::{format_datetime, parse_friend_status},
    models::{BasicProfile, FriendStatus},
    Database,
};

impl Database {
    pub async fn upsert_profile(&self, profile: &BasicProfile, now: DateTime<Utc>) -> Result<()> {
        let record = profile.clone();
        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO users (id, nickname, avatar_url, created_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(id) DO UPDATE
                 SET nickname = excluded.nickname,
                     avatar_url = excluded.avatar_url",
                params![
                    record.id,
                    record.nickname,
                    record.avatar_url,
                    format_datetime(&now),
                ],
            )
            .context("failed to upsert user profile")?;
            Ok(())
        })
        .await
    }

    pub async fn fetch_profile(&self, user_id: &str) -> Result<Option<BasicProfile>> {
        let user_id = user_id.to_string();
        self.execute(move |conn| {
            let profile = conn
                .query_row(
                    "SELECT id, nickname, avatar_url FROM users WHERE id = ?1",
                    params![user_id],
                    |row| {
                        Ok(BasicProfile {
                            id: row.get(0)?,
                            nickname: row.get(1)?,
                            avatar_url: row.get(2)?,
                        })
                    },
                )
                .optional()?;
            Ok(profile)
        })
        .await
    }

    pub async fn add_friendship(
        &self,
        user_id: &str,
        friend_id: &str,
        status: FriendStatus,
        now: DateTime<Utc>,
    ) -> Result<()> {
        if user_id == friend_id {
            bail!("a user cannot befriend themselves");
        }
        let user_id = user_id.to_string();
        let friend_id = friend_id.to_string();
        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO friendships (user_id, friend_id, status, created_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(user_id, friend_id) DO UPDATE SET status = excluded.status",
                params![
                    user_id,
                    friend_id,
                    status.as_str(),
                    format_datetime(&now),
                ],
            )
            .context("failed to store friendship")?;
            Ok(())
        })
        .await
    }

    /// Ids on the other side of every accepted friendship, in either direction.
    pub async fn accepted_friend_ids(&self, user_id: &str) -> Result<Vec<String>> {
        let user_id = user_id.to_string();
        self.execute(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT user_id, friend_id, status FROM friendships
                 WHERE user_id = ?1 OR friend_id = ?1
                 ORDER BY created_at ASC",
            )?;
            let mut rows = stmt.query(params![user_id])?;
            let mut friends: Vec<String> = Vec::new();
            while let Some(row) = rows.next()? {
                let status: String = row.get(2)?;
                if parse_friend_status(&status)? != FriendStatus::Accepted {
                    continue;
                }
                let left: String = row.get(0)?;
                let right: String = row.get(1)?;
                let other = if left == user_id { right } else { left };
                if !friends.contains(&other) {
                    friends.push(other);
                }
            }
            Ok(friends)
        })
        .await
    }

    /// Normalises `name` (trimmed, lowercase), creating the topic on first
    /// use. Alias topics resolve to their parent.
    pub async fn topic_id_for_name(&self, name: &str, now: DateTime<Utc>) -> Result<String> {
        let normalized = name.trim().to_lowercase();
        if normalized.is_empty() {
            bail!("topic name must not be empty");
        }
        self.execute(move |conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "INSERT INTO topics (id, name, parent_id, created_at)
                 VALUES (?1, ?2, NULL, ?3)
                 ON CONFLICT(name) DO NOTHING",
                params![
                    Uuid::new_v4().to_string(),
                    normalized,
                    format_datetime(&now),
                ],
            )
            .context("failed to create topic")?;

            let (id, parent_id): (String, Option<String>) = tx.query_row(
                "SELECT id, parent_id FROM topics WHERE name = ?1",
                params![normalized],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )?;
            tx.commit()?;

            Ok(parent_id.unwrap_or(id))
        })
        .await
    }

    /// Points `alias` at the canonical topic `canonical`, creating both if needed.
    pub async fn alias_topic(
        &self,
        alias: &str,
        canonical: &str,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let canonical_id = self.topic_id_for_name(canonical, now).await?;
        let alias_id = self.topic_id_for_name(alias, now).await?;
        if alias_id == canonical_id {
            return Ok(());
        }
        self.execute(move |conn| {
            conn.execute(
                "UPDATE topics SET parent_id = ?1 WHERE id = ?2",
                params![canonical_id, alias_id],
            )
            .context("failed to alias topic")?;
            Ok(())
        })
        .await
    }
}
