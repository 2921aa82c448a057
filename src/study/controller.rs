use std::sync::Arc;

use log::{info, warn};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{Finalizer, LivenessTracker};
use crate::{
    clock::{Clock, SharedClock},
    db::{Database, InsertOutcome, SessionFilter, SessionKind, SessionPage, StudySession},
    directory::TopicResolver,
    error::{StudyError, StudyResult},
};

/// How a caller names the topic of a new session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TopicRef {
    Id(String),
    /// Free text, resolved (or created) through the topic resolver.
    Name(String),
}

/// Owns session state transitions: start, heartbeat, end, cancel.
#[derive(Clone)]
pub struct StudyController {
    db: Database,
    liveness: LivenessTracker,
    finalizer: Finalizer,
    topics: Arc<dyn TopicResolver>,
    clock: SharedClock,
    end_attempts: u32,
}

impl StudyController {
    pub fn new(
        db: Database,
        liveness: LivenessTracker,
        finalizer: Finalizer,
        topics: Arc<dyn TopicResolver>,
        clock: SharedClock,
        end_attempts: u32,
    ) -> Self {
        Self {
            db,
            liveness,
            finalizer,
            topics,
            clock,
            end_attempts: end_attempts.max(1),
        }
    }

    pub async fn start(
        &self,
        user_id: &str,
        kind: SessionKind,
        topic: Option<TopicRef>,
    ) -> StudyResult<StudySession> {
        let now = self.clock.now();
        let topic_id = match topic {
            None => None,
            Some(TopicRef::Id(id)) => Some(id),
            Some(TopicRef::Name(name)) => {
                if name.trim().is_empty() {
                    return Err(StudyError::InvalidInput("topic name is empty".into()));
                }
                Some(self.topics.resolve_or_create_topic(&name, now).await?)
            }
        };

        let session = StudySession {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            kind,
            started_at: now,
            ended_at: None,
            duration_minutes: None,
            topic_id,
            created_at: now,
        };

        match self.db.insert_session(&session).await? {
            InsertOutcome::Inserted => {}
            InsertOutcome::ActiveExists => return Err(StudyError::Conflict),
            InsertOutcome::UnknownTopic => {
                return Err(StudyError::InvalidInput(format!(
                    "unknown topic {}",
                    session.topic_id.as_deref().unwrap_or_default()
                )))
            }
        }

        // Without a marker the reaper reclaims the session on its next sweep,
        // which only shortens it; the start itself has succeeded.
        if let Err(err) = self.liveness.touch(&session.id).await {
            warn!("Failed to create liveness marker for session {}: {err:#}", session.id);
        }

        info!(
            "Started {} session {} for user {}",
            kind.as_str(),
            session.id,
            user_id
        );
        Ok(session)
    }

    pub async fn heartbeat(&self, user_id: &str, session_id: &str) -> StudyResult<()> {
        self.owned_session(user_id, session_id)
            .await?
            .filter(StudySession::is_active)
            .ok_or(StudyError::NotFound)?;

        self.liveness.touch(session_id).await?;
        Ok(())
    }

    pub async fn end(&self, user_id: &str, session_id: &str) -> StudyResult<StudySession> {
        let session = self
            .owned_session(user_id, session_id)
            .await?
            .ok_or(StudyError::NotFound)?;
        if !session.is_active() {
            return Err(StudyError::AlreadyEnded);
        }

        let end_time = self.clock.now();
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.finalizer.finalize(&session, end_time).await {
                Err(err) if err.is_transient() && attempt < self.end_attempts => {
                    warn!("Finalizing session {session_id} failed, retrying: {err}");
                }
                result => return result,
            }
        }
    }

    /// Hard-deletes the user's active session, if any. Returns how many were removed.
    pub async fn cancel(&self, user_id: &str) -> StudyResult<u64> {
        let removed = self.db.delete_active_sessions(user_id).await?;
        for session_id in &removed {
            if let Err(err) = self.liveness.clear(session_id).await {
                warn!("Failed to clear liveness marker for cancelled session {session_id}: {err:#}");
            }
            info!("Cancelled session {session_id} for user {user_id}");
        }
        Ok(removed.len() as u64)
    }

    pub async fn get_active(&self, user_id: &str) -> StudyResult<Option<StudySession>> {
        Ok(self.db.get_active_session(user_id).await?)
    }

    pub async fn list_sessions(
        &self,
        user_id: &str,
        filter: SessionFilter,
    ) -> StudyResult<SessionPage> {
        if let (Some(from), Some(to)) = (filter.from, filter.to) {
            if from > to {
                return Err(StudyError::InvalidInput(format!(
                    "range start {from} is after range end {to}"
                )));
            }
        }

        let (items, total) = self.db.list_sessions(user_id, &filter).await?;
        Ok(SessionPage {
            items,
            total,
            page: filter.effective_page(),
            page_size: filter.effective_page_size(),
        })
    }

    /// The session, if it exists and belongs to `user_id`.
    async fn owned_session(
        &self,
        user_id: &str,
        session_id: &str,
    ) -> StudyResult<Option<StudySession>> {
        let session = self.db.get_session(session_id).await?;
        Ok(session.filter(|s| s.user_id == user_id))
    }
}
