use chrono::{DateTime, Utc};
use log::{info, warn};

use super::LivenessTracker;
use crate::{
    clock::{Clock, SharedClock},
    db::{Database, FinalizeOutcome, StudySession},
    error::{StudyError, StudyResult},
    ranking::RankingStore,
};

const BEST_EFFORT_ATTEMPTS: u32 = 2;

/// Shared end-of-session pipeline used by explicit ends and the reaper.
///
/// The durable phase (end timestamp, daily and topic aggregates) commits as a
/// single transaction guarded by "still open", so it applies at most once per
/// session. Ranking increments and the liveness clear run afterwards against
/// the cache; each cache write is retried once on its own, and failures are
/// logged without undoing the durable result.
#[derive(Clone)]
pub struct Finalizer {
    db: Database,
    rankings: RankingStore,
    liveness: LivenessTracker,
    clock: SharedClock,
}

impl Finalizer {
    pub fn new(
        db: Database,
        rankings: RankingStore,
        liveness: LivenessTracker,
        clock: SharedClock,
    ) -> Self {
        Self {
            db,
            rankings,
            liveness,
            clock,
        }
    }

    pub async fn finalize(
        &self,
        session: &StudySession,
        end_time: DateTime<Utc>,
    ) -> StudyResult<StudySession> {
        let duration = duration_minutes(session.started_at, end_time);

        let outcome = self
            .db
            .finalize_session(&session.id, end_time, duration, self.clock.now())
            .await?;
        let finalized = match outcome {
            FinalizeOutcome::Finalized(finalized) => finalized,
            FinalizeOutcome::AlreadyEnded => return Err(StudyError::AlreadyEnded),
            FinalizeOutcome::Missing => return Err(StudyError::NotFound),
        };

        info!(
            "Finalized session {} for user {} ({} min)",
            finalized.id, finalized.user_id, duration
        );

        self.apply_side_effects(&finalized, duration, end_time).await;
        Ok(finalized)
    }

    async fn apply_side_effects(
        &self,
        session: &StudySession,
        duration: i64,
        end_time: DateTime<Utc>,
    ) {
        // `record` retries each write itself; running it again would recount.
        if let Err(err) = self.rankings.record(&session.user_id, duration, end_time).await {
            warn!("Ranking update for session {} incomplete: {err:#}", session.id);
        }

        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.liveness.clear(&session.id).await {
                Ok(()) => break,
                Err(err) if attempt < BEST_EFFORT_ATTEMPTS => {
                    warn!("Liveness clear for session {} failed, retrying: {err:#}", session.id);
                }
                Err(err) => {
                    // The marker expires on its own within one TTL.
                    warn!("Liveness clear for session {} dropped: {err:#}", session.id);
                    break;
                }
            }
        }
    }
}

/// Whole minutes between start and end, truncated; never negative.
pub fn duration_minutes(started_at: DateTime<Utc>, ended_at: DateTime<Utc>) -> i64 {
    (ended_at - started_at).num_minutes().max(0)
}
