use log::{debug, error, info, warn};
use serde::Serialize;
use tokio::time::{Duration, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::{Finalizer, LivenessTracker};
use crate::{
    clock::{Clock, SharedClock},
    db::Database,
    error::StudyError,
};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepReport {
    pub examined: usize,
    pub alive: usize,
    pub reclaimed: usize,
    pub failed: usize,
}

/// Finds open sessions whose liveness marker has lapsed and finalizes them
/// with an end time backdated by the grace period.
#[derive(Clone)]
pub struct Reaper {
    db: Database,
    liveness: LivenessTracker,
    finalizer: Finalizer,
    clock: SharedClock,
    grace: chrono::Duration,
}

impl Reaper {
    pub fn new(
        db: Database,
        liveness: LivenessTracker,
        finalizer: Finalizer,
        clock: SharedClock,
        grace: chrono::Duration,
    ) -> Self {
        Self {
            db,
            liveness,
            finalizer,
            clock,
            grace,
        }
    }

    pub async fn sweep(&self) -> SweepReport {
        let mut report = SweepReport::default();

        let open = match self.db.list_open_sessions().await {
            Ok(open) => open,
            Err(err) => {
                error!("Reaper could not load open sessions: {err:#}");
                return report;
            }
        };

        for session in open {
            report.examined += 1;
            if self.liveness.is_alive(&session.id).await {
                report.alive += 1;
                continue;
            }

            let estimated_end = (self.clock.now() - self.grace).max(session.started_at);
            match self.finalizer.finalize(&session, estimated_end).await {
                Ok(finalized) => {
                    report.reclaimed += 1;
                    warn!(
                        "Reclaimed abandoned session {} for user {} ({} min)",
                        finalized.id,
                        finalized.user_id,
                        finalized.duration_minutes.unwrap_or(0)
                    );
                    // A heartbeat racing the finalize may have recreated the marker.
                    if let Err(err) = self.liveness.clear(&finalized.id).await {
                        warn!("Failed to clear liveness marker for {}: {err:#}", finalized.id);
                    }
                }
                // Ended or cancelled by its owner since the listing.
                Err(StudyError::AlreadyEnded) | Err(StudyError::NotFound) => {}
                Err(err) => {
                    report.failed += 1;
                    error!("Failed to reclaim session {}, will retry next sweep: {err}", session.id);
                }
            }
        }

        debug!(
            "Reaper sweep: examined={} alive={} reclaimed={} failed={}",
            report.examined, report.alive, report.reclaimed, report.failed
        );
        report
    }
}

/// Runs `sweep` every `interval` until `cancel_token` fires. The first sweep
/// happens one full interval after start.
pub async fn reaper_loop(reaper: Reaper, interval: Duration, cancel_token: CancellationToken) {
    let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    info!("Reaper started (interval {}s)", interval.as_secs());
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                reaper.sweep().await;
            }
            _ = cancel_token.cancelled() => {
                info!("Reaper loop shutting down");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        cache::MemoryCache,
        clock::ManualClock,
        db::{test_support::temp_database, InsertOutcome, SessionKind, StudySession},
        ranking::{RankingScope, RankingStore},
        study::liveness::test_support::DownCache,
    };
    use chrono::{DateTime, TimeZone, Utc};
    use std::sync::Arc;

    struct Fixture {
        _dir: tempfile::TempDir,
        db: Database,
        clock: Arc<ManualClock>,
        liveness: LivenessTracker,
        rankings: RankingStore,
        reaper: Reaper,
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 15, 21, 0, 0).unwrap()
    }

    fn fixture() -> Fixture {
        let (dir, db) = temp_database();
        let clock = Arc::new(ManualClock::new(t0()));
        let cache = Arc::new(MemoryCache::new(clock.clone()));
        let liveness = LivenessTracker::new(
            cache.clone(),
            clock.clone(),
            std::time::Duration::from_secs(180),
        );
        let rankings = RankingStore::new(cache, std::time::Duration::from_secs(14 * 86_400));
        let finalizer =
            Finalizer::new(db.clone(), rankings.clone(), liveness.clone(), clock.clone());
        let reaper = Reaper::new(
            db.clone(),
            liveness.clone(),
            finalizer,
            clock.clone(),
            chrono::Duration::minutes(3),
        );
        Fixture {
            _dir: dir,
            db,
            clock,
            liveness,
            rankings,
            reaper,
        }
    }

    async fn start(fx: &Fixture, id: &str, user: &str) -> StudySession {
        let now = fx.clock.now();
        let session = StudySession {
            id: id.into(),
            user_id: user.into(),
            kind: SessionKind::Learning,
            started_at: now,
            ended_at: None,
            duration_minutes: None,
            topic_id: None,
            created_at: now,
        };
        assert_eq!(fx.db.insert_session(&session).await.unwrap(), InsertOutcome::Inserted);
        fx.liveness.touch(id).await.unwrap();
        session
    }

    #[tokio::test]
    async fn abandoned_session_is_backdated_by_grace() {
        let fx = fixture();
        start(&fx, "s1", "ann").await;

        fx.clock.advance(chrono::Duration::minutes(5));
        let report = fx.reaper.sweep().await;
        assert_eq!(report.reclaimed, 1);

        let session = fx.db.get_session("s1").await.unwrap().unwrap();
        assert_eq!(session.ended_at, Some(t0() + chrono::Duration::minutes(2)));
        assert_eq!(session.duration_minutes, Some(2));
        assert_eq!(fx.db.lifetime_minutes("ann").await.unwrap(), 2);
        let lifetime = fx.rankings.top_n(RankingScope::Lifetime, 1).await.unwrap();
        assert_eq!(lifetime[0].minutes, 2);
        assert!(fx.db.list_open_sessions().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn live_session_is_left_alone() {
        let fx = fixture();
        start(&fx, "s1", "ann").await;

        for _ in 0..5 {
            fx.clock.advance(chrono::Duration::minutes(2));
            fx.liveness.touch("s1").await.unwrap();
            let report = fx.reaper.sweep().await;
            assert_eq!(report.alive, 1);
            assert_eq!(report.reclaimed, 0);
        }
        assert!(fx.db.get_session("s1").await.unwrap().unwrap().is_active());
    }

    #[tokio::test]
    async fn session_younger_than_grace_ends_at_its_start() {
        let fx = fixture();
        let session = start(&fx, "s1", "ann").await;
        fx.liveness.clear("s1").await.unwrap();

        fx.clock.advance(chrono::Duration::minutes(1));
        fx.reaper.sweep().await;

        let ended = fx.db.get_session("s1").await.unwrap().unwrap();
        assert_eq!(ended.ended_at, Some(session.started_at));
        assert_eq!(ended.duration_minutes, Some(0));
        assert_eq!(fx.db.lifetime_minutes("ann").await.unwrap(), 0);
        assert!(fx.rankings.top_n(RankingScope::Lifetime, 1).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn second_sweep_finds_nothing_to_do() {
        let fx = fixture();
        start(&fx, "s1", "ann").await;
        start(&fx, "s2", "bo").await;

        fx.clock.advance(chrono::Duration::minutes(10));
        fx.liveness.touch("s2").await.unwrap();

        let first = fx.reaper.sweep().await;
        assert_eq!(
            first,
            SweepReport {
                examined: 2,
                alive: 1,
                reclaimed: 1,
                failed: 0
            }
        );
        let second = fx.reaper.sweep().await;
        assert_eq!(second.examined, 1);
        assert_eq!(second.reclaimed, 0);
        assert_eq!(fx.db.lifetime_minutes("ann").await.unwrap(), 7);
    }

    #[tokio::test]
    async fn cache_outage_reclaims_nothing() {
        let (_dir, db) = temp_database();
        let clock = Arc::new(ManualClock::new(t0()));
        let down = Arc::new(DownCache);
        let liveness =
            LivenessTracker::new(down.clone(), clock.clone(), std::time::Duration::from_secs(180));
        let finalizer = Finalizer::new(
            db.clone(),
            RankingStore::new(down, std::time::Duration::from_secs(60)),
            liveness.clone(),
            clock.clone(),
        );
        let reaper = Reaper::new(
            db.clone(),
            liveness,
            finalizer,
            clock.clone(),
            chrono::Duration::minutes(3),
        );

        let session = StudySession {
            id: "s1".into(),
            user_id: "ann".into(),
            kind: SessionKind::Rest,
            started_at: t0(),
            ended_at: None,
            duration_minutes: None,
            topic_id: None,
            created_at: t0(),
        };
        db.insert_session(&session).await.unwrap();

        clock.advance(chrono::Duration::hours(1));
        let report = reaper.sweep().await;
        assert_eq!(report.alive, 1);
        assert_eq!(report.reclaimed, 0);
        assert!(db.get_session("s1").await.unwrap().unwrap().is_active());
    }

    #[tokio::test]
    async fn loop_stops_on_cancel() {
        let fx = fixture();
        start(&fx, "s1", "ann").await;
        fx.clock.advance(chrono::Duration::minutes(30));

        let token = CancellationToken::new();
        let handle = tokio::spawn(reaper_loop(
            fx.reaper.clone(),
            Duration::from_secs(300),
            token.clone(),
        ));

        token.cancel();
        handle.await.unwrap();
        assert!(fx.db.get_session("s1").await.unwrap().unwrap().is_active());
    }
}
