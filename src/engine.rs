use std::sync::Arc;

use crate::{
    cache::CacheStore,
    clock::SharedClock,
    config::EngineConfig,
    db::{Database, SessionFilter, SessionKind, SessionPage, StudySession},
    directory::{FriendGraph, IdentityLookup, TopicResolver},
    error::StudyResult,
    ranking::{Leaderboard, RankingItem, RankingStore, ScopeKind},
    stats::{StatsRange, StatsService, StatsSummary},
    study::{Finalizer, LivenessTracker, Reaper, StudyController, TopicRef},
};

/// The session engine with all components wired to one database, cache and clock.
#[derive(Clone)]
pub struct StudyEngine {
    controller: StudyController,
    stats: StatsService,
    leaderboard: Leaderboard,
    reaper: Reaper,
}

impl StudyEngine {
    pub fn new(
        config: &EngineConfig,
        db: Database,
        cache: Arc<dyn CacheStore>,
        identity: Arc<dyn IdentityLookup>,
        friends: Arc<dyn FriendGraph>,
        topics: Arc<dyn TopicResolver>,
        clock: SharedClock,
    ) -> Self {
        let liveness = LivenessTracker::new(cache.clone(), clock.clone(), config.liveness_ttl());
        let rankings = RankingStore::new(cache, config.week_retention());
        let finalizer = Finalizer::new(
            db.clone(),
            rankings.clone(),
            liveness.clone(),
            clock.clone(),
        );

        let controller = StudyController::new(
            db.clone(),
            liveness.clone(),
            finalizer.clone(),
            topics,
            clock.clone(),
            config.end_attempts(),
        );
        let reaper = Reaper::new(
            db.clone(),
            liveness,
            finalizer,
            clock.clone(),
            config.reaper_grace(),
        );
        let stats = StatsService::new(db, clock.clone());
        let leaderboard = Leaderboard::new(rankings, identity, friends, clock);

        Self {
            controller,
            stats,
            leaderboard,
            reaper,
        }
    }

    pub async fn start(
        &self,
        user_id: &str,
        kind: SessionKind,
        topic: Option<TopicRef>,
    ) -> StudyResult<StudySession> {
        self.controller.start(user_id, kind, topic).await
    }

    pub async fn heartbeat(&self, user_id: &str, session_id: &str) -> StudyResult<()> {
        self.controller.heartbeat(user_id, session_id).await
    }

    pub async fn end(&self, user_id: &str, session_id: &str) -> StudyResult<StudySession> {
        self.controller.end(user_id, session_id).await
    }

    pub async fn cancel(&self, user_id: &str) -> StudyResult<u64> {
        self.controller.cancel(user_id).await
    }

    pub async fn get_active(&self, user_id: &str) -> StudyResult<Option<StudySession>> {
        self.controller.get_active(user_id).await
    }

    pub async fn list_sessions(
        &self,
        user_id: &str,
        filter: SessionFilter,
    ) -> StudyResult<SessionPage> {
        self.controller.list_sessions(user_id, filter).await
    }

    pub async fn stats_summary(&self, user_id: &str, range: StatsRange) -> StudyResult<StatsSummary> {
        self.stats.summary(user_id, range).await
    }

    pub async fn global_top(&self, kind: ScopeKind, limit: usize) -> StudyResult<Vec<RankingItem>> {
        self.leaderboard.global_top(kind, limit).await
    }

    pub async fn friend_top(
        &self,
        user_id: &str,
        kind: ScopeKind,
        limit: usize,
    ) -> StudyResult<Vec<RankingItem>> {
        self.leaderboard.friend_top(user_id, kind, limit).await
    }

    pub fn reaper(&self) -> Reaper {
        self.reaper.clone()
    }
}
