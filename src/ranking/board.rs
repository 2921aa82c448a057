use std::{collections::HashSet, sync::Arc};

use serde::{Deserialize, Serialize};

use super::{RankingStore, ScopeKind};
use crate::{
    clock::{Clock, SharedClock},
    directory::{FriendGraph, IdentityLookup},
    error::{StudyError, StudyResult},
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RankingItem {
    pub user_id: String,
    pub minutes: i64,
    pub nickname: String,
    pub avatar_url: Option<String>,
}

/// Read side of the rankings, hydrated with display fields.
#[derive(Clone)]
pub struct Leaderboard {
    store: RankingStore,
    identity: Arc<dyn IdentityLookup>,
    friends: Arc<dyn FriendGraph>,
    clock: SharedClock,
}

impl Leaderboard {
    pub fn new(
        store: RankingStore,
        identity: Arc<dyn IdentityLookup>,
        friends: Arc<dyn FriendGraph>,
        clock: SharedClock,
    ) -> Self {
        Self {
            store,
            identity,
            friends,
            clock,
        }
    }

    pub async fn global_top(&self, kind: ScopeKind, limit: usize) -> StudyResult<Vec<RankingItem>> {
        check_limit(limit)?;
        let scope = kind.resolve(self.clock.now());
        let ranked = self.store.top_n(scope, limit).await?;
        let ranked = ranked
            .into_iter()
            .map(|entry| (entry.user_id, entry.minutes))
            .collect();
        self.hydrate(ranked).await
    }

    /// Ranks the caller among their accepted friends. No per-group sorted set
    /// exists, so scores are fetched in one batch and sorted here.
    pub async fn friend_top(
        &self,
        user_id: &str,
        kind: ScopeKind,
        limit: usize,
    ) -> StudyResult<Vec<RankingItem>> {
        check_limit(limit)?;
        let scope = kind.resolve(self.clock.now());

        let mut seen = HashSet::new();
        let mut members = vec![user_id.to_string()];
        seen.insert(user_id.to_string());
        for friend in self.friends.list_accepted_friends(user_id).await? {
            if seen.insert(friend.clone()) {
                members.push(friend);
            }
        }

        let scores = self.store.scores_of(scope, &members).await?;
        let mut ranked: Vec<(String, i64)> = members
            .into_iter()
            .map(|id| {
                let minutes = scores.get(&id).copied().unwrap_or(0);
                (id, minutes)
            })
            .collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1));

        let mut items = self.hydrate(ranked).await?;
        items.truncate(limit);
        Ok(items)
    }

    /// Attaches profiles in the given order, dropping ids that no longer resolve.
    async fn hydrate(&self, ranked: Vec<(String, i64)>) -> StudyResult<Vec<RankingItem>> {
        let mut items = Vec::with_capacity(ranked.len());
        for (user_id, minutes) in ranked {
            if let Some(profile) = self.identity.get_basic_profile(&user_id).await? {
                items.push(RankingItem {
                    user_id,
                    minutes,
                    nickname: profile.nickname,
                    avatar_url: profile.avatar_url,
                });
            }
        }
        Ok(items)
    }
}

fn check_limit(limit: usize) -> StudyResult<()> {
    if limit == 0 {
        return Err(StudyError::InvalidInput("limit must be at least 1".into()));
    }
    Ok(())
}
