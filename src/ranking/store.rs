use std::{collections::HashMap, future::Future, sync::Arc, time::Duration};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use log::warn;
use serde::{Deserialize, Serialize};

use super::RankingScope;
use crate::cache::CacheStore;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RankingEntry {
    pub user_id: String,
    pub minutes: i64,
}

/// Score-sorted minute totals per scope, backed by the cache's sorted sets.
#[derive(Clone)]
pub struct RankingStore {
    cache: Arc<dyn CacheStore>,
    week_retention: Duration,
}

const STEP_ATTEMPTS: u32 = 2;

fn to_minutes(score: f64) -> i64 {
    score.round() as i64
}

impl RankingStore {
    pub fn new(cache: Arc<dyn CacheStore>, week_retention: Duration) -> Self {
        Self {
            cache,
            week_retention,
        }
    }

    /// Adds `minutes` to the user's score in `scope`; returns the new total.
    async fn increment(&self, scope: RankingScope, user_id: &str, minutes: i64) -> Result<i64> {
        let key = scope.cache_key();
        let score = self
            .cache
            .incr_by(&key, user_id, minutes as f64)
            .await
            .with_context(|| format!("failed to increment {key}"))?;
        Ok(to_minutes(score))
    }

    /// Restarts the retention window of a weekly scope. Lifetime never expires.
    async fn refresh_retention(&self, scope: RankingScope) -> Result<()> {
        if !scope.is_weekly() {
            return Ok(());
        }
        let key = scope.cache_key();
        self.cache
            .expire(&key, self.week_retention)
            .await
            .with_context(|| format!("failed to refresh retention of {key}"))?;
        Ok(())
    }

    /// Credits `minutes` to the lifetime scope and to the ISO week containing `at`.
    ///
    /// Each write is retried on its own, so an increment that landed is never
    /// applied twice. All steps are attempted; the first one dropped is returned.
    pub async fn record(&self, user_id: &str, minutes: i64, at: DateTime<Utc>) -> Result<()> {
        if minutes <= 0 {
            return Ok(());
        }
        let week = RankingScope::week_of(at);

        let lifetime = retry_step("lifetime increment", move || {
            self.increment(RankingScope::Lifetime, user_id, minutes)
        })
        .await;
        let weekly =
            retry_step("weekly increment", move || self.increment(week, user_id, minutes)).await;
        // Retention is only refreshed once the weekly increment has landed.
        let retention = match weekly {
            Ok(_) => {
                retry_step("weekly retention refresh", move || {
                    self.refresh_retention(week)
                })
                .await
            }
            Err(err) => Err(err),
        };

        lifetime.and(retention)
    }

    pub async fn top_n(&self, scope: RankingScope, n: usize) -> Result<Vec<RankingEntry>> {
        if n == 0 {
            return Ok(Vec::new());
        }
        let key = scope.cache_key();
        let ranked = self
            .cache
            .rev_range_with_scores(&key, 0, n - 1)
            .await
            .with_context(|| format!("failed to read {key}"))?;
        Ok(ranked
            .into_iter()
            .map(|(user_id, score)| RankingEntry {
                user_id,
                minutes: to_minutes(score),
            })
            .collect())
    }

    /// Every requested user is present in the result; unranked users score 0.
    pub async fn scores_of(
        &self,
        scope: RankingScope,
        user_ids: &[String],
    ) -> Result<HashMap<String, i64>> {
        let key = scope.cache_key();
        let scores = self
            .cache
            .scores(&key, user_ids)
            .await
            .with_context(|| format!("failed to read scores from {key}"))?;
        Ok(user_ids
            .iter()
            .cloned()
            .zip(scores.into_iter().map(|s| s.map(to_minutes).unwrap_or(0)))
            .collect())
    }
}

/// Runs one cache write, retrying it once on failure.
async fn retry_step<T, F, Fut>(step: &str, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0;
    loop {
        attempt += 1;
        match op().await {
            Err(err) if attempt < STEP_ATTEMPTS => {
                warn!("Ranking {step} failed, retrying: {err:#}");
            }
            result => return result,
        }
    }
}
