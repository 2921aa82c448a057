//! Fast key/value and score store used for liveness markers and rankings.
//!
//! Nothing held here is authoritative: losing the cache loses heartbeats and
//! leaderboard positions, never a finalized session.

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;

mod memory;

pub use memory::MemoryCache;

#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn set_with_ttl(&self, key: &str, value: String, ttl: Duration) -> Result<()>;

    /// `None` when the key is absent or expired.
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Returns whether a live key was removed.
    async fn delete(&self, key: &str) -> Result<bool>;

    /// Resets the expiry of an existing key; `false` if the key is absent.
    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool>;

    /// Adds `delta` to `member`'s score in the sorted set `key`, creating
    /// either as needed. Returns the new score.
    async fn incr_by(&self, key: &str, member: &str, delta: f64) -> Result<f64>;

    /// Members ranked `start..=stop` by descending score.
    async fn rev_range_with_scores(
        &self,
        key: &str,
        start: usize,
        stop: usize,
    ) -> Result<Vec<(String, f64)>>;

    /// Scores for `members` in order; `None` for members not in the set.
    async fn scores(&self, key: &str, members: &[String]) -> Result<Vec<Option<f64>>>;
}

pub fn heartbeat_key(session_id: &str) -> String {
    format!("study:heartbeat:{session_id}")
}
