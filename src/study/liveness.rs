use std::{sync::Arc, time::Duration};

use anyhow::Result;
use log::warn;

use crate::{
    cache::{heartbeat_key, CacheStore},
    clock::{Clock, SharedClock},
};

/// Per-session heartbeat markers with a fixed time-to-live.
#[derive(Clone)]
pub struct LivenessTracker {
    cache: Arc<dyn CacheStore>,
    clock: SharedClock,
    ttl: Duration,
}

impl LivenessTracker {
    pub fn new(cache: Arc<dyn CacheStore>, clock: SharedClock, ttl: Duration) -> Self {
        Self { cache, clock, ttl }
    }

    /// Creates or refreshes the marker; the value is the last-seen unix time.
    pub async fn touch(&self, session_id: &str) -> Result<()> {
        let last_seen = self.clock.now().timestamp().to_string();
        self.cache
            .set_with_ttl(&heartbeat_key(session_id), last_seen, self.ttl)
            .await
    }

    /// A cache read failure counts as alive so an outage never triggers reaping.
    pub async fn is_alive(&self, session_id: &str) -> bool {
        match self.cache.get(&heartbeat_key(session_id)).await {
            Ok(marker) => marker.is_some(),
            Err(err) => {
                warn!("Liveness lookup failed for session {session_id}, assuming alive: {err:#}");
                true
            }
        }
    }

    pub async fn clear(&self, session_id: &str) -> Result<()> {
        self.cache.delete(&heartbeat_key(session_id)).await?;
        Ok(())
    }
}
