use std::{collections::HashMap, sync::Mutex, time::Duration};

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::CacheStore;
use crate::clock::{Clock, SharedClock};

#[derive(Debug, Default)]
struct SortedSet {
    /// member -> (score, first-insertion sequence)
    members: HashMap<String, (f64, u64)>,
    next_seq: u64,
}

impl SortedSet {
    fn incr(&mut self, member: &str, delta: f64) -> f64 {
        let seq = self.next_seq;
        let entry = self.members.entry(member.to_string()).or_insert_with(|| (0.0, seq));
        if entry.1 == seq {
            self.next_seq += 1;
        }
        entry.0 += delta;
        entry.0
    }

    /// Descending score; ties keep the order members first appeared in.
    fn ranked(&self) -> Vec<(String, f64)> {
        let mut ranked: Vec<(&String, &(f64, u64))> = self.members.iter().collect();
        ranked.sort_by(|a, b| {
            b.1 .0
                .total_cmp(&a.1 .0)
                .then_with(|| a.1 .1.cmp(&b.1 .1))
        });
        ranked
            .into_iter()
            .map(|(member, (score, _))| (member.clone(), *score))
            .collect()
    }
}

#[derive(Debug)]
enum Value {
    Text(String),
    Sorted(SortedSet),
}

#[derive(Debug)]
struct Entry {
    value: Value,
    expires_at: Option<DateTime<Utc>>,
}

/// In-process cache with clock-driven expiry. Expired keys are dropped
/// lazily, on the next access.
pub struct MemoryCache {
    entries: Mutex<HashMap<String, Entry>>,
    clock: SharedClock,
}

impl MemoryCache {
    pub fn new(clock: SharedClock) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            clock,
        }
    }

    fn with_entries<T>(&self, f: impl FnOnce(&mut HashMap<String, Entry>) -> Result<T>) -> Result<T> {
        let now = self.clock.now();
        let mut guard = self
            .entries
            .lock()
            .map_err(|_| anyhow!("memory cache lock poisoned"))?;
        guard.retain(|_, entry| entry.expires_at.map_or(true, |at| at > now));
        f(&mut guard)
    }

    fn deadline(&self, ttl: Duration) -> Result<DateTime<Utc>> {
        let ttl = chrono::Duration::from_std(ttl).map_err(|err| anyhow!("invalid ttl: {err}"))?;
        Ok(self.clock.now() + ttl)
    }
}

#[async_trait]
impl CacheStore for MemoryCache {
    async fn set_with_ttl(&self, key: &str, value: String, ttl: Duration) -> Result<()> {
        let expires_at = Some(self.deadline(ttl)?);
        self.with_entries(|entries| {
            entries.insert(
                key.to_string(),
                Entry {
                    value: Value::Text(value),
                    expires_at,
                },
            );
            Ok(())
        })
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        self.with_entries(|entries| match entries.get(key) {
            Some(Entry {
                value: Value::Text(text),
                ..
            }) => Ok(Some(text.clone())),
            Some(_) => bail!("key {key} does not hold a string"),
            None => Ok(None),
        })
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        self.with_entries(|entries| Ok(entries.remove(key).is_some()))
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool> {
        let expires_at = self.deadline(ttl)?;
        self.with_entries(|entries| match entries.get_mut(key) {
            Some(entry) => {
                entry.expires_at = Some(expires_at);
                Ok(true)
            }
            None => Ok(false),
        })
    }

    async fn incr_by(&self, key: &str, member: &str, delta: f64) -> Result<f64> {
        self.with_entries(|entries| {
            let entry = entries.entry(key.to_string()).or_insert_with(|| Entry {
                value: Value::Sorted(SortedSet::default()),
                expires_at: None,
            });
            match &mut entry.value {
                Value::Sorted(set) => Ok(set.incr(member, delta)),
                Value::Text(_) => bail!("key {key} does not hold a sorted set"),
            }
        })
    }

    async fn rev_range_with_scores(
        &self,
        key: &str,
        start: usize,
        stop: usize,
    ) -> Result<Vec<(String, f64)>> {
        self.with_entries(|entries| match entries.get(key) {
            Some(Entry {
                value: Value::Sorted(set),
                ..
            }) => {
                if start > stop {
                    return Ok(Vec::new());
                }
                Ok(set
                    .ranked()
                    .into_iter()
                    .skip(start)
                    .take(stop - start + 1)
                    .collect())
            }
            Some(_) => bail!("key {key} does not hold a sorted set"),
            None => Ok(Vec::new()),
        })
    }

    async fn scores(&self, key: &str, members: &[String]) -> Result<Vec<Option<f64>>> {
        self.with_entries(|entries| match entries.get(key) {
            Some(Entry {
                value: Value::Sorted(set),
                ..
            }) => Ok(members
                .iter()
                .map(|member| set.members.get(member).map(|(score, _)| *score))
                .collect()),
            Some(_) => bail!("key {key} does not hold a sorted set"),
            None => Ok(vec![None; members.len()]),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use chrono::TimeZone;
    use std::sync::Arc;

    fn cache() -> (Arc<ManualClock>, MemoryCache) {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2026, 1, 5, 12, 0, 0).unwrap(),
        ));
        let cache = MemoryCache::new(clock.clone());
        (clock, cache)
    }

    #[tokio::test]
    async fn values_expire_with_the_clock() {
        let (clock, cache) = cache();
        cache
            .set_with_ttl("k", "v".into(), Duration::from_secs(180))
            .await
            .unwrap();

        clock.advance(chrono::Duration::seconds(179));
        assert_eq!(cache.get("k").await.unwrap(), Some("v".into()));

        clock.advance(chrono::Duration::seconds(1));
        assert_eq!(cache.get("k").await.unwrap(), None);
        assert!(!cache.delete("k").await.unwrap());
    }

    #[tokio::test]
    async fn expire_refreshes_deadline() {
        let (clock, cache) = cache();
        cache
            .set_with_ttl("k", "v".into(), Duration::from_secs(60))
            .await
            .unwrap();
        clock.advance(chrono::Duration::seconds(50));
        assert!(cache.expire("k", Duration::from_secs(60)).await.unwrap());
        clock.advance(chrono::Duration::seconds(50));
        assert!(cache.get("k").await.unwrap().is_some());
        assert!(!cache.expire("missing", Duration::from_secs(60)).await.unwrap());
    }

    #[tokio::test]
    async fn ranking_ties_keep_insertion_order() {
        let (_clock, cache) = cache();
        cache.incr_by("z", "carol", 10.0).await.unwrap();
        cache.incr_by("z", "alice", 30.0).await.unwrap();
        cache.incr_by("z", "bob", 10.0).await.unwrap();
        assert_eq!(cache.incr_by("z", "carol", 5.0).await.unwrap(), 15.0);

        let top = cache.rev_range_with_scores("z", 0, 9).await.unwrap();
        assert_eq!(
            top,
            vec![
                ("alice".to_string(), 30.0),
                ("carol".to_string(), 15.0),
                ("bob".to_string(), 10.0),
            ]
        );

        let second = cache.rev_range_with_scores("z", 1, 1).await.unwrap();
        assert_eq!(second, vec![("carol".to_string(), 15.0)]);
    }

    #[tokio::test]
    async fn scores_report_absent_members() {
        let (_clock, cache) = cache();
        cache.incr_by("z", "alice", 3.0).await.unwrap();
        let scores = cache
            .scores("z", &["alice".to_string(), "nobody".to_string()])
            .await
            .unwrap();
        assert_eq!(scores, vec![Some(3.0), None]);
        assert_eq!(
            cache.scores("empty", &["alice".to_string()]).await.unwrap(),
            vec![None]
        );
    }

    #[tokio::test]
    async fn type_mismatch_is_an_error() {
        let (_clock, cache) = cache();
        cache
            .set_with_ttl("k", "v".into(), Duration::from_secs(5))
            .await
            .unwrap();
        assert!(cache.incr_by("k", "m", 1.0).await.is_err());
    }
}
