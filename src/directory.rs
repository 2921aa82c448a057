//! Boundaries to the account, friend-graph and topic subsystems.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::db::{BasicProfile, Database};

#[async_trait]
pub trait IdentityLookup: Send + Sync {
    /// `None` when the user no longer exists.
    async fn get_basic_profile(&self, user_id: &str) -> Result<Option<BasicProfile>>;
}

#[async_trait]
pub trait FriendGraph: Send + Sync {
    async fn list_accepted_friends(&self, user_id: &str) -> Result<Vec<String>>;
}

#[async_trait]
pub trait TopicResolver: Send + Sync {
    /// Canonical topic id for `name`; a new topic is stamped with `now`.
    async fn resolve_or_create_topic(&self, name: &str, now: DateTime<Utc>) -> Result<String>;
}

#[async_trait]
impl IdentityLookup for Database {
    async fn get_basic_profile(&self, user_id: &str) -> Result<Option<BasicProfile>> {
        self.fetch_profile(user_id).await
    }
}

#[async_trait]
impl FriendGraph for Database {
    async fn list_accepted_friends(&self, user_id: &str) -> Result<Vec<String>> {
        self.accepted_friend_ids(user_id).await
    }
}

#[async_trait]
impl TopicResolver for Database {
    async fn resolve_or_create_topic(&self, name: &str, now: DateTime<Utc>) -> Result<String> {
        self.topic_id_for_name(name, now).await
    }
}
