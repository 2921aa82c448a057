//! Study session rows and the typed outcomes of writes against them.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SessionKind {
    Learning,
    Rest,
}

impl SessionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionKind::Learning => "learning",
            SessionKind::Rest => "rest",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StudySession {
    pub id: String,
    pub user_id: String,
    pub kind: SessionKind,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub duration_minutes: Option<i64>,
    pub topic_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl StudySession {
    pub fn is_active(&self) -> bool {
        self.ended_at.is_none()
    }

    /// UTC calendar date the session's minutes are attributed to.
    pub fn attributed_date(&self) -> NaiveDate {
        self.started_at.date_naive()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    /// The user already owns an open session.
    ActiveExists,
    /// `topic_id` does not name a known topic.
    UnknownTopic,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FinalizeOutcome {
    Finalized(StudySession),
    /// Another writer set the end timestamp first.
    AlreadyEnded,
    /// The row is gone, e.g. cancelled while the finalizer was running.
    Missing,
}

pub const DEFAULT_PAGE_SIZE: u32 = 20;
pub const MAX_PAGE_SIZE: u32 = 100;

/// Filters for the session history listing. Dates are inclusive UTC days.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionFilter {
    pub kind: Option<SessionKind>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub page: Option<u32>,
    pub page_size: Option<u32>,
}

impl SessionFilter {
    /// 1-based page, defaulting to the first.
    pub fn effective_page(&self) -> u32 {
        self.page.unwrap_or(1).max(1)
    }

    pub fn effective_page_size(&self) -> u32 {
        self.page_size
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .clamp(1, MAX_PAGE_SIZE)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionPage {
    pub items: Vec<StudySession>,
    pub total: u64,
    pub page: u32,
    pub page_size: u32,
}
