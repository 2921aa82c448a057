use std::collections::HashMap;

use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};

use super::{current_streak, level_of, longest_streak, LevelInfo};
use crate::{
    clock::{Clock, SharedClock},
    db::{DailyTotal, Database, TopicTotal},
    error::{StudyError, StudyResult},
};

/// Longest window a summary may cover, in days.
pub const MAX_RANGE_DAYS: i64 = 366;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StatsRange {
    /// The last `n` UTC days, today included.
    LastDays(u32),
    Custom { from: NaiveDate, to: NaiveDate },
}

impl Default for StatsRange {
    fn default() -> Self {
        StatsRange::LastDays(7)
    }
}

impl StatsRange {
    fn bounds(&self, today: NaiveDate) -> StudyResult<(NaiveDate, NaiveDate)> {
        let (from, to) = match *self {
            StatsRange::LastDays(0) => {
                return Err(StudyError::InvalidInput("range must cover at least one day".into()))
            }
            StatsRange::LastDays(days) => (today - Duration::days(i64::from(days) - 1), today),
            StatsRange::Custom { from, to } => (from, to),
        };
        if from > to {
            return Err(StudyError::InvalidInput(format!(
                "range start {from} is after range end {to}"
            )));
        }
        if (to - from).num_days() + 1 > MAX_RANGE_DAYS {
            return Err(StudyError::InvalidInput(format!(
                "range may cover at most {MAX_RANGE_DAYS} days"
            )));
        }
        Ok((from, to))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsSummary {
    pub from: NaiveDate,
    pub to: NaiveDate,
    pub total_minutes: i64,
    /// One entry per day in the range, zero-filled.
    pub daily: Vec<DailyTotal>,
    pub level: LevelInfo,
    pub current_streak: u32,
    pub longest_streak: u32,
    pub topics: Vec<TopicTotal>,
}

/// Read-only composition over the aggregates written by finalization.
#[derive(Clone)]
pub struct StatsService {
    db: Database,
    clock: SharedClock,
}

impl StatsService {
    pub fn new(db: Database, clock: SharedClock) -> Self {
        Self { db, clock }
    }

    pub async fn summary(&self, user_id: &str, range: StatsRange) -> StudyResult<StatsSummary> {
        let today = self.clock.today();
        let (from, to) = range.bounds(today)?;

        let recorded: HashMap<NaiveDate, i64> = self
            .db
            .daily_totals(user_id, from, to)
            .await?
            .into_iter()
            .map(|t| (t.date, t.minutes))
            .collect();

        let daily: Vec<DailyTotal> = from
            .iter_days()
            .take_while(|d| *d <= to)
            .map(|date| DailyTotal {
                date,
                minutes: recorded.get(&date).copied().unwrap_or(0),
            })
            .collect();
        let total_minutes = daily.iter().map(|d| d.minutes).sum();

        let lifetime = self.db.lifetime_minutes(user_id).await?;
        let active_dates = self.db.active_dates(user_id).await?;
        let topics = self.db.topic_totals(user_id).await?;

        Ok(StatsSummary {
            from,
            to,
            total_minutes,
            daily,
            level: level_of(lifetime),
            current_streak: current_streak(&active_dates, today),
            longest_streak: longest_streak(&active_dates),
            topics,
        })
    }
}
