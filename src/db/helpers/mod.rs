use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};

use crate::db::models::{FriendStatus, SessionKind};

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Fixed-width RFC 3339 so stored timestamps sort lexicographically.
pub fn format_datetime(value: &DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn parse_datetime(value: &str, field: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .with_context(|| format!("failed to parse {field}"))
}

pub fn parse_optional_datetime(
    value: Option<String>,
    field: &str,
) -> Result<Option<DateTime<Utc>>> {
    match value {
        Some(raw) => parse_datetime(&raw, field).map(Some),
        None => Ok(None),
    }
}

pub fn format_date(value: &NaiveDate) -> String {
    value.format(DATE_FORMAT).to_string()
}

pub fn parse_date(value: &str, field: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value, DATE_FORMAT).with_context(|| format!("failed to parse {field}"))
}

/// Midnight UTC at the start of `date`, formatted for comparison with stored timestamps.
pub fn start_of_day(date: &NaiveDate) -> String {
    format_datetime(&date.and_time(chrono::NaiveTime::MIN).and_utc())
}

pub fn parse_kind(value: &str) -> Result<SessionKind> {
    match value {
        "learning" => Ok(SessionKind::Learning),
        "rest" => Ok(SessionKind::Rest),
        other => Err(anyhow!("unknown session kind {other}")),
    }
}

pub fn parse_friend_status(value: &str) -> Result<FriendStatus> {
    match value {
        "pending" => Ok(FriendStatus::Pending),
        "accepted" => Ok(FriendStatus::Accepted),
        other => Err(anyhow!("unknown friendship status {other}")),
    }
}

fn constraint_kind(err: &rusqlite::Error) -> Option<i32> {
    match err {
        rusqlite::Error::SqliteFailure(inner, _)
            if inner.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            Some(inner.extended_code)
        }
        _ => None,
    }
}

pub fn is_unique_violation(err: &rusqlite::Error) -> bool {
    constraint_kind(err) == Some(rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE)
}

pub fn is_foreign_key_violation(err: &rusqlite::Error) -> bool {
    constraint_kind(err) == Some(rusqlite::ffi::SQLITE_CONSTRAINT_FOREIGNKEY)
}
