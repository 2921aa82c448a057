use std::{fmt, str::FromStr};

use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StudyError;

/// A named ranking window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RankingScope {
    Lifetime,
    Week { year: i32, week: u32 },
}

impl RankingScope {
    /// The ISO week containing `at`.
    pub fn week_of(at: DateTime<Utc>) -> Self {
        let iso = at.iso_week();
        RankingScope::Week {
            year: iso.year(),
            week: iso.week(),
        }
    }

    pub fn is_weekly(&self) -> bool {
        matches!(self, RankingScope::Week { .. })
    }

    pub fn cache_key(&self) -> String {
        format!("ranking:{self}")
    }
}

impl fmt::Display for RankingScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RankingScope::Lifetime => write!(f, "lifetime"),
            RankingScope::Week { year, week } => write!(f, "week:{year}-{week}"),
        }
    }
}

impl FromStr for RankingScope {
    type Err = StudyError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        if value == "lifetime" {
            return Ok(RankingScope::Lifetime);
        }
        let invalid = || StudyError::InvalidInput(format!("unknown ranking scope {value}"));
        let rest = value.strip_prefix("week:").ok_or_else(invalid)?;
        let (year, week) = rest.split_once('-').ok_or_else(invalid)?;
        let year: i32 = year.parse().map_err(|_| invalid())?;
        let week: u32 = week.parse().map_err(|_| invalid())?;
        if !(1..=53).contains(&week) {
            return Err(invalid());
        }
        Ok(RankingScope::Week { year, week })
    }
}

/// The window a caller asks for, resolved to a concrete scope at read time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScopeKind {
    Lifetime,
    Week,
}

impl ScopeKind {
    pub fn resolve(&self, now: DateTime<Utc>) -> RankingScope {
        match self {
            ScopeKind::Lifetime => RankingScope::Lifetime,
            ScopeKind::Week => RankingScope::week_of(now),
        }
    }
}

impl FromStr for ScopeKind {
    type Err = StudyError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "lifetime" | "total" => Ok(ScopeKind::Lifetime),
            "week" => Ok(ScopeKind::Week),
            other => Err(StudyError::InvalidInput(format!(
                "unknown ranking scope {other}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn week_scope_uses_iso_year() {
        // 2027-01-01 is a Friday, still in ISO week 53 of 2026.
        let at = Utc.with_ymd_and_hms(2027, 1, 1, 12, 0, 0).unwrap();
        let scope = RankingScope::week_of(at);
        assert_eq!(scope, RankingScope::Week { year: 2026, week: 53 });
        assert_eq!(scope.to_string(), "week:2026-53");
        assert_eq!(scope.cache_key(), "ranking:week:2026-53");
    }

    #[test]
    fn scopes_parse_from_display_form() {
        assert_eq!("lifetime".parse::<RankingScope>().unwrap(), RankingScope::Lifetime);
        assert_eq!(
            "week:2026-7".parse::<RankingScope>().unwrap(),
            RankingScope::Week { year: 2026, week: 7 }
        );
        assert!("week:2026-60".parse::<RankingScope>().is_err());
        assert!("month".parse::<RankingScope>().is_err());
    }

    #[test]
    fn kind_accepts_total_alias() {
        assert_eq!("total".parse::<ScopeKind>().unwrap(), ScopeKind::Lifetime);
        assert_eq!(" Week ".parse::<ScopeKind>().unwrap(), ScopeKind::Week);
        assert!("daily".parse::<ScopeKind>().is_err());
    }
}
