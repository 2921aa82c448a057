use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{fs, path::Path, path::PathBuf, time::Duration};

const DEBUG_REAPER_INTERVAL_SECS: u64 = 10;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    pub database_path: PathBuf,
    /// Lifetime of a liveness marker after each start or heartbeat.
    pub liveness_ttl_secs: u64,
    pub reaper_interval_secs: u64,
    /// How far before "now" the reaper backdates the end of a dead session.
    pub reaper_grace_secs: u64,
    pub week_retention_days: u64,
    /// Total attempts for the durable part of an explicit end.
    pub end_retry_attempts: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("studytrack.sqlite3"),
            liveness_ttl_secs: 180,
            reaper_interval_secs: 300,
            reaper_grace_secs: 180,
            week_retention_days: 14,
            end_retry_attempts: 2,
        }
    }
}

impl EngineConfig {
    /// Reads `path` when it exists, then applies environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) if path.exists() => {
                let contents = fs::read_to_string(path)
                    .with_context(|| format!("Failed to read config from {}", path.display()))?;
                serde_json::from_str(&contents)
                    .with_context(|| format!("Failed to parse config at {}", path.display()))?
            }
            _ => Self::default(),
        };

        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(db_path) = lookup("STUDYTRACK_DB_PATH").filter(|v| !v.trim().is_empty()) {
            self.database_path = PathBuf::from(db_path);
        }

        let debug_mode = lookup("STUDYTRACK_DEBUG")
            .map(|value| value == "1" || value.eq_ignore_ascii_case("true"))
            .unwrap_or(false);
        if debug_mode {
            self.reaper_interval_secs = DEBUG_REAPER_INTERVAL_SECS;
        }
    }

    pub fn liveness_ttl(&self) -> Duration {
        Duration::from_secs(self.liveness_ttl_secs)
    }

    pub fn reaper_interval(&self) -> Duration {
        Duration::from_secs(self.reaper_interval_secs.max(1))
    }

    pub fn reaper_grace(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.reaper_grace_secs as i64)
    }

    pub fn week_retention(&self) -> Duration {
        Duration::from_secs(self.week_retention_days * 24 * 60 * 60)
    }

    pub fn end_attempts(&self) -> u32 {
        self.end_retry_attempts.max(1)
    }
}
