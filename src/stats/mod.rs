mod leveling;
mod streak;
mod summary;

pub use leveling::{floor_xp, level_of, LevelInfo, MAX_LEVEL};
pub use streak::{current_streak, longest_streak};
pub use summary::{StatsRange, StatsService, StatsSummary, MAX_RANGE_DAYS};
