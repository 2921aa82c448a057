//! Minutes-to-level curve.
//!
//! Levels 0..=80 follow `minutes = 9.375 * L^2` (80 is reached at 60 000
//! minutes); past that each level costs a flat 27 000 minutes. Level 100 is
//! the cap.

use serde::{Deserialize, Serialize};

pub const MAX_LEVEL: u32 = 100;

const QUADRATIC_FACTOR: f64 = 9.375;
const QUADRATIC_LEVEL_CAP: u32 = 80;
const QUADRATIC_MINUTES_CAP: i64 = 60_000;
const LINEAR_MINUTES_PER_LEVEL: i64 = 27_000;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LevelInfo {
    pub level: u32,
    pub current_xp: i64,
    pub floor_xp: i64,
    pub next_xp: i64,
    /// Percent of the way from `floor_xp` to `next_xp`, in `[0, 100]`.
    pub progress: f64,
}

pub fn level_of(total_minutes: i64) -> LevelInfo {
    let minutes = total_minutes.max(0);

    let raw_level = if minutes <= QUADRATIC_MINUTES_CAP {
        (minutes as f64 / QUADRATIC_FACTOR).sqrt().floor() as u32
    } else {
        let extra = (minutes - QUADRATIC_MINUTES_CAP) / LINEAR_MINUTES_PER_LEVEL;
        QUADRATIC_LEVEL_CAP + u32::try_from(extra).unwrap_or(u32::MAX - QUADRATIC_LEVEL_CAP)
    };
    let level = raw_level.min(MAX_LEVEL);

    let floor = floor_xp(level);
    let next_xp = floor_xp(level + 1);

    let progress = if next_xp == floor {
        0.0
    } else {
        let pct = (minutes - floor) as f64 / (next_xp - floor) as f64 * 100.0;
        pct.clamp(0.0, 100.0)
    };

    LevelInfo {
        level,
        current_xp: minutes,
        floor_xp: floor,
        next_xp,
        progress,
    }
}

/// Minimum total minutes at which `level` is reached.
pub fn floor_xp(level: u32) -> i64 {
    if level == 0 {
        return 0;
    }
    if level <= QUADRATIC_LEVEL_CAP {
        let l = f64::from(level);
        (QUADRATIC_FACTOR * l * l).ceil() as i64
    } else {
        QUADRATIC_MINUTES_CAP + LINEAR_MINUTES_PER_LEVEL * i64::from(level - QUADRATIC_LEVEL_CAP)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_minutes_is_level_zero() {
        let info = level_of(0);
        assert_eq!(info.level, 0);
        assert_eq!(info.progress, 0.0);
        assert_eq!(info.floor_xp, 0);
        assert_eq!(info.next_xp, 10);
    }

    #[test]
    fn quadratic_regime() {
        let info = level_of(9375);
        assert_eq!(info.level, 31);
        assert_eq!(info.floor_xp, 9010);
        assert_eq!(info.next_xp, 9600);
        assert!((info.progress - 61.864).abs() < 0.01, "{}", info.progress);
    }

    #[test]
    fn regime_boundary_at_sixty_thousand() {
        let info = level_of(60_000);
        assert_eq!(info.level, 80);
        assert_eq!(info.floor_xp, 60_000);
        assert_eq!(info.next_xp, 87_000);
        assert_eq!(info.progress, 0.0);

        assert_eq!(level_of(59_999).level, 79);
        assert_eq!(level_of(87_000).level, 81);
    }

    #[test]
    fn level_is_capped_at_one_hundred() {
        let info = level_of(1_000_000);
        assert_eq!(info.level, 100);
        assert_eq!(info.floor_xp, 600_000);
        assert_eq!(info.progress, 100.0);
        assert_eq!(level_of(i64::MAX).level, 100);
    }

    #[test]
    fn negative_minutes_clamp_to_zero() {
        assert_eq!(level_of(-50), level_of(0));
    }

    #[test]
    fn floor_xp_is_monotonic() {
        for level in 0..MAX_LEVEL {
            assert!(floor_xp(level) < floor_xp(level + 1), "level {level}");
            assert_eq!(level_of(floor_xp(level)).level, level, "level {level}");
        }
    }
}
