//! Experience and level table
//!
//! Level `L` needs `50 * L * (L - 1)` experience: 100 for level 2, 4500
//! for level 10. The table is fixed at compile time and capped at
//! [`MAX_LEVEL`].

use serde::Serialize;

pub const MAX_LEVEL: u32 = 30;

const fn threshold(level: u32) -> i64 {
    let l = level as i64;
    50 * l * (l - 1)
}

const fn build_thresholds() -> [i64; MAX_LEVEL as usize] {
    let mut table = [0; MAX_LEVEL as usize];
    let mut i = 0;
    while i < MAX_LEVEL as usize {
        table[i] = threshold(i as u32 + 1);
        i += 1;
    }
    table
}

/// Experience required for each level, index 0 being level 1.
pub static LEVEL_THRESHOLDS: [i64; MAX_LEVEL as usize] = build_thresholds();

/// Level for a given amount of experience. Never below 1.
pub fn level_for(experience: i64) -> u32 {
    LEVEL_THRESHOLDS
        .iter()
        .rposition(|&required| experience >= required)
        .map_or(1, |idx| idx as u32 + 1)
}

/// Experience needed to reach `level`, or `None` past the cap.
pub fn experience_for(level: u32) -> Option<i64> {
    if level == 0 {
        return None;
    }
    LEVEL_THRESHOLDS.get(level as usize - 1).copied()
}

pub fn title_for(level: u32) -> &'static str {
    match level {
        0..=4 => "Newcomer",
        5..=9 => "Regular",
        10..=19 => "Veteran",
        20..=29 => "Elder",
        _ => "Legend",
    }
}

/// Where a user stands between two levels.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LevelProgress {
    pub level: u32,
    pub title: &'static str,
    pub experience: i64,
    pub current_level_experience: i64,
    /// `None` at the maximum level
    pub next_level_experience: Option<i64>,
}

impl LevelProgress {
    pub fn for_experience(experience: i64) -> Self {
        let level = level_for(experience);
        Self {
            level,
            title: title_for(level),
            experience,
            current_level_experience: experience_for(level).unwrap_or(0),
            next_level_experience: experience_for(level + 1),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LevelChange {
    pub from: u32,
    pub to: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thresholds_start_at_zero_and_ascend() {
        assert_eq!(LEVEL_THRESHOLDS[0], 0);
        assert!(LEVEL_THRESHOLDS.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn level_ten_needs_4500() {
        assert_eq!(experience_for(10), Some(4500));
        assert_eq!(level_for(4499), 9);
        assert_eq!(level_for(4500), 10);
    }

    #[test]
    fn boundaries() {
        assert_eq!(level_for(0), 1);
        assert_eq!(level_for(-10), 1);
        assert_eq!(level_for(99), 1);
        assert_eq!(level_for(100), 2);
        assert_eq!(level_for(300), 3);
        assert_eq!(level_for(i64::MAX), MAX_LEVEL);
    }

    #[test]
    fn level_never_drops_as_experience_grows() {
        let mut experience = 0;
        let mut last = level_for(experience);
        for step in [1, 7, 30, 99, 250, 1000, 3, 4000, 12_000] {
            experience += step;
            let level = level_for(experience);
            assert!(level >= last);
            assert!(experience >= experience_for(level).unwrap());
            if let Some(next) = experience_for(level + 1) {
                assert!(experience < next);
            }
            last = level;
        }
    }

    #[test]
    fn progress_at_cap_has_no_next_level() {
        let progress = LevelProgress::for_experience(i64::MAX / 2);
        assert_eq!(progress.level, MAX_LEVEL);
        assert_eq!(progress.next_level_experience, None);
        assert_eq!(progress.title, "Legend");
    }

    #[test]
    fn progress_mid_level() {
        let progress = LevelProgress::for_experience(850);
        assert_eq!(progress.level, 4);
        assert_eq!(progress.current_level_experience, 600);
        assert_eq!(progress.next_level_experience, Some(1000));
    }
}
