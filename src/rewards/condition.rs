//! Typed unlock conditions for badges and special tags
//!
//! Conditions are validated when definitions are seeded and stored as a
//! (metric, target) column pair, so evaluation never parses free-form
//! payloads.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::error::RewardError;
use super::levels::MAX_LEVEL;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    PostCount,
    ReplyCount,
    /// Likes received
    LikeCount,
    /// Favorites received
    FavoriteCount,
    Level,
    ConsecutiveCheckin,
    CourseMinutes,
    BadgeCount,
}

impl Metric {
    pub const ALL: [Metric; 8] = [
        Self::PostCount,
        Self::ReplyCount,
        Self::LikeCount,
        Self::FavoriteCount,
        Self::Level,
        Self::ConsecutiveCheckin,
        Self::CourseMinutes,
        Self::BadgeCount,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PostCount => "post_count",
            Self::ReplyCount => "reply_count",
            Self::LikeCount => "like_count",
            Self::FavoriteCount => "favorite_count",
            Self::Level => "level",
            Self::ConsecutiveCheckin => "consecutive_checkin",
            Self::CourseMinutes => "course_minutes",
            Self::BadgeCount => "badge_count",
        }
    }
}

impl FromStr for Metric {
    type Err = RewardError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|metric| metric.as_str() == s)
            .ok_or_else(|| RewardError::InvalidDefinition(format!("unknown metric '{s}'")))
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `metric >= target`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Condition {
    #[serde(alias = "kind")]
    pub metric: Metric,
    pub target: i64,
}

impl Condition {
    pub fn new(metric: Metric, target: i64) -> Result<Self, RewardError> {
        let condition = Self { metric, target };
        condition.validate()?;
        Ok(condition)
    }

    pub fn validate(&self) -> Result<(), RewardError> {
        if self.target < 1 {
            return Err(RewardError::InvalidDefinition(format!(
                "{} target must be at least 1, got {}",
                self.metric, self.target
            )));
        }
        if self.metric == Metric::Level && self.target > i64::from(MAX_LEVEL) {
            return Err(RewardError::InvalidDefinition(format!(
                "level target {} is above the maximum level {}",
                self.target, MAX_LEVEL
            )));
        }
        Ok(())
    }

    /// Rebuild from the stored column pair.
    pub fn from_columns(metric: &str, target: i64) -> Result<Self, RewardError> {
        Self::new(metric.parse()?, target)
    }

    pub fn is_met(&self, value: i64) -> bool {
        value >= self.target
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} >= {}", self.metric, self.target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_target_is_rejected() {
        assert!(Condition::new(Metric::PostCount, 0).is_err());
    }

    #[test]
    fn level_target_is_capped() {
        assert!(Condition::new(Metric::Level, 10).is_ok());
        assert!(Condition::new(Metric::Level, i64::from(MAX_LEVEL) + 1).is_err());
    }

    #[test]
    fn from_columns_rejects_unknown_metric() {
        let err = Condition::from_columns("karma", 5).unwrap_err();
        assert!(matches!(err, RewardError::InvalidDefinition(_)));
    }

    #[test]
    fn deserializes_with_kind_alias() {
        let condition: Condition =
            serde_json::from_str(r#"{"kind":"consecutive_checkin","target":7}"#).unwrap();
        assert_eq!(condition.metric, Metric::ConsecutiveCheckin);
        assert_eq!(condition.to_string(), "consecutive_checkin >= 7");
    }

    #[test]
    fn met_at_or_above_target() {
        let condition = Condition::new(Metric::PostCount, 50).unwrap();
        assert!(!condition.is_met(49));
        assert!(condition.is_met(50));
        assert!(condition.is_met(51));
    }
}
