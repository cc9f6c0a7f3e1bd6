//! Reward table
//!
//! Every activity the forum reports maps to a fixed (points, experience,
//! reason) triple. The table is a `match` over a closed enum so a new
//! action cannot be added without giving it a reward.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::condition::Metric;
use super::error::RewardError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    PostTopic,
    Reply,
    GiveLike,
    GiveFavorite,
    ReceiveLike,
    ReceiveFavorite,
    DailyCheckin,
    /// Quantity is minutes studied
    CourseTime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reward {
    pub points: i64,
    pub experience: i64,
    pub reason: &'static str,
}

/// Largest quantity a single event may carry.
pub const MAX_EVENT_QUANTITY: i64 = 10_000;

impl Reward {
    /// Points and experience for `quantity` repetitions of the action.
    /// `None` when either total overflows.
    pub fn times(&self, quantity: i64) -> Option<(i64, i64)> {
        Some((
            self.points.checked_mul(quantity)?,
            self.experience.checked_mul(quantity)?,
        ))
    }
}

impl ActionKind {
    pub const ALL: [ActionKind; 8] = [
        Self::PostTopic,
        Self::Reply,
        Self::GiveLike,
        Self::GiveFavorite,
        Self::ReceiveLike,
        Self::ReceiveFavorite,
        Self::DailyCheckin,
        Self::CourseTime,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PostTopic => "post_topic",
            Self::Reply => "reply",
            Self::GiveLike => "give_like",
            Self::GiveFavorite => "give_favorite",
            Self::ReceiveLike => "receive_like",
            Self::ReceiveFavorite => "receive_favorite",
            Self::DailyCheckin => "daily_checkin",
            Self::CourseTime => "course_time",
        }
    }

    pub const fn reward(self) -> Reward {
        match self {
            Self::PostTopic => Reward {
                points: 5,
                experience: 10,
                reason: "Published a topic",
            },
            Self::Reply => Reward {
                points: 2,
                experience: 5,
                reason: "Replied to a topic",
            },
            Self::GiveLike => Reward {
                points: 1,
                experience: 1,
                reason: "Liked a post",
            },
            Self::GiveFavorite => Reward {
                points: 1,
                experience: 1,
                reason: "Favorited a post",
            },
            Self::ReceiveLike => Reward {
                points: 2,
                experience: 2,
                reason: "Received a like",
            },
            Self::ReceiveFavorite => Reward {
                points: 3,
                experience: 3,
                reason: "Received a favorite",
            },
            Self::DailyCheckin => Reward {
                points: 10,
                experience: 5,
                reason: "Daily check-in",
            },
            Self::CourseTime => Reward {
                points: 0,
                experience: 1,
                reason: "Studied a course",
            },
        }
    }

    /// Ledger counter this action moves, if any.
    pub fn metric(self) -> Option<Metric> {
        match self {
            Self::PostTopic => Some(Metric::PostCount),
            Self::Reply => Some(Metric::ReplyCount),
            Self::ReceiveLike => Some(Metric::LikeCount),
            Self::ReceiveFavorite => Some(Metric::FavoriteCount),
            Self::DailyCheckin => Some(Metric::ConsecutiveCheckin),
            Self::CourseTime => Some(Metric::CourseMinutes),
            Self::GiveLike | Self::GiveFavorite => None,
        }
    }
}

impl FromStr for ActionKind {
    type Err = RewardError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| RewardError::UnknownActionKind(s.to_string()))
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn post_topic_reward() {
        let reward = ActionKind::PostTopic.reward();
        assert_eq!(reward.points, 5);
        assert_eq!(reward.experience, 10);
        assert_eq!(reward.reason, "Published a topic");
    }

    #[test]
    fn rewards_scale_with_quantity() {
        assert_eq!(ActionKind::CourseTime.reward().times(45), Some((0, 45)));
        assert_eq!(ActionKind::ReceiveFavorite.reward().times(4), Some((12, 12)));
    }

    #[test]
    fn overflowing_quantity_has_no_reward() {
        assert_eq!(ActionKind::ReceiveFavorite.reward().times(i64::MAX / 2), None);
        assert!(ActionKind::PostTopic
            .reward()
            .times(MAX_EVENT_QUANTITY)
            .is_some());
    }

    #[test]
    fn parses_names_case_insensitively() {
        assert_eq!(
            "POST_TOPIC".parse::<ActionKind>().unwrap(),
            ActionKind::PostTopic
        );
        assert_eq!(
            "daily_checkin".parse::<ActionKind>().unwrap(),
            ActionKind::DailyCheckin
        );
    }

    #[test]
    fn unknown_action_fails_fast() {
        let err = "downvote".parse::<ActionKind>().unwrap_err();
        assert!(matches!(err, RewardError::UnknownActionKind(name) if name == "downvote"));
    }

    #[test]
    fn every_kind_round_trips_through_its_name() {
        for kind in ActionKind::ALL {
            assert_eq!(kind.as_str().parse::<ActionKind>().unwrap(), kind);
        }
    }

    #[test]
    fn giving_likes_moves_no_counter() {
        assert_eq!(ActionKind::GiveLike.metric(), None);
        assert_eq!(ActionKind::GiveFavorite.metric(), None);
        assert_eq!(ActionKind::PostTopic.metric(), Some(Metric::PostCount));
    }
}
