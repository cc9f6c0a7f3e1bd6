//! Progress ledger
//!
//! Per-user counters that feed badge, task and tag evaluation. Each
//! `record_*` call bumps its counter and credits the action's reward on the
//! connection it is given; the caller owns the transaction, so both land
//! or neither does.

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;

use super::action::ActionKind;
use super::calendar::{day_key, parse_day_key};
use super::condition::Metric;
use super::error::{RewardError, RewardResult};
use super::levels::{level_for, LevelChange};
use crate::db::timestamp;

/// Counters and derived values for one user at one moment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProgressSnapshot {
    pub balance: i64,
    pub experience: i64,
    pub level: u32,
    pub post_count: i64,
    pub reply_count: i64,
    pub like_count: i64,
    pub favorite_count: i64,
    pub course_minutes: i64,
    pub current_streak: i64,
    pub best_streak: i64,
    pub checkin_total: i64,
    pub last_checkin_day: Option<NaiveDate>,
    pub badge_count: i64,
}

impl ProgressSnapshot {
    pub fn value(&self, metric: Metric) -> i64 {
        match metric {
            Metric::PostCount => self.post_count,
            Metric::ReplyCount => self.reply_count,
            Metric::LikeCount => self.like_count,
            Metric::FavoriteCount => self.favorite_count,
            Metric::Level => i64::from(self.level),
            Metric::ConsecutiveCheckin => self.current_streak,
            Metric::CourseMinutes => self.course_minutes,
            Metric::BadgeCount => self.badge_count,
        }
    }
}

/// Result of crediting points and experience to a user.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Credit {
    pub points: i64,
    pub experience: i64,
    pub level_change: Option<LevelChange>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recorded {
    Applied { credit: Credit, streak: Option<i64> },
    /// The user already checked in on that day (or a later one)
    AlreadyCheckedIn,
}

/// Load the user's counters. Read-only: a user with no progress row yet
/// reads as all zeros.
pub fn snapshot(conn: &Connection, user_id: &str) -> RewardResult<ProgressSnapshot> {
    let snapshot = conn
        .query_row(
            "SELECT u.balance, u.experience, u.level,
                    COALESCE(p.post_count, 0), COALESCE(p.reply_count, 0),
                    COALESCE(p.like_count, 0), COALESCE(p.favorite_count, 0),
                    COALESCE(p.course_minutes, 0), COALESCE(p.current_streak, 0),
                    COALESCE(p.best_streak, 0), COALESCE(p.checkin_total, 0),
                    p.last_checkin_day,
                    (SELECT COUNT(*) FROM user_badges b WHERE b.user_id = u.id)
             FROM users u
             LEFT JOIN user_progress p ON p.user_id = u.id
             WHERE u.id = ?1",
            params![user_id],
            |row| {
                let last_day: Option<String> = row.get(11)?;
                Ok(ProgressSnapshot {
                    balance: row.get(0)?,
                    experience: row.get(1)?,
                    level: row.get(2)?,
                    post_count: row.get(3)?,
                    reply_count: row.get(4)?,
                    like_count: row.get(5)?,
                    favorite_count: row.get(6)?,
                    course_minutes: row.get(7)?,
                    current_streak: row.get(8)?,
                    best_streak: row.get(9)?,
                    checkin_total: row.get(10)?,
                    last_checkin_day: last_day.as_deref().and_then(parse_day_key),
                    badge_count: row.get(12)?,
                })
            },
        )
        .optional()?;

    snapshot.ok_or_else(|| RewardError::UserNotFound(user_id.to_string()))
}

fn ensure_progress_row(conn: &Connection, user_id: &str) -> RewardResult<()> {
    let exists: bool = conn.query_row(
        "SELECT COUNT(*) > 0 FROM users WHERE id = ?1",
        params![user_id],
        |row| row.get(0),
    )?;
    if !exists {
        return Err(RewardError::UserNotFound(user_id.to_string()));
    }

    conn.execute(
        "INSERT OR IGNORE INTO user_progress (user_id) VALUES (?1)",
        params![user_id],
    )?;
    Ok(())
}

/// Add points and experience, keeping `level` in step with experience.
pub fn credit(
    conn: &Connection,
    user_id: &str,
    points: i64,
    experience: i64,
) -> RewardResult<Credit> {
    let updated: Option<(i64, u32)> = conn
        .query_row(
            "UPDATE users SET balance = balance + ?2, experience = experience + ?3
             WHERE id = ?1
             RETURNING experience, level",
            params![user_id, points, experience],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;

    let (total_experience, stored_level) =
        updated.ok_or_else(|| RewardError::UserNotFound(user_id.to_string()))?;

    let level = level_for(total_experience);
    let level_change = if level != stored_level {
        conn.execute(
            "UPDATE users SET level = ?2 WHERE id = ?1",
            params![user_id, level],
        )?;
        Some(LevelChange {
            from: stored_level,
            to: level,
        })
    } else {
        None
    };

    Ok(Credit {
        points,
        experience,
        level_change,
    })
}

/// Append the audit row and credit the action's reward.
fn apply_reward(
    conn: &Connection,
    user_id: &str,
    kind: ActionKind,
    quantity: i64,
    at: DateTime<Utc>,
) -> RewardResult<Credit> {
    let reward = kind.reward();
    let (points, experience) = reward
        .times(quantity)
        .ok_or(RewardError::InvalidQuantity(quantity))?;

    conn.execute(
        "INSERT INTO reward_events (id, user_id, kind, quantity, points, experience, reason, occurred_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            uuid::Uuid::now_v7().to_string(),
            user_id,
            kind.as_str(),
            quantity,
            points,
            experience,
            reward.reason,
            timestamp(at)
        ],
    )?;

    credit(conn, user_id, points, experience)
}

fn bump(conn: &Connection, user_id: &str, metric: Metric, quantity: i64) -> RewardResult<()> {
    let sql = match metric {
        Metric::PostCount => "UPDATE user_progress SET post_count = post_count + ?2 WHERE user_id = ?1",
        Metric::ReplyCount => "UPDATE user_progress SET reply_count = reply_count + ?2 WHERE user_id = ?1",
        Metric::LikeCount => "UPDATE user_progress SET like_count = like_count + ?2 WHERE user_id = ?1",
        Metric::FavoriteCount => {
            "UPDATE user_progress SET favorite_count = favorite_count + ?2 WHERE user_id = ?1"
        }
        Metric::CourseMinutes => {
            "UPDATE user_progress SET course_minutes = course_minutes + ?2 WHERE user_id = ?1"
        }
        Metric::Level | Metric::ConsecutiveCheckin | Metric::BadgeCount => {
            return Err(RewardError::InvalidDefinition(format!(
                "{metric} is not a plain counter"
            )))
        }
    };

    ensure_progress_row(conn, user_id)?;
    conn.execute(sql, params![user_id, quantity])?;
    Ok(())
}

fn record_counter(
    conn: &Connection,
    user_id: &str,
    kind: ActionKind,
    metric: Metric,
    quantity: i64,
    at: DateTime<Utc>,
) -> RewardResult<Credit> {
    bump(conn, user_id, metric, quantity)?;
    apply_reward(conn, user_id, kind, quantity, at)
}

pub fn record_post(
    conn: &Connection,
    user_id: &str,
    quantity: i64,
    at: DateTime<Utc>,
) -> RewardResult<Credit> {
    record_counter(conn, user_id, ActionKind::PostTopic, Metric::PostCount, quantity, at)
}

pub fn record_reply(
    conn: &Connection,
    user_id: &str,
    quantity: i64,
    at: DateTime<Utc>,
) -> RewardResult<Credit> {
    record_counter(conn, user_id, ActionKind::Reply, Metric::ReplyCount, quantity, at)
}

pub fn record_like_received(
    conn: &Connection,
    user_id: &str,
    quantity: i64,
    at: DateTime<Utc>,
) -> RewardResult<Credit> {
    record_counter(conn, user_id, ActionKind::ReceiveLike, Metric::LikeCount, quantity, at)
}

pub fn record_favorite_received(
    conn: &Connection,
    user_id: &str,
    quantity: i64,
    at: DateTime<Utc>,
) -> RewardResult<Credit> {
    record_counter(
        conn,
        user_id,
        ActionKind::ReceiveFavorite,
        Metric::FavoriteCount,
        quantity,
        at,
    )
}

pub fn record_course_time(
    conn: &Connection,
    user_id: &str,
    minutes: i64,
    at: DateTime<Utc>,
) -> RewardResult<Credit> {
    record_counter(conn, user_id, ActionKind::CourseTime, Metric::CourseMinutes, minutes, at)
}

/// Check in for `day`, extending the streak when the previous check-in
/// was the day before and restarting it at 1 otherwise.
pub fn record_checkin(
    conn: &Connection,
    user_id: &str,
    day: NaiveDate,
    at: DateTime<Utc>,
) -> RewardResult<Recorded> {
    ensure_progress_row(conn, user_id)?;

    let (current, last_day): (i64, Option<String>) = conn.query_row(
        "SELECT current_streak, last_checkin_day FROM user_progress WHERE user_id = ?1",
        params![user_id],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )?;
    let last_day = last_day.as_deref().and_then(parse_day_key);

    if last_day.is_some_and(|last| last >= day) {
        tracing::debug!(user_id, %day, "Already checked in");
        return Ok(Recorded::AlreadyCheckedIn);
    }

    let streak = match last_day {
        Some(last) if last.succ_opt() == Some(day) => current + 1,
        _ => 1,
    };

    // The primary key on (user_id, day) decides concurrent attempts
    let inserted = conn.execute(
        "INSERT OR IGNORE INTO checkins (user_id, day, streak, created_at) VALUES (?1, ?2, ?3, ?4)",
        params![user_id, day_key(day), streak, timestamp(at)],
    )?;
    if inserted == 0 {
        return Ok(Recorded::AlreadyCheckedIn);
    }

    conn.execute(
        "UPDATE user_progress
         SET current_streak = ?2,
             best_streak = MAX(best_streak, ?2),
             checkin_total = checkin_total + 1,
             last_checkin_day = ?3
         WHERE user_id = ?1",
        params![user_id, streak, day_key(day)],
    )?;

    let credit = apply_reward(conn, user_id, ActionKind::DailyCheckin, 1, at)?;
    Ok(Recorded::Applied {
        credit,
        streak: Some(streak),
    })
}

/// Record any action. Check-ins ignore `quantity`.
pub fn record(
    conn: &Connection,
    user_id: &str,
    kind: ActionKind,
    quantity: i64,
    day: NaiveDate,
    at: DateTime<Utc>,
) -> RewardResult<Recorded> {
    let credit = match kind {
        ActionKind::PostTopic => record_post(conn, user_id, quantity, at)?,
        ActionKind::Reply => record_reply(conn, user_id, quantity, at)?,
        ActionKind::ReceiveLike => record_like_received(conn, user_id, quantity, at)?,
        ActionKind::ReceiveFavorite => record_favorite_received(conn, user_id, quantity, at)?,
        ActionKind::CourseTime => record_course_time(conn, user_id, quantity, at)?,
        ActionKind::GiveLike | ActionKind::GiveFavorite => {
            ensure_progress_row(conn, user_id)?;
            apply_reward(conn, user_id, kind, quantity, at)?
        }
        ActionKind::DailyCheckin => return record_checkin(conn, user_id, day, at),
    };

    Ok(Recorded::Applied {
        credit,
        streak: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;
    use chrono::{Duration, TimeZone};

    fn insert_user(conn: &Connection, id: &str) {
        conn.execute(
            "INSERT INTO users (id, username) VALUES (?1, ?1)",
            params![id],
        )
        .unwrap();
    }

    fn day(n: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 5, n).unwrap()
    }

    fn noon(day: NaiveDate) -> DateTime<Utc> {
        Utc.from_utc_datetime(&day.and_hms_opt(12, 0, 0).unwrap())
    }

    #[test]
    fn record_post_bumps_counter_and_credits_reward() {
        let (pool, _tmp) = test_pool();
        let conn = pool.get().unwrap();
        insert_user(&conn, "alice");

        let credit = record_post(&conn, "alice", 3, Utc::now()).unwrap();
        assert_eq!(credit.points, 15);
        assert_eq!(credit.experience, 30);

        let snap = snapshot(&conn, "alice").unwrap();
        assert_eq!(snap.post_count, 3);
        assert_eq!(snap.balance, 15);
        assert_eq!(snap.experience, 30);
        assert_eq!(snap.level, 1);

        let events: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM reward_events WHERE user_id = 'alice' AND kind = 'post_topic'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(events, 1);
    }

    #[test]
    fn credit_keeps_level_in_step() {
        let (pool, _tmp) = test_pool();
        let conn = pool.get().unwrap();
        insert_user(&conn, "bob");

        let credit = credit(&conn, "bob", 0, 300).unwrap();
        assert_eq!(credit.level_change, Some(LevelChange { from: 1, to: 3 }));

        let again = super::credit(&conn, "bob", 0, 1).unwrap();
        assert_eq!(again.level_change, None);
        assert_eq!(snapshot(&conn, "bob").unwrap().level, 3);
    }

    #[test]
    fn unknown_user_is_reported() {
        let (pool, _tmp) = test_pool();
        let conn = pool.get().unwrap();
        let err = record_reply(&conn, "ghost", 1, Utc::now()).unwrap_err();
        assert!(matches!(err, RewardError::UserNotFound(id) if id == "ghost"));
    }

    #[test]
    fn streak_resets_after_a_gap() {
        let (pool, _tmp) = test_pool();
        let conn = pool.get().unwrap();
        insert_user(&conn, "carol");

        let mut streaks = Vec::new();
        for d in [1, 2, 3, 5] {
            match record_checkin(&conn, "carol", day(d), noon(day(d))).unwrap() {
                Recorded::Applied { streak, .. } => streaks.push(streak.unwrap()),
                Recorded::AlreadyCheckedIn => panic!("day {d} should check in"),
            }
        }
        assert_eq!(streaks, vec![1, 2, 3, 1]);

        let snap = snapshot(&conn, "carol").unwrap();
        assert_eq!(snap.best_streak, 3);
        assert_eq!(snap.checkin_total, 4);
        assert_eq!(snap.last_checkin_day, Some(day(5)));
    }

    #[test]
    fn second_checkin_same_day_is_a_no_op() {
        let (pool, _tmp) = test_pool();
        let conn = pool.get().unwrap();
        insert_user(&conn, "dave");

        let at = noon(day(10));
        assert!(matches!(
            record_checkin(&conn, "dave", day(10), at).unwrap(),
            Recorded::Applied { .. }
        ));
        assert_eq!(
            record_checkin(&conn, "dave", day(10), at + Duration::hours(3)).unwrap(),
            Recorded::AlreadyCheckedIn
        );
        // An older day after a newer one is stale
        assert_eq!(
            record_checkin(&conn, "dave", day(9), at).unwrap(),
            Recorded::AlreadyCheckedIn
        );

        let snap = snapshot(&conn, "dave").unwrap();
        assert_eq!(snap.checkin_total, 1);
        assert_eq!(snap.balance, ActionKind::DailyCheckin.reward().points);
    }

    #[test]
    fn snapshot_does_not_write() {
        let (pool, _tmp) = test_pool();
        let conn = pool.get().unwrap();
        insert_user(&conn, "fay");

        let snap = snapshot(&conn, "fay").unwrap();
        assert_eq!(snap, ProgressSnapshot { level: 1, ..Default::default() });

        let rows: i64 = conn
            .query_row("SELECT COUNT(*) FROM user_progress WHERE user_id = 'fay'", [], |row| {
                row.get(0)
            })
            .unwrap();
        assert_eq!(rows, 0);
    }

    #[test]
    fn overflowing_reward_is_rejected_without_crediting() {
        let (pool, _tmp) = test_pool();
        let conn = pool.get().unwrap();
        insert_user(&conn, "gus");

        let err = record_favorite_received(&conn, "gus", i64::MAX / 2, Utc::now()).unwrap_err();
        assert!(matches!(err, RewardError::InvalidQuantity(_)));
        assert_eq!(snapshot(&conn, "gus").unwrap().balance, 0);
    }

    #[test]
    fn giving_a_like_only_credits() {
        let (pool, _tmp) = test_pool();
        let conn = pool.get().unwrap();
        insert_user(&conn, "erin");

        record(&conn, "erin", ActionKind::GiveLike, 2, day(1), Utc::now()).unwrap();
        let snap = snapshot(&conn, "erin").unwrap();
        assert_eq!(snap.like_count, 0);
        assert_eq!(snap.balance, 2);
    }
}
