//! Applies activity events to the reward model.
//!
//! One event is one `BEGIN IMMEDIATE` transaction: ledger counters, points,
//! experience, level, badge and task grants, tag grants and their
//! notifications are committed together or not at all.

use chrono::{DateTime, Utc};
use rusqlite::{Connection, TransactionBehavior};
use serde::Serialize;

use super::achievements;
use super::action::{ActionKind, MAX_EVENT_QUANTITY};
use super::calendar::Calendar;
use super::condition::Metric;
use super::daily_tasks::{self, TaskStatus, TaskType};
use super::error::{RewardError, RewardResult};
use super::ledger::{self, Recorded};
use super::notify::{self, Notification};
use super::special_tags::{self, GrantOutcome};
use crate::state::DbPool;

/// What one event did to the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EmitOutcome {
    pub kind: ActionKind,
    pub quantity: i64,
    /// `false` when the event was a repeat check-in and nothing changed
    pub applied: bool,
    /// Totals including badge and task rewards
    pub points: i64,
    pub experience: i64,
    pub level: u32,
    pub streak: Option<i64>,
    pub badges: Vec<String>,
    pub tasks: Vec<String>,
    pub tags: Vec<String>,
    pub notifications: Vec<Notification>,
}

#[derive(Clone)]
pub struct RewardEngine {
    pool: DbPool,
    calendar: Calendar,
}

impl RewardEngine {
    pub fn new(pool: DbPool, calendar: Calendar) -> Self {
        Self { pool, calendar }
    }

    pub fn calendar(&self) -> Calendar {
        self.calendar
    }

    /// Apply one activity event in its own transaction.
    pub fn emit(
        &self,
        user_id: &str,
        kind: ActionKind,
        quantity: i64,
        at: DateTime<Utc>,
    ) -> RewardResult<EmitOutcome> {
        let mut conn = self.pool.get()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let outcome = self.apply(&tx, user_id, kind, quantity, at)?;
        tx.commit()?;
        Ok(outcome)
    }

    /// Apply one activity event on a connection whose transaction the
    /// caller controls, so the triggering write and its rewards commit
    /// together.
    pub fn apply(
        &self,
        conn: &Connection,
        user_id: &str,
        kind: ActionKind,
        quantity: i64,
        at: DateTime<Utc>,
    ) -> RewardResult<EmitOutcome> {
        if !(1..=MAX_EVENT_QUANTITY).contains(&quantity) {
            return Err(RewardError::InvalidQuantity(quantity));
        }

        let before = ledger::snapshot(conn, user_id)?;
        let day = self.calendar.day_of(at);

        let mut outcome = EmitOutcome {
            kind,
            quantity,
            applied: false,
            points: 0,
            experience: 0,
            level: before.level,
            streak: None,
            badges: Vec::new(),
            tasks: Vec::new(),
            tags: Vec::new(),
            notifications: Vec::new(),
        };

        let (credit, streak) = match ledger::record(conn, user_id, kind, quantity, day, at)? {
            Recorded::Applied { credit, streak } => (credit, streak),
            Recorded::AlreadyCheckedIn => {
                outcome.streak = Some(before.current_streak);
                return Ok(outcome);
            }
        };
        outcome.applied = true;
        outcome.streak = streak;

        let mut changed: Vec<Metric> = kind.metric().into_iter().collect();
        if credit.level_change.is_some() {
            changed.push(Metric::Level);
        }

        if let Some(task_type) = TaskType::for_action(kind) {
            for completion in daily_tasks::advance(conn, user_id, task_type, quantity, day, at)? {
                if completion.credit.level_change.is_some() {
                    changed.push(Metric::Level);
                }
                outcome.tasks.push(completion.task.name);
            }
        }

        changed.sort();
        changed.dedup();

        let badges = achievements::evaluate(conn, user_id, &changed, at)?;
        let after = ledger::snapshot(conn, user_id)?;

        // Tags also see what badge grants moved
        if after.level != before.level {
            changed.push(Metric::Level);
        }
        if !badges.is_empty() {
            changed.push(Metric::BadgeCount);
        }
        changed.sort();
        changed.dedup();
        let tags = special_tags::evaluate(conn, user_id, &changed, &after, at)?;

        outcome.badges = badges.into_iter().map(|badge| badge.name).collect();
        outcome.tags = tags.into_iter().map(|tag| tag.name).collect();
        outcome.points = after.balance - before.balance;
        outcome.experience = after.experience - before.experience;
        outcome.level = after.level;

        let mut notifications: Vec<Notification> = Vec::new();
        notifications.extend(
            outcome
                .badges
                .iter()
                .map(|badge| Notification::BadgeUnlocked {
                    badge: badge.clone(),
                }),
        );
        notifications.extend(
            outcome
                .tasks
                .iter()
                .map(|task| Notification::TaskCompleted { task: task.clone() }),
        );
        notifications.extend(
            outcome
                .tags
                .iter()
                .map(|tag| Notification::TagGranted { tag: tag.clone() }),
        );
        if after.level != before.level {
            tracing::info!(user_id, from = before.level, to = after.level, "Level changed");
            notifications.push(Notification::LevelUp { level: after.level });
        }
        for notification in &notifications {
            notify::publish(conn, user_id, notification, at)?;
        }
        outcome.notifications = notifications;

        tracing::debug!(
            user_id,
            kind = %kind,
            quantity,
            points = outcome.points,
            experience = outcome.experience,
            "Activity applied"
        );
        Ok(outcome)
    }

    /// Administrative grant of any tag, including admin tags.
    pub fn grant_tag(
        &self,
        user_id: &str,
        tag_name: &str,
        at: DateTime<Utc>,
    ) -> RewardResult<GrantOutcome> {
        let mut conn = self.pool.get()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        ledger::snapshot(&tx, user_id)?;
        let tag = special_tags::find_tag(&tx, tag_name)?;
        let outcome = special_tags::grant(&tx, user_id, &tag, at)?;
        if let GrantOutcome::Granted { .. } = outcome {
            notify::publish(&tx, user_id, &Notification::TagGranted { tag: tag.name }, at)?;
        }

        tx.commit()?;
        Ok(outcome)
    }

    pub fn revoke_tag(&self, user_id: &str, tag_name: &str) -> RewardResult<bool> {
        let conn = self.pool.get()?;
        let tag = special_tags::find_tag(&conn, tag_name)?;
        special_tags::revoke(&conn, user_id, &tag)
    }

    pub fn purge_expired_tags(&self, now: DateTime<Utc>) -> RewardResult<usize> {
        let conn = self.pool.get()?;
        special_tags::purge_expired(&conn, now)
    }

    /// Today's tasks for the user, by the engine's calendar.
    pub fn today_tasks(&self, user_id: &str) -> RewardResult<Vec<TaskStatus>> {
        let conn = self.pool.get()?;
        daily_tasks::tasks_for_day(&conn, user_id, self.calendar.today())
    }
}
