//! Daily tasks
//!
//! Progress is keyed by (user, task, day). A new day simply has no row yet,
//! which reads as [`TaskState::NotStarted`]; rows from earlier days are
//! left alone as history.

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::action::ActionKind;
use super::calendar::day_key;
use super::error::{RewardError, RewardResult};
use super::ledger::{self, Credit};
use crate::db::timestamp;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    Post,
    Reply,
    Like,
    Checkin,
    CourseTime,
}

impl TaskType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Post => "post",
            Self::Reply => "reply",
            Self::Like => "like",
            Self::Checkin => "checkin",
            Self::CourseTime => "course_time",
        }
    }

    /// Task type an action counts towards, if any.
    pub fn for_action(kind: ActionKind) -> Option<Self> {
        match kind {
            ActionKind::PostTopic => Some(Self::Post),
            ActionKind::Reply => Some(Self::Reply),
            ActionKind::GiveLike => Some(Self::Like),
            ActionKind::DailyCheckin => Some(Self::Checkin),
            ActionKind::CourseTime => Some(Self::CourseTime),
            ActionKind::GiveFavorite | ActionKind::ReceiveLike | ActionKind::ReceiveFavorite => {
                None
            }
        }
    }
}

impl FromStr for TaskType {
    type Err = RewardError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "post" => Ok(Self::Post),
            "reply" => Ok(Self::Reply),
            "like" => Ok(Self::Like),
            "checkin" => Ok(Self::Checkin),
            "course_time" => Ok(Self::CourseTime),
            other => Err(RewardError::UnknownTaskType(other.to_string())),
        }
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DailyTask {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub task_type: TaskType,
    pub target: i64,
    pub points: i64,
    pub experience: i64,
    pub display_order: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "progress", rename_all = "snake_case")]
pub enum TaskState {
    NotStarted,
    InProgress(i64),
    Completed(i64),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskStatus {
    pub task: DailyTask,
    pub state: TaskState,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub task: DailyTask,
    pub credit: Credit,
}

/// Task definitions in display order. Rows with a type this build does not
/// know are skipped.
pub fn list_tasks(conn: &Connection) -> RewardResult<Vec<DailyTask>> {
    let mut stmt = conn.prepare(
        "SELECT id, name, description, task_type, target, points, experience, display_order
         FROM daily_tasks
         ORDER BY display_order, id",
    )?;
    let rows = stmt
        .query_map([], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                [row.get::<_, i64>(4)?, row.get(5)?, row.get(6)?, row.get(7)?],
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut tasks = Vec::with_capacity(rows.len());
    for (id, name, description, raw_type, [target, points, experience, display_order]) in rows {
        match raw_type.parse::<TaskType>() {
            Ok(task_type) => tasks.push(DailyTask {
                id,
                name,
                description,
                task_type,
                target,
                points,
                experience,
                display_order,
            }),
            Err(e) => tracing::warn!(task = %name, "Skipping daily task: {}", e),
        }
    }
    Ok(tasks)
}

/// Count `quantity` towards every task of `task_type` for `day`, granting
/// the reward of each task that reaches its target.
///
/// Progress keeps counting after completion; the reward is paid only by
/// the update that flips `completed`.
pub fn advance(
    conn: &Connection,
    user_id: &str,
    task_type: TaskType,
    quantity: i64,
    day: NaiveDate,
    at: DateTime<Utc>,
) -> RewardResult<Vec<Completion>> {
    let day = day_key(day);
    let mut completions = Vec::new();

    for task in list_tasks(conn)?
        .into_iter()
        .filter(|task| task.task_type == task_type)
    {
        let progress: i64 = conn.query_row(
            "INSERT INTO daily_task_progress (user_id, task_id, day, progress)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(user_id, task_id, day) DO UPDATE SET progress = progress + excluded.progress
             RETURNING progress",
            params![user_id, task.id, day, quantity],
            |row| row.get(0),
        )?;

        if progress < task.target {
            continue;
        }

        let flipped = conn.execute(
            "UPDATE daily_task_progress SET completed = 1, completed_at = ?4
             WHERE user_id = ?1 AND task_id = ?2 AND day = ?3 AND completed = 0",
            params![user_id, task.id, day, timestamp(at)],
        )?;
        if flipped == 0 {
            continue;
        }

        tracing::info!(user_id, task = %task.name, "Daily task completed");
        let credit = ledger::credit(conn, user_id, task.points, task.experience)?;
        completions.push(Completion { task, credit });
    }

    Ok(completions)
}

pub fn state(
    conn: &Connection,
    user_id: &str,
    task_id: i64,
    day: NaiveDate,
) -> RewardResult<TaskState> {
    let row: Option<(i64, bool)> = conn
        .query_row(
            "SELECT progress, completed FROM daily_task_progress
             WHERE user_id = ?1 AND task_id = ?2 AND day = ?3",
            params![user_id, task_id, day_key(day)],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;

    Ok(match row {
        None => TaskState::NotStarted,
        Some((progress, true)) => TaskState::Completed(progress),
        Some((progress, false)) => TaskState::InProgress(progress),
    })
}

/// Every task with the user's state for `day`.
pub fn tasks_for_day(
    conn: &Connection,
    user_id: &str,
    day: NaiveDate,
) -> RewardResult<Vec<TaskStatus>> {
    list_tasks(conn)?
        .into_iter()
        .map(|task| {
            let state = state(conn, user_id, task.id, day)?;
            Ok(TaskStatus { task, state })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;

    fn setup(conn: &Connection) {
        conn.execute_batch(
            "INSERT INTO users (id, username) VALUES ('u1', 'alice');
             INSERT INTO daily_tasks (name, task_type, target, points, experience, display_order)
             VALUES ('daily_reply', 'reply', 3, 10, 20, 1),
                    ('daily_post', 'post', 1, 5, 5, 0);",
        )
        .unwrap();
    }

    fn day(n: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 7, n).unwrap()
    }

    fn reply_task_id(conn: &Connection) -> i64 {
        conn.query_row(
            "SELECT id FROM daily_tasks WHERE name = 'daily_reply'",
            [],
            |row| row.get(0),
        )
        .unwrap()
    }

    #[test]
    fn reply_task_walks_through_its_states() {
        let (pool, _tmp) = test_pool();
        let conn = pool.get().unwrap();
        setup(&conn);
        let task_id = reply_task_id(&conn);

        assert_eq!(state(&conn, "u1", task_id, day(1)).unwrap(), TaskState::NotStarted);

        let mut seen = Vec::new();
        let mut rewarded = 0;
        for _ in 0..4 {
            rewarded += advance(&conn, "u1", TaskType::Reply, 1, day(1), Utc::now())
                .unwrap()
                .len();
            seen.push(state(&conn, "u1", task_id, day(1)).unwrap());
        }

        assert_eq!(
            seen,
            vec![
                TaskState::InProgress(1),
                TaskState::InProgress(2),
                TaskState::Completed(3),
                TaskState::Completed(4),
            ]
        );
        assert_eq!(rewarded, 1);
        let snap = ledger::snapshot(&conn, "u1").unwrap();
        assert_eq!((snap.balance, snap.experience), (10, 20));
    }

    #[test]
    fn new_day_starts_fresh() {
        let (pool, _tmp) = test_pool();
        let conn = pool.get().unwrap();
        setup(&conn);
        let task_id = reply_task_id(&conn);

        advance(&conn, "u1", TaskType::Reply, 2, day(1), Utc::now()).unwrap();
        assert_eq!(state(&conn, "u1", task_id, day(2)).unwrap(), TaskState::NotStarted);

        advance(&conn, "u1", TaskType::Reply, 1, day(2), Utc::now()).unwrap();
        assert_eq!(state(&conn, "u1", task_id, day(2)).unwrap(), TaskState::InProgress(1));
        // Yesterday's row is untouched history
        assert_eq!(state(&conn, "u1", task_id, day(1)).unwrap(), TaskState::InProgress(2));
    }

    #[test]
    fn quantity_can_complete_in_one_step() {
        let (pool, _tmp) = test_pool();
        let conn = pool.get().unwrap();
        setup(&conn);

        let done = advance(&conn, "u1", TaskType::Reply, 5, day(3), Utc::now()).unwrap();
        assert_eq!(done.len(), 1);
        assert_eq!(done[0].task.name, "daily_reply");
    }

    #[test]
    fn unknown_task_types_are_skipped() {
        let (pool, _tmp) = test_pool();
        let conn = pool.get().unwrap();
        setup(&conn);
        conn.execute(
            "INSERT INTO daily_tasks (name, task_type, target) VALUES ('mystery', 'dance', 1)",
            [],
        )
        .unwrap();

        let names: Vec<String> = list_tasks(&conn).unwrap().into_iter().map(|t| t.name).collect();
        assert_eq!(names, ["daily_post", "daily_reply"]);
    }

    #[test]
    fn tasks_for_day_reports_every_task() {
        let (pool, _tmp) = test_pool();
        let conn = pool.get().unwrap();
        setup(&conn);
        advance(&conn, "u1", TaskType::Post, 1, day(4), Utc::now()).unwrap();

        let statuses = tasks_for_day(&conn, "u1", day(4)).unwrap();
        assert_eq!(statuses.len(), 2);
        assert_eq!(statuses[0].state, TaskState::Completed(1));
        assert_eq!(statuses[1].state, TaskState::NotStarted);
    }

    #[test]
    fn actions_map_to_task_types() {
        assert_eq!(TaskType::for_action(ActionKind::GiveLike), Some(TaskType::Like));
        assert_eq!(TaskType::for_action(ActionKind::ReceiveLike), None);
        assert!("dance".parse::<TaskType>().is_err());
    }
}
