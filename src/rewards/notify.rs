//! Reward notifications
//!
//! Notifications are written to the `notifications` table on the same
//! connection as the reward that produced them, so they commit or roll
//! back together with it.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};

use super::error::RewardResult;
use crate::db::timestamp;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Notification {
    LevelUp { level: u32 },
    BadgeUnlocked { badge: String },
    TaskCompleted { task: String },
    TagGranted { tag: String },
}

impl Notification {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::LevelUp { .. } => "level_up",
            Self::BadgeUnlocked { .. } => "badge_unlocked",
            Self::TaskCompleted { .. } => "task_completed",
            Self::TagGranted { .. } => "tag_granted",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoredNotification {
    pub id: String,
    pub notification: Notification,
    pub created_at: String,
    pub read: bool,
}

pub fn publish(
    conn: &Connection,
    user_id: &str,
    notification: &Notification,
    at: DateTime<Utc>,
) -> RewardResult<()> {
    let payload = serde_json::to_string(notification)?;
    conn.execute(
        "INSERT INTO notifications (id, user_id, kind, payload, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            uuid::Uuid::now_v7().to_string(),
            user_id,
            notification.kind(),
            payload,
            timestamp(at)
        ],
    )?;
    tracing::info!(user_id, kind = notification.kind(), "Notification queued");
    Ok(())
}

/// Most recent notifications first.
pub fn list_for_user(
    conn: &Connection,
    user_id: &str,
    limit: u32,
) -> RewardResult<Vec<StoredNotification>> {
    let mut stmt = conn.prepare(
        "SELECT id, payload, created_at, read_at IS NOT NULL
         FROM notifications
         WHERE user_id = ?1
         ORDER BY created_at DESC, id DESC
         LIMIT ?2",
    )?;
    let rows = stmt
        .query_map(params![user_id, limit], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, bool>(3)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut notifications = Vec::with_capacity(rows.len());
    for (id, payload, created_at, read) in rows {
        match serde_json::from_str(&payload) {
            Ok(notification) => notifications.push(StoredNotification {
                id,
                notification,
                created_at,
                read,
            }),
            Err(e) => tracing::warn!(id = %id, "Unreadable notification payload: {}", e),
        }
    }
    Ok(notifications)
}

/// Mark every unread notification as read. Returns how many changed.
pub fn mark_all_read(conn: &Connection, user_id: &str, at: DateTime<Utc>) -> RewardResult<usize> {
    let changed = conn.execute(
        "UPDATE notifications SET read_at = ?2 WHERE user_id = ?1 AND read_at IS NULL",
        params![user_id, timestamp(at)],
    )?;
    Ok(changed)
}
