//! Special tags
//!
//! Admin tags are granted and revoked by hand. Tags with a condition are
//! granted by the reward engine when the condition is met and are never
//! taken away when the stat later drops. Non-permanent tags carry an
//! expiry and stop counting as active once it passes, even before
//! [`purge_expired`] removes the row.

use chrono::{DateTime, Duration, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::condition::{Condition, Metric};
use super::error::{RewardError, RewardResult};
use super::ledger::ProgressSnapshot;
use crate::db::timestamp;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TagCategory {
    Admin,
    Vip,
    Achievement,
    Special,
}

impl TagCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Vip => "vip",
            Self::Achievement => "achievement",
            Self::Special => "special",
        }
    }
}

impl FromStr for TagCategory {
    type Err = RewardError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(Self::Admin),
            "vip" => Ok(Self::Vip),
            "achievement" => Ok(Self::Achievement),
            "special" => Ok(Self::Special),
            other => Err(RewardError::InvalidDefinition(format!(
                "unknown tag category '{other}'"
            ))),
        }
    }
}

impl fmt::Display for TagCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SpecialTag {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub category: TagCategory,
    pub condition: Option<Condition>,
    pub permanent: bool,
    pub duration_days: Option<i64>,
}

impl SpecialTag {
    /// Whether the reward engine may grant this tag on its own.
    pub fn is_condition_based(&self) -> bool {
        self.category != TagCategory::Admin && self.condition.is_some()
    }

    pub fn expiry_from(&self, granted_at: DateTime<Utc>) -> Option<DateTime<Utc>> {
        if self.permanent {
            return None;
        }
        self.duration_days
            .map(|days| granted_at + Duration::days(days))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActiveTag {
    pub tag: SpecialTag,
    pub granted_at: String,
    pub expires_at: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrantOutcome {
    Granted { expires_at: Option<DateTime<Utc>> },
    AlreadyActive,
}

const TAG_COLUMNS: &str = "t.id, t.name, t.description, t.category, t.condition_metric,
    t.condition_target, t.permanent, t.duration_days";

struct TagRow {
    id: i64,
    name: String,
    description: String,
    category: String,
    metric: Option<String>,
    target: Option<i64>,
    permanent: bool,
    duration_days: Option<i64>,
}

impl TagRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            description: row.get(2)?,
            category: row.get(3)?,
            metric: row.get(4)?,
            target: row.get(5)?,
            permanent: row.get(6)?,
            duration_days: row.get(7)?,
        })
    }

    fn into_tag(self) -> RewardResult<SpecialTag> {
        let condition = match (self.metric, self.target) {
            (Some(metric), Some(target)) => Some(Condition::from_columns(&metric, target)?),
            _ => None,
        };
        Ok(SpecialTag {
            id: self.id,
            name: self.name,
            description: self.description,
            category: self.category.parse()?,
            condition,
            permanent: self.permanent,
            duration_days: self.duration_days,
        })
    }
}

pub fn list_tags(conn: &Connection) -> RewardResult<Vec<SpecialTag>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {TAG_COLUMNS} FROM special_tags t ORDER BY t.id"
    ))?;
    let rows = stmt
        .query_map([], TagRow::from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    rows.into_iter().map(TagRow::into_tag).collect()
}

pub fn find_tag(conn: &Connection, name: &str) -> RewardResult<SpecialTag> {
    let row = conn
        .query_row(
            &format!("SELECT {TAG_COLUMNS} FROM special_tags t WHERE t.name = ?1"),
            params![name],
            TagRow::from_row,
        )
        .optional()?;
    row.ok_or_else(|| RewardError::UnknownTag(name.to_string()))?
        .into_tag()
}

/// Grant `tag` to the user. An existing active grant is left alone; an
/// expired one is renewed from `at`.
pub fn grant(
    conn: &Connection,
    user_id: &str,
    tag: &SpecialTag,
    at: DateTime<Utc>,
) -> RewardResult<GrantOutcome> {
    let expires_at = tag.expiry_from(at);
    let changed = conn.execute(
        "INSERT INTO user_special_tags (user_id, tag_id, granted_at, expires_at)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(user_id, tag_id) DO UPDATE SET
           granted_at = excluded.granted_at,
           expires_at = excluded.expires_at
         WHERE user_special_tags.expires_at IS NOT NULL
           AND user_special_tags.expires_at <= excluded.granted_at",
        params![user_id, tag.id, timestamp(at), expires_at.map(timestamp)],
    )?;

    if changed == 0 {
        return Ok(GrantOutcome::AlreadyActive);
    }
    tracing::info!(user_id, tag = %tag.name, "Special tag granted");
    Ok(GrantOutcome::Granted { expires_at })
}

/// Remove a grant. Returns whether one existed.
pub fn revoke(conn: &Connection, user_id: &str, tag: &SpecialTag) -> RewardResult<bool> {
    let removed = conn.execute(
        "DELETE FROM user_special_tags WHERE user_id = ?1 AND tag_id = ?2",
        params![user_id, tag.id],
    )?;
    if removed > 0 {
        tracing::info!(user_id, tag = %tag.name, "Special tag revoked");
    }
    Ok(removed > 0)
}

pub fn is_active(
    conn: &Connection,
    user_id: &str,
    tag: &SpecialTag,
    now: DateTime<Utc>,
) -> RewardResult<bool> {
    let expires_at: Option<Option<String>> = conn
        .query_row(
            "SELECT expires_at FROM user_special_tags WHERE user_id = ?1 AND tag_id = ?2",
            params![user_id, tag.id],
            |row| row.get(0),
        )
        .optional()?;

    Ok(match expires_at {
        None => false,
        Some(_) if tag.permanent => true,
        Some(Some(expires_at)) => expires_at > timestamp(now),
        // Non-permanent grant without an expiry: treat as expired
        Some(None) => false,
    })
}

/// Tags the user currently holds, expired grants excluded.
pub fn active_tags(
    conn: &Connection,
    user_id: &str,
    now: DateTime<Utc>,
) -> RewardResult<Vec<ActiveTag>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {TAG_COLUMNS}, ut.granted_at, ut.expires_at
         FROM user_special_tags ut
         JOIN special_tags t ON t.id = ut.tag_id
         WHERE ut.user_id = ?1
           AND (t.permanent = 1 OR ut.expires_at > ?2)
         ORDER BY ut.granted_at, t.id"
    ))?;
    let rows = stmt
        .query_map(params![user_id, timestamp(now)], |row| {
            Ok((TagRow::from_row(row)?, row.get(8)?, row.get(9)?))
        })?
        .collect::<Result<Vec<(TagRow, String, Option<String>)>, _>>()?;

    rows.into_iter()
        .map(|(raw, granted_at, expires_at)| {
            Ok(ActiveTag {
                tag: raw.into_tag()?,
                granted_at,
                expires_at,
            })
        })
        .collect()
}

/// Grant condition-based tags whose metric is in `changed` and whose
/// condition `snapshot` meets.
pub fn evaluate(
    conn: &Connection,
    user_id: &str,
    changed: &[Metric],
    snapshot: &ProgressSnapshot,
    at: DateTime<Utc>,
) -> RewardResult<Vec<SpecialTag>> {
    let mut granted = Vec::new();

    for tag in list_tags(conn)? {
        let Some(condition) = tag.condition.filter(|_| tag.is_condition_based()) else {
            continue;
        };
        if !changed.contains(&condition.metric)
            || !condition.is_met(snapshot.value(condition.metric))
        {
            continue;
        }
        if let GrantOutcome::Granted { .. } = grant(conn, user_id, &tag, at)? {
            granted.push(tag);
        }
    }

    Ok(granted)
}

/// Delete expired grants of non-permanent tags.
pub fn purge_expired(conn: &Connection, now: DateTime<Utc>) -> RewardResult<usize> {
    let removed = conn.execute(
        "DELETE FROM user_special_tags
         WHERE expires_at IS NOT NULL
           AND expires_at <= ?1
           AND tag_id IN (SELECT id FROM special_tags WHERE permanent = 0)",
        params![timestamp(now)],
    )?;
    if removed > 0 {
        tracing::info!("Purged {} expired special tag grants", removed);
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;
    use chrono::TimeZone;

    fn setup(conn: &Connection) {
        conn.execute_batch(
            "INSERT INTO users (id, username) VALUES ('u1', 'alice');
             INSERT INTO special_tags (name, category, condition_metric, condition_target, permanent, duration_days)
             VALUES ('moderator', 'admin', NULL, NULL, 1, NULL),
                    ('veteran', 'achievement', 'level', 10, 1, NULL),
                    ('vip', 'vip', 'consecutive_checkin', 30, 0, 30);",
        )
        .unwrap();
    }

    fn at(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 8, day, 9, 0, 0).unwrap()
    }

    #[test]
    fn grant_is_idempotent_while_active() {
        let (pool, _tmp) = test_pool();
        let conn = pool.get().unwrap();
        setup(&conn);
        let tag = find_tag(&conn, "moderator").unwrap();

        assert_eq!(
            grant(&conn, "u1", &tag, at(1)).unwrap(),
            GrantOutcome::Granted { expires_at: None }
        );
        assert_eq!(grant(&conn, "u1", &tag, at(2)).unwrap(), GrantOutcome::AlreadyActive);
        assert!(is_active(&conn, "u1", &tag, at(20)).unwrap());
    }

    #[test]
    fn timed_tags_expire_and_can_be_renewed() {
        let (pool, _tmp) = test_pool();
        let conn = pool.get().unwrap();
        setup(&conn);
        let vip = find_tag(&conn, "vip").unwrap();

        grant(&conn, "u1", &vip, at(1)).unwrap();
        assert!(is_active(&conn, "u1", &vip, at(30)).unwrap());
        assert!(!is_active(&conn, "u1", &vip, at(31)).unwrap());
        assert!(active_tags(&conn, "u1", at(31)).unwrap().is_empty());

        // Still within the window: no second grant
        assert_eq!(grant(&conn, "u1", &vip, at(15)).unwrap(), GrantOutcome::AlreadyActive);

        let renewed = grant(&conn, "u1", &vip, at(31)).unwrap();
        assert_eq!(
            renewed,
            GrantOutcome::Granted {
                expires_at: Some(at(31) + Duration::days(30))
            }
        );
        assert!(is_active(&conn, "u1", &vip, at(31)).unwrap());
    }

    #[test]
    fn evaluation_skips_admin_tags_and_unchanged_metrics() {
        let (pool, _tmp) = test_pool();
        let conn = pool.get().unwrap();
        setup(&conn);

        let snapshot = ProgressSnapshot {
            level: 12,
            current_streak: 30,
            ..Default::default()
        };
        let granted = evaluate(&conn, "u1", &[Metric::Level], &snapshot, at(1)).unwrap();
        let names: Vec<&str> = granted.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, ["veteran"]);

        let granted =
            evaluate(&conn, "u1", &[Metric::ConsecutiveCheckin], &snapshot, at(1)).unwrap();
        assert_eq!(granted.len(), 1);
        assert_eq!(granted[0].name, "vip");
    }

    #[test]
    fn no_demotion_when_stat_drops() {
        let (pool, _tmp) = test_pool();
        let conn = pool.get().unwrap();
        setup(&conn);

        let high = ProgressSnapshot {
            level: 10,
            ..Default::default()
        };
        evaluate(&conn, "u1", &[Metric::Level], &high, at(1)).unwrap();
        let low = ProgressSnapshot {
            level: 2,
            ..Default::default()
        };
        evaluate(&conn, "u1", &[Metric::Level], &low, at(2)).unwrap();

        let veteran = find_tag(&conn, "veteran").unwrap();
        assert!(is_active(&conn, "u1", &veteran, at(3)).unwrap());
    }

    #[test]
    fn purge_removes_only_expired_timed_grants() {
        let (pool, _tmp) = test_pool();
        let conn = pool.get().unwrap();
        setup(&conn);
        grant(&conn, "u1", &find_tag(&conn, "vip").unwrap(), at(1)).unwrap();
        grant(&conn, "u1", &find_tag(&conn, "moderator").unwrap(), at(1)).unwrap();

        assert_eq!(purge_expired(&conn, at(10)).unwrap(), 0);
        assert_eq!(purge_expired(&conn, at(31)).unwrap(), 1);
        let left = active_tags(&conn, "u1", at(31)).unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].tag.name, "moderator");
    }

    #[test]
    fn revoke_and_unknown_tag() {
        let (pool, _tmp) = test_pool();
        let conn = pool.get().unwrap();
        setup(&conn);
        let moderator = find_tag(&conn, "moderator").unwrap();
        grant(&conn, "u1", &moderator, at(1)).unwrap();

        assert!(revoke(&conn, "u1", &moderator).unwrap());
        assert!(!revoke(&conn, "u1", &moderator).unwrap());
        assert!(matches!(
            find_tag(&conn, "pirate").unwrap_err(),
            RewardError::UnknownTag(_)
        ));
    }
}
