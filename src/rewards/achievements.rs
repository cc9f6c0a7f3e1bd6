//! Badge definitions and unlocking

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::condition::{Condition, Metric};
use super::error::{RewardError, RewardResult};
use super::ledger;
use crate::db::timestamp;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rarity {
    Common,
    Rare,
    Epic,
    Legendary,
}

impl Rarity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Common => "common",
            Self::Rare => "rare",
            Self::Epic => "epic",
            Self::Legendary => "legendary",
        }
    }
}

impl FromStr for Rarity {
    type Err = RewardError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "common" => Ok(Self::Common),
            "rare" => Ok(Self::Rare),
            "epic" => Ok(Self::Epic),
            "legendary" => Ok(Self::Legendary),
            other => Err(RewardError::InvalidDefinition(format!(
                "unknown rarity '{other}'"
            ))),
        }
    }
}

impl fmt::Display for Rarity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Badge {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub rarity: Rarity,
    pub condition: Condition,
    pub points: i64,
    pub experience: i64,
    pub display_order: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnlockedBadge {
    pub badge: Badge,
    pub unlocked_at: String,
}

const BADGE_COLUMNS: &str = "b.id, b.name, b.description, b.rarity, b.condition_metric,
    b.condition_target, b.points, b.experience, b.display_order";

/// Badge row with rarity and metric still as stored text.
struct BadgeRow {
    id: i64,
    name: String,
    description: String,
    rarity: String,
    metric: String,
    target: i64,
    points: i64,
    experience: i64,
    display_order: i64,
}

impl BadgeRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            description: row.get(2)?,
            rarity: row.get(3)?,
            metric: row.get(4)?,
            target: row.get(5)?,
            points: row.get(6)?,
            experience: row.get(7)?,
            display_order: row.get(8)?,
        })
    }

    fn into_badge(self) -> RewardResult<Badge> {
        Ok(Badge {
            id: self.id,
            name: self.name,
            description: self.description,
            rarity: self.rarity.parse()?,
            condition: Condition::from_columns(&self.metric, self.target)?,
            points: self.points,
            experience: self.experience,
            display_order: self.display_order,
        })
    }
}

/// All badges in evaluation order: `display_order`, then insertion order.
pub fn list_badges(conn: &Connection) -> RewardResult<Vec<Badge>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {BADGE_COLUMNS} FROM badges b ORDER BY b.display_order, b.id"
    ))?;
    let rows = stmt
        .query_map([], BadgeRow::from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    rows.into_iter().map(BadgeRow::into_badge).collect()
}

pub fn user_badges(conn: &Connection, user_id: &str) -> RewardResult<Vec<UnlockedBadge>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {BADGE_COLUMNS}, ub.unlocked_at
         FROM user_badges ub
         JOIN badges b ON b.id = ub.badge_id
         WHERE ub.user_id = ?1
         ORDER BY ub.unlocked_at, b.display_order, b.id"
    ))?;
    let rows = stmt
        .query_map(params![user_id], |row| {
            Ok((BadgeRow::from_row(row)?, row.get::<_, String>(9)?))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    rows.into_iter()
        .map(|(raw, unlocked_at)| {
            Ok(UnlockedBadge {
                badge: raw.into_badge()?,
                unlocked_at,
            })
        })
        .collect()
}

/// Insert the grant row. `false` when the user already holds the badge,
/// including when a concurrent writer got there first.
fn grant(conn: &Connection, user_id: &str, badge_id: i64, at: DateTime<Utc>) -> RewardResult<bool> {
    let inserted = conn.execute(
        "INSERT OR IGNORE INTO user_badges (user_id, badge_id, unlocked_at) VALUES (?1, ?2, ?3)",
        params![user_id, badge_id, timestamp(at)],
    )?;
    Ok(inserted == 1)
}

/// Unlock every badge whose metric is in `changed` and whose condition
/// the user now meets.
///
/// Badge rewards can raise the level and always raise the badge count, so
/// evaluation repeats on those metrics until a pass grants nothing.
pub fn evaluate(
    conn: &Connection,
    user_id: &str,
    changed: &[Metric],
    at: DateTime<Utc>,
) -> RewardResult<Vec<Badge>> {
    let badges = list_badges(conn)?;
    let mut granted = Vec::new();
    let mut pending: Vec<Metric> = changed.to_vec();

    while !pending.is_empty() {
        let snapshot = ledger::snapshot(conn, user_id)?;
        let mut next = Vec::new();

        for badge in badges
            .iter()
            .filter(|badge| pending.contains(&badge.condition.metric))
        {
            if !badge.condition.is_met(snapshot.value(badge.condition.metric)) {
                continue;
            }
            if !grant(conn, user_id, badge.id, at)? {
                continue;
            }

            tracing::info!(user_id, badge = %badge.name, "Badge unlocked");
            let credit = ledger::credit(conn, user_id, badge.points, badge.experience)?;
            if credit.level_change.is_some() {
                next.push(Metric::Level);
            }
            next.push(Metric::BadgeCount);
            granted.push(badge.clone());
        }

        next.sort();
        next.dedup();
        pending = next;
    }

    Ok(granted)
}
