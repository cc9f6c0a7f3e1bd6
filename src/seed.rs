//! Reward definition seeding
//!
//! Badges, daily tasks and special tags are loaded from TOML, validated,
//! and upserted by name. Re-seeding updates definitions in place and never
//! touches user grants or progress.

use rusqlite::{params, Connection, TransactionBehavior};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;

use crate::rewards::achievements::Rarity;
use crate::rewards::daily_tasks::TaskType;
use crate::rewards::special_tags::TagCategory;
use crate::rewards::{Condition, RewardError, RewardResult};
use crate::state::DbPool;

const BUILTIN: &str = include_str!("../definitions.toml");

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Definitions {
    pub badges: Vec<BadgeDefinition>,
    pub daily_tasks: Vec<TaskDefinition>,
    pub special_tags: Vec<TagDefinition>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BadgeDefinition {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub rarity: Rarity,
    pub condition: Condition,
    #[serde(default)]
    pub points: i64,
    #[serde(default)]
    pub experience: i64,
    #[serde(default)]
    pub display_order: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TaskDefinition {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub task_type: TaskType,
    pub target: i64,
    #[serde(default)]
    pub points: i64,
    #[serde(default)]
    pub experience: i64,
    #[serde(default)]
    pub display_order: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TagDefinition {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub category: TagCategory,
    #[serde(default)]
    pub condition: Option<Condition>,
    #[serde(default = "default_permanent")]
    pub permanent: bool,
    #[serde(default)]
    pub duration_days: Option<i64>,
}

fn default_permanent() -> bool {
    true
}

/// How many rows of each kind an upsert wrote.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SeedSummary {
    pub badges: usize,
    pub daily_tasks: usize,
    pub special_tags: usize,
}

fn invalid(msg: impl Into<String>) -> RewardError {
    RewardError::InvalidDefinition(msg.into())
}

fn check_unique<'a>(section: &str, names: impl Iterator<Item = &'a str>) -> RewardResult<()> {
    let mut seen = HashSet::new();
    for name in names {
        if name.trim().is_empty() {
            return Err(invalid(format!("{section}: empty name")));
        }
        if !seen.insert(name) {
            return Err(invalid(format!("{section}: duplicate name '{name}'")));
        }
    }
    Ok(())
}

impl Definitions {
    /// The definitions shipped with the binary.
    pub fn builtin() -> anyhow::Result<Self> {
        Ok(toml::from_str(BUILTIN)?)
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let definitions: Self = toml::from_str(&content)?;
        Ok(definitions)
    }

    pub fn validate(&self) -> RewardResult<()> {
        check_unique("badges", self.badges.iter().map(|b| b.name.as_str()))?;
        check_unique("daily_tasks", self.daily_tasks.iter().map(|t| t.name.as_str()))?;
        check_unique("special_tags", self.special_tags.iter().map(|t| t.name.as_str()))?;

        for badge in &self.badges {
            badge.condition.validate()?;
            if badge.points < 0 || badge.experience < 0 {
                return Err(invalid(format!("badge '{}': negative reward", badge.name)));
            }
        }

        for task in &self.daily_tasks {
            if task.target < 1 {
                return Err(invalid(format!(
                    "task '{}': target must be at least 1",
                    task.name
                )));
            }
            if task.points < 0 || task.experience < 0 {
                return Err(invalid(format!("task '{}': negative reward", task.name)));
            }
        }

        for tag in &self.special_tags {
            if let Some(condition) = &tag.condition {
                if tag.category == TagCategory::Admin {
                    return Err(invalid(format!(
                        "tag '{}': admin tags cannot have a condition",
                        tag.name
                    )));
                }
                condition.validate()?;
            }
            match (tag.permanent, tag.duration_days) {
                (true, Some(_)) => {
                    return Err(invalid(format!(
                        "tag '{}': permanent tags have no duration",
                        tag.name
                    )))
                }
                (false, None) => {
                    return Err(invalid(format!(
                        "tag '{}': timed tags need duration_days",
                        tag.name
                    )))
                }
                (false, Some(days)) if days < 1 => {
                    return Err(invalid(format!(
                        "tag '{}': duration_days must be at least 1",
                        tag.name
                    )))
                }
                _ => {}
            }
        }

        Ok(())
    }

    /// Validate, then insert or update every definition by name.
    pub fn upsert(&self, conn: &Connection) -> RewardResult<SeedSummary> {
        self.validate()?;
        let mut summary = SeedSummary::default();

        for badge in &self.badges {
            summary.badges += conn.execute(
                "INSERT INTO badges (name, description, rarity, condition_metric, condition_target, points, experience, display_order)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                 ON CONFLICT(name) DO UPDATE SET
                   description = excluded.description,
                   rarity = excluded.rarity,
                   condition_metric = excluded.condition_metric,
                   condition_target = excluded.condition_target,
                   points = excluded.points,
                   experience = excluded.experience,
                   display_order = excluded.display_order",
                params![
                    badge.name,
                    badge.description,
                    badge.rarity.as_str(),
                    badge.condition.metric.as_str(),
                    badge.condition.target,
                    badge.points,
                    badge.experience,
                    badge.display_order
                ],
            )?;
        }

        for task in &self.daily_tasks {
            summary.daily_tasks += conn.execute(
                "INSERT INTO daily_tasks (name, description, task_type, target, points, experience, display_order)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                 ON CONFLICT(name) DO UPDATE SET
                   description = excluded.description,
                   task_type = excluded.task_type,
                   target = excluded.target,
                   points = excluded.points,
                   experience = excluded.experience,
                   display_order = excluded.display_order",
                params![
                    task.name,
                    task.description,
                    task.task_type.as_str(),
                    task.target,
                    task.points,
                    task.experience,
                    task.display_order
                ],
            )?;
        }

        for tag in &self.special_tags {
            summary.special_tags += conn.execute(
                "INSERT INTO special_tags (name, description, category, condition_metric, condition_target, permanent, duration_days)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                 ON CONFLICT(name) DO UPDATE SET
                   description = excluded.description,
                   category = excluded.category,
                   condition_metric = excluded.condition_metric,
                   condition_target = excluded.condition_target,
                   permanent = excluded.permanent,
                   duration_days = excluded.duration_days",
                params![
                    tag.name,
                    tag.description,
                    tag.category.as_str(),
                    tag.condition.map(|c| c.metric.as_str()),
                    tag.condition.map(|c| c.target),
                    tag.permanent,
                    tag.duration_days
                ],
            )?;
        }

        Ok(summary)
    }
}

/// Upsert `definitions` in one transaction.
pub fn seed(pool: &DbPool, definitions: &Definitions) -> anyhow::Result<SeedSummary> {
    let mut conn = pool.get()?;
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let summary = definitions.upsert(&tx)?;
    tx.commit()?;

    tracing::info!(
        badges = summary.badges,
        daily_tasks = summary.daily_tasks,
        special_tags = summary.special_tags,
        "Reward definitions seeded"
    );
    Ok(summary)
}

/// Seed the built-in definitions when no definitions exist yet.
pub fn seed_defaults_if_empty(pool: &DbPool) -> anyhow::Result<bool> {
    let existing: i64 = pool.get()?.query_row(
        "SELECT (SELECT COUNT(*) FROM badges)
              + (SELECT COUNT(*) FROM daily_tasks)
              + (SELECT COUNT(*) FROM special_tags)",
        [],
        |row| row.get(0),
    )?;
    if existing > 0 {
        return Ok(false);
    }

    seed(pool, &Definitions::builtin()?)?;
    Ok(true)
}
