use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::error::AppResult;
use crate::extractors::CurrentUser;
use crate::rewards::achievements::{self, Badge, UnlockedBadge};
use crate::rewards::daily_tasks::TaskStatus;
use crate::rewards::ledger::{self, ProgressSnapshot};
use crate::rewards::levels::{experience_for, title_for, LevelProgress, MAX_LEVEL};
use crate::rewards::notify::{self, StoredNotification};
use crate::rewards::special_tags::{self, ActiveTag};
use crate::state::AppState;

const DEFAULT_NOTIFICATION_LIMIT: u32 = 50;
const MAX_NOTIFICATION_LIMIT: u32 = 200;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/users/{id}/rewards", get(user_rewards))
        .route("/api/users/{id}/badges", get(user_badges))
        .route("/api/users/{id}/tags", get(user_tags))
        .route("/api/me/tasks", get(my_tasks))
        .route("/api/me/notifications", get(my_notifications))
        .route("/api/me/notifications/read", post(mark_notifications_read))
        .route("/api/badges", get(all_badges))
        .route("/api/levels", get(levels))
}

#[derive(Serialize)]
pub struct RewardsView {
    pub user_id: String,
    pub balance: i64,
    pub level: LevelProgress,
    pub progress: ProgressSnapshot,
}

#[derive(Serialize)]
pub struct LevelRow {
    pub level: u32,
    pub title: &'static str,
    pub experience: i64,
}

#[derive(Deserialize)]
pub struct NotificationQuery {
    pub limit: Option<u32>,
}

#[derive(Serialize)]
pub struct MarkedRead {
    pub marked: usize,
}

/// GET /api/users/{id}/rewards
async fn user_rewards(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> AppResult<Json<RewardsView>> {
    let conn = state.db.get()?;
    let progress = ledger::snapshot(&conn, &user_id)?;
    Ok(Json(RewardsView {
        user_id,
        balance: progress.balance,
        level: LevelProgress::for_experience(progress.experience),
        progress,
    }))
}

/// GET /api/users/{id}/badges
async fn user_badges(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> AppResult<Json<Vec<UnlockedBadge>>> {
    let conn = state.db.get()?;
    // 404 for unknown users rather than an empty list
    ledger::snapshot(&conn, &user_id)?;
    Ok(Json(achievements::user_badges(&conn, &user_id)?))
}

/// GET /api/users/{id}/tags
async fn user_tags(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> AppResult<Json<Vec<ActiveTag>>> {
    let conn = state.db.get()?;
    ledger::snapshot(&conn, &user_id)?;
    Ok(Json(special_tags::active_tags(&conn, &user_id, Utc::now())?))
}

/// GET /api/me/tasks
async fn my_tasks(
    State(state): State<AppState>,
    user: CurrentUser,
) -> AppResult<Json<Vec<TaskStatus>>> {
    Ok(Json(state.rewards.today_tasks(&user.id)?))
}

/// GET /api/me/notifications?limit=N
async fn my_notifications(
    State(state): State<AppState>,
    user: CurrentUser,
    Query(query): Query<NotificationQuery>,
) -> AppResult<Json<Vec<StoredNotification>>> {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_NOTIFICATION_LIMIT)
        .min(MAX_NOTIFICATION_LIMIT);
    let conn = state.db.get()?;
    Ok(Json(notify::list_for_user(&conn, &user.id, limit)?))
}

/// POST /api/me/notifications/read
async fn mark_notifications_read(
    State(state): State<AppState>,
    user: CurrentUser,
) -> AppResult<(StatusCode, Json<MarkedRead>)> {
    let conn = state.db.get()?;
    let marked = notify::mark_all_read(&conn, &user.id, Utc::now())?;
    Ok((StatusCode::OK, Json(MarkedRead { marked })))
}

/// GET /api/badges
async fn all_badges(State(state): State<AppState>) -> AppResult<Json<Vec<Badge>>> {
    let conn = state.db.get()?;
    Ok(Json(achievements::list_badges(&conn)?))
}

/// GET /api/levels
async fn levels() -> Json<Vec<LevelRow>> {
    Json(
        (1..=MAX_LEVEL)
            .filter_map(|level| {
                experience_for(level).map(|experience| LevelRow {
                    level,
                    title: title_for(level),
                    experience,
                })
            })
            .collect(),
    )
}
