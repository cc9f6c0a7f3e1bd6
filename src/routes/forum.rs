//! Forum actions. Each handler writes its row and applies the matching
//! reward in one transaction, so a failed reward also undoes the write.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use serde::{Deserialize, Serialize};

use crate::db::models::{Reply, Topic};
use crate::db::timestamp;
use crate::error::{AppError, AppResult};
use crate::extractors::CurrentUser;
use crate::rewards::action::MAX_EVENT_QUANTITY;
use crate::rewards::{ActionKind, EmitOutcome};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/topics", post(create_topic))
        .route("/api/topics/{id}/replies", post(create_reply))
        .route("/api/topics/{id}/like", post(like_topic))
        .route("/api/topics/{id}/favorite", post(favorite_topic))
        .route("/api/checkin", post(checkin))
        .route("/api/courses/{id}/progress", post(course_progress))
}

#[derive(Deserialize)]
pub struct NewTopic {
    pub title: String,
    pub body: String,
}

#[derive(Deserialize)]
pub struct NewReply {
    pub body: String,
}

#[derive(Deserialize)]
pub struct CourseProgress {
    pub minutes: i64,
}

#[derive(Serialize)]
pub struct Rewarded<T> {
    #[serde(flatten)]
    pub item: T,
    pub rewards: EmitOutcome,
}

fn required(field: &str, value: &str) -> AppResult<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(AppError::BadRequest(format!("{} must not be empty", field)));
    }
    Ok(value.to_string())
}

fn find_topic(conn: &Connection, id: &str) -> AppResult<Topic> {
    conn.query_row(
        &format!("SELECT {} FROM topics WHERE id = ?1", Topic::COLUMNS),
        params![id],
        Topic::from_row,
    )
    .optional()?
    .ok_or(AppError::NotFound)
}

/// POST /api/topics
async fn create_topic(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(req): Json<NewTopic>,
) -> AppResult<Response> {
    let title = required("title", &req.title)?;
    let body = required("body", &req.body)?;
    let now = Utc::now();

    let mut conn = state.db.get()?;
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let id = uuid::Uuid::now_v7().to_string();
    tx.execute(
        "INSERT INTO topics (id, user_id, title, body, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
        params![id, user.id, title, body, timestamp(now)],
    )?;
    let rewards = state
        .rewards
        .apply(&tx, &user.id, ActionKind::PostTopic, 1, now)?;
    let topic = find_topic(&tx, &id)?;
    tx.commit()?;

    tracing::info!(user_id = %user.id, topic_id = %topic.id, "Topic created");
    Ok((StatusCode::CREATED, Json(Rewarded { item: topic, rewards })).into_response())
}

/// POST /api/topics/{id}/replies
async fn create_reply(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(topic_id): Path<String>,
    Json(req): Json<NewReply>,
) -> AppResult<Response> {
    let body = required("body", &req.body)?;
    let now = Utc::now();

    let mut conn = state.db.get()?;
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    find_topic(&tx, &topic_id)?;

    let reply = Reply {
        id: uuid::Uuid::now_v7().to_string(),
        topic_id,
        user_id: user.id.clone(),
        body,
        created_at: timestamp(now),
    };
    tx.execute(
        "INSERT INTO replies (id, topic_id, user_id, body, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
        params![reply.id, reply.topic_id, reply.user_id, reply.body, reply.created_at],
    )?;
    tx.execute(
        "UPDATE topics SET reply_count = reply_count + 1 WHERE id = ?1",
        params![reply.topic_id],
    )?;
    let rewards = state
        .rewards
        .apply(&tx, &user.id, ActionKind::Reply, 1, now)?;
    tx.commit()?;

    Ok((StatusCode::CREATED, Json(Rewarded { item: reply, rewards })).into_response())
}

/// Shared by like and favorite: record the reaction once per user, reward
/// the giver, and reward the topic author unless they reacted to their own
/// topic.
fn react(
    state: &AppState,
    user: &CurrentUser,
    topic_id: &str,
    reaction: Reaction,
) -> AppResult<Rewarded<Topic>> {
    let now = Utc::now();
    let mut conn = state.db.get()?;
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let topic = find_topic(&tx, topic_id)?;

    let inserted = tx.execute(
        reaction.insert_sql(),
        params![topic_id, user.id, timestamp(now)],
    )?;
    if inserted == 0 {
        return Err(AppError::Conflict(format!(
            "Topic already {}",
            reaction.past_tense()
        )));
    }
    tx.execute(reaction.count_sql(), params![topic_id])?;

    let (give, receive) = reaction.actions();
    let rewards = state.rewards.apply(&tx, &user.id, give, 1, now)?;
    if topic.user_id != user.id {
        state.rewards.apply(&tx, &topic.user_id, receive, 1, now)?;
    }
    let topic = find_topic(&tx, topic_id)?;
    tx.commit()?;

    Ok(Rewarded {
        item: topic,
        rewards,
    })
}

#[derive(Debug, Clone, Copy)]
enum Reaction {
    Like,
    Favorite,
}

impl Reaction {
    fn insert_sql(self) -> &'static str {
        match self {
            Self::Like => {
                "INSERT OR IGNORE INTO likes (topic_id, user_id, created_at) VALUES (?1, ?2, ?3)"
            }
            Self::Favorite => {
                "INSERT OR IGNORE INTO favorites (topic_id, user_id, created_at) VALUES (?1, ?2, ?3)"
            }
        }
    }

    fn count_sql(self) -> &'static str {
        match self {
            Self::Like => "UPDATE topics SET like_count = like_count + 1 WHERE id = ?1",
            Self::Favorite => "UPDATE topics SET favorite_count = favorite_count + 1 WHERE id = ?1",
        }
    }

    fn actions(self) -> (ActionKind, ActionKind) {
        match self {
            Self::Like => (ActionKind::GiveLike, ActionKind::ReceiveLike),
            Self::Favorite => (ActionKind::GiveFavorite, ActionKind::ReceiveFavorite),
        }
    }

    fn past_tense(self) -> &'static str {
        match self {
            Self::Like => "liked",
            Self::Favorite => "favorited",
        }
    }
}

/// POST /api/topics/{id}/like
async fn like_topic(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(topic_id): Path<String>,
) -> AppResult<Json<Rewarded<Topic>>> {
    react(&state, &user, &topic_id, Reaction::Like).map(Json)
}

/// POST /api/topics/{id}/favorite
async fn favorite_topic(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(topic_id): Path<String>,
) -> AppResult<Json<Rewarded<Topic>>> {
    react(&state, &user, &topic_id, Reaction::Favorite).map(Json)
}

/// POST /api/checkin — a repeat on the same day answers 200 with
/// `applied: false`
async fn checkin(
    State(state): State<AppState>,
    user: CurrentUser,
) -> AppResult<Json<EmitOutcome>> {
    let outcome = state
        .rewards
        .emit(&user.id, ActionKind::DailyCheckin, 1, Utc::now())?;
    Ok(Json(outcome))
}

/// POST /api/courses/{id}/progress
async fn course_progress(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(course_id): Path<String>,
    Json(req): Json<CourseProgress>,
) -> AppResult<Json<EmitOutcome>> {
    if !(1..=MAX_EVENT_QUANTITY).contains(&req.minutes) {
        return Err(AppError::BadRequest(format!(
            "minutes must be between 1 and {MAX_EVENT_QUANTITY}"
        )));
    }
    let now = Utc::now();

    let mut conn = state.db.get()?;
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    tx.execute(
        "INSERT INTO course_sessions (id, user_id, course_id, minutes, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            uuid::Uuid::now_v7().to_string(),
            user.id,
            course_id,
            req.minutes,
            timestamp(now)
        ],
    )?;
    let outcome = state
        .rewards
        .apply(&tx, &user.id, ActionKind::CourseTime, req.minutes, now)?;
    tx.commit()?;

    Ok(Json(outcome))
}
