//! Administrator routes: raw event ingestion and manual tag grants.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};
use crate::extractors::AdminUser;
use crate::rewards::special_tags::GrantOutcome;
use crate::rewards::{ActionKind, EmitOutcome};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/events", post(ingest_event))
        .route(
            "/api/admin/users/{id}/tags/{tag}",
            post(grant_tag).delete(revoke_tag),
        )
}

#[derive(Deserialize)]
pub struct EventRequest {
    pub user_id: String,
    pub kind: String,
    #[serde(default = "default_quantity")]
    pub quantity: i64,
    /// Defaults to now
    pub at: Option<DateTime<Utc>>,
}

fn default_quantity() -> i64 {
    1
}

#[derive(Serialize)]
pub struct TagGrantResponse {
    pub granted: bool,
    pub expires_at: Option<DateTime<Utc>>,
}

/// POST /api/events — apply an activity event on behalf of any user
async fn ingest_event(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Json(req): Json<EventRequest>,
) -> AppResult<Json<EmitOutcome>> {
    let kind: ActionKind = req.kind.parse()?;
    let at = req.at.unwrap_or_else(Utc::now);

    tracing::info!(admin = %admin.id, user_id = %req.user_id, kind = %kind, "Event ingested");
    let outcome = state.rewards.emit(&req.user_id, kind, req.quantity, at)?;
    Ok(Json(outcome))
}

/// POST /api/admin/users/{id}/tags/{tag}
async fn grant_tag(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Path((user_id, tag)): Path<(String, String)>,
) -> AppResult<Response> {
    let outcome = state.rewards.grant_tag(&user_id, &tag, Utc::now())?;
    tracing::info!(admin = %admin.id, user_id = %user_id, tag = %tag, ?outcome, "Tag grant");

    Ok(match outcome {
        GrantOutcome::Granted { expires_at } => (
            StatusCode::CREATED,
            Json(TagGrantResponse {
                granted: true,
                expires_at,
            }),
        )
            .into_response(),
        GrantOutcome::AlreadyActive => (
            StatusCode::OK,
            Json(TagGrantResponse {
                granted: false,
                expires_at: None,
            }),
        )
            .into_response(),
    })
}

/// DELETE /api/admin/users/{id}/tags/{tag}
async fn revoke_tag(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Path((user_id, tag)): Path<(String, String)>,
) -> AppResult<StatusCode> {
    if !state.rewards.revoke_tag(&user_id, &tag)? {
        return Err(AppError::NotFound);
    }
    tracing::info!(admin = %admin.id, user_id = %user_id, tag = %tag, "Tag revoked");
    Ok(StatusCode::NO_CONTENT)
}
