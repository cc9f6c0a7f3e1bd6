use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use rusqlite::{params, OptionalExtension, TransactionBehavior};
use serde::{Deserialize, Serialize};

use crate::auth::{clear_session_cookie, cookie_value, password, session, session_cookie};
use crate::db::models::User;
use crate::db::timestamp;
use crate::error::{AppError, AppResult};
use crate::extractors::CurrentUser;
use crate::rewards::ledger::{self, ProgressSnapshot};
use crate::rewards::levels::LevelProgress;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/users", post(register))
        .route("/api/sessions", post(login).delete(logout))
        .route("/api/me", get(me))
}

#[derive(Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

#[derive(Serialize)]
pub struct MeResponse {
    pub user: User,
    pub level: LevelProgress,
    pub progress: ProgressSnapshot,
}

fn validate_username(username: &str) -> AppResult<()> {
    let len = username.chars().count();
    if !(3..=32).contains(&len) {
        return Err(AppError::BadRequest(
            "Username must be 3 to 32 characters".into(),
        ));
    }
    if !username
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err(AppError::BadRequest(
            "Username may only contain letters, digits, '_' and '-'".into(),
        ));
    }
    Ok(())
}

/// POST /api/users — register. The first account becomes the administrator.
async fn register(
    State(state): State<AppState>,
    Json(req): Json<Credentials>,
) -> AppResult<Response> {
    let username = req.username.trim().to_string();
    validate_username(&username)?;
    let password_hash = password::hash_password(&req.password)?;

    let mut conn = state.db.get()?;
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let taken: bool = tx.query_row(
        "SELECT COUNT(*) > 0 FROM users WHERE username = ?1",
        params![username],
        |row| row.get(0),
    )?;
    if taken {
        return Err(AppError::Conflict("Username already taken".into()));
    }

    let is_first: bool = tx.query_row("SELECT COUNT(*) = 0 FROM users", [], |row| row.get(0))?;
    let user = User {
        id: uuid::Uuid::now_v7().to_string(),
        username,
        is_admin: is_first,
        created_at: timestamp(Utc::now()),
    };
    tx.execute(
        "INSERT INTO users (id, username, password_hash, is_admin, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
        params![user.id, user.username, password_hash, user.is_admin, user.created_at],
    )?;
    tx.execute(
        "INSERT INTO user_progress (user_id) VALUES (?1)",
        params![user.id],
    )?;
    tx.commit()?;

    tracing::info!(user_id = %user.id, username = %user.username, admin = user.is_admin, "User registered");
    Ok((StatusCode::CREATED, Json(user)).into_response())
}

/// POST /api/sessions — log in and set the session cookie
async fn login(
    State(state): State<AppState>,
    Json(req): Json<Credentials>,
) -> AppResult<Response> {
    let conn = state.db.get()?;
    let found: Option<(User, Option<String>)> = conn
        .query_row(
            "SELECT id, username, is_admin, created_at, password_hash FROM users WHERE username = ?1",
            params![req.username.trim()],
            |row| Ok((User::from_row(row)?, row.get(4)?)),
        )
        .optional()?;

    let user = match found {
        Some((user, Some(hash))) if password::verify_password(&req.password, &hash) => user,
        _ => {
            tracing::warn!(username = %req.username, "Failed login");
            return Err(AppError::Unauthorized);
        }
    };

    let token = session::create_session(
        &conn,
        &user.id,
        state.config.auth.session_hours,
        Utc::now(),
    )?;
    let cookie = session_cookie(
        &state.config.auth.cookie_name,
        &token,
        state.config.auth.session_hours,
    );

    Ok((StatusCode::OK, [(header::SET_COOKIE, cookie)], Json(user)).into_response())
}

/// DELETE /api/sessions — log out
async fn logout(State(state): State<AppState>, headers: HeaderMap) -> AppResult<Response> {
    if let Some(token) = cookie_value(&headers, &state.config.auth.cookie_name) {
        let conn = state.db.get()?;
        session::delete_session(&conn, token)?;
    }

    Ok((
        StatusCode::NO_CONTENT,
        [(
            header::SET_COOKIE,
            clear_session_cookie(&state.config.auth.cookie_name),
        )],
    )
        .into_response())
}

/// GET /api/me
async fn me(State(state): State<AppState>, user: CurrentUser) -> AppResult<Json<MeResponse>> {
    let conn = state.db.get()?;
    let account = conn
        .query_row(
            "SELECT id, username, is_admin, created_at FROM users WHERE id = ?1",
            params![user.id],
            User::from_row,
        )
        .optional()?
        .ok_or(AppError::NotFound)?;
    let progress = ledger::snapshot(&conn, &user.id)?;

    Ok(Json(MeResponse {
        user: account,
        level: LevelProgress::for_experience(progress.experience),
        progress,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn usernames_are_checked() {
        assert!(validate_username("alice_01").is_ok());
        assert!(validate_username("al").is_err());
        assert!(validate_username("alice bob").is_err());
        assert!(validate_username(&"a".repeat(33)).is_err());
    }
}
