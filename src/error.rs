use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::rewards::RewardError;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Not found")]
    NotFound,

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Forbidden")]
    Forbidden,

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Reward(#[from] RewardError),
}

fn internal(kind: &str, err: &dyn std::fmt::Display) -> (StatusCode, String) {
    tracing::error!("{}: {}", kind, err);
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        "Internal server error".to_string(),
    )
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::NotFound => (StatusCode::NOT_FOUND, "Not found".to_string()),
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, "Unauthorized".to_string()),
            AppError::Forbidden => (StatusCode::FORBIDDEN, "Forbidden".to_string()),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg.clone()),
            AppError::Database(e) => internal("Database error", e),
            AppError::Pool(e) => internal("Pool error", e),
            AppError::Internal(msg) => internal("Internal error", msg),
            AppError::Reward(e) => match e {
                RewardError::UnknownActionKind(_)
                | RewardError::UnknownTaskType(_)
                | RewardError::InvalidQuantity(_)
                | RewardError::InvalidDefinition(_) => (StatusCode::BAD_REQUEST, e.to_string()),
                RewardError::UserNotFound(_) | RewardError::UnknownTag(_) => {
                    (StatusCode::NOT_FOUND, e.to_string())
                }
                RewardError::Database(_)
                | RewardError::Sql(_)
                | RewardError::Serialization(_) => internal("Reward error", e),
            },
        };

        (status, message).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;

    fn response_status(err: AppError) -> StatusCode {
        let response = err.into_response();
        response.status()
    }

    #[test]
    fn not_found_returns_404() {
        assert_eq!(response_status(AppError::NotFound), StatusCode::NOT_FOUND);
    }

    #[test]
    fn unauthorized_returns_401() {
        assert_eq!(
            response_status(AppError::Unauthorized),
            StatusCode::UNAUTHORIZED
        );
    }

    #[test]
    fn forbidden_returns_403() {
        assert_eq!(response_status(AppError::Forbidden), StatusCode::FORBIDDEN);
    }

    #[test]
    fn bad_request_returns_400() {
        assert_eq!(
            response_status(AppError::BadRequest("oops".into())),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn internal_returns_500() {
        assert_eq!(
            response_status(AppError::Internal("boom".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn unknown_action_kind_is_a_client_error() {
        assert_eq!(
            response_status(RewardError::UnknownActionKind("dance".into()).into()),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn missing_user_returns_404() {
        assert_eq!(
            response_status(RewardError::UserNotFound("u1".into()).into()),
            StatusCode::NOT_FOUND
        );
    }

    #[test]
    fn reward_storage_errors_are_hidden() {
        let err = RewardError::Sql(rusqlite::Error::QueryReturnedNoRows);
        assert_eq!(
            response_status(err.into()),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
