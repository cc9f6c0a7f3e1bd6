use thiserror::Error;

#[derive(Debug, Error)]
pub enum RewardError {
    #[error("Unknown action kind: {0}")]
    UnknownActionKind(String),

    #[error("Unknown task type: {0}")]
    UnknownTaskType(String),

    #[error("Quantity must be positive, got {0}")]
    InvalidQuantity(i64),

    #[error("Invalid definition: {0}")]
    InvalidDefinition(String),

    #[error("User not found: {0}")]
    UserNotFound(String),

    #[error("Unknown special tag: {0}")]
    UnknownTag(String),

    #[error("Database error: {0}")]
    Database(#[from] r2d2::Error),

    #[error("SQL error: {0}")]
    Sql(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type RewardResult<T> = Result<T, RewardError>;
