use rusqlite::Row;
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub id: String,
    pub username: String,
    pub is_admin: bool,
    pub created_at: String,
}

impl User {
    /// Expects `id, username, is_admin, created_at`.
    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            username: row.get(1)?,
            is_admin: row.get(2)?,
            created_at: row.get(3)?,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Topic {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub body: String,
    pub reply_count: i64,
    pub like_count: i64,
    pub favorite_count: i64,
    pub created_at: String,
}

impl Topic {
    pub const COLUMNS: &'static str =
        "id, user_id, title, body, reply_count, like_count, favorite_count, created_at";

    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            user_id: row.get(1)?,
            title: row.get(2)?,
            body: row.get(3)?,
            reply_count: row.get(4)?,
            like_count: row.get(5)?,
            favorite_count: row.get(6)?,
            created_at: row.get(7)?,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Reply {
    pub id: String,
    pub topic_id: String,
    pub user_id: String,
    pub body: String,
    pub created_at: String,
}
