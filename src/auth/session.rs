use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use rusqlite::{params, Connection, OptionalExtension};

use crate::db::models::User;
use crate::db::timestamp;

const MAX_SESSION_HOURS: i64 = 24 * 365 * 10;

/// Create a new session for a user. Returns the session token.
pub fn create_session(
    conn: &Connection,
    user_id: &str,
    hours: u64,
    now: DateTime<Utc>,
) -> rusqlite::Result<String> {
    let token = generate_token();
    let id = uuid::Uuid::now_v7().to_string();
    let hours = i64::try_from(hours)
        .unwrap_or(MAX_SESSION_HOURS)
        .min(MAX_SESSION_HOURS);
    let expires_at = now + Duration::hours(hours);

    conn.execute(
        "INSERT INTO sessions (id, user_id, token, expires_at) VALUES (?1, ?2, ?3, ?4)",
        params![id, user_id, token, timestamp(expires_at)],
    )?;

    Ok(token)
}

/// The user behind an unexpired session token.
pub fn find_session_user(
    conn: &Connection,
    token: &str,
    now: DateTime<Utc>,
) -> rusqlite::Result<Option<User>> {
    conn.query_row(
        "SELECT u.id, u.username, u.is_admin, u.created_at FROM sessions s
         JOIN users u ON u.id = s.user_id
         WHERE s.token = ?1 AND s.expires_at > ?2",
        params![token, timestamp(now)],
        User::from_row,
    )
    .optional()
}

/// Delete a session by token.
pub fn delete_session(conn: &Connection, token: &str) -> rusqlite::Result<()> {
    conn.execute("DELETE FROM sessions WHERE token = ?1", params![token])?;
    Ok(())
}

/// Generate a cryptographically random 32-byte hex token.
fn generate_token() -> String {
    let mut rng = rand::thread_rng();
    let bytes: [u8; 32] = rng.gen();
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;

    #[test]
    fn generate_token_is_64_hex_chars() {
        let token = generate_token();
        assert_eq!(token.len(), 64);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn generate_token_is_unique() {
        assert_ne!(generate_token(), generate_token());
    }

    #[test]
    fn session_resolves_until_it_expires() {
        let (pool, _tmp) = test_pool();
        let conn = pool.get().unwrap();
        conn.execute("INSERT INTO users (id, username) VALUES ('u1', 'alice')", [])
            .unwrap();

        let now = Utc::now();
        let token = create_session(&conn, "u1", 1, now).unwrap();

        let user = find_session_user(&conn, &token, now).unwrap().unwrap();
        assert_eq!(user.username, "alice");
        assert!(find_session_user(&conn, &token, now + Duration::hours(2))
            .unwrap()
            .is_none());

        delete_session(&conn, &token).unwrap();
        assert!(find_session_user(&conn, &token, now).unwrap().is_none());
    }
}
