//! Session token operations.

use chrono::{DateTime, Utc};
use medley_core::{Error, Result, SessionId, UserId};
use rusqlite::Connection;

use crate::models::AuthToken;

const COLS: &str = "id, user_id, token, expires_at, created_at";

/// Create a new session token.
pub fn create_token(
    conn: &Connection,
    user_id: UserId,
    token: &str,
    expires_at: DateTime<Utc>,
) -> Result<AuthToken> {
    let id = SessionId::new();
    let now = Utc::now();

    conn.execute(
        "INSERT INTO auth_tokens (id, user_id, token, expires_at, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        rusqlite::params![
            id.to_string(),
            user_id.to_string(),
            token,
            expires_at.to_rfc3339(),
            now.to_rfc3339(),
        ],
    )
    .map_err(|e| Error::database(e.to_string()))?;

    Ok(AuthToken {
        id,
        user_id,
        token: token.to_string(),
        expires_at,
        created_at: now,
    })
}

/// Look up a token by its value.
pub fn get_token(conn: &Connection, token: &str) -> Result<Option<AuthToken>> {
    let q = format!("SELECT {COLS} FROM auth_tokens WHERE token = ?1");
    match conn.query_row(&q, [token], AuthToken::from_row) {
        Ok(t) => Ok(Some(t)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(Error::database(e.to_string())),
    }
}

/// Delete a specific token by value.
pub fn delete_token(conn: &Connection, token: &str) -> Result<bool> {
    let n = conn
        .execute("DELETE FROM auth_tokens WHERE token = ?1", [token])
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(n > 0)
}

/// Delete every token belonging to a user.
pub fn delete_user_tokens(conn: &Connection, user_id: UserId) -> Result<usize> {
    conn.execute(
        "DELETE FROM auth_tokens WHERE user_id = ?1",
        [user_id.to_string()],
    )
    .map_err(|e| Error::database(e.to_string()))
}

/// Delete all tokens that expired before `now`.
pub fn delete_expired_tokens(conn: &Connection, now: DateTime<Utc>) -> Result<usize> {
    conn.execute(
        "DELETE FROM auth_tokens WHERE expires_at < ?1",
        [now.to_rfc3339()],
    )
    .map_err(|e| Error::database(e.to_string()))
}
