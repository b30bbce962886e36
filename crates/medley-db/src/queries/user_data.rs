//! Per-user favorites, ratings and play state.

use chrono::Utc;
use medley_core::{Error, MediaItemId, MediaType, Result, UserDataId, UserId};
use rusqlite::Connection;

use crate::models::{MediaRecord, UserMediaData};

const COLS: &str = "id, user_id, item_id, media_type, is_favorite, user_rating, play_count,
    position_secs, completed, last_played_at, updated_at";

/// Media columns prefixed for joins against `user_media_data`.
const MEDIA_COLS: &str = "m.id, m.media_type, m.title, m.release_year, m.external_ids,
    m.sync_clients, m.owner_id, m.data, m.created_at, m.updated_at";

/// Get the stored row for (user, item), if any.
pub fn get(conn: &Connection, user_id: UserId, item_id: MediaItemId) -> Result<Option<UserMediaData>> {
    let q = format!("SELECT {COLS} FROM user_media_data WHERE user_id = ?1 AND item_id = ?2");
    let result = conn.query_row(
        &q,
        rusqlite::params![user_id.to_string(), item_id.to_string()],
        UserMediaData::from_row,
    );
    match result {
        Ok(d) => Ok(Some(d)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(Error::database(e.to_string())),
    }
}

/// Get the row for (user, item) or an empty default.
pub fn get_or_default(
    conn: &Connection,
    user_id: UserId,
    item_id: MediaItemId,
    media_type: MediaType,
) -> Result<UserMediaData> {
    Ok(get(conn, user_id, item_id)?
        .unwrap_or_else(|| UserMediaData::empty(user_id, item_id, media_type)))
}

fn ensure_row(
    conn: &Connection,
    user_id: UserId,
    item_id: MediaItemId,
    media_type: MediaType,
) -> Result<()> {
    conn.execute(
        "INSERT OR IGNORE INTO user_media_data (id, user_id, item_id, media_type, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        rusqlite::params![
            UserDataId::new().to_string(),
            user_id.to_string(),
            item_id.to_string(),
            media_type.as_str(),
            Utc::now().to_rfc3339(),
        ],
    )
    .map_err(|e| Error::database(e.to_string()))?;
    Ok(())
}

fn reload(conn: &Connection, user_id: UserId, item_id: MediaItemId) -> Result<UserMediaData> {
    get(conn, user_id, item_id)?
        .ok_or_else(|| Error::Internal(format!("user data for {item_id} vanished after write")))
}

/// Set favorite flag and/or rating. `None` leaves a field unchanged.
pub fn set_data(
    conn: &Connection,
    user_id: UserId,
    item_id: MediaItemId,
    media_type: MediaType,
    is_favorite: Option<bool>,
    user_rating: Option<f64>,
) -> Result<UserMediaData> {
    if let Some(r) = user_rating {
        if !(0.0..=10.0).contains(&r) {
            return Err(Error::Validation(format!("user_rating must be within 0..=10, got {r}")));
        }
    }
    ensure_row(conn, user_id, item_id, media_type)?;
    conn.execute(
        "UPDATE user_media_data SET
            is_favorite = COALESCE(?1, is_favorite),
            user_rating = COALESCE(?2, user_rating),
            updated_at = ?3
         WHERE user_id = ?4 AND item_id = ?5",
        rusqlite::params![
            is_favorite.map(|f| f as i32),
            user_rating,
            Utc::now().to_rfc3339(),
            user_id.to_string(),
            item_id.to_string(),
        ],
    )
    .map_err(|e| Error::database(e.to_string()))?;
    reload(conn, user_id, item_id)
}

/// Record playback progress.
///
/// A completed play increments the play count and resets the position so
/// the item drops out of "continue".
pub fn record_play(
    conn: &Connection,
    user_id: UserId,
    item_id: MediaItemId,
    media_type: MediaType,
    position_secs: f64,
    completed: bool,
) -> Result<UserMediaData> {
    if position_secs < 0.0 || !position_secs.is_finite() {
        return Err(Error::Validation("position_secs must be a non-negative number".into()));
    }
    ensure_row(conn, user_id, item_id, media_type)?;
    let now = Utc::now().to_rfc3339();
    let result = if completed {
        conn.execute(
            "UPDATE user_media_data SET position_secs = 0, completed = 1,
                play_count = play_count + 1, last_played_at = ?1, updated_at = ?1
             WHERE user_id = ?2 AND item_id = ?3",
            rusqlite::params![now, user_id.to_string(), item_id.to_string()],
        )
    } else {
        conn.execute(
            "UPDATE user_media_data SET position_secs = ?2, completed = 0,
                last_played_at = ?1, updated_at = ?1
             WHERE user_id = ?3 AND item_id = ?4",
            rusqlite::params![now, position_secs, user_id.to_string(), item_id.to_string()],
        )
    };
    result.map_err(|e| Error::database(e.to_string()))?;
    reload(conn, user_id, item_id)
}

fn list_joined(
    conn: &Connection,
    user_id: UserId,
    media_type: MediaType,
    condition: &str,
    order: &str,
    limit: u32,
    offset: u32,
) -> Result<(Vec<(MediaRecord, UserMediaData)>, u64)> {
    let total: i64 = conn
        .query_row(
            &format!(
                "SELECT COUNT(*) FROM user_media_data u
                 WHERE u.user_id = ?1 AND u.media_type = ?2 AND {condition}"
            ),
            rusqlite::params![user_id.to_string(), media_type.as_str()],
            |r| r.get(0),
        )
        .map_err(|e| Error::database(e.to_string()))?;

    let user_cols: String = COLS
        .split(',')
        .map(|c| format!("u.{}", c.trim()))
        .collect::<Vec<_>>()
        .join(", ");
    let q = format!(
        "SELECT {MEDIA_COLS}, {user_cols}
         FROM user_media_data u JOIN media_items m ON m.id = u.item_id
         WHERE u.user_id = ?1 AND u.media_type = ?2 AND {condition}
         ORDER BY {order} LIMIT ?3 OFFSET ?4"
    );
    let mut stmt = conn.prepare(&q).map_err(|e| Error::database(e.to_string()))?;
    let rows = stmt
        .query_map(
            rusqlite::params![user_id.to_string(), media_type.as_str(), limit, offset],
            |row| {
                let media = MediaRecord::from_row(row)?;
                let data = UserMediaData::from_row_at(row, 10)?;
                Ok((media, data))
            },
        )
        .map_err(|e| Error::database(e.to_string()))?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| Error::database(e.to_string()))?;
    Ok((rows, total.max(0) as u64))
}

/// Favorites, most recently changed first.
pub fn list_favorites(
    conn: &Connection,
    user_id: UserId,
    media_type: MediaType,
    limit: u32,
    offset: u32,
) -> Result<(Vec<(MediaRecord, UserMediaData)>, u64)> {
    list_joined(conn, user_id, media_type, "u.is_favorite = 1", "u.updated_at DESC", limit, offset)
}

/// Everything played at least once or started, most recent first.
pub fn list_history(
    conn: &Connection,
    user_id: UserId,
    media_type: MediaType,
    limit: u32,
    offset: u32,
) -> Result<(Vec<(MediaRecord, UserMediaData)>, u64)> {
    list_joined(
        conn,
        user_id,
        media_type,
        "u.last_played_at IS NOT NULL",
        "u.last_played_at DESC",
        limit,
        offset,
    )
}

/// Started but unfinished items ("continue watching/listening").
pub fn list_in_progress(
    conn: &Connection,
    user_id: UserId,
    media_type: MediaType,
    limit: u32,
    offset: u32,
) -> Result<(Vec<(MediaRecord, UserMediaData)>, u64)> {
    list_joined(
        conn,
        user_id,
        media_type,
        "u.position_secs > 0 AND u.completed = 0",
        "u.last_played_at DESC",
        limit,
        offset,
    )
}
