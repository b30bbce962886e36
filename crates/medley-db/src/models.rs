//! Rust structs mapping to database tables.
//!
//! Each model implements `from_row` for constructing itself from a
//! `rusqlite::Row`. Media rows are loaded untyped as [`MediaRecord`] and
//! converted to a typed [`MediaItem`] on demand.

use chrono::{DateTime, NaiveDateTime, Utc};
use medley_core::{
    Album, Artist, ClientId, ClientSettings, ClientType, Collection, Details, Episode, Error,
    ExternalIds, ItemKey, ItemRef, MediaData, MediaItem, MediaItemId, MediaType, Movie, Playlist,
    Result, Season, SessionId, SyncClients, Track, UserDataId, UserId,
};
use serde::Serialize;
use std::str::FromStr;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// helpers
// ---------------------------------------------------------------------------

fn conversion_error(
    idx: usize,
    e: impl std::error::Error + Send + Sync + 'static,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
}

/// Parse a UUID-based ID from a text column.
fn parse_id<T: From<Uuid>>(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<T> {
    let s: String = row.get(idx)?;
    let uuid = Uuid::parse_str(&s).map_err(|e| conversion_error(idx, e))?;
    Ok(T::from(uuid))
}

fn parse_opt_id<T: From<Uuid>>(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<Option<T>> {
    let s: Option<String> = row.get(idx)?;
    match s {
        Some(v) => {
            let uuid = Uuid::parse_str(&v).map_err(|e| conversion_error(idx, e))?;
            Ok(Some(T::from(uuid)))
        }
        None => Ok(None),
    }
}

fn parse_json<T: serde::de::DeserializeOwned>(
    row: &rusqlite::Row,
    idx: usize,
) -> rusqlite::Result<T> {
    let s: String = row.get(idx)?;
    serde_json::from_str(&s).map_err(|e| conversion_error(idx, e))
}

fn parse_enum<T: FromStr<Err = Error>>(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<T> {
    let s: String = row.get(idx)?;
    s.parse().map_err(|e: Error| conversion_error(idx, e))
}

/// Accepts RFC 3339 and SQLite's `datetime('now')` format.
pub(crate) fn parse_time_str(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
                .ok()
                .map(|n| n.and_utc())
        })
}

fn parse_time(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let s: String = row.get(idx)?;
    parse_time_str(&s).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            rusqlite::types::Type::Text,
            format!("invalid timestamp: {s}").into(),
        )
    })
}

fn parse_opt_time(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    let s: Option<String> = row.get(idx)?;
    Ok(s.as_deref().and_then(parse_time_str))
}

// ---------------------------------------------------------------------------
// User
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub password_hash: String,
    pub role: String,
    pub created_at: String,
}

impl User {
    pub fn from_row(row: &rusqlite::Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: parse_id(row, 0)?,
            username: row.get(1)?,
            password_hash: row.get(2)?,
            role: row.get(3)?,
            created_at: row.get(4)?,
        })
    }

    pub fn is_admin(&self) -> bool {
        self.role == "admin"
    }
}

// ---------------------------------------------------------------------------
// AuthToken
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct AuthToken {
    pub id: SessionId,
    pub user_id: UserId,
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl AuthToken {
    pub fn from_row(row: &rusqlite::Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: parse_id(row, 0)?,
            user_id: parse_id(row, 1)?,
            token: row.get(2)?,
            expires_at: parse_time(row, 3)?,
            created_at: parse_time(row, 4)?,
        })
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// A configured external media server belonging to one user.
#[derive(Debug, Clone)]
pub struct Client {
    pub id: ClientId,
    pub user_id: UserId,
    pub client_type: ClientType,
    pub name: String,
    pub settings: ClientSettings,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Client {
    pub fn from_row(row: &rusqlite::Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: parse_id(row, 0)?,
            user_id: parse_id(row, 1)?,
            client_type: parse_enum(row, 2)?,
            name: row.get(3)?,
            settings: parse_json(row, 4)?,
            enabled: row.get::<_, i32>(5)? != 0,
            created_at: parse_time(row, 6)?,
            updated_at: parse_time(row, 7)?,
        })
    }
}

// ---------------------------------------------------------------------------
// MediaRecord
// ---------------------------------------------------------------------------

/// A `media_items` row with its payload left as JSON.
///
/// Serializes with the same shape as [`MediaItem`], so mixed-type results
/// (list contents, search) can be returned without knowing each type.
#[derive(Debug, Clone, Serialize)]
pub struct MediaRecord {
    pub id: MediaItemId,
    pub media_type: MediaType,
    pub title: String,
    pub release_year: Option<i32>,
    pub external_ids: ExternalIds,
    pub sync_clients: SyncClients,
    pub owner_id: Option<UserId>,
    pub data: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl MediaRecord {
    pub fn from_row(row: &rusqlite::Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: parse_id(row, 0)?,
            media_type: parse_enum(row, 1)?,
            title: row.get(2)?,
            release_year: row.get(3)?,
            external_ids: parse_json(row, 4)?,
            sync_clients: parse_json(row, 5)?,
            owner_id: parse_opt_id(row, 6)?,
            data: parse_json(row, 7)?,
            created_at: parse_time(row, 8)?,
            updated_at: parse_time(row, 9)?,
        })
    }

    /// Convert into a typed item. Fails when the stored type differs.
    pub fn into_typed<T: MediaData>(self) -> Result<MediaItem<T>> {
        if self.media_type != T::MEDIA_TYPE {
            return Err(Error::not_found(T::MEDIA_TYPE.as_str(), self.id));
        }
        let data: T = serde_json::from_value(self.data)
            .map_err(|e| Error::database(format!("corrupt {} payload {}: {e}", self.media_type, self.id)))?;
        Ok(MediaItem {
            id: self.id,
            media_type: self.media_type,
            title: self.title,
            release_year: self.release_year,
            external_ids: self.external_ids,
            sync_clients: self.sync_clients,
            owner_id: self.owner_id,
            data,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }

    /// Shared details, whatever the payload type.
    pub fn details(&self) -> Details {
        self.data
            .get("details")
            .cloned()
            .and_then(|v| serde_json::from_value(v).ok())
            .unwrap_or_default()
    }

    /// Every content key this item matches under, canonical first.
    pub fn key_candidates(&self) -> Result<Vec<ItemKey>> {
        match self.media_type {
            MediaType::Movie => self.typed_candidates::<Movie>(),
            MediaType::Series => self.typed_candidates::<medley_core::Series>(),
            MediaType::Season => self.typed_candidates::<Season>(),
            MediaType::Episode => self.typed_candidates::<Episode>(),
            MediaType::Track => self.typed_candidates::<Track>(),
            MediaType::Album => self.typed_candidates::<Album>(),
            MediaType::Artist => self.typed_candidates::<Artist>(),
            MediaType::Playlist => self.typed_candidates::<Playlist>(),
            MediaType::Collection => self.typed_candidates::<Collection>(),
        }
    }

    /// Reference used when adding this item to a list.
    pub fn item_ref(&self) -> Result<ItemRef> {
        let mut candidates = self.key_candidates()?.into_iter();
        let key = candidates
            .next()
            .ok_or_else(|| Error::Internal(format!("no content key for {}", self.id)))?;
        Ok(ItemRef::new(self.id, key, self.title.clone()).with_aliases(candidates))
    }

    fn typed_candidates<T: MediaData>(&self) -> Result<Vec<ItemKey>> {
        let item = self.clone().into_typed::<T>()?;
        Ok(ItemKey::candidates(&item.key_parts()))
    }
}

// ---------------------------------------------------------------------------
// UserMediaData
// ---------------------------------------------------------------------------

/// Per-user state for one catalog item.
#[derive(Debug, Clone, Serialize)]
pub struct UserMediaData {
    pub id: UserDataId,
    pub user_id: UserId,
    pub item_id: MediaItemId,
    pub media_type: MediaType,
    pub is_favorite: bool,
    pub user_rating: Option<f64>,
    pub play_count: i64,
    pub position_secs: f64,
    pub completed: bool,
    pub last_played_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl UserMediaData {
    pub fn from_row(row: &rusqlite::Row) -> rusqlite::Result<Self> {
        Self::from_row_at(row, 0)
    }

    /// Decode starting at column `o`, for rows joined after other columns.
    pub fn from_row_at(row: &rusqlite::Row, o: usize) -> rusqlite::Result<Self> {
        Ok(Self {
            id: parse_id(row, o)?,
            user_id: parse_id(row, o + 1)?,
            item_id: parse_id(row, o + 2)?,
            media_type: parse_enum(row, o + 3)?,
            is_favorite: row.get::<_, i32>(o + 4)? != 0,
            user_rating: row.get(o + 5)?,
            play_count: row.get(o + 6)?,
            position_secs: row.get(o + 7)?,
            completed: row.get::<_, i32>(o + 8)? != 0,
            last_played_at: parse_opt_time(row, o + 9)?,
            updated_at: parse_time(row, o + 10)?,
        })
    }

    /// Default state for an item the user has never touched.
    pub fn empty(user_id: UserId, item_id: MediaItemId, media_type: MediaType) -> Self {
        Self {
            id: UserDataId::new(),
            user_id,
            item_id,
            media_type,
            is_favorite: false,
            user_rating: None,
            play_count: 0,
            position_secs: 0.0,
            completed: false,
            last_played_at: None,
            updated_at: Utc::now(),
        }
    }
}
