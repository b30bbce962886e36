//! Catalog CRUD, filtered listing and client-item matching.
//!
//! Every media type lives in `media_items`; typed accessors filter on
//! `media_type` and decode the JSON payload into the matching `MediaData`.

use chrono::{DateTime, Utc};
use medley_core::keys::normalize_title;
use medley_core::{
    ClientId, ClientItem, ClientType, Error, ExternalIds, ItemKey, MediaData, MediaItem,
    MediaItemId, MediaType, Result, UserId,
};
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection};

use crate::models::MediaRecord;

const COLS: &str = "id, media_type, title, release_year, external_ids, sync_clients, owner_id,
    data, created_at, updated_at";

/// Column to order catalog listings by.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortField {
    #[default]
    Title,
    Year,
    Rating,
    Added,
}

impl SortField {
    /// Parse a `sort` query value; unknown values fall back to title.
    pub fn parse(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "year" | "release_year" => Self::Year,
            "rating" => Self::Rating,
            "added" | "created" | "created_at" | "recent" => Self::Added,
            _ => Self::Title,
        }
    }

    fn sql(&self) -> &'static str {
        match self {
            Self::Title => "sort_title",
            Self::Year => "release_year",
            Self::Rating => "json_extract(data, '$.details.rating')",
            Self::Added => "created_at",
        }
    }
}

/// Which rows the caller may see.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Visibility {
    /// No ownership filter.
    #[default]
    All,
    /// Unowned rows, rows owned by the user, and public lists.
    VisibleTo(UserId),
    /// Only rows owned by the user.
    OwnedBy(UserId),
}

/// Filters for [`search`].
#[derive(Debug, Clone, Default)]
pub struct MediaQuery {
    pub media_type: Option<MediaType>,
    /// Case-insensitive title substring.
    pub q: Option<String>,
    pub year: Option<i32>,
    pub genre: Option<String>,
    /// Only items mapped to this client.
    pub client_id: Option<ClientId>,
    pub created_since: Option<DateTime<Utc>>,
    pub visibility: Visibility,
    pub sort: SortField,
    pub desc: bool,
    pub limit: u32,
    pub offset: u32,
}

impl MediaQuery {
    pub fn for_type(media_type: MediaType) -> Self {
        Self {
            media_type: Some(media_type),
            limit: 50,
            ..Default::default()
        }
    }

    fn where_clause(&self) -> (String, Vec<Value>) {
        fn next(params: &mut Vec<Value>, v: Value) -> usize {
            params.push(v);
            params.len()
        }

        let mut clauses: Vec<String> = Vec::new();
        let mut params: Vec<Value> = Vec::new();

        if let Some(t) = self.media_type {
            let n = next(&mut params, Value::Text(t.as_str().into()));
            clauses.push(format!("media_type = ?{n}"));
        }
        if let Some(q) = self.q.as_ref().filter(|q| !q.trim().is_empty()) {
            let n = next(&mut params, Value::Text(format!("%{}%", q.trim())));
            clauses.push(format!("title LIKE ?{n}"));
        }
        if let Some(year) = self.year {
            let n = next(&mut params, Value::Integer(year.into()));
            clauses.push(format!("release_year = ?{n}"));
        }
        if let Some(ref genre) = self.genre {
            let n = next(&mut params, Value::Text(genre.clone()));
            clauses.push(format!(
                "EXISTS (SELECT 1 FROM json_each(media_items.data, '$.details.genres') g
                         WHERE lower(g.value) = lower(?{n}))"
            ));
        }
        if let Some(client_id) = self.client_id {
            let n = next(&mut params, Value::Text(client_id.to_string()));
            clauses.push(format!(
                "EXISTS (SELECT 1 FROM json_each(media_items.sync_clients) s
                         WHERE json_extract(s.value, '$.client_id') = ?{n})"
            ));
        }
        if let Some(since) = self.created_since {
            let n = next(&mut params, Value::Text(since.to_rfc3339()));
            clauses.push(format!("created_at >= ?{n}"));
        }
        match self.visibility {
            Visibility::All => {}
            Visibility::VisibleTo(user) => {
                let n = next(&mut params, Value::Text(user.to_string()));
                clauses.push(format!(
                    "(owner_id IS NULL OR owner_id = ?{n}
                      OR json_extract(data, '$.list.is_public') = 1)"
                ));
            }
            Visibility::OwnedBy(user) => {
                let n = next(&mut params, Value::Text(user.to_string()));
                clauses.push(format!("owner_id = ?{n}"));
            }
        }

        let sql = if clauses.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", clauses.join(" AND "))
        };
        (sql, params)
    }
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String> {
    serde_json::to_string(value).map_err(|e| Error::Internal(e.to_string()))
}

fn query_records(conn: &Connection, sql: &str, params: Vec<Value>) -> Result<Vec<MediaRecord>> {
    let mut stmt = conn.prepare(sql).map_err(|e| Error::database(e.to_string()))?;
    let rows = stmt
        .query_map(params_from_iter(params), MediaRecord::from_row)
        .map_err(|e| Error::database(e.to_string()))?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(rows)
}

fn typed<T: MediaData>(records: Vec<MediaRecord>) -> Result<Vec<MediaItem<T>>> {
    records.into_iter().map(MediaRecord::into_typed).collect()
}

// ---------------------------------------------------------------------------
// CRUD
// ---------------------------------------------------------------------------

/// Insert a new catalog item.
pub fn insert<T: MediaData>(conn: &Connection, item: &MediaItem<T>) -> Result<()> {
    let parts = item.key_parts();
    conn.execute(
        "INSERT INTO media_items (id, media_type, title, sort_title, release_year, content_key,
            fingerprint, external_ids, sync_clients, owner_id, data, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
        rusqlite::params![
            item.id.to_string(),
            item.media_type.as_str(),
            item.title,
            normalize_title(&item.title),
            item.release_year,
            ItemKey::from_parts(&parts).as_str(),
            ItemKey::fingerprint(&parts).as_str(),
            to_json(&item.external_ids)?,
            to_json(&item.sync_clients)?,
            item.owner_id.map(|o| o.to_string()),
            to_json(&item.data)?,
            item.created_at.to_rfc3339(),
            item.updated_at.to_rfc3339(),
        ],
    )
    .map_err(|e| Error::database(e.to_string()))?;
    Ok(())
}

/// Persist every mutable column of `item`. Returns false when the row is gone.
pub fn update<T: MediaData>(conn: &Connection, item: &MediaItem<T>) -> Result<bool> {
    let parts = item.key_parts();
    let n = conn
        .execute(
            "UPDATE media_items SET title = ?1, sort_title = ?2, release_year = ?3,
                content_key = ?4, fingerprint = ?5, external_ids = ?6, sync_clients = ?7,
                owner_id = ?8, data = ?9, updated_at = ?10
             WHERE id = ?11 AND media_type = ?12",
            rusqlite::params![
                item.title,
                normalize_title(&item.title),
                item.release_year,
                ItemKey::from_parts(&parts).as_str(),
                ItemKey::fingerprint(&parts).as_str(),
                to_json(&item.external_ids)?,
                to_json(&item.sync_clients)?,
                item.owner_id.map(|o| o.to_string()),
                to_json(&item.data)?,
                item.updated_at.to_rfc3339(),
                item.id.to_string(),
                item.media_type.as_str(),
            ],
        )
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(n > 0)
}

/// Load any catalog item untyped.
pub fn get_record(conn: &Connection, id: MediaItemId) -> Result<Option<MediaRecord>> {
    let q = format!("SELECT {COLS} FROM media_items WHERE id = ?1");
    match conn.query_row(&q, [id.to_string()], MediaRecord::from_row) {
        Ok(r) => Ok(Some(r)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(Error::database(e.to_string())),
    }
}

/// Load a typed item. Items of another type are reported as missing.
pub fn get<T: MediaData>(conn: &Connection, id: MediaItemId) -> Result<Option<MediaItem<T>>> {
    match get_record(conn, id)? {
        Some(r) if r.media_type == T::MEDIA_TYPE => Ok(Some(r.into_typed()?)),
        _ => Ok(None),
    }
}

/// Load several items preserving the order of `ids`; missing ids are skipped.
pub fn get_records(conn: &Connection, ids: &[MediaItemId]) -> Result<Vec<MediaRecord>> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }
    let placeholders: Vec<String> = (1..=ids.len()).map(|i| format!("?{i}")).collect();
    let q = format!(
        "SELECT {COLS} FROM media_items WHERE id IN ({})",
        placeholders.join(", ")
    );
    let params = ids.iter().map(|id| Value::Text(id.to_string())).collect();
    let mut by_id: std::collections::HashMap<MediaItemId, MediaRecord> = query_records(conn, &q, params)?
        .into_iter()
        .map(|r| (r.id, r))
        .collect();
    Ok(ids.iter().filter_map(|id| by_id.remove(id)).collect())
}

/// Delete an item of the given type. Returns true if a row was deleted.
pub fn delete(conn: &Connection, id: MediaItemId, media_type: MediaType) -> Result<bool> {
    let n = conn
        .execute(
            "DELETE FROM media_items WHERE id = ?1 AND media_type = ?2",
            rusqlite::params![id.to_string(), media_type.as_str()],
        )
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(n > 0)
}

// ---------------------------------------------------------------------------
// Listing
// ---------------------------------------------------------------------------

/// Filtered, sorted page of untyped records plus the total match count.
pub fn search(conn: &Connection, query: &MediaQuery) -> Result<(Vec<MediaRecord>, u64)> {
    let (where_sql, params) = query.where_clause();

    let count_sql = format!("SELECT COUNT(*) FROM media_items{where_sql}");
    let total: i64 = conn
        .query_row(&count_sql, params_from_iter(params.iter()), |r| r.get(0))
        .map_err(|e| Error::database(e.to_string()))?;

    let dir = if query.desc { "DESC" } else { "ASC" };
    let mut params = params;
    params.push(Value::Integer(query.limit.into()));
    let limit_n = params.len();
    params.push(Value::Integer(query.offset.into()));
    let offset_n = params.len();
    let sql = format!(
        "SELECT {COLS} FROM media_items{where_sql}
         ORDER BY {} {dir}, id ASC LIMIT ?{limit_n} OFFSET ?{offset_n}",
        query.sort.sql()
    );
    let rows = query_records(conn, &sql, params)?;
    Ok((rows, total.max(0) as u64))
}

/// Typed page of items of `T`'s media type.
pub fn list<T: MediaData>(conn: &Connection, query: &MediaQuery) -> Result<(Vec<MediaItem<T>>, u64)> {
    let mut query = query.clone();
    query.media_type = Some(T::MEDIA_TYPE);
    let (rows, total) = search(conn, &query)?;
    Ok((typed(rows)?, total))
}

/// Items created since `since`, newest first.
pub fn recent<T: MediaData>(
    conn: &Connection,
    since: DateTime<Utc>,
    limit: u32,
) -> Result<Vec<MediaItem<T>>> {
    let query = MediaQuery {
        created_since: Some(since),
        sort: SortField::Added,
        desc: true,
        limit,
        ..MediaQuery::for_type(T::MEDIA_TYPE)
    };
    Ok(list::<T>(conn, &query)?.0)
}

/// Column expression for a supported external id source.
fn external_id_column(source: &str) -> Result<&'static str> {
    match source.to_ascii_lowercase().as_str() {
        "imdb" => Ok("json_extract(external_ids, '$.imdb')"),
        "tmdb" => Ok("json_extract(external_ids, '$.tmdb')"),
        "tvdb" => Ok("json_extract(external_ids, '$.tvdb')"),
        "musicbrainz" | "mbid" => Ok("json_extract(external_ids, '$.musicbrainz')"),
        other => Err(Error::Validation(format!("unknown external id source: {other}"))),
    }
}

/// Untyped lookup by one external id.
pub fn find_records_by_external_id(
    conn: &Connection,
    media_type: MediaType,
    source: &str,
    value: &str,
) -> Result<Vec<MediaRecord>> {
    let column = external_id_column(source)?;
    let q = format!(
        "SELECT {COLS} FROM media_items WHERE media_type = ?1 AND {column} = ?2 ORDER BY created_at"
    );
    query_records(
        conn,
        &q,
        vec![
            Value::Text(media_type.as_str().into()),
            Value::Text(value.to_string()),
        ],
    )
}

/// Items of `T` carrying `source` id `value`.
pub fn find_by_external_id<T: MediaData>(
    conn: &Connection,
    source: &str,
    value: &str,
) -> Result<Vec<MediaItem<T>>> {
    typed(find_records_by_external_id(conn, T::MEDIA_TYPE, source, value)?)
}

/// Item mapped to `client_item_id` on `client_id`.
pub fn find_by_client_item(
    conn: &Connection,
    media_type: MediaType,
    client_id: ClientId,
    client_item_id: &str,
) -> Result<Option<MediaRecord>> {
    let q = format!(
        "SELECT {COLS} FROM media_items
         WHERE media_type = ?1 AND EXISTS (
            SELECT 1 FROM json_each(media_items.sync_clients) s
            WHERE json_extract(s.value, '$.client_id') = ?2
              AND json_extract(s.value, '$.item_id') = ?3)
         LIMIT 1"
    );
    let rows = query_records(
        conn,
        &q,
        vec![
            Value::Text(media_type.as_str().into()),
            Value::Text(client_id.to_string()),
            Value::Text(client_item_id.to_string()),
        ],
    )?;
    Ok(rows.into_iter().next())
}

/// First item sharing any external id with `ids`.
pub fn find_by_any_external_id(
    conn: &Connection,
    media_type: MediaType,
    ids: &ExternalIds,
) -> Result<Option<MediaRecord>> {
    let pairs = [
        ("imdb", ids.imdb.as_deref()),
        ("tmdb", ids.tmdb.as_deref()),
        ("tvdb", ids.tvdb.as_deref()),
        ("musicbrainz", ids.musicbrainz.as_deref()),
    ];
    for (source, value) in pairs {
        if let Some(value) = value.filter(|v| !v.is_empty()) {
            if let Some(found) = find_records_by_external_id(conn, media_type, source, value)?
                .into_iter()
                .next()
            {
                return Ok(Some(found));
            }
        }
    }
    Ok(None)
}

/// First item whose canonical key or fingerprint is one of `keys`.
pub fn find_by_keys(
    conn: &Connection,
    media_type: MediaType,
    keys: &[ItemKey],
) -> Result<Option<MediaRecord>> {
    for key in keys {
        let column = if key.is_fingerprint() { "fingerprint" } else { "content_key" };
        let q = format!(
            "SELECT {COLS} FROM media_items WHERE media_type = ?1 AND {column} = ?2
             ORDER BY created_at LIMIT 1"
        );
        let rows = query_records(
            conn,
            &q,
            vec![
                Value::Text(media_type.as_str().into()),
                Value::Text(key.as_str().to_string()),
            ],
        )?;
        if let Some(found) = rows.into_iter().next() {
            return Ok(Some(found));
        }
    }
    Ok(None)
}

/// Lists flagged for scheduled sync that have at least one linked client.
pub fn list_auto_sync(conn: &Connection, media_type: MediaType) -> Result<Vec<MediaRecord>> {
    let q = format!(
        "SELECT {COLS} FROM media_items
         WHERE media_type = ?1
           AND json_extract(data, '$.list.auto_sync') = 1
           AND json_array_length(data, '$.list.sync_clients') > 0
         ORDER BY updated_at"
    );
    query_records(conn, &q, vec![Value::Text(media_type.as_str().into())])
}

// ---------------------------------------------------------------------------
// Client import
// ---------------------------------------------------------------------------

/// What [`upsert_from_client`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Created,
    Updated,
    Unchanged,
}

/// Match a client record to the catalog and insert or merge it.
///
/// Matching order: existing mapping for this client, any shared external
/// id, then metadata fingerprint.
pub fn upsert_from_client<T: MediaData>(
    conn: &Connection,
    client_id: ClientId,
    client_type: ClientType,
    item: &ClientItem,
) -> Result<(MediaItem<T>, UpsertOutcome)> {
    let mut item = item.clone();
    item.media_type = Some(T::MEDIA_TYPE);

    let existing = match find_by_client_item(conn, T::MEDIA_TYPE, client_id, &item.id)? {
        Some(found) => Some(found),
        None => match find_by_any_external_id(conn, T::MEDIA_TYPE, &item.external_ids)? {
            Some(found) => Some(found),
            None => {
                let fp = ItemKey::fingerprint(&item.key_parts());
                find_by_keys(conn, T::MEDIA_TYPE, &[fp])?
            }
        },
    };

    match existing {
        Some(record) => {
            let mut media: MediaItem<T> = record.into_typed()?;
            if media.absorb_client_item(client_id, client_type, &item) {
                update(conn, &media)?;
                Ok((media, UpsertOutcome::Updated))
            } else {
                Ok((media, UpsertOutcome::Unchanged))
            }
        }
        None => {
            let media = MediaItem::<T>::from_client_item(client_id, client_type, &item);
            insert(conn, &media)?;
            Ok((media, UpsertOutcome::Created))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::init_memory_pool;
    use crate::queries::users;
    use chrono::Duration;
    use medley_core::{ItemList, Movie, Playlist, Track};

    fn movie(title: &str, year: i32, genres: &[&str], rating: f64) -> MediaItem<Movie> {
        let mut m = MediaItem::new(title, Movie::default());
        m.release_year = Some(year);
        m.data.details.genres = genres.iter().map(|g| g.to_string()).collect();
        m.data.details.rating = Some(rating);
        m
    }

    #[test]
    fn insert_get_update_delete() {
        let pool = init_memory_pool().unwrap();
        let conn = pool.get().unwrap();
        let mut m = movie("Heat", 1995, &["Crime"], 8.3);
        insert(&conn, &m).unwrap();

        let found: MediaItem<Movie> = get(&conn, m.id).unwrap().unwrap();
        assert_eq!(found.title, "Heat");
        assert_eq!(found.data.details.genres, vec!["Crime".to_string()]);
        assert!(get::<Track>(&conn, m.id).unwrap().is_none());

        m.data.tagline = Some("A Los Angeles crime saga".into());
        assert!(update(&conn, &m).unwrap());
        let found: MediaItem<Movie> = get(&conn, m.id).unwrap().unwrap();
        assert!(found.data.tagline.is_some());

        assert!(!delete(&conn, m.id, MediaType::Track).unwrap());
        assert!(delete(&conn, m.id, MediaType::Movie).unwrap());
        assert!(get_record(&conn, m.id).unwrap().is_none());
    }

    #[test]
    fn list_filters_and_sorts() {
        let pool = init_memory_pool().unwrap();
        let conn = pool.get().unwrap();
        insert(&conn, &movie("The Matrix", 1999, &["Sci-Fi", "Action"], 8.7)).unwrap();
        insert(&conn, &movie("Alien", 1979, &["Sci-Fi", "Horror"], 8.5)).unwrap();
        insert(&conn, &movie("Heat", 1995, &["Crime"], 8.3)).unwrap();

        let all = MediaQuery::for_type(MediaType::Movie);
        let (items, total) = list::<Movie>(&conn, &all).unwrap();
        assert_eq!(total, 3);
        let titles: Vec<_> = items.iter().map(|m| m.title.as_str()).collect();
        // sort_title strips the leading article
        assert_eq!(titles, ["Alien", "Heat", "The Matrix"]);

        let scifi = MediaQuery {
            genre: Some("sci-fi".into()),
            sort: SortField::Year,
            desc: true,
            ..all.clone()
        };
        let (items, total) = list::<Movie>(&conn, &scifi).unwrap();
        assert_eq!(total, 2);
        assert_eq!(items[0].title, "The Matrix");

        let q = MediaQuery {
            q: Some("ea".into()),
            ..all.clone()
        };
        assert_eq!(list::<Movie>(&conn, &q).unwrap().1, 1);

        let paged = MediaQuery {
            limit: 1,
            offset: 1,
            sort: SortField::Rating,
            ..all
        };
        let (items, total) = list::<Movie>(&conn, &paged).unwrap();
        assert_eq!(total, 3);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].title, "Alien");
    }

    #[test]
    fn recent_respects_window() {
        let pool = init_memory_pool().unwrap();
        let conn = pool.get().unwrap();
        let mut old = movie("Old", 1950, &[], 5.0);
        old.created_at = Utc::now() - Duration::days(30);
        insert(&conn, &old).unwrap();
        insert(&conn, &movie("New", 2024, &[], 5.0)).unwrap();

        let items = recent::<Movie>(&conn, Utc::now() - Duration::days(7), 10).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].title, "New");
    }

    #[test]
    fn external_id_lookup() {
        let pool = init_memory_pool().unwrap();
        let conn = pool.get().unwrap();
        let mut m = movie("The Matrix", 1999, &[], 8.7);
        m.external_ids.imdb = Some("tt0133093".into());
        insert(&conn, &m).unwrap();

        let found = find_by_external_id::<Movie>(&conn, "imdb", "tt0133093").unwrap();
        assert_eq!(found.len(), 1);
        assert!(find_by_external_id::<Movie>(&conn, "anidb", "1").is_err());
    }

    #[test]
    fn upsert_matches_mapping_then_ids_then_fingerprint() {
        let pool = init_memory_pool().unwrap();
        let conn = pool.get().unwrap();
        let jf = ClientId::new();
        let plex = ClientId::new();

        let mut incoming = ClientItem {
            id: "jf-1".into(),
            title: "The Matrix".into(),
            year: Some(1999),
            ..Default::default()
        };
        let (created, outcome) =
            upsert_from_client::<Movie>(&conn, jf, ClientType::Jellyfin, &incoming).unwrap();
        assert_eq!(outcome, UpsertOutcome::Created);

        // Same client, same id.
        let (_, outcome) =
            upsert_from_client::<Movie>(&conn, jf, ClientType::Jellyfin, &incoming).unwrap();
        assert_eq!(outcome, UpsertOutcome::Unchanged);

        // Another client, no ids: fingerprint match.
        incoming.id = "plex-9".into();
        incoming.title = "Matrix".into();
        let (merged, outcome) =
            upsert_from_client::<Movie>(&conn, plex, ClientType::Plex, &incoming).unwrap();
        assert_eq!(outcome, UpsertOutcome::Updated);
        assert_eq!(merged.id, created.id);
        assert_eq!(merged.sync_clients.item_id_for(plex), Some("plex-9"));

        let found = find_by_client_item(&conn, MediaType::Movie, plex, "plex-9")
            .unwrap()
            .unwrap();
        assert_eq!(found.id, created.id);
    }

    #[test]
    fn visibility_and_auto_sync_lists() {
        let pool = init_memory_pool().unwrap();
        let conn = pool.get().unwrap();
        let alice = users::create_user(&conn, "alice", "h", "user").unwrap();
        let bob = users::create_user(&conn, "bob", "h", "user").unwrap();

        let mut private = MediaItem::new("Private", Playlist::default());
        private.owner_id = Some(alice.id);
        insert(&conn, &private).unwrap();

        let mut list = ItemList::new();
        list.is_public = true;
        list.auto_sync = true;
        list.link_client(ClientId::new(), "remote");
        let mut public = MediaItem::new("Public", Playlist { list, ..Default::default() });
        public.owner_id = Some(alice.id);
        insert(&conn, &public).unwrap();

        let bobs_view = MediaQuery {
            visibility: Visibility::VisibleTo(bob.id),
            ..MediaQuery::for_type(MediaType::Playlist)
        };
        let (items, _) = super::list::<Playlist>(&conn, &bobs_view).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].title, "Public");

        let alices = MediaQuery {
            visibility: Visibility::OwnedBy(alice.id),
            ..MediaQuery::for_type(MediaType::Playlist)
        };
        assert_eq!(super::list::<Playlist>(&conn, &alices).unwrap().1, 2);

        let auto = list_auto_sync(&conn, MediaType::Playlist).unwrap();
        assert_eq!(auto.len(), 1);
        assert_eq!(auto[0].id, public.id);
    }

    #[test]
    fn get_records_keeps_order() {
        let pool = init_memory_pool().unwrap();
        let conn = pool.get().unwrap();
        let a = movie("A", 2000, &[], 1.0);
        let b = movie("B", 2001, &[], 1.0);
        insert(&conn, &a).unwrap();
        insert(&conn, &b).unwrap();
        let rows = get_records(&conn, &[b.id, MediaItemId::new(), a.id]).unwrap();
        let ids: Vec<_> = rows.iter().map(|r| r.id).collect();
        assert_eq!(ids, [b.id, a.id]);
    }
}
