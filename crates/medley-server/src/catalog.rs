//! Catalog access over the database for sync and client import.

use async_trait::async_trait;
use medley_core::{
    Album, Artist, ClientId, ClientItem, ClientType, Episode, Error, ItemKey, MediaData, MediaItem,
    MediaItemId, MediaType, Movie, Result, Season, Series, Track,
};
use medley_db::models::MediaRecord;
use medley_db::pool::DbPool;
use medley_db::queries::media_items::{self, UpsertOutcome};
use medley_sync::{Catalog, CatalogEntry};
use rusqlite::Connection;

/// [`Catalog`] backed by the `media_items` table.
#[derive(Clone)]
pub struct DbCatalog {
    db: DbPool,
}

impl DbCatalog {
    pub fn new(db: DbPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl Catalog for DbCatalog {
    async fn upsert_client_item(
        &self,
        client_id: ClientId,
        client_type: ClientType,
        item: &ClientItem,
    ) -> Result<CatalogEntry> {
        let conn = medley_db::pool::get_conn(&self.db)?;
        let media_type = item
            .media_type
            .ok_or_else(|| Error::Validation(format!("client item {} has no media type", item.id)))?;
        upsert_client_item(&conn, media_type, client_id, client_type, item).map(|(entry, _)| entry)
    }

    async fn get(&self, item_id: MediaItemId) -> Result<Option<CatalogEntry>> {
        let conn = medley_db::pool::get_conn(&self.db)?;
        match media_items::get_record(&conn, item_id)? {
            Some(record) => Ok(Some(record_entry(&record)?)),
            None => Ok(None),
        }
    }
}

/// Match or insert the catalog item for `item`, treating it as `media_type`.
pub fn upsert_client_item(
    conn: &Connection,
    media_type: MediaType,
    client_id: ClientId,
    client_type: ClientType,
    item: &ClientItem,
) -> Result<(CatalogEntry, UpsertOutcome)> {
    fn typed<T: MediaData>(
        conn: &Connection,
        client_id: ClientId,
        client_type: ClientType,
        item: &ClientItem,
    ) -> Result<(CatalogEntry, UpsertOutcome)> {
        let (media, outcome) =
            media_items::upsert_from_client::<T>(conn, client_id, client_type, item)?;
        Ok((item_entry(&media), outcome))
    }

    match media_type {
        MediaType::Movie => typed::<Movie>(conn, client_id, client_type, item),
        MediaType::Series => typed::<Series>(conn, client_id, client_type, item),
        MediaType::Season => typed::<Season>(conn, client_id, client_type, item),
        MediaType::Episode => typed::<Episode>(conn, client_id, client_type, item),
        MediaType::Track => typed::<Track>(conn, client_id, client_type, item),
        MediaType::Album => typed::<Album>(conn, client_id, client_type, item),
        MediaType::Artist => typed::<Artist>(conn, client_id, client_type, item),
        MediaType::Playlist | MediaType::Collection => Err(Error::Validation(format!(
            "{media_type} items cannot be imported into the catalog"
        ))),
    }
}

fn item_entry<T: MediaData>(media: &MediaItem<T>) -> CatalogEntry {
    CatalogEntry {
        item_id: media.id,
        media_type: media.media_type,
        title: media.title.clone(),
        keys: ItemKey::candidates(&media.key_parts()),
        sync_clients: media.sync_clients.clone(),
    }
}

pub fn record_entry(record: &MediaRecord) -> Result<CatalogEntry> {
    Ok(CatalogEntry {
        item_id: record.id,
        media_type: record.media_type,
        title: record.title.clone(),
        keys: record.key_candidates()?,
        sync_clients: record.sync_clients.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use medley_db::pool::init_memory_pool;

    fn track(id: &str) -> ClientItem {
        ClientItem {
            id: id.into(),
            media_type: Some(MediaType::Track),
            title: "Teardrop".into(),
            grandparent_title: Some("Massive Attack".into()),
            parent_title: Some("Mezzanine".into()),
            index: Some(3),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn upsert_matches_across_clients() {
        let catalog = DbCatalog::new(init_memory_pool().unwrap());
        let (a, b) = (ClientId::new(), ClientId::new());

        let first = catalog.upsert_client_item(a, ClientType::Plex, &track("p1")).await.unwrap();
        let second = catalog
            .upsert_client_item(b, ClientType::Subsonic, &track("s9"))
            .await
            .unwrap();
        assert_eq!(first.item_id, second.item_id);
        assert_eq!(second.sync_clients.item_id_for(a), Some("p1"));
        assert_eq!(second.sync_clients.item_id_for(b), Some("s9"));
        assert_eq!(second.keys, first.keys);

        let fetched = catalog.get(first.item_id).await.unwrap().unwrap();
        assert_eq!(fetched.title, "Teardrop");
        assert_eq!(fetched.keys, first.keys);
        assert!(catalog.get(MediaItemId::new()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn lists_are_not_catalog_items() {
        let catalog = DbCatalog::new(init_memory_pool().unwrap());
        let mut item = track("x");
        item.media_type = Some(MediaType::Playlist);
        let err = catalog
            .upsert_client_item(ClientId::new(), ClientType::Plex, &item)
            .await
            .unwrap_err();
        assert_eq!(err.http_status(), 400);
    }
}
