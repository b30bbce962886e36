//! The adapter trait every media server implementation provides.

use async_trait::async_trait;
use medley_core::{
    ClientEntry, ClientId, ClientItem, ClientList, ClientType, Error, ItemKey, ListKind,
    MediaType, Page, PageRequest, Result,
};
use serde::{Deserialize, Serialize};

/// What a connected server can do.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    pub media_types: Vec<MediaType>,
    pub playlists: bool,
    pub collections: bool,
}

impl Capabilities {
    pub fn supports(&self, media_type: MediaType) -> bool {
        self.media_types.contains(&media_type)
    }

    pub fn supports_lists(&self, kind: ListKind) -> bool {
        match kind {
            ListKind::Playlist => self.playlists,
            ListKind::Collection => self.collections,
        }
    }
}

/// Result of a successful connection test.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerInfo {
    pub name: Option<String>,
    pub version: Option<String>,
}

/// A catalog item to locate on a client.
#[derive(Debug, Clone)]
pub struct ItemQuery {
    pub media_type: MediaType,
    pub title: String,
    /// Every key the item is known under.
    pub keys: Vec<ItemKey>,
}

impl ItemQuery {
    /// Whether `item` is the same content as this query.
    pub fn matches(&self, item: &ClientItem) -> bool {
        if item.media_type.is_some_and(|t| t != self.media_type) {
            return false;
        }
        ItemKey::candidates(&item.key_parts())
            .iter()
            .any(|k| self.keys.contains(k))
    }
}

/// A connection to one external media server.
///
/// List operations are optional and fail with [`Error::Unsupported`] unless
/// the adapter overrides them.
#[async_trait]
pub trait MediaClient: Send + Sync {
    fn client_id(&self) -> ClientId;

    fn client_type(&self) -> ClientType;

    fn capabilities(&self) -> Capabilities;

    async fn test_connection(&self) -> Result<ServerInfo>;

    async fn list_items(&self, media_type: MediaType, page: PageRequest) -> Result<Page<ClientItem>>;

    async fn get_item(&self, media_type: MediaType, id: &str) -> Result<ClientItem>;

    async fn search(
        &self,
        query: &str,
        media_type: Option<MediaType>,
        limit: u32,
    ) -> Result<Vec<ClientItem>>;

    /// Direct children of `parent_id` (seasons of a series, episodes of a
    /// season, albums of an artist, tracks of an album).
    async fn children(&self, parent_id: &str, child_type: MediaType) -> Result<Vec<ClientItem>>;

    async fn lists(&self, kind: ListKind) -> Result<Vec<ClientList>> {
        Err(unsupported(self.client_type(), kind, "listing"))
    }

    /// Current contents of a list in client order, `entry_id` populated.
    async fn list_entries(&self, kind: ListKind, _list_id: &str) -> Result<Vec<ClientItem>> {
        Err(unsupported(self.client_type(), kind, "reading"))
    }

    async fn create_list(
        &self,
        kind: ListKind,
        _title: &str,
        _item_type: Option<MediaType>,
        _item_ids: &[String],
    ) -> Result<ClientList> {
        Err(unsupported(self.client_type(), kind, "creating"))
    }

    async fn add_list_items(&self, kind: ListKind, _list_id: &str, _item_ids: &[String]) -> Result<()> {
        Err(unsupported(self.client_type(), kind, "adding to"))
    }

    async fn remove_list_items(
        &self,
        kind: ListKind,
        _list_id: &str,
        _entries: &[ClientEntry],
    ) -> Result<()> {
        Err(unsupported(self.client_type(), kind, "removing from"))
    }

    /// Locate a catalog item on this client by title search and key match.
    async fn find_item(&self, query: &ItemQuery) -> Result<Option<ClientItem>> {
        if !self.capabilities().supports(query.media_type) || query.title.trim().is_empty() {
            return Ok(None);
        }
        let hits = self.search(&query.title, Some(query.media_type), 25).await?;
        Ok(hits.into_iter().find(|item| query.matches(item)))
    }
}

fn unsupported(client_type: ClientType, kind: ListKind, action: &str) -> Error {
    Error::Unsupported(format!("{client_type} does not support {action} {kind}s"))
}
