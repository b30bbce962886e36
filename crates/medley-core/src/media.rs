//! Media-domain types: kinds, client types, the generic [`MediaItem`] wrapper
//! and its typed payloads.
//!
//! Enums serialize in lowercase and implement `Display`/`FromStr` manually
//! for consistent string representation in URLs and database columns.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::ids::{ClientId, MediaItemId, UserId};
use crate::keys::{ItemKey, KeyParts};
use crate::lists::ItemList;
use crate::Error;

// ---------------------------------------------------------------------------
// MediaType
// ---------------------------------------------------------------------------

/// Kind of a media item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Movie,
    Series,
    Season,
    Episode,
    Track,
    Album,
    Artist,
    Playlist,
    Collection,
}

impl MediaType {
    pub const ALL: [MediaType; 9] = [
        Self::Movie,
        Self::Series,
        Self::Season,
        Self::Episode,
        Self::Track,
        Self::Album,
        Self::Artist,
        Self::Playlist,
        Self::Collection,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Movie => "movie",
            Self::Series => "series",
            Self::Season => "season",
            Self::Episode => "episode",
            Self::Track => "track",
            Self::Album => "album",
            Self::Artist => "artist",
            Self::Playlist => "playlist",
            Self::Collection => "collection",
        }
    }

    /// Whether items of this type carry an [`ItemList`].
    pub fn is_list(&self) -> bool {
        matches!(self, Self::Playlist | Self::Collection)
    }

    pub fn list_kind(&self) -> Option<ListKind> {
        match self {
            Self::Playlist => Some(ListKind::Playlist),
            Self::Collection => Some(ListKind::Collection),
            _ => None,
        }
    }

    /// Whether this is a music type.
    pub fn is_music(&self) -> bool {
        matches!(self, Self::Track | Self::Album | Self::Artist)
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MediaType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "movie" | "movies" => Ok(Self::Movie),
            "series" | "show" | "shows" => Ok(Self::Series),
            "season" | "seasons" => Ok(Self::Season),
            "episode" | "episodes" => Ok(Self::Episode),
            "track" | "tracks" | "song" | "songs" => Ok(Self::Track),
            "album" | "albums" => Ok(Self::Album),
            "artist" | "artists" => Ok(Self::Artist),
            "playlist" | "playlists" => Ok(Self::Playlist),
            "collection" | "collections" => Ok(Self::Collection),
            other => Err(Error::Validation(format!("unknown media type: {other}"))),
        }
    }
}

// ---------------------------------------------------------------------------
// ListKind
// ---------------------------------------------------------------------------

/// The media types that hold an ordered [`ItemList`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListKind {
    Playlist,
    Collection,
}

impl ListKind {
    pub fn media_type(&self) -> MediaType {
        match self {
            Self::Playlist => MediaType::Playlist,
            Self::Collection => MediaType::Collection,
        }
    }

    pub fn as_str(&self) -> &'static str {
        self.media_type().as_str()
    }
}

impl fmt::Display for ListKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// ClientType
// ---------------------------------------------------------------------------

/// External media server flavours medley can talk to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClientType {
    Jellyfin,
    Emby,
    Plex,
    Subsonic,
}

impl ClientType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Jellyfin => "jellyfin",
            Self::Emby => "emby",
            Self::Plex => "plex",
            Self::Subsonic => "subsonic",
        }
    }
}

impl fmt::Display for ClientType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ClientType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "jellyfin" => Ok(Self::Jellyfin),
            "emby" => Ok(Self::Emby),
            "plex" => Ok(Self::Plex),
            "subsonic" | "navidrome" => Ok(Self::Subsonic),
            other => Err(Error::Validation(format!("unknown client type: {other}"))),
        }
    }
}

// ---------------------------------------------------------------------------
// ExternalIds / SyncClients
// ---------------------------------------------------------------------------

/// Identifiers assigned by public metadata providers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExternalIds {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub imdb: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tmdb: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tvdb: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub musicbrainz: Option<String>,
}

impl ExternalIds {
    pub fn is_empty(&self) -> bool {
        self.imdb.is_none() && self.tmdb.is_none() && self.tvdb.is_none() && self.musicbrainz.is_none()
    }

    /// Look up an id by source name (`imdb`, `tmdb`, `tvdb`, `musicbrainz`/`mbid`).
    pub fn get(&self, source: &str) -> Option<&str> {
        match source.to_ascii_lowercase().as_str() {
            "imdb" => self.imdb.as_deref(),
            "tmdb" => self.tmdb.as_deref(),
            "tvdb" => self.tvdb.as_deref(),
            "musicbrainz" | "mbid" => self.musicbrainz.as_deref(),
            _ => None,
        }
    }

    /// Set an id by source name. Returns false for unknown sources.
    pub fn set(&mut self, source: &str, value: impl Into<String>) -> bool {
        let value = Some(value.into()).filter(|v| !v.is_empty());
        match source.to_ascii_lowercase().as_str() {
            "imdb" => self.imdb = value,
            "tmdb" => self.tmdb = value,
            "tvdb" => self.tvdb = value,
            "musicbrainz" | "mbid" => self.musicbrainz = value,
            _ => return false,
        }
        true
    }

    /// Fill ids that are missing here from `other`.
    pub fn merge(&mut self, other: &ExternalIds) {
        if self.imdb.is_none() {
            self.imdb.clone_from(&other.imdb);
        }
        if self.tmdb.is_none() {
            self.tmdb.clone_from(&other.tmdb);
        }
        if self.tvdb.is_none() {
            self.tvdb.clone_from(&other.tvdb);
        }
        if self.musicbrainz.is_none() {
            self.musicbrainz.clone_from(&other.musicbrainz);
        }
    }
}

/// Where a catalog item lives on one external client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncClient {
    pub client_id: ClientId,
    pub client_type: ClientType,
    pub item_id: String,
}

/// Cross-client ID mappings for one catalog item.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SyncClients(Vec<SyncClient>);

impl SyncClients {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the mapping for `client_id`. Returns true when
    /// something changed.
    pub fn add_or_update(
        &mut self,
        client_id: ClientId,
        client_type: ClientType,
        item_id: impl Into<String>,
    ) -> bool {
        let item_id = item_id.into();
        if let Some(existing) = self.0.iter_mut().find(|c| c.client_id == client_id) {
            if existing.item_id == item_id && existing.client_type == client_type {
                return false;
            }
            existing.item_id = item_id;
            existing.client_type = client_type;
            return true;
        }
        self.0.push(SyncClient {
            client_id,
            client_type,
            item_id,
        });
        true
    }

    pub fn item_id_for(&self, client_id: ClientId) -> Option<&str> {
        self.0
            .iter()
            .find(|c| c.client_id == client_id)
            .map(|c| c.item_id.as_str())
    }

    pub fn remove(&mut self, client_id: ClientId) -> bool {
        let before = self.0.len();
        self.0.retain(|c| c.client_id != client_id);
        self.0.len() != before
    }

    /// Merge another set of mappings, keeping existing entries.
    pub fn merge(&mut self, other: &SyncClients) {
        for c in &other.0 {
            if self.item_id_for(c.client_id).is_none() {
                self.0.push(c.clone());
            }
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &SyncClient> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

// ---------------------------------------------------------------------------
// ClientItem / ClientList
// ---------------------------------------------------------------------------

/// A media item as reported by an external client, before it is typed.
///
/// Adapters map every response shape into this record; typed payloads are
/// built from it via [`MediaData::from_client_item`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClientItem {
    /// Client-side identifier.
    pub id: String,
    pub media_type: Option<MediaType>,
    pub title: String,
    pub year: Option<i32>,
    pub overview: Option<String>,
    #[serde(default)]
    pub genres: Vec<String>,
    pub rating: Option<f64>,
    pub duration_secs: Option<u64>,
    #[serde(default)]
    pub external_ids: ExternalIds,
    pub added_at: Option<DateTime<Utc>>,
    /// Album for tracks, season for episodes, series for seasons.
    pub parent_id: Option<String>,
    pub parent_title: Option<String>,
    /// Artist for tracks/albums, series for episodes.
    pub grandparent_title: Option<String>,
    /// Track or episode number, season number for seasons.
    pub index: Option<u32>,
    /// Disc or season number.
    pub parent_index: Option<u32>,
    pub child_count: Option<u32>,
    /// Playlist/collection entry identifier when listed inside a list.
    pub entry_id: Option<String>,
    pub artwork: Option<String>,
}

impl ClientItem {
    /// Fields used to compute the content key.
    pub fn key_parts(&self) -> KeyParts<'_> {
        let media_type = self.media_type.unwrap_or(MediaType::Movie);
        let grandparent = self.grandparent_title.as_deref();
        let parent = self.parent_title.as_deref();
        // Must agree with the `creator`/`indices` of the typed payloads.
        let (creator, parent_index, index) = match media_type {
            MediaType::Track => (grandparent.or(parent), self.parent_index, self.index),
            MediaType::Album => (grandparent.or(parent), None, None),
            MediaType::Episode => (grandparent, self.parent_index, self.index),
            MediaType::Season => (parent.or(grandparent), None, self.index),
            _ => (None, None, None),
        };
        KeyParts {
            media_type,
            title: &self.title,
            year: self.year,
            creator,
            parent_index,
            index,
            external_ids: &self.external_ids,
        }
    }

    pub fn key(&self) -> ItemKey {
        ItemKey::from_parts(&self.key_parts())
    }
}

/// A playlist or collection as reported by an external client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientList {
    pub id: String,
    pub title: String,
    pub kind: ListKind,
    pub item_count: Option<u32>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// A page of results.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: Option<u64>,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, total: Option<u64>) -> Self {
        Self { items, total }
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            total: self.total,
        }
    }
}

/// Offset/limit page request.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PageRequest {
    pub offset: u32,
    pub limit: u32,
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            offset: 0,
            limit: 50,
        }
    }
}

// ---------------------------------------------------------------------------
// Payloads
// ---------------------------------------------------------------------------

/// Fields shared by every payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Details {
    pub description: Option<String>,
    pub genres: Vec<String>,
    pub rating: Option<f64>,
    pub duration_secs: Option<u64>,
    pub artwork: Option<String>,
    pub added_at: Option<DateTime<Utc>>,
}

impl Details {
    fn from_client_item(item: &ClientItem) -> Self {
        Self {
            description: item.overview.clone(),
            genres: item.genres.clone(),
            rating: item.rating,
            duration_secs: item.duration_secs,
            artwork: item.artwork.clone(),
            added_at: item.added_at,
        }
    }
}

/// Behaviour every typed payload of a [`MediaItem`] provides.
pub trait MediaData: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// The media type this payload represents.
    const MEDIA_TYPE: MediaType;

    fn details(&self) -> &Details;

    fn details_mut(&mut self) -> &mut Details;

    fn from_client_item(item: &ClientItem) -> Self;

    /// Artist, series or similar owner name used in content keys.
    fn creator(&self) -> Option<&str> {
        None
    }

    /// `(parent_index, index)` used in content keys.
    fn indices(&self) -> (Option<u32>, Option<u32>) {
        (None, None)
    }
}

/// Payloads that carry an ordered [`ItemList`].
pub trait ListData: MediaData {
    const KIND: ListKind;

    fn list(&self) -> &ItemList;

    fn list_mut(&mut self) -> &mut ItemList;

    fn with_list(details: Details, list: ItemList) -> Self;
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Movie {
    pub details: Details,
    pub tagline: Option<String>,
}

impl MediaData for Movie {
    const MEDIA_TYPE: MediaType = MediaType::Movie;

    fn details(&self) -> &Details {
        &self.details
    }

    fn details_mut(&mut self) -> &mut Details {
        &mut self.details
    }

    fn from_client_item(item: &ClientItem) -> Self {
        Self {
            details: Details::from_client_item(item),
            tagline: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Series {
    pub details: Details,
    pub season_count: Option<u32>,
    pub status: Option<String>,
}

impl MediaData for Series {
    const MEDIA_TYPE: MediaType = MediaType::Series;

    fn details(&self) -> &Details {
        &self.details
    }

    fn details_mut(&mut self) -> &mut Details {
        &mut self.details
    }

    fn from_client_item(item: &ClientItem) -> Self {
        Self {
            details: Details::from_client_item(item),
            season_count: item.child_count,
            status: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Season {
    pub details: Details,
    pub series_title: Option<String>,
    pub season_number: Option<u32>,
    pub episode_count: Option<u32>,
}

impl MediaData for Season {
    const MEDIA_TYPE: MediaType = MediaType::Season;

    fn details(&self) -> &Details {
        &self.details
    }

    fn details_mut(&mut self) -> &mut Details {
        &mut self.details
    }

    fn from_client_item(item: &ClientItem) -> Self {
        Self {
            details: Details::from_client_item(item),
            series_title: item.parent_title.clone().or_else(|| item.grandparent_title.clone()),
            season_number: item.index,
            episode_count: item.child_count,
        }
    }

    fn creator(&self) -> Option<&str> {
        self.series_title.as_deref()
    }

    fn indices(&self) -> (Option<u32>, Option<u32>) {
        (None, self.season_number)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Episode {
    pub details: Details,
    pub series_title: Option<String>,
    pub season_number: Option<u32>,
    pub episode_number: Option<u32>,
}

impl MediaData for Episode {
    const MEDIA_TYPE: MediaType = MediaType::Episode;

    fn details(&self) -> &Details {
        &self.details
    }

    fn details_mut(&mut self) -> &mut Details {
        &mut self.details
    }

    fn from_client_item(item: &ClientItem) -> Self {
        Self {
            details: Details::from_client_item(item),
            series_title: item.grandparent_title.clone(),
            season_number: item.parent_index,
            episode_number: item.index,
        }
    }

    fn creator(&self) -> Option<&str> {
        self.series_title.as_deref()
    }

    fn indices(&self) -> (Option<u32>, Option<u32>) {
        (self.season_number, self.episode_number)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Track {
    pub details: Details,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub track_number: Option<u32>,
    pub disc_number: Option<u32>,
}

impl MediaData for Track {
    const MEDIA_TYPE: MediaType = MediaType::Track;

    fn details(&self) -> &Details {
        &self.details
    }

    fn details_mut(&mut self) -> &mut Details {
        &mut self.details
    }

    fn from_client_item(item: &ClientItem) -> Self {
        Self {
            details: Details::from_client_item(item),
            artist: item.grandparent_title.clone(),
            album: item.parent_title.clone(),
            track_number: item.index,
            disc_number: item.parent_index,
        }
    }

    fn creator(&self) -> Option<&str> {
        self.artist.as_deref().or(self.album.as_deref())
    }

    fn indices(&self) -> (Option<u32>, Option<u32>) {
        (self.disc_number, self.track_number)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Album {
    pub details: Details,
    pub artist: Option<String>,
    pub track_count: Option<u32>,
}

impl MediaData for Album {
    const MEDIA_TYPE: MediaType = MediaType::Album;

    fn details(&self) -> &Details {
        &self.details
    }

    fn details_mut(&mut self) -> &mut Details {
        &mut self.details
    }

    fn from_client_item(item: &ClientItem) -> Self {
        Self {
            details: Details::from_client_item(item),
            artist: item.grandparent_title.clone().or_else(|| item.parent_title.clone()),
            track_count: item.child_count,
        }
    }

    fn creator(&self) -> Option<&str> {
        self.artist.as_deref()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Artist {
    pub details: Details,
    pub album_count: Option<u32>,
}

impl MediaData for Artist {
    const MEDIA_TYPE: MediaType = MediaType::Artist;

    fn details(&self) -> &Details {
        &self.details
    }

    fn details_mut(&mut self) -> &mut Details {
        &mut self.details
    }

    fn from_client_item(item: &ClientItem) -> Self {
        Self {
            details: Details::from_client_item(item),
            album_count: item.child_count,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Playlist {
    pub details: Details,
    pub list: ItemList,
}

impl MediaData for Playlist {
    const MEDIA_TYPE: MediaType = MediaType::Playlist;

    fn details(&self) -> &Details {
        &self.details
    }

    fn details_mut(&mut self) -> &mut Details {
        &mut self.details
    }

    fn from_client_item(item: &ClientItem) -> Self {
        Self {
            details: Details::from_client_item(item),
            list: ItemList::default(),
        }
    }
}

impl ListData for Playlist {
    const KIND: ListKind = ListKind::Playlist;

    fn list(&self) -> &ItemList {
        &self.list
    }

    fn list_mut(&mut self) -> &mut ItemList {
        &mut self.list
    }

    fn with_list(details: Details, list: ItemList) -> Self {
        Self { details, list }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Collection {
    pub details: Details,
    pub list: ItemList,
    pub collection_type: Option<String>,
}

impl MediaData for Collection {
    const MEDIA_TYPE: MediaType = MediaType::Collection;

    fn details(&self) -> &Details {
        &self.details
    }

    fn details_mut(&mut self) -> &mut Details {
        &mut self.details
    }

    fn from_client_item(item: &ClientItem) -> Self {
        Self {
            details: Details::from_client_item(item),
            list: ItemList::default(),
            collection_type: None,
        }
    }
}

impl ListData for Collection {
    const KIND: ListKind = ListKind::Collection;

    fn list(&self) -> &ItemList {
        &self.list
    }

    fn list_mut(&mut self) -> &mut ItemList {
        &mut self.list
    }

    fn with_list(details: Details, list: ItemList) -> Self {
        Self {
            details,
            list,
            collection_type: None,
        }
    }
}

// ---------------------------------------------------------------------------
// MediaItem
// ---------------------------------------------------------------------------

/// Generic catalog entry wrapping a typed payload plus cross-client mappings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(bound = "T: MediaData")]
pub struct MediaItem<T: MediaData> {
    pub id: MediaItemId,
    pub media_type: MediaType,
    pub title: String,
    pub release_year: Option<i32>,
    pub external_ids: ExternalIds,
    pub sync_clients: SyncClients,
    pub owner_id: Option<UserId>,
    pub data: T,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl<T: MediaData> MediaItem<T> {
    /// A fresh item with a new id and current timestamps.
    pub fn new(title: impl Into<String>, data: T) -> Self {
        let now = Utc::now();
        Self {
            id: MediaItemId::new(),
            media_type: T::MEDIA_TYPE,
            title: title.into(),
            release_year: None,
            external_ids: ExternalIds::default(),
            sync_clients: SyncClients::new(),
            owner_id: None,
            data,
            created_at: now,
            updated_at: now,
        }
    }

    /// Build a catalog item from a client record, mapping it to `client_id`.
    pub fn from_client_item(client_id: ClientId, client_type: ClientType, item: &ClientItem) -> Self {
        let mut media = Self::new(item.title.clone(), T::from_client_item(item));
        media.release_year = item.year;
        media.external_ids = item.external_ids.clone();
        media.sync_clients.add_or_update(client_id, client_type, item.id.clone());
        media
    }

    pub fn key_parts(&self) -> KeyParts<'_> {
        let (parent_index, index) = self.data.indices();
        KeyParts {
            media_type: self.media_type,
            title: &self.title,
            year: self.release_year,
            creator: self.data.creator(),
            parent_index,
            index,
            external_ids: &self.external_ids,
        }
    }

    /// Stable content key for cross-client matching.
    pub fn key(&self) -> ItemKey {
        ItemKey::from_parts(&self.key_parts())
    }

    /// Merge metadata from a fresher client record into this item. Returns
    /// true when anything changed.
    pub fn absorb_client_item(
        &mut self,
        client_id: ClientId,
        client_type: ClientType,
        item: &ClientItem,
    ) -> bool {
        let before_ids = self.external_ids.clone();
        self.external_ids.merge(&item.external_ids);
        let mut changed = before_ids != self.external_ids;
        changed |= self.sync_clients.add_or_update(client_id, client_type, item.id.clone());
        if self.release_year.is_none() && item.year.is_some() {
            self.release_year = item.year;
            changed = true;
        }
        let details = self.data.details_mut();
        if details.description.is_none() && item.overview.is_some() {
            details.description.clone_from(&item.overview);
            changed = true;
        }
        if details.genres.is_empty() && !item.genres.is_empty() {
            details.genres.clone_from(&item.genres);
            changed = true;
        }
        if details.rating.is_none() && item.rating.is_some() {
            details.rating = item.rating;
            changed = true;
        }
        if changed {
            self.updated_at = Utc::now();
        }
        changed
    }
}
