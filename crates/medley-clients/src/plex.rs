//! Plex Media Server adapter.
//!
//! Requests carry `X-Plex-Token` and ask for JSON. Library content lives in
//! sections; list items are addressed with `server://<machine id>/...`
//! URIs, so the server's machine identifier is fetched once and cached.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use medley_core::{
    ClientEntry, ClientId, ClientItem, ClientList, ClientSettings, ClientType, Error, ExternalIds,
    ListKind, MediaType, Page, PageRequest, Result,
};
use reqwest::RequestBuilder;
use serde::{Deserialize, Deserializer};
use tokio::sync::OnceCell;

use crate::client::{Capabilities, MediaClient, ServerInfo};
use crate::http::Http;

pub struct PlexClient {
    id: ClientId,
    http: Http,
    token: String,
    machine_id: OnceCell<String>,
}

impl PlexClient {
    pub(crate) fn new(id: ClientId, settings: &ClientSettings, http: Http) -> Self {
        Self {
            id,
            http,
            token: settings.api_key.clone().unwrap_or_default(),
            machine_id: OnceCell::new(),
        }
    }

    fn auth(&self, rb: RequestBuilder) -> RequestBuilder {
        rb.header("X-Plex-Token", &self.token)
            .header("X-Plex-Client-Identifier", "medley")
            .header("X-Plex-Product", "medley")
            .header("Accept", "application/json")
    }

    async fn container(&self, rb: RequestBuilder) -> Result<Container> {
        let resp: Envelope = self.http.json(self.auth(rb)).await?;
        Ok(resp.media_container)
    }

    async fn identity(&self) -> Result<Container> {
        self.container(self.http.get("/identity")).await
    }

    async fn machine_id(&self) -> Result<&str> {
        let id = self
            .machine_id
            .get_or_try_init(|| async {
                self.identity()
                    .await?
                    .machine_identifier
                    .ok_or_else(|| Error::upstream("plex", "identity response lacks machineIdentifier"))
            })
            .await?;
        Ok(id.as_str())
    }

    async fn item_uri(&self, item_ids: &[String]) -> Result<String> {
        let machine = self.machine_id().await?;
        Ok(format!(
            "server://{machine}/com.plexapp.plugins.library/library/metadata/{}",
            item_ids.join(",")
        ))
    }

    /// Library sections holding `media_type`.
    async fn sections(&self, media_type: MediaType) -> Result<Vec<Directory>> {
        let wanted = section_type(media_type);
        let c = self.container(self.http.get("/library/sections")).await?;
        Ok(c.directory.into_iter().filter(|d| Some(d.kind.as_str()) == wanted).collect())
    }

    fn to_client_item(&self, m: Metadata, hint: Option<MediaType>) -> ClientItem {
        let media_type = media_type_of(&m.kind).or(hint);
        let (parent_title, grandparent_title) = match media_type {
            // Plex reports an album's artist as its parent.
            Some(MediaType::Album) => (None, m.parent_title),
            _ => (m.parent_title, m.grandparent_title),
        };
        ClientItem {
            external_ids: external_ids(&m.guids),
            media_type,
            title: m.title,
            year: m.year,
            overview: m.summary.filter(|s| !s.is_empty()),
            genres: m.genres.into_iter().map(|g| g.tag).collect(),
            rating: m.audience_rating.or(m.rating),
            duration_secs: m.duration.map(|ms| ms / 1000),
            added_at: m.added_at.and_then(|t| DateTime::from_timestamp(t, 0)),
            parent_id: m.parent_rating_key,
            parent_title,
            grandparent_title,
            index: m.index,
            parent_index: m.parent_index,
            child_count: m.leaf_count.or(m.child_count),
            entry_id: m.playlist_item_id,
            artwork: m.thumb.map(|t| self.http.url(&t)),
            id: m.rating_key,
        }
    }

    fn to_client_list(m: Metadata, kind: ListKind) -> ClientList {
        ClientList {
            id: m.rating_key,
            title: m.title,
            kind,
            item_count: m.leaf_count.or(m.child_count),
            updated_at: m.updated_at.and_then(|t| DateTime::<Utc>::from_timestamp(t, 0)),
        }
    }

    async fn playlist_entry_ids(&self, list_id: &str, entries: &[ClientEntry]) -> Result<Vec<String>> {
        let mut ids: Vec<String> = entries.iter().filter_map(|e| e.entry_id.clone()).collect();
        if entries.iter().all(|e| e.entry_id.is_some()) {
            return Ok(ids);
        }
        let mut current = self.list_entries(ListKind::Playlist, list_id).await?;
        for entry in entries.iter().filter(|e| e.entry_id.is_none()) {
            if let Some(pos) = current
                .iter()
                .position(|c| c.id == entry.item_id && c.entry_id.as_ref().is_some_and(|id| !ids.contains(id)))
            {
                if let Some(entry_id) = current.remove(pos).entry_id {
                    ids.push(entry_id);
                }
            }
        }
        Ok(ids)
    }
}

/// Plex metadata type numbers used by `/library/sections/{key}/all?type=`.
fn type_number(media_type: MediaType) -> u8 {
    match media_type {
        MediaType::Movie => 1,
        MediaType::Series => 2,
        MediaType::Season => 3,
        MediaType::Episode => 4,
        MediaType::Artist => 8,
        MediaType::Album => 9,
        MediaType::Track => 10,
        MediaType::Playlist => 15,
        MediaType::Collection => 18,
    }
}

fn section_type(media_type: MediaType) -> Option<&'static str> {
    match media_type {
        MediaType::Movie => Some("movie"),
        MediaType::Series | MediaType::Season | MediaType::Episode => Some("show"),
        MediaType::Track | MediaType::Album | MediaType::Artist => Some("artist"),
        MediaType::Playlist | MediaType::Collection => None,
    }
}

fn media_type_of(kind: &str) -> Option<MediaType> {
    match kind {
        "movie" => Some(MediaType::Movie),
        "show" => Some(MediaType::Series),
        "season" => Some(MediaType::Season),
        "episode" => Some(MediaType::Episode),
        "artist" => Some(MediaType::Artist),
        "album" => Some(MediaType::Album),
        "track" => Some(MediaType::Track),
        "playlist" => Some(MediaType::Playlist),
        "collection" => Some(MediaType::Collection),
        _ => None,
    }
}

/// Parse `Guid` entries such as `imdb://tt0133093` or `tmdb://603`.
fn external_ids(guids: &[Guid]) -> ExternalIds {
    let mut ids = ExternalIds::default();
    for g in guids {
        if let Some((scheme, value)) = g.id.split_once("://") {
            let source = match scheme {
                "imdb" => "imdb",
                "tmdb" => "tmdb",
                "tvdb" => "tvdb",
                "mbid" | "musicbrainz" => "musicbrainz",
                _ => continue,
            };
            ids.set(source, value);
        }
    }
    ids
}

#[async_trait]
impl MediaClient for PlexClient {
    fn client_id(&self) -> ClientId {
        self.id
    }

    fn client_type(&self) -> ClientType {
        ClientType::Plex
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            media_types: vec![
                MediaType::Movie,
                MediaType::Series,
                MediaType::Season,
                MediaType::Episode,
                MediaType::Track,
                MediaType::Album,
                MediaType::Artist,
            ],
            playlists: true,
            collections: true,
        }
    }

    async fn test_connection(&self) -> Result<ServerInfo> {
        let c = self.identity().await?;
        Ok(ServerInfo {
            name: c.friendly_name.or(c.machine_identifier),
            version: c.version,
        })
    }

    /// Pages run across every matching section in section order.
    async fn list_items(&self, media_type: MediaType, page: PageRequest) -> Result<Page<ClientItem>> {
        let mut skip = u64::from(page.offset);
        let mut remaining = u64::from(page.limit);
        let mut total = 0u64;
        let mut items = Vec::new();

        for section in self.sections(media_type).await? {
            let rb = self
                .http
                .get(&format!("/library/sections/{}/all", section.key))
                .query(&[
                    ("type", type_number(media_type).to_string()),
                    ("X-Plex-Container-Start", skip.to_string()),
                    ("X-Plex-Container-Size", remaining.to_string()),
                ]);
            let c = self.container(rb).await?;
            let section_total = c.total_size.or(c.size).unwrap_or(c.metadata.len() as u64);
            total += section_total;

            let taken = c.metadata.len() as u64;
            items.extend(
                c.metadata
                    .into_iter()
                    .map(|m| self.to_client_item(m, Some(media_type))),
            );
            remaining = remaining.saturating_sub(taken);
            skip = skip.saturating_sub(section_total);
        }
        Ok(Page::new(items, Some(total)))
    }

    async fn get_item(&self, media_type: MediaType, id: &str) -> Result<ClientItem> {
        let c = self
            .container(self.http.get(&format!("/library/metadata/{id}")))
            .await?;
        let item = c
            .metadata
            .into_iter()
            .next()
            .map(|m| self.to_client_item(m, None))
            .filter(|i| i.media_type == Some(media_type))
            .ok_or_else(|| Error::not_found(media_type.as_str(), id))?;
        Ok(item)
    }

    async fn search(
        &self,
        query: &str,
        media_type: Option<MediaType>,
        limit: u32,
    ) -> Result<Vec<ClientItem>> {
        let rb = self
            .http
            .get("/hubs/search")
            .query(&[("query", query.to_string()), ("limit", limit.to_string())]);
        let c = self.container(rb).await?;
        let mut out: Vec<ClientItem> = c
            .hubs
            .into_iter()
            .flat_map(|h| h.metadata)
            .map(|m| self.to_client_item(m, None))
            .filter(|i| i.media_type.is_some())
            .filter(|i| media_type.map_or(true, |t| i.media_type == Some(t)))
            .collect();
        out.truncate(limit as usize);
        Ok(out)
    }

    async fn children(&self, parent_id: &str, child_type: MediaType) -> Result<Vec<ClientItem>> {
        let c = self
            .container(self.http.get(&format!("/library/metadata/{parent_id}/children")))
            .await?;
        Ok(c.metadata
            .into_iter()
            .map(|m| self.to_client_item(m, Some(child_type)))
            .filter(|i| i.media_type == Some(child_type))
            .collect())
    }

    async fn lists(&self, kind: ListKind) -> Result<Vec<ClientList>> {
        match kind {
            ListKind::Playlist => {
                let c = self.container(self.http.get("/playlists")).await?;
                Ok(c.metadata
                    .into_iter()
                    .filter(|m| !m.smart)
                    .map(|m| Self::to_client_list(m, kind))
                    .collect())
            }
            ListKind::Collection => {
                let all = self.container(self.http.get("/library/sections")).await?;
                let mut lists = Vec::new();
                for section in all.directory {
                    let c = self
                        .container(
                            self.http
                                .get(&format!("/library/sections/{}/collections", section.key)),
                        )
                        .await?;
                    lists.extend(
                        c.metadata
                            .into_iter()
                            .filter(|m| !m.smart)
                            .map(|m| Self::to_client_list(m, kind)),
                    );
                }
                Ok(lists)
            }
        }
    }

    async fn list_entries(&self, kind: ListKind, list_id: &str) -> Result<Vec<ClientItem>> {
        let path = match kind {
            ListKind::Playlist => format!("/playlists/{list_id}/items"),
            ListKind::Collection => format!("/library/collections/{list_id}/children"),
        };
        let c = self.container(self.http.get(&path)).await?;
        Ok(c.metadata
            .into_iter()
            .map(|m| self.to_client_item(m, None))
            .collect())
    }

    async fn create_list(
        &self,
        kind: ListKind,
        title: &str,
        item_type: Option<MediaType>,
        item_ids: &[String],
    ) -> Result<ClientList> {
        if item_ids.is_empty() {
            return Err(Error::Validation(format!(
                "plex cannot create an empty {kind}; add at least one item first"
            )));
        }
        let uri = self.item_uri(item_ids).await?;
        let item_type = item_type.unwrap_or(MediaType::Movie);
        let rb = match kind {
            ListKind::Playlist => {
                let playlist_type = if item_type.is_music() { "audio" } else { "video" };
                self.http.post("/playlists").query(&[
                    ("type", playlist_type.to_string()),
                    ("title", title.to_string()),
                    ("smart", "0".into()),
                    ("uri", uri),
                ])
            }
            ListKind::Collection => {
                let section = self
                    .sections(item_type)
                    .await?
                    .into_iter()
                    .next()
                    .ok_or_else(|| Error::Validation(format!("plex has no library section for {item_type}")))?;
                self.http.post("/library/collections").query(&[
                    ("type", type_number(item_type).to_string()),
                    ("title", title.to_string()),
                    ("smart", "0".into()),
                    ("sectionId", section.key),
                    ("uri", uri),
                ])
            }
        };
        let c = self.container(rb).await?;
        let created = c
            .metadata
            .into_iter()
            .next()
            .ok_or_else(|| Error::upstream("plex", format!("{kind} creation returned no metadata")))?;
        tracing::info!(client_id = %self.id, %kind, list_id = %created.rating_key, "Created list on client");
        let mut list = Self::to_client_list(created, kind);
        list.title = title.to_string();
        Ok(list)
    }

    async fn add_list_items(&self, kind: ListKind, list_id: &str, item_ids: &[String]) -> Result<()> {
        if item_ids.is_empty() {
            return Ok(());
        }
        let uri = self.item_uri(item_ids).await?;
        let path = match kind {
            ListKind::Playlist => format!("/playlists/{list_id}/items"),
            ListKind::Collection => format!("/library/collections/{list_id}/items"),
        };
        self.http
            .execute(self.auth(self.http.put(&path).query(&[("uri", uri)])))
            .await
    }

    async fn remove_list_items(
        &self,
        kind: ListKind,
        list_id: &str,
        entries: &[ClientEntry],
    ) -> Result<()> {
        let targets = match kind {
            ListKind::Playlist => self
                .playlist_entry_ids(list_id, entries)
                .await?
                .into_iter()
                .map(|entry| format!("/playlists/{list_id}/items/{entry}"))
                .collect::<Vec<_>>(),
            ListKind::Collection => entries
                .iter()
                .map(|e| format!("/library/collections/{list_id}/items/{}", e.item_id))
                .collect(),
        };
        for path in targets {
            self.http.execute(self.auth(self.http.delete(&path))).await?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(rename = "MediaContainer")]
    media_container: Container,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct Container {
    size: Option<u64>,
    total_size: Option<u64>,
    machine_identifier: Option<String>,
    friendly_name: Option<String>,
    version: Option<String>,
    #[serde(rename = "Metadata")]
    metadata: Vec<Metadata>,
    #[serde(rename = "Directory")]
    directory: Vec<Directory>,
    #[serde(rename = "Hub")]
    hubs: Vec<Hub>,
}

#[derive(Debug, Deserialize)]
struct Directory {
    key: String,
    #[serde(rename = "type", default)]
    kind: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Hub {
    #[serde(rename = "Metadata")]
    metadata: Vec<Metadata>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct Metadata {
    rating_key: String,
    #[serde(rename = "type")]
    kind: String,
    title: String,
    year: Option<i32>,
    summary: Option<String>,
    rating: Option<f64>,
    audience_rating: Option<f64>,
    /// Milliseconds.
    duration: Option<u64>,
    added_at: Option<i64>,
    updated_at: Option<i64>,
    parent_rating_key: Option<String>,
    parent_title: Option<String>,
    grandparent_title: Option<String>,
    index: Option<u32>,
    parent_index: Option<u32>,
    child_count: Option<u32>,
    leaf_count: Option<u32>,
    #[serde(rename = "playlistItemID", deserialize_with = "opt_string_or_number")]
    playlist_item_id: Option<String>,
    thumb: Option<String>,
    smart: bool,
    #[serde(rename = "Genre")]
    genres: Vec<Tag>,
    #[serde(rename = "Guid")]
    guids: Vec<Guid>,
}

#[derive(Debug, Deserialize)]
struct Tag {
    tag: String,
}

#[derive(Debug, Deserialize)]
struct Guid {
    id: String,
}

fn opt_string_or_number<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<Option<String>, D::Error> {
    Ok(match Option::<serde_json::Value>::deserialize(d)? {
        Some(serde_json::Value::String(s)) => Some(s),
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> PlexClient {
        let settings = ClientSettings {
            base_url: server.uri(),
            api_key: Some("plex-token".into()),
            ..Default::default()
        };
        let http = Http::new(reqwest::Client::new(), &server.uri(), "plex", 100);
        PlexClient::new(ClientId::new(), &settings, http)
    }

    async fn mount_identity(server: &MockServer) {
        Mock::given(method("GET"))
            .and(path("/identity"))
            .and(header("X-Plex-Token", "plex-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "MediaContainer": {"machineIdentifier": "m-123", "version": "1.40.0"}
            })))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn identity_and_connection() {
        let server = MockServer::start().await;
        mount_identity(&server).await;
        let info = client(&server).test_connection().await.unwrap();
        assert_eq!(info.name.as_deref(), Some("m-123"));
        assert_eq!(info.version.as_deref(), Some("1.40.0"));
    }

    #[tokio::test]
    async fn lists_movies_across_sections() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/library/sections"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "MediaContainer": {"Directory": [
                    {"key": "1", "type": "movie"},
                    {"key": "2", "type": "show"},
                    {"key": "3", "type": "movie"}
                ]}
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/library/sections/1/all"))
            .and(query_param("type", "1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "MediaContainer": {"totalSize": 1, "Metadata": [{
                    "ratingKey": "10", "type": "movie", "title": "The Matrix", "year": 1999,
                    "duration": 8160000, "addedAt": 1700000000,
                    "Genre": [{"tag": "Action"}],
                    "Guid": [{"id": "imdb://tt0133093"}, {"id": "tmdb://603"}]
                }]}
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/library/sections/3/all"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "MediaContainer": {"totalSize": 1, "Metadata": [{
                    "ratingKey": "20", "type": "movie", "title": "Heat", "year": 1995
                }]}
            })))
            .mount(&server)
            .await;

        let page = client(&server)
            .list_items(MediaType::Movie, PageRequest::default())
            .await
            .unwrap();
        assert_eq!(page.total, Some(2));
        assert_eq!(page.items.len(), 2);
        let matrix = &page.items[0];
        assert_eq!(matrix.duration_secs, Some(8160));
        assert_eq!(matrix.genres, vec!["Action"]);
        assert_eq!(matrix.external_ids.tmdb.as_deref(), Some("603"));
        assert_eq!(matrix.key().as_str(), "imdb:tt0133093");
        assert_eq!(page.items[1].id, "20");
    }

    #[tokio::test]
    async fn albums_take_artist_from_parent() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/library/metadata/7/children"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "MediaContainer": {"Metadata": [{
                    "ratingKey": "70", "type": "album", "title": "Kid A",
                    "parentTitle": "Radiohead", "parentRatingKey": "7", "year": 2000
                }]}
            })))
            .mount(&server)
            .await;

        let albums = client(&server).children("7", MediaType::Album).await.unwrap();
        assert_eq!(albums[0].grandparent_title.as_deref(), Some("Radiohead"));
        assert!(albums[0].parent_title.is_none());
    }

    #[tokio::test]
    async fn playlist_items_use_server_uri() {
        let server = MockServer::start().await;
        mount_identity(&server).await;
        Mock::given(method("PUT"))
            .and(path("/playlists/55/items"))
            .and(query_param(
                "uri",
                "server://m-123/com.plexapp.plugins.library/library/metadata/1,2",
            ))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"MediaContainer": {}})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/playlists/55/items"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "MediaContainer": {"Metadata": [
                    {"ratingKey": "1", "type": "track", "title": "One", "playlistItemID": 901},
                    {"ratingKey": "2", "type": "track", "title": "Two", "playlistItemID": 902}
                ]}
            })))
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/playlists/55/items/902"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let c = client(&server);
        c.add_list_items(ListKind::Playlist, "55", &["1".into(), "2".into()])
            .await
            .unwrap();
        let entries = c.list_entries(ListKind::Playlist, "55").await.unwrap();
        assert_eq!(entries[0].entry_id.as_deref(), Some("901"));
        c.remove_list_items(
            ListKind::Playlist,
            "55",
            &[ClientEntry { item_id: "2".into(), entry_id: None }],
        )
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn refuses_empty_playlist() {
        let server = MockServer::start().await;
        let err = client(&server)
            .create_list(ListKind::Playlist, "Empty", None, &[])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn parses_guids() {
        let ids = external_ids(&[
            Guid { id: "tvdb://81189".into() },
            Guid { id: "plex://movie/5d77".into() },
            Guid { id: "mbid://abc".into() },
        ]);
        assert_eq!(ids.tvdb.as_deref(), Some("81189"));
        assert_eq!(ids.musicbrainz.as_deref(), Some("abc"));
        assert!(ids.imdb.is_none());
    }
}
