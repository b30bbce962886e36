//! Jellyfin and Emby adapter.
//!
//! Both speak the MediaBrowser REST API and authenticate with the
//! `X-Emby-Token` header. Library queries are user-scoped, so the adapter
//! resolves a user id on first use when none is configured (first
//! administrator, else first user).

use std::collections::HashMap;

use async_trait::async_trait;
use medley_core::{
    ClientEntry, ClientId, ClientItem, ClientList, ClientSettings, ClientType, Error, ExternalIds,
    ListKind, MediaType, Page, PageRequest, Result,
};
use reqwest::RequestBuilder;
use serde::Deserialize;
use tokio::sync::OnceCell;

use crate::client::{Capabilities, MediaClient, ServerInfo};
use crate::http::Http;
use crate::parse_timestamp;

const FIELDS: &str = "ProviderIds,Genres,Overview,DateCreated,ProductionYear,ChildCount";
const TICKS_PER_SECOND: u64 = 10_000_000;

pub struct JellyfinClient {
    id: ClientId,
    flavour: ClientType,
    http: Http,
    token: String,
    user_id: OnceCell<String>,
}

impl JellyfinClient {
    pub(crate) fn new(id: ClientId, flavour: ClientType, settings: &ClientSettings, http: Http) -> Self {
        let user_id = OnceCell::new();
        if let Some(uid) = settings.user_id.as_deref().filter(|u| !u.is_empty()) {
            let _ = user_id.set(uid.to_string());
        }
        Self {
            id,
            flavour,
            http,
            token: settings.api_key.clone().unwrap_or_default(),
            user_id,
        }
    }

    fn auth(&self, rb: RequestBuilder) -> RequestBuilder {
        rb.header("X-Emby-Token", &self.token)
            .header("Accept", "application/json")
    }

    async fn user_id(&self) -> Result<&str> {
        let uid = self
            .user_id
            .get_or_try_init(|| async {
                let users: Vec<UserDto> = self.http.json(self.auth(self.http.get("/Users"))).await?;
                let chosen = users
                    .iter()
                    .find(|u| u.policy.as_ref().is_some_and(|p| p.is_administrator))
                    .or_else(|| users.first())
                    .ok_or_else(|| Error::upstream(self.http.label(), "server has no users"))?;
                tracing::debug!(client_id = %self.id, user = %chosen.name, "Resolved library user");
                Ok::<_, Error>(chosen.id.clone())
            })
            .await?;
        Ok(uid.as_str())
    }

    async fn query_items(&self, params: &[(&str, String)]) -> Result<ItemsResponse> {
        let uid = self.user_id().await?;
        let rb = self.http.get(&format!("/Users/{uid}/Items")).query(params);
        self.http.json(self.auth(rb)).await
    }

    fn to_client_item(&self, item: BaseItem, hint: Option<MediaType>) -> ClientItem {
        let media_type = item.item_type.as_deref().and_then(media_type_of).or(hint);
        let artwork = item
            .image_tags
            .contains_key("Primary")
            .then(|| self.http.url(&format!("/Items/{}/Images/Primary", item.id)));
        let artist = item.album_artist.clone().or_else(|| item.artists.first().cloned());

        let (parent_id, parent_title, grandparent_title) = match media_type {
            Some(MediaType::Episode) => (
                item.season_id.clone().or(item.parent_id.clone()),
                item.season_name.clone(),
                item.series_name.clone(),
            ),
            Some(MediaType::Season) => (
                item.series_id.clone().or(item.parent_id.clone()),
                item.series_name.clone(),
                None,
            ),
            Some(MediaType::Track) => (item.album_id.clone(), item.album.clone(), artist),
            Some(MediaType::Album) => (item.parent_id.clone(), None, artist),
            _ => (item.parent_id.clone(), None, None),
        };

        ClientItem {
            external_ids: external_ids(&item.provider_ids, media_type),
            media_type,
            title: item.name,
            year: item.production_year,
            overview: item.overview,
            genres: item.genres,
            rating: item.community_rating,
            duration_secs: item.run_time_ticks.map(|t| t / TICKS_PER_SECOND),
            added_at: item.date_created.as_deref().and_then(parse_timestamp),
            parent_id,
            parent_title,
            grandparent_title,
            index: item.index_number,
            parent_index: item.parent_index_number,
            child_count: item.child_count,
            entry_id: item.playlist_item_id,
            artwork,
            id: item.id,
        }
    }

    fn to_client_list(&self, item: BaseItem, kind: ListKind) -> ClientList {
        ClientList {
            id: item.id,
            title: item.name,
            kind,
            item_count: item.child_count,
            updated_at: item
                .date_last_media_added
                .as_deref()
                .or(item.date_created.as_deref())
                .and_then(parse_timestamp),
        }
    }
}

fn item_type_name(media_type: MediaType) -> &'static str {
    match media_type {
        MediaType::Movie => "Movie",
        MediaType::Series => "Series",
        MediaType::Season => "Season",
        MediaType::Episode => "Episode",
        MediaType::Track => "Audio",
        MediaType::Album => "MusicAlbum",
        MediaType::Artist => "MusicArtist",
        MediaType::Playlist => "Playlist",
        MediaType::Collection => "BoxSet",
    }
}

fn media_type_of(name: &str) -> Option<MediaType> {
    MediaType::ALL.into_iter().find(|t| item_type_name(*t) == name)
}

fn external_ids(provider_ids: &HashMap<String, String>, media_type: Option<MediaType>) -> ExternalIds {
    let lookup = |key: &str| {
        provider_ids
            .iter()
            .find(|(k, v)| k.eq_ignore_ascii_case(key) && !v.is_empty())
            .map(|(_, v)| v.clone())
    };
    let mbid_key = match media_type {
        Some(MediaType::Track) => "MusicBrainzTrack",
        Some(MediaType::Album) => "MusicBrainzAlbum",
        Some(MediaType::Artist) => "MusicBrainzArtist",
        _ => "MusicBrainz",
    };
    ExternalIds {
        imdb: lookup("Imdb"),
        tmdb: lookup("Tmdb"),
        tvdb: lookup("Tvdb"),
        musicbrainz: lookup(mbid_key),
    }
}

#[async_trait]
impl MediaClient for JellyfinClient {
    fn client_id(&self) -> ClientId {
        self.id
    }

    fn client_type(&self) -> ClientType {
        self.flavour
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
        let info: SystemInfo = self
            .http
            .json(self.auth(self.http.get("/System/Info")))
            .await?;
        Ok(ServerInfo {
            name: info.server_name,
            version: info.version,
        })
    }

    async fn list_items(&self, media_type: MediaType, page: PageRequest) -> Result<Page<ClientItem>> {
        let resp = self
            .query_items(&[
                ("IncludeItemTypes", item_type_name(media_type).to_string()),
                ("Recursive", "true".into()),
                ("Fields", FIELDS.into()),
                ("SortBy", "SortName".into()),
                ("SortOrder", "Ascending".into()),
                ("StartIndex", page.offset.to_string()),
                ("Limit", page.limit.to_string()),
            ])
            .await?;
        let total = resp.total_record_count;
        let items = resp
            .items
            .into_iter()
            .map(|i| self.to_client_item(i, Some(media_type)))
            .collect();
        Ok(Page::new(items, total))
    }

    async fn get_item(&self, media_type: MediaType, id: &str) -> Result<ClientItem> {
        let uid = self.user_id().await?;
        let rb = self
            .http
            .get(&format!("/Users/{uid}/Items/{id}"))
            .query(&[("Fields", FIELDS)]);
        let item: BaseItem = self.http.json(self.auth(rb)).await?;
        let item = self.to_client_item(item, None);
        if item.media_type != Some(media_type) {
            return Err(Error::not_found(media_type.as_str(), id));
        }
        Ok(item)
    }

    async fn search(
        &self,
        query: &str,
        media_type: Option<MediaType>,
        limit: u32,
    ) -> Result<Vec<ClientItem>> {
        let types = match media_type {
            Some(t) => item_type_name(t).to_string(),
            None => self
                .capabilities()
                .media_types
                .into_iter()
                .map(item_type_name)
                .collect::<Vec<_>>()
                .join(","),
        };
        let resp = self
            .query_items(&[
                ("SearchTerm", query.to_string()),
                ("IncludeItemTypes", types),
                ("Recursive", "true".into()),
                ("Fields", FIELDS.into()),
                ("Limit", limit.to_string()),
            ])
            .await?;
        Ok(resp
            .items
            .into_iter()
            .map(|i| self.to_client_item(i, media_type))
            .collect())
    }

    async fn children(&self, parent_id: &str, child_type: MediaType) -> Result<Vec<ClientItem>> {
        let resp = match child_type {
            MediaType::Season => {
                let uid = self.user_id().await?;
                let rb = self
                    .http
                    .get(&format!("/Shows/{parent_id}/Seasons"))
                    .query(&[("UserId", uid), ("Fields", FIELDS)]);
                self.http.json::<ItemsResponse>(self.auth(rb)).await?
            }
            MediaType::Album => {
                self.query_items(&[
                    ("ArtistIds", parent_id.to_string()),
                    ("IncludeItemTypes", "MusicAlbum".into()),
                    ("Recursive", "true".into()),
                    ("Fields", FIELDS.into()),
                ])
                .await?
            }
            other => {
                self.query_items(&[
                    ("ParentId", parent_id.to_string()),
                    ("IncludeItemTypes", item_type_name(other).to_string()),
                    ("Fields", FIELDS.into()),
                    ("SortBy", "ParentIndexNumber,IndexNumber,SortName".into()),
                ])
                .await?
            }
        };
        Ok(resp
            .items
            .into_iter()
            .map(|i| self.to_client_item(i, Some(child_type)))
            .collect())
    }

    async fn lists(&self, kind: ListKind) -> Result<Vec<ClientList>> {
        let resp = self
            .query_items(&[
                ("IncludeItemTypes", item_type_name(kind.media_type()).to_string()),
                ("Recursive", "true".into()),
                ("Fields", "ChildCount,DateCreated,DateLastMediaAdded".into()),
            ])
            .await?;
        Ok(resp
            .items
            .into_iter()
            .map(|i| self.to_client_list(i, kind))
            .collect())
    }

    async fn list_entries(&self, kind: ListKind, list_id: &str) -> Result<Vec<ClientItem>> {
        let resp = match kind {
            ListKind::Playlist => {
                let uid = self.user_id().await?;
                let rb = self
                    .http
                    .get(&format!("/Playlists/{list_id}/Items"))
                    .query(&[("UserId", uid), ("Fields", FIELDS)]);
                self.http.json::<ItemsResponse>(self.auth(rb)).await?
            }
            ListKind::Collection => {
                self.query_items(&[("ParentId", list_id.to_string()), ("Fields", FIELDS.into())])
                    .await?
            }
        };
        Ok(resp
            .items
            .into_iter()
            .map(|i| self.to_client_item(i, None))
            .collect())
    }

    async fn create_list(
        &self,
        kind: ListKind,
        title: &str,
        item_type: Option<MediaType>,
        item_ids: &[String],
    ) -> Result<ClientList> {
        let created: CreatedDto = match kind {
            ListKind::Playlist => {
                let uid = self.user_id().await?;
                let media_type = if item_type.is_some_and(|t| t.is_music()) { "Audio" } else { "Video" };
                let body = serde_json::json!({
                    "Name": title,
                    "Ids": item_ids,
                    "UserId": uid,
                    "MediaType": media_type,
                });
                self.http
                    .json(self.auth(self.http.post("/Playlists").json(&body)))
                    .await?
            }
            ListKind::Collection => {
                let rb = self
                    .http
                    .post("/Collections")
                    .query(&[("Name", title.to_string()), ("Ids", item_ids.join(","))]);
                self.http.json(self.auth(rb)).await?
            }
        };
        tracing::info!(client_id = %self.id, %kind, list_id = %created.id, "Created list on client");
        Ok(ClientList {
            id: created.id,
            title: title.to_string(),
            kind,
            item_count: Some(item_ids.len() as u32),
            updated_at: None,
        })
    }

    async fn add_list_items(&self, kind: ListKind, list_id: &str, item_ids: &[String]) -> Result<()> {
        if item_ids.is_empty() {
            return Ok(());
        }
        let rb = match kind {
            ListKind::Playlist => {
                let uid = self.user_id().await?;
                self.http
                    .post(&format!("/Playlists/{list_id}/Items"))
                    .query(&[("Ids", item_ids.join(",")), ("UserId", uid.to_string())])
            }
            ListKind::Collection => self
                .http
                .post(&format!("/Collections/{list_id}/Items"))
                .query(&[("Ids", item_ids.join(","))]),
        };
        self.http.execute(self.auth(rb)).await
    }

    async fn remove_list_items(
        &self,
        kind: ListKind,
        list_id: &str,
        entries: &[ClientEntry],
    ) -> Result<()> {
        if entries.is_empty() {
            return Ok(());
        }
        let rb = match kind {
            ListKind::Playlist => {
                let entry_ids = self.resolve_entry_ids(list_id, entries).await?;
                if entry_ids.is_empty() {
                    return Ok(());
                }
                self.http
                    .delete(&format!("/Playlists/{list_id}/Items"))
                    .query(&[("EntryIds", entry_ids.join(","))])
            }
            ListKind::Collection => {
                let ids: Vec<&str> = entries.iter().map(|e| e.item_id.as_str()).collect();
                self.http
                    .delete(&format!("/Collections/{list_id}/Items"))
                    .query(&[("Ids", ids.join(","))])
            }
        };
        self.http.execute(self.auth(rb)).await
    }
}

impl JellyfinClient {
    /// Playlist removal needs entry ids; look up any the caller lacks.
    async fn resolve_entry_ids(&self, list_id: &str, entries: &[ClientEntry]) -> Result<Vec<String>> {
        let mut ids: Vec<String> = entries.iter().filter_map(|e| e.entry_id.clone()).collect();
        let missing: Vec<&ClientEntry> = entries.iter().filter(|e| e.entry_id.is_none()).collect();
        if missing.is_empty() {
            return Ok(ids);
        }
        let mut current = self.list_entries(ListKind::Playlist, list_id).await?;
        for entry in missing {
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

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct SystemInfo {
    server_name: Option<String>,
    version: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct UserDto {
    id: String,
    #[serde(default)]
    name: String,
    policy: Option<UserPolicy>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct UserPolicy {
    #[serde(default)]
    is_administrator: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct CreatedDto {
    id: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct ItemsResponse {
    items: Vec<BaseItem>,
    total_record_count: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct BaseItem {
    id: String,
    name: String,
    #[serde(rename = "Type")]
    item_type: Option<String>,
    production_year: Option<i32>,
    overview: Option<String>,
    genres: Vec<String>,
    community_rating: Option<f64>,
    run_time_ticks: Option<u64>,
    provider_ids: HashMap<String, String>,
    date_created: Option<String>,
    date_last_media_added: Option<String>,
    parent_id: Option<String>,
    season_id: Option<String>,
    series_id: Option<String>,
    series_name: Option<String>,
    season_name: Option<String>,
    album: Option<String>,
    album_id: Option<String>,
    album_artist: Option<String>,
    artists: Vec<String>,
    index_number: Option<u32>,
    parent_index_number: Option<u32>,
    child_count: Option<u32>,
    playlist_item_id: Option<String>,
    image_tags: HashMap<String, String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer, user_id: Option<&str>) -> JellyfinClient {
        let settings = ClientSettings {
            base_url: server.uri(),
            api_key: Some("secret".into()),
            user_id: user_id.map(String::from),
            ..Default::default()
        };
        let http = Http::new(reqwest::Client::new(), &server.uri(), "jellyfin", 100);
        JellyfinClient::new(ClientId::new(), ClientType::Jellyfin, &settings, http)
    }

    #[tokio::test]
    async fn test_connection_sends_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/System/Info"))
            .and(header("X-Emby-Token", "secret"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ServerName": "den", "Version": "10.9.0"
            })))
            .mount(&server)
            .await;

        let info = client(&server, Some("u1")).test_connection().await.unwrap();
        assert_eq!(info.name.as_deref(), Some("den"));
        assert_eq!(info.version.as_deref(), Some("10.9.0"));
    }

    #[tokio::test]
    async fn resolves_admin_user_once() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/Users"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"Id": "viewer", "Name": "kid", "Policy": {"IsAdministrator": false}},
                {"Id": "boss", "Name": "admin", "Policy": {"IsAdministrator": true}}
            ])))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/Users/boss/Items"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "Items": [], "TotalRecordCount": 0
            })))
            .mount(&server)
            .await;

        let c = client(&server, None);
        c.list_items(MediaType::Movie, PageRequest::default()).await.unwrap();
        c.list_items(MediaType::Series, PageRequest::default()).await.unwrap();
    }

    #[tokio::test]
    async fn maps_episodes() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/Users/u1/Items"))
            .and(query_param("IncludeItemTypes", "Episode"))
            .and(query_param("StartIndex", "0"))
            .and(query_param("Limit", "50"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "Items": [{
                    "Id": "ep1",
                    "Name": "Pilot",
                    "Type": "Episode",
                    "ProductionYear": 2008,
                    "RunTimeTicks": 34_800_000_000u64,
                    "ProviderIds": {"Tvdb": "349232", "Imdb": "tt0959621"},
                    "SeriesName": "Breaking Bad",
                    "SeasonName": "Season 1",
                    "SeasonId": "s1",
                    "IndexNumber": 1,
                    "ParentIndexNumber": 1,
                    "DateCreated": "2023-04-01T10:00:00.0000000Z",
                    "ImageTags": {"Primary": "abc"}
                }],
                "TotalRecordCount": 62
            })))
            .mount(&server)
            .await;

        let page = client(&server, Some("u1"))
            .list_items(MediaType::Episode, PageRequest::default())
            .await
            .unwrap();
        assert_eq!(page.total, Some(62));
        let ep = &page.items[0];
        assert_eq!(ep.media_type, Some(MediaType::Episode));
        assert_eq!(ep.duration_secs, Some(3480));
        assert_eq!(ep.parent_id.as_deref(), Some("s1"));
        assert_eq!(ep.grandparent_title.as_deref(), Some("Breaking Bad"));
        assert_eq!(ep.external_ids.imdb.as_deref(), Some("tt0959621"));
        assert!(ep.added_at.is_some());
        assert!(ep.artwork.as_deref().unwrap().ends_with("/Items/ep1/Images/Primary"));
        assert_eq!(ep.key().as_str(), "imdb:tt0959621");
    }

    #[tokio::test]
    async fn get_item_rejects_wrong_type() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/Users/u1/Items/x"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "Id": "x", "Name": "Heat", "Type": "Movie"
            })))
            .mount(&server)
            .await;

        let c = client(&server, Some("u1"));
        assert_eq!(c.get_item(MediaType::Movie, "x").await.unwrap().title, "Heat");
        let err = c.get_item(MediaType::Series, "x").await.unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));
    }

    #[tokio::test]
    async fn playlist_lifecycle() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/Playlists"))
            .and(body_partial_json(json!({"Name": "Road trip", "Ids": ["a", "b"], "UserId": "u1"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"Id": "pl1"})))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/Playlists/pl1/Items"))
            .and(query_param("Ids", "c"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/Playlists/pl1/Items"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "Items": [
                    {"Id": "a", "Name": "A", "Type": "Audio", "PlaylistItemId": "e1"},
                    {"Id": "b", "Name": "B", "Type": "Audio", "PlaylistItemId": "e2"}
                ]
            })))
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/Playlists/pl1/Items"))
            .and(query_param("EntryIds", "e2"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let c = client(&server, Some("u1"));
        let list = c
            .create_list(ListKind::Playlist, "Road trip", Some(MediaType::Track), &["a".into(), "b".into()])
            .await
            .unwrap();
        assert_eq!(list.id, "pl1");
        c.add_list_items(ListKind::Playlist, "pl1", &["c".into()]).await.unwrap();

        let entries = c.list_entries(ListKind::Playlist, "pl1").await.unwrap();
        assert_eq!(entries[1].entry_id.as_deref(), Some("e2"));

        let missing_entry = ClientEntry { item_id: "b".into(), entry_id: None };
        c.remove_list_items(ListKind::Playlist, "pl1", &[missing_entry]).await.unwrap();
    }

    #[test]
    fn type_names_round_trip() {
        for t in MediaType::ALL {
            assert_eq!(media_type_of(item_type_name(t)), Some(t));
        }
        assert_eq!(media_type_of("Folder"), None);
    }
}
