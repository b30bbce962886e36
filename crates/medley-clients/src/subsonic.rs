//! Subsonic-compatible adapter (Navidrome, Airsonic, Gonic and friends).
//!
//! Music only. Every call is `GET /rest/<method>.view` with the credential
//! parameters and `f=json`; failures come back as HTTP 200 with
//! `status: "failed"` inside the `subsonic-response` envelope.

use async_trait::async_trait;
use medley_core::{
    ClientEntry, ClientId, ClientItem, ClientList, ClientSettings, ClientType, Error, ExternalIds,
    ListKind, MediaType, Page, PageRequest, Result,
};
use serde::Deserialize;

use crate::client::{Capabilities, MediaClient, ServerInfo};
use crate::http::Http;
use crate::parse_timestamp;

const API_VERSION: &str = "1.16.1";
const CLIENT_NAME: &str = "medley";
/// Largest page `getAlbumList2` accepts.
const MAX_ALBUM_PAGE: u32 = 500;

pub struct SubsonicClient {
    id: ClientId,
    http: Http,
    username: String,
    password: String,
}

type Params = Vec<(&'static str, String)>;

impl SubsonicClient {
    pub(crate) fn new(id: ClientId, settings: &ClientSettings, http: Http) -> Self {
        Self {
            id,
            http,
            username: settings.username.clone().unwrap_or_default(),
            password: settings.password.clone().unwrap_or_default(),
        }
    }

    async fn call(&self, method: &str, params: Params) -> Result<Body> {
        let mut query: Params = vec![
            ("u", self.username.clone()),
            ("p", format!("enc:{}", hex::encode(&self.password))),
            ("v", API_VERSION.into()),
            ("c", CLIENT_NAME.into()),
            ("f", "json".into()),
        ];
        query.extend(params);

        let rb = self.http.get(&format!("/rest/{method}.view")).query(&query);
        let envelope: Envelope = self.http.json(rb).await?;
        let body = envelope.response;
        if body.status == "ok" {
            return Ok(body);
        }
        let (code, message) = body
            .error
            .map(|e| (e.code, e.message))
            .unwrap_or((0, "unknown error".into()));
        tracing::debug!(client_id = %self.id, method, code, %message, "Subsonic call failed");
        Err(match code {
            70 => Error::not_found("subsonic resource", message),
            40 | 41 => Error::upstream("subsonic", format!("credentials rejected: {message}")),
            _ => Error::upstream("subsonic", format!("{method} failed ({code}): {message}")),
        })
    }

    fn require_music(media_type: MediaType) -> Result<()> {
        if media_type.is_music() {
            Ok(())
        } else {
            Err(Error::Unsupported(format!("subsonic does not serve {media_type}s")))
        }
    }

    async fn playlist(&self, list_id: &str) -> Result<PlaylistDto> {
        self.call("getPlaylist", vec![("id", list_id.to_string())])
            .await?
            .playlist
            .ok_or_else(|| Error::not_found("playlist", list_id))
    }
}

fn song_item(s: SongDto) -> ClientItem {
    ClientItem {
        id: s.id,
        media_type: Some(MediaType::Track),
        title: s.title,
        year: s.year,
        genres: s.genre.into_iter().collect(),
        duration_secs: s.duration,
        external_ids: mbid(s.music_brainz_id),
        added_at: s.created.as_deref().and_then(parse_timestamp),
        parent_id: s.album_id,
        parent_title: s.album,
        grandparent_title: s.artist,
        index: s.track,
        parent_index: s.disc_number,
        ..Default::default()
    }
}

fn album_item(a: AlbumDto) -> ClientItem {
    ClientItem {
        id: a.id,
        media_type: Some(MediaType::Album),
        title: a.name,
        year: a.year,
        genres: a.genre.into_iter().collect(),
        duration_secs: a.duration,
        external_ids: mbid(a.music_brainz_id),
        added_at: a.created.as_deref().and_then(parse_timestamp),
        parent_id: a.artist_id,
        grandparent_title: a.artist,
        child_count: a.song_count,
        ..Default::default()
    }
}

fn artist_item(a: ArtistDto) -> ClientItem {
    ClientItem {
        id: a.id,
        media_type: Some(MediaType::Artist),
        title: a.name,
        external_ids: mbid(a.music_brainz_id),
        child_count: a.album_count,
        ..Default::default()
    }
}

fn mbid(id: Option<String>) -> ExternalIds {
    ExternalIds {
        musicbrainz: id.filter(|s| !s.is_empty()),
        ..Default::default()
    }
}

/// Map entries to playlist indices against the current contents.
///
/// An `entry_id` is the index observed when the entry was listed; it is
/// only trusted while the song at that index is still the same one.
fn removal_indices(current: &[SongDto], entries: &[ClientEntry]) -> Vec<usize> {
    let mut taken = vec![false; current.len()];
    let mut indices = Vec::new();
    for entry in entries {
        let hinted = entry
            .entry_id
            .as_deref()
            .and_then(|e| e.parse::<usize>().ok())
            .filter(|&i| i < current.len() && !taken[i] && current[i].id == entry.item_id);
        let found = hinted.or_else(|| {
            current
                .iter()
                .enumerate()
                .position(|(i, s)| !taken[i] && s.id == entry.item_id)
        });
        if let Some(i) = found {
            taken[i] = true;
            indices.push(i);
        }
    }
    indices.sort_unstable();
    indices
}

#[async_trait]
impl MediaClient for SubsonicClient {
    fn client_id(&self) -> ClientId {
        self.id
    }

    fn client_type(&self) -> ClientType {
        ClientType::Subsonic
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            media_types: vec![MediaType::Track, MediaType::Album, MediaType::Artist],
            playlists: true,
            collections: false,
        }
    }

    async fn test_connection(&self) -> Result<ServerInfo> {
        let body = self.call("ping", Vec::new()).await?;
        Ok(ServerInfo {
            name: body.server_type,
            version: body.server_version.or(body.version),
        })
    }

    async fn list_items(&self, media_type: MediaType, page: PageRequest) -> Result<Page<ClientItem>> {
        Self::require_music(media_type)?;
        match media_type {
            MediaType::Album => {
                let body = self
                    .call(
                        "getAlbumList2",
                        vec![
                            ("type", "alphabeticalByName".into()),
                            ("size", page.limit.min(MAX_ALBUM_PAGE).to_string()),
                            ("offset", page.offset.to_string()),
                        ],
                    )
                    .await?;
                let albums = body.album_list2.unwrap_or_default().album;
                Ok(Page::new(albums.into_iter().map(album_item).collect(), None))
            }
            MediaType::Track => {
                let body = self
                    .call(
                        "search3",
                        vec![
                            ("query", String::new()),
                            ("songCount", page.limit.to_string()),
                            ("songOffset", page.offset.to_string()),
                            ("albumCount", "0".into()),
                            ("artistCount", "0".into()),
                        ],
                    )
                    .await?;
                let songs = body.search_result3.unwrap_or_default().song;
                Ok(Page::new(songs.into_iter().map(song_item).collect(), None))
            }
            _ => {
                let body = self.call("getArtists", Vec::new()).await?;
                let all: Vec<ArtistDto> = body
                    .artists
                    .unwrap_or_default()
                    .index
                    .into_iter()
                    .flat_map(|i| i.artist)
                    .collect();
                let total = all.len() as u64;
                let items = all
                    .into_iter()
                    .skip(page.offset as usize)
                    .take(page.limit as usize)
                    .map(artist_item)
                    .collect();
                Ok(Page::new(items, Some(total)))
            }
        }
    }

    async fn get_item(&self, media_type: MediaType, id: &str) -> Result<ClientItem> {
        Self::require_music(media_type)?;
        let params = vec![("id", id.to_string())];
        let item = match media_type {
            MediaType::Track => self.call("getSong", params).await?.song.map(song_item),
            MediaType::Album => self.call("getAlbum", params).await?.album.map(album_item),
            _ => self.call("getArtist", params).await?.artist.map(artist_item),
        };
        item.ok_or_else(|| Error::not_found(media_type.as_str(), id))
    }

    async fn search(
        &self,
        query: &str,
        media_type: Option<MediaType>,
        limit: u32,
    ) -> Result<Vec<ClientItem>> {
        if let Some(t) = media_type {
            if !t.is_music() {
                return Ok(Vec::new());
            }
        }
        let count = |t: MediaType| {
            if media_type.map_or(true, |m| m == t) {
                limit.to_string()
            } else {
                "0".to_string()
            }
        };
        let body = self
            .call(
                "search3",
                vec![
                    ("query", query.to_string()),
                    ("songCount", count(MediaType::Track)),
                    ("albumCount", count(MediaType::Album)),
                    ("artistCount", count(MediaType::Artist)),
                ],
            )
            .await?;
        let r = body.search_result3.unwrap_or_default();
        let mut items: Vec<ClientItem> = r.artist.into_iter().map(artist_item).collect();
        items.extend(r.album.into_iter().map(album_item));
        items.extend(r.song.into_iter().map(song_item));
        Ok(items)
    }

    async fn children(&self, parent_id: &str, child_type: MediaType) -> Result<Vec<ClientItem>> {
        let params = vec![("id", parent_id.to_string())];
        match child_type {
            MediaType::Album => {
                let artist = self.call("getArtist", params).await?.artist.unwrap_or_default();
                Ok(artist.album.into_iter().map(album_item).collect())
            }
            MediaType::Track => {
                let album = self.call("getAlbum", params).await?.album.unwrap_or_default();
                Ok(album.song.into_iter().map(song_item).collect())
            }
            other => Err(Error::Unsupported(format!("subsonic has no {other} children"))),
        }
    }

    async fn lists(&self, kind: ListKind) -> Result<Vec<ClientList>> {
        if kind == ListKind::Collection {
            return Err(Error::Unsupported("subsonic does not support collections".into()));
        }
        let body = self.call("getPlaylists", Vec::new()).await?;
        Ok(body
            .playlists
            .unwrap_or_default()
            .playlist
            .into_iter()
            .map(|p| p.into_client_list())
            .collect())
    }

    async fn list_entries(&self, kind: ListKind, list_id: &str) -> Result<Vec<ClientItem>> {
        if kind == ListKind::Collection {
            return Err(Error::Unsupported("subsonic does not support collections".into()));
        }
        let playlist = self.playlist(list_id).await?;
        Ok(playlist
            .entry
            .into_iter()
            .enumerate()
            .map(|(i, s)| {
                let mut item = song_item(s);
                item.entry_id = Some(i.to_string());
                item
            })
            .collect())
    }

    async fn create_list(
        &self,
        kind: ListKind,
        title: &str,
        _item_type: Option<MediaType>,
        item_ids: &[String],
    ) -> Result<ClientList> {
        if kind == ListKind::Collection {
            return Err(Error::Unsupported("subsonic does not support collections".into()));
        }
        let mut params: Params = vec![("name", title.to_string())];
        params.extend(item_ids.iter().map(|id| ("songId", id.clone())));
        let body = self.call("createPlaylist", params).await?;
        let created = body
            .playlist
            .ok_or_else(|| Error::upstream("subsonic", "createPlaylist returned no playlist"))?;
        tracing::info!(client_id = %self.id, list_id = %created.id, "Created playlist on client");
        Ok(created.into_client_list())
    }

    async fn add_list_items(&self, kind: ListKind, list_id: &str, item_ids: &[String]) -> Result<()> {
        if kind == ListKind::Collection {
            return Err(Error::Unsupported("subsonic does not support collections".into()));
        }
        if item_ids.is_empty() {
            return Ok(());
        }
        let mut params: Params = vec![("playlistId", list_id.to_string())];
        params.extend(item_ids.iter().map(|id| ("songIdToAdd", id.clone())));
        self.call("updatePlaylist", params).await.map(|_| ())
    }

    async fn remove_list_items(
        &self,
        kind: ListKind,
        list_id: &str,
        entries: &[ClientEntry],
    ) -> Result<()> {
        if kind == ListKind::Collection {
            return Err(Error::Unsupported("subsonic does not support collections".into()));
        }
        if entries.is_empty() {
            return Ok(());
        }
        let current = self.playlist(list_id).await?;
        let indices = removal_indices(&current.entry, entries);
        if indices.is_empty() {
            return Ok(());
        }
        let mut params: Params = vec![("playlistId", list_id.to_string())];
        params.extend(indices.iter().map(|i| ("songIndexToRemove", i.to_string())));
        self.call("updatePlaylist", params).await.map(|_| ())
    }
}

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(rename = "subsonic-response")]
    response: Body,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct Body {
    status: String,
    version: Option<String>,
    #[serde(rename = "type")]
    server_type: Option<String>,
    server_version: Option<String>,
    error: Option<ApiError>,
    album_list2: Option<AlbumList>,
    search_result3: Option<SearchResult>,
    artists: Option<ArtistsIndex>,
    artist: Option<ArtistDto>,
    album: Option<AlbumDto>,
    song: Option<SongDto>,
    playlists: Option<Playlists>,
    playlist: Option<PlaylistDto>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    code: i32,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct AlbumList {
    album: Vec<AlbumDto>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SearchResult {
    artist: Vec<ArtistDto>,
    album: Vec<AlbumDto>,
    song: Vec<SongDto>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ArtistsIndex {
    index: Vec<IndexEntry>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct IndexEntry {
    artist: Vec<ArtistDto>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct ArtistDto {
    id: String,
    name: String,
    album_count: Option<u32>,
    music_brainz_id: Option<String>,
    album: Vec<AlbumDto>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct AlbumDto {
    id: String,
    name: String,
    artist: Option<String>,
    artist_id: Option<String>,
    year: Option<i32>,
    genre: Option<String>,
    song_count: Option<u32>,
    duration: Option<u64>,
    created: Option<String>,
    music_brainz_id: Option<String>,
    song: Vec<SongDto>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct SongDto {
    id: String,
    title: String,
    album: Option<String>,
    album_id: Option<String>,
    artist: Option<String>,
    year: Option<i32>,
    genre: Option<String>,
    duration: Option<u64>,
    track: Option<u32>,
    disc_number: Option<u32>,
    created: Option<String>,
    music_brainz_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Playlists {
    playlist: Vec<PlaylistDto>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct PlaylistDto {
    id: String,
    name: String,
    song_count: Option<u32>,
    changed: Option<String>,
    entry: Vec<SongDto>,
}

impl PlaylistDto {
    fn into_client_list(self) -> ClientList {
        ClientList {
            id: self.id,
            title: self.name,
            kind: ListKind::Playlist,
            item_count: self.song_count,
            updated_at: self.changed.as_deref().and_then(parse_timestamp),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> SubsonicClient {
        let settings = ClientSettings {
            base_url: server.uri(),
            username: Some("alice".into()),
            password: Some("pw".into()),
            ..Default::default()
        };
        let http = Http::new(reqwest::Client::new(), &server.uri(), "subsonic", 100);
        SubsonicClient::new(ClientId::new(), &settings, http)
    }

    fn ok(payload: serde_json::Value) -> ResponseTemplate {
        let mut body = json!({"status": "ok", "version": "1.16.1"});
        if let (Some(b), Some(p)) = (body.as_object_mut(), payload.as_object()) {
            b.extend(p.clone());
        }
        ResponseTemplate::new(200).set_body_json(json!({ "subsonic-response": body }))
    }

    #[tokio::test]
    async fn ping_sends_hex_password() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/ping.view"))
            .and(query_param("u", "alice"))
            .and(query_param("p", "enc:7077"))
            .and(query_param("f", "json"))
            .respond_with(ok(json!({"type": "navidrome", "serverVersion": "0.52.0"})))
            .mount(&server)
            .await;

        let info = client(&server).test_connection().await.unwrap();
        assert_eq!(info.name.as_deref(), Some("navidrome"));
        assert_eq!(info.version.as_deref(), Some("0.52.0"));
    }

    #[tokio::test]
    async fn failed_status_becomes_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/getSong.view"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "subsonic-response": {"status": "failed", "error": {"code": 70, "message": "Song not found"}}
            })))
            .mount(&server)
            .await;

        let err = client(&server).get_item(MediaType::Track, "s9").await.unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));
        let err = client(&server).get_item(MediaType::Movie, "s9").await.unwrap_err();
        assert!(matches!(err, Error::Unsupported(_)));
    }

    #[tokio::test]
    async fn album_tracks_map_to_items() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/getAlbum.view"))
            .and(query_param("id", "al1"))
            .respond_with(ok(json!({"album": {
                "id": "al1", "name": "OK Computer", "artist": "Radiohead", "year": 1997,
                "song": [{
                    "id": "s1", "title": "Airbag", "album": "OK Computer", "albumId": "al1",
                    "artist": "Radiohead", "year": 1997, "track": 1, "discNumber": 1, "duration": 284
                }]
            }})))
            .mount(&server)
            .await;

        let tracks = client(&server).children("al1", MediaType::Track).await.unwrap();
        assert_eq!(tracks.len(), 1);
        let t = &tracks[0];
        assert_eq!(t.grandparent_title.as_deref(), Some("Radiohead"));
        assert_eq!(t.index, Some(1));
        assert_eq!(t.duration_secs, Some(284));
        assert!(t.key().is_fingerprint());
    }

    #[tokio::test]
    async fn removes_by_index() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/getPlaylist.view"))
            .respond_with(ok(json!({"playlist": {
                "id": "p1", "name": "Mix", "songCount": 3, "changed": "2024-05-01T12:00:00Z",
                "entry": [
                    {"id": "a", "title": "A"}, {"id": "b", "title": "B"}, {"id": "a", "title": "A"}
                ]
            }})))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/rest/updatePlaylist.view"))
            .and(query_param("playlistId", "p1"))
            .and(query_param("songIndexToRemove", "2"))
            .respond_with(ok(json!({})))
            .expect(1)
            .mount(&server)
            .await;

        let c = client(&server);
        let entries = c.list_entries(ListKind::Playlist, "p1").await.unwrap();
        assert_eq!(entries[2].entry_id.as_deref(), Some("2"));
        c.remove_list_items(
            ListKind::Playlist,
            "p1",
            &[ClientEntry { item_id: "a".into(), entry_id: Some("2".into()) }],
        )
        .await
        .unwrap();
    }

    #[test]
    fn removal_indices_fall_back_to_id() {
        let songs = vec![
            SongDto { id: "a".into(), ..Default::default() },
            SongDto { id: "b".into(), ..Default::default() },
            SongDto { id: "a".into(), ..Default::default() },
        ];
        let stale = ClientEntry { item_id: "b".into(), entry_id: Some("0".into()) };
        let twice = ClientEntry { item_id: "a".into(), entry_id: None };
        assert_eq!(removal_indices(&songs, &[stale, twice.clone(), twice]), vec![0, 1, 2]);
        assert!(removal_indices(&songs, &[ClientEntry { item_id: "z".into(), entry_id: None }]).is_empty());
    }

    #[tokio::test]
    async fn collections_unsupported() {
        let server = MockServer::start().await;
        let c = client(&server);
        assert!(!c.capabilities().collections);
        assert!(matches!(
            c.lists(ListKind::Collection).await.unwrap_err(),
            Error::Unsupported(_)
        ));
    }
}
