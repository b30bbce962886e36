//! Client configuration, import, browse and aggregate against a mock
//! Jellyfin server.

mod common;

use common::{data, TestHarness};
use serde_json::{json, Value};
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn jellyfin() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/System/Info"))
        .and(header("X-Emby-Token", "k"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ServerName": "den", "Version": "10.9.0"
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/Users/u1/Items"))
        .and(query_param("IncludeItemTypes", "Movie"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "Items": [
                {"Id": "m1", "Name": "Heat", "Type": "Movie", "ProductionYear": 1995,
                 "ProviderIds": {"Imdb": "tt0113277"}, "Genres": ["Crime"]},
                {"Id": "m2", "Name": "Ronin", "Type": "Movie", "ProductionYear": 1998,
                 "ProviderIds": {"Imdb": "tt0122690"}, "Genres": ["Action"]}
            ],
            "TotalRecordCount": 2
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/Users/u1/Items"))
        .and(query_param("IncludeItemTypes", "Playlist"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "Items": [{"Id": "pl1", "Name": "Weekend", "Type": "Playlist", "ChildCount": 1}],
            "TotalRecordCount": 1
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/Playlists/pl1/Items"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "Items": [{"Id": "m1", "Name": "Heat", "Type": "Movie", "ProductionYear": 1995,
                       "ProviderIds": {"Imdb": "tt0113277"}, "PlaylistItemId": "e1"}],
            "TotalRecordCount": 1
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/Playlists/pl1/Items"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;
    server
}

async fn add_client(client: &reqwest::Client, addr: &str, server: &MockServer) -> String {
    let resp = client
        .post(format!("http://{addr}/api/clients"))
        .json(&json!({
            "client_type": "jellyfin",
            "name": "Den",
            "settings": {"base_url": server.uri(), "api_key": "k", "user_id": "u1"}
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 201);
    let created = data(resp).await;
    assert_eq!(created["has_secret"], true);
    assert!(created["settings"].get("api_key").is_none());
    created["id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn client_crud_and_connection_test() {
    let server = jellyfin().await;
    let (_h, addr) = TestHarness::with_server().await;
    let addr = addr.to_string();
    let client = reqwest::Client::new();
    let id = add_client(&client, &addr, &server).await;

    let tested = data(
        client
            .post(format!("http://{addr}/api/clients/{id}/test"))
            .send()
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(tested["server"]["name"], "den");
    assert_eq!(tested["capabilities"]["playlists"], true);

    // Renaming keeps the stored token.
    let renamed = data(
        client
            .put(format!("http://{addr}/api/clients/{id}"))
            .json(&json!({"name": "Basement", "settings": {"base_url": server.uri(), "user_id": "u1"}}))
            .send()
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(renamed["name"], "Basement");
    assert_eq!(renamed["has_secret"], true);

    let listed = data(client.get(format!("http://{addr}/api/clients")).send().await.unwrap()).await;
    assert_eq!(listed.as_array().unwrap().len(), 1);

    let bad = client
        .post(format!("http://{addr}/api/clients"))
        .json(&json!({"client_type": "jellyfin", "name": "Broken", "settings": {"base_url": ""}}))
        .send()
        .await
        .unwrap();
    assert_eq!(bad.status(), 400);

    let deleted = client.delete(format!("http://{addr}/api/clients/{id}")).send().await.unwrap();
    assert_eq!(deleted.status(), 200);
    let gone = client.get(format!("http://{addr}/api/clients/{id}")).send().await.unwrap();
    assert_eq!(gone.status(), 404);
}

#[tokio::test]
async fn import_browse_and_aggregate() {
    let server = jellyfin().await;
    let (_h, addr) = TestHarness::with_server().await;
    let addr = addr.to_string();
    let client = reqwest::Client::new();
    let id = add_client(&client, &addr, &server).await;

    let browsed = data(
        client
            .get(format!("http://{addr}/api/clients/{id}/movies"))
            .send()
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(browsed["total"], 2);
    assert_eq!(browsed["items"][0]["title"], "Heat");

    let report = data(
        client
            .post(format!("http://{addr}/api/clients/{id}/import/movies"))
            .send()
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(report["fetched"], 2);
    assert_eq!(report["created"], 2);
    assert_eq!(report["failed"], 0);

    let again = data(
        client
            .post(format!("http://{addr}/api/clients/{id}/import/movies"))
            .send()
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(again["created"], 0);

    let movies = data(client.get(format!("http://{addr}/api/movies")).send().await.unwrap()).await;
    assert_eq!(movies["total"], 2);
    let heat = &movies["items"][0];
    assert_eq!(heat["title"], "Heat");
    assert_eq!(heat["external_ids"]["imdb"], "tt0113277");

    let aggregate = data(
        client
            .get(format!("http://{addr}/api/aggregate/movies?sort=year&desc=true"))
            .send()
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(aggregate["clients_queried"], 1);
    assert_eq!(aggregate["errors"].as_array().unwrap().len(), 0);
    let titles: Vec<&str> = aggregate["items"]
        .as_array()
        .unwrap()
        .iter()
        .map(|i| i["title"].as_str().unwrap())
        .collect();
    assert_eq!(titles, vec!["Ronin", "Heat"]);
}

#[tokio::test]
async fn playlist_import_pulls_client_entries() {
    let server = jellyfin().await;
    let (_h, addr) = TestHarness::with_server().await;
    let addr = addr.to_string();
    let client = reqwest::Client::new();
    let id = add_client(&client, &addr, &server).await;

    let lists = data(
        client
            .get(format!("http://{addr}/api/clients/{id}/playlists"))
            .send()
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(lists[0]["id"], "pl1");
    assert_eq!(lists[0]["title"], "Weekend");

    let resp = client
        .post(format!("http://{addr}/api/playlists/import"))
        .json(&json!({"client_id": id, "client_list_id": "pl1"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 201);
    let imported = data(resp).await;
    assert_eq!(imported["list"]["title"], "Weekend");
    assert_eq!(imported["report"]["hub_added"], 1);
    let list_id = imported["list"]["id"].as_str().unwrap().to_string();

    let items: Value = data(
        client
            .get(format!("http://{addr}/api/playlists/{list_id}/items"))
            .send()
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(items[0]["title"], "Heat");

    // A second sync finds nothing new.
    let report = data(
        client
            .post(format!("http://{addr}/api/playlists/{list_id}/sync"))
            .send()
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(report["hub_added"], 0);
    assert_eq!(report["item_count"], 1);

    let missing = client
        .post(format!("http://{addr}/api/playlists/import"))
        .json(&json!({"client_id": id, "client_list_id": "nope"}))
        .send()
        .await
        .unwrap();
    assert_eq!(missing.status(), 404);
}

#[tokio::test]
async fn link_creates_client_list_then_syncs_and_unlinks() {
    let server = jellyfin().await;
    Mock::given(method("POST"))
        .and(path("/Playlists"))
        .and(body_partial_json(json!({"Name": "Movie night", "Ids": ["m1", "m2"], "UserId": "u1"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"Id": "pl9"})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/Playlists/pl9/Items"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "Items": [
                {"Id": "m1", "Name": "Heat", "Type": "Movie", "ProductionYear": 1995,
                 "ProviderIds": {"Imdb": "tt0113277"}, "PlaylistItemId": "e1"},
                {"Id": "m2", "Name": "Ronin", "Type": "Movie", "ProductionYear": 1998,
                 "ProviderIds": {"Imdb": "tt0122690"}, "PlaylistItemId": "e2"}
            ],
            "TotalRecordCount": 2
        })))
        .mount(&server)
        .await;

    let (_h, addr) = TestHarness::with_server().await;
    let addr = addr.to_string();
    let client = reqwest::Client::new();
    let id = add_client(&client, &addr, &server).await;
    client
        .post(format!("http://{addr}/api/clients/{id}/import/movies"))
        .send()
        .await
        .unwrap();
    let movies = data(client.get(format!("http://{addr}/api/movies")).send().await.unwrap()).await;
    let id_of = |title: &str| {
        movies["items"]
            .as_array()
            .unwrap()
            .iter()
            .find(|m| m["title"] == title)
            .map(|m| m["id"].as_str().unwrap().to_string())
            .unwrap()
    };
    let ids = vec![id_of("Heat"), id_of("Ronin")];

    let base = format!("http://{addr}/api/playlists");
    let resp = client
        .post(&base)
        .json(&json!({"title": "Movie night", "item_ids": ids}))
        .send()
        .await
        .unwrap();
    let list_id = data(resp).await["id"].as_str().unwrap().to_string();

    let linked = client
        .post(format!("{base}/{list_id}/links"))
        .json(&json!({"client_id": id}))
        .send()
        .await
        .unwrap();
    assert_eq!(linked.status(), 201);
    let linked = data(linked).await;
    assert_eq!(linked["client_list_id"], "pl9");

    let report = data(client.post(format!("{base}/{list_id}/sync")).send().await.unwrap()).await;
    assert_eq!(report["hub_added"], 0);
    assert_eq!(report["hub_removed"], 0);
    assert_eq!(report["item_count"], 2);
    assert_eq!(report["clients"][0]["added"], 0);
    assert_eq!(report["clients"][0]["errors"].as_array().unwrap().len(), 0);

    let unlinked = data(
        client
            .delete(format!("{base}/{list_id}/links/{id}"))
            .send()
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(unlinked["data"]["list"]["sync_clients"].as_array().unwrap().len(), 0);

    let again = client
        .delete(format!("{base}/{list_id}/links/{id}"))
        .send()
        .await
        .unwrap();
    assert_eq!(again.status(), 404);
}

#[tokio::test]
async fn link_rejects_clients_without_list_support() {
    let (_h, addr) = TestHarness::with_server().await;
    let client = reqwest::Client::new();
    let resp = client
        .post(format!("http://{addr}/api/clients"))
        .json(&json!({
            "client_type": "subsonic",
            "name": "Navidrome",
            "settings": {"base_url": "http://127.0.0.1:9", "username": "me", "password": "pw"}
        }))
        .send()
        .await
        .unwrap();
    let subsonic = data(resp).await["id"].as_str().unwrap().to_string();

    let base = format!("http://{addr}/api/collections");
    let resp = client.post(&base).json(&json!({"title": "Boxed"})).send().await.unwrap();
    let list_id = data(resp).await["id"].as_str().unwrap().to_string();

    let linked = client
        .post(format!("{base}/{list_id}/links"))
        .json(&json!({"client_id": subsonic}))
        .send()
        .await
        .unwrap();
    assert_eq!(linked.status(), 501);
    let body: Value = linked.json().await.unwrap();
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn sync_reports_links_to_deleted_clients() {
    let server = jellyfin().await;
    let (_h, addr) = TestHarness::with_server().await;
    let addr = addr.to_string();
    let client = reqwest::Client::new();
    let id = add_client(&client, &addr, &server).await;

    let base = format!("http://{addr}/api/playlists");
    let resp = client.post(&base).json(&json!({"title": "Weekend"})).send().await.unwrap();
    let list_id = data(resp).await["id"].as_str().unwrap().to_string();
    let linked = client
        .post(format!("{base}/{list_id}/links"))
        .json(&json!({"client_id": id, "client_list_id": "pl1"}))
        .send()
        .await
        .unwrap();
    assert_eq!(linked.status(), 201);

    client.delete(format!("http://{addr}/api/clients/{id}")).send().await.unwrap();

    let report = data(client.post(format!("{base}/{list_id}/sync")).send().await.unwrap()).await;
    let clients = report["clients"].as_array().unwrap();
    assert_eq!(clients.len(), 1);
    assert_eq!(clients[0]["client_id"], id.as_str());
    assert!(clients[0].get("client_type").is_none());
    assert!(clients[0]["errors"][0].as_str().unwrap().contains("no longer exists"));
    assert_eq!(report["hub_added"], 0);
}
