//! Integration tests for catalog and per-user data routes.

mod common;

use common::{data, TestHarness};
use medley_core::{Details, MediaItem, Movie, Track};

fn movie(title: &str, year: i32, genre: &str, imdb: Option<&str>) -> MediaItem<Movie> {
    let mut item = MediaItem::new(
        title,
        Movie {
            details: Details {
                genres: vec![genre.to_string()],
                rating: Some(7.5),
                ..Default::default()
            },
            ..Default::default()
        },
    );
    item.release_year = Some(year);
    item.external_ids.imdb = imdb.map(str::to_string);
    item
}

#[tokio::test]
async fn list_filters_and_paginates() {
    let (h, addr) = TestHarness::with_server().await;
    h.insert(movie("Heat", 1995, "Crime", Some("tt0113277")));
    h.insert(movie("Alien", 1979, "Horror", None));
    h.insert(movie("Aliens", 1986, "Action", None));

    let page = data(
        reqwest::get(format!("http://{addr}/api/movies?limit=2&sort=year&desc=true"))
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(page["total"], 3);
    assert_eq!(page["limit"], 2);
    let titles: Vec<&str> = page["items"]
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["title"].as_str().unwrap())
        .collect();
    assert_eq!(titles, vec!["Heat", "Aliens"]);

    let searched = data(reqwest::get(format!("http://{addr}/api/movies?q=alien")).await.unwrap()).await;
    assert_eq!(searched["total"], 2);

    let by_year = data(reqwest::get(format!("http://{addr}/api/movies?year=1979")).await.unwrap()).await;
    assert_eq!(by_year["items"][0]["title"], "Alien");

    let genre = data(reqwest::get(format!("http://{addr}/api/movies/genre/Crime")).await.unwrap()).await;
    assert_eq!(genre["total"], 1);

    let external = data(
        reqwest::get(format!("http://{addr}/api/movies/external/imdb/tt0113277"))
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(external[0]["title"], "Heat");

    let recent = data(reqwest::get(format!("http://{addr}/api/movies/recent?days=7")).await.unwrap()).await;
    assert_eq!(recent.as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn get_respects_kind_and_delete() {
    let (h, addr) = TestHarness::with_server().await;
    let id = h.insert(movie("Heat", 1995, "Crime", None));
    let client = reqwest::Client::new();

    let found = client.get(format!("http://{addr}/api/movies/{id}")).send().await.unwrap();
    assert_eq!(found.status(), 200);
    assert_eq!(data(found).await["media_type"], "movie");

    let wrong_kind = client.get(format!("http://{addr}/api/tracks/{id}")).send().await.unwrap();
    assert_eq!(wrong_kind.status(), 404);

    let deleted = client.delete(format!("http://{addr}/api/movies/{id}")).send().await.unwrap();
    assert_eq!(deleted.status(), 200);
    let gone = client.get(format!("http://{addr}/api/movies/{id}")).send().await.unwrap();
    assert_eq!(gone.status(), 404);
    let body: serde_json::Value = gone.json().await.unwrap();
    assert_eq!(body["code"], "not_found");
}

#[tokio::test]
async fn favorites_ratings_and_progress() {
    let (h, addr) = TestHarness::with_server().await;
    let song = h.insert(MediaItem::new("Teardrop", Track::default()));
    let client = reqwest::Client::new();
    let base = format!("http://{addr}/api/user/tracks");

    let fav = client.post(format!("{base}/{song}/favorite")).send().await.unwrap();
    assert_eq!(fav.status(), 200);
    assert_eq!(data(fav).await["is_favorite"], true);

    let rated = client
        .put(format!("{base}/{song}/data"))
        .json(&serde_json::json!({"user_rating": 9.0}))
        .send()
        .await
        .unwrap();
    let rated = data(rated).await;
    assert_eq!(rated["user_rating"], 9.0);
    assert_eq!(rated["is_favorite"], true);

    let out_of_range = client
        .put(format!("{base}/{song}/data"))
        .json(&serde_json::json!({"user_rating": 11.0}))
        .send()
        .await
        .unwrap();
    assert_eq!(out_of_range.status(), 400);

    let favorites = data(client.get(format!("{base}/favorites")).send().await.unwrap()).await;
    assert_eq!(favorites["total"], 1);
    assert_eq!(favorites["items"][0]["item"]["title"], "Teardrop");

    client
        .post(format!("{base}/{song}/play"))
        .json(&serde_json::json!({"position_secs": 42.0}))
        .send()
        .await
        .unwrap();
    let cont = data(client.get(format!("{base}/continue")).send().await.unwrap()).await;
    assert_eq!(cont["total"], 1);
    assert_eq!(cont["items"][0]["user_data"]["position_secs"], 42.0);

    let done = client
        .post(format!("{base}/{song}/play"))
        .json(&serde_json::json!({"completed": true}))
        .send()
        .await
        .unwrap();
    let done = data(done).await;
    assert_eq!(done["play_count"], 1);
    assert_eq!(done["position_secs"], 0.0);
    let cont = data(client.get(format!("{base}/continue")).send().await.unwrap()).await;
    assert_eq!(cont["total"], 0);
    let history = data(client.get(format!("{base}/history")).send().await.unwrap()).await;
    assert_eq!(history["total"], 1);

    let unfav = client.delete(format!("{base}/{song}/favorite")).send().await.unwrap();
    assert_eq!(data(unfav).await["is_favorite"], false);
}

#[tokio::test]
async fn user_data_is_per_user() {
    let (h, addr) = TestHarness::with_server_config(TestHarness::auth_config()).await;
    let heat = h.insert(movie("Heat", 1995, "Crime", None));
    let (a, _) = h.create_user("a", "password");
    let (b, _) = h.create_user("b", "password");
    let (ta, tb) = (h.auth_token(a), h.auth_token(b));
    let client = reqwest::Client::new();

    client
        .post(format!("http://{addr}/api/user/movies/{heat}/favorite"))
        .bearer_auth(&ta)
        .send()
        .await
        .unwrap();
    let theirs = data(
        client
            .get(format!("http://{addr}/api/user/movies/{heat}/data"))
            .bearer_auth(&tb)
            .send()
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(theirs["is_favorite"], false);

    let missing = client
        .get(format!("http://{addr}/api/user/movies/{}/data", medley_core::MediaItemId::new()))
        .bearer_auth(&ta)
        .send()
        .await
        .unwrap();
    assert_eq!(missing.status(), 404);
}
