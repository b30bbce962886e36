//! Shared test harness for integration tests.
//!
//! Provides [`TestHarness`] which creates an in-memory DB, a configuration
//! and the full [`AppContext`]. The [`TestHarness::with_server`] constructor
//! starts Axum on a random port for HTTP-level testing.

#![allow(dead_code)]

use std::net::SocketAddr;

use chrono::{Duration, Utc};
use medley_core::config::Config;
use medley_core::{MediaData, MediaItem, MediaItemId, UserId};
use medley_db::pool::{init_memory_pool, DbPool};
use medley_server::context::AppContext;
use medley_server::router::build_router;
use serde_json::Value;

/// Test harness wrapping a fully-constructed [`AppContext`] backed by an
/// in-memory database.
pub struct TestHarness {
    pub ctx: AppContext,
    pub db: DbPool,
    pub addr: Option<SocketAddr>,
}

impl TestHarness {
    /// Create a new harness with default configuration and in-memory DB.
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    /// Create a new harness with a custom configuration and in-memory DB.
    pub fn with_config(config: Config) -> Self {
        let db = init_memory_pool().expect("failed to create in-memory pool");
        let ctx = AppContext::new(db.clone(), config);
        Self { ctx, db, addr: None }
    }

    /// Start an Axum server on a random port and return the harness together
    /// with the bound socket address.
    pub async fn with_server() -> (Self, SocketAddr) {
        Self::with_server_config(Config::default()).await
    }

    /// Start an Axum server with custom config on a random port.
    pub async fn with_server_config(config: Config) -> (Self, SocketAddr) {
        let mut harness = Self::with_config(config);
        let app = build_router(harness.ctx.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind random port");
        let addr = listener.local_addr().expect("failed to get local addr");

        tokio::spawn(async move {
            axum::serve(listener, app).await.ok();
        });

        harness.addr = Some(addr);
        (harness, addr)
    }

    /// Config with authentication switched on.
    pub fn auth_config() -> Config {
        let mut config = Config::default();
        config.auth.enabled = true;
        config
    }

    /// Get a database connection from the pool.
    pub fn conn(&self) -> medley_db::pool::PooledConnection {
        medley_db::pool::get_conn(&self.db).expect("failed to get db connection")
    }

    /// Create a regular user. Returns the id and its string form.
    pub fn create_user(&self, username: &str, password: &str) -> (UserId, String) {
        self.insert_user(username, password, "user")
    }

    /// Create an admin user. Returns the id and its string form.
    pub fn create_admin_user(&self, username: &str, password: &str) -> (UserId, String) {
        self.insert_user(username, password, "admin")
    }

    fn insert_user(&self, username: &str, password: &str, role: &str) -> (UserId, String) {
        // Minimum cost keeps the suite fast.
        let hash = bcrypt::hash(password, 4).expect("bcrypt");
        let user = medley_db::queries::users::create_user(&self.conn(), username, &hash, role)
            .expect("create user");
        (user.id, user.id.to_string())
    }

    /// Issue a session token for `user_id` directly in the database.
    pub fn auth_token(&self, user_id: UserId) -> String {
        let token = format!("test-{}", UserId::new());
        medley_db::queries::auth::create_token(&self.conn(), user_id, &token, Utc::now() + Duration::hours(1))
            .expect("create token");
        token
    }

    /// Insert a catalog item and return its id.
    pub fn insert<T: MediaData>(&self, item: MediaItem<T>) -> MediaItemId {
        medley_db::queries::media_items::insert(&self.conn(), &item).expect("insert item");
        item.id
    }
}

/// `data` of a success envelope, asserting `success: true`.
pub async fn data(resp: reqwest::Response) -> Value {
    let body: Value = resp.json().await.expect("json body");
    assert_eq!(body["success"], true, "unexpected envelope: {body}");
    body["data"].clone()
}
