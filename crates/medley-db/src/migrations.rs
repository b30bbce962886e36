//! Embedded SQL migrations and runner.
//!
//! Migrations are stored as `&str` constants and executed in order. A
//! `schema_migrations` table tracks which versions have been applied.

use medley_core::{Error, Result};
use rusqlite::Connection;

/// V1: users, sessions, clients, the media catalog and per-user data.
const V1_INITIAL: &str = r#"
CREATE TABLE users (
    id            TEXT PRIMARY KEY,
    username      TEXT UNIQUE NOT NULL,
    password_hash TEXT NOT NULL,
    role          TEXT NOT NULL DEFAULT 'user',
    created_at    TEXT NOT NULL
);

CREATE TABLE auth_tokens (
    id         TEXT PRIMARY KEY,
    user_id    TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    token      TEXT UNIQUE NOT NULL,
    expires_at TEXT NOT NULL,
    created_at TEXT NOT NULL
);

-- External media servers linked by a user
CREATE TABLE clients (
    id          TEXT PRIMARY KEY,
    user_id     TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    client_type TEXT NOT NULL,
    name        TEXT NOT NULL,
    settings    TEXT NOT NULL DEFAULT '{}',
    enabled     INTEGER NOT NULL DEFAULT 1,
    created_at  TEXT NOT NULL,
    updated_at  TEXT NOT NULL,
    UNIQUE (user_id, name)
);
CREATE INDEX idx_clients_user ON clients(user_id);

-- Catalog: one row per media item of any type; typed payload in `data`
CREATE TABLE media_items (
    id           TEXT PRIMARY KEY,
    media_type   TEXT NOT NULL,
    title        TEXT NOT NULL,
    sort_title   TEXT NOT NULL,
    release_year INTEGER,
    content_key  TEXT NOT NULL,
    fingerprint  TEXT NOT NULL,
    external_ids TEXT NOT NULL DEFAULT '{}',
    sync_clients TEXT NOT NULL DEFAULT '[]',
    owner_id     TEXT REFERENCES users(id) ON DELETE CASCADE,
    data         TEXT NOT NULL DEFAULT '{}',
    created_at   TEXT NOT NULL,
    updated_at   TEXT NOT NULL
);
CREATE INDEX idx_media_items_type       ON media_items(media_type);
CREATE INDEX idx_media_items_type_title ON media_items(media_type, sort_title);
CREATE INDEX idx_media_items_key        ON media_items(media_type, content_key);
CREATE INDEX idx_media_items_fp         ON media_items(media_type, fingerprint);
CREATE INDEX idx_media_items_owner      ON media_items(owner_id);
CREATE INDEX idx_media_items_created    ON media_items(created_at);

CREATE TABLE user_media_data (
    id             TEXT PRIMARY KEY,
    user_id        TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    item_id        TEXT NOT NULL REFERENCES media_items(id) ON DELETE CASCADE,
    media_type     TEXT NOT NULL,
    is_favorite    INTEGER NOT NULL DEFAULT 0,
    user_rating    REAL,
    play_count     INTEGER NOT NULL DEFAULT 0,
    position_secs  REAL NOT NULL DEFAULT 0,
    completed      INTEGER NOT NULL DEFAULT 0,
    last_played_at TEXT,
    updated_at     TEXT NOT NULL,
    UNIQUE (user_id, item_id)
);
CREATE INDEX idx_user_media_data_user ON user_media_data(user_id, media_type);
"#;

/// V2: seed the anonymous user used when auth is disabled.
///
/// Requests without auth run as this well-known UUID; rows owned by it
/// need a matching `users` row to satisfy foreign keys.
const V2_ANONYMOUS_USER: &str = r#"
INSERT OR IGNORE INTO users (id, username, password_hash, role, created_at)
VALUES ('00000000-0000-0000-0000-000000000000', 'anonymous', '!disabled', 'admin', datetime('now'));
"#;

/// Ordered list of (version, sql) pairs.
const MIGRATIONS: &[(i64, &str)] = &[(1, V1_INITIAL), (2, V2_ANONYMOUS_USER)];

/// Run all pending migrations on `conn`.
///
/// Creates the `schema_migrations` tracking table if it does not exist,
/// then applies each outstanding migration inside a transaction.
pub fn run_migrations(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version    INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        )",
    )
    .map_err(|e| Error::database(format!("Failed to create schema_migrations: {e}")))?;

    for &(version, sql) in MIGRATIONS {
        let already: bool = conn
            .query_row(
                "SELECT COUNT(*) > 0 FROM schema_migrations WHERE version = ?1",
                [version],
                |row| row.get(0),
            )
            .map_err(|e| Error::database(e.to_string()))?;

        if already {
            continue;
        }

        let tx = conn
            .unchecked_transaction()
            .map_err(|e| Error::database(e.to_string()))?;

        tx.execute_batch(sql)
            .map_err(|e| Error::database(format!("Migration V{version} failed: {e}")))?;

        tx.execute("INSERT INTO schema_migrations (version) VALUES (?1)", [version])
            .map_err(|e| Error::database(e.to_string()))?;

        tx.commit().map_err(|e| Error::database(e.to_string()))?;
        tracing::info!(version, "Applied database migration");
    }

    Ok(())
}
