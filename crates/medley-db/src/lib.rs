//! medley-db: database access and persistence layer.
//!
//! SQLite-backed storage with connection pooling, embedded migrations,
//! typed models and one query module per table. Media payloads and item
//! lists are stored as JSON inside the `media_items.data` column.

pub mod migrations;
pub mod models;
pub mod pool;
pub mod queries;
