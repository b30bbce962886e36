//! Database query modules.

pub mod auth;
pub mod clients;
pub mod media_items;
pub mod user_data;
pub mod users;
