//! Route handlers for the HTTP API.

pub mod aggregate;
pub mod auth;
pub mod clients;
pub mod health;
pub mod lists;
pub mod media;
pub mod metrics;
pub mod user_data;
pub mod users;

use std::str::FromStr;

use medley_core::Error;

/// Parse a path segment into a typed id, reporting `what` on failure.
pub(crate) fn parse_id<T: FromStr>(raw: &str, what: &str) -> Result<T, Error> {
    raw.parse()
        .map_err(|_| Error::Validation(format!("invalid {what}: {raw}")))
}
