//! medley-clients: adapters for external media servers.
//!
//! Each adapter implements [`MediaClient`] and maps the server's responses
//! into [`medley_core::ClientItem`]s. [`ClientRegistry`] builds adapters from
//! stored client configuration and caches them per client id.

pub mod client;
mod http;
pub mod jellyfin;
pub mod plex;
pub mod registry;
pub mod subsonic;

use std::sync::Arc;

use chrono::{DateTime, NaiveDateTime, Utc};
use medley_core::{ClientId, ClientSettings, ClientType, Result};

pub use client::{Capabilities, ItemQuery, MediaClient, ServerInfo};
pub use http::build_http_client;
pub use registry::ClientRegistry;

/// Create the adapter for `client_type`.
///
/// Settings are validated first so a misconfigured client fails here rather
/// than on its first request.
pub fn create_client(
    id: ClientId,
    client_type: ClientType,
    settings: &ClientSettings,
    http: reqwest::Client,
    requests_per_second: u32,
) -> Result<Arc<dyn MediaClient>> {
    settings.validate(client_type)?;
    let base = http::Http::new(http, settings.base(), client_type.as_str(), requests_per_second);
    Ok(match client_type {
        ClientType::Jellyfin | ClientType::Emby => {
            Arc::new(jellyfin::JellyfinClient::new(id, client_type, settings, base))
        }
        ClientType::Plex => Arc::new(plex::PlexClient::new(id, settings, base)),
        ClientType::Subsonic => Arc::new(subsonic::SubsonicClient::new(id, settings, base)),
    })
}

/// Parse the timestamp formats media servers emit.
pub(crate) fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
                .ok()
                .map(|n| n.and_utc())
        })
}
