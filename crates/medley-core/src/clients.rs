//! Connection settings for external media clients.

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::media::ClientType;
use crate::Error;

/// How to reach and authenticate against one external media server.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientSettings {
    pub base_url: String,
    /// Access token for Jellyfin, Emby and Plex.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    /// Subsonic password.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    /// Jellyfin/Emby user whose library is queried. Resolved on first use
    /// when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

impl ClientSettings {
    /// Base URL without a trailing slash.
    pub fn base(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }

    /// Check that the settings carry what `client_type` needs.
    pub fn validate(&self, client_type: ClientType) -> Result<()> {
        let url = self.base_url.trim();
        if url.is_empty() {
            return Err(Error::Validation("base_url is required".into()));
        }
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(Error::Validation(format!(
                "base_url must start with http:// or https://, got {url}"
            )));
        }
        match client_type {
            ClientType::Jellyfin | ClientType::Emby | ClientType::Plex => {
                if self.api_key.as_deref().map_or(true, str::is_empty) {
                    return Err(Error::Validation(format!("{client_type} clients need an api_key")));
                }
            }
            ClientType::Subsonic => {
                if self.username.as_deref().map_or(true, str::is_empty)
                    || self.password.as_deref().map_or(true, str::is_empty)
                {
                    return Err(Error::Validation(
                        "subsonic clients need a username and password".into(),
                    ));
                }
            }
        }
        Ok(())
    }

    /// Copy with secrets removed, safe to return from the API.
    pub fn redacted(&self) -> Self {
        Self {
            base_url: self.base_url.clone(),
            api_key: None,
            username: self.username.clone(),
            password: None,
            user_id: self.user_id.clone(),
        }
    }

    pub fn has_secret(&self) -> bool {
        self.api_key.is_some() || self.password.is_some()
    }
}
