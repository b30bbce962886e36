//! Application configuration types.
//!
//! The top-level [`Config`] struct is deserialized from TOML and carries all
//! sub-configs for the server, auth, outbound client requests and list sync.
//! Every section defaults sensibly so an empty file is valid.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::Error;

/// Locations searched when no explicit config path is given.
pub const DEFAULT_CONFIG_PATHS: &[&str] = &[
    "./medley.toml",
    "./config.toml",
    "~/.config/medley/config.toml",
    "/etc/medley/config.toml",
];

/// Longest accepted session lifetime, ten years.
pub const MAX_SESSION_HOURS: u64 = 24 * 365 * 10;

/// Longest accepted tombstone retention, a hundred years.
pub const MAX_TOMBSTONE_DAYS: i64 = 365 * 100;

// ---------------------------------------------------------------------------
// Top-level Config
// ---------------------------------------------------------------------------

/// Root application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub auth: AuthConfig,
    pub clients: ClientsConfig,
    pub sync: SyncConfig,
}

impl Config {
    /// Deserialize a `Config` from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        toml::from_str(toml_str).map_err(|e| Error::Validation(format!("config parse error: {e}")))
    }

    /// Serialize back to pretty TOML.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| Error::Internal(format!("config serialize error: {e}")))
    }

    /// Load and validate configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config = Self::from_toml(&contents)?;
        config.check()?;
        Ok(config)
    }

    /// Load from `custom_path` when given, otherwise from the first existing
    /// default location, otherwise fall back to defaults.
    ///
    /// Returns the config together with the path it was read from.
    pub fn load_or_default(custom_path: Option<&Path>) -> Result<(Self, Option<PathBuf>)> {
        if let Some(path) = custom_path {
            return Ok((Self::load(path)?, Some(path.to_path_buf())));
        }

        for path_str in DEFAULT_CONFIG_PATHS {
            let expanded = shellexpand::tilde(path_str);
            let path = Path::new(expanded.as_ref());
            if path.exists() {
                tracing::info!("Loading config from {}", path.display());
                return Ok((Self::load(path)?, Some(path.to_path_buf())));
            }
        }

        tracing::info!("No config file found; using defaults");
        Ok((Self::default(), None))
    }

    /// Fatal configuration problems.
    fn check(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(Error::Validation("server.port cannot be 0".into()));
        }
        if self.auth.session_timeout_hours == 0 || self.auth.session_timeout_hours > MAX_SESSION_HOURS {
            return Err(Error::Validation(format!(
                "auth.session_timeout_hours must be between 1 and {MAX_SESSION_HOURS}"
            )));
        }
        if !(0..=MAX_TOMBSTONE_DAYS).contains(&self.sync.tombstone_retention_days) {
            return Err(Error::Validation(format!(
                "sync.tombstone_retention_days must be between 0 and {MAX_TOMBSTONE_DAYS}"
            )));
        }
        if self.sync.enabled && self.sync.interval_secs == 0 {
            return Err(Error::Validation(
                "sync.interval_secs must be positive when sync is enabled".into(),
            ));
        }
        Ok(())
    }

    /// Return a list of validation warnings (non-fatal issues).
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.auth.enabled && self.auth.api_key.is_none() && !self.auth.allow_registration {
            warnings.push(
                "auth is enabled but no api_key is set and registration is closed; \
                 create users with `medley create-user`"
                    .into(),
            );
        }

        if let Some(ref key) = self.auth.api_key {
            if key.len() < 16 {
                warnings.push("auth.api_key is shorter than 16 characters".into());
            }
        }

        if self.clients.request_timeout_secs == 0 {
            warnings.push("clients.request_timeout_secs is 0; requests will never time out".into());
        }

        if self.clients.requests_per_second == 0 {
            warnings.push("clients.requests_per_second is 0; falling back to 10".into());
        }

        if self.sync.enabled && self.sync.interval_secs < 60 {
            warnings.push(format!(
                "sync.interval_secs is {}; syncing more than once a minute may hit client rate limits",
                self.sync.interval_secs
            ));
        }

        warnings
    }
}

// ---------------------------------------------------------------------------
// Sub-configs
// ---------------------------------------------------------------------------

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    /// API requests allowed per minute across all callers.
    pub rate_limit_per_minute: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 8080,
            db_path: PathBuf::from("./data/medley.db"),
            rate_limit_per_minute: 600,
        }
    }
}

/// Authentication settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub enabled: bool,
    /// Static key accepted as a bearer token; resolves to the anonymous user.
    pub api_key: Option<String>,
    pub session_timeout_hours: u64,
    /// Allow `POST /api/auth/register` without an admin.
    pub allow_registration: bool,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            api_key: None,
            session_timeout_hours: 24 * 7,
            allow_registration: false,
        }
    }
}

/// Outbound media-client request settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientsConfig {
    pub request_timeout_secs: u64,
    /// Per-client request quota.
    pub requests_per_second: u32,
    /// Page size used when importing a client library.
    pub import_page_size: u32,
}

impl Default for ClientsConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: 30,
            requests_per_second: 10,
            import_page_size: 200,
        }
    }
}

/// Background list sync settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub enabled: bool,
    pub interval_secs: u64,
    /// Tombstones older than this are dropped from lists.
    pub tombstone_retention_days: i64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_secs: 900,
            tombstone_retention_days: 90,
        }
    }
}
