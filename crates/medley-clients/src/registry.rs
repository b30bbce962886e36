//! Cache of live adapters keyed by client id.

use std::sync::Arc;

use dashmap::DashMap;
use medley_core::config::ClientsConfig;
use medley_core::{ClientId, ClientSettings, ClientType, Result};

use crate::client::MediaClient;
use crate::{build_http_client, create_client};

struct Cached {
    client_type: ClientType,
    settings: ClientSettings,
    client: Arc<dyn MediaClient>,
}

/// Builds adapters on demand and reuses them while their configuration is
/// unchanged. All adapters share one HTTP connection pool.
pub struct ClientRegistry {
    http: reqwest::Client,
    requests_per_second: u32,
    cache: DashMap<ClientId, Cached>,
}

impl ClientRegistry {
    pub fn new(config: &ClientsConfig) -> Self {
        Self {
            http: build_http_client(config),
            requests_per_second: config.requests_per_second,
            cache: DashMap::new(),
        }
    }

    /// The adapter for a stored client, rebuilt if its settings changed.
    pub fn get(
        &self,
        id: ClientId,
        client_type: ClientType,
        settings: &ClientSettings,
    ) -> Result<Arc<dyn MediaClient>> {
        if let Some(cached) = self.cache.get(&id) {
            if cached.client_type == client_type && &cached.settings == settings {
                return Ok(Arc::clone(&cached.client));
            }
        }
        let client = create_client(
            id,
            client_type,
            settings,
            self.http.clone(),
            self.requests_per_second,
        )?;
        tracing::debug!(client_id = %id, %client_type, "Built media client adapter");
        self.cache.insert(
            id,
            Cached {
                client_type,
                settings: settings.clone(),
                client: Arc::clone(&client),
            },
        );
        Ok(client)
    }

    /// Drop the cached adapter for `id`. Returns whether one was cached.
    pub fn invalidate(&self, id: ClientId) -> bool {
        self.cache.remove(&id).is_some()
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }
}
