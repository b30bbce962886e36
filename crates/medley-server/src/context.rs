//! Application context shared by every request handler.
//!
//! [`AppContext`] holds the database pool, the configuration snapshot, the
//! cache of client adapters and the API rate limiter. It only contains
//! `Arc`s and pool handles, so cloning is cheap.

use std::sync::Arc;

use chrono::Duration;
use dashmap::DashMap;
use medley_clients::{ClientRegistry, MediaClient};
use medley_core::config::{Config, MAX_TOMBSTONE_DAYS};
use medley_core::{ClientId, Error, MediaItemId, Result, UserId};
use medley_db::models::Client;
use medley_db::pool::{DbPool, PooledConnection};
use medley_sync::SyncEngine;
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::catalog::DbCatalog;

use crate::middleware::rate_limit::{create_limiter, SharedLimiter};

/// Application context shared by all request handlers (via Axum state).
#[derive(Clone)]
pub struct AppContext {
    /// Database connection pool.
    pub db: DbPool,
    /// Immutable application configuration snapshot.
    pub config: Arc<Config>,
    /// Cached adapters, one per configured client.
    pub clients: Arc<ClientRegistry>,
    /// API-wide request quota.
    pub limiter: SharedLimiter,
    /// Prometheus render handle; `None` when no recorder is installed.
    pub metrics: Option<PrometheusHandle>,
    /// Serializes read-modify-write cycles on one list.
    list_locks: Arc<DashMap<MediaItemId, Arc<Mutex<()>>>>,
}

impl AppContext {
    pub fn new(db: DbPool, config: Config) -> Self {
        let clients = Arc::new(ClientRegistry::new(&config.clients));
        let limiter = create_limiter(config.server.rate_limit_per_minute);
        Self {
            db,
            config: Arc::new(config),
            clients,
            limiter,
            metrics: None,
            list_locks: Arc::new(DashMap::new()),
        }
    }

    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }

    pub fn conn(&self) -> Result<PooledConnection> {
        medley_db::pool::get_conn(&self.db)
    }

    /// Hold this while loading, changing and saving a list.
    pub async fn lock_list(&self, id: MediaItemId) -> OwnedMutexGuard<()> {
        let lock = Arc::clone(self.list_locks.entry(id).or_default().value());
        lock.lock_owned().await
    }

    pub fn sync_engine(&self) -> SyncEngine<DbCatalog> {
        SyncEngine::new(
            DbCatalog::new(self.db.clone()),
            Duration::days(self.config.sync.tombstone_retention_days.clamp(0, MAX_TOMBSTONE_DAYS)),
        )
    }

    /// Load a client configuration owned by `user_id`.
    pub fn user_client(&self, user_id: UserId, client_id: ClientId) -> Result<Client> {
        let conn = self.conn()?;
        medley_db::queries::clients::get_user_client(&conn, user_id, client_id)?
            .ok_or_else(|| Error::not_found("client", client_id))
    }

    /// The live adapter for a stored client configuration.
    pub fn adapter(&self, client: &Client) -> Result<Arc<dyn MediaClient>> {
        if !client.enabled {
            return Err(Error::Validation(format!("client '{}' is disabled", client.name)));
        }
        self.clients.get(client.id, client.client_type, &client.settings)
    }

    /// Adapters for every enabled client of `user_id`, paired with their
    /// configuration.
    pub fn user_adapters(&self, user_id: UserId) -> Result<Vec<(Client, Arc<dyn MediaClient>)>> {
        let clients = {
            let conn = self.conn()?;
            medley_db::queries::clients::list_clients(&conn, user_id, true)?
        };
        let mut out = Vec::with_capacity(clients.len());
        for client in clients {
            match self.adapter(&client) {
                Ok(adapter) => out.push((client, adapter)),
                Err(e) => {
                    tracing::warn!(client_id = %client.id, error = %e, "Skipping misconfigured client");
                }
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use medley_core::{ClientSettings, ClientType, ANONYMOUS_USER_ID};
    use medley_db::pool::init_memory_pool;

    fn ctx() -> AppContext {
        AppContext::new(init_memory_pool().unwrap(), Config::default())
    }

    fn jellyfin(ctx: &AppContext, user: UserId) -> Client {
        let conn = ctx.conn().unwrap();
        let settings = ClientSettings {
            base_url: "http://jf.local:8096".into(),
            api_key: Some("key".into()),
            ..Default::default()
        };
        medley_db::queries::clients::create_client(&conn, user, ClientType::Jellyfin, "Jelly", &settings)
            .unwrap()
    }

    #[test]
    fn user_client_is_scoped_to_owner() {
        let ctx = ctx();
        let client = jellyfin(&ctx, ANONYMOUS_USER_ID);
        assert!(ctx.user_client(ANONYMOUS_USER_ID, client.id).is_ok());
        let other = ctx.user_client(UserId::new(), client.id).unwrap_err();
        assert_eq!(other.http_status(), 404);
    }

    #[test]
    fn disabled_clients_have_no_adapter() {
        let ctx = ctx();
        let mut client = jellyfin(&ctx, ANONYMOUS_USER_ID);
        assert!(ctx.adapter(&client).is_ok());
        client.enabled = false;
        assert!(ctx.adapter(&client).is_err());
    }

    #[test]
    fn user_adapters_lists_enabled_clients() {
        let ctx = ctx();
        jellyfin(&ctx, ANONYMOUS_USER_ID);
        assert_eq!(ctx.user_adapters(ANONYMOUS_USER_ID).unwrap().len(), 1);
        assert!(ctx.user_adapters(UserId::new()).unwrap().is_empty());
    }
}
