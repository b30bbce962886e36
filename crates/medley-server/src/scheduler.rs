//! Background sync of lists flagged `auto_sync`.

use std::time::Duration;

use chrono::Utc;
use medley_core::{Collection, ListData, MediaItemId, Playlist};
use medley_db::queries::{auth, media_items};
use serde::Serialize;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::context::AppContext;
use crate::lists;

/// Shortest interval the scheduler will honour.
const MIN_INTERVAL_SECS: u64 = 30;

/// Outcome of one scheduler pass.
#[derive(Debug, Default, Serialize)]
pub struct PassReport {
    pub lists_synced: usize,
    pub lists_failed: usize,
    pub tokens_pruned: usize,
}

/// Run sync passes until `cancel` fires. Returns immediately when sync is
/// disabled in the configuration.
pub async fn run_scheduler(ctx: AppContext, cancel: CancellationToken) {
    if !ctx.config.sync.enabled {
        tracing::info!("Background sync disabled");
        return;
    }
    let secs = ctx.config.sync.interval_secs.max(MIN_INTERVAL_SECS);
    tracing::info!(interval_secs = secs, "Sync scheduler started");

    let mut ticker = tokio::time::interval(Duration::from_secs(secs));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let report = run_pass(&ctx).await;
                tracing::info!(
                    synced = report.lists_synced,
                    failed = report.lists_failed,
                    tokens_pruned = report.tokens_pruned,
                    "Sync pass finished"
                );
            }
            _ = cancel.cancelled() => break,
        }
    }

    tracing::info!("Sync scheduler stopped");
}

/// One pass: sync every auto-sync list, then prune expired sessions.
pub async fn run_pass(ctx: &AppContext) -> PassReport {
    let mut report = PassReport::default();
    sync_kind::<Playlist>(ctx, &mut report).await;
    sync_kind::<Collection>(ctx, &mut report).await;

    match ctx
        .conn()
        .and_then(|conn| auth::delete_expired_tokens(&conn, Utc::now()))
    {
        Ok(n) => report.tokens_pruned = n,
        Err(e) => tracing::warn!(error = %e, "Failed to prune expired sessions"),
    }
    metrics::counter!("medley_scheduler_passes_total").increment(1);
    report
}

async fn sync_kind<L: ListData>(ctx: &AppContext, report: &mut PassReport) {
    let ids: Vec<MediaItemId> = match ctx
        .conn()
        .and_then(|conn| media_items::list_auto_sync(&conn, L::MEDIA_TYPE))
    {
        Ok(records) => records.into_iter().map(|r| r.id).collect(),
        Err(e) => {
            tracing::error!(kind = %L::KIND, error = %e, "Failed to load auto-sync lists");
            return;
        }
    };

    for id in ids {
        match lists::sync::<L>(ctx, None, id, None).await {
            Ok(sync) => {
                report.lists_synced += 1;
                let errors: usize = sync.clients.iter().map(|c| c.errors.len()).sum();
                tracing::debug!(
                    list_id = %id,
                    kind = %L::KIND,
                    items = sync.item_count,
                    hub_added = sync.hub_added,
                    hub_removed = sync.hub_removed,
                    client_errors = errors,
                    "Auto-synced list"
                );
            }
            Err(e) => {
                report.lists_failed += 1;
                tracing::warn!(list_id = %id, kind = %L::KIND, error = %e, "Auto-sync failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use medley_core::config::Config;
    use medley_core::{ItemList, MediaItem};
    use medley_db::pool::init_memory_pool;

    fn ctx(enabled: bool) -> AppContext {
        let mut config = Config::default();
        config.sync.enabled = enabled;
        AppContext::new(init_memory_pool().unwrap(), config)
    }

    #[tokio::test]
    async fn pass_syncs_only_auto_lists() {
        let ctx = ctx(true);
        {
            let conn = ctx.conn().unwrap();
            let mut auto = ItemList::new();
            auto.auto_sync = true;
            media_items::insert(&conn, &MediaItem::new("Auto", Playlist::with_list(Default::default(), auto)))
                .unwrap();
            media_items::insert(&conn, &MediaItem::new("Manual", Playlist::default())).unwrap();
        }
        let report = run_pass(&ctx).await;
        assert_eq!(report.lists_synced, 1);
        assert_eq!(report.lists_failed, 0);
    }

    #[tokio::test]
    async fn disabled_scheduler_returns_immediately() {
        let cancel = CancellationToken::new();
        tokio::time::timeout(Duration::from_secs(1), run_scheduler(ctx(false), cancel))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn scheduler_stops_on_cancel() {
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run_scheduler(ctx(true), cancel.clone()));
        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
