//! Applies reconciliation plans against clients and the catalog.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use futures::future::join_all;
use medley_clients::{ItemQuery, MediaClient};
use medley_core::{
    Change, ClientEntry, ClientId, ClientItem, ClientType, ItemKey, ItemList, ItemRef, ListKind,
    MediaItemId, MediaType, Result, SyncClients,
};
use serde::Serialize;

use crate::reconcile::{reconcile, SideEntry, SidePlan, SideSnapshot};

/// What the catalog knows about one media item.
#[derive(Debug, Clone)]
pub struct CatalogEntry {
    pub item_id: MediaItemId,
    pub media_type: MediaType,
    pub title: String,
    /// Candidate keys, canonical first.
    pub keys: Vec<ItemKey>,
    pub sync_clients: SyncClients,
}

impl CatalogEntry {
    pub fn item_ref(&self) -> ItemRef {
        let key = self
            .keys
            .first()
            .cloned()
            .unwrap_or_else(|| ItemKey::from_raw(format!("id:{}", self.item_id)));
        ItemRef::new(self.item_id, key, self.title.clone()).with_aliases(self.keys.iter().cloned())
    }
}

/// Access to the local catalog during a sync.
#[async_trait]
pub trait Catalog: Send + Sync {
    /// Match or insert the catalog item for something seen on a client and
    /// record the client's id for it.
    async fn upsert_client_item(
        &self,
        client_id: ClientId,
        client_type: ClientType,
        item: &ClientItem,
    ) -> Result<CatalogEntry>;

    async fn get(&self, item_id: MediaItemId) -> Result<Option<CatalogEntry>>;
}

#[derive(Debug, Clone, Serialize)]
pub struct ClientSyncReport {
    pub client_id: ClientId,
    /// Unknown when the linked client could not be loaded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_type: Option<ClientType>,
    /// Items pushed to the client.
    pub added: usize,
    /// Items removed from the client.
    pub removed: usize,
    /// Titles that could not be located on the client.
    pub unresolved: Vec<String>,
    pub errors: Vec<String>,
}

impl ClientSyncReport {
    pub fn new(client_id: ClientId, client_type: ClientType) -> Self {
        Self {
            client_id,
            client_type: Some(client_type),
            added: 0,
            removed: 0,
            unresolved: Vec::new(),
            errors: Vec::new(),
        }
    }

    /// Report for a link that could not take part in the run.
    pub fn unavailable(client_id: ClientId, error: impl Into<String>) -> Self {
        Self {
            client_id,
            client_type: None,
            added: 0,
            removed: 0,
            unresolved: Vec::new(),
            errors: vec![error.into()],
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    /// Items added to the local list.
    pub hub_added: usize,
    /// Items removed from the local list.
    pub hub_removed: usize,
    pub item_count: usize,
    pub tombstones_pruned: usize,
    pub clients: Vec<ClientSyncReport>,
    pub synced_at: DateTime<Utc>,
}

impl SyncReport {
    pub fn has_errors(&self) -> bool {
        self.clients.iter().any(|c| !c.errors.is_empty())
    }
}

/// Runs two-way list sync.
pub struct SyncEngine<C> {
    catalog: C,
    tombstone_retention: Duration,
}

struct Side {
    client: Arc<dyn MediaClient>,
    list_id: String,
}

impl<C: Catalog> SyncEngine<C> {
    pub fn new(catalog: C, tombstone_retention: Duration) -> Self {
        Self {
            catalog,
            tombstone_retention,
        }
    }

    pub fn catalog(&self) -> &C {
        &self.catalog
    }

    /// Sync `list` with each of `clients` it is linked to.
    pub async fn sync_list(
        &self,
        kind: ListKind,
        list: &mut ItemList,
        clients: &[Arc<dyn MediaClient>],
    ) -> Result<SyncReport> {
        self.sync_list_at(kind, list, clients, Utc::now()).await
    }

    pub async fn sync_list_at(
        &self,
        kind: ListKind,
        list: &mut ItemList,
        clients: &[Arc<dyn MediaClient>],
        now: DateTime<Utc>,
    ) -> Result<SyncReport> {
        let started = Instant::now();
        let tombstones_pruned = list.prune_tombstones(self.tombstone_retention, now);

        let mut reports: HashMap<ClientId, ClientSyncReport> = HashMap::new();
        let mut order: Vec<ClientId> = Vec::new();
        let mut sides: Vec<Side> = Vec::new();
        for client in clients {
            let id = client.client_id();
            if reports.contains_key(&id) {
                continue;
            }
            order.push(id);
            let mut report = ClientSyncReport::new(id, client.client_type());
            match list.sync_state(id) {
                Some(state) => sides.push(Side {
                    client: Arc::clone(client),
                    list_id: state.client_list_id.clone(),
                }),
                None => report.errors.push(format!("{kind} is not linked to this client")),
            }
            reports.insert(id, report);
        }

        // Fetch every client's current contents concurrently.
        let fetched = join_all(sides.iter().map(|side| snapshot(side, kind))).await;
        let mut live_sides = Vec::new();
        let mut snapshots = Vec::new();
        for (side, result) in sides.into_iter().zip(fetched) {
            let id = side.client.client_id();
            match result {
                Ok(snap) => {
                    live_sides.push(side);
                    snapshots.push(snap);
                }
                Err(e) => {
                    tracing::warn!(client_id = %id, error = %e, "Failed to read client list");
                    if let Some(r) = reports.get_mut(&id) {
                        r.errors.push(format!("failed to read list: {e}"));
                    }
                }
            }
        }

        let plan = reconcile(list, &snapshots, now);
        tracing::debug!(
            hub_additions = plan.hub_additions.len(),
            hub_removals = plan.hub_removals.len(),
            sides = plan.sides.len(),
            "Computed sync plan"
        );

        // Hub removals.
        let mut hub_removed = 0;
        for removal in &plan.hub_removals {
            if list.remove_item(removal.item_id, removal.change).is_some() {
                hub_removed += 1;
            }
        }

        // Hub additions: catalog items first, keyed by what the catalog says.
        let mut remap: HashMap<ItemKey, ItemKey> = HashMap::new();
        let mut failed: HashSet<ItemKey> = HashSet::new();
        let mut hub_added = 0;
        for add in &plan.hub_additions {
            let Some(client_type) = live_sides
                .iter()
                .find(|s| s.client.client_id() == add.source)
                .map(|s| s.client.client_type())
            else {
                continue;
            };
            match self
                .catalog
                .upsert_client_item(add.source, client_type, &add.entry.item)
                .await
            {
                Ok(entry) => {
                    let (hub_key, inserted) = insert_into_hub(list, &entry, &add.entry, add.change);
                    if let Some(item) = list.find_by_key_mut(&hub_key) {
                        item.client_entries.insert(add.source, add.entry.entry.clone());
                    }
                    if inserted {
                        hub_added += 1;
                    }
                    remap.insert(add.key.clone(), hub_key);
                }
                Err(e) => {
                    tracing::warn!(key = %add.key, error = %e, "Failed to add client item to catalog");
                    failed.insert(add.key.clone());
                    if let Some(r) = reports.get_mut(&add.source) {
                        r.errors.push(format!("catalog upsert for {} failed: {e}", add.entry.item.title));
                    }
                }
            }
        }

        // Client operations.
        for (side, side_plan) in live_sides.iter().zip(&plan.sides) {
            let id = side.client.client_id();
            let mut report = reports
                .remove(&id)
                .unwrap_or_else(|| ClientSyncReport::new(id, side.client.client_type()));
            let kept = self
                .apply_side(kind, list, side, side_plan, &remap, &failed, &mut report, now)
                .await;
            if let Some(state) = list.sync_state_mut(id) {
                state.item_keys = kept;
                state.last_synced = Some(now);
            }
            reports.insert(id, report);
        }

        list.last_synced = Some(now);

        let clients: Vec<ClientSyncReport> = order.iter().filter_map(|id| reports.remove(id)).collect();
        let pushed: usize = clients.iter().map(|c| c.added).sum();
        let pulled: usize = clients.iter().map(|c| c.removed).sum();
        metrics::counter!("medley_sync_operations_total", "op" => "hub_add").increment(hub_added as u64);
        metrics::counter!("medley_sync_operations_total", "op" => "hub_remove").increment(hub_removed as u64);
        metrics::counter!("medley_sync_operations_total", "op" => "client_add").increment(pushed as u64);
        metrics::counter!("medley_sync_operations_total", "op" => "client_remove").increment(pulled as u64);

        let report = SyncReport {
            hub_added,
            hub_removed,
            item_count: list.len(),
            tombstones_pruned,
            clients,
            synced_at: now,
        };
        let outcome = if report.has_errors() { "partial" } else { "ok" };
        metrics::counter!("medley_sync_runs_total", "outcome" => outcome).increment(1);
        metrics::histogram!("medley_sync_duration_seconds").record(started.elapsed().as_secs_f64());
        tracing::info!(
            %kind,
            hub_added,
            hub_removed,
            pushed,
            pulled,
            items = report.item_count,
            outcome,
            "List sync finished"
        );
        Ok(report)
    }

    /// Push one side's operations. Returns the hub keys present on the
    /// client afterwards.
    #[allow(clippy::too_many_arguments)]
    async fn apply_side(
        &self,
        kind: ListKind,
        list: &mut ItemList,
        side: &Side,
        plan: &SidePlan,
        remap: &HashMap<ItemKey, ItemKey>,
        failed: &HashSet<ItemKey>,
        report: &mut ClientSyncReport,
        now: DateTime<Utc>,
    ) -> Vec<ItemKey> {
        let client = side.client.as_ref();
        let id = client.client_id();
        let hub_key = |k: &ItemKey| remap.get(k).cloned().unwrap_or_else(|| k.clone());

        let mut kept = Vec::with_capacity(plan.kept.len());
        for (key, entry) in plan.kept.iter().zip(&plan.kept_entries) {
            if failed.contains(key) {
                continue;
            }
            let key = hub_key(key);
            if let Some(item) = list.find_by_key_mut(&key) {
                item.client_entries.insert(id, entry.clone());
            }
            kept.push(key);
        }

        // Removals.
        let (remove_keys, remove_entries): (Vec<ItemKey>, Vec<ClientEntry>) = plan
            .removes()
            .map(|(k, e)| (k.clone(), e.clone()))
            .unzip();
        if !remove_entries.is_empty() {
            match client.remove_list_items(kind, &side.list_id, &remove_entries).await {
                Ok(()) => report.removed += remove_entries.len(),
                Err(e) => {
                    tracing::warn!(client_id = %id, error = %e, "Failed to remove items from client list");
                    report.errors.push(format!("remove failed: {e}"));
                    for key in remove_keys.iter().map(&hub_key) {
                        if !kept.contains(&key) {
                            kept.push(key);
                        }
                    }
                }
            }
        }

        // Additions: resolve each hub item to the client's item id.
        let mut to_add: Vec<(ItemKey, MediaItemId, String)> = Vec::new();
        for key in plan.adds() {
            if failed.contains(key) {
                continue;
            }
            let key = hub_key(key);
            match self.resolve(client, list, &key).await {
                Ok(Some((item_id, client_item_id))) => to_add.push((key, item_id, client_item_id)),
                Ok(None) => {
                    let title = list
                        .find_by_key(&key)
                        .map(|i| i.title.clone())
                        .unwrap_or_else(|| key.to_string());
                    report.unresolved.push(title);
                }
                Err(e) => report.errors.push(format!("lookup for {key} failed: {e}")),
            }
        }
        if !to_add.is_empty() {
            let ids: Vec<String> = to_add.iter().map(|(_, _, c)| c.clone()).collect();
            match client.add_list_items(kind, &side.list_id, &ids).await {
                Ok(()) => {
                    report.added += to_add.len();
                    for (key, item_id, client_item_id) in to_add {
                        if let Some(item) = list.get_mut(item_id) {
                            item.client_entries.insert(
                                id,
                                ClientEntry {
                                    item_id: client_item_id,
                                    entry_id: None,
                                },
                            );
                        }
                        list.record_sync(item_id, Change::client(id, now));
                        kept.push(key);
                    }
                }
                Err(e) => {
                    tracing::warn!(client_id = %id, error = %e, "Failed to add items to client list");
                    report.errors.push(format!("add failed: {e}"));
                }
            }
        }
        kept
    }

    /// The client's id for the hub item under `key`: cached entry, then the
    /// catalog mapping, then a search on the client.
    async fn resolve(
        &self,
        client: &dyn MediaClient,
        list: &ItemList,
        key: &ItemKey,
    ) -> Result<Option<(MediaItemId, String)>> {
        let id = client.client_id();
        let Some(item) = list.find_by_key(key) else {
            return Ok(None);
        };
        let item_id = item.item_id;
        if let Some(entry) = item.client_entries.get(&id) {
            return Ok(Some((item_id, entry.item_id.clone())));
        }
        let mut keys = vec![item.key.clone()];
        keys.extend(item.aliases.iter().cloned());

        let Some(entry) = self.catalog.get(item_id).await? else {
            return Ok(None);
        };
        if let Some(mapped) = entry.sync_clients.item_id_for(id) {
            return Ok(Some((item_id, mapped.to_string())));
        }
        for k in &entry.keys {
            if !keys.contains(k) {
                keys.push(k.clone());
            }
        }
        let query = ItemQuery {
            media_type: entry.media_type,
            title: entry.title.clone(),
            keys,
        };
        let Some(found) = client.find_item(&query).await? else {
            return Ok(None);
        };
        if let Err(e) = self
            .catalog
            .upsert_client_item(id, client.client_type(), &found)
            .await
        {
            tracing::warn!(client_id = %id, error = %e, "Failed to record client mapping");
        }
        Ok(Some((item_id, found.id)))
    }
}

async fn snapshot(side: &Side, kind: ListKind) -> Result<SideSnapshot> {
    let client = side.client.as_ref();
    let entries = client.list_entries(kind, &side.list_id).await?;
    let changed_at = match client.lists(kind).await {
        Ok(lists) => lists
            .into_iter()
            .find(|l| l.id == side.list_id)
            .and_then(|l| l.updated_at),
        Err(e) => {
            tracing::debug!(client_id = %client.client_id(), error = %e, "Client did not report list timestamps");
            None
        }
    };
    Ok(SideSnapshot {
        client_id: client.client_id(),
        entries: entries.into_iter().map(SideEntry::new).collect(),
        changed_at,
    })
}

/// Add the catalog item to the hub unless it is already there under another
/// key. Returns the hub key now holding it and whether it was inserted.
fn insert_into_hub(
    list: &mut ItemList,
    entry: &CatalogEntry,
    seen: &SideEntry,
    change: Change,
) -> (ItemKey, bool) {
    if let Some(existing) = list.get(entry.item_id) {
        return (existing.key.clone(), false);
    }
    let item_ref = entry.item_ref();
    let mut aliases = item_ref.aliases.clone();
    for k in &seen.keys {
        if *k != item_ref.key && !aliases.contains(k) {
            aliases.push(k.clone());
        }
    }
    if let Some(existing) = aliases
        .iter()
        .chain(std::iter::once(&item_ref.key))
        .find_map(|k| list.find_by_key(k))
    {
        return (existing.key.clone(), false);
    }
    let key = item_ref.key.clone();
    let inserted = list.add_item(item_ref.with_aliases(aliases), None, change);
    (key, inserted)
}
