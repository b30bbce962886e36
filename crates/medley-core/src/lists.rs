//! Ordered item lists backing playlists and collections.
//!
//! An [`ItemList`] keeps its [`ListItem`]s in a `Vec` whose index always
//! equals each item's `position`, so positions are dense, unique and start
//! at zero. Every mutation goes through a method here and records a
//! [`ChangeRecord`]; removals leave a [`Tombstone`] behind so list sync can
//! tell a deletion apart from an item it has never seen.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;

use crate::error::Result;
use crate::ids::{ClientId, MediaItemId};
use crate::keys::ItemKey;
use crate::media::{Details, MediaType};
use crate::Error;

/// History entries kept per item; older entries are dropped first.
pub const MAX_ITEM_HISTORY: usize = 32;
/// History entries kept at list level.
pub const MAX_LIST_HISTORY: usize = 256;

// ---------------------------------------------------------------------------
// Change tracking
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeType {
    Add,
    Remove,
    Reorder,
    Sync,
}

impl fmt::Display for ChangeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Add => "add",
            Self::Remove => "remove",
            Self::Reorder => "reorder",
            Self::Sync => "sync",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeRecord {
    /// `None` for local edits.
    pub client_id: Option<ClientId>,
    pub item_id: MediaItemId,
    pub change_type: ChangeType,
    pub timestamp: DateTime<Utc>,
}

/// Who made a change and when.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Change {
    pub by: Option<ClientId>,
    pub at: DateTime<Utc>,
}

impl Change {
    /// A local edit happening now.
    pub fn local() -> Self {
        Self::local_at(Utc::now())
    }

    pub fn local_at(at: DateTime<Utc>) -> Self {
        Self { by: None, at }
    }

    pub fn client(client_id: ClientId, at: DateTime<Utc>) -> Self {
        Self {
            by: Some(client_id),
            at,
        }
    }

    fn record(&self, item_id: MediaItemId, change_type: ChangeType) -> ChangeRecord {
        ChangeRecord {
            client_id: self.by,
            item_id,
            change_type,
            timestamp: self.at,
        }
    }
}

// ---------------------------------------------------------------------------
// Items
// ---------------------------------------------------------------------------

/// Cached location of a list item on one client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientEntry {
    /// The client's id for the media item.
    pub item_id: String,
    /// The client's id for this entry inside the list, when it has one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entry_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListItem {
    pub item_id: MediaItemId,
    pub position: usize,
    pub key: ItemKey,
    /// Other keys this item matches under (other external ids, fingerprint).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub aliases: Vec<ItemKey>,
    /// Title at the time the item was added.
    #[serde(default)]
    pub title: String,
    /// When the item was last added or confirmed present.
    pub last_changed: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub client_entries: BTreeMap<ClientId, ClientEntry>,
    #[serde(default)]
    pub change_history: Vec<ChangeRecord>,
}

impl ListItem {
    /// Whether `key` identifies this item.
    pub fn matches_key(&self, key: &ItemKey) -> bool {
        &self.key == key || self.aliases.contains(key)
    }

    fn push_history(&mut self, record: ChangeRecord) {
        self.change_history.push(record);
        if self.change_history.len() > MAX_ITEM_HISTORY {
            let excess = self.change_history.len() - MAX_ITEM_HISTORY;
            self.change_history.drain(..excess);
        }
    }
}

/// What the caller knows about an item being added to a list.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemRef {
    pub item_id: MediaItemId,
    pub key: ItemKey,
    pub aliases: Vec<ItemKey>,
    pub title: String,
}

impl ItemRef {
    pub fn new(item_id: MediaItemId, key: ItemKey, title: impl Into<String>) -> Self {
        Self {
            item_id,
            key,
            aliases: Vec::new(),
            title: title.into(),
        }
    }

    pub fn with_aliases(mut self, aliases: impl IntoIterator<Item = ItemKey>) -> Self {
        let key = self.key.clone();
        self.aliases = aliases.into_iter().filter(|k| *k != key).collect();
        self
    }
}

/// Record of a removed item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tombstone {
    pub key: ItemKey,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub aliases: Vec<ItemKey>,
    pub item_id: MediaItemId,
    pub deleted_at: DateTime<Utc>,
    pub deleted_by: Option<ClientId>,
}

impl Tombstone {
    pub fn matches_key(&self, key: &ItemKey) -> bool {
        &self.key == key || self.aliases.contains(key)
    }
}

/// Per-client sync bookkeeping for a linked list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListSyncState {
    pub client_id: ClientId,
    pub client_list_id: String,
    /// Hub keys present on the client after the last sync.
    #[serde(default)]
    pub item_keys: Vec<ItemKey>,
    pub last_synced: Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------------------
// Smart lists
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SmartSort {
    #[default]
    Title,
    Year,
    Rating,
    Added,
}

/// Query that generates the contents of a smart list.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SmartCriteria {
    /// Empty means every non-list type.
    pub media_types: Vec<MediaType>,
    /// Items must carry at least one of these genres (case-insensitive).
    pub genres: Vec<String>,
    pub year_from: Option<i32>,
    pub year_to: Option<i32>,
    pub min_rating: Option<f64>,
    pub title_contains: Option<String>,
    pub sort: SmartSort,
    pub descending: bool,
    pub limit: Option<usize>,
}

impl SmartCriteria {
    pub fn validate(&self) -> Result<()> {
        if let (Some(from), Some(to)) = (self.year_from, self.year_to) {
            if from > to {
                return Err(Error::Validation(format!(
                    "year_from ({from}) is after year_to ({to})"
                )));
            }
        }
        if self.media_types.iter().any(MediaType::is_list) {
            return Err(Error::Validation(
                "smart lists cannot contain playlists or collections".into(),
            ));
        }
        if self.limit == Some(0) {
            return Err(Error::Validation("limit must be positive".into()));
        }
        Ok(())
    }

    pub fn accepts_type(&self, media_type: MediaType) -> bool {
        if media_type.is_list() {
            return false;
        }
        self.media_types.is_empty() || self.media_types.contains(&media_type)
    }

    /// Whether a catalog item satisfies every filter.
    pub fn matches(
        &self,
        media_type: MediaType,
        title: &str,
        year: Option<i32>,
        details: &Details,
    ) -> bool {
        if !self.accepts_type(media_type) {
            return false;
        }
        if let Some(from) = self.year_from {
            if year.map_or(true, |y| y < from) {
                return false;
            }
        }
        if let Some(to) = self.year_to {
            if year.map_or(true, |y| y > to) {
                return false;
            }
        }
        if let Some(min) = self.min_rating {
            if details.rating.map_or(true, |r| r < min) {
                return false;
            }
        }
        if let Some(ref needle) = self.title_contains {
            if !title.to_lowercase().contains(&needle.to_lowercase()) {
                return false;
            }
        }
        if !self.genres.is_empty() {
            let hit = details
                .genres
                .iter()
                .any(|g| self.genres.iter().any(|want| want.eq_ignore_ascii_case(g)));
            if !hit {
                return false;
            }
        }
        true
    }
}

// ---------------------------------------------------------------------------
// ItemList
// ---------------------------------------------------------------------------

/// Ordered list of catalog items with change history and sync state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ItemList {
    pub items: Vec<ListItem>,
    pub item_count: usize,
    pub is_public: bool,
    pub is_smart: bool,
    pub smart_criteria: Option<SmartCriteria>,
    /// Include this list in scheduled background sync.
    pub auto_sync: bool,
    pub tombstones: Vec<Tombstone>,
    /// List-level history (removals and syncs).
    pub history: Vec<ChangeRecord>,
    pub sync_clients: Vec<ListSyncState>,
    pub last_modified: Option<DateTime<Utc>>,
    pub modified_by: Option<ClientId>,
    pub last_synced: Option<DateTime<Utc>>,
}

impl ItemList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Item ids in list order.
    pub fn item_ids(&self) -> Vec<MediaItemId> {
        self.items.iter().map(|i| i.item_id).collect()
    }

    pub fn contains(&self, item_id: MediaItemId) -> bool {
        self.position_of(item_id).is_some()
    }

    pub fn position_of(&self, item_id: MediaItemId) -> Option<usize> {
        self.items.iter().position(|i| i.item_id == item_id)
    }

    pub fn get(&self, item_id: MediaItemId) -> Option<&ListItem> {
        self.items.iter().find(|i| i.item_id == item_id)
    }

    pub fn get_mut(&mut self, item_id: MediaItemId) -> Option<&mut ListItem> {
        self.items.iter_mut().find(|i| i.item_id == item_id)
    }

    /// Live item matching `key` by its canonical key or an alias.
    pub fn find_by_key(&self, key: &ItemKey) -> Option<&ListItem> {
        self.items.iter().find(|i| i.matches_key(key))
    }

    pub fn find_by_key_mut(&mut self, key: &ItemKey) -> Option<&mut ListItem> {
        self.items.iter_mut().find(|i| i.matches_key(key))
    }

    pub fn tombstone_for(&self, key: &ItemKey) -> Option<&Tombstone> {
        self.tombstones.iter().find(|t| t.matches_key(key))
    }

    /// Map from every known key and alias (live and tombstoned) to the
    /// canonical key it belongs to.
    pub fn key_index(&self) -> HashMap<ItemKey, ItemKey> {
        let mut index = HashMap::new();
        for t in &self.tombstones {
            index.insert(t.key.clone(), t.key.clone());
            for alias in &t.aliases {
                index.entry(alias.clone()).or_insert_with(|| t.key.clone());
            }
        }
        // Live items override tombstones.
        for item in &self.items {
            index.insert(item.key.clone(), item.key.clone());
            for alias in &item.aliases {
                index.insert(alias.clone(), item.key.clone());
            }
        }
        index
    }

    /// Insert an item at `at` (append when `None` or past the end).
    ///
    /// Returns `false` without changing anything when the item id or its
    /// key is already present.
    pub fn add_item(&mut self, item: ItemRef, at: Option<usize>, change: Change) -> bool {
        if self.contains(item.item_id) || self.find_by_key(&item.key).is_some() {
            return false;
        }

        let pos = at.unwrap_or(self.items.len()).min(self.items.len());
        self.tombstones
            .retain(|t| !t.matches_key(&item.key) && t.item_id != item.item_id);

        let mut entry = ListItem {
            item_id: item.item_id,
            position: pos,
            key: item.key,
            aliases: item.aliases,
            title: item.title,
            last_changed: change.at,
            client_entries: BTreeMap::new(),
            change_history: Vec::new(),
        };
        entry.push_history(change.record(entry.item_id, ChangeType::Add));
        self.items.insert(pos, entry);
        self.renumber_from(pos);
        self.touch(change);
        true
    }

    /// Remove an item, leaving a tombstone. Returns the removed item.
    pub fn remove_item(&mut self, item_id: MediaItemId, change: Change) -> Option<ListItem> {
        let pos = self.position_of(item_id)?;
        let mut removed = self.items.remove(pos);
        self.renumber_from(pos);

        let record = change.record(item_id, ChangeType::Remove);
        removed.push_history(record.clone());
        self.push_history(record);

        self.tombstones.retain(|t| t.key != removed.key);
        self.tombstones.push(Tombstone {
            key: removed.key.clone(),
            aliases: removed.aliases.clone(),
            item_id,
            deleted_at: change.at,
            deleted_by: change.by,
        });
        self.touch(change);
        Some(removed)
    }

    /// Move an item to `new_position`, clamped to the end of the list.
    pub fn move_item(
        &mut self,
        item_id: MediaItemId,
        new_position: usize,
        change: Change,
    ) -> Result<()> {
        let from = self
            .position_of(item_id)
            .ok_or_else(|| Error::not_found("list item", item_id))?;
        let to = new_position.min(self.items.len() - 1);
        if from == to {
            return Ok(());
        }

        let mut item = self.items.remove(from);
        item.push_history(change.record(item_id, ChangeType::Reorder));
        self.items.insert(to, item);
        self.renumber_from(from.min(to));
        self.touch(change);
        Ok(())
    }

    /// Replace the order with `ids`, which must be a permutation of the
    /// current item ids.
    pub fn reorder(&mut self, ids: &[MediaItemId], change: Change) -> Result<()> {
        if ids.len() != self.items.len() {
            return Err(Error::Validation(format!(
                "reorder expects {} item ids, got {}",
                self.items.len(),
                ids.len()
            )));
        }
        let mut seen = HashSet::with_capacity(ids.len());
        for id in ids {
            if !seen.insert(*id) {
                return Err(Error::Validation(format!("duplicate item id in reorder: {id}")));
            }
            if !self.contains(*id) {
                return Err(Error::Validation(format!("item {id} is not in the list")));
            }
        }

        let mut by_id: HashMap<MediaItemId, ListItem> =
            self.items.drain(..).map(|i| (i.item_id, i)).collect();
        for (pos, id) in ids.iter().enumerate() {
            if let Some(mut item) = by_id.remove(id) {
                if item.position != pos {
                    item.push_history(change.record(*id, ChangeType::Reorder));
                }
                item.position = pos;
                self.items.push(item);
            }
        }
        self.touch(change);
        Ok(())
    }

    /// Make the live items exactly `targets`, in that order, using add and
    /// remove so history and tombstones stay accurate.
    ///
    /// Returns `(added, removed)` counts.
    pub fn replace_items(&mut self, targets: Vec<ItemRef>, change: Change) -> (usize, usize) {
        let wanted: HashSet<MediaItemId> = targets.iter().map(|t| t.item_id).collect();
        let stale: Vec<MediaItemId> = self
            .items
            .iter()
            .filter(|i| !wanted.contains(&i.item_id))
            .map(|i| i.item_id)
            .collect();
        let removed = stale
            .into_iter()
            .filter(|id| self.remove_item(*id, change).is_some())
            .count();

        let order: Vec<MediaItemId> = targets.iter().map(|t| t.item_id).collect();
        let mut added = 0;
        for target in targets {
            if self.add_item(target, None, change) {
                added += 1;
            }
        }

        // Targets whose key collided with an existing entry were skipped.
        let final_order: Vec<MediaItemId> =
            order.into_iter().filter(|id| self.contains(*id)).collect();
        if final_order.len() == self.items.len() && final_order != self.item_ids() {
            // A permutation by construction.
            let _ = self.reorder(&final_order, change);
        }
        (added, removed)
    }

    /// Check position, count and uniqueness invariants.
    pub fn validate(&self) -> Result<()> {
        if self.item_count != self.items.len() {
            return Err(Error::Validation(format!(
                "item_count {} does not match {} items",
                self.item_count,
                self.items.len()
            )));
        }
        let mut ids = HashSet::with_capacity(self.items.len());
        let mut keys = HashSet::with_capacity(self.items.len());
        for (idx, item) in self.items.iter().enumerate() {
            if item.position != idx {
                return Err(Error::Validation(format!(
                    "item {} has position {} at index {idx}",
                    item.item_id, item.position
                )));
            }
            if !ids.insert(item.item_id) {
                return Err(Error::Validation(format!("duplicate item {}", item.item_id)));
            }
            if !keys.insert(&item.key) {
                return Err(Error::Validation(format!("duplicate key {}", item.key)));
            }
        }
        Ok(())
    }

    /// Repair ordering: sort by stored position, drop duplicate ids, then
    /// reassign dense positions.
    pub fn normalize(&mut self) {
        self.items.sort_by_key(|i| i.position);
        let mut seen = HashSet::with_capacity(self.items.len());
        self.items.retain(|i| seen.insert(i.item_id));
        self.renumber_from(0);
    }

    /// Drop tombstones deleted before `now - retention`. Returns how many
    /// were dropped.
    pub fn prune_tombstones(&mut self, retention: Duration, now: DateTime<Utc>) -> usize {
        let cutoff = now - retention;
        let before = self.tombstones.len();
        self.tombstones.retain(|t| t.deleted_at >= cutoff);
        before - self.tombstones.len()
    }

    pub fn sync_state(&self, client_id: ClientId) -> Option<&ListSyncState> {
        self.sync_clients.iter().find(|s| s.client_id == client_id)
    }

    pub fn sync_state_mut(&mut self, client_id: ClientId) -> Option<&mut ListSyncState> {
        self.sync_clients.iter_mut().find(|s| s.client_id == client_id)
    }

    /// Link a client list. Relinking to a different list resets the
    /// client's sync state.
    pub fn link_client(&mut self, client_id: ClientId, client_list_id: impl Into<String>) {
        let client_list_id = client_list_id.into();
        match self.sync_state_mut(client_id) {
            Some(state) if state.client_list_id == client_list_id => {}
            Some(state) => {
                state.client_list_id = client_list_id;
                state.item_keys.clear();
                state.last_synced = None;
            }
            None => self.sync_clients.push(ListSyncState {
                client_id,
                client_list_id,
                item_keys: Vec::new(),
                last_synced: None,
            }),
        }
    }

    /// Remove a client link and its cached entry ids.
    pub fn unlink_client(&mut self, client_id: ClientId) -> bool {
        let before = self.sync_clients.len();
        self.sync_clients.retain(|s| s.client_id != client_id);
        for item in &mut self.items {
            item.client_entries.remove(&client_id);
        }
        self.sync_clients.len() != before
    }

    /// Note that `client` confirmed `item_id` during a sync.
    pub fn record_sync(&mut self, item_id: MediaItemId, change: Change) {
        if let Some(item) = self.get_mut(item_id) {
            item.push_history(change.record(item_id, ChangeType::Sync));
        }
    }

    /// Record a list-level change.
    pub fn push_history(&mut self, record: ChangeRecord) {
        self.history.push(record);
        if self.history.len() > MAX_LIST_HISTORY {
            let excess = self.history.len() - MAX_LIST_HISTORY;
            self.history.drain(..excess);
        }
    }

    fn renumber_from(&mut self, start: usize) {
        for (idx, item) in self.items.iter_mut().enumerate().skip(start) {
            item.position = idx;
        }
        self.item_count = self.items.len();
    }

    fn touch(&mut self, change: Change) {
        self.last_modified = Some(change.at);
        self.modified_by = change.by;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(title: &str) -> ItemRef {
        ItemRef::new(
            MediaItemId::new(),
            ItemKey::from_raw(format!("fp:{title}")),
            title,
        )
    }

    fn list_of(titles: &[&str]) -> (ItemList, Vec<MediaItemId>) {
        let mut list = ItemList::new();
        let mut ids = Vec::new();
        for t in titles {
            let r = item(t);
            ids.push(r.item_id);
            assert!(list.add_item(r, None, Change::local()));
        }
        (list, ids)
    }

    fn titles(list: &ItemList) -> Vec<&str> {
        list.items.iter().map(|i| i.title.as_str()).collect()
    }

    #[test]
    fn append_keeps_dense_positions() {
        let (list, _) = list_of(&["a", "b", "c"]);
        assert_eq!(list.item_count, 3);
        assert_eq!(titles(&list), ["a", "b", "c"]);
        list.validate().unwrap();
    }

    #[test]
    fn insert_shifts_trailing_items() {
        let (mut list, _) = list_of(&["a", "b", "c"]);
        assert!(list.add_item(item("x"), Some(1), Change::local()));
        assert_eq!(titles(&list), ["a", "x", "b", "c"]);
        assert_eq!(list.items[3].position, 3);
        list.validate().unwrap();
    }

    #[test]
    fn insert_past_end_appends() {
        let (mut list, _) = list_of(&["a"]);
        assert!(list.add_item(item("z"), Some(99), Change::local()));
        assert_eq!(titles(&list), ["a", "z"]);
    }

    #[test]
    fn duplicate_add_is_noop() {
        let (mut list, ids) = list_of(&["a"]);
        let dup = ItemRef::new(ids[0], ItemKey::from_raw("fp:other"), "a");
        assert!(!list.add_item(dup, None, Change::local()));
        let same_key = item("a");
        assert!(!list.add_item(same_key, None, Change::local()));
        assert_eq!(list.item_count, 1);
    }

    #[test]
    fn remove_shifts_down_and_tombstones() {
        let client = ClientId::new();
        let (mut list, ids) = list_of(&["a", "b", "c"]);
        let removed = list
            .remove_item(ids[0], Change::client(client, Utc::now()))
            .unwrap();
        assert_eq!(removed.title, "a");
        assert_eq!(titles(&list), ["b", "c"]);
        assert_eq!(list.items[0].position, 0);
        assert_eq!(list.tombstones.len(), 1);
        assert_eq!(list.tombstones[0].deleted_by, Some(client));
        assert_eq!(list.history.last().unwrap().change_type, ChangeType::Remove);
        assert_eq!(list.modified_by, Some(client));
        list.validate().unwrap();
    }

    #[test]
    fn remove_missing_returns_none() {
        let (mut list, _) = list_of(&["a"]);
        assert!(list.remove_item(MediaItemId::new(), Change::local()).is_none());
        assert!(list.tombstones.is_empty());
    }

    #[test]
    fn readd_clears_tombstone() {
        let (mut list, ids) = list_of(&["a"]);
        let key = list.items[0].key.clone();
        list.remove_item(ids[0], Change::local());
        assert!(list.tombstone_for(&key).is_some());
        assert!(list.add_item(ItemRef::new(ids[0], key.clone(), "a"), None, Change::local()));
        assert!(list.tombstone_for(&key).is_none());
    }

    #[test]
    fn move_clamps_to_end() {
        let (mut list, ids) = list_of(&["a", "b", "c"]);
        list.move_item(ids[0], 10, Change::local()).unwrap();
        assert_eq!(titles(&list), ["b", "c", "a"]);
        list.move_item(ids[0], 0, Change::local()).unwrap();
        assert_eq!(titles(&list), ["a", "b", "c"]);
        list.validate().unwrap();
        let history = &list.items[0].change_history;
        assert_eq!(history.last().unwrap().change_type, ChangeType::Reorder);
    }

    #[test]
    fn move_missing_is_not_found() {
        let (mut list, _) = list_of(&["a"]);
        let err = list.move_item(MediaItemId::new(), 0, Change::local()).unwrap_err();
        assert_eq!(err.http_status(), 404);
    }

    #[test]
    fn reorder_requires_permutation() {
        let (mut list, ids) = list_of(&["a", "b", "c"]);
        assert!(list.reorder(&ids[..2], Change::local()).is_err());
        assert!(list.reorder(&[ids[0], ids[0], ids[1]], Change::local()).is_err());
        assert!(list
            .reorder(&[ids[0], ids[1], MediaItemId::new()], Change::local())
            .is_err());
        assert_eq!(titles(&list), ["a", "b", "c"]);

        list.reorder(&[ids[2], ids[0], ids[1]], Change::local()).unwrap();
        assert_eq!(titles(&list), ["c", "a", "b"]);
        list.validate().unwrap();
    }

    #[test]
    fn normalize_repairs_positions() {
        let (mut list, _) = list_of(&["a", "b", "c"]);
        list.items[0].position = 7;
        list.items[1].position = 3;
        list.items[2].position = 3;
        list.item_count = 10;
        assert!(list.validate().is_err());
        list.normalize();
        list.validate().unwrap();
        assert_eq!(titles(&list), ["b", "c", "a"]);
    }

    #[test]
    fn normalize_drops_duplicate_ids() {
        let (mut list, _) = list_of(&["a", "b"]);
        let mut dup = list.items[0].clone();
        dup.position = 5;
        dup.key = ItemKey::from_raw("fp:dup");
        list.items.push(dup);
        list.normalize();
        assert_eq!(list.item_count, 2);
        list.validate().unwrap();
    }

    #[test]
    fn replace_items_uses_add_and_remove() {
        let (mut list, _) = list_of(&["a", "b", "c"]);
        let keep_b = ItemRef::new(list.items[1].item_id, list.items[1].key.clone(), "b");
        let new_d = item("d");
        let (added, removed) = list.replace_items(vec![new_d, keep_b], Change::local());
        assert_eq!((added, removed), (1, 2));
        assert_eq!(titles(&list), ["d", "b"]);
        assert_eq!(list.tombstones.len(), 2);
        list.validate().unwrap();
    }

    #[test]
    fn prune_drops_old_tombstones() {
        let (mut list, ids) = list_of(&["a", "b"]);
        let now = Utc::now();
        list.remove_item(ids[0], Change::local_at(now - Duration::days(100)));
        list.remove_item(ids[1], Change::local_at(now - Duration::days(1)));
        assert_eq!(list.prune_tombstones(Duration::days(90), now), 1);
        assert_eq!(list.tombstones.len(), 1);
    }

    #[test]
    fn key_index_resolves_aliases() {
        let mut list = ItemList::new();
        let r = ItemRef::new(MediaItemId::new(), ItemKey::from_raw("imdb:tt1"), "x")
            .with_aliases([ItemKey::from_raw("fp:abc"), ItemKey::from_raw("imdb:tt1")]);
        assert_eq!(r.aliases.len(), 1);
        list.add_item(r, None, Change::local());
        let index = list.key_index();
        assert_eq!(
            index.get(&ItemKey::from_raw("fp:abc")),
            Some(&ItemKey::from_raw("imdb:tt1"))
        );
        assert!(list.find_by_key(&ItemKey::from_raw("fp:abc")).is_some());
    }

    #[test]
    fn link_and_unlink_clients() {
        let client = ClientId::new();
        let (mut list, _) = list_of(&["a"]);
        list.link_client(client, "pl-1");
        list.sync_state_mut(client).unwrap().item_keys = vec![ItemKey::from_raw("fp:a")];
        list.link_client(client, "pl-1");
        assert_eq!(list.sync_state(client).unwrap().item_keys.len(), 1);
        list.link_client(client, "pl-2");
        assert!(list.sync_state(client).unwrap().item_keys.is_empty());

        list.items[0].client_entries.insert(
            client,
            ClientEntry {
                item_id: "x".into(),
                entry_id: None,
            },
        );
        assert!(list.unlink_client(client));
        assert!(list.items[0].client_entries.is_empty());
        assert!(!list.unlink_client(client));
    }

    #[test]
    fn item_history_is_bounded() {
        let (mut list, ids) = list_of(&["a", "b"]);
        for i in 0..(MAX_ITEM_HISTORY + 5) {
            list.move_item(ids[0], (i + 1) % 2, Change::local()).unwrap();
        }
        for item in &list.items {
            assert!(item.change_history.len() <= MAX_ITEM_HISTORY);
        }
    }

    #[test]
    fn smart_criteria_filters() {
        let criteria = SmartCriteria {
            media_types: vec![MediaType::Movie],
            genres: vec!["sci-fi".into()],
            year_from: Some(1990),
            min_rating: Some(7.0),
            ..Default::default()
        };
        let mut details = Details {
            genres: vec!["Sci-Fi".into()],
            rating: Some(8.7),
            ..Default::default()
        };
        assert!(criteria.matches(MediaType::Movie, "The Matrix", Some(1999), &details));
        assert!(!criteria.matches(MediaType::Series, "The Matrix", Some(1999), &details));
        assert!(!criteria.matches(MediaType::Movie, "Metropolis", Some(1927), &details));
        assert!(!criteria.matches(MediaType::Movie, "Undated", None, &details));
        details.rating = Some(5.0);
        assert!(!criteria.matches(MediaType::Movie, "The Matrix", Some(1999), &details));
    }

    #[test]
    fn smart_criteria_validation() {
        let bad_range = SmartCriteria {
            year_from: Some(2000),
            year_to: Some(1990),
            ..Default::default()
        };
        assert!(bad_range.validate().is_err());
        let lists = SmartCriteria {
            media_types: vec![MediaType::Playlist],
            ..Default::default()
        };
        assert!(lists.validate().is_err());
        assert!(SmartCriteria::default().validate().is_ok());
    }

    #[test]
    fn json_roundtrip_preserves_invariants() {
        let (list, _) = list_of(&["a", "b"]);
        let json = serde_json::to_string(&list).unwrap();
        let back: ItemList = serde_json::from_str(&json).unwrap();
        back.validate().unwrap();
        assert_eq!(back.item_ids(), list.item_ids());
    }
}
