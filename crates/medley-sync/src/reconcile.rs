//! Pure reconciliation of a hub list against client snapshots.
//!
//! Every key's presence is decided by the most recent event touching it:
//! the hub item's `last_changed`, a hub tombstone's `deleted_at`, or a
//! side's observed add/remove (relative to the keys recorded at that side's
//! previous sync). Equal timestamps resolve in favour of presence. The
//! output describes the changes; nothing here performs I/O.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use medley_core::{Change, ClientEntry, ClientId, ClientItem, ItemKey, ItemList, MediaItemId};

/// One entry of a client list.
#[derive(Debug, Clone)]
pub struct SideEntry {
    /// Candidate keys, canonical first.
    pub keys: Vec<ItemKey>,
    pub entry: ClientEntry,
    pub item: ClientItem,
}

impl SideEntry {
    pub fn new(item: ClientItem) -> Self {
        Self {
            keys: ItemKey::candidates(&item.key_parts()),
            entry: ClientEntry {
                item_id: item.id.clone(),
                entry_id: item.entry_id.clone(),
            },
            item,
        }
    }
}

/// The current contents of one linked client list.
#[derive(Debug, Clone)]
pub struct SideSnapshot {
    pub client_id: ClientId,
    pub entries: Vec<SideEntry>,
    /// When the client last modified the list, if it reports it.
    pub changed_at: Option<DateTime<Utc>>,
}

/// An operation to perform on a client list.
#[derive(Debug, Clone, PartialEq)]
pub enum SideOp {
    Add { key: ItemKey },
    Remove { key: ItemKey, entry: ClientEntry },
}

#[derive(Debug, Clone)]
pub struct SidePlan {
    pub client_id: ClientId,
    pub ops: Vec<SideOp>,
    /// Keys on the client that survive this sync, in client order.
    pub kept: Vec<ItemKey>,
    /// Client entries backing `kept`, index for index.
    pub kept_entries: Vec<ClientEntry>,
}

impl SidePlan {
    pub fn adds(&self) -> impl Iterator<Item = &ItemKey> {
        self.ops.iter().filter_map(|op| match op {
            SideOp::Add { key } => Some(key),
            SideOp::Remove { .. } => None,
        })
    }

    pub fn removes(&self) -> impl Iterator<Item = (&ItemKey, &ClientEntry)> {
        self.ops.iter().filter_map(|op| match op {
            SideOp::Remove { key, entry } => Some((key, entry)),
            SideOp::Add { .. } => None,
        })
    }
}

/// A key that enters the hub from a client.
#[derive(Debug, Clone)]
pub struct HubAddition {
    pub key: ItemKey,
    pub source: ClientId,
    pub entry: SideEntry,
    pub change: Change,
}

#[derive(Debug, Clone)]
pub struct HubRemoval {
    pub key: ItemKey,
    pub item_id: MediaItemId,
    pub change: Change,
}

#[derive(Debug, Clone)]
pub struct SyncPlan {
    /// The hub's keys after the sync, in order.
    pub final_keys: Vec<ItemKey>,
    pub hub_additions: Vec<HubAddition>,
    pub hub_removals: Vec<HubRemoval>,
    /// One per snapshot, in snapshot order.
    pub sides: Vec<SidePlan>,
}

impl SyncPlan {
    /// Whether applying this plan changes nothing anywhere.
    pub fn is_noop(&self) -> bool {
        self.hub_additions.is_empty()
            && self.hub_removals.is_empty()
            && self.sides.iter().all(|s| s.ops.is_empty())
    }
}

#[derive(Debug, Clone, Copy)]
struct Event {
    present: bool,
    change: Change,
}

impl Event {
    /// Later wins; on equal time presence wins; otherwise the first seen.
    fn beats(&self, other: &Event) -> bool {
        self.change.at > other.change.at
            || (self.change.at == other.change.at && self.present && !other.present)
    }
}

/// Resolve keys to the hub's canonical keys, growing `index` so that
/// entries from different sides sharing any candidate unify.
fn canonical(index: &mut HashMap<ItemKey, ItemKey>, keys: &[ItemKey]) -> Option<ItemKey> {
    let found = keys.iter().find_map(|k| index.get(k).cloned());
    let key = found.or_else(|| keys.first().cloned())?;
    for k in keys {
        index.entry(k.clone()).or_insert_with(|| key.clone());
    }
    Some(key)
}

/// Compute the plan that converges `hub` and every side.
pub fn reconcile(hub: &ItemList, sides: &[SideSnapshot], now: DateTime<Utc>) -> SyncPlan {
    let mut index = hub.key_index();

    // Per side: canonical key -> entry index, first occurrence only.
    let mut resolved: Vec<Vec<(ItemKey, usize)>> = Vec::with_capacity(sides.len());
    // Further entries repeating a key already seen on the same side.
    let mut repeats: Vec<Vec<(ItemKey, usize)>> = Vec::with_capacity(sides.len());
    let mut new_keys: Vec<ItemKey> = Vec::new();
    let hub_keys: HashSet<&ItemKey> = hub.items.iter().map(|i| &i.key).collect();
    let mut new_seen: HashSet<ItemKey> = HashSet::new();

    for side in sides {
        let mut seen = HashSet::new();
        let mut keys = Vec::new();
        let mut dups = Vec::new();
        for (idx, entry) in side.entries.iter().enumerate() {
            let Some(key) = canonical(&mut index, &entry.keys) else {
                continue;
            };
            if !seen.insert(key.clone()) {
                dups.push((key, idx));
                continue;
            }
            if !hub_keys.contains(&key) && new_seen.insert(key.clone()) {
                new_keys.push(key.clone());
            }
            keys.push((key, idx));
        }
        resolved.push(keys);
        repeats.push(dups);
    }

    let now_sets: Vec<HashSet<&ItemKey>> = resolved
        .iter()
        .map(|keys| keys.iter().map(|(k, _)| k).collect())
        .collect();
    let prev_sets: Vec<HashSet<ItemKey>> = sides
        .iter()
        .map(|side| {
            hub.sync_state(side.client_id)
                .map(|state| {
                    state
                        .item_keys
                        .iter()
                        .map(|k| index.get(k).cloned().unwrap_or_else(|| k.clone()))
                        .collect()
                })
                .unwrap_or_default()
        })
        .collect();

    let winner = |key: &ItemKey| -> (Option<Event>, Option<usize>) {
        let mut best: Option<(Event, Option<usize>)> = None;
        let mut offer = |event: Event, side: Option<usize>| {
            if best.as_ref().map_or(true, |(b, _)| event.beats(b)) {
                best = Some((event, side));
            }
        };

        if let Some(item) = hub.items.iter().find(|i| &i.key == key) {
            offer(
                Event {
                    present: true,
                    change: Change::local_at(item.last_changed),
                },
                None,
            );
        } else if let Some(t) = hub.tombstones.iter().find(|t| &t.key == key) {
            offer(
                Event {
                    present: false,
                    change: Change {
                        by: t.deleted_by,
                        at: t.deleted_at,
                    },
                },
                None,
            );
        }

        for (s, side) in sides.iter().enumerate() {
            let in_now = now_sets[s].contains(key);
            let in_prev = prev_sets[s].contains(key);
            if in_now != in_prev {
                offer(
                    Event {
                        present: in_now,
                        change: Change::client(side.client_id, side.changed_at.unwrap_or(now)),
                    },
                    Some(s),
                );
            }
        }
        match best {
            Some((event, side)) => (Some(event), side),
            None => (None, None),
        }
    };

    let mut final_keys = Vec::new();
    let mut hub_removals = Vec::new();
    for item in &hub.items {
        let (event, _) = winner(&item.key);
        match event {
            Some(e) if !e.present => hub_removals.push(HubRemoval {
                key: item.key.clone(),
                item_id: item.item_id,
                change: e.change,
            }),
            _ => final_keys.push(item.key.clone()),
        }
    }

    let mut hub_additions = Vec::new();
    for key in new_keys {
        let (event, side) = winner(&key);
        let Some(event) = event.filter(|e| e.present) else {
            continue;
        };
        // Take the entry from the side that reported the winning add, or
        // else the first side holding the key.
        let source = side
            .filter(|s| now_sets[*s].contains(&key))
            .or_else(|| now_sets.iter().position(|set| set.contains(&key)));
        let Some(s) = source else {
            continue;
        };
        let Some(&(_, idx)) = resolved[s].iter().find(|(k, _)| *k == key) else {
            continue;
        };
        hub_additions.push(HubAddition {
            key: key.clone(),
            source: sides[s].client_id,
            entry: sides[s].entries[idx].clone(),
            change: event.change,
        });
        final_keys.push(key);
    }

    let final_set: HashSet<&ItemKey> = final_keys.iter().collect();
    let side_plans = sides
        .iter()
        .enumerate()
        .map(|(s, side)| {
            let mut ops = Vec::new();
            let mut kept = Vec::new();
            let mut kept_entries = Vec::new();
            for (key, idx) in &resolved[s] {
                if final_set.contains(key) {
                    kept.push(key.clone());
                    kept_entries.push(side.entries[*idx].entry.clone());
                } else {
                    ops.push(SideOp::Remove {
                        key: key.clone(),
                        entry: side.entries[*idx].entry.clone(),
                    });
                }
            }
            // A dropped key must leave the client entirely, or a leftover
            // copy reads as a fresh add next time.
            for (key, idx) in &repeats[s] {
                if !final_set.contains(key) {
                    ops.push(SideOp::Remove {
                        key: key.clone(),
                        entry: side.entries[*idx].entry.clone(),
                    });
                }
            }
            for key in &final_keys {
                if !now_sets[s].contains(key) {
                    ops.push(SideOp::Add { key: key.clone() });
                }
            }
            SidePlan {
                client_id: side.client_id,
                ops,
                kept,
                kept_entries,
            }
        })
        .collect();

    SyncPlan {
        final_keys,
        hub_additions,
        hub_removals,
        sides: side_plans,
    }
}
