//! medley-sync: two-way sync of playlists and collections.
//!
//! [`reconcile`] is the pure core: given the local list (the hub) and the
//! current contents of every linked client list it decides, per content key,
//! what the converged list is and which operations each side needs.
//! [`SyncEngine`] fetches the client lists, applies the plan to the hub, the
//! catalog and the clients, and records per-client sync state.

pub mod engine;
pub mod reconcile;

pub use engine::{Catalog, CatalogEntry, ClientSyncReport, SyncEngine, SyncReport};
pub use reconcile::{reconcile, SideEntry, SideOp, SidePlan, SideSnapshot, SyncPlan};
