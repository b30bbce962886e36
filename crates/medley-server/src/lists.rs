//! Loading, permission checks, smart refresh and sync for stored lists.

use std::cmp::Ordering;
use std::sync::Arc;

use chrono::Utc;
use medley_clients::MediaClient;
use medley_core::{
    Change, ClientId, ClientList, Error, ItemList, ItemRef, ListData, MediaItem, MediaItemId,
    MediaType, Result, SmartCriteria, SmartSort,
};
use medley_db::models::MediaRecord;
use medley_db::queries::media_items::{self, MediaQuery};
use medley_sync::{ClientSyncReport, SyncReport};
use rusqlite::Connection;

use crate::context::AppContext;
use crate::middleware::auth::AuthUser;

/// Page size used when scanning the catalog for smart lists.
const SMART_SCAN_PAGE: u32 = 500;
/// Hard cap on catalog rows considered for one smart list.
const SMART_SCAN_MAX: u64 = 20_000;

pub fn load<L: ListData>(conn: &Connection, id: MediaItemId) -> Result<MediaItem<L>> {
    media_items::get::<L>(conn, id)?.ok_or_else(|| Error::not_found(L::KIND.as_str(), id))
}

/// Owners, admins and anyone for public lists may read.
pub fn can_read<L: ListData>(item: &MediaItem<L>, user: &AuthUser) -> bool {
    user.is_admin
        || item.owner_id.map_or(true, |owner| owner == user.id)
        || item.data.list().is_public
}

pub fn ensure_read<L: ListData>(item: &MediaItem<L>, user: &AuthUser) -> Result<()> {
    if can_read(item, user) {
        Ok(())
    } else {
        // Private lists of other users are indistinguishable from missing ones.
        Err(Error::not_found(L::KIND.as_str(), item.id))
    }
}

/// Only the owner (or an admin) may change a list.
pub fn ensure_write<L: ListData>(item: &MediaItem<L>, user: &AuthUser) -> Result<()> {
    ensure_read(item, user)?;
    match item.owner_id {
        Some(owner) if owner != user.id && !user.is_admin => Err(Error::Forbidden(format!(
            "only the owner can modify this {}",
            L::KIND
        ))),
        None if !user.is_admin => Err(Error::Forbidden(format!(
            "only admins can modify shared {}s",
            L::KIND
        ))),
        _ => Ok(()),
    }
}

pub fn save<L: ListData>(conn: &Connection, item: &mut MediaItem<L>) -> Result<()> {
    let list = item.data.list_mut();
    if list.validate().is_err() {
        tracing::warn!(list_id = %item.id, "Repairing list positions before save");
        list.normalize();
    }
    item.updated_at = Utc::now();
    if !media_items::update(conn, item)? {
        return Err(Error::not_found(L::KIND.as_str(), item.id));
    }
    Ok(())
}

/// Catalog rows for the list's items, in list order. Items whose catalog
/// row is gone are skipped.
pub fn resolve_items(conn: &Connection, list: &ItemList) -> Result<Vec<MediaRecord>> {
    media_items::get_records(conn, &list.item_ids())
}

/// Catalog items matching `criteria`, ordered and truncated.
pub fn smart_targets(conn: &Connection, criteria: &SmartCriteria) -> Result<Vec<ItemRef>> {
    criteria.validate()?;
    let types: Vec<MediaType> = if criteria.media_types.is_empty() {
        MediaType::ALL.iter().copied().filter(|t| !t.is_list()).collect()
    } else {
        criteria.media_types.clone()
    };

    let mut matched: Vec<MediaRecord> = Vec::new();
    for media_type in types {
        let mut query = MediaQuery::for_type(media_type);
        query.q = criteria.title_contains.clone();
        query.limit = SMART_SCAN_PAGE;
        loop {
            let (rows, total) = media_items::search(conn, &query)?;
            let fetched = rows.len() as u32;
            matched.extend(rows.into_iter().filter(|r| {
                criteria.matches(r.media_type, &r.title, r.release_year, &r.details())
            }));
            query.offset += fetched;
            if fetched < SMART_SCAN_PAGE || u64::from(query.offset) >= total.min(SMART_SCAN_MAX) {
                break;
            }
        }
    }

    matched.sort_by(|a, b| {
        let ord = compare_smart(criteria.sort, a, b);
        if criteria.descending {
            ord.reverse()
        } else {
            ord
        }
    });
    if let Some(limit) = criteria.limit {
        matched.truncate(limit);
    }
    matched.iter().map(MediaRecord::item_ref).collect()
}

fn compare_smart(sort: SmartSort, a: &MediaRecord, b: &MediaRecord) -> Ordering {
    let by_title = || a.title.to_lowercase().cmp(&b.title.to_lowercase());
    match sort {
        SmartSort::Title => by_title(),
        SmartSort::Year => a.release_year.cmp(&b.release_year).then_with(by_title),
        SmartSort::Rating => a
            .details()
            .rating
            .partial_cmp(&b.details().rating)
            .unwrap_or(Ordering::Equal)
            .then_with(by_title),
        SmartSort::Added => a.created_at.cmp(&b.created_at).then_with(by_title),
    }
}

/// Regenerate a smart list's contents. Returns `(added, removed)`.
pub fn refresh_smart<L: ListData>(conn: &Connection, item: &mut MediaItem<L>) -> Result<(usize, usize)> {
    let list = item.data.list();
    if !list.is_smart {
        return Err(Error::Validation(format!("{} is not a smart {}", item.id, L::KIND)));
    }
    let criteria = list
        .smart_criteria
        .clone()
        .ok_or_else(|| Error::Validation("smart list has no criteria".into()))?;
    let targets = smart_targets(conn, &criteria)?;
    let counts = item.data.list_mut().replace_items(targets, Change::local());
    tracing::debug!(list_id = %item.id, added = counts.0, removed = counts.1, "Refreshed smart list");
    Ok(counts)
}

/// Build a catalog reference for `item_id`, rejecting lists.
pub fn item_ref(conn: &Connection, item_id: MediaItemId) -> Result<ItemRef> {
    let record = media_items::get_record(conn, item_id)?
        .ok_or_else(|| Error::not_found("media item", item_id))?;
    if record.media_type.is_list() {
        return Err(Error::Validation("lists cannot contain other lists".into()));
    }
    record.item_ref()
}

/// Link a list to a client list, creating one on the client when
/// `client_list_id` is `None`. Returns the client list id.
pub async fn link<L: ListData>(
    ctx: &AppContext,
    user: AuthUser,
    list_id: MediaItemId,
    client_id: ClientId,
    client_list_id: Option<String>,
) -> Result<String> {
    let _guard = ctx.lock_list(list_id).await;
    let client = ctx.user_client(user.id, client_id)?;
    let adapter = ctx.adapter(&client)?;
    if !adapter.capabilities().supports_lists(L::KIND) {
        return Err(Error::Unsupported(format!(
            "{} does not support {}s",
            client.client_type,
            L::KIND
        )));
    }

    let (mut item, records) = {
        let conn = ctx.conn()?;
        let item = load::<L>(&conn, list_id)?;
        ensure_write(&item, &user)?;
        let records = resolve_items(&conn, item.data.list())?;
        (item, records)
    };

    let remote_id = match client_list_id {
        Some(id) => id,
        None => {
            // Seed the new client list with whatever is already mapped.
            let ids: Vec<String> = records
                .iter()
                .filter_map(|r| r.sync_clients.item_id_for(client_id).map(str::to_string))
                .collect();
            let item_type = records.first().map(|r| r.media_type);
            let created: ClientList = adapter
                .create_list(L::KIND, &item.title, item_type, &ids)
                .await?;
            tracing::info!(
                %list_id,
                %client_id,
                client_list_id = %created.id,
                seeded = ids.len(),
                "Created client list"
            );
            created.id
        }
    };

    item.data.list_mut().link_client(client_id, remote_id.clone());
    let conn = ctx.conn()?;
    save(&conn, &mut item)?;
    Ok(remote_id)
}

/// Two-way sync of one stored list. `user` is `None` for scheduled runs;
/// `only` restricts the run to some linked clients.
pub async fn sync<L: ListData>(
    ctx: &AppContext,
    user: Option<AuthUser>,
    list_id: MediaItemId,
    only: Option<&[ClientId]>,
) -> Result<SyncReport> {
    let _guard = ctx.lock_list(list_id).await;
    let mut item = {
        let conn = ctx.conn()?;
        load::<L>(&conn, list_id)?
    };
    if let Some(ref user) = user {
        ensure_write(&item, user)?;
    }
    let owner = item.owner_id.or(user.map(|u| u.id));

    let mut adapters: Vec<Arc<dyn MediaClient>> = Vec::new();
    let mut skipped: Vec<ClientSyncReport> = Vec::new();
    let linked: Vec<ClientId> = item
        .data
        .list()
        .sync_clients
        .iter()
        .map(|s| s.client_id)
        .filter(|id| only.map_or(true, |o| o.contains(id)))
        .collect();
    if let Some(only) = only {
        if let Some(missing) = only.iter().find(|id| !linked.contains(id)) {
            return Err(Error::Validation(format!("client {missing} is not linked to this {}", L::KIND)));
        }
    }
    {
        let conn = ctx.conn()?;
        for client_id in linked {
            let client = medley_db::queries::clients::get_client(&conn, client_id)?
                .filter(|c| owner.map_or(true, |o| o == c.user_id));
            let Some(client) = client else {
                tracing::warn!(%list_id, %client_id, "Linked client no longer exists");
                skipped.push(ClientSyncReport::unavailable(
                    client_id,
                    format!("client {client_id} no longer exists"),
                ));
                continue;
            };
            match ctx.adapter(&client) {
                Ok(adapter) => adapters.push(adapter),
                Err(e) => {
                    let mut report = ClientSyncReport::new(client.id, client.client_type);
                    report.errors.push(e.to_string());
                    skipped.push(report);
                }
            }
        }
    }

    let mut report = ctx
        .sync_engine()
        .sync_list(L::KIND, item.data.list_mut(), &adapters)
        .await?;
    report.clients.extend(skipped);

    let conn = ctx.conn()?;
    save(&conn, &mut item)?;
    Ok(report)
}

/// Create a local list mirroring a client list, link it and pull its items.
pub async fn import<L: ListData>(
    ctx: &AppContext,
    user: AuthUser,
    client_id: ClientId,
    client_list_id: &str,
) -> Result<(MediaItem<L>, SyncReport)> {
    let client = ctx.user_client(user.id, client_id)?;
    let adapter = ctx.adapter(&client)?;
    let remote = adapter
        .lists(L::KIND)
        .await?
        .into_iter()
        .find(|l| l.id == client_list_id)
        .ok_or_else(|| Error::not_found(format!("{} {}", client.client_type, L::KIND), client_list_id))?;

    let mut list = ItemList::new();
    list.link_client(client_id, remote.id.clone());
    let mut item = MediaItem::new(remote.title.clone(), L::with_list(Default::default(), list));
    item.owner_id = Some(user.id);
    {
        let conn = ctx.conn()?;
        media_items::insert(&conn, &item)?;
    }
    tracing::info!(list_id = %item.id, %client_id, client_list_id, "Imported client list");

    let report = sync::<L>(ctx, Some(user), item.id, None).await?;
    let conn = ctx.conn()?;
    let item = load::<L>(&conn, item.id)?;
    Ok((item, report))
}

#[cfg(test)]
mod tests {
    use super::*;
    use medley_core::{Details, Movie, Playlist, UserId};
    use medley_db::pool::init_memory_pool;

    fn movie(conn: &Connection, title: &str, year: i32, rating: f64, genre: &str) -> MediaItemId {
        let mut m = MediaItem::new(title, Movie::default());
        m.release_year = Some(year);
        m.data.details.rating = Some(rating);
        m.data.details.genres = vec![genre.to_string()];
        media_items::insert(conn, &m).unwrap();
        m.id
    }

    fn user(is_admin: bool) -> AuthUser {
        AuthUser {
            id: UserId::new(),
            is_admin,
        }
    }

    #[test]
    fn permissions() {
        let owner = user(false);
        let stranger = user(false);
        let mut item = MediaItem::new("Mine", Playlist::default());
        item.owner_id = Some(owner.id);

        assert!(ensure_write(&item, &owner).is_ok());
        assert_eq!(ensure_read(&item, &stranger).unwrap_err().http_status(), 404);
        assert!(ensure_write(&item, &user(true)).is_ok());

        item.data.list.is_public = true;
        assert!(ensure_read(&item, &stranger).is_ok());
        assert_eq!(ensure_write(&item, &stranger).unwrap_err().http_status(), 403);
    }

    #[test]
    fn smart_refresh_filters_sorts_and_limits() {
        let pool = init_memory_pool().unwrap();
        let conn = pool.get().unwrap();
        movie(&conn, "Alien", 1979, 8.5, "Horror");
        let aliens = movie(&conn, "Aliens", 1986, 8.4, "Action");
        let matrix = movie(&conn, "The Matrix", 1999, 8.7, "Action");
        movie(&conn, "Heat", 1995, 8.3, "Crime");

        let mut list = ItemList::new();
        list.is_smart = true;
        list.smart_criteria = Some(SmartCriteria {
            media_types: vec![MediaType::Movie],
            genres: vec!["action".into()],
            sort: SmartSort::Year,
            descending: true,
            ..Default::default()
        });
        let mut item = MediaItem::new("Action", Playlist::with_list(Details::default(), list));
        media_items::insert(&conn, &item).unwrap();

        assert_eq!(refresh_smart(&conn, &mut item).unwrap(), (2, 0));
        assert_eq!(item.data.list.item_ids(), vec![matrix, aliens]);

        if let Some(c) = item.data.list.smart_criteria.as_mut() {
            c.limit = Some(1);
        }
        assert_eq!(refresh_smart(&conn, &mut item).unwrap(), (0, 1));
        assert_eq!(item.data.list.item_ids(), vec![matrix]);
        assert_eq!(item.data.list.tombstones.len(), 1);

        save(&conn, &mut item).unwrap();
        let stored: MediaItem<Playlist> = load(&conn, item.id).unwrap();
        let titles: Vec<String> = resolve_items(&conn, &stored.data.list)
            .unwrap()
            .into_iter()
            .map(|r| r.title)
            .collect();
        assert_eq!(titles, vec!["The Matrix".to_string()]);
    }

    #[test]
    fn plain_lists_do_not_refresh() {
        let pool = init_memory_pool().unwrap();
        let conn = pool.get().unwrap();
        let mut item = MediaItem::new("Plain", Playlist::default());
        assert_eq!(refresh_smart(&conn, &mut item).unwrap_err().http_status(), 400);
    }

    #[test]
    fn lists_cannot_nest() {
        let pool = init_memory_pool().unwrap();
        let conn = pool.get().unwrap();
        let inner = MediaItem::new("Inner", Playlist::default());
        media_items::insert(&conn, &inner).unwrap();
        assert_eq!(item_ref(&conn, inner.id).unwrap_err().http_status(), 400);
        let m = movie(&conn, "Heat", 1995, 8.3, "Crime");
        assert_eq!(item_ref(&conn, m).unwrap().title, "Heat");
    }
}
