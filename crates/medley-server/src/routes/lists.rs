//! Playlist and collection routes, generic over the list kind.

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::routing::{delete, get, post, put};
use axum::{Json, Router};
use medley_core::{
    Change, ClientId, Details, Error, ItemList, ListData, MediaItem, MediaItemId, SmartCriteria,
};
use medley_db::models::MediaRecord;
use medley_db::queries::media_items::{self, MediaQuery, Visibility};
use medley_sync::SyncReport;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};

use crate::context::AppContext;
use crate::envelope::{ApiResponse, Paginated, Pagination};
use crate::error::AppError;
use crate::lists;
use crate::middleware::auth::AuthUser;
use crate::routes::parse_id;

/// List routes for `L` under `/{segment}`.
pub fn routes<L: ListData>(segment: &str) -> Router<AppContext> {
    let base = format!("/{segment}");
    Router::new()
        .route(&base, get(list_all::<L>).post(create::<L>))
        .route(&format!("{base}/import"), post(import::<L>))
        .route(
            &format!("{base}/{{id}}"),
            get(get_one::<L>).put(update::<L>).delete(delete_one::<L>),
        )
        .route(
            &format!("{base}/{{id}}/items"),
            get(items::<L>).post(add_item::<L>).put(reorder::<L>),
        )
        .route(&format!("{base}/{{id}}/items/{{item_id}}"), delete(remove_item::<L>))
        .route(
            &format!("{base}/{{id}}/items/{{item_id}}/position"),
            put(move_item::<L>),
        )
        .route(&format!("{base}/{{id}}/refresh"), post(refresh::<L>))
        .route(&format!("{base}/{{id}}/links"), post(link::<L>))
        .route(&format!("{base}/{{id}}/links/{{client_id}}"), delete(unlink::<L>))
        .route(&format!("{base}/{{id}}/sync"), post(sync::<L>))
}

#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
    pub limit: Option<u32>,
    pub offset: Option<u32>,
    pub q: Option<String>,
    /// Only lists owned by the caller.
    #[serde(default)]
    pub mine: bool,
}

#[derive(Debug, Deserialize)]
pub struct CreateListRequest {
    pub title: String,
    pub description: Option<String>,
    #[serde(default)]
    pub is_public: bool,
    #[serde(default)]
    pub auto_sync: bool,
    pub smart_criteria: Option<SmartCriteria>,
    /// Initial items for a plain list.
    #[serde(default)]
    pub item_ids: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateListRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub is_public: Option<bool>,
    pub auto_sync: Option<bool>,
    pub smart_criteria: Option<SmartCriteria>,
}

#[derive(Debug, Deserialize)]
pub struct AddItemRequest {
    pub item_id: String,
    pub position: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct MoveItemRequest {
    pub position: usize,
}

#[derive(Debug, Deserialize)]
pub struct ReorderRequest {
    pub item_ids: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct LinkRequest {
    pub client_id: String,
    pub client_list_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SyncRequest {
    #[serde(default)]
    pub client_ids: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct ImportRequest {
    pub client_id: String,
    pub client_list_id: String,
}

#[derive(Debug, Serialize)]
pub struct LinkResponse {
    pub client_id: ClientId,
    pub client_list_id: String,
}

#[derive(Debug, Serialize)]
pub struct RefreshResponse {
    pub added: usize,
    pub removed: usize,
    pub item_count: usize,
}

#[derive(Debug, Serialize)]
pub struct ImportResponse<L: ListData> {
    pub list: MediaItem<L>,
    pub report: SyncReport,
}

fn list_id(raw: &str) -> Result<MediaItemId, Error> {
    parse_id(raw, "list id")
}

fn item_id(raw: &str) -> Result<MediaItemId, Error> {
    parse_id(raw, "item id")
}

fn reject_smart<L: ListData>(item: &MediaItem<L>) -> Result<(), Error> {
    if item.data.list().is_smart {
        return Err(Error::Validation(format!(
            "smart {}s are managed by their criteria; use refresh",
            L::KIND
        )));
    }
    Ok(())
}

/// Lock, load, check write access, apply `f` and save.
async fn mutate<L, F, R>(ctx: &AppContext, user: AuthUser, raw_id: &str, f: F) -> Result<(MediaItem<L>, R), Error>
where
    L: ListData,
    F: FnOnce(&Connection, &mut MediaItem<L>) -> Result<R, Error>,
{
    let id = list_id(raw_id)?;
    let _guard = ctx.lock_list(id).await;
    let conn = ctx.conn()?;
    let mut item = lists::load::<L>(&conn, id)?;
    lists::ensure_write(&item, &user)?;
    let out = f(&conn, &mut item)?;
    lists::save(&conn, &mut item)?;
    Ok((item, out))
}

fn readable<L: ListData>(ctx: &AppContext, user: AuthUser, raw_id: &str) -> Result<MediaItem<L>, Error> {
    let conn = ctx.conn()?;
    let item = lists::load::<L>(&conn, list_id(raw_id)?)?;
    lists::ensure_read(&item, &user)?;
    Ok(item)
}

/// GET /api/{lists}
pub async fn list_all<L: ListData>(
    State(ctx): State<AppContext>,
    user: AuthUser,
    Query(params): Query<ListParams>,
) -> Result<ApiResponse<Paginated<MediaItem<L>>>, AppError> {
    let page = Pagination {
        limit: params.limit,
        offset: params.offset,
    };
    let visibility = if params.mine {
        Visibility::OwnedBy(user.id)
    } else if user.is_admin {
        Visibility::All
    } else {
        Visibility::VisibleTo(user.id)
    };
    let query = MediaQuery {
        q: params.q,
        visibility,
        limit: page.limit(),
        offset: page.offset(),
        ..MediaQuery::for_type(L::MEDIA_TYPE)
    };
    let conn = ctx.conn()?;
    let (items, total) = media_items::list::<L>(&conn, &query)?;
    Ok(ApiResponse::ok(Paginated::new(items, total, page)))
}

/// POST /api/{lists}
pub async fn create<L: ListData>(
    State(ctx): State<AppContext>,
    user: AuthUser,
    Json(payload): Json<CreateListRequest>,
) -> Result<ApiResponse<MediaItem<L>>, AppError> {
    let title = payload.title.trim();
    if title.is_empty() {
        return Err(Error::Validation("title is required".into()).into());
    }
    let mut list = ItemList::new();
    list.is_public = payload.is_public;
    list.auto_sync = payload.auto_sync;
    if let Some(criteria) = payload.smart_criteria {
        criteria.validate()?;
        if !payload.item_ids.is_empty() {
            return Err(Error::Validation("smart lists cannot take explicit items".into()).into());
        }
        list.is_smart = true;
        list.smart_criteria = Some(criteria);
    }
    let details = Details {
        description: payload.description,
        ..Default::default()
    };
    let mut item = MediaItem::new(title, L::with_list(details, list));
    item.owner_id = Some(user.id);

    let conn = ctx.conn()?;
    for raw in &payload.item_ids {
        let entry = lists::item_ref(&conn, item_id(raw)?)?;
        item.data.list_mut().add_item(entry, None, Change::local());
    }
    if item.data.list().is_smart {
        lists::refresh_smart(&conn, &mut item)?;
    }
    media_items::insert(&conn, &item)?;
    tracing::info!(list_id = %item.id, kind = %L::KIND, items = item.data.list().len(), "Created list");
    Ok(ApiResponse::created(item))
}

/// GET /api/{lists}/{id}
pub async fn get_one<L: ListData>(
    State(ctx): State<AppContext>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<ApiResponse<MediaItem<L>>, AppError> {
    Ok(ApiResponse::ok(readable::<L>(&ctx, user, &id)?))
}

/// PUT /api/{lists}/{id}
///
/// Setting `smart_criteria` turns a list smart and regenerates it.
pub async fn update<L: ListData>(
    State(ctx): State<AppContext>,
    user: AuthUser,
    Path(id): Path<String>,
    Json(payload): Json<UpdateListRequest>,
) -> Result<ApiResponse<MediaItem<L>>, AppError> {
    let (item, ()) = mutate::<L, _, _>(&ctx, user, &id, |conn, item| {
        if let Some(title) = payload.title {
            let title = title.trim();
            if title.is_empty() {
                return Err(Error::Validation("title cannot be empty".into()));
            }
            item.title = title.to_string();
        }
        if let Some(description) = payload.description {
            item.data.details_mut().description = Some(description).filter(|d| !d.is_empty());
        }
        let list = item.data.list_mut();
        if let Some(is_public) = payload.is_public {
            list.is_public = is_public;
        }
        if let Some(auto_sync) = payload.auto_sync {
            list.auto_sync = auto_sync;
        }
        if let Some(criteria) = payload.smart_criteria {
            criteria.validate()?;
            list.is_smart = true;
            list.smart_criteria = Some(criteria);
            lists::refresh_smart(conn, item)?;
        }
        Ok(())
    })
    .await?;
    Ok(ApiResponse::ok(item))
}

/// DELETE /api/{lists}/{id}
pub async fn delete_one<L: ListData>(
    State(ctx): State<AppContext>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<ApiResponse<()>, AppError> {
    let id = list_id(&id)?;
    let _guard = ctx.lock_list(id).await;
    let conn = ctx.conn()?;
    let item = lists::load::<L>(&conn, id)?;
    lists::ensure_write(&item, &user)?;
    media_items::delete(&conn, id, L::MEDIA_TYPE)?;
    tracing::info!(list_id = %id, kind = %L::KIND, "Deleted list");
    Ok(ApiResponse::ok(()).with_message(format!("{} deleted", L::KIND)))
}

/// GET /api/{lists}/{id}/items
pub async fn items<L: ListData>(
    State(ctx): State<AppContext>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<ApiResponse<Vec<MediaRecord>>, AppError> {
    let item = readable::<L>(&ctx, user, &id)?;
    let conn = ctx.conn()?;
    Ok(ApiResponse::ok(lists::resolve_items(&conn, item.data.list())?))
}

/// POST /api/{lists}/{id}/items
pub async fn add_item<L: ListData>(
    State(ctx): State<AppContext>,
    user: AuthUser,
    Path(id): Path<String>,
    Json(payload): Json<AddItemRequest>,
) -> Result<ApiResponse<MediaItem<L>>, AppError> {
    let target = item_id(&payload.item_id)?;
    let (item, ()) = mutate::<L, _, _>(&ctx, user, &id, |conn, item| {
        reject_smart(item)?;
        let entry = lists::item_ref(conn, target)?;
        if !item.data.list_mut().add_item(entry, payload.position, Change::local()) {
            return Err(Error::Conflict(format!("{target} is already in this {}", L::KIND)));
        }
        Ok(())
    })
    .await?;
    Ok(ApiResponse::created(item))
}

/// DELETE /api/{lists}/{id}/items/{item_id}
pub async fn remove_item<L: ListData>(
    State(ctx): State<AppContext>,
    user: AuthUser,
    Path((id, raw_item)): Path<(String, String)>,
) -> Result<ApiResponse<MediaItem<L>>, AppError> {
    let target = item_id(&raw_item)?;
    let (item, ()) = mutate::<L, _, _>(&ctx, user, &id, |_, item| {
        reject_smart(item)?;
        item.data
            .list_mut()
            .remove_item(target, Change::local())
            .map(|_| ())
            .ok_or_else(|| Error::not_found(format!("{} item", L::KIND), target))
    })
    .await?;
    Ok(ApiResponse::ok(item))
}

/// PUT /api/{lists}/{id}/items/{item_id}/position
pub async fn move_item<L: ListData>(
    State(ctx): State<AppContext>,
    user: AuthUser,
    Path((id, raw_item)): Path<(String, String)>,
    Json(payload): Json<MoveItemRequest>,
) -> Result<ApiResponse<MediaItem<L>>, AppError> {
    let target = item_id(&raw_item)?;
    let (item, ()) = mutate::<L, _, _>(&ctx, user, &id, |_, item| {
        reject_smart(item)?;
        item.data
            .list_mut()
            .move_item(target, payload.position, Change::local())
    })
    .await?;
    Ok(ApiResponse::ok(item))
}

/// PUT /api/{lists}/{id}/items
pub async fn reorder<L: ListData>(
    State(ctx): State<AppContext>,
    user: AuthUser,
    Path(id): Path<String>,
    Json(payload): Json<ReorderRequest>,
) -> Result<ApiResponse<MediaItem<L>>, AppError> {
    let ids = payload
        .item_ids
        .iter()
        .map(|raw| item_id(raw))
        .collect::<Result<Vec<_>, _>>()?;
    let (item, ()) = mutate::<L, _, _>(&ctx, user, &id, |_, item| {
        reject_smart(item)?;
        item.data.list_mut().reorder(&ids, Change::local())
    })
    .await?;
    Ok(ApiResponse::ok(item))
}

/// POST /api/{lists}/{id}/refresh
pub async fn refresh<L: ListData>(
    State(ctx): State<AppContext>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<ApiResponse<RefreshResponse>, AppError> {
    let (item, (added, removed)) =
        mutate::<L, _, _>(&ctx, user, &id, |conn, item| lists::refresh_smart(conn, item)).await?;
    Ok(ApiResponse::ok(RefreshResponse {
        added,
        removed,
        item_count: item.data.list().len(),
    }))
}

/// POST /api/{lists}/{id}/links
pub async fn link<L: ListData>(
    State(ctx): State<AppContext>,
    user: AuthUser,
    Path(id): Path<String>,
    Json(payload): Json<LinkRequest>,
) -> Result<ApiResponse<LinkResponse>, AppError> {
    let list = list_id(&id)?;
    let client_id: ClientId = parse_id(&payload.client_id, "client id")?;
    let client_list_id = payload
        .client_list_id
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty());
    let client_list_id = lists::link::<L>(&ctx, user, list, client_id, client_list_id).await?;
    Ok(ApiResponse::created(LinkResponse {
        client_id,
        client_list_id,
    }))
}

/// DELETE /api/{lists}/{id}/links/{client_id}
pub async fn unlink<L: ListData>(
    State(ctx): State<AppContext>,
    user: AuthUser,
    Path((id, raw_client)): Path<(String, String)>,
) -> Result<ApiResponse<MediaItem<L>>, AppError> {
    let client_id: ClientId = parse_id(&raw_client, "client id")?;
    let (item, ()) = mutate::<L, _, _>(&ctx, user, &id, |_, item| {
        if item.data.list_mut().unlink_client(client_id) {
            Ok(())
        } else {
            Err(Error::not_found("client link", client_id))
        }
    })
    .await?;
    Ok(ApiResponse::ok(item))
}

/// POST /api/{lists}/{id}/sync
///
/// The body is optional; `{"client_ids": [...]}` restricts the run.
pub async fn sync<L: ListData>(
    State(ctx): State<AppContext>,
    user: AuthUser,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<ApiResponse<SyncReport>, AppError> {
    let list = list_id(&id)?;
    let request: SyncRequest = if body.iter().all(u8::is_ascii_whitespace) {
        SyncRequest::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| Error::Validation(format!("invalid sync request: {e}")))?
    };
    let only = request
        .client_ids
        .iter()
        .map(|raw| parse_id::<ClientId>(raw, "client id"))
        .collect::<Result<Vec<_>, _>>()?;
    let only = (!only.is_empty()).then_some(only.as_slice());
    let report = lists::sync::<L>(&ctx, Some(user), list, only).await?;
    Ok(ApiResponse::ok(report))
}

/// POST /api/{lists}/import
pub async fn import<L: ListData>(
    State(ctx): State<AppContext>,
    user: AuthUser,
    Json(payload): Json<ImportRequest>,
) -> Result<ApiResponse<ImportResponse<L>>, AppError> {
    let client_id: ClientId = parse_id(&payload.client_id, "client id")?;
    let (list, report) = lists::import::<L>(&ctx, user, client_id, payload.client_list_id.trim()).await?;
    Ok(ApiResponse::created(ImportResponse { list, report }))
}
