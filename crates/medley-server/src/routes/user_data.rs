//! Per-user data routes (favorites, ratings, play history), generic over
//! the media payload type.

use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use medley_core::{Error, MediaData, MediaItemId};
use medley_db::models::{MediaRecord, UserMediaData};
use medley_db::queries::{media_items, user_data};
use serde::{Deserialize, Serialize};

use crate::context::AppContext;
use crate::envelope::{ApiResponse, Paginated, Pagination};
use crate::error::AppError;
use crate::middleware::auth::AuthUser;
use crate::routes::parse_id;

/// User-layer routes for `T` under `/user/{segment}`.
pub fn routes<T: MediaData>(segment: &str) -> Router<AppContext> {
    let base = format!("/user/{segment}");
    Router::new()
        .route(&format!("{base}/favorites"), get(favorites::<T>))
        .route(&format!("{base}/history"), get(history::<T>))
        .route(&format!("{base}/continue"), get(in_progress::<T>))
        .route(&format!("{base}/{{id}}/data"), get(get_data::<T>).put(set_data::<T>))
        .route(&format!("{base}/{{id}}/play"), post(record_play::<T>))
        .route(
            &format!("{base}/{{id}}/favorite"),
            post(add_favorite::<T>).delete(remove_favorite::<T>),
        )
}

/// A catalog item together with the caller's data for it.
#[derive(Debug, Serialize)]
pub struct UserItem {
    pub item: MediaRecord,
    pub user_data: UserMediaData,
}

#[derive(Debug, Deserialize)]
pub struct SetDataRequest {
    pub is_favorite: Option<bool>,
    pub user_rating: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub struct PlayRequest {
    #[serde(default)]
    pub position_secs: f64,
    #[serde(default)]
    pub completed: bool,
}

/// Resolve the path id to an existing item of type `T`.
fn item_id<T: MediaData>(ctx: &AppContext, raw: &str) -> Result<MediaItemId, Error> {
    let id: MediaItemId = parse_id(raw, "item id")?;
    let conn = ctx.conn()?;
    match media_items::get_record(&conn, id)? {
        Some(r) if r.media_type == T::MEDIA_TYPE => Ok(id),
        _ => Err(Error::not_found(T::MEDIA_TYPE.as_str(), id)),
    }
}

type Lister = fn(
    &rusqlite::Connection,
    medley_core::UserId,
    medley_core::MediaType,
    u32,
    u32,
) -> medley_core::Result<(Vec<(MediaRecord, UserMediaData)>, u64)>;

fn page_of<T: MediaData>(
    ctx: &AppContext,
    user: AuthUser,
    page: Pagination,
    lister: Lister,
) -> Result<ApiResponse<Paginated<UserItem>>, AppError> {
    let conn = ctx.conn()?;
    let (rows, total) = lister(&conn, user.id, T::MEDIA_TYPE, page.limit(), page.offset())?;
    let items = rows
        .into_iter()
        .map(|(item, user_data)| UserItem { item, user_data })
        .collect();
    Ok(ApiResponse::ok(Paginated::new(items, total, page)))
}

/// GET /api/user/{kind}/favorites
pub async fn favorites<T: MediaData>(
    State(ctx): State<AppContext>,
    user: AuthUser,
    Query(page): Query<Pagination>,
) -> Result<ApiResponse<Paginated<UserItem>>, AppError> {
    page_of::<T>(&ctx, user, page, user_data::list_favorites)
}

/// GET /api/user/{kind}/history
pub async fn history<T: MediaData>(
    State(ctx): State<AppContext>,
    user: AuthUser,
    Query(page): Query<Pagination>,
) -> Result<ApiResponse<Paginated<UserItem>>, AppError> {
    page_of::<T>(&ctx, user, page, user_data::list_history)
}

/// GET /api/user/{kind}/continue
pub async fn in_progress<T: MediaData>(
    State(ctx): State<AppContext>,
    user: AuthUser,
    Query(page): Query<Pagination>,
) -> Result<ApiResponse<Paginated<UserItem>>, AppError> {
    page_of::<T>(&ctx, user, page, user_data::list_in_progress)
}

/// GET /api/user/{kind}/{id}/data
pub async fn get_data<T: MediaData>(
    State(ctx): State<AppContext>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<ApiResponse<UserMediaData>, AppError> {
    let id = item_id::<T>(&ctx, &id)?;
    let conn = ctx.conn()?;
    Ok(ApiResponse::ok(user_data::get_or_default(&conn, user.id, id, T::MEDIA_TYPE)?))
}

/// PUT /api/user/{kind}/{id}/data
pub async fn set_data<T: MediaData>(
    State(ctx): State<AppContext>,
    user: AuthUser,
    Path(id): Path<String>,
    Json(payload): Json<SetDataRequest>,
) -> Result<ApiResponse<UserMediaData>, AppError> {
    let id = item_id::<T>(&ctx, &id)?;
    let conn = ctx.conn()?;
    let data = user_data::set_data(
        &conn,
        user.id,
        id,
        T::MEDIA_TYPE,
        payload.is_favorite,
        payload.user_rating,
    )?;
    Ok(ApiResponse::ok(data))
}

/// POST /api/user/{kind}/{id}/play
pub async fn record_play<T: MediaData>(
    State(ctx): State<AppContext>,
    user: AuthUser,
    Path(id): Path<String>,
    Json(payload): Json<PlayRequest>,
) -> Result<ApiResponse<UserMediaData>, AppError> {
    let id = item_id::<T>(&ctx, &id)?;
    let conn = ctx.conn()?;
    let data = user_data::record_play(
        &conn,
        user.id,
        id,
        T::MEDIA_TYPE,
        payload.position_secs,
        payload.completed,
    )?;
    Ok(ApiResponse::ok(data))
}

async fn set_favorite<T: MediaData>(
    ctx: AppContext,
    user: AuthUser,
    id: String,
    favorite: bool,
) -> Result<ApiResponse<UserMediaData>, AppError> {
    let id = item_id::<T>(&ctx, &id)?;
    let conn = ctx.conn()?;
    let data = user_data::set_data(&conn, user.id, id, T::MEDIA_TYPE, Some(favorite), None)?;
    Ok(ApiResponse::ok(data))
}

/// POST /api/user/{kind}/{id}/favorite
pub async fn add_favorite<T: MediaData>(
    State(ctx): State<AppContext>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<ApiResponse<UserMediaData>, AppError> {
    set_favorite::<T>(ctx, user, id, true).await
}

/// DELETE /api/user/{kind}/{id}/favorite
pub async fn remove_favorite<T: MediaData>(
    State(ctx): State<AppContext>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<ApiResponse<UserMediaData>, AppError> {
    set_favorite::<T>(ctx, user, id, false).await
}
