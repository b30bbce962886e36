//! Catalog (core layer) routes, generic over the media payload type.
//!
//! Each kind is mounted under its own prefix (`/movies`, `/tracks`, ...) by
//! [`routes`].

use axum::extract::{Path, Query, State};
use axum::routing::get;
use axum::Router;
use chrono::{Duration, Utc};
use medley_core::{ClientId, Error, MediaData, MediaItem, MediaItemId};
use medley_db::queries::media_items::{self, MediaQuery, SortField};
use serde::Deserialize;

use crate::context::AppContext;
use crate::envelope::{ApiResponse, Paginated, Pagination};
use crate::error::AppError;
use crate::routes::parse_id;

/// Catalog routes for `T` under `/{segment}`.
pub fn routes<T: MediaData>(segment: &str) -> Router<AppContext> {
    Router::new()
        .route(&format!("/{segment}"), get(list::<T>))
        .route(&format!("/{segment}/recent"), get(recent::<T>))
        .route(&format!("/{segment}/genre/{{genre}}"), get(by_genre::<T>))
        .route(
            &format!("/{segment}/external/{{source}}/{{value}}"),
            get(by_external_id::<T>),
        )
        .route(&format!("/{segment}/{{id}}"), get(get_one::<T>).delete(delete_one::<T>))
}

#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
    pub limit: Option<u32>,
    pub offset: Option<u32>,
    pub q: Option<String>,
    pub year: Option<i32>,
    pub genre: Option<String>,
    pub client_id: Option<String>,
    pub sort: Option<String>,
    #[serde(default)]
    pub desc: bool,
}

impl ListParams {
    fn page(&self) -> Pagination {
        Pagination {
            limit: self.limit,
            offset: self.offset,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct RecentParams {
    pub days: Option<i64>,
    pub limit: Option<u32>,
}

fn load<T: MediaData>(ctx: &AppContext, raw_id: &str) -> Result<MediaItem<T>, Error> {
    let id: MediaItemId = parse_id(raw_id, "item id")?;
    let conn = ctx.conn()?;
    media_items::get::<T>(&conn, id)?.ok_or_else(|| Error::not_found(T::MEDIA_TYPE.as_str(), id))
}

/// GET /api/{kind}
pub async fn list<T: MediaData>(
    State(ctx): State<AppContext>,
    Query(params): Query<ListParams>,
) -> Result<ApiResponse<Paginated<MediaItem<T>>>, AppError> {
    let page = params.page();
    let client_id = params
        .client_id
        .as_deref()
        .map(|raw| parse_id::<ClientId>(raw, "client id"))
        .transpose()?;
    let query = MediaQuery {
        q: params.q.clone(),
        year: params.year,
        genre: params.genre.clone(),
        client_id,
        sort: params.sort.as_deref().map(SortField::parse).unwrap_or_default(),
        desc: params.desc,
        limit: page.limit(),
        offset: page.offset(),
        ..MediaQuery::for_type(T::MEDIA_TYPE)
    };
    let conn = ctx.conn()?;
    let (items, total) = media_items::list::<T>(&conn, &query)?;
    Ok(ApiResponse::ok(Paginated::new(items, total, page)))
}

/// GET /api/{kind}/{id}
pub async fn get_one<T: MediaData>(
    State(ctx): State<AppContext>,
    Path(id): Path<String>,
) -> Result<ApiResponse<MediaItem<T>>, AppError> {
    Ok(ApiResponse::ok(load::<T>(&ctx, &id)?))
}

/// GET /api/{kind}/recent?days=&limit=
pub async fn recent<T: MediaData>(
    State(ctx): State<AppContext>,
    Query(params): Query<RecentParams>,
) -> Result<ApiResponse<Vec<MediaItem<T>>>, AppError> {
    let days = params.days.unwrap_or(30);
    if days <= 0 {
        return Err(Error::Validation("days must be positive".into()).into());
    }
    let limit = Pagination {
        limit: params.limit,
        offset: None,
    }
    .limit();
    let since = Utc::now() - Duration::days(days);
    let conn = ctx.conn()?;
    Ok(ApiResponse::ok(media_items::recent::<T>(&conn, since, limit)?))
}

/// GET /api/{kind}/genre/{genre}
pub async fn by_genre<T: MediaData>(
    State(ctx): State<AppContext>,
    Path(genre): Path<String>,
    Query(page): Query<Pagination>,
) -> Result<ApiResponse<Paginated<MediaItem<T>>>, AppError> {
    let query = MediaQuery {
        genre: Some(genre),
        limit: page.limit(),
        offset: page.offset(),
        ..MediaQuery::for_type(T::MEDIA_TYPE)
    };
    let conn = ctx.conn()?;
    let (items, total) = media_items::list::<T>(&conn, &query)?;
    Ok(ApiResponse::ok(Paginated::new(items, total, page)))
}

/// GET /api/{kind}/external/{source}/{value}
pub async fn by_external_id<T: MediaData>(
    State(ctx): State<AppContext>,
    Path((source, value)): Path<(String, String)>,
) -> Result<ApiResponse<Vec<MediaItem<T>>>, AppError> {
    let conn = ctx.conn()?;
    Ok(ApiResponse::ok(media_items::find_by_external_id::<T>(&conn, &source, &value)?))
}

/// DELETE /api/{kind}/{id}
pub async fn delete_one<T: MediaData>(
    State(ctx): State<AppContext>,
    Path(id): Path<String>,
) -> Result<ApiResponse<()>, AppError> {
    let item = load::<T>(&ctx, &id)?;
    let conn = ctx.conn()?;
    media_items::delete(&conn, item.id, T::MEDIA_TYPE)?;
    tracing::info!(item_id = %item.id, media_type = %T::MEDIA_TYPE, "Deleted catalog item");
    Ok(ApiResponse::ok(()).with_message(format!("{} deleted", T::MEDIA_TYPE)))
}
