//! Live aggregation across every enabled client of the caller.

use std::cmp::Ordering;
use std::collections::HashMap;

use axum::extract::{Path, Query, State};
use chrono::{DateTime, Utc};
use futures::future::join_all;
use medley_core::{
    ClientId, ClientItem, ClientType, Error, ExternalIds, ItemKey, MediaType, PageRequest,
    SyncClients,
};
use medley_db::queries::media_items::SortField;
use serde::{Deserialize, Serialize};

use crate::context::AppContext;
use crate::envelope::{ApiResponse, Pagination};
use crate::error::AppError;
use crate::middleware::auth::AuthUser;

#[derive(Debug, Deserialize)]
pub struct AggregateParams {
    pub q: Option<String>,
    pub limit: Option<u32>,
    pub sort: Option<String>,
    #[serde(default)]
    pub desc: bool,
}

/// One piece of content as seen across clients.
#[derive(Debug, Clone, Serialize)]
pub struct AggregatedItem {
    pub key: ItemKey,
    pub media_type: MediaType,
    pub title: String,
    pub year: Option<i32>,
    pub genres: Vec<String>,
    pub rating: Option<f64>,
    pub added_at: Option<DateTime<Utc>>,
    pub external_ids: ExternalIds,
    /// Where the content lives, one entry per client.
    pub sync_clients: SyncClients,
}

#[derive(Debug, Serialize)]
pub struct ClientError {
    pub client_id: ClientId,
    pub client_name: String,
    pub error: String,
}

#[derive(Debug, Serialize)]
pub struct AggregateResponse {
    pub items: Vec<AggregatedItem>,
    pub clients_queried: usize,
    pub errors: Vec<ClientError>,
}

/// GET /api/aggregate/{kind}?q=&limit=&sort=&desc=
pub async fn aggregate(
    State(ctx): State<AppContext>,
    user: AuthUser,
    Path(kind): Path<String>,
    Query(params): Query<AggregateParams>,
) -> Result<ApiResponse<AggregateResponse>, AppError> {
    let media_type: MediaType = kind.parse()?;
    if media_type.is_list() {
        return Err(Error::Validation(format!("{media_type}s cannot be aggregated")).into());
    }
    let limit = Pagination {
        limit: params.limit,
        offset: None,
    }
    .limit();
    let q = params.q.as_deref().map(str::trim).filter(|q| !q.is_empty());

    let adapters: Vec<_> = ctx
        .user_adapters(user.id)?
        .into_iter()
        .filter(|(_, adapter)| adapter.capabilities().supports(media_type))
        .collect();

    let calls = adapters.iter().map(|(_, adapter)| async move {
        match q {
            Some(q) => adapter.search(q, Some(media_type), limit).await,
            None => adapter
                .list_items(media_type, PageRequest { offset: 0, limit })
                .await
                .map(|page| page.items),
        }
    });
    let results = join_all(calls).await;

    let mut batches = Vec::with_capacity(results.len());
    let mut errors = Vec::new();
    for ((client, _), result) in adapters.iter().zip(results) {
        match result {
            Ok(items) => batches.push((client.id, client.client_type, items)),
            Err(e) => {
                tracing::warn!(client_id = %client.id, error = %e, "Client failed during aggregation");
                errors.push(ClientError {
                    client_id: client.id,
                    client_name: client.name.clone(),
                    error: e.to_string(),
                });
            }
        }
    }

    let sort = params.sort.as_deref().map(SortField::parse).unwrap_or_default();
    let mut items = merge(media_type, batches);
    sort_items(&mut items, sort, params.desc);
    items.truncate(limit as usize);

    Ok(ApiResponse::ok(AggregateResponse {
        items,
        clients_queried: adapters.len(),
        errors,
    }))
}

/// De-duplicate client results by content key, first occurrence wins the
/// metadata and later ones fill gaps.
pub fn merge(
    media_type: MediaType,
    batches: Vec<(ClientId, ClientType, Vec<ClientItem>)>,
) -> Vec<AggregatedItem> {
    let mut out: Vec<AggregatedItem> = Vec::new();
    let mut index: HashMap<ItemKey, usize> = HashMap::new();

    for (client_id, client_type, items) in batches {
        for mut item in items {
            item.media_type.get_or_insert(media_type);
            let keys = ItemKey::candidates(&item.key_parts());
            let Some(primary) = keys.first().cloned() else {
                continue;
            };
            let pos = match keys.iter().find_map(|k| index.get(k).copied()) {
                Some(pos) => {
                    let existing = &mut out[pos];
                    existing.sync_clients.add_or_update(client_id, client_type, item.id);
                    existing.external_ids.merge(&item.external_ids);
                    existing.year = existing.year.or(item.year);
                    existing.rating = existing.rating.or(item.rating);
                    existing.added_at = existing.added_at.or(item.added_at);
                    if existing.genres.is_empty() {
                        existing.genres = item.genres;
                    }
                    pos
                }
                None => {
                    let mut sync_clients = SyncClients::new();
                    sync_clients.add_or_update(client_id, client_type, item.id);
                    out.push(AggregatedItem {
                        key: primary,
                        media_type,
                        title: item.title,
                        year: item.year,
                        genres: item.genres,
                        rating: item.rating,
                        added_at: item.added_at,
                        external_ids: item.external_ids,
                        sync_clients,
                    });
                    out.len() - 1
                }
            };
            for key in keys {
                index.entry(key).or_insert(pos);
            }
        }
    }
    out
}

fn sort_items(items: &mut [AggregatedItem], sort: SortField, desc: bool) {
    items.sort_by(|a, b| {
        // Missing values sort last in either direction.
        let ord = match sort {
            SortField::Title => a.title.to_lowercase().cmp(&b.title.to_lowercase()),
            SortField::Year => cmp_present(a.year, b.year, desc),
            SortField::Rating => cmp_present(
                a.rating.map(ordered),
                b.rating.map(ordered),
                desc,
            ),
            SortField::Added => cmp_present(a.added_at, b.added_at, desc),
        };
        if desc && sort == SortField::Title {
            ord.reverse()
        } else {
            ord
        }
    });
}

fn ordered(r: f64) -> i64 {
    (r * 1000.0).round() as i64
}

fn cmp_present<T: Ord>(a: Option<T>, b: Option<T>, desc: bool) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) if desc => b.cmp(&a),
        (Some(a), Some(b)) => a.cmp(&b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}
