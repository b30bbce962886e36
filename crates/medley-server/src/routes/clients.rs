//! Client configuration CRUD, live client queries and library import.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use medley_clients::{Capabilities, MediaClient, ServerInfo};
use medley_core::{
    ClientId, ClientItem, ClientList, ClientSettings, ClientType, Error, MediaType, Page,
    PageRequest,
};
use medley_db::models::Client;
use medley_db::queries::clients as client_queries;
use medley_db::queries::media_items::UpsertOutcome;
use serde::{Deserialize, Serialize};

use crate::catalog::upsert_client_item;
use crate::context::AppContext;
use crate::envelope::{ApiResponse, Pagination};
use crate::error::AppError;
use crate::middleware::auth::AuthUser;
use crate::routes::parse_id;

/// Routes under `/clients`.
///
/// Static segments (`search`, `test`, `series`, `import`) are registered
/// next to the `{kind}` catch-all; the router prefers static matches.
pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/clients", get(list_clients).post(create_client))
        .route(
            "/clients/{id}",
            get(get_client).put(update_client).delete(delete_client),
        )
        .route("/clients/{id}/test", post(test_client))
        .route("/clients/{id}/search", get(search))
        .route("/clients/{id}/import/{kind}", post(import_library))
        .route("/clients/{id}/series", get(list_series))
        .route("/clients/{id}/series/{series_id}", get(get_series))
        .route("/clients/{id}/series/{series_id}/seasons", get(seasons))
        .route(
            "/clients/{id}/series/{series_id}/seasons/{number}/episodes",
            get(episodes),
        )
        .route("/clients/{id}/{kind}", get(browse))
        .route("/clients/{id}/{kind}/{item_id}", get(browse_one))
}

/// A client configuration as returned by the API. Secrets are never
/// included; `has_secret` says whether one is stored.
#[derive(Debug, Serialize)]
pub struct ClientResponse {
    pub id: ClientId,
    pub client_type: ClientType,
    pub name: String,
    pub settings: ClientSettings,
    pub has_secret: bool,
    pub enabled: bool,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

impl From<Client> for ClientResponse {
    fn from(c: Client) -> Self {
        Self {
            id: c.id,
            client_type: c.client_type,
            name: c.name,
            has_secret: c.settings.has_secret(),
            settings: c.settings.redacted(),
            enabled: c.enabled,
            created_at: c.created_at,
            updated_at: c.updated_at,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateClientRequest {
    pub client_type: ClientType,
    pub name: String,
    pub settings: ClientSettings,
}

#[derive(Debug, Deserialize)]
pub struct UpdateClientRequest {
    pub name: Option<String>,
    pub settings: Option<ClientSettings>,
    pub enabled: Option<bool>,
}

#[derive(Debug, Serialize)]
pub struct TestResponse {
    pub server: ServerInfo,
    pub capabilities: Capabilities,
}

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    pub q: String,
    #[serde(rename = "type")]
    pub media_type: Option<String>,
    pub limit: Option<u32>,
}

/// Either a page of library items or the client's lists.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum Browse {
    Items(Page<ClientItem>),
    Lists(Vec<ClientList>),
}

/// Result of importing a client library.
#[derive(Debug, Default, Serialize)]
pub struct ImportReport {
    pub media_type: Option<MediaType>,
    pub fetched: usize,
    pub created: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub failed: usize,
}

fn client_id(raw: &str) -> Result<ClientId, Error> {
    parse_id(raw, "client id")
}

fn media_type(raw: &str) -> Result<MediaType, Error> {
    raw.parse()
}

/// The caller's client and its adapter.
fn connect(
    ctx: &AppContext,
    user: AuthUser,
    raw_id: &str,
) -> Result<(Client, Arc<dyn MediaClient>), Error> {
    let client = ctx.user_client(user.id, client_id(raw_id)?)?;
    let adapter = ctx.adapter(&client)?;
    Ok((client, adapter))
}

fn ensure_supported(adapter: &dyn MediaClient, media_type: MediaType) -> Result<(), Error> {
    let caps = adapter.capabilities();
    let ok = match media_type.list_kind() {
        Some(kind) => caps.supports_lists(kind),
        None => caps.supports(media_type),
    };
    if ok {
        Ok(())
    } else {
        Err(Error::Unsupported(format!(
            "{} does not serve {media_type}",
            adapter.client_type()
        )))
    }
}

// ---------------------------------------------------------------------------
// Configuration CRUD
// ---------------------------------------------------------------------------

/// GET /api/clients
pub async fn list_clients(
    State(ctx): State<AppContext>,
    user: AuthUser,
) -> Result<ApiResponse<Vec<ClientResponse>>, AppError> {
    let conn = ctx.conn()?;
    let clients = client_queries::list_clients(&conn, user.id, false)?;
    Ok(ApiResponse::ok(clients.into_iter().map(ClientResponse::from).collect()))
}

/// POST /api/clients
pub async fn create_client(
    State(ctx): State<AppContext>,
    user: AuthUser,
    Json(payload): Json<CreateClientRequest>,
) -> Result<ApiResponse<ClientResponse>, AppError> {
    let name = payload.name.trim();
    if name.is_empty() {
        return Err(Error::Validation("name is required".into()).into());
    }
    payload.settings.validate(payload.client_type)?;
    let conn = ctx.conn()?;
    let client = client_queries::create_client(&conn, user.id, payload.client_type, name, &payload.settings)?;
    tracing::info!(client_id = %client.id, client_type = %client.client_type, "Created client");
    Ok(ApiResponse::created(client.into()))
}

/// GET /api/clients/{id}
pub async fn get_client(
    State(ctx): State<AppContext>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<ApiResponse<ClientResponse>, AppError> {
    let client = ctx.user_client(user.id, client_id(&id)?)?;
    Ok(ApiResponse::ok(client.into()))
}

/// PUT /api/clients/{id}
///
/// Omitted secrets keep their stored value, so a client can be renamed or
/// repointed without re-entering its credentials.
pub async fn update_client(
    State(ctx): State<AppContext>,
    user: AuthUser,
    Path(id): Path<String>,
    Json(payload): Json<UpdateClientRequest>,
) -> Result<ApiResponse<ClientResponse>, AppError> {
    let mut client = ctx.user_client(user.id, client_id(&id)?)?;
    if let Some(name) = payload.name {
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::Validation("name cannot be empty".into()).into());
        }
        client.name = name.to_string();
    }
    if let Some(mut settings) = payload.settings {
        if settings.api_key.is_none() {
            settings.api_key = client.settings.api_key.take();
        }
        if settings.password.is_none() {
            settings.password = client.settings.password.take();
        }
        settings.validate(client.client_type)?;
        client.settings = settings;
    }
    if let Some(enabled) = payload.enabled {
        client.enabled = enabled;
    }
    client.updated_at = chrono::Utc::now();

    let conn = ctx.conn()?;
    client_queries::update_client(&conn, &client)?;
    ctx.clients.invalidate(client.id);
    tracing::info!(client_id = %client.id, "Updated client");
    Ok(ApiResponse::ok(client.into()))
}

/// DELETE /api/clients/{id}
pub async fn delete_client(
    State(ctx): State<AppContext>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<ApiResponse<()>, AppError> {
    let client = ctx.user_client(user.id, client_id(&id)?)?;
    let conn = ctx.conn()?;
    client_queries::delete_client(&conn, client.id)?;
    ctx.clients.invalidate(client.id);
    tracing::info!(client_id = %client.id, "Deleted client");
    Ok(ApiResponse::ok(()).with_message("Client deleted"))
}

/// POST /api/clients/{id}/test
pub async fn test_client(
    State(ctx): State<AppContext>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<ApiResponse<TestResponse>, AppError> {
    let (_, adapter) = connect(&ctx, user, &id)?;
    let server = adapter.test_connection().await?;
    Ok(ApiResponse::ok(TestResponse {
        server,
        capabilities: adapter.capabilities(),
    }))
}

// ---------------------------------------------------------------------------
// Live queries
// ---------------------------------------------------------------------------

/// GET /api/clients/{id}/search?q=&type=&limit=
pub async fn search(
    State(ctx): State<AppContext>,
    user: AuthUser,
    Path(id): Path<String>,
    Query(params): Query<SearchParams>,
) -> Result<ApiResponse<Vec<ClientItem>>, AppError> {
    if params.q.trim().is_empty() {
        return Err(Error::Validation("q is required".into()).into());
    }
    let media_type = params.media_type.as_deref().map(media_type).transpose()?;
    let limit = Pagination {
        limit: params.limit,
        offset: None,
    }
    .limit();
    let (_, adapter) = connect(&ctx, user, &id)?;
    Ok(ApiResponse::ok(adapter.search(params.q.trim(), media_type, limit).await?))
}

/// GET /api/clients/{id}/{kind}
pub async fn browse(
    State(ctx): State<AppContext>,
    user: AuthUser,
    Path((id, kind)): Path<(String, String)>,
    Query(page): Query<Pagination>,
) -> Result<ApiResponse<Browse>, AppError> {
    let media_type = media_type(&kind)?;
    let (_, adapter) = connect(&ctx, user, &id)?;
    ensure_supported(adapter.as_ref(), media_type)?;
    let body = match media_type.list_kind() {
        Some(kind) => Browse::Lists(adapter.lists(kind).await?),
        None => Browse::Items(
            adapter
                .list_items(
                    media_type,
                    PageRequest {
                        offset: page.offset(),
                        limit: page.limit(),
                    },
                )
                .await?,
        ),
    };
    Ok(ApiResponse::ok(body))
}

/// GET /api/clients/{id}/{kind}/{item_id}
///
/// For list kinds this returns the list's entries in client order.
pub async fn browse_one(
    State(ctx): State<AppContext>,
    user: AuthUser,
    Path((id, kind, item_id)): Path<(String, String, String)>,
) -> Result<ApiResponse<serde_json::Value>, AppError> {
    let media_type = media_type(&kind)?;
    let (_, adapter) = connect(&ctx, user, &id)?;
    ensure_supported(adapter.as_ref(), media_type)?;
    let value = match media_type.list_kind() {
        Some(kind) => serde_json::to_value(adapter.list_entries(kind, &item_id).await?),
        None => serde_json::to_value(adapter.get_item(media_type, &item_id).await?),
    }
    .map_err(|e| Error::Internal(e.to_string()))?;
    Ok(ApiResponse::ok(value))
}

/// GET /api/clients/{id}/series
pub async fn list_series(
    state: State<AppContext>,
    user: AuthUser,
    Path(id): Path<String>,
    page: Query<Pagination>,
) -> Result<ApiResponse<Browse>, AppError> {
    browse(state, user, Path((id, "series".to_string())), page).await
}

/// GET /api/clients/{id}/series/{series_id}
pub async fn get_series(
    state: State<AppContext>,
    user: AuthUser,
    Path((id, series_id)): Path<(String, String)>,
) -> Result<ApiResponse<serde_json::Value>, AppError> {
    browse_one(state, user, Path((id, "series".to_string(), series_id))).await
}

/// GET /api/clients/{id}/series/{series_id}/seasons
pub async fn seasons(
    State(ctx): State<AppContext>,
    user: AuthUser,
    Path((id, series_id)): Path<(String, String)>,
) -> Result<ApiResponse<Vec<ClientItem>>, AppError> {
    let (_, adapter) = connect(&ctx, user, &id)?;
    ensure_supported(adapter.as_ref(), MediaType::Series)?;
    Ok(ApiResponse::ok(adapter.children(&series_id, MediaType::Season).await?))
}

/// GET /api/clients/{id}/series/{series_id}/seasons/{number}/episodes
pub async fn episodes(
    State(ctx): State<AppContext>,
    user: AuthUser,
    Path((id, series_id, number)): Path<(String, String, u32)>,
) -> Result<ApiResponse<Vec<ClientItem>>, AppError> {
    let (_, adapter) = connect(&ctx, user, &id)?;
    ensure_supported(adapter.as_ref(), MediaType::Series)?;
    let season = adapter
        .children(&series_id, MediaType::Season)
        .await?
        .into_iter()
        .find(|s| s.index == Some(number))
        .ok_or_else(|| Error::not_found("season", format!("{series_id}/{number}")))?;
    Ok(ApiResponse::ok(adapter.children(&season.id, MediaType::Episode).await?))
}

// ---------------------------------------------------------------------------
// Import
// ---------------------------------------------------------------------------

/// POST /api/clients/{id}/import/{kind}
///
/// Pages through the client library and matches or inserts each item in
/// the catalog. Items that fail to import are counted and logged; the
/// import keeps going.
pub async fn import_library(
    State(ctx): State<AppContext>,
    user: AuthUser,
    Path((id, kind)): Path<(String, String)>,
) -> Result<ApiResponse<ImportReport>, AppError> {
    let media_type = media_type(&kind)?;
    if media_type.is_list() {
        return Err(Error::Validation(format!(
            "{media_type}s are imported through /api/{media_type}s/import"
        ))
        .into());
    }
    let (client, adapter) = connect(&ctx, user, &id)?;
    ensure_supported(adapter.as_ref(), media_type)?;

    let page_size = ctx.config.clients.import_page_size.max(1);
    let mut report = ImportReport {
        media_type: Some(media_type),
        ..Default::default()
    };
    let mut offset = 0u32;
    loop {
        let page = adapter
            .list_items(
                media_type,
                PageRequest {
                    offset,
                    limit: page_size,
                },
            )
            .await?;
        let count = page.items.len();
        report.fetched += count;
        {
            let conn = ctx.conn()?;
            for mut item in page.items {
                item.media_type.get_or_insert(media_type);
                match upsert_client_item(&conn, media_type, client.id, client.client_type, &item) {
                    Ok((_, UpsertOutcome::Created)) => report.created += 1,
                    Ok((_, UpsertOutcome::Updated)) => report.updated += 1,
                    Ok((_, UpsertOutcome::Unchanged)) => report.unchanged += 1,
                    Err(e) => {
                        report.failed += 1;
                        tracing::warn!(
                            client_id = %client.id,
                            client_item_id = %item.id,
                            error = %e,
                            "Failed to import item"
                        );
                    }
                }
            }
        }
        offset += count as u32;
        let exhausted = page.total.map_or(false, |t| u64::from(offset) >= t);
        if count < page_size as usize || exhausted {
            break;
        }
    }

    metrics::counter!("medley_import_items_total", "client_type" => client.client_type.as_str())
        .increment(report.fetched as u64);
    tracing::info!(
        client_id = %client.id,
        %media_type,
        fetched = report.fetched,
        created = report.created,
        updated = report.updated,
        failed = report.failed,
        "Imported client library"
    );
    Ok(ApiResponse::ok(report))
}
