//! Axum router construction.
//!
//! Builds the full application router with all route groups and middleware
//! layers.

use axum::middleware;
use axum::routing::{get, post, put};
use axum::Router;
use medley_core::{Album, Artist, Collection, Episode, Movie, Playlist, Series, Track};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::context::AppContext;
use crate::middleware::auth::{admin_middleware, auth_middleware};
use crate::middleware::rate_limit::rate_limit_middleware;
use crate::middleware::request_id::request_id_middleware;
use crate::routes;

/// Catalog and user-layer routes for one media kind.
fn media_routes<T: medley_core::MediaData>(segment: &str) -> Router<AppContext> {
    routes::media::routes::<T>(segment).merge(routes::user_data::routes::<T>(segment))
}

/// Build the complete Axum router.
pub fn build_router(ctx: AppContext) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Auth routes -- always accessible.
    let auth_routes = Router::new()
        .route("/auth/login", post(routes::auth::login))
        .route("/auth/register", post(routes::auth::register))
        .route("/auth/logout", post(routes::auth::logout))
        .route("/auth/status", get(routes::auth::auth_status));

    let admin_routes = Router::new()
        .route(
            "/admin/users",
            get(routes::users::list_users).post(routes::users::create_user),
        )
        .route(
            "/admin/users/{id}",
            put(routes::users::update_user).delete(routes::users::delete_user),
        )
        .layer(middleware::from_fn(admin_middleware));

    // Protected API routes.
    let protected_routes = Router::new()
        .route("/auth/password", put(routes::auth::change_password))
        .route("/users/me", get(routes::users::me))
        // Catalog + user data
        .merge(media_routes::<Movie>("movies"))
        .merge(media_routes::<Series>("series"))
        .merge(media_routes::<Episode>("episodes"))
        .merge(media_routes::<Track>("tracks"))
        .merge(media_routes::<Album>("albums"))
        .merge(media_routes::<Artist>("artists"))
        // Lists
        .merge(routes::lists::routes::<Playlist>("playlists"))
        .merge(routes::lists::routes::<Collection>("collections"))
        // Clients
        .merge(routes::clients::routes())
        .route("/aggregate/{kind}", get(routes::aggregate::aggregate))
        .merge(admin_routes);

    // Auth runs for every protected route: with auth disabled it injects
    // the anonymous user so `AuthUser` extractors still resolve.
    let protected_routes = protected_routes
        .layer(middleware::from_fn_with_state(ctx.clone(), auth_middleware))
        .layer(middleware::from_fn_with_state(ctx.clone(), rate_limit_middleware));

    let api = auth_routes.merge(protected_routes);

    Router::new()
        .route("/health", get(routes::health::health_check))
        .route("/metrics", get(routes::metrics::metrics_handler))
        .nest("/api", api)
        .layer(middleware::from_fn(request_id_middleware))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(ctx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use medley_core::config::Config;
    use medley_db::pool::init_memory_pool;
    use tower::ServiceExt;

    fn app() -> Router {
        build_router(AppContext::new(init_memory_pool().unwrap(), Config::default()))
    }

    async fn status(uri: &str) -> StatusCode {
        app()
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap()
            .status()
    }

    #[tokio::test]
    async fn static_segments_win_over_ids() {
        assert_eq!(status("/health").await, StatusCode::OK);
        assert_eq!(status("/api/movies").await, StatusCode::OK);
        assert_eq!(status("/api/movies/recent").await, StatusCode::OK);
        assert_eq!(status("/api/user/tracks/favorites").await, StatusCode::OK);
        assert_eq!(status("/api/playlists").await, StatusCode::OK);
        assert_eq!(status("/api/movies/not-a-uuid").await, StatusCode::BAD_REQUEST);
        assert_eq!(status("/api/nothing-here").await, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn admin_routes_admit_anonymous_when_auth_disabled() {
        assert_eq!(status("/api/admin/users").await, StatusCode::OK);
    }
}
