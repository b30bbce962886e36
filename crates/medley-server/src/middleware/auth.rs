//! Authentication middleware.
//!
//! Resolves the caller from an `Authorization: Bearer` token, an
//! `X-Api-Key` header or the session cookie and injects an [`AuthUser`]
//! into request extensions. When auth is disabled every request runs as the
//! seeded anonymous user.

use axum::body::Body;
use axum::extract::{FromRequestParts, State};
use axum::http::request::Parts;
use axum::http::{HeaderMap, Request};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use chrono::Utc;
use medley_core::config::AuthConfig;
use medley_core::{Error, UserId, ANONYMOUS_USER_ID};
use medley_db::pool::DbPool;

use crate::context::AppContext;
use crate::error::AppError;

/// Cookie name for browser sessions.
pub const SESSION_COOKIE: &str = "medley_session";

/// The authenticated caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthUser {
    pub id: UserId,
    pub is_admin: bool,
}

impl AuthUser {
    pub fn anonymous() -> Self {
        Self {
            id: ANONYMOUS_USER_ID,
            is_admin: true,
        }
    }

    pub fn require_admin(&self) -> Result<(), AppError> {
        if self.is_admin {
            Ok(())
        } else {
            Err(Error::Forbidden("admin role required".into()).into())
        }
    }
}

impl<S: Send + Sync> FromRequestParts<S> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthUser>()
            .copied()
            .ok_or_else(|| Error::Unauthorized("Authentication required".into()).into())
    }
}

/// Pull a bearer token, API key or session cookie from request headers.
pub fn extract_token(headers: &HeaderMap) -> Option<String> {
    if let Some(token) = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
    {
        return Some(token.trim().to_string());
    }

    if let Some(key) = headers.get("x-api-key").and_then(|v| v.to_str().ok()) {
        return Some(key.trim().to_string());
    }

    let cookies = headers
        .get(axum::http::header::COOKIE)
        .and_then(|v| v.to_str().ok())?;
    cookies.split(';').find_map(|part| {
        part.trim()
            .strip_prefix(SESSION_COOKIE)
            .and_then(|rest| rest.strip_prefix('='))
            .map(str::to_string)
    })
}

/// Resolve `token` against the configured API key and stored sessions.
pub fn validate_token(auth: &AuthConfig, db: &DbPool, token: &str) -> Option<AuthUser> {
    if token.is_empty() {
        return None;
    }
    if auth.api_key.as_deref() == Some(token) {
        return Some(AuthUser::anonymous());
    }

    let conn = match medley_db::pool::get_conn(db) {
        Ok(c) => c,
        Err(e) => {
            tracing::warn!(error = %e, "Auth lookup could not get a connection");
            return None;
        }
    };
    let session = medley_db::queries::auth::get_token(&conn, token).ok().flatten()?;
    if session.expires_at <= Utc::now() {
        tracing::debug!(user_id = %session.user_id, "Rejected expired session");
        return None;
    }
    let user = medley_db::queries::users::get_user_by_id(&conn, session.user_id)
        .ok()
        .flatten()?;
    Some(AuthUser {
        id: user.id,
        is_admin: user.is_admin(),
    })
}

/// Resolve the caller for a request.
pub fn authenticate(auth: &AuthConfig, db: &DbPool, headers: &HeaderMap) -> Option<AuthUser> {
    if !auth.enabled {
        return Some(AuthUser::anonymous());
    }
    extract_token(headers).and_then(|token| validate_token(auth, db, &token))
}

/// Authentication middleware. Applied to protected routes only.
pub async fn auth_middleware(
    State(ctx): State<AppContext>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    match authenticate(&ctx.config.auth, &ctx.db, request.headers()) {
        Some(user) => {
            request.extensions_mut().insert(user);
            next.run(request).await
        }
        None => AppError::new(Error::Unauthorized("Authentication required".into())).into_response(),
    }
}

/// Rejects non-admin callers. Layered inside [`auth_middleware`].
pub async fn admin_middleware(request: Request<Body>, next: Next) -> Response {
    let allowed = request
        .extensions()
        .get::<AuthUser>()
        .is_some_and(|u| u.is_admin);
    if !allowed {
        return AppError::new(Error::Forbidden("admin role required".into())).into_response();
    }
    next.run(request).await
}
