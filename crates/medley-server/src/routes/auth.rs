//! Authentication route handlers: login, logout, status, registration.

use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use chrono::{Duration, Utc};
use medley_core::config::MAX_SESSION_HOURS;
use medley_core::Error;
use serde::{Deserialize, Serialize};

use crate::context::AppContext;
use crate::envelope::ApiResponse;
use crate::error::AppError;
use crate::middleware::auth::{authenticate, extract_token, AuthUser};

/// Minimum accepted password length.
pub const MIN_PASSWORD_LEN: usize = 8;

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub token: String,
    pub expires_at: String,
    pub user: UserSummary,
}

#[derive(Debug, Serialize)]
pub struct UserSummary {
    pub id: String,
    pub username: String,
    pub role: String,
}

#[derive(Debug, Serialize)]
pub struct AuthStatusResponse {
    pub auth_enabled: bool,
    pub authenticated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_admin: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

pub(crate) fn hash_password(password: &str) -> Result<String, Error> {
    if password.len() < MIN_PASSWORD_LEN {
        return Err(Error::Validation(format!(
            "password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    bcrypt::hash(password, bcrypt::DEFAULT_COST).map_err(|e| Error::Internal(format!("bcrypt error: {e}")))
}

fn issue_token(ctx: &AppContext, user: &medley_db::models::User) -> Result<TokenResponse, Error> {
    let token = uuid::Uuid::new_v4().to_string();
    let expires = Utc::now() + Duration::hours(ctx.config.auth.session_timeout_hours.min(MAX_SESSION_HOURS) as i64);
    let conn = ctx.conn()?;
    medley_db::queries::auth::create_token(&conn, user.id, &token, expires)?;
    Ok(TokenResponse {
        token,
        expires_at: expires.to_rfc3339(),
        user: UserSummary {
            id: user.id.to_string(),
            username: user.username.clone(),
            role: user.role.clone(),
        },
    })
}

/// POST /api/auth/login
pub async fn login(
    State(ctx): State<AppContext>,
    Json(payload): Json<LoginRequest>,
) -> Result<ApiResponse<Option<TokenResponse>>, AppError> {
    if !ctx.config.auth.enabled {
        return Ok(ApiResponse::ok(None).with_message("Auth disabled"));
    }

    let user = {
        let conn = ctx.conn()?;
        medley_db::queries::users::get_user_by_username(&conn, &payload.username)?
    };
    // Seeded and disabled accounts carry a non-bcrypt marker hash.
    let valid = user.as_ref().is_some_and(|u| {
        u.password_hash.starts_with("$2") && bcrypt::verify(&payload.password, &u.password_hash).unwrap_or(false)
    });
    let Some(user) = user.filter(|_| valid) else {
        tracing::info!(username = %payload.username, "Rejected login");
        return Err(Error::Unauthorized("Invalid credentials".into()).into());
    };

    let response = issue_token(&ctx, &user)?;
    tracing::info!(user_id = %user.id, "User logged in");
    Ok(ApiResponse::ok(Some(response)).with_message("Login successful"))
}

/// POST /api/auth/register
pub async fn register(
    State(ctx): State<AppContext>,
    Json(payload): Json<LoginRequest>,
) -> Result<ApiResponse<TokenResponse>, AppError> {
    if !ctx.config.auth.enabled || !ctx.config.auth.allow_registration {
        return Err(Error::Forbidden("registration is closed".into()).into());
    }
    let username = payload.username.trim();
    if username.is_empty() {
        return Err(Error::Validation("username is required".into()).into());
    }
    let hash = hash_password(&payload.password)?;
    let user = {
        let conn = ctx.conn()?;
        medley_db::queries::users::create_user(&conn, username, &hash, "user")?
    };
    tracing::info!(user_id = %user.id, "Registered user");
    Ok(ApiResponse::created(issue_token(&ctx, &user)?))
}

/// POST /api/auth/logout
pub async fn logout(
    State(ctx): State<AppContext>,
    headers: HeaderMap,
) -> Result<ApiResponse<()>, AppError> {
    if let Some(token) = extract_token(&headers) {
        let conn = ctx.conn()?;
        medley_db::queries::auth::delete_token(&conn, &token)?;
    }
    Ok(ApiResponse::ok(()).with_message("Logged out"))
}

/// GET /api/auth/status
pub async fn auth_status(
    State(ctx): State<AppContext>,
    headers: HeaderMap,
) -> ApiResponse<AuthStatusResponse> {
    let user = authenticate(&ctx.config.auth, &ctx.db, &headers);
    ApiResponse::ok(AuthStatusResponse {
        auth_enabled: ctx.config.auth.enabled,
        authenticated: user.is_some(),
        user_id: user.map(|u| u.id.to_string()),
        is_admin: user.map(|u| u.is_admin),
    })
}

/// PUT /api/auth/password
pub async fn change_password(
    State(ctx): State<AppContext>,
    user: AuthUser,
    Json(payload): Json<ChangePasswordRequest>,
) -> Result<ApiResponse<()>, AppError> {
    let conn = ctx.conn()?;
    let stored = medley_db::queries::users::get_user_by_id(&conn, user.id)?
        .ok_or_else(|| Error::Unauthorized("User not found".into()))?;
    let valid = stored.password_hash.starts_with("$2")
        && bcrypt::verify(&payload.current_password, &stored.password_hash).unwrap_or(false);
    if !valid {
        return Err(Error::Unauthorized("Current password is incorrect".into()).into());
    }
    let hash = hash_password(&payload.new_password)?;
    medley_db::queries::users::update_password(&conn, user.id, &hash)?;
    Ok(ApiResponse::ok(()).with_message("Password changed"))
}
