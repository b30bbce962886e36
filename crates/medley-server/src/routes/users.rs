//! Current user and admin user management.

use axum::extract::{Path, State};
use axum::Json;
use medley_core::{Error, UserId};
use serde::{Deserialize, Serialize};

use crate::context::AppContext;
use crate::envelope::ApiResponse;
use crate::error::AppError;
use crate::middleware::auth::AuthUser;
use crate::routes::auth::hash_password;
use crate::routes::parse_id;

#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub id: String,
    pub username: String,
    pub role: String,
    pub created_at: String,
}

impl From<medley_db::models::User> for UserResponse {
    fn from(u: medley_db::models::User) -> Self {
        Self {
            id: u.id.to_string(),
            username: u.username,
            role: u.role,
            created_at: u.created_at,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    pub username: String,
    pub password: String,
    pub role: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateUserRequest {
    pub role: Option<String>,
    pub password: Option<String>,
}

fn check_role(role: &str) -> Result<(), Error> {
    match role {
        "admin" | "user" => Ok(()),
        other => Err(Error::Validation(format!("unknown role: {other}"))),
    }
}

/// GET /api/users/me
pub async fn me(State(ctx): State<AppContext>, user: AuthUser) -> Result<ApiResponse<UserResponse>, AppError> {
    let conn = ctx.conn()?;
    let found = medley_db::queries::users::get_user_by_id(&conn, user.id)?
        .ok_or_else(|| Error::not_found("user", user.id))?;
    Ok(ApiResponse::ok(found.into()))
}

/// GET /api/admin/users
pub async fn list_users(State(ctx): State<AppContext>) -> Result<ApiResponse<Vec<UserResponse>>, AppError> {
    let conn = ctx.conn()?;
    let users = medley_db::queries::users::list_users(&conn)?;
    Ok(ApiResponse::ok(users.into_iter().map(UserResponse::from).collect()))
}

/// POST /api/admin/users
pub async fn create_user(
    State(ctx): State<AppContext>,
    Json(payload): Json<CreateUserRequest>,
) -> Result<ApiResponse<UserResponse>, AppError> {
    let role = payload.role.as_deref().unwrap_or("user");
    check_role(role)?;
    let hash = hash_password(&payload.password)?;
    let conn = ctx.conn()?;
    let user = medley_db::queries::users::create_user(&conn, payload.username.trim(), &hash, role)?;
    tracing::info!(user_id = %user.id, role, "Created user");
    Ok(ApiResponse::created(user.into()))
}

/// PUT /api/admin/users/{id}
pub async fn update_user(
    State(ctx): State<AppContext>,
    Path(user_id): Path<String>,
    Json(payload): Json<UpdateUserRequest>,
) -> Result<ApiResponse<UserResponse>, AppError> {
    let id: UserId = parse_id(&user_id, "user id")?;
    let conn = ctx.conn()?;
    medley_db::queries::users::get_user_by_id(&conn, id)?.ok_or_else(|| Error::not_found("user", id))?;

    if let Some(role) = &payload.role {
        check_role(role)?;
        medley_db::queries::users::update_user_role(&conn, id, role)?;
    }
    if let Some(password) = &payload.password {
        let hash = hash_password(password)?;
        medley_db::queries::users::update_password(&conn, id, &hash)?;
        medley_db::queries::auth::delete_user_tokens(&conn, id)?;
    }

    let user = medley_db::queries::users::get_user_by_id(&conn, id)?.ok_or_else(|| Error::not_found("user", id))?;
    Ok(ApiResponse::ok(user.into()))
}

/// DELETE /api/admin/users/{id}
pub async fn delete_user(
    State(ctx): State<AppContext>,
    caller: AuthUser,
    Path(user_id): Path<String>,
) -> Result<ApiResponse<()>, AppError> {
    let id: UserId = parse_id(&user_id, "user id")?;
    if id == caller.id {
        return Err(Error::Validation("cannot delete yourself".into()).into());
    }
    let conn = ctx.conn()?;
    if !medley_db::queries::users::delete_user(&conn, id)? {
        return Err(Error::not_found("user", id).into());
    }
    Ok(ApiResponse::ok(()).with_message("User deleted"))
}
