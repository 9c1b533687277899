//! User administration handlers
//!
//! Every endpoint here requires an active superuser.
//!
//! Author: hephaex@gmail.com

use axum::extract::{Path, State};
use axum::Json;
use std::sync::Arc;
use uuid::Uuid;

use crate::audit::{audit_log, AuditEvent};
use crate::auth::models::{
    AdminUpdateUserRequest, ListUsersQuery, RevokedResponse, UserListResponse,
};
use crate::auth::{AuthError, ClientInfo, Superuser, UserProfile, UserResponse};
use crate::error::AppError;
use crate::extract::{ValidatedJson, ValidatedQuery};
use crate::state::AppState;

/// List users, newest first
#[utoipa::path(
    get,
    path = "/api/auth/users",
    tag = "users",
    params(ListUsersQuery),
    responses(
        (status = 200, description = "Page of users", body = UserListResponse),
        (status = 403, description = "Not a superuser", body = crate::error::ApiError),
        (status = 422, description = "Invalid paging parameters", body = crate::error::ApiError),
    ),
    security(("bearer_auth" = []))
)]
pub async fn list_users_handler(
    State(state): State<Arc<AppState>>,
    Superuser(_admin): Superuser,
    ValidatedQuery(query): ValidatedQuery<ListUsersQuery>,
) -> Result<Json<UserListResponse>, AppError> {
    let (users, total) = state.auth.list_users(query.skip, query.limit).await?;

    Ok(Json(UserListResponse {
        users: users.iter().map(UserResponse::from).collect(),
        total,
        skip: query.skip,
        limit: query.limit,
    }))
}

/// Get a user by id
#[utoipa::path(
    get,
    path = "/api/auth/users/{id}",
    tag = "users",
    params(("id" = Uuid, Path, description = "User id")),
    responses(
        (status = 200, description = "User found", body = UserProfile),
        (status = 403, description = "Not a superuser", body = crate::error::ApiError),
        (status = 404, description = "User not found", body = crate::error::ApiError),
    ),
    security(("bearer_auth" = []))
)]
pub async fn get_user_handler(
    State(state): State<Arc<AppState>>,
    Superuser(_admin): Superuser,
    Path(id): Path<Uuid>,
) -> Result<Json<UserProfile>, AppError> {
    let user = state
        .auth
        .get_user(id)
        .await?
        .ok_or_else(|| AuthError::NotFound("User".to_string()))?;

    Ok(Json(UserProfile::from(&user)))
}

/// Update a user, including account flags, roles and permissions
#[utoipa::path(
    put,
    path = "/api/auth/users/{id}",
    tag = "users",
    params(("id" = Uuid, Path, description = "User id")),
    request_body = AdminUpdateUserRequest,
    responses(
        (status = 200, description = "User updated", body = UserProfile),
        (status = 400, description = "Email already registered", body = crate::error::ApiError),
        (status = 403, description = "Not a superuser", body = crate::error::ApiError),
        (status = 404, description = "User not found", body = crate::error::ApiError),
    ),
    security(("bearer_auth" = []))
)]
pub async fn update_user_handler(
    State(state): State<Arc<AppState>>,
    Superuser(admin): Superuser,
    Path(id): Path<Uuid>,
    ValidatedJson(request): ValidatedJson<AdminUpdateUserRequest>,
) -> Result<Json<UserProfile>, AppError> {
    let updated = state
        .auth
        .update_profile(id, request.into())
        .await?
        .ok_or_else(|| AuthError::NotFound("User".to_string()))?;

    tracing::info!(admin_id = %admin.id, user_id = %id, "User updated by admin");
    Ok(Json(UserProfile::from(&updated)))
}

/// Revoke every refresh token of a user
#[utoipa::path(
    post,
    path = "/api/auth/users/{id}/revoke-tokens",
    tag = "users",
    params(("id" = Uuid, Path, description = "User id")),
    responses(
        (status = 200, description = "Sessions revoked", body = RevokedResponse),
        (status = 403, description = "Not a superuser", body = crate::error::ApiError),
        (status = 404, description = "User not found", body = crate::error::ApiError),
    ),
    security(("bearer_auth" = []))
)]
pub async fn revoke_user_tokens_handler(
    State(state): State<Arc<AppState>>,
    Superuser(admin): Superuser,
    client: ClientInfo,
    Path(id): Path<Uuid>,
) -> Result<Json<RevokedResponse>, AppError> {
    let target = state
        .auth
        .get_user(id)
        .await?
        .ok_or_else(|| AuthError::NotFound("User".to_string()))?;

    let revoked_count = state.auth.revoke_all(target.id).await?;

    audit_log(&AuditEvent::TokensRevokedByAdmin {
        admin_id: admin.id,
        target_user_id: target.id,
        revoked_count,
        ip_address: client.ip_address,
    });

    Ok(Json(RevokedResponse {
        message: format!("Revoked all sessions of {}", target.username),
        revoked_count,
    }))
}
