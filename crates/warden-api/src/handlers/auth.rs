//! Authentication API handlers
//!
//! Registration, login, token refresh, logout and self-service profile
//! endpoints under `/api/auth`.
//!
//! Author: hephaex@gmail.com

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use std::sync::Arc;

use crate::audit::{audit_log, AuditEvent};
use crate::auth::models::{
    ChangePasswordRequest, LoginRequest, LogoutRequest, MessageResponse, RefreshRequest,
    RegisterRequest, RevokedResponse, UpdateProfileRequest,
};
use crate::auth::{
    ActiveUser, AuthError, ClientInfo, ClientMeta, CurrentUser, Registration, SessionView,
    TokenPair, UserProfile, UserResponse,
};
use crate::error::AppError;
use crate::extract::{ApiJson, ValidatedJson};
use crate::state::AppState;

impl From<ClientInfo> for ClientMeta {
    fn from(client: ClientInfo) -> Self {
        ClientMeta {
            user_agent: client.user_agent,
            ip_address: client.ip_address,
        }
    }
}

/// Register a new user account
///
/// The username is stored lowercased. New accounts are active, not
/// superusers, and hold no roles or permissions.
///
/// # Responses
///
/// * `201 Created` - User registered
/// * `400 Bad Request` - Username or email already registered
/// * `422 Unprocessable Entity` - Field validation failed
#[utoipa::path(
    post,
    path = "/api/auth/register",
    tag = "auth",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "User registered successfully", body = UserResponse),
        (status = 400, description = "Username or email already registered", body = crate::error::ApiError),
        (status = 422, description = "Validation error", body = crate::error::ApiError),
    )
)]
pub async fn register_handler(
    State(state): State<Arc<AppState>>,
    client: ClientInfo,
    ValidatedJson(request): ValidatedJson<RegisterRequest>,
) -> Result<impl IntoResponse, AppError> {
    let username = request.username.clone();
    let email = request.email.clone();
    let registration = Registration::new(request.username, request.email, request.password)
        .with_full_name(request.full_name);

    match state.auth.register(registration).await {
        Ok(user) => {
            audit_log(&AuditEvent::RegistrationSuccess {
                user_id: user.id,
                username: user.username.clone(),
                email: user.email.clone(),
                ip_address: client.ip_address,
                user_agent: client.user_agent,
            });
            Ok((StatusCode::CREATED, Json(UserResponse::from(&user))))
        }
        Err(err) => {
            if matches!(
                err,
                AuthError::DuplicateUsername | AuthError::DuplicateEmail
            ) {
                audit_log(&AuditEvent::RegistrationFailure {
                    username,
                    email,
                    reason: err.to_string(),
                    ip_address: client.ip_address,
                    user_agent: client.user_agent,
                });
            }
            Err(err.into())
        }
    }
}

/// Login with username and password
///
/// Unknown users, wrong passwords and inactive accounts all produce the same
/// 401 response.
#[utoipa::path(
    post,
    path = "/api/auth/login",
    tag = "auth",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = TokenPair),
        (status = 401, description = "Incorrect username or password", body = crate::error::ApiError),
        (status = 422, description = "Validation error", body = crate::error::ApiError),
    )
)]
pub async fn login_handler(
    State(state): State<Arc<AppState>>,
    client: ClientInfo,
    ValidatedJson(request): ValidatedJson<LoginRequest>,
) -> Result<Json<TokenPair>, AppError> {
    let Some(user) = state
        .auth
        .authenticate(&request.username, &request.password)
        .await?
    else {
        audit_log(&AuditEvent::LoginFailure {
            username: request.username,
            reason: "invalid credentials or inactive account".to_string(),
            ip_address: client.ip_address,
            user_agent: client.user_agent,
        });
        return Err(AuthError::InvalidCredentials.into());
    };

    let pair = state
        .auth
        .issue_session(&user, ClientMeta::from(client.clone()))
        .await?;

    audit_log(&AuditEvent::LoginSuccess {
        user_id: user.id,
        username: user.username,
        ip_address: client.ip_address,
        user_agent: client.user_agent,
    });

    Ok(Json(pair))
}

/// Refresh access token
///
/// Returns a new access token. The refresh token is not rotated and comes
/// back unchanged.
#[utoipa::path(
    post,
    path = "/api/auth/refresh",
    tag = "auth",
    request_body = RefreshRequest,
    responses(
        (status = 200, description = "Token refreshed successfully", body = TokenPair),
        (status = 401, description = "Invalid or expired refresh token", body = crate::error::ApiError),
    )
)]
pub async fn refresh_handler(
    State(state): State<Arc<AppState>>,
    client: ClientInfo,
    ApiJson(request): ApiJson<RefreshRequest>,
) -> Result<Json<TokenPair>, AppError> {
    match state.auth.refresh(&request.refresh_token).await? {
        Some((user, pair)) => {
            audit_log(&AuditEvent::TokenRefresh {
                user_id: user.id,
                username: user.username,
                ip_address: client.ip_address,
                user_agent: client.user_agent,
            });
            Ok(Json(pair))
        }
        None => {
            audit_log(&AuditEvent::RefreshRejected {
                ip_address: client.ip_address,
                user_agent: client.user_agent,
            });
            Err(AuthError::InvalidToken.into())
        }
    }
}

/// Logout current session
///
/// Revokes the given refresh token. Succeeds whether or not the token was
/// still active.
#[utoipa::path(
    post,
    path = "/api/auth/logout",
    tag = "auth",
    request_body = LogoutRequest,
    responses(
        (status = 200, description = "Logout successful", body = MessageResponse),
        (status = 401, description = "Unauthorized", body = crate::error::ApiError),
    ),
    security(("bearer_auth" = []))
)]
pub async fn logout_handler(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    client: ClientInfo,
    ApiJson(request): ApiJson<LogoutRequest>,
) -> Result<Json<MessageResponse>, AppError> {
    let revoked = state.auth.revoke(&request.refresh_token).await?;

    audit_log(&AuditEvent::Logout {
        user_id: user.id,
        username: user.username,
        revoked,
        ip_address: client.ip_address,
    });

    Ok(Json(MessageResponse::new("Successfully logged out")))
}

/// Logout from all devices
#[utoipa::path(
    post,
    path = "/api/auth/logout-all",
    tag = "auth",
    responses(
        (status = 200, description = "All sessions revoked", body = RevokedResponse),
        (status = 401, description = "Unauthorized", body = crate::error::ApiError),
    ),
    security(("bearer_auth" = []))
)]
pub async fn logout_all_handler(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    client: ClientInfo,
) -> Result<Json<RevokedResponse>, AppError> {
    let revoked_count = state.auth.revoke_all(user.id).await?;

    audit_log(&AuditEvent::LogoutAll {
        user_id: user.id,
        username: user.username,
        revoked_count,
        ip_address: client.ip_address,
    });

    Ok(Json(RevokedResponse {
        message: "Successfully logged out from all devices".to_string(),
        revoked_count,
    }))
}

/// Get current user profile
#[utoipa::path(
    get,
    path = "/api/auth/me",
    tag = "auth",
    responses(
        (status = 200, description = "Current user profile", body = UserProfile),
        (status = 400, description = "Inactive user", body = crate::error::ApiError),
        (status = 401, description = "Unauthorized", body = crate::error::ApiError),
    ),
    security(("bearer_auth" = []))
)]
pub async fn me_handler(ActiveUser(user): ActiveUser) -> Json<UserProfile> {
    Json(UserProfile::from(&user))
}

/// Update current user profile
///
/// Only `email` and `full_name` may be changed here.
#[utoipa::path(
    put,
    path = "/api/auth/me",
    tag = "auth",
    request_body = UpdateProfileRequest,
    responses(
        (status = 200, description = "Profile updated", body = UserResponse),
        (status = 400, description = "Email already registered", body = crate::error::ApiError),
        (status = 404, description = "User not found", body = crate::error::ApiError),
        (status = 422, description = "Validation error", body = crate::error::ApiError),
    ),
    security(("bearer_auth" = []))
)]
pub async fn update_me_handler(
    State(state): State<Arc<AppState>>,
    ActiveUser(user): ActiveUser,
    ValidatedJson(request): ValidatedJson<UpdateProfileRequest>,
) -> Result<Json<UserResponse>, AppError> {
    let updated = state
        .auth
        .update_profile(user.id, request.into())
        .await?
        .ok_or_else(|| AuthError::NotFound("User".to_string()))?;

    Ok(Json(UserResponse::from(&updated)))
}

/// Change password
///
/// Every refresh token of the user is revoked on success.
#[utoipa::path(
    post,
    path = "/api/auth/change-password",
    tag = "auth",
    request_body = ChangePasswordRequest,
    responses(
        (status = 200, description = "Password changed", body = RevokedResponse),
        (status = 400, description = "Incorrect password", body = crate::error::ApiError),
        (status = 422, description = "Validation error", body = crate::error::ApiError),
    ),
    security(("bearer_auth" = []))
)]
pub async fn change_password_handler(
    State(state): State<Arc<AppState>>,
    ActiveUser(user): ActiveUser,
    client: ClientInfo,
    ValidatedJson(request): ValidatedJson<ChangePasswordRequest>,
) -> Result<Json<RevokedResponse>, AppError> {
    let changed = state
        .auth
        .change_password(user.id, &request.current_password, &request.new_password)
        .await?;

    let Some(revoked_count) = changed else {
        audit_log(&AuditEvent::PasswordChangeFailure {
            user_id: user.id,
            username: user.username,
            ip_address: client.ip_address,
        });
        return Err(AppError::BadRequest("Incorrect password".to_string()));
    };

    audit_log(&AuditEvent::PasswordChange {
        user_id: user.id,
        username: user.username,
        revoked_count,
        ip_address: client.ip_address,
        user_agent: client.user_agent,
    });

    Ok(Json(RevokedResponse {
        message: "Password updated successfully".to_string(),
        revoked_count,
    }))
}

/// List the caller's refresh sessions
#[utoipa::path(
    get,
    path = "/api/auth/sessions",
    tag = "auth",
    responses(
        (status = 200, description = "Refresh sessions, newest first", body = Vec<SessionView>),
        (status = 401, description = "Unauthorized", body = crate::error::ApiError),
    ),
    security(("bearer_auth" = []))
)]
pub async fn sessions_handler(
    State(state): State<Arc<AppState>>,
    ActiveUser(user): ActiveUser,
) -> Result<Json<Vec<SessionView>>, AppError> {
    let sessions = state.auth.list_sessions(user.id).await?;
    Ok(Json(sessions.iter().map(SessionView::from).collect()))
}
