//! API error handling
//!
//! `AppError` is the single place where failures become HTTP responses.
//! Bodies are `{code, message, details?}` JSON; internal faults are logged
//! and rendered without details.
//!
//! Author: hephaex@gmail.com

use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use warden_core::WardenError;

use crate::auth::AuthError;

/// API error response
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ApiError {
    /// Error code
    pub code: String,
    /// Human-readable message
    pub message: String,
    /// Additional details (field errors for validation failures)
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<Object>)]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn not_found(resource: &str) -> Self {
        Self::new("NOT_FOUND", format!("{resource} not found"))
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new("BAD_REQUEST", message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new("UNAUTHORIZED", message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new("FORBIDDEN", message)
    }

    pub fn internal_error() -> Self {
        Self::new("INTERNAL_ERROR", "Internal server error")
    }
}

/// Application error type
#[derive(Debug)]
pub enum AppError {
    NotFound(String),
    BadRequest(String),
    /// 401 with `WWW-Authenticate: Bearer`
    Unauthorized(String),
    Forbidden(String),
    /// 422 with per-field errors
    Validation(validator::ValidationErrors),
    /// Body or query that could not be decoded
    InvalidInput(StatusCode, String),
    Internal(String),
    Database(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error) = match self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, ApiError::not_found(&msg)),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, ApiError::bad_request(msg)),
            AppError::Unauthorized(msg) => {
                return (
                    StatusCode::UNAUTHORIZED,
                    [(header::WWW_AUTHENTICATE, "Bearer")],
                    Json(ApiError::unauthorized(msg)),
                )
                    .into_response();
            }
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, ApiError::forbidden(msg)),
            AppError::Validation(errors) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                ApiError::new("VALIDATION_ERROR", "Request validation failed")
                    .with_details(serde_json::to_value(&errors).unwrap_or_default()),
            ),
            AppError::InvalidInput(status, msg) => (status, ApiError::new("INVALID_INPUT", msg)),
            AppError::Internal(msg) => {
                tracing::error!(error = %msg, "Internal error");
                (StatusCode::INTERNAL_SERVER_ERROR, ApiError::internal_error())
            }
            AppError::Database(msg) => {
                tracing::error!(error = %msg, "Database error");
                (StatusCode::INTERNAL_SERVER_ERROR, ApiError::internal_error())
            }
        };

        (status, Json(error)).into_response()
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        AppError::Validation(errors)
    }
}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::DuplicateUsername => {
                AppError::BadRequest("Username already registered".to_string())
            }
            AuthError::DuplicateEmail => AppError::BadRequest("Email already registered".to_string()),
            AuthError::InvalidCredentials => {
                AppError::Unauthorized("Incorrect username or password".to_string())
            }
            AuthError::InvalidToken => {
                AppError::Unauthorized("Invalid or expired token".to_string())
            }
            AuthError::Unauthorized => {
                AppError::Unauthorized("Could not validate credentials".to_string())
            }
            AuthError::AccountDisabled => AppError::BadRequest("Inactive user".to_string()),
            AuthError::Forbidden(msg) => AppError::Forbidden(msg),
            AuthError::NotFound(what) => AppError::NotFound(what),
            AuthError::Store(e) => AppError::Database(e.to_string()),
            AuthError::Hashing(e) => AppError::Internal(e.to_string()),
            AuthError::Codec(e) => AppError::Internal(e.to_string()),
        }
    }
}

impl From<WardenError> for AppError {
    fn from(err: WardenError) -> Self {
        match err {
            WardenError::NotFound(msg) => AppError::NotFound(msg),
            WardenError::Duplicate(msg) => AppError::BadRequest(format!("{msg} already exists")),
            WardenError::ValidationError(msg) => AppError::BadRequest(msg),
            WardenError::DatabaseError(msg) => AppError::Database(msg),
            WardenError::ConfigError(msg) => {
                AppError::Internal(format!("Configuration error: {msg}"))
            }
            WardenError::Other(err) => AppError::Internal(err.to_string()),
        }
    }
}
