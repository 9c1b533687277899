//! Database models and API payloads for authentication
//!
//! This module defines the core data structures for the auth system:
//! - User: identity record with credentials, flags, roles and permissions
//! - RefreshToken: one row per login session
//! - Request/response payloads for the auth endpoints
//!
//! These models map to the `users` and `refresh_tokens` tables in PostgreSQL.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::collections::BTreeSet;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::{Validate, ValidationError};

use super::password::validate_password_strength;

// ============================================================================
// Users
// ============================================================================

/// User account model
///
/// Roles and permissions are stored as serialized JSON arrays in text columns.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct User {
    pub id: Uuid,

    /// Lowercased, unique
    pub username: String,

    /// Unique
    pub email: String,

    pub full_name: Option<String>,

    /// Argon2id PHC string. Never serialized.
    #[serde(skip_serializing)]
    pub password_hash: String,

    pub is_active: bool,

    pub is_superuser: bool,

    /// JSON array of role names
    pub roles: Option<String>,

    /// JSON array of permission names
    pub permissions: Option<String>,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,

    pub last_login_at: Option<DateTime<Utc>>,
}

impl User {
    /// Stored role names; a malformed column yields the empty set
    pub fn role_set(&self) -> BTreeSet<String> {
        parse_name_set(self.roles.as_deref())
    }

    /// Stored permission names; a malformed column yields the empty set
    pub fn permission_set(&self) -> BTreeSet<String> {
        parse_name_set(self.permissions.as_deref())
    }
}

/// Parse a JSON array of names leniently
pub fn parse_name_set(raw: Option<&str>) -> BTreeSet<String> {
    let Some(raw) = raw.filter(|s| !s.trim().is_empty()) else {
        return BTreeSet::new();
    };

    match serde_json::from_str::<Vec<String>>(raw) {
        Ok(names) => names.into_iter().collect(),
        Err(e) => {
            tracing::debug!(error = %e, "Ignoring malformed name list");
            BTreeSet::new()
        }
    }
}

/// Serialize names for a text column
pub fn encode_name_list(names: &[String]) -> String {
    let unique: BTreeSet<&String> = names.iter().collect();
    serde_json::to_string(&unique).unwrap_or_else(|_| "[]".to_string())
}

/// Fields for a new user row
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub full_name: Option<String>,
    pub password_hash: String,
    pub is_active: bool,
    pub is_superuser: bool,
    pub roles: Option<Vec<String>>,
    pub permissions: Option<Vec<String>>,
}

/// Partial user update; `None` leaves the column untouched
#[derive(Debug, Clone, Default)]
pub struct UserChanges {
    pub email: Option<String>,
    pub full_name: Option<String>,
    pub is_active: Option<bool>,
    pub is_superuser: Option<bool>,
    pub roles: Option<Vec<String>>,
    pub permissions: Option<Vec<String>>,
    pub password_hash: Option<String>,
}

impl UserChanges {
    pub fn is_empty(&self) -> bool {
        self.email.is_none()
            && self.full_name.is_none()
            && self.is_active.is_none()
            && self.is_superuser.is_none()
            && self.roles.is_none()
            && self.permissions.is_none()
            && self.password_hash.is_none()
    }
}

// ============================================================================
// Refresh tokens
// ============================================================================

/// Refresh token session record
///
/// Only the SHA-256 fingerprint of the token is stored. A row is usable while
/// `is_active` and not yet expired; revocation is permanent.
#[derive(Debug, Clone, FromRow)]
pub struct RefreshToken {
    pub id: Uuid,
    pub token_hash: String,
    pub user_id: Uuid,
    pub is_active: bool,
    pub expires_at: DateTime<Utc>,
    pub user_agent: Option<String>,
    pub ip_address: Option<String>,
    pub created_at: DateTime<Utc>,
    pub revoked_at: Option<DateTime<Utc>>,
}

impl RefreshToken {
    pub fn is_usable(&self, now: DateTime<Utc>) -> bool {
        self.is_active && now < self.expires_at
    }
}

/// Fields for a new refresh token row
#[derive(Debug, Clone)]
pub struct NewRefreshToken {
    pub token_hash: String,
    pub user_id: Uuid,
    pub expires_at: DateTime<Utc>,
    pub user_agent: Option<String>,
    pub ip_address: Option<String>,
}

// ============================================================================
// Response payloads
// ============================================================================

/// Access/refresh token pair returned by login and refresh
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    /// Always `bearer`
    pub token_type: String,
    /// Access token lifetime in seconds
    pub expires_in: i64,
}

/// Public user view
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UserResponse {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub full_name: Option<String>,
    pub is_active: bool,
    pub is_superuser: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_login_at: Option<DateTime<Utc>>,
}

impl From<&User> for UserResponse {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            username: user.username.clone(),
            email: user.email.clone(),
            full_name: user.full_name.clone(),
            is_active: user.is_active,
            is_superuser: user.is_superuser,
            created_at: user.created_at,
            updated_at: user.updated_at,
            last_login_at: user.last_login_at,
        }
    }
}

/// User view including roles and permissions
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UserProfile {
    #[serde(flatten)]
    pub user: UserResponse,
    pub roles: Vec<String>,
    pub permissions: Vec<String>,
}

impl From<&User> for UserProfile {
    fn from(user: &User) -> Self {
        Self {
            user: UserResponse::from(user),
            roles: user.role_set().into_iter().collect(),
            permissions: user.permission_set().into_iter().collect(),
        }
    }
}

/// Paged user listing
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct UserListResponse {
    pub users: Vec<UserResponse>,
    pub total: i64,
    pub skip: i64,
    pub limit: i64,
}

/// A refresh session as shown to its owner (no token material)
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SessionView {
    pub id: Uuid,
    pub is_active: bool,
    pub user_agent: Option<String>,
    pub ip_address: Option<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub revoked_at: Option<DateTime<Utc>>,
}

impl From<&RefreshToken> for SessionView {
    fn from(token: &RefreshToken) -> Self {
        Self {
            id: token.id,
            is_active: token.is_usable(Utc::now()),
            user_agent: token.user_agent.clone(),
            ip_address: token.ip_address.clone(),
            created_at: token.created_at,
            expires_at: token.expires_at,
            revoked_at: token.revoked_at,
        }
    }
}

/// Plain message response
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Result of a bulk revocation
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct RevokedResponse {
    pub message: String,
    pub revoked_count: u64,
}

// ============================================================================
// Request payloads
// ============================================================================

/// Registration request
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct RegisterRequest {
    /// 3-255 characters of letters, digits, `_` and `-`; stored lowercased
    #[validate(
        length(min = 3, max = 255),
        custom(function = "validate_username")
    )]
    pub username: String,

    #[validate(email)]
    pub email: String,

    /// 8-128 characters with at least one letter and one digit
    #[validate(custom(function = "validate_password"))]
    pub password: String,

    #[validate(length(max = 500))]
    pub full_name: Option<String>,
}

/// Login request
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct LoginRequest {
    #[validate(length(min = 1, max = 255))]
    pub username: String,

    #[validate(length(min = 1, max = 128))]
    pub password: String,
}

/// Refresh request
#[derive(Debug, Deserialize, ToSchema)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

/// Logout request
#[derive(Debug, Deserialize, ToSchema)]
pub struct LogoutRequest {
    pub refresh_token: String,
}

/// Password change request
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct ChangePasswordRequest {
    pub current_password: String,

    #[validate(custom(function = "validate_password"))]
    pub new_password: String,
}

/// Self-service profile update; account flags cannot be changed here
#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct UpdateProfileRequest {
    #[validate(email)]
    pub email: Option<String>,

    #[validate(length(max = 500))]
    pub full_name: Option<String>,
}

impl From<UpdateProfileRequest> for UserChanges {
    fn from(req: UpdateProfileRequest) -> Self {
        UserChanges {
            email: req.email,
            full_name: req.full_name,
            ..Default::default()
        }
    }
}

/// Administrative user update
#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct AdminUpdateUserRequest {
    #[validate(email)]
    pub email: Option<String>,

    #[validate(length(max = 500))]
    pub full_name: Option<String>,

    pub is_active: Option<bool>,

    pub is_superuser: Option<bool>,

    pub roles: Option<Vec<String>>,

    pub permissions: Option<Vec<String>>,
}

impl From<AdminUpdateUserRequest> for UserChanges {
    fn from(req: AdminUpdateUserRequest) -> Self {
        UserChanges {
            email: req.email,
            full_name: req.full_name,
            is_active: req.is_active,
            is_superuser: req.is_superuser,
            roles: req.roles,
            permissions: req.permissions,
            password_hash: None,
        }
    }
}

/// Pagination for user listing
#[derive(Debug, Deserialize, Validate, IntoParams)]
pub struct ListUsersQuery {
    #[serde(default)]
    #[validate(range(min = 0))]
    pub skip: i64,

    #[serde(default = "default_limit")]
    #[validate(range(min = 1, max = 1000))]
    pub limit: i64,
}

pub(crate) fn default_limit() -> i64 {
    100
}

fn validate_username(username: &str) -> Result<(), ValidationError> {
    if username
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        Ok(())
    } else {
        let mut err = ValidationError::new("username_charset");
        err.message =
            Some("Username may only contain letters, digits, underscores and hyphens".into());
        Err(err)
    }
}

fn validate_password(password: &str) -> Result<(), ValidationError> {
    validate_password_strength(password).map_err(|message| {
        let mut err = ValidationError::new("password_strength");
        err.message = Some(message.into());
        err
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user_with(roles: Option<&str>, permissions: Option<&str>) -> User {
        let now = Utc::now();
        User {
            id: Uuid::new_v4(),
            username: "alice".to_string(),
            email: "alice@x.com".to_string(),
            full_name: None,
            password_hash: "$argon2id$secret".to_string(),
            is_active: true,
            is_superuser: false,
            roles: roles.map(str::to_string),
            permissions: permissions.map(str::to_string),
            created_at: now,
            updated_at: now,
            last_login_at: None,
        }
    }

    #[test]
    fn test_name_sets_parse_leniently() {
        let user = user_with(Some(r#"["editor","admin"]"#), Some("not json"));
        assert_eq!(
            user.role_set(),
            BTreeSet::from(["admin".to_string(), "editor".to_string()])
        );
        assert!(user.permission_set().is_empty());
        assert!(user_with(None, Some("")).permission_set().is_empty());
    }

    #[test]
    fn test_encode_name_list_dedups() {
        let encoded = encode_name_list(&["b".to_string(), "a".to_string(), "b".to_string()]);
        assert_eq!(encoded, r#"["a","b"]"#);
    }

    #[test]
    fn test_password_hash_never_serialized() {
        let json = serde_json::to_value(user_with(None, None)).unwrap();
        assert!(json.get("password_hash").is_none());
        assert_eq!(json["username"], "alice");
    }

    #[test]
    fn test_register_request_validation() {
        let valid = RegisterRequest {
            username: "alice_01".to_string(),
            email: "alice@x.com".to_string(),
            password: "Secret12".to_string(),
            full_name: None,
        };
        assert!(valid.validate().is_ok());

        let bad_username = RegisterRequest {
            username: "al ice".to_string(),
            ..valid
        };
        let errors = bad_username.validate().unwrap_err();
        assert!(errors.field_errors().contains_key("username"));

        let weak = RegisterRequest {
            username: "alice".to_string(),
            email: "not-an-email".to_string(),
            password: "password".to_string(),
            full_name: None,
        };
        let errors = weak.validate().unwrap_err();
        assert!(errors.field_errors().contains_key("email"));
        assert!(errors.field_errors().contains_key("password"));
    }

    #[test]
    fn test_profile_update_rejects_flags() {
        let result: Result<UpdateProfileRequest, _> =
            serde_json::from_str(r#"{"email":"a@x.com","is_superuser":true}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_session_view_reflects_expiry() {
        let now = Utc::now();
        let token = RefreshToken {
            id: Uuid::new_v4(),
            token_hash: "abc".to_string(),
            user_id: Uuid::new_v4(),
            is_active: true,
            expires_at: now - chrono::Duration::seconds(1),
            user_agent: None,
            ip_address: None,
            created_at: now,
            revoked_at: None,
        };
        assert!(!SessionView::from(&token).is_active);
    }
}
