//! Request authentication and authorization gates
//!
//! Every protected request re-verifies its bearer token and re-reads the user;
//! nothing is cached. The gates form a chain where each stage takes the user
//! resolved by the previous one:
//!
//! `resolve_required` -> [`require_active`] -> [`require_superuser`]
//!
//! Permission and role checks are expressed as a [`Requirement`] and applied
//! with [`enforce`]. Superusers bypass both. Permissions are AND-gated, roles
//! are OR-gated.
//!
//! In handlers the chain is available as the extractors [`CurrentUser`],
//! [`ActiveUser`], [`Superuser`] and [`MaybeUser`].

use axum::extract::{ConnectInfo, FromRequestParts};
use axum::http::{header, request::Parts, HeaderMap};
use std::collections::BTreeSet;
use std::net::SocketAddr;
use std::sync::Arc;

use super::jwt::TokenCodec;
use super::models::User;
use super::repository::UserStore;
use super::service::AuthError;
use crate::audit::{audit_log, extract_ip_address, extract_user_agent, AuditEvent};
use crate::error::AppError;

/// Resolves bearer tokens to users
pub struct RequestAuthenticator {
    codec: Arc<TokenCodec>,
    users: Arc<dyn UserStore>,
}

impl RequestAuthenticator {
    pub fn new(codec: Arc<TokenCodec>, users: Arc<dyn UserStore>) -> Self {
        Self { codec, users }
    }

    /// Verify the token and load its subject
    ///
    /// Does not look at the active flag. Any token problem or a subject that no
    /// longer exists is `Unauthorized`.
    pub async fn resolve_required(&self, token: &str) -> Result<User, AuthError> {
        let claims = self
            .codec
            .verify_access_token(token)
            .map_err(|_| AuthError::Unauthorized)?;

        self.users
            .find_by_username(&claims.sub)
            .await?
            .ok_or(AuthError::Unauthorized)
    }

    /// [`resolve_required`](Self::resolve_required) then [`require_active`]
    pub async fn resolve_active_required(&self, token: &str) -> Result<User, AuthError> {
        require_active(self.resolve_required(token).await?)
    }

    /// [`resolve_active_required`](Self::resolve_active_required) then [`require_superuser`]
    pub async fn resolve_superuser_required(&self, token: &str) -> Result<User, AuthError> {
        require_superuser(self.resolve_active_required(token).await?)
    }

    /// Like `resolve_required` but every failure, including an inactive
    /// account, is `None`
    pub async fn resolve_optional(&self, token: Option<&str>) -> Option<User> {
        let user = self.resolve_required(token?).await.ok()?;
        user.is_active.then_some(user)
    }
}

/// Fails with `AccountDisabled` for an inactive user
pub fn require_active(user: User) -> Result<User, AuthError> {
    if user.is_active {
        Ok(user)
    } else {
        Err(AuthError::AccountDisabled)
    }
}

/// Fails with `Forbidden` unless the user is a superuser
pub fn require_superuser(user: User) -> Result<User, AuthError> {
    if user.is_superuser {
        Ok(user)
    } else {
        Err(AuthError::Forbidden(
            "The user doesn't have enough privileges".to_string(),
        ))
    }
}

/// How the required names are combined
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequirementKind {
    /// Every name must be held
    All,
    /// At least one name must be held
    Any,
}

/// Which stored set the names are checked against
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequirementSubject {
    Permissions,
    Roles,
}

/// An authorization predicate over a user's permissions or roles
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Requirement {
    pub kind: RequirementKind,
    pub subject: RequirementSubject,
    pub names: BTreeSet<String>,
}

impl Requirement {
    pub fn new<I, S>(kind: RequirementKind, subject: RequirementSubject, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            kind,
            subject,
            names: names.into_iter().map(Into::into).collect(),
        }
    }

    /// The user must hold every listed permission
    pub fn all_permissions<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(RequirementKind::All, RequirementSubject::Permissions, names)
    }

    /// The user must hold at least one listed role
    pub fn any_role<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(RequirementKind::Any, RequirementSubject::Roles, names)
    }

    /// Whether a set of held names satisfies the requirement
    ///
    /// `All` over no names is satisfied; `Any` over no names is not.
    pub fn satisfied_by(&self, held: &BTreeSet<String>) -> bool {
        match self.kind {
            RequirementKind::All => self.names.is_subset(held),
            RequirementKind::Any => !self.names.is_disjoint(held),
        }
    }
}

impl std::fmt::Display for Requirement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self.kind {
            RequirementKind::All => "all",
            RequirementKind::Any => "any",
        };
        let subject = match self.subject {
            RequirementSubject::Permissions => "permissions",
            RequirementSubject::Roles => "roles",
        };
        let names: Vec<&str> = self.names.iter().map(String::as_str).collect();
        write!(f, "{kind} {subject} of [{}]", names.join(", "))
    }
}

/// Check a requirement against a user; superusers always pass
pub fn enforce(requirement: &Requirement, user: &User) -> Result<(), AuthError> {
    if user.is_superuser {
        return Ok(());
    }

    let held = match requirement.subject {
        RequirementSubject::Permissions => user.permission_set(),
        RequirementSubject::Roles => user.role_set(),
    };

    if requirement.satisfied_by(&held) {
        Ok(())
    } else {
        Err(AuthError::Forbidden(format!("Requires {requirement}")))
    }
}

/// [`enforce`], writing denials to the audit log
pub fn authorize(
    requirement: &Requirement,
    user: &User,
    client: &ClientInfo,
    resource: &str,
) -> Result<(), AuthError> {
    enforce(requirement, user).inspect_err(|_| {
        audit_log(&AuditEvent::AccessDenied {
            user_id: Some(user.id),
            username: Some(user.username.clone()),
            resource: resource.to_string(),
            requirement: Some(requirement.to_string()),
            ip_address: client.ip_address.clone(),
            user_agent: client.user_agent.clone(),
        });
    })
}

/// Token from `Authorization: Bearer <token>`; the scheme is case-insensitive
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.trim().split_once(' ')?;
    let token = token.trim();

    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}

// ============================================================================
// Extractors
// ============================================================================

/// Client address and user agent of the request
#[derive(Debug, Clone, Default)]
pub struct ClientInfo {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

impl ClientInfo {
    pub fn from_parts(parts: &Parts) -> Self {
        let ip_address = extract_ip_address(&parts.headers).or_else(|| {
            parts
                .extensions
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| addr.ip().to_string())
        });

        Self {
            ip_address,
            user_agent: extract_user_agent(&parts.headers),
        }
    }
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for ClientInfo
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(ClientInfo::from_parts(parts))
    }
}

/// Router state that can hand out the request authenticator
///
/// Implemented by the application state; the user extractors below work with
/// any state that implements it.
pub trait AuthenticatorSource {
    fn authenticator(&self) -> Arc<RequestAuthenticator>;
}

impl AuthenticatorSource for Arc<RequestAuthenticator> {
    fn authenticator(&self) -> Arc<RequestAuthenticator> {
        Arc::clone(self)
    }
}

/// Any user holding a valid token, active or not
#[derive(Debug, Clone)]
pub struct CurrentUser(pub User);

#[axum::async_trait]
impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
    S: AuthenticatorSource,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let authenticator = state.authenticator();

        let Some(token) = bearer_token(&parts.headers) else {
            return Err(AuthError::Unauthorized.into());
        };

        match authenticator.resolve_required(token).await {
            Ok(user) => Ok(CurrentUser(user)),
            Err(AuthError::Unauthorized) => {
                let client = ClientInfo::from_parts(parts);
                audit_log(&AuditEvent::InvalidToken {
                    ip_address: client.ip_address,
                    user_agent: client.user_agent,
                    reason: "token rejected or subject unknown".to_string(),
                });
                Err(AuthError::Unauthorized.into())
            }
            Err(other) => Err(other.into()),
        }
    }
}

/// A user with a valid token and an active account
#[derive(Debug, Clone)]
pub struct ActiveUser(pub User);

#[axum::async_trait]
impl<S> FromRequestParts<S> for ActiveUser
where
    S: Send + Sync,
    S: AuthenticatorSource,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let CurrentUser(user) = CurrentUser::from_request_parts(parts, state).await?;
        Ok(ActiveUser(require_active(user)?))
    }
}

/// An active superuser
#[derive(Debug, Clone)]
pub struct Superuser(pub User);

#[axum::async_trait]
impl<S> FromRequestParts<S> for Superuser
where
    S: Send + Sync,
    S: AuthenticatorSource,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let ActiveUser(user) = ActiveUser::from_request_parts(parts, state).await?;
        let (user_id, username) = (user.id, user.username.clone());

        match require_superuser(user) {
            Ok(user) => Ok(Superuser(user)),
            Err(err) => {
                let client = ClientInfo::from_parts(parts);
                audit_log(&AuditEvent::AccessDenied {
                    user_id: Some(user_id),
                    username: Some(username),
                    resource: format!("{} {}", parts.method, parts.uri.path()),
                    requirement: Some("superuser".to_string()),
                    ip_address: client.ip_address,
                    user_agent: client.user_agent,
                });
                Err(err.into())
            }
        }
    }
}

/// An active user if a usable token was presented, otherwise `None`
#[derive(Debug, Clone)]
pub struct MaybeUser(pub Option<User>);

#[axum::async_trait]
impl<S> FromRequestParts<S> for MaybeUser
where
    S: Send + Sync,
    S: AuthenticatorSource,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let authenticator = state.authenticator();
        Ok(MaybeUser(
            authenticator
                .resolve_optional(bearer_token(&parts.headers))
                .await,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::memory::MemoryAuthStore;
    use crate::auth::models::{NewUser, UserChanges};
    use axum::http::HeaderValue;
    use chrono::{Duration, Utc};
    use uuid::Uuid;
    use warden_core::AuthConfig;

    fn user(roles: Option<&str>, permissions: Option<&str>, is_superuser: bool) -> User {
        let now = Utc::now();
        User {
            id: Uuid::new_v4(),
            username: "carol".to_string(),
            email: "carol@x.com".to_string(),
            full_name: None,
            password_hash: String::new(),
            is_active: true,
            is_superuser,
            roles: roles.map(str::to_string),
            permissions: permissions.map(str::to_string),
            created_at: now,
            updated_at: now,
            last_login_at: None,
        }
    }

    #[test]
    fn test_roles_are_or_gated() {
        let editor = user(Some(r#"["editor"]"#), None, false);
        assert!(enforce(&Requirement::any_role(["editor", "admin"]), &editor).is_ok());
        assert!(enforce(&Requirement::any_role(["admin"]), &editor).is_err());
    }

    #[test]
    fn test_permissions_are_and_gated() {
        let reader = user(None, Some(r#"["read"]"#), false);
        assert!(matches!(
            enforce(&Requirement::all_permissions(["read", "write"]), &reader),
            Err(AuthError::Forbidden(_))
        ));
        assert!(enforce(&Requirement::all_permissions(["read"]), &reader).is_ok());
    }

    #[test]
    fn test_superuser_bypasses_everything() {
        let root = user(None, None, true);
        assert!(enforce(&Requirement::all_permissions(["a", "b"]), &root).is_ok());
        assert!(enforce(&Requirement::any_role(["admin"]), &root).is_ok());
    }

    #[test]
    fn test_malformed_permissions_deny() {
        let broken = user(Some("{oops"), Some("[1,2"), false);
        assert!(enforce(&Requirement::all_permissions(["read"]), &broken).is_err());
        assert!(enforce(&Requirement::any_role(["editor"]), &broken).is_err());
    }

    #[test]
    fn test_empty_requirements() {
        let nobody = user(None, None, false);
        assert!(enforce(&Requirement::all_permissions(Vec::<String>::new()), &nobody).is_ok());
        assert!(enforce(&Requirement::any_role(Vec::<String>::new()), &nobody).is_err());
    }

    #[test]
    fn test_requirement_display() {
        let req = Requirement::any_role(["maintainer", "admin"]);
        assert_eq!(req.to_string(), "any roles of [admin, maintainer]");
    }

    #[test]
    fn test_gate_chain() {
        let mut inactive = user(None, None, true);
        inactive.is_active = false;
        assert!(matches!(
            require_active(inactive),
            Err(AuthError::AccountDisabled)
        ));

        let plain = user(None, None, false);
        assert!(matches!(
            require_superuser(plain),
            Err(AuthError::Forbidden(_))
        ));
    }

    #[test]
    fn test_bearer_token_parsing() {
        let mut headers = HeaderMap::new();
        assert_eq!(bearer_token(&headers), None);

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("bearer abc"));
        assert_eq!(bearer_token(&headers), Some("abc"));

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("BEARER  xyz "));
        assert_eq!(bearer_token(&headers), Some("xyz"));

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert_eq!(bearer_token(&headers), None);

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer"));
        assert_eq!(bearer_token(&headers), None);
    }

    #[tokio::test]
    async fn test_resolution_paths() {
        let config = AuthConfig::default();
        let codec = Arc::new(TokenCodec::new(&config).unwrap());
        let store = Arc::new(MemoryAuthStore::new());
        let authenticator = RequestAuthenticator::new(codec.clone(), store.clone());

        let dave = UserStore::insert(
            store.as_ref(),
            NewUser {
                username: "dave".to_string(),
                email: "dave@x.com".to_string(),
                full_name: None,
                password_hash: "x".to_string(),
                is_active: true,
                is_superuser: false,
                roles: None,
                permissions: None,
            },
        )
        .await
        .unwrap();
        let token = codec
            .issue_access_token("dave", dave.id, Duration::minutes(5))
            .unwrap();

        assert_eq!(
            authenticator.resolve_required(&token).await.unwrap().id,
            dave.id
        );
        assert!(matches!(
            authenticator.resolve_superuser_required(&token).await,
            Err(AuthError::Forbidden(_))
        ));
        assert!(matches!(
            authenticator.resolve_required("garbage").await,
            Err(AuthError::Unauthorized)
        ));

        // Unknown subject
        let ghost = codec
            .issue_access_token("ghost", Uuid::new_v4(), Duration::minutes(5))
            .unwrap();
        assert!(matches!(
            authenticator.resolve_required(&ghost).await,
            Err(AuthError::Unauthorized)
        ));
        assert!(authenticator.resolve_optional(Some(&ghost)).await.is_none());
        assert!(authenticator.resolve_optional(None).await.is_none());

        // Deactivated: required still resolves, active and optional do not
        store
            .update_fields(
                dave.id,
                UserChanges {
                    is_active: Some(false),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert!(authenticator.resolve_required(&token).await.is_ok());
        assert!(matches!(
            authenticator.resolve_active_required(&token).await,
            Err(AuthError::AccountDisabled)
        ));
        assert!(authenticator.resolve_optional(Some(&token)).await.is_none());
    }

    fn request_parts(token: Option<&str>) -> Parts {
        let mut builder = axum::http::Request::builder().uri("/api/auth/me");
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        builder.body(()).unwrap().into_parts().0
    }

    #[tokio::test]
    async fn test_extractors_over_authenticator_state() {
        let config = AuthConfig::default();
        let codec = Arc::new(TokenCodec::new(&config).unwrap());
        let store = Arc::new(MemoryAuthStore::new());
        let state = Arc::new(RequestAuthenticator::new(codec.clone(), store.clone()));

        let erin = UserStore::insert(
            store.as_ref(),
            NewUser {
                username: "erin".to_string(),
                email: "erin@x.com".to_string(),
                full_name: None,
                password_hash: "x".to_string(),
                is_active: true,
                is_superuser: false,
                roles: None,
                permissions: None,
            },
        )
        .await
        .unwrap();
        let token = codec
            .issue_access_token("erin", erin.id, Duration::minutes(5))
            .unwrap();

        let CurrentUser(current) =
            CurrentUser::from_request_parts(&mut request_parts(Some(&token)), &state)
                .await
                .unwrap();
        assert_eq!(current.id, erin.id);

        let ActiveUser(active) =
            ActiveUser::from_request_parts(&mut request_parts(Some(&token)), &state)
                .await
                .unwrap();
        assert_eq!(active.id, erin.id);

        assert!(
            Superuser::from_request_parts(&mut request_parts(Some(&token)), &state)
                .await
                .is_err()
        );
        assert!(CurrentUser::from_request_parts(&mut request_parts(None), &state)
            .await
            .is_err());

        let MaybeUser(anonymous) =
            MaybeUser::from_request_parts(&mut request_parts(Some("garbage")), &state)
                .await
                .unwrap();
        assert!(anonymous.is_none());
    }
}
