//! Authentication service layer
//!
//! Orchestrates password hashing, token issuance and the user/token stores into
//! the registration, login, refresh, logout and password-change flows. All
//! session state lives in the refresh token rows; this service owns every
//! transition of those rows and of user records.

use chrono::{Duration, Utc};
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;
use warden_core::AuthConfig;

use super::jwt::{fingerprint, CodecError, TokenCodec};
use super::models::{NewRefreshToken, NewUser, RefreshToken, TokenPair, User, UserChanges};
use super::password::{PasswordError, PasswordHasher};
use super::repository::{DuplicateField, StoreError, TokenStore, UserStore};

/// Authentication and authorization errors
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Username already registered")]
    DuplicateUsername,

    #[error("Email already registered")]
    DuplicateEmail,

    #[error("Incorrect username or password")]
    InvalidCredentials,

    #[error("Invalid or expired token")]
    InvalidToken,

    #[error("Could not validate credentials")]
    Unauthorized,

    #[error("Account is disabled")]
    AccountDisabled,

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Storage failure: {0}")]
    Store(#[source] StoreError),

    #[error("Password hashing failure: {0}")]
    Hashing(#[from] PasswordError),

    #[error("Token codec failure: {0}")]
    Codec(#[from] CodecError),
}

impl From<StoreError> for AuthError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::DuplicateKey(DuplicateField::Username) => AuthError::DuplicateUsername,
            StoreError::DuplicateKey(DuplicateField::Email) => AuthError::DuplicateEmail,
            other => AuthError::Store(other),
        }
    }
}

/// Input for [`AuthService::register`]
#[derive(Debug, Clone)]
pub struct Registration {
    pub username: String,
    pub email: String,
    pub password: String,
    pub full_name: Option<String>,
    pub is_active: bool,
    pub is_superuser: bool,
}

impl Registration {
    /// An active, non-superuser account
    pub fn new(
        username: impl Into<String>,
        email: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            username: username.into(),
            email: email.into(),
            password: password.into(),
            full_name: None,
            is_active: true,
            is_superuser: false,
        }
    }

    pub fn with_full_name(mut self, full_name: Option<String>) -> Self {
        self.full_name = full_name;
        self
    }

    pub fn superuser(mut self) -> Self {
        self.is_superuser = true;
        self
    }
}

/// Where a session was opened from, kept for auditing
#[derive(Debug, Clone, Default)]
pub struct ClientMeta {
    pub user_agent: Option<String>,
    pub ip_address: Option<String>,
}

/// Usernames are stored and looked up lowercased
pub fn normalize_username(username: &str) -> String {
    username.trim().to_lowercase()
}

/// Authentication service
pub struct AuthService {
    users: Arc<dyn UserStore>,
    tokens: Arc<dyn TokenStore>,
    codec: Arc<TokenCodec>,
    hasher: PasswordHasher,
    access_ttl: Duration,
    refresh_ttl: Duration,
    /// Verified against when the username is unknown
    dummy_hash: String,
}

impl AuthService {
    /// Create a new authentication service
    ///
    /// # Arguments
    ///
    /// * `config` - Token lifetimes and password hashing cost
    /// * `users` - User persistence
    /// * `tokens` - Refresh token persistence
    /// * `codec` - Shared token codec
    ///
    /// # Returns
    ///
    /// * `Err(AuthError::Hashing)` - If the password cost parameters are invalid
    pub fn new(
        config: &AuthConfig,
        users: Arc<dyn UserStore>,
        tokens: Arc<dyn TokenStore>,
        codec: Arc<TokenCodec>,
    ) -> Result<Self, AuthError> {
        let hasher = PasswordHasher::new(&config.password)?;
        let dummy_hash = hasher.hash("warden-timing-equalizer")?;
        let access_ttl = codec.access_ttl();
        let refresh_ttl = Duration::try_days(config.refresh_token_expire_days)
            .ok_or(CodecError::LifetimeOutOfRange)?;

        Ok(Self {
            users,
            tokens,
            codec,
            hasher,
            access_ttl,
            refresh_ttl,
            dummy_hash,
        })
    }

    /// Register a new user
    ///
    /// The username is trimmed and lowercased. Uniqueness is checked username
    /// first, then email; the store's unique keys settle any race.
    ///
    /// # Returns
    ///
    /// * `Ok(User)` - Newly created user
    /// * `Err(AuthError::DuplicateUsername | AuthError::DuplicateEmail)` - On collision
    pub async fn register(&self, registration: Registration) -> Result<User, AuthError> {
        let username = normalize_username(&registration.username);
        let email = registration.email.trim().to_string();

        if self.users.find_by_username(&username).await?.is_some() {
            return Err(AuthError::DuplicateUsername);
        }
        if self.users.find_by_email(&email).await?.is_some() {
            return Err(AuthError::DuplicateEmail);
        }

        let password_hash = self.hasher.hash_async(&registration.password).await?;

        let user = self
            .users
            .insert(NewUser {
                username,
                email,
                full_name: registration.full_name,
                password_hash,
                is_active: registration.is_active,
                is_superuser: registration.is_superuser,
                roles: None,
                permissions: None,
            })
            .await?;

        tracing::info!(user_id = %user.id, username = %user.username, "User registered");
        Ok(user)
    }

    /// Check a username/password pair
    ///
    /// Returns `None` for an unknown user, a wrong password and an inactive
    /// account alike. An unknown user still costs one hash verification.
    pub async fn authenticate(
        &self,
        username: &str,
        password: &str,
    ) -> Result<Option<User>, AuthError> {
        let username = normalize_username(username);

        let Some(user) = self.users.find_by_username(&username).await? else {
            self.hasher.verify_async(password, &self.dummy_hash).await;
            return Ok(None);
        };

        if !self.hasher.verify_async(password, &user.password_hash).await {
            return Ok(None);
        }

        if !user.is_active {
            tracing::debug!(user_id = %user.id, "Login attempt for inactive account");
            return Ok(None);
        }

        Ok(Some(user))
    }

    /// Open a session: access token plus a persisted refresh token
    ///
    /// The refresh row and the last-login stamp are written atomically.
    pub async fn issue_session(
        &self,
        user: &User,
        client: ClientMeta,
    ) -> Result<TokenPair, AuthError> {
        let access_token = self
            .codec
            .issue_access_token(&user.username, user.id, self.access_ttl)?;
        let refresh_token = self.codec.issue_refresh_token();
        let now = Utc::now();
        let expires_at = now
            .checked_add_signed(self.refresh_ttl)
            .ok_or(CodecError::LifetimeOutOfRange)?;

        self.tokens
            .insert_with_login(
                NewRefreshToken {
                    token_hash: fingerprint(&refresh_token),
                    user_id: user.id,
                    expires_at,
                    user_agent: client.user_agent,
                    ip_address: client.ip_address,
                },
                now,
            )
            .await?;

        Ok(self.token_pair(access_token, refresh_token))
    }

    /// Mint a new access token from a refresh token
    ///
    /// The refresh token itself is returned unchanged (no rotation), along
    /// with its owner. `None` when the token is unknown, revoked or expired,
    /// or its owner is missing or inactive.
    pub async fn refresh(
        &self,
        refresh_token: &str,
    ) -> Result<Option<(User, TokenPair)>, AuthError> {
        let Some(stored) = self
            .tokens
            .find_active_unexpired(&fingerprint(refresh_token))
            .await?
        else {
            return Ok(None);
        };

        let user = match self.users.find_by_id(stored.user_id).await? {
            Some(user) if user.is_active => user,
            _ => return Ok(None),
        };

        let access_token = self
            .codec
            .issue_access_token(&user.username, user.id, self.access_ttl)?;

        let pair = self.token_pair(access_token, refresh_token.to_string());
        Ok(Some((user, pair)))
    }

    /// Revoke one refresh token; `false` if it was not active
    pub async fn revoke(&self, refresh_token: &str) -> Result<bool, AuthError> {
        Ok(self.tokens.revoke(&fingerprint(refresh_token)).await?)
    }

    /// Revoke every active refresh token of a user
    pub async fn revoke_all(&self, user_id: Uuid) -> Result<u64, AuthError> {
        let count = self.tokens.revoke_all_for_user(user_id).await?;
        tracing::info!(user_id = %user_id, revoked = count, "Revoked all sessions");
        Ok(count)
    }

    /// Replace a password after checking the current one
    ///
    /// On success every refresh token of the user is revoked.
    ///
    /// # Returns
    ///
    /// * `Ok(Some(count))` - Password changed, `count` sessions revoked
    /// * `Ok(None)` - Unknown user or wrong current password
    pub async fn change_password(
        &self,
        user_id: Uuid,
        current_password: &str,
        new_password: &str,
    ) -> Result<Option<u64>, AuthError> {
        let Some(user) = self.users.find_by_id(user_id).await? else {
            return Ok(None);
        };

        if !self
            .hasher
            .verify_async(current_password, &user.password_hash)
            .await
        {
            return Ok(None);
        }

        let password_hash = self.hasher.hash_async(new_password).await?;
        let changes = UserChanges {
            password_hash: Some(password_hash),
            ..Default::default()
        };
        if self.users.update_fields(user_id, changes).await?.is_none() {
            return Ok(None);
        }

        let revoked = self.tokens.revoke_all_for_user(user_id).await?;
        tracing::info!(user_id = %user_id, revoked, "Password changed");
        Ok(Some(revoked))
    }

    /// Apply a partial update to a user
    ///
    /// A changed email must not belong to any other user.
    pub async fn update_profile(
        &self,
        user_id: Uuid,
        mut changes: UserChanges,
    ) -> Result<Option<User>, AuthError> {
        if let Some(email) = changes.email.take() {
            let email = email.trim().to_string();
            if self.users.exists_email_for_other(&email, user_id).await? {
                return Err(AuthError::DuplicateEmail);
            }
            changes.email = Some(email);
        }

        Ok(self.users.update_fields(user_id, changes).await?)
    }

    pub async fn get_user(&self, user_id: Uuid) -> Result<Option<User>, AuthError> {
        Ok(self.users.find_by_id(user_id).await?)
    }

    pub async fn get_user_by_username(&self, username: &str) -> Result<Option<User>, AuthError> {
        Ok(self
            .users
            .find_by_username(&normalize_username(username))
            .await?)
    }

    /// Newest first, with the total count
    pub async fn list_users(&self, skip: i64, limit: i64) -> Result<(Vec<User>, i64), AuthError> {
        Ok(self.users.list(skip, limit).await?)
    }

    /// All refresh sessions of a user, newest first
    pub async fn list_sessions(&self, user_id: Uuid) -> Result<Vec<RefreshToken>, AuthError> {
        Ok(self.tokens.list_for_user(user_id).await?)
    }

    /// Access token lifetime in seconds
    pub fn expires_in(&self) -> i64 {
        self.access_ttl.num_seconds()
    }

    fn token_pair(&self, access_token: String, refresh_token: String) -> TokenPair {
        TokenPair {
            access_token,
            refresh_token,
            token_type: "bearer".to_string(),
            expires_in: self.expires_in(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::memory::MemoryAuthStore;
    use warden_core::PasswordConfig;

    fn test_config() -> AuthConfig {
        AuthConfig {
            password: PasswordConfig {
                memory_kib: 1024,
                iterations: 1,
                parallelism: 1,
            },
            ..Default::default()
        }
    }

    fn service() -> (AuthService, Arc<MemoryAuthStore>) {
        let config = test_config();
        let store = Arc::new(MemoryAuthStore::new());
        let codec = Arc::new(TokenCodec::new(&config).unwrap());
        let svc = AuthService::new(&config, store.clone(), store.clone(), codec).unwrap();
        (svc, store)
    }

    async fn register_alice(svc: &AuthService) -> User {
        svc.register(Registration::new("Alice", "alice@x.com", "Secret12"))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_register_normalizes_username() {
        let (svc, _) = service();
        let user = register_alice(&svc).await;
        assert_eq!(user.username, "alice");
        assert!(user.is_active);
        assert!(!user.is_superuser);
        assert_ne!(user.password_hash, "Secret12");
    }

    #[tokio::test]
    async fn test_duplicate_username_wins_over_email() {
        let (svc, _) = service();
        register_alice(&svc).await;

        let err = svc
            .register(Registration::new("ALICE", "other@x.com", "Secret12"))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::DuplicateUsername));

        // Both collide: username is reported
        let err = svc
            .register(Registration::new("alice", "alice@x.com", "Secret12"))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::DuplicateUsername));

        let err = svc
            .register(Registration::new("bob", "alice@x.com", "Secret12"))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::DuplicateEmail));
    }

    #[tokio::test]
    async fn test_authenticate_is_uniform() {
        let (svc, _) = service();
        let alice = register_alice(&svc).await;

        assert!(svc.authenticate("ALICE", "Secret12").await.unwrap().is_some());
        assert!(svc.authenticate("alice", "Wrong123").await.unwrap().is_none());
        assert!(svc.authenticate("nobody", "Secret12").await.unwrap().is_none());

        svc.update_profile(
            alice.id,
            UserChanges {
                is_active: Some(false),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert!(svc.authenticate("alice", "Secret12").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_session_and_refresh_reuses_token() {
        let (svc, store) = service();
        let alice = register_alice(&svc).await;

        let pair = svc
            .issue_session(&alice, ClientMeta::default())
            .await
            .unwrap();
        assert_eq!(pair.token_type, "bearer");
        assert_eq!(pair.expires_in, 30 * 60);

        let reloaded = store.find_by_id(alice.id).await.unwrap().unwrap();
        assert!(reloaded.last_login_at.is_some());

        let (owner, refreshed) = svc.refresh(&pair.refresh_token).await.unwrap().unwrap();
        assert_eq!(owner.id, alice.id);
        assert_eq!(refreshed.refresh_token, pair.refresh_token);
        assert!(!refreshed.access_token.is_empty());
    }

    #[tokio::test]
    async fn test_revoked_token_never_refreshes() {
        let (svc, _) = service();
        let alice = register_alice(&svc).await;
        let pair = svc
            .issue_session(&alice, ClientMeta::default())
            .await
            .unwrap();

        assert!(svc.revoke(&pair.refresh_token).await.unwrap());
        assert!(!svc.revoke(&pair.refresh_token).await.unwrap());
        assert!(svc.refresh(&pair.refresh_token).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_expired_token_fails_like_revoked() {
        let (svc, store) = service();
        let alice = register_alice(&svc).await;
        let pair = svc
            .issue_session(&alice, ClientMeta::default())
            .await
            .unwrap();

        store
            .set_token_expiry(
                &fingerprint(&pair.refresh_token),
                Utc::now() - Duration::seconds(1),
            )
            .await;
        assert!(svc.refresh(&pair.refresh_token).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_refresh_rejected_for_inactive_owner() {
        let (svc, _) = service();
        let alice = register_alice(&svc).await;
        let pair = svc
            .issue_session(&alice, ClientMeta::default())
            .await
            .unwrap();

        svc.update_profile(
            alice.id,
            UserChanges {
                is_active: Some(false),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert!(svc.refresh(&pair.refresh_token).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_change_password_revokes_all_sessions() {
        let (svc, _) = service();
        let alice = register_alice(&svc).await;
        let first = svc
            .issue_session(&alice, ClientMeta::default())
            .await
            .unwrap();
        let second = svc
            .issue_session(&alice, ClientMeta::default())
            .await
            .unwrap();

        assert_eq!(
            svc.change_password(alice.id, "Wrong123", "Another34")
                .await
                .unwrap(),
            None
        );

        let revoked = svc
            .change_password(alice.id, "Secret12", "Another34")
            .await
            .unwrap();
        assert_eq!(revoked, Some(2));

        assert!(svc.refresh(&first.refresh_token).await.unwrap().is_none());
        assert!(svc.refresh(&second.refresh_token).await.unwrap().is_none());
        assert!(svc.authenticate("alice", "Another34").await.unwrap().is_some());
        assert!(svc.authenticate("alice", "Secret12").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_update_profile_email_uniqueness() {
        let (svc, _) = service();
        let alice = register_alice(&svc).await;
        svc.register(Registration::new("bob", "bob@x.com", "Secret12"))
            .await
            .unwrap();

        let err = svc
            .update_profile(
                alice.id,
                UserChanges {
                    email: Some("bob@x.com".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::DuplicateEmail));

        // Keeping one's own email is fine
        let updated = svc
            .update_profile(
                alice.id,
                UserChanges {
                    email: Some("alice@x.com".to_string()),
                    full_name: Some("Alice A.".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.full_name.as_deref(), Some("Alice A."));

        assert!(svc
            .update_profile(Uuid::new_v4(), UserChanges::default())
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_revoke_all_counts_active_sessions() {
        let (svc, _) = service();
        let alice = register_alice(&svc).await;
        for _ in 0..3 {
            svc.issue_session(&alice, ClientMeta::default())
                .await
                .unwrap();
        }

        assert_eq!(svc.revoke_all(alice.id).await.unwrap(), 3);
        assert_eq!(svc.revoke_all(alice.id).await.unwrap(), 0);
        assert_eq!(svc.list_sessions(alice.id).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_unrepresentable_refresh_expiry_is_an_error() {
        let config = AuthConfig {
            refresh_token_expire_days: 100_000_000,
            ..test_config()
        };
        let store = Arc::new(MemoryAuthStore::new());
        let codec = Arc::new(TokenCodec::new(&config).unwrap());
        let svc = AuthService::new(&config, store.clone(), store.clone(), codec).unwrap();
        let alice = register_alice(&svc).await;

        let err = svc
            .issue_session(&alice, ClientMeta::default())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AuthError::Codec(CodecError::LifetimeOutOfRange)
        ));
        assert!(svc.list_sessions(alice.id).await.unwrap().is_empty());
    }
}
