//! Repository layer for users and refresh tokens
//!
//! [`UserStore`] and [`TokenStore`] are passive persistence contracts: absence
//! is `None`/`false`/`0`, `Err` is reserved for genuine faults and for unique
//! constraint violations ([`StoreError::DuplicateKey`]).
//!
//! Author: hephaex@gmail.com

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPool;
use thiserror::Error;
use uuid::Uuid;

use super::models::{encode_name_list, NewRefreshToken, NewUser, RefreshToken, User, UserChanges};

/// Which unique key a write collided with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DuplicateField {
    Username,
    Email,
    Token,
}

/// Repository errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Duplicate {0:?}")]
    DuplicateKey(DuplicateField),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl StoreError {
    /// Classify a write error by the unique constraint it violated
    fn from_write(err: sqlx::Error) -> Self {
        match warden_core::violated_constraint(&err).as_deref() {
            Some("users_username_key") => StoreError::DuplicateKey(DuplicateField::Username),
            Some("users_email_key") => StoreError::DuplicateKey(DuplicateField::Email),
            Some("refresh_tokens_token_hash_key") => {
                StoreError::DuplicateKey(DuplicateField::Token)
            }
            _ => StoreError::Database(err),
        }
    }
}

/// User persistence
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_by_username(&self, username: &str) -> Result<Option<User>, StoreError>;

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError>;

    /// Fails with `DuplicateKey(Username | Email)` on collision
    async fn insert(&self, user: NewUser) -> Result<User, StoreError>;

    /// Partial update bumping `updated_at`; `None` if the id is absent
    async fn update_fields(&self, id: Uuid, changes: UserChanges)
        -> Result<Option<User>, StoreError>;

    /// Newest first, with the total row count
    async fn list(&self, skip: i64, limit: i64) -> Result<(Vec<User>, i64), StoreError>;

    /// Whether a user other than `exclude_id` holds `email`
    async fn exists_email_for_other(&self, email: &str, exclude_id: Uuid)
        -> Result<bool, StoreError>;
}

/// Refresh token persistence
#[async_trait]
pub trait TokenStore: Send + Sync {
    async fn insert(&self, token: NewRefreshToken) -> Result<RefreshToken, StoreError>;

    /// Insert the session and stamp the owner's last login in one atomic unit
    async fn insert_with_login(
        &self,
        token: NewRefreshToken,
        login_at: DateTime<Utc>,
    ) -> Result<RefreshToken, StoreError>;

    /// Only rows that are active and not yet expired
    async fn find_active_unexpired(
        &self,
        fingerprint: &str,
    ) -> Result<Option<RefreshToken>, StoreError>;

    /// Returns whether an active row was flipped
    async fn revoke(&self, fingerprint: &str) -> Result<bool, StoreError>;

    /// Number of active rows flipped
    async fn revoke_all_for_user(&self, user_id: Uuid) -> Result<u64, StoreError>;

    async fn touch_last_login(&self, user_id: Uuid, at: DateTime<Utc>) -> Result<(), StoreError>;

    /// Newest first
    async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<RefreshToken>, StoreError>;
}

const USER_COLUMNS: &str = "id, username, email, full_name, password_hash, is_active, \
     is_superuser, roles, permissions, created_at, updated_at, last_login_at";

const TOKEN_COLUMNS: &str =
    "id, token_hash, user_id, is_active, expires_at, user_agent, ip_address, created_at, revoked_at";

/// PostgreSQL user store
#[derive(Clone)]
pub struct PgUserStore {
    pool: PgPool,
}

impl PgUserStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn find_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE username = $1"
        ))
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = $1"
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    async fn insert(&self, user: NewUser) -> Result<User, StoreError> {
        sqlx::query_as::<_, User>(&format!(
            r#"
            INSERT INTO users (
                id, username, email, full_name, password_hash,
                is_active, is_superuser, roles, permissions
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.full_name)
        .bind(&user.password_hash)
        .bind(user.is_active)
        .bind(user.is_superuser)
        .bind(user.roles.as_deref().map(encode_name_list))
        .bind(user.permissions.as_deref().map(encode_name_list))
        .fetch_one(&self.pool)
        .await
        .map_err(StoreError::from_write)
    }

    async fn update_fields(
        &self,
        id: Uuid,
        changes: UserChanges,
    ) -> Result<Option<User>, StoreError> {
        sqlx::query_as::<_, User>(&format!(
            r#"
            UPDATE users SET
                email = COALESCE($2, email),
                full_name = COALESCE($3, full_name),
                is_active = COALESCE($4, is_active),
                is_superuser = COALESCE($5, is_superuser),
                roles = COALESCE($6, roles),
                permissions = COALESCE($7, permissions),
                password_hash = COALESCE($8, password_hash),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(&changes.email)
        .bind(&changes.full_name)
        .bind(changes.is_active)
        .bind(changes.is_superuser)
        .bind(changes.roles.as_deref().map(encode_name_list))
        .bind(changes.permissions.as_deref().map(encode_name_list))
        .bind(&changes.password_hash)
        .fetch_optional(&self.pool)
        .await
        .map_err(StoreError::from_write)
    }

    async fn list(&self, skip: i64, limit: i64) -> Result<(Vec<User>, i64), StoreError> {
        let users = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users ORDER BY created_at DESC LIMIT $1 OFFSET $2"
        ))
        .bind(limit)
        .bind(skip)
        .fetch_all(&self.pool)
        .await?;

        let (total,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users")
            .fetch_one(&self.pool)
            .await?;

        Ok((users, total))
    }

    async fn exists_email_for_other(
        &self,
        email: &str,
        exclude_id: Uuid,
    ) -> Result<bool, StoreError> {
        let (exists,): (bool,) =
            sqlx::query_as("SELECT EXISTS(SELECT 1 FROM users WHERE email = $1 AND id <> $2)")
                .bind(email)
                .bind(exclude_id)
                .fetch_one(&self.pool)
                .await?;

        Ok(exists)
    }
}

/// PostgreSQL refresh token store
#[derive(Clone)]
pub struct PgTokenStore {
    pool: PgPool,
}

impl PgTokenStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn insert_token_sql() -> String {
    format!(
        r#"
        INSERT INTO refresh_tokens (id, token_hash, user_id, expires_at, user_agent, ip_address)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING {TOKEN_COLUMNS}
        "#
    )
}

#[async_trait]
impl TokenStore for PgTokenStore {
    async fn insert(&self, token: NewRefreshToken) -> Result<RefreshToken, StoreError> {
        sqlx::query_as::<_, RefreshToken>(&insert_token_sql())
            .bind(Uuid::new_v4())
            .bind(&token.token_hash)
            .bind(token.user_id)
            .bind(token.expires_at)
            .bind(&token.user_agent)
            .bind(&token.ip_address)
            .fetch_one(&self.pool)
            .await
            .map_err(StoreError::from_write)
    }

    async fn insert_with_login(
        &self,
        token: NewRefreshToken,
        login_at: DateTime<Utc>,
    ) -> Result<RefreshToken, StoreError> {
        let mut tx = self.pool.begin().await?;

        let stored = sqlx::query_as::<_, RefreshToken>(&insert_token_sql())
            .bind(Uuid::new_v4())
            .bind(&token.token_hash)
            .bind(token.user_id)
            .bind(token.expires_at)
            .bind(&token.user_agent)
            .bind(&token.ip_address)
            .fetch_one(&mut *tx)
            .await
            .map_err(StoreError::from_write)?;

        sqlx::query("UPDATE users SET last_login_at = $2 WHERE id = $1")
            .bind(token.user_id)
            .bind(login_at)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(stored)
    }

    async fn find_active_unexpired(
        &self,
        fingerprint: &str,
    ) -> Result<Option<RefreshToken>, StoreError> {
        let token = sqlx::query_as::<_, RefreshToken>(&format!(
            r#"
            SELECT {TOKEN_COLUMNS}
            FROM refresh_tokens
            WHERE token_hash = $1 AND is_active = TRUE AND expires_at > NOW()
            "#
        ))
        .bind(fingerprint)
        .fetch_optional(&self.pool)
        .await?;

        Ok(token)
    }

    async fn revoke(&self, fingerprint: &str) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE refresh_tokens
            SET is_active = FALSE, revoked_at = NOW()
            WHERE token_hash = $1 AND is_active = TRUE
            "#,
        )
        .bind(fingerprint)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn revoke_all_for_user(&self, user_id: Uuid) -> Result<u64, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE refresh_tokens
            SET is_active = FALSE, revoked_at = NOW()
            WHERE user_id = $1 AND is_active = TRUE
            "#,
        )
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn touch_last_login(&self, user_id: Uuid, at: DateTime<Utc>) -> Result<(), StoreError> {
        sqlx::query("UPDATE users SET last_login_at = $2 WHERE id = $1")
            .bind(user_id)
            .bind(at)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<RefreshToken>, StoreError> {
        let tokens = sqlx::query_as::<_, RefreshToken>(&format!(
            "SELECT {TOKEN_COLUMNS} FROM refresh_tokens WHERE user_id = $1 ORDER BY created_at DESC"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(tokens)
    }
}
