//! In-memory user and token store for tests
//!
//! One lock guards both tables so `insert_with_login` is atomic and unique
//! keys are checked the same way the database constraints would.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::models::{encode_name_list, NewRefreshToken, NewUser, RefreshToken, User, UserChanges};
use super::repository::{DuplicateField, StoreError, TokenStore, UserStore};

#[derive(Default)]
struct Tables {
    users: HashMap<Uuid, User>,
    tokens: HashMap<Uuid, RefreshToken>,
}

impl Tables {
    fn store_token(&mut self, token: NewRefreshToken) -> Result<RefreshToken, StoreError> {
        if self
            .tokens
            .values()
            .any(|t| t.token_hash == token.token_hash)
        {
            return Err(StoreError::DuplicateKey(DuplicateField::Token));
        }

        let stored = RefreshToken {
            id: Uuid::new_v4(),
            token_hash: token.token_hash,
            user_id: token.user_id,
            is_active: true,
            expires_at: token.expires_at,
            user_agent: token.user_agent,
            ip_address: token.ip_address,
            created_at: Utc::now(),
            revoked_at: None,
        };
        self.tokens.insert(stored.id, stored.clone());
        Ok(stored)
    }
}

/// In-memory [`UserStore`] + [`TokenStore`]
#[derive(Default)]
pub struct MemoryAuthStore {
    tables: RwLock<Tables>,
}

impl MemoryAuthStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Force a token's expiry, for exercising expiry paths
    pub async fn set_token_expiry(&self, fingerprint: &str, expires_at: DateTime<Utc>) -> bool {
        let mut tables = self.tables.write().await;
        match tables
            .tokens
            .values_mut()
            .find(|t| t.token_hash == fingerprint)
        {
            Some(token) => {
                token.expires_at = expires_at;
                true
            }
            None => false,
        }
    }
}

#[async_trait]
impl UserStore for MemoryAuthStore {
    async fn find_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .users
            .values()
            .find(|u| u.username == username)
            .cloned())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables.users.values().find(|u| u.email == email).cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        Ok(self.tables.read().await.users.get(&id).cloned())
    }

    async fn insert(&self, user: NewUser) -> Result<User, StoreError> {
        let mut tables = self.tables.write().await;
        if tables.users.values().any(|u| u.username == user.username) {
            return Err(StoreError::DuplicateKey(DuplicateField::Username));
        }
        if tables.users.values().any(|u| u.email == user.email) {
            return Err(StoreError::DuplicateKey(DuplicateField::Email));
        }

        let now = Utc::now();
        let stored = User {
            id: Uuid::new_v4(),
            username: user.username,
            email: user.email,
            full_name: user.full_name,
            password_hash: user.password_hash,
            is_active: user.is_active,
            is_superuser: user.is_superuser,
            roles: user.roles.as_deref().map(encode_name_list),
            permissions: user.permissions.as_deref().map(encode_name_list),
            created_at: now,
            updated_at: now,
            last_login_at: None,
        };
        tables.users.insert(stored.id, stored.clone());
        Ok(stored)
    }

    async fn update_fields(
        &self,
        id: Uuid,
        changes: UserChanges,
    ) -> Result<Option<User>, StoreError> {
        let mut tables = self.tables.write().await;
        if let Some(email) = &changes.email {
            if tables
                .users
                .values()
                .any(|u| u.id != id && &u.email == email)
            {
                return Err(StoreError::DuplicateKey(DuplicateField::Email));
            }
        }

        let Some(user) = tables.users.get_mut(&id) else {
            return Ok(None);
        };
        if let Some(email) = changes.email {
            user.email = email;
        }
        if let Some(full_name) = changes.full_name {
            user.full_name = Some(full_name);
        }
        if let Some(is_active) = changes.is_active {
            user.is_active = is_active;
        }
        if let Some(is_superuser) = changes.is_superuser {
            user.is_superuser = is_superuser;
        }
        if let Some(roles) = changes.roles {
            user.roles = Some(encode_name_list(&roles));
        }
        if let Some(permissions) = changes.permissions {
            user.permissions = Some(encode_name_list(&permissions));
        }
        if let Some(password_hash) = changes.password_hash {
            user.password_hash = password_hash;
        }
        user.updated_at = Utc::now();
        Ok(Some(user.clone()))
    }

    async fn list(&self, skip: i64, limit: i64) -> Result<(Vec<User>, i64), StoreError> {
        let tables = self.tables.read().await;
        let mut users: Vec<User> = tables.users.values().cloned().collect();
        users.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        let total = users.len() as i64;

        let page = users
            .into_iter()
            .skip(skip.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect();
        Ok((page, total))
    }

    async fn exists_email_for_other(
        &self,
        email: &str,
        exclude_id: Uuid,
    ) -> Result<bool, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .users
            .values()
            .any(|u| u.id != exclude_id && u.email == email))
    }
}

#[async_trait]
impl TokenStore for MemoryAuthStore {
    async fn insert(&self, token: NewRefreshToken) -> Result<RefreshToken, StoreError> {
        self.tables.write().await.store_token(token)
    }

    async fn insert_with_login(
        &self,
        token: NewRefreshToken,
        login_at: DateTime<Utc>,
    ) -> Result<RefreshToken, StoreError> {
        let mut tables = self.tables.write().await;
        let user_id = token.user_id;
        let stored = tables.store_token(token)?;
        if let Some(user) = tables.users.get_mut(&user_id) {
            user.last_login_at = Some(login_at);
        }
        Ok(stored)
    }

    async fn find_active_unexpired(
        &self,
        fingerprint: &str,
    ) -> Result<Option<RefreshToken>, StoreError> {
        let now = Utc::now();
        let tables = self.tables.read().await;
        Ok(tables
            .tokens
            .values()
            .find(|t| t.token_hash == fingerprint && t.is_usable(now))
            .cloned())
    }

    async fn revoke(&self, fingerprint: &str) -> Result<bool, StoreError> {
        let mut tables = self.tables.write().await;
        match tables
            .tokens
            .values_mut()
            .find(|t| t.token_hash == fingerprint && t.is_active)
        {
            Some(token) => {
                token.is_active = false;
                token.revoked_at = Some(Utc::now());
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn revoke_all_for_user(&self, user_id: Uuid) -> Result<u64, StoreError> {
        let now = Utc::now();
        let mut tables = self.tables.write().await;
        let mut count = 0;
        for token in tables
            .tokens
            .values_mut()
            .filter(|t| t.user_id == user_id && t.is_active)
        {
            token.is_active = false;
            token.revoked_at = Some(now);
            count += 1;
        }
        Ok(count)
    }

    async fn touch_last_login(&self, user_id: Uuid, at: DateTime<Utc>) -> Result<(), StoreError> {
        if let Some(user) = self.tables.write().await.users.get_mut(&user_id) {
            user.last_login_at = Some(at);
        }
        Ok(())
    }

    async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<RefreshToken>, StoreError> {
        let tables = self.tables.read().await;
        let mut tokens: Vec<RefreshToken> = tables
            .tokens
            .values()
            .filter(|t| t.user_id == user_id)
            .cloned()
            .collect();
        tokens.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(tokens)
    }
}
