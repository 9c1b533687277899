//! Application state management
//!
//! Author: hephaex@gmail.com

use sqlx::PgPool;
use std::sync::Arc;
use std::time::Instant;
use warden_core::config::AppConfig;
use warden_core::records::{PgRecordStore, RecordService};

use crate::auth::{
    AuthError, AuthService, AuthenticatorSource, PgTokenStore, PgUserStore, RequestAuthenticator,
    TokenCodec, TokenStore, UserStore,
};

/// Application state shared across handlers
pub struct AppState {
    /// Application configuration
    pub config: AppConfig,
    /// Database pool; `None` when running on in-memory stores
    pub pool: Option<PgPool>,
    /// Registration, login and session management
    pub auth: Arc<AuthService>,
    /// Bearer token resolution for the gate extractors
    pub authenticator: Arc<RequestAuthenticator>,
    /// Data record business rules
    pub records: RecordService,
    /// Server start time
    pub start_time: Instant,
}

impl AppState {
    /// Wire every service against PostgreSQL
    pub fn from_pool(config: AppConfig, pool: PgPool) -> Result<Self, AuthError> {
        let users: Arc<dyn UserStore> = Arc::new(PgUserStore::new(pool.clone()));
        let tokens: Arc<dyn TokenStore> = Arc::new(PgTokenStore::new(pool.clone()));
        let records = RecordService::new(Arc::new(PgRecordStore::new(pool.clone())));

        Self::assemble(config, Some(pool), users, tokens, records)
    }

    /// Wire every service against in-memory stores
    #[cfg(any(test, feature = "test-utils"))]
    pub fn in_memory(config: AppConfig) -> Result<Self, AuthError> {
        let store = Arc::new(crate::auth::MemoryAuthStore::new());
        let records = RecordService::new(Arc::new(warden_core::MemoryRecordStore::new()));

        Self::assemble(config, None, store.clone(), store, records)
    }

    fn assemble(
        config: AppConfig,
        pool: Option<PgPool>,
        users: Arc<dyn UserStore>,
        tokens: Arc<dyn TokenStore>,
        records: RecordService,
    ) -> Result<Self, AuthError> {
        let codec = Arc::new(TokenCodec::new(&config.auth)?);
        let auth = Arc::new(AuthService::new(
            &config.auth,
            users.clone(),
            tokens,
            codec.clone(),
        )?);
        let authenticator = Arc::new(RequestAuthenticator::new(codec, users));

        Ok(Self {
            config,
            pool,
            auth,
            authenticator,
            records,
            start_time: Instant::now(),
        })
    }

    /// Get uptime in seconds
    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Whether the backing store answers
    pub async fn is_ready(&self) -> bool {
        match &self.pool {
            Some(pool) => match sqlx::query("SELECT 1").execute(pool).await {
                Ok(_) => true,
                Err(e) => {
                    tracing::warn!(error = %e, "Readiness check failed");
                    false
                }
            },
            None => true,
        }
    }
}

impl AuthenticatorSource for Arc<AppState> {
    fn authenticator(&self) -> Arc<RequestAuthenticator> {
        Arc::clone(&self.authenticator)
    }
}
