//! Warden Core - Configuration, shared error types and data records
//!
//! This crate defines the pieces shared by the API server and the CLI:
//! - Configuration management
//! - PostgreSQL pool and migrations
//! - Common error types
//! - Data record domain model and storage (PostgreSQL, in-memory)
//!
//! Author: hephaex@gmail.com

pub mod config;
pub mod db;
pub mod records;

pub use config::{
    AppConfig, AuthConfig, ConfigError, DatabaseConfig, LoggingConfig, PasswordConfig,
    ServerConfig,
};
pub use records::{
    DataRecord, DataRecordChanges, NewDataRecord, PgRecordStore, RecordFilter, RecordRepository,
    RecordService, RecordStatus,
};

#[cfg(any(test, feature = "test-utils"))]
pub use records::MemoryRecordStore;

use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Core error types for Warden operations
#[derive(Error, Debug)]
pub enum WardenError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Already exists: {0}")]
    Duplicate(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<ConfigError> for WardenError {
    fn from(err: ConfigError) -> Self {
        WardenError::ConfigError(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, WardenError>;

/// PostgreSQL SQLSTATE for unique constraint violations
pub const UNIQUE_VIOLATION: &str = "23505";

/// Name of the unique constraint a database error violated, if any
pub fn violated_constraint(err: &sqlx::Error) -> Option<String> {
    match err {
        sqlx::Error::Database(db) if db.code().as_deref() == Some(UNIQUE_VIOLATION) => {
            db.constraint().map(str::to_string)
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = WardenError::Duplicate("record 'alpha'".to_string());
        assert_eq!(err.to_string(), "Already exists: record 'alpha'");
    }

    #[test]
    fn test_config_error_conversion() {
        let err: WardenError = ConfigError::MissingRequired("SECRET_KEY".to_string()).into();
        assert!(matches!(err, WardenError::ConfigError(msg) if msg.contains("SECRET_KEY")));
    }

    #[test]
    fn test_violated_constraint_ignores_other_errors() {
        assert_eq!(violated_constraint(&sqlx::Error::RowNotFound), None);
    }
}
