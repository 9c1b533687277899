//! Authentication and authorization module
//!
//! This module provides JWT-based authentication with the following components:
//! - Password hashing with Argon2id
//! - Access token signing/verification and opaque refresh tokens
//! - User and refresh token repositories (PostgreSQL, in-memory for tests)
//! - Authentication service for registration, login, refresh and logout
//! - Request gates and axum extractors for active/superuser/role/permission checks

pub mod gate;
pub mod jwt;
#[cfg(any(test, feature = "test-utils"))]
pub mod memory;
pub mod models;
pub mod password;
pub mod repository;
pub mod service;

pub use gate::{
    authorize, bearer_token, enforce, require_active, require_superuser, ActiveUser,
    AuthenticatorSource, ClientInfo, CurrentUser, MaybeUser, RequestAuthenticator, Requirement,
    RequirementKind, RequirementSubject, Superuser,
};
pub use jwt::{fingerprint, AccessClaims, CodecError, TokenCodec};
#[cfg(any(test, feature = "test-utils"))]
pub use memory::MemoryAuthStore;
pub use models::{
    NewRefreshToken, NewUser, RefreshToken, SessionView, TokenPair, User, UserChanges,
    UserProfile, UserResponse,
};
pub use password::{validate_password_strength, PasswordError, PasswordHasher};
pub use repository::{DuplicateField, PgTokenStore, PgUserStore, StoreError, TokenStore, UserStore};
pub use service::{normalize_username, AuthError, AuthService, ClientMeta, Registration};
