//! Token generation and validation
//!
//! Access tokens are HMAC-signed JWTs carrying the username (`sub`), the user
//! id, issuer and timestamps. Refresh tokens are opaque random strings; only
//! their SHA-256 fingerprint is ever stored.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rand::Rng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use uuid::Uuid;
use warden_core::AuthConfig;

/// Claims embedded in every access token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessClaims {
    /// Subject - username
    pub sub: String,
    /// User id
    pub user_id: Uuid,
    /// Token issuer
    pub iss: String,
    /// Issued at timestamp (Unix epoch)
    pub iat: i64,
    /// Expiration timestamp (Unix epoch)
    pub exp: i64,
}

/// Token codec errors
///
/// Every verification failure is the single [`CodecError::InvalidToken`].
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("Invalid or expired token")]
    InvalidToken,

    #[error("Failed to encode token: {0}")]
    EncodingError(#[from] jsonwebtoken::errors::Error),

    #[error("Unsupported token algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("Token signing secret must not be empty")]
    EmptySecret,

    #[error("Token lifetime out of range")]
    LifetimeOutOfRange,
}

/// Encodes and verifies access tokens, mints refresh tokens
///
/// Built once from [`AuthConfig`]; keys are derived up front.
pub struct TokenCodec {
    algorithm: Algorithm,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    issuer: String,
    access_ttl: Duration,
}

impl std::fmt::Debug for TokenCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCodec")
            .field("algorithm", &self.algorithm)
            .field("issuer", &self.issuer)
            .field("access_ttl", &self.access_ttl)
            .finish_non_exhaustive()
    }
}

impl TokenCodec {
    /// Create a codec from auth settings
    ///
    /// # Arguments
    ///
    /// * `config` - Secret, algorithm name, issuer and access token lifetime
    ///
    /// # Returns
    ///
    /// * `Ok(TokenCodec)` - Ready to sign and verify
    /// * `Err(CodecError::UnsupportedAlgorithm)` - If the algorithm is not HS256/384/512
    /// * `Err(CodecError::EmptySecret)` - If no secret is configured
    /// * `Err(CodecError::LifetimeOutOfRange)` - If the access lifetime does not fit a duration
    pub fn new(config: &AuthConfig) -> Result<Self, CodecError> {
        let algorithm = match config.algorithm.as_str() {
            "HS256" => Algorithm::HS256,
            "HS384" => Algorithm::HS384,
            "HS512" => Algorithm::HS512,
            other => return Err(CodecError::UnsupportedAlgorithm(other.to_string())),
        };

        if config.secret_key.is_empty() {
            return Err(CodecError::EmptySecret);
        }

        Ok(Self {
            algorithm,
            encoding_key: EncodingKey::from_secret(config.secret_key.as_bytes()),
            decoding_key: DecodingKey::from_secret(config.secret_key.as_bytes()),
            issuer: config.issuer.clone(),
            access_ttl: Duration::try_minutes(config.access_token_expire_minutes)
                .ok_or(CodecError::LifetimeOutOfRange)?,
        })
    }

    /// Configured access token lifetime
    pub fn access_ttl(&self) -> Duration {
        self.access_ttl
    }

    /// Sign an access token for a user
    ///
    /// # Arguments
    ///
    /// * `subject` - Username placed in `sub`
    /// * `user_id` - User id placed in `user_id`
    /// * `ttl` - Lifetime; `exp` is `now + ttl`
    pub fn issue_access_token(
        &self,
        subject: &str,
        user_id: Uuid,
        ttl: Duration,
    ) -> Result<String, CodecError> {
        let now = Utc::now();
        let expires_at = now
            .checked_add_signed(ttl)
            .ok_or(CodecError::LifetimeOutOfRange)?;

        let claims = AccessClaims {
            sub: subject.to_string(),
            user_id,
            iss: self.issuer.clone(),
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
        };

        Ok(encode(
            &Header::new(self.algorithm),
            &claims,
            &self.encoding_key,
        )?)
    }

    /// Verify signature, issuer and expiry and return the claims
    ///
    /// Fails closed: the reason for a rejection is only logged at debug level.
    pub fn verify_access_token(&self, token: &str) -> Result<AccessClaims, CodecError> {
        let mut validation = Validation::new(self.algorithm);
        validation.set_issuer(&[&self.issuer]);
        validation.set_required_spec_claims(&["exp", "iat", "iss", "sub"]);
        validation.leeway = 0;

        decode::<AccessClaims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|e| {
                tracing::debug!(reason = ?e.kind(), "Access token rejected");
                CodecError::InvalidToken
            })
    }

    /// Mint a new opaque refresh token
    ///
    /// 32 bytes from the thread-local CSPRNG, URL-safe base64 without padding.
    pub fn issue_refresh_token(&self) -> String {
        let bytes: [u8; 32] = rand::thread_rng().gen();
        URL_SAFE_NO_PAD.encode(bytes)
    }
}

/// Hex SHA-256 of a refresh token, the key it is stored under
pub fn fingerprint(refresh_token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(refresh_token.as_bytes());
    format!("{:x}", hasher.finalize())
}
