//! Security audit logging for authentication events
//!
//! Provides structured audit logging for authentication-related events:
//! logins, registrations, token refresh, logouts, password changes, admin
//! revocations and access control failures.
//!
//! All audit events are logged at INFO level with the "audit" target, so they
//! can be filtered and routed separately from application logs. Each event is
//! also counted in `warden_auth_events_total{event,outcome}`.
//!
//! # Example
//!
//! ```ignore
//! use warden_api::audit::{audit_log, AuditEvent};
//!
//! audit_log(&AuditEvent::LoginSuccess {
//!     user_id: user.id,
//!     username: user.username.clone(),
//!     ip_address: Some("192.168.1.1".to_string()),
//!     user_agent: None,
//! });
//! ```
//!
//! Author: hephaex@gmail.com

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::middleware::metrics::record_auth_event;

/// Security audit events for authentication and authorization
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum AuditEvent {
    /// Successful user login
    LoginSuccess {
        user_id: Uuid,
        username: String,
        ip_address: Option<String>,
        user_agent: Option<String>,
    },

    /// Failed login attempt; the reason is never shown to the client
    LoginFailure {
        username: String,
        reason: String,
        ip_address: Option<String>,
        user_agent: Option<String>,
    },

    /// Successful user registration
    RegistrationSuccess {
        user_id: Uuid,
        username: String,
        email: String,
        ip_address: Option<String>,
        user_agent: Option<String>,
    },

    /// Rejected registration
    RegistrationFailure {
        username: String,
        email: String,
        reason: String,
        ip_address: Option<String>,
        user_agent: Option<String>,
    },

    /// Access token minted from a refresh token
    TokenRefresh {
        user_id: Uuid,
        username: String,
        ip_address: Option<String>,
        user_agent: Option<String>,
    },

    /// Refresh token unknown, revoked, expired, or owner unusable
    RefreshRejected {
        ip_address: Option<String>,
        user_agent: Option<String>,
    },

    /// Single session logout
    Logout {
        user_id: Uuid,
        username: String,
        revoked: bool,
        ip_address: Option<String>,
    },

    /// All sessions of the caller revoked
    LogoutAll {
        user_id: Uuid,
        username: String,
        revoked_count: u64,
        ip_address: Option<String>,
    },

    /// Password changed; all sessions revoked
    PasswordChange {
        user_id: Uuid,
        username: String,
        revoked_count: u64,
        ip_address: Option<String>,
        user_agent: Option<String>,
    },

    /// Password change refused (wrong current password)
    PasswordChangeFailure {
        user_id: Uuid,
        username: String,
        ip_address: Option<String>,
    },

    /// A superuser revoked another user's sessions
    TokensRevokedByAdmin {
        admin_id: Uuid,
        target_user_id: Uuid,
        revoked_count: u64,
        ip_address: Option<String>,
    },

    /// Authenticated caller failed an authorization gate
    AccessDenied {
        user_id: Option<Uuid>,
        username: Option<String>,
        resource: String,
        requirement: Option<String>,
        ip_address: Option<String>,
        user_agent: Option<String>,
    },

    /// Invalid or expired access token presented
    InvalidToken {
        ip_address: Option<String>,
        user_agent: Option<String>,
        reason: String,
    },
}

impl AuditEvent {
    /// Metric labels `(event, outcome)` for this event
    pub fn labels(&self) -> (&'static str, &'static str) {
        match self {
            AuditEvent::LoginSuccess { .. } => ("login", "success"),
            AuditEvent::LoginFailure { .. } => ("login", "failure"),
            AuditEvent::RegistrationSuccess { .. } => ("register", "success"),
            AuditEvent::RegistrationFailure { .. } => ("register", "failure"),
            AuditEvent::TokenRefresh { .. } => ("refresh", "success"),
            AuditEvent::RefreshRejected { .. } => ("refresh", "failure"),
            AuditEvent::Logout { .. } => ("logout", "success"),
            AuditEvent::LogoutAll { .. } => ("logout_all", "success"),
            AuditEvent::PasswordChange { .. } => ("password_change", "success"),
            AuditEvent::PasswordChangeFailure { .. } => ("password_change", "failure"),
            AuditEvent::TokensRevokedByAdmin { .. } => ("admin_revoke", "success"),
            AuditEvent::AccessDenied { .. } => ("access", "denied"),
            AuditEvent::InvalidToken { .. } => ("token", "invalid"),
        }
    }

    fn message(&self) -> &'static str {
        match self {
            AuditEvent::LoginSuccess { .. } => "Login successful",
            AuditEvent::LoginFailure { .. } => "Login failed",
            AuditEvent::RegistrationSuccess { .. } => "Registration successful",
            AuditEvent::RegistrationFailure { .. } => "Registration failed",
            AuditEvent::TokenRefresh { .. } => "Token refresh",
            AuditEvent::RefreshRejected { .. } => "Token refresh rejected",
            AuditEvent::Logout { .. } => "User logout",
            AuditEvent::LogoutAll { .. } => "User logout from all sessions",
            AuditEvent::PasswordChange { .. } => "Password changed",
            AuditEvent::PasswordChangeFailure { .. } => "Password change rejected",
            AuditEvent::TokensRevokedByAdmin { .. } => "Sessions revoked by administrator",
            AuditEvent::AccessDenied { .. } => "Access denied",
            AuditEvent::InvalidToken { .. } => "Invalid token",
        }
    }

    fn user_id(&self) -> Option<Uuid> {
        match self {
            AuditEvent::LoginSuccess { user_id, .. }
            | AuditEvent::RegistrationSuccess { user_id, .. }
            | AuditEvent::TokenRefresh { user_id, .. }
            | AuditEvent::Logout { user_id, .. }
            | AuditEvent::LogoutAll { user_id, .. }
            | AuditEvent::PasswordChange { user_id, .. }
            | AuditEvent::PasswordChangeFailure { user_id, .. } => Some(*user_id),
            AuditEvent::TokensRevokedByAdmin { target_user_id, .. } => Some(*target_user_id),
            AuditEvent::AccessDenied { user_id, .. } => *user_id,
            _ => None,
        }
    }

    fn ip_address(&self) -> Option<&str> {
        match self {
            AuditEvent::LoginSuccess { ip_address, .. }
            | AuditEvent::LoginFailure { ip_address, .. }
            | AuditEvent::RegistrationSuccess { ip_address, .. }
            | AuditEvent::RegistrationFailure { ip_address, .. }
            | AuditEvent::TokenRefresh { ip_address, .. }
            | AuditEvent::RefreshRejected { ip_address, .. }
            | AuditEvent::Logout { ip_address, .. }
            | AuditEvent::LogoutAll { ip_address, .. }
            | AuditEvent::PasswordChange { ip_address, .. }
            | AuditEvent::PasswordChangeFailure { ip_address, .. }
            | AuditEvent::TokensRevokedByAdmin { ip_address, .. }
            | AuditEvent::AccessDenied { ip_address, .. }
            | AuditEvent::InvalidToken { ip_address, .. } => ip_address.as_deref(),
        }
    }
}

/// Log a security audit event with structured fields
///
/// The full event is serialized to JSON in the `event` field for log
/// aggregators; `user_id` and `ip_address` are also lifted out as fields.
pub fn audit_log(event: &AuditEvent) {
    let timestamp = Utc::now();
    let (kind, outcome) = event.labels();

    let event_json = serde_json::to_string(event)
        .unwrap_or_else(|e| format!("{{\"error\":\"Failed to serialize audit event: {e}\"}}"));

    info!(
        target: "audit",
        timestamp = %timestamp,
        event = %event_json,
        kind = kind,
        outcome = outcome,
        user_id = ?event.user_id(),
        ip_address = ?event.ip_address(),
        "{}",
        event.message()
    );

    record_auth_event(kind, outcome);
}

/// Extract IP address from request headers
///
/// Checks X-Forwarded-For (first hop), then X-Real-IP.
pub fn extract_ip_address(headers: &axum::http::HeaderMap) -> Option<String> {
    // Check X-Forwarded-For (proxy/load balancer)
    if let Some(xff) = headers.get("x-forwarded-for") {
        if let Ok(xff_str) = xff.to_str() {
            if let Some(first_ip) = xff_str.split(',').next() {
                let first_ip = first_ip.trim();
                if !first_ip.is_empty() {
                    return Some(first_ip.to_string());
                }
            }
        }
    }

    // Check X-Real-IP (nginx proxy)
    if let Some(real_ip) = headers.get("x-real-ip") {
        if let Ok(ip_str) = real_ip.to_str() {
            return Some(ip_str.trim().to_string());
        }
    }

    None
}

/// Extract user agent from request headers
pub fn extract_user_agent(headers: &axum::http::HeaderMap) -> Option<String> {
    headers
        .get(axum::http::header::USER_AGENT)
        .and_then(|ua| ua.to_str().ok())
        .map(|s| s.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_audit_event_serialization() {
        let event = AuditEvent::LoginSuccess {
            user_id: Uuid::new_v4(),
            username: "alice".to_string(),
            ip_address: Some("192.168.1.1".to_string()),
            user_agent: Some("Mozilla/5.0".to_string()),
        };

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"event_type\":\"login_success\""));
        assert!(json.contains("alice"));
        assert_eq!(event.labels(), ("login", "success"));
    }

    #[test]
    fn test_audit_log_does_not_panic() {
        audit_log(&AuditEvent::LoginFailure {
            username: "alice".to_string(),
            reason: "invalid credentials".to_string(),
            ip_address: None,
            user_agent: Some("Test Agent".to_string()),
        });
        audit_log(&AuditEvent::AccessDenied {
            user_id: Some(Uuid::new_v4()),
            username: Some("bob".to_string()),
            resource: "DELETE /api/data/1".to_string(),
            requirement: Some("any role of [admin, maintainer]".to_string()),
            ip_address: Some("10.0.0.1".to_string()),
            user_agent: None,
        });
    }

    #[test]
    fn test_admin_revocation_targets_user() {
        let target = Uuid::new_v4();
        let event = AuditEvent::TokensRevokedByAdmin {
            admin_id: Uuid::new_v4(),
            target_user_id: target,
            revoked_count: 2,
            ip_address: None,
        };
        assert_eq!(event.user_id(), Some(target));
    }

    #[test]
    fn test_extract_ip_from_x_forwarded_for() {
        let mut headers = axum::http::HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            "203.0.113.1, 198.51.100.1".parse().unwrap(),
        );

        let ip = extract_ip_address(&headers);
        assert_eq!(ip, Some("203.0.113.1".to_string()));
    }

    #[test]
    fn test_extract_ip_from_x_real_ip() {
        let mut headers = axum::http::HeaderMap::new();
        headers.insert("x-real-ip", "203.0.113.1".parse().unwrap());

        let ip = extract_ip_address(&headers);
        assert_eq!(ip, Some("203.0.113.1".to_string()));
    }

    #[test]
    fn test_extract_user_agent() {
        let mut headers = axum::http::HeaderMap::new();
        headers.insert(
            axum::http::header::USER_AGENT,
            "Mozilla/5.0 (Test)".parse().unwrap(),
        );

        let ua = extract_user_agent(&headers);
        assert_eq!(ua, Some("Mozilla/5.0 (Test)".to_string()));
    }

    #[test]
    fn test_extract_missing_headers() {
        let headers = axum::http::HeaderMap::new();

        assert_eq!(extract_ip_address(&headers), None);
        assert_eq!(extract_user_agent(&headers), None);
    }
}
