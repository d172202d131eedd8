//! Admin session records, session tokens, and cookie-session keys.
//!
//! The registry only ever persists [`SessionToken::digest`]. The raw token
//! lives in the caller's cookie session under [`keys::ADMIN_SESSION_TOKEN`].

use std::net::{IpAddr, Ipv4Addr};

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Utc};
use rand::RngCore as _;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use studyforge_core::{AdminSessionId, AdminUserId, LearnerId, Username};

/// Raw token entropy in bytes.
pub const TOKEN_BYTES: usize = 32;

/// Longest user-agent string kept on a session.
pub const MAX_USER_AGENT_CHARS: usize = 500;

/// A server-side admin session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdminSession {
    pub id: AdminSessionId,
    pub admin_user_id: AdminUserId,
    /// SHA-256 hex digest of the raw token.
    pub token_hash: String,
    pub created_at: DateTime<Utc>,
    /// Absolute expiry; never extended.
    pub expires_at: DateTime<Utc>,
    pub ip_address: IpAddr,
    pub user_agent: String,
    pub is_active: bool,
}

impl AdminSession {
    /// Usable iff active and not yet expired.
    #[must_use]
    pub fn is_usable(&self, now: DateTime<Utc>) -> bool {
        self.is_active && now < self.expires_at
    }
}

#[derive(Debug, Clone)]
pub struct NewAdminSession {
    pub admin_user_id: AdminUserId,
    pub token_hash: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub ip_address: IpAddr,
    pub user_agent: String,
}

/// An opaque admin session token.
#[derive(Clone)]
pub struct SessionToken(SecretString);

impl SessionToken {
    /// 32 random bytes, URL-safe base64 without padding.
    #[must_use]
    pub fn generate() -> Self {
        let mut bytes = [0u8; TOKEN_BYTES];
        rand::rng().fill_bytes(&mut bytes);
        Self(SecretString::from(URL_SAFE_NO_PAD.encode(bytes)))
    }

    /// Wrap a token read back from the cookie session.
    #[must_use]
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(SecretString::from(raw.into()))
    }

    /// The form stored in the database.
    #[must_use]
    pub fn digest(&self) -> String {
        hex::encode(Sha256::digest(self.0.expose_secret().as_bytes()))
    }

    /// The raw token, for writing into the cookie session only.
    #[must_use]
    pub fn expose(&self) -> &str {
        self.0.expose_secret()
    }
}

impl std::fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SessionToken([REDACTED])")
    }
}

/// Who is on the other end of a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientContext {
    pub ip: IpAddr,
    pub user_agent: String,
}

impl ClientContext {
    #[must_use]
    pub fn new(ip: IpAddr, user_agent: &str) -> Self {
        Self {
            ip,
            user_agent: user_agent.chars().take(MAX_USER_AGENT_CHARS).collect(),
        }
    }
}

impl Default for ClientContext {
    fn default() -> Self {
        Self::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), "")
    }
}

/// Session-stored learner identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrentLearner {
    pub id: LearnerId,
    pub username: Username,
}

/// Cookie-session keys.
pub mod keys {
    /// Raw admin session token. Only its digest is persisted server-side.
    pub const ADMIN_SESSION_TOKEN: &str = "admin_session_token";

    pub const ADMIN_USER_ID: &str = "admin_user_id";

    /// The logged-in learner ([`super::CurrentLearner`]).
    pub const CURRENT_LEARNER: &str = "current_learner";
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::HashSet;

    use chrono::{Duration, TimeZone};

    use super::*;

    #[test]
    fn test_token_shape() {
        let token = SessionToken::generate();
        // 32 bytes -> 43 base64 chars without padding
        assert_eq!(token.expose().len(), 43);
        assert!(
            token
                .expose()
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        );
    }

    #[test]
    fn test_tokens_are_unique() {
        let set: HashSet<String> = (0..256)
            .map(|_| SessionToken::generate().expose().to_owned())
            .collect();
        assert_eq!(set.len(), 256);
    }

    #[test]
    fn test_digest_is_stable_sha256_hex() {
        let token = SessionToken::from_raw("abc");
        assert_eq!(
            token.digest(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_debug_redacts() {
        let token = SessionToken::from_raw("super-secret");
        assert!(!format!("{token:?}").contains("super-secret"));
    }

    #[test]
    fn test_user_agent_truncated() {
        let long = "x".repeat(800);
        let ctx = ClientContext::new(IpAddr::V4(Ipv4Addr::LOCALHOST), &long);
        assert_eq!(ctx.user_agent.chars().count(), MAX_USER_AGENT_CHARS);
    }

    #[test]
    fn test_usable_window() {
        let created = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let session = AdminSession {
            id: AdminSessionId::new(1),
            admin_user_id: AdminUserId::new(1),
            token_hash: String::new(),
            created_at: created,
            expires_at: created + Duration::hours(8),
            ip_address: IpAddr::V4(Ipv4Addr::LOCALHOST),
            user_agent: String::new(),
            is_active: true,
        };
        assert!(session.is_usable(created + Duration::hours(7)));
        assert!(!session.is_usable(created + Duration::hours(8)));
        assert!(
            !AdminSession {
                is_active: false,
                ..session
            }
            .is_usable(created)
        );
    }
}
