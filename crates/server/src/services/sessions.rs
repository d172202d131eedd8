//! Server-side admin session registry.
//!
//! Sessions have an absolute lifetime of [`SESSION_LIFETIME_HOURS`] from
//! creation and are never extended. A session stops being usable the moment
//! it is revoked or expires, and never becomes usable again. Expired rows are
//! deactivated lazily by the first validation that observes them, and
//! deleted by opportunistic purges on `create` plus a periodic sweeper.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::instrument;

use crate::db::{AdminSessionStore, AdminUserStore, RepositoryError};
use crate::models::{AdminSession, AdminUser, ClientContext, NewAdminSession, SessionToken};

/// Absolute session lifetime.
pub const SESSION_LIFETIME_HOURS: i64 = 8;

/// Token generations tried before giving up on a unique token.
pub const MAX_TOKEN_ATTEMPTS: usize = 3;

#[derive(Debug, Error)]
pub enum SessionError {
    /// Every generated token collided with an existing one.
    #[error("could not generate a unique session token after {0} attempts")]
    TokenGeneration(usize),

    /// The session store cannot be reached.
    #[error("session store unavailable: {0}")]
    Unavailable(String),

    #[error("session storage error: {0}")]
    Repository(RepositoryError),
}

impl From<RepositoryError> for SessionError {
    fn from(e: RepositoryError) -> Self {
        match e {
            RepositoryError::Unavailable(msg) => Self::Unavailable(msg),
            other => Self::Repository(other),
        }
    }
}

/// A freshly created session together with its raw token.
///
/// The raw token is returned exactly once, here.
#[derive(Debug, Clone)]
pub struct IssuedSession {
    pub token: SessionToken,
    pub session: AdminSession,
}

/// Why a token did not validate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidReason {
    /// No session for this token.
    Unknown,
    /// Revoked, or already observed as expired.
    Inactive,
    /// Past `expires_at`; deactivated by this validation.
    Expired,
    /// The owning admin no longer exists or is inactive.
    AdminUnavailable,
    /// A storage fault; validation fails closed.
    StorageFault,
}

#[derive(Debug, Clone)]
pub enum SessionValidation {
    Valid {
        admin: AdminUser,
        session: AdminSession,
    },
    Invalid(InvalidReason),
}

/// Creates, validates, revokes and purges admin sessions.
#[derive(Clone)]
pub struct SessionRegistry {
    sessions: Arc<dyn AdminSessionStore>,
    admins: Arc<dyn AdminUserStore>,
    lifetime: Duration,
    generate: fn() -> SessionToken,
}

impl SessionRegistry {
    #[must_use]
    pub fn new(sessions: Arc<dyn AdminSessionStore>, admins: Arc<dyn AdminUserStore>) -> Self {
        Self {
            sessions,
            admins,
            lifetime: Duration::hours(SESSION_LIFETIME_HOURS),
            generate: SessionToken::generate,
        }
    }

    /// Replace the token source.
    #[must_use]
    pub fn with_token_generator(mut self, generate: fn() -> SessionToken) -> Self {
        self.generate = generate;
        self
    }

    #[must_use]
    pub const fn lifetime(&self) -> Duration {
        self.lifetime
    }

    /// Create a session for `admin`.
    ///
    /// # Errors
    ///
    /// `TokenGeneration` after [`MAX_TOKEN_ATTEMPTS`] collisions, or a storage
    /// error from the insert.
    #[instrument(skip(self, admin, client), fields(admin_id = %admin.id))]
    pub async fn create(
        &self,
        admin: &AdminUser,
        client: &ClientContext,
        now: DateTime<Utc>,
    ) -> Result<IssuedSession, SessionError> {
        if let Err(e) = self.sessions.purge_expired(now).await {
            tracing::warn!(error = %e, "Opportunistic session purge failed");
        }

        let user_agent = ClientContext::new(client.ip, &client.user_agent).user_agent;

        for attempt in 1..=MAX_TOKEN_ATTEMPTS {
            let token = (self.generate)();
            let new = NewAdminSession {
                admin_user_id: admin.id,
                token_hash: token.digest(),
                created_at: now,
                expires_at: now + self.lifetime,
                ip_address: client.ip,
                user_agent: user_agent.clone(),
            };

            if let Some(session) = self.sessions.insert_if_absent(&new).await? {
                tracing::info!(session_id = %session.id, "Admin session created");
                return Ok(IssuedSession { token, session });
            }
            tracing::warn!(attempt, "Session token collision, regenerating");
        }

        tracing::error!("Session token generation exhausted its retries");
        Err(SessionError::TokenGeneration(MAX_TOKEN_ATTEMPTS))
    }

    /// Resolve `token` to a live session and its admin.
    ///
    /// Storage faults yield `Invalid(StorageFault)`, except an unreachable
    /// store which is an error so callers can answer 503.
    ///
    /// # Errors
    ///
    /// `SessionError::Unavailable` if the store cannot be reached.
    #[instrument(skip_all)]
    pub async fn validate(
        &self,
        token: &SessionToken,
        now: DateTime<Utc>,
    ) -> Result<SessionValidation, SessionError> {
        let digest = token.digest();

        let session = match self.sessions.find_by_token_hash(&digest).await {
            Ok(Some(session)) => session,
            Ok(None) => return Ok(SessionValidation::Invalid(InvalidReason::Unknown)),
            Err(e) => return fail_closed(e),
        };

        if !session.is_active {
            return Ok(SessionValidation::Invalid(InvalidReason::Inactive));
        }

        if now >= session.expires_at {
            // The row may already be gone to a concurrent purge.
            if let Err(e) = self.sessions.deactivate(&digest).await {
                tracing::warn!(session_id = %session.id, error = %e, "Failed to deactivate expired session");
            }
            tracing::info!(session_id = %session.id, "Admin session expired");
            return Ok(SessionValidation::Invalid(InvalidReason::Expired));
        }

        match self.admins.find_by_id(session.admin_user_id).await {
            Ok(Some(admin)) if admin.is_active => Ok(SessionValidation::Valid { admin, session }),
            Ok(_) => Ok(SessionValidation::Invalid(InvalidReason::AdminUnavailable)),
            Err(e) => fail_closed(e),
        }
    }

    /// Deactivate the session for `token`. Idempotent; unknown tokens are a no-op.
    ///
    /// # Errors
    ///
    /// Storage errors from the update.
    #[instrument(skip_all)]
    pub async fn revoke(&self, token: &SessionToken) -> Result<(), SessionError> {
        if self.sessions.deactivate(&token.digest()).await? {
            tracing::info!("Admin session revoked");
        }
        Ok(())
    }

    /// Delete every session with `expires_at < now`.
    ///
    /// # Errors
    ///
    /// Storage errors from the delete.
    pub async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, SessionError> {
        Ok(self.sessions.purge_expired(now).await?)
    }

    /// Store reachability, for readiness checks.
    ///
    /// # Errors
    ///
    /// `Unavailable` if the store cannot be reached.
    pub async fn ping(&self) -> Result<(), SessionError> {
        Ok(self.sessions.ping().await?)
    }

    /// Purge expired sessions every `interval` until the handle is dropped.
    #[must_use]
    pub fn spawn_sweeper(&self, interval: std::time::Duration) -> SweeperHandle {
        let registry = self.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // First tick completes immediately.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                match registry.purge_expired(Utc::now()).await {
                    Ok(0) => {}
                    Ok(n) => tracing::info!(purged = n, "Expired admin sessions purged"),
                    Err(e) => tracing::warn!(error = %e, "Session sweep failed"),
                }
            }
        });
        SweeperHandle(handle)
    }
}

fn fail_closed(e: RepositoryError) -> Result<SessionValidation, SessionError> {
    if let RepositoryError::Unavailable(msg) = e {
        tracing::error!(error = %msg, "Session store unreachable");
        return Err(SessionError::Unavailable(msg));
    }
    tracing::error!(error = %e, "Session validation storage fault, failing closed");
    Ok(SessionValidation::Invalid(InvalidReason::StorageFault))
}

/// Stops the sweeper task when dropped.
#[derive(Debug)]
pub struct SweeperHandle(JoinHandle<()>);

impl SweeperHandle {
    pub fn abort(&self) {
        self.0.abort();
    }
}

impl Drop for SweeperHandle {
    fn drop(&mut self) {
        self.0.abort();
    }
}
