//! Persistence for Studyforge.
//!
//! # Tables
//!
//! - `admin_user` - Admin principals (permissions, lockout counters)
//! - `admin_session` - Server-side admin sessions, keyed by token digest
//! - `learner` - Learner principals
//! - `verification_ticket` - One e-mail verification ticket per learner
//! - `curriculum` - Generated curricula with task counters
//! - `learner_progress` - Per-task completion state
//! - `learner_note` - Learner notes on curricula
//! - `curriculum_feedback` - One rating per learner and curriculum
//! - `tower_sessions.cookie_session` - Cookie session store (managed by tower-sessions)
//!
//! # Stores
//!
//! Handlers and services never talk to `sqlx` directly. They hold
//! `Arc<dyn …Store>` trait objects, implemented here for `PostgreSQL`
//! ([`admin_users`], [`learners`], [`sessions`], [`curricula`]) and in
//! process ([`memory`]). Every per-principal mutation is a single atomic
//! statement on the store side.
//!
//! # Migrations
//!
//! Migrations are stored in `crates/server/migrations/` and run via:
//! ```bash
//! cargo run -p studyforge-cli -- migrate
//! ```

pub mod admin_users;
pub mod curricula;
pub mod learners;
pub mod memory;
pub mod sessions;

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use secrecy::ExposeSecret;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use thiserror::Error;
use uuid::Uuid;

use studyforge_core::{AdminUserId, CurriculumId, Email, LearnerId};

use crate::models::{
    AdminSession, AdminUser, Curriculum, CurriculumSummary, DeletedLearnerData, Feedback,
    FeedbackEntry, Learner, LearnerOverview, NewAdminSession, NewAdminUser, NewCurriculum,
    NewFeedback, NewLearner, NewNote, NewVerificationTicket, Note, PlatformStats, TaskProgress,
    VerificationTicket,
};
use crate::services::auth::lockout::{LockoutPolicy, LockoutState};

pub use admin_users::PgAdminUserStore;
pub use curricula::PgCurriculumStore;
pub use learners::PgLearnerStore;
pub use sessions::PgAdminSessionStore;

/// Errors that can occur during repository operations.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// Database error from sqlx.
    #[error("database error: {0}")]
    Database(sqlx::Error),

    /// The database could not be reached (pool exhausted, closed, or I/O failure).
    #[error("database unavailable: {0}")]
    Unavailable(String),

    /// Data in the database is corrupted or invalid.
    #[error("data corruption: {0}")]
    DataCorruption(String),

    /// Requested entity was not found.
    #[error("not found")]
    NotFound,

    /// Constraint violation (e.g., unique email).
    #[error("constraint violation: {0}")]
    Conflict(String),
}

impl From<sqlx::Error> for RepositoryError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                Self::Unavailable(e.to_string())
            }
            other => Self::Database(other),
        }
    }
}

impl RepositoryError {
    /// Whether the backing store itself is unreachable.
    #[must_use]
    pub const fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

/// Map a unique-constraint violation to `Conflict`, anything else through `From`.
pub(crate) fn conflict_or(e: sqlx::Error, what: &str) -> RepositoryError {
    if let sqlx::Error::Database(ref db_err) = e
        && db_err.is_unique_violation()
    {
        return RepositoryError::Conflict(format!("{what} already exists"));
    }
    RepositoryError::from(e)
}

pub type StoreResult<T> = Result<T, RepositoryError>;

// =============================================================================
// Store Traits
// =============================================================================
//
// Unless stated otherwise every method fails with `Unavailable` when the
// backing store cannot be reached and `Database` for any other driver error.

/// Admin principals.
pub trait AdminUserStore: Send + Sync {
    /// # Errors
    ///
    /// `DataCorruption` if the stored row does not validate.
    fn find_by_id(&self, id: AdminUserId) -> BoxFuture<'_, StoreResult<Option<AdminUser>>>;

    /// Active admins only; admins are never located by e-mail at login.
    ///
    /// # Errors
    ///
    /// `DataCorruption` if the stored row does not validate.
    fn find_active_by_username<'a>(
        &'a self,
        username: &'a str,
    ) -> BoxFuture<'a, StoreResult<Option<AdminUser>>>;

    /// # Errors
    ///
    /// Storage errors only.
    fn email_exists<'a>(&'a self, email: &'a Email) -> BoxFuture<'a, StoreResult<bool>>;

    /// # Errors
    ///
    /// `Conflict` when the username or e-mail is taken.
    fn create<'a>(&'a self, new: &'a NewAdminUser) -> BoxFuture<'a, StoreResult<AdminUser>>;

    /// Every admin, ordered by username.
    ///
    /// # Errors
    ///
    /// `DataCorruption` if a stored row does not validate.
    fn list(&self) -> BoxFuture<'_, StoreResult<Vec<AdminUser>>>;

    /// Atomically apply [`LockoutPolicy::record_failure`] and return the new state.
    ///
    /// While the account is locked this is a no-op that returns the current
    /// state.
    ///
    /// # Errors
    ///
    /// `NotFound` if the admin vanished.
    fn record_failure(
        &self,
        id: AdminUserId,
        now: DateTime<Utc>,
        policy: LockoutPolicy,
    ) -> BoxFuture<'_, StoreResult<LockoutState>>;

    /// Atomically apply [`LockoutPolicy::record_success`] and return the new state.
    ///
    /// The reset only lands if the account is unlocked at `now`; otherwise the
    /// locked state comes back unchanged and the login must be refused.
    ///
    /// # Errors
    ///
    /// `NotFound` if the admin vanished.
    fn record_success(
        &self,
        id: AdminUserId,
        now: DateTime<Utc>,
    ) -> BoxFuture<'_, StoreResult<LockoutState>>;

    /// Operator unlock.
    ///
    /// # Errors
    ///
    /// `NotFound` if the admin does not exist.
    fn unlock(&self, id: AdminUserId) -> BoxFuture<'_, StoreResult<()>>;

    /// Unlock by username (CLI).
    ///
    /// # Errors
    ///
    /// `NotFound` for unknown usernames.
    fn unlock_by_username<'a>(&'a self, username: &'a str) -> BoxFuture<'a, StoreResult<()>>;
}

/// Learner principals and their verification tickets.
pub trait LearnerStore: Send + Sync {
    /// # Errors
    ///
    /// `DataCorruption` if the stored row does not validate.
    fn find_by_id(&self, id: LearnerId) -> BoxFuture<'_, StoreResult<Option<Learner>>>;

    /// # Errors
    ///
    /// `DataCorruption` if the stored row does not validate.
    fn find_by_username<'a>(
        &'a self,
        username: &'a str,
    ) -> BoxFuture<'a, StoreResult<Option<Learner>>>;

    /// # Errors
    ///
    /// `DataCorruption` if the stored row does not validate.
    fn find_by_email<'a>(&'a self, email: &'a Email)
    -> BoxFuture<'a, StoreResult<Option<Learner>>>;

    /// Create a learner together with its ticket in one transaction.
    ///
    /// # Errors
    ///
    /// `Conflict` when the username, e-mail or ticket token is taken.
    fn create<'a>(
        &'a self,
        new: &'a NewLearner,
        ticket: &'a NewVerificationTicket,
    ) -> BoxFuture<'a, StoreResult<(Learner, VerificationTicket)>>;

    /// # Errors
    ///
    /// Storage errors only.
    fn ticket_for(&self, learner: LearnerId)
    -> BoxFuture<'_, StoreResult<Option<VerificationTicket>>>;

    /// # Errors
    ///
    /// Storage errors only.
    fn ticket_by_token(&self, token: Uuid)
    -> BoxFuture<'_, StoreResult<Option<VerificationTicket>>>;

    /// Insert or replace the learner's ticket.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown learner, `Conflict` if the token is taken.
    fn put_ticket<'a>(
        &'a self,
        learner: LearnerId,
        ticket: &'a NewVerificationTicket,
    ) -> BoxFuture<'a, StoreResult<VerificationTicket>>;

    /// Mark the ticket verified and activate the learner, atomically.
    ///
    /// # Errors
    ///
    /// `NotFound` if the learner has no ticket.
    fn mark_verified(&self, learner: LearnerId) -> BoxFuture<'_, StoreResult<()>>;

    /// Flip the active flag and return the new value.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown learner.
    fn toggle_active(&self, learner: LearnerId) -> BoxFuture<'_, StoreResult<bool>>;

    /// Every learner, newest first.
    ///
    /// # Errors
    ///
    /// `DataCorruption` if a stored row does not validate.
    fn list(&self) -> BoxFuture<'_, StoreResult<Vec<LearnerOverview>>>;

    /// Delete the learner and everything they own.
    ///
    /// # Errors
    ///
    /// `NotFound` if absent.
    fn delete(&self, learner: LearnerId) -> BoxFuture<'_, StoreResult<DeletedLearnerData>>;

    /// Mark matching learners verified and active; returns how many changed.
    ///
    /// # Errors
    ///
    /// Storage errors only.
    fn verify_all(&self) -> BoxFuture<'_, StoreResult<u64>>;
}

/// Server-side admin sessions, keyed by the SHA-256 digest of their token.
pub trait AdminSessionStore: Send + Sync {
    /// Insert unless a session with the same digest exists. `None` on collision.
    ///
    /// # Errors
    ///
    /// Storage errors only.
    fn insert_if_absent<'a>(
        &'a self,
        new: &'a NewAdminSession,
    ) -> BoxFuture<'a, StoreResult<Option<AdminSession>>>;

    /// # Errors
    ///
    /// `DataCorruption` if the stored row does not validate.
    fn find_by_token_hash<'a>(
        &'a self,
        token_hash: &'a str,
    ) -> BoxFuture<'a, StoreResult<Option<AdminSession>>>;

    /// `active = false` where currently active. Returns whether a row flipped.
    ///
    /// # Errors
    ///
    /// Storage errors only.
    fn deactivate<'a>(&'a self, token_hash: &'a str) -> BoxFuture<'a, StoreResult<bool>>;

    /// Delete sessions with `expires_at < now`; returns the count.
    ///
    /// # Errors
    ///
    /// Storage errors only.
    fn purge_expired(&self, now: DateTime<Utc>) -> BoxFuture<'_, StoreResult<u64>>;

    /// Round-trip to the store; used by the readiness check.
    ///
    /// # Errors
    ///
    /// `Unavailable` when the store cannot be reached.
    fn ping(&self) -> BoxFuture<'_, StoreResult<()>>;
}

/// Curricula with their progress, notes and feedback.
pub trait CurriculumStore: Send + Sync {
    /// # Errors
    ///
    /// `NotFound` if the owning learner does not exist.
    fn create<'a>(&'a self, new: &'a NewCurriculum) -> BoxFuture<'a, StoreResult<Curriculum>>;

    /// Only returns the curriculum if `owner` owns it.
    ///
    /// # Errors
    ///
    /// `DataCorruption` if the stored row does not validate.
    fn find_owned(
        &self,
        id: CurriculumId,
        owner: LearnerId,
    ) -> BoxFuture<'_, StoreResult<Option<Curriculum>>>;

    /// # Errors
    ///
    /// `DataCorruption` if a stored row does not validate.
    fn list_for(&self, owner: LearnerId) -> BoxFuture<'_, StoreResult<Vec<Curriculum>>>;

    /// Upsert one task's state and recount completed tasks, atomically.
    ///
    /// # Errors
    ///
    /// `NotFound` if the curriculum does not exist.
    fn record_completion(
        &self,
        curriculum: CurriculumId,
        week_number: i32,
        task_index: i32,
        completed: bool,
        now: DateTime<Utc>,
    ) -> BoxFuture<'_, StoreResult<Curriculum>>;

    /// # Errors
    ///
    /// Storage errors only.
    fn progress(&self, curriculum: CurriculumId) -> BoxFuture<'_, StoreResult<Vec<TaskProgress>>>;

    /// # Errors
    ///
    /// `NotFound` if the curriculum does not exist.
    fn add_note<'a>(&'a self, new: &'a NewNote) -> BoxFuture<'a, StoreResult<Note>>;

    /// The owner's notes on one week of a curriculum, newest first.
    ///
    /// # Errors
    ///
    /// Storage errors only.
    fn notes_for(
        &self,
        curriculum: CurriculumId,
        owner: LearnerId,
        week_number: i32,
    ) -> BoxFuture<'_, StoreResult<Vec<Note>>>;

    /// Insert or replace the learner's feedback on a curriculum. The flag is
    /// `true` when a new row was created.
    ///
    /// # Errors
    ///
    /// `NotFound` if the curriculum does not exist.
    fn upsert_feedback<'a>(
        &'a self,
        new: &'a NewFeedback,
        now: DateTime<Utc>,
    ) -> BoxFuture<'a, StoreResult<(Feedback, bool)>>;

    /// Every curriculum with its engagement counters, newest first.
    ///
    /// # Errors
    ///
    /// `DataCorruption` if a stored row does not validate.
    fn overview(&self) -> BoxFuture<'_, StoreResult<Vec<CurriculumSummary>>>;

    /// Every feedback entry, newest first.
    ///
    /// # Errors
    ///
    /// `DataCorruption` if a stored row does not validate.
    fn feedback_entries(&self) -> BoxFuture<'_, StoreResult<Vec<FeedbackEntry>>>;

    /// # Errors
    ///
    /// Storage errors only.
    fn stats(&self) -> BoxFuture<'_, StoreResult<PlatformStats>>;
}

/// The full set of stores the server runs against.
#[derive(Clone)]
pub struct Stores {
    pub admins: Arc<dyn AdminUserStore>,
    pub learners: Arc<dyn LearnerStore>,
    pub sessions: Arc<dyn AdminSessionStore>,
    pub curricula: Arc<dyn CurriculumStore>,
}

impl Stores {
    /// `PostgreSQL`-backed stores sharing one pool.
    #[must_use]
    pub fn postgres(pool: &PgPool) -> Self {
        Self {
            admins: Arc::new(PgAdminUserStore::new(pool.clone())),
            learners: Arc::new(PgLearnerStore::new(pool.clone())),
            sessions: Arc::new(PgAdminSessionStore::new(pool.clone())),
            curricula: Arc::new(PgCurriculumStore::new(pool.clone())),
        }
    }

    /// In-process stores sharing one state.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::from_memory(&memory::MemoryDb::default())
    }

    /// Stores over an existing in-process state, so callers can keep a handle to it.
    #[must_use]
    pub fn from_memory(db: &memory::MemoryDb) -> Self {
        Self {
            admins: Arc::new(db.clone()),
            learners: Arc::new(db.clone()),
            sessions: Arc::new(db.clone()),
            curricula: Arc::new(db.clone()),
        }
    }
}

/// Create a `PostgreSQL` connection pool with sensible defaults.
///
/// # Errors
///
/// Returns `sqlx::Error` if the connection cannot be established.
pub async fn create_pool(database_url: &secrecy::SecretString) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(5))
        .connect(database_url.expose_secret())
        .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_timeout_maps_to_unavailable() {
        let err = RepositoryError::from(sqlx::Error::PoolTimedOut);
        assert!(err.is_unavailable());
    }

    #[test]
    fn test_row_not_found_is_database_error() {
        let err = RepositoryError::from(sqlx::Error::RowNotFound);
        assert!(!err.is_unavailable());
        assert!(matches!(err, RepositoryError::Database(_)));
    }
}
