//! Authentication error types.

use thiserror::Error;

use crate::db::RepositoryError;
use crate::services::sessions::SessionError;

/// Infrastructure and input errors from authentication operations.
///
/// Login *results* (wrong password, locked, unverified) are not errors; they
/// are [`super::LoginOutcome`] variants.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Invalid email format.
    #[error("invalid email: {0}")]
    InvalidEmail(#[from] studyforge_core::EmailError),

    /// Invalid username format.
    #[error("invalid username: {0}")]
    InvalidUsername(#[from] studyforge_core::UsernameError),

    #[error("username already taken")]
    UsernameTaken,

    #[error("email address is already registered")]
    EmailTaken,

    /// Lost a registration race on a unique key.
    #[error("user already exists")]
    UserAlreadyExists,

    #[error("passwords do not match")]
    PasswordMismatch,

    /// Password too weak or invalid.
    #[error("password validation failed: {0}")]
    WeakPassword(String),

    /// Password hashing error.
    #[error("password hashing error")]
    PasswordHash,

    /// Verification mail could not be delivered.
    #[error("email delivery failed: {0}")]
    Delivery(#[from] crate::services::email::EmailError),

    /// Session could not be issued.
    #[error("session error: {0}")]
    Session(#[from] SessionError),

    /// Repository/database error.
    #[error("database error: {0}")]
    Repository(#[from] RepositoryError),
}
