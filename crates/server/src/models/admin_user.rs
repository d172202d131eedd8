//! Admin principal domain types.

use chrono::{DateTime, Utc};
use secrecy::SecretString;

use studyforge_core::{AdminPermissions, AdminUserId, Email, Username};

use crate::services::auth::lockout::LockoutState;

/// An admin user (domain type).
#[derive(Debug, Clone)]
pub struct AdminUser {
    pub id: AdminUserId,
    /// Login name. Admins are only ever located by username.
    pub username: Username,
    pub email: Email,
    pub full_name: String,
    /// Argon2id PHC string.
    pub password_hash: SecretString,
    pub is_active: bool,
    /// Stored permission flags. Use [`AdminPermissions::allows`] to evaluate.
    pub permissions: AdminPermissions,
    pub lockout: LockoutState,
    pub created_at: DateTime<Utc>,
}

/// Data needed to create an admin user.
#[derive(Debug, Clone)]
pub struct NewAdminUser {
    pub username: Username,
    pub email: Email,
    pub full_name: String,
    pub password_hash: SecretString,
    pub permissions: AdminPermissions,
}
