//! Admin user management commands.
//!
//! # Usage
//!
//! ```bash
//! # Create an admin with the default permission set (password from stdin)
//! sf-cli admin create -u jane -e jane@example.com -n "Jane Doe"
//!
//! # Create a super admin, password taken from an environment variable
//! SF_ADMIN_PASSWORD='...' sf-cli admin create -u root -e root@example.com \
//!     --super-admin --password-env SF_ADMIN_PASSWORD
//!
//! # Clear a lockout
//! sf-cli admin unlock -u jane
//! ```
//!
//! # Environment Variables
//!
//! - `DATABASE_URL` - `PostgreSQL` connection string

use std::io::BufRead;

use secrecy::{ExposeSecret, SecretString};
use studyforge_core::{AdminPermissions, Email, Username};
use studyforge_server::db::{AdminUserStore, PgAdminUserStore, RepositoryError};
use studyforge_server::models::NewAdminUser;
use studyforge_server::services::auth::password::{
    Argon2Hasher, CredentialHasher, validate_password,
};
use thiserror::Error;

use super::{CommandError, connect};

/// Errors that can occur during admin operations.
#[derive(Debug, Error)]
pub enum AdminError {
    #[error(transparent)]
    Command(#[from] CommandError),

    #[error("Invalid username: {0}")]
    InvalidUsername(String),

    #[error("Invalid email: {0}")]
    InvalidEmail(String),

    #[error("Weak password: {0}")]
    WeakPassword(String),

    #[error("Password variable {0} is not set")]
    MissingPasswordVar(String),

    #[error("Password hashing failed")]
    Hash,

    #[error("Could not read password: {0}")]
    Io(#[from] std::io::Error),

    #[error("Admin user already exists: {0}")]
    UserExists(String),

    #[error("No admin named {0}")]
    NotFound(String),
}

impl From<RepositoryError> for AdminError {
    fn from(e: RepositoryError) -> Self {
        Self::Command(CommandError::Store(e))
    }
}

/// Read the new admin's password from `env_var`, or from the first line of stdin.
///
/// # Errors
///
/// `MissingPasswordVar` when the named variable is unset; I/O errors from stdin.
pub fn read_password(env_var: Option<&str>) -> Result<SecretString, AdminError> {
    if let Some(name) = env_var {
        return std::env::var(name)
            .map(SecretString::from)
            .map_err(|_| AdminError::MissingPasswordVar(name.to_owned()));
    }

    #[allow(clippy::print_stderr)]
    {
        eprint!("Password: ");
    }
    let mut line = String::new();
    std::io::stdin().lock().read_line(&mut line)?;
    Ok(SecretString::from(line.trim_end_matches(['\r', '\n']).to_owned()))
}

/// Create a new admin user.
///
/// # Arguments
///
/// * `username` - Login name
/// * `email` - Admin's email address
/// * `full_name` - Display name
/// * `super_admin` - Grant every permission instead of the default set
/// * `password` - Plaintext password; must pass the strength rules
///
/// # Returns
///
/// The ID of the created admin user.
pub async fn create_user(
    username: &str,
    email: &str,
    full_name: &str,
    super_admin: bool,
    password: &SecretString,
) -> Result<i32, AdminError> {
    let username =
        Username::parse(username).map_err(|e| AdminError::InvalidUsername(e.to_string()))?;
    let email = Email::parse(email).map_err(|e| AdminError::InvalidEmail(e.to_string()))?;
    validate_password(password.expose_secret())
        .map_err(|e| AdminError::WeakPassword(e.to_string()))?;

    let hasher = Argon2Hasher::with_defaults().map_err(|_| AdminError::Hash)?;
    let password_hash = hasher
        .hash(password.expose_secret())
        .map_err(|_| AdminError::Hash)?;

    let permissions = if super_admin {
        AdminPermissions::super_admin()
    } else {
        AdminPermissions::default()
    };

    let pool = connect().await?;
    let store = PgAdminUserStore::new(pool);

    tracing::info!("Creating admin user: {} ({})", username, email);

    let admin = store
        .create(&NewAdminUser {
            username: username.clone(),
            email,
            full_name: full_name.to_owned(),
            password_hash,
            permissions,
        })
        .await
        .map_err(|e| match e {
            RepositoryError::Conflict(_) => AdminError::UserExists(username.to_string()),
            other => other.into(),
        })?;

    tracing::info!(
        "Admin user created successfully! ID: {}, Username: {}, Permissions: {:?}",
        admin.id,
        admin.username,
        admin.permissions.effective()
    );

    Ok(admin.id.as_i32())
}

/// Clear an admin's lockout and failure counter.
///
/// # Errors
///
/// `NotFound` for unknown usernames; connection and store failures.
pub async fn unlock(username: &str) -> Result<(), AdminError> {
    let pool = connect().await?;
    let store = PgAdminUserStore::new(pool);

    store
        .unlock_by_username(username)
        .await
        .map_err(|e| match e {
            RepositoryError::NotFound => AdminError::NotFound(username.to_owned()),
            other => other.into(),
        })?;

    tracing::info!(username, "Admin unlocked");
    Ok(())
}
