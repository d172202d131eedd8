//! Cookie session configuration.
//!
//! The cookie session only carries identifiers: the raw admin session token
//! (validated against the registry on every request) or the learner identity.
//! Production stores cookie sessions in `PostgreSQL`; tests use any
//! `SessionStore`.

use sqlx::PgPool;
use tower_sessions::{Expiry, SessionManagerLayer, SessionStore};
use tower_sessions_sqlx_store::PostgresStore;

use crate::config::AuthSettings;

/// Session cookie name.
pub const SESSION_COOKIE_NAME: &str = "studyforge_session";

/// Cookie session inactivity expiry in seconds (8 hours, matching admin sessions).
const SESSION_EXPIRY_SECONDS: i64 = 8 * 60 * 60;

/// Table holding cookie sessions.
pub const SESSION_TABLE: &str = "cookie_session";

/// `PostgreSQL` store for cookie sessions.
///
/// # Errors
///
/// Returns the store's message if the table name is rejected.
pub fn postgres_session_store(pool: &PgPool) -> Result<PostgresStore, String> {
    PostgresStore::new(pool.clone()).with_table_name(SESSION_TABLE)
}

/// Create the session layer over `store`.
#[must_use]
pub fn create_session_layer<S: SessionStore + Clone>(
    store: S,
    settings: &AuthSettings,
) -> SessionManagerLayer<S> {
    SessionManagerLayer::new(store)
        .with_name(SESSION_COOKIE_NAME)
        .with_expiry(Expiry::OnInactivity(
            tower_sessions::cookie::time::Duration::seconds(SESSION_EXPIRY_SECONDS),
        ))
        .with_secure(settings.is_secure())
        .with_same_site(tower_sessions::cookie::SameSite::Lax)
        .with_http_only(true)
        .with_path("/")
}
