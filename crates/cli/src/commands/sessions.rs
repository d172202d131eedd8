//! Admin session maintenance.

use chrono::Utc;
use studyforge_server::db::{AdminSessionStore, PgAdminSessionStore};

use super::{CommandError, connect};

/// Delete admin sessions past their absolute expiry.
///
/// The server sweeps on its own schedule; this is for maintenance windows.
///
/// # Errors
///
/// Connection and store failures.
pub async fn purge() -> Result<u64, CommandError> {
    let pool = connect().await?;
    let store = PgAdminSessionStore::new(pool);

    let purged = store.purge_expired(Utc::now()).await?;
    tracing::info!(purged, "Expired admin sessions deleted");
    Ok(purged)
}
