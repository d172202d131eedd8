//! `PostgreSQL` store for server-side admin sessions.
//!
//! Rows are keyed by the token digest. Uniqueness is enforced by the
//! `admin_session_token_hash_key` constraint; inserts never overwrite.

use std::net::IpAddr;

use chrono::{DateTime, Utc};
use futures::FutureExt as _;
use futures::future::BoxFuture;
use sqlx::PgPool;

use studyforge_core::{AdminSessionId, AdminUserId};

use super::{AdminSessionStore, RepositoryError, StoreResult};
use crate::models::{AdminSession, NewAdminSession};

const SESSION_COLUMNS: &str =
    "id, admin_user_id, token_hash, created_at, expires_at, ip_address, user_agent, is_active";

#[derive(Debug, sqlx::FromRow)]
struct AdminSessionRow {
    id: i32,
    admin_user_id: i32,
    token_hash: String,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    ip_address: String,
    user_agent: String,
    is_active: bool,
}

impl TryFrom<AdminSessionRow> for AdminSession {
    type Error = RepositoryError;

    fn try_from(row: AdminSessionRow) -> Result<Self, Self::Error> {
        let ip_address: IpAddr = row.ip_address.parse().map_err(|e| {
            RepositoryError::DataCorruption(format!("invalid session ip address: {e}"))
        })?;

        Ok(Self {
            id: AdminSessionId::new(row.id),
            admin_user_id: AdminUserId::new(row.admin_user_id),
            token_hash: row.token_hash,
            created_at: row.created_at,
            expires_at: row.expires_at,
            ip_address,
            user_agent: row.user_agent,
            is_active: row.is_active,
        })
    }
}

/// Admin sessions in `PostgreSQL`.
#[derive(Clone)]
pub struct PgAdminSessionStore {
    pool: PgPool,
}

impl PgAdminSessionStore {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl AdminSessionStore for PgAdminSessionStore {
    fn insert_if_absent<'a>(
        &'a self,
        new: &'a NewAdminSession,
    ) -> BoxFuture<'a, StoreResult<Option<AdminSession>>> {
        async move {
            let row = sqlx::query_as::<_, AdminSessionRow>(&format!(
                "INSERT INTO admin_session \
                     (admin_user_id, token_hash, created_at, expires_at, ip_address, user_agent) \
                 VALUES ($1, $2, $3, $4, $5, $6) \
                 ON CONFLICT (token_hash) DO NOTHING \
                 RETURNING {SESSION_COLUMNS}"
            ))
            .bind(new.admin_user_id.as_i32())
            .bind(&new.token_hash)
            .bind(new.created_at)
            .bind(new.expires_at)
            .bind(new.ip_address.to_string())
            .bind(&new.user_agent)
            .fetch_optional(&self.pool)
            .await?;

            row.map(TryInto::try_into).transpose()
        }
        .boxed()
    }

    fn find_by_token_hash<'a>(
        &'a self,
        token_hash: &'a str,
    ) -> BoxFuture<'a, StoreResult<Option<AdminSession>>> {
        async move {
            let row = sqlx::query_as::<_, AdminSessionRow>(&format!(
                "SELECT {SESSION_COLUMNS} FROM admin_session WHERE token_hash = $1"
            ))
            .bind(token_hash)
            .fetch_optional(&self.pool)
            .await?;

            row.map(TryInto::try_into).transpose()
        }
        .boxed()
    }

    fn deactivate<'a>(&'a self, token_hash: &'a str) -> BoxFuture<'a, StoreResult<bool>> {
        async move {
            let result = sqlx::query(
                "UPDATE admin_session SET is_active = FALSE WHERE token_hash = $1 AND is_active",
            )
            .bind(token_hash)
            .execute(&self.pool)
            .await?;
            Ok(result.rows_affected() > 0)
        }
        .boxed()
    }

    fn purge_expired(&self, now: DateTime<Utc>) -> BoxFuture<'_, StoreResult<u64>> {
        async move {
            let result = sqlx::query("DELETE FROM admin_session WHERE expires_at < $1")
                .bind(now)
                .execute(&self.pool)
                .await?;
            Ok(result.rows_affected())
        }
        .boxed()
    }

    fn ping(&self) -> BoxFuture<'_, StoreResult<()>> {
        async move {
            sqlx::query("SELECT 1").execute(&self.pool).await?;
            Ok(())
        }
        .boxed()
    }
}
