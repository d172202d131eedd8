//! `PostgreSQL` store for admin principals.
//!
//! Lockout transitions are single conditional `UPDATE ... RETURNING`
//! statements: concurrent failed logins are all counted, and a successful
//! login cannot clear a lock it did not observe.

use chrono::{DateTime, Utc};
use futures::FutureExt as _;
use futures::future::BoxFuture;
use secrecy::{ExposeSecret, SecretString};
use sqlx::PgPool;

use studyforge_core::{AdminPermissions, AdminUserId, Email, Username};

use super::{AdminUserStore, RepositoryError, StoreResult, conflict_or};
use crate::models::{AdminUser, NewAdminUser};
use crate::services::auth::lockout::{LockoutPolicy, LockoutState};

const ADMIN_COLUMNS: &str = "id, username, email, full_name, password_hash, is_active, \
     can_manage_users, can_delete_users, can_manage_curricula, can_view_analytics, \
     can_manage_admins, failed_login_attempts, locked_until, last_login, created_at";

// =============================================================================
// Internal Row Types
// =============================================================================

#[derive(Debug, sqlx::FromRow)]
struct AdminUserRow {
    id: i32,
    username: String,
    email: String,
    full_name: String,
    password_hash: String,
    is_active: bool,
    can_manage_users: bool,
    can_delete_users: bool,
    can_manage_curricula: bool,
    can_view_analytics: bool,
    can_manage_admins: bool,
    failed_login_attempts: i32,
    locked_until: Option<DateTime<Utc>>,
    last_login: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl TryFrom<AdminUserRow> for AdminUser {
    type Error = RepositoryError;

    fn try_from(row: AdminUserRow) -> Result<Self, Self::Error> {
        let username = Username::parse(&row.username).map_err(|e| {
            RepositoryError::DataCorruption(format!("invalid admin username in database: {e}"))
        })?;
        let email = Email::parse(&row.email).map_err(|e| {
            RepositoryError::DataCorruption(format!("invalid admin email in database: {e}"))
        })?;

        Ok(Self {
            id: AdminUserId::new(row.id),
            username,
            email,
            full_name: row.full_name,
            password_hash: SecretString::from(row.password_hash),
            is_active: row.is_active,
            permissions: AdminPermissions {
                manage_users: row.can_manage_users,
                delete_users: row.can_delete_users,
                manage_curricula: row.can_manage_curricula,
                view_analytics: row.can_view_analytics,
                manage_admins: row.can_manage_admins,
            },
            lockout: LockoutState {
                failed_attempts: row.failed_login_attempts,
                locked_until: row.locked_until,
                last_login: row.last_login,
            },
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct LockoutRow {
    failed_login_attempts: i32,
    locked_until: Option<DateTime<Utc>>,
    last_login: Option<DateTime<Utc>>,
}

impl From<LockoutRow> for LockoutState {
    fn from(row: LockoutRow) -> Self {
        Self {
            failed_attempts: row.failed_login_attempts,
            locked_until: row.locked_until,
            last_login: row.last_login,
        }
    }
}

// =============================================================================
// Store
// =============================================================================

/// Admin users in `PostgreSQL`.
#[derive(Clone)]
pub struct PgAdminUserStore {
    pool: PgPool,
}

impl PgAdminUserStore {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn lockout_state(&self, id: AdminUserId) -> StoreResult<LockoutState> {
        sqlx::query_as::<_, LockoutRow>(
            "SELECT failed_login_attempts, locked_until, last_login FROM admin_user WHERE id = $1",
        )
        .bind(id.as_i32())
        .fetch_optional(&self.pool)
        .await?
        .map(LockoutState::from)
        .ok_or(RepositoryError::NotFound)
    }
}

impl AdminUserStore for PgAdminUserStore {
    fn find_by_id(&self, id: AdminUserId) -> BoxFuture<'_, StoreResult<Option<AdminUser>>> {
        async move {
            let row = sqlx::query_as::<_, AdminUserRow>(&format!(
                "SELECT {ADMIN_COLUMNS} FROM admin_user WHERE id = $1"
            ))
            .bind(id.as_i32())
            .fetch_optional(&self.pool)
            .await?;

            row.map(TryInto::try_into).transpose()
        }
        .boxed()
    }

    fn find_active_by_username<'a>(
        &'a self,
        username: &'a str,
    ) -> BoxFuture<'a, StoreResult<Option<AdminUser>>> {
        async move {
            let row = sqlx::query_as::<_, AdminUserRow>(&format!(
                "SELECT {ADMIN_COLUMNS} FROM admin_user WHERE username = $1 AND is_active"
            ))
            .bind(username)
            .fetch_optional(&self.pool)
            .await?;

            row.map(TryInto::try_into).transpose()
        }
        .boxed()
    }

    fn email_exists<'a>(&'a self, email: &'a Email) -> BoxFuture<'a, StoreResult<bool>> {
        async move {
            let exists: bool =
                sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM admin_user WHERE email = $1)")
                    .bind(email.as_str())
                    .fetch_one(&self.pool)
                    .await?;
            Ok(exists)
        }
        .boxed()
    }

    fn create<'a>(&'a self, new: &'a NewAdminUser) -> BoxFuture<'a, StoreResult<AdminUser>> {
        async move {
            let row = sqlx::query_as::<_, AdminUserRow>(&format!(
                "INSERT INTO admin_user (username, email, full_name, password_hash, \
                     can_manage_users, can_delete_users, can_manage_curricula, \
                     can_view_analytics, can_manage_admins) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
                 RETURNING {ADMIN_COLUMNS}"
            ))
            .bind(new.username.as_str())
            .bind(new.email.as_str())
            .bind(&new.full_name)
            .bind(new.password_hash.expose_secret())
            .bind(new.permissions.manage_users)
            .bind(new.permissions.delete_users)
            .bind(new.permissions.manage_curricula)
            .bind(new.permissions.view_analytics)
            .bind(new.permissions.manage_admins)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| conflict_or(e, "admin username or email"))?;

            row.try_into()
        }
        .boxed()
    }

    fn list(&self) -> BoxFuture<'_, StoreResult<Vec<AdminUser>>> {
        async move {
            let rows = sqlx::query_as::<_, AdminUserRow>(&format!(
                "SELECT {ADMIN_COLUMNS} FROM admin_user ORDER BY username"
            ))
            .fetch_all(&self.pool)
            .await?;

            rows.into_iter().map(TryInto::try_into).collect()
        }
        .boxed()
    }

    fn record_failure(
        &self,
        id: AdminUserId,
        now: DateTime<Utc>,
        policy: LockoutPolicy,
    ) -> BoxFuture<'_, StoreResult<LockoutState>> {
        async move {
            // No row back means the admin is locked (no-op) or gone.
            let updated = sqlx::query_as::<_, LockoutRow>(
                "UPDATE admin_user SET \
                     failed_login_attempts = failed_login_attempts + 1, \
                     locked_until = CASE WHEN failed_login_attempts + 1 >= $2 \
                                         THEN $3 ELSE locked_until END \
                 WHERE id = $1 AND (locked_until IS NULL OR locked_until <= $4) \
                 RETURNING failed_login_attempts, locked_until, last_login",
            )
            .bind(id.as_i32())
            .bind(policy.threshold)
            .bind(now + policy.lock_duration)
            .bind(now)
            .fetch_optional(&self.pool)
            .await?;

            match updated {
                Some(row) => Ok(row.into()),
                None => self.lockout_state(id).await,
            }
        }
        .boxed()
    }

    fn record_success(
        &self,
        id: AdminUserId,
        now: DateTime<Utc>,
    ) -> BoxFuture<'_, StoreResult<LockoutState>> {
        async move {
            // Compare-and-set: a lock written by a concurrent failure wins.
            let updated = sqlx::query_as::<_, LockoutRow>(
                "UPDATE admin_user SET failed_login_attempts = 0, locked_until = NULL, \
                     last_login = $2 \
                 WHERE id = $1 AND (locked_until IS NULL OR locked_until <= $2) \
                 RETURNING failed_login_attempts, locked_until, last_login",
            )
            .bind(id.as_i32())
            .bind(now)
            .fetch_optional(&self.pool)
            .await?;

            match updated {
                Some(row) => Ok(row.into()),
                None => self.lockout_state(id).await,
            }
        }
        .boxed()
    }

    fn unlock(&self, id: AdminUserId) -> BoxFuture<'_, StoreResult<()>> {
        async move {
            let result = sqlx::query(
                "UPDATE admin_user SET failed_login_attempts = 0, locked_until = NULL \
                 WHERE id = $1",
            )
            .bind(id.as_i32())
            .execute(&self.pool)
            .await?;

            if result.rows_affected() == 0 {
                return Err(RepositoryError::NotFound);
            }
            Ok(())
        }
        .boxed()
    }

    fn unlock_by_username<'a>(&'a self, username: &'a str) -> BoxFuture<'a, StoreResult<()>> {
        async move {
            let result = sqlx::query(
                "UPDATE admin_user SET failed_login_attempts = 0, locked_until = NULL \
                 WHERE username = $1",
            )
            .bind(username)
            .execute(&self.pool)
            .await?;

            if result.rows_affected() == 0 {
                return Err(RepositoryError::NotFound);
            }
            Ok(())
        }
        .boxed()
    }
}
