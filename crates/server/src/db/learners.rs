//! `PostgreSQL` store for learners and their verification tickets.

use chrono::{DateTime, Utc};
use futures::FutureExt as _;
use futures::future::BoxFuture;
use secrecy::{ExposeSecret, SecretString};
use sqlx::PgPool;
use uuid::Uuid;

use studyforge_core::{Email, LearnerId, Username};

use super::{LearnerStore, RepositoryError, StoreResult, conflict_or};
use crate::models::{
    DeletedLearnerData, Learner, LearnerOverview, NewLearner, NewVerificationTicket,
    VerificationTicket,
};

const LEARNER_COLUMNS: &str =
    "id, username, email, first_name, last_name, password_hash, is_active, date_joined";

// =============================================================================
// Internal Row Types
// =============================================================================

#[derive(Debug, sqlx::FromRow)]
struct LearnerRow {
    id: i32,
    username: String,
    email: String,
    first_name: String,
    last_name: String,
    password_hash: String,
    is_active: bool,
    date_joined: DateTime<Utc>,
}

impl TryFrom<LearnerRow> for Learner {
    type Error = RepositoryError;

    fn try_from(row: LearnerRow) -> Result<Self, Self::Error> {
        let username = Username::parse(&row.username).map_err(|e| {
            RepositoryError::DataCorruption(format!("invalid learner username in database: {e}"))
        })?;
        let email = Email::parse(&row.email).map_err(|e| {
            RepositoryError::DataCorruption(format!("invalid learner email in database: {e}"))
        })?;

        Ok(Self {
            id: LearnerId::new(row.id),
            username,
            email,
            first_name: row.first_name,
            last_name: row.last_name,
            password_hash: SecretString::from(row.password_hash),
            is_active: row.is_active,
            date_joined: row.date_joined,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct TicketRow {
    learner_id: i32,
    token: Uuid,
    issued_at: Option<DateTime<Utc>>,
    verified: bool,
}

impl From<TicketRow> for VerificationTicket {
    fn from(row: TicketRow) -> Self {
        Self {
            learner_id: LearnerId::new(row.learner_id),
            token: row.token,
            issued_at: row.issued_at,
            verified: row.verified,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct OverviewRow {
    #[sqlx(flatten)]
    learner: LearnerRow,
    verified: bool,
    curriculum_count: i64,
}

// =============================================================================
// Store
// =============================================================================

/// Learners in `PostgreSQL`.
#[derive(Clone)]
pub struct PgLearnerStore {
    pool: PgPool,
}

impl PgLearnerStore {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn find_where(&self, column: &str, value: &str) -> StoreResult<Option<Learner>> {
        let row = sqlx::query_as::<_, LearnerRow>(&format!(
            "SELECT {LEARNER_COLUMNS} FROM learner WHERE {column} = $1"
        ))
        .bind(value)
        .fetch_optional(&self.pool)
        .await?;

        row.map(TryInto::try_into).transpose()
    }
}

impl LearnerStore for PgLearnerStore {
    fn find_by_id(&self, id: LearnerId) -> BoxFuture<'_, StoreResult<Option<Learner>>> {
        async move {
            let row = sqlx::query_as::<_, LearnerRow>(&format!(
                "SELECT {LEARNER_COLUMNS} FROM learner WHERE id = $1"
            ))
            .bind(id.as_i32())
            .fetch_optional(&self.pool)
            .await?;

            row.map(TryInto::try_into).transpose()
        }
        .boxed()
    }

    fn find_by_username<'a>(
        &'a self,
        username: &'a str,
    ) -> BoxFuture<'a, StoreResult<Option<Learner>>> {
        self.find_where("username", username).boxed()
    }

    fn find_by_email<'a>(
        &'a self,
        email: &'a Email,
    ) -> BoxFuture<'a, StoreResult<Option<Learner>>> {
        self.find_where("email", email.as_str()).boxed()
    }

    fn create<'a>(
        &'a self,
        new: &'a NewLearner,
        ticket: &'a NewVerificationTicket,
    ) -> BoxFuture<'a, StoreResult<(Learner, VerificationTicket)>> {
        async move {
            let mut tx = self.pool.begin().await?;

            let row = sqlx::query_as::<_, LearnerRow>(&format!(
                "INSERT INTO learner (username, email, first_name, last_name, password_hash, is_active) \
                 VALUES ($1, $2, $3, $4, $5, $6) \
                 RETURNING {LEARNER_COLUMNS}"
            ))
            .bind(new.username.as_str())
            .bind(new.email.as_str())
            .bind(&new.first_name)
            .bind(&new.last_name)
            .bind(new.password_hash.expose_secret())
            .bind(new.is_active)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| conflict_or(e, "username or email"))?;

            let ticket_row = sqlx::query_as::<_, TicketRow>(
                "INSERT INTO verification_ticket (learner_id, token, issued_at, verified) \
                 VALUES ($1, $2, $3, $4) \
                 RETURNING learner_id, token, issued_at, verified",
            )
            .bind(row.id)
            .bind(ticket.token)
            .bind(ticket.issued_at)
            .bind(ticket.verified)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| conflict_or(e, "verification token"))?;

            tx.commit().await?;

            Ok((row.try_into()?, ticket_row.into()))
        }
        .boxed()
    }

    fn ticket_for(
        &self,
        learner: LearnerId,
    ) -> BoxFuture<'_, StoreResult<Option<VerificationTicket>>> {
        async move {
            let row = sqlx::query_as::<_, TicketRow>(
                "SELECT learner_id, token, issued_at, verified \
                 FROM verification_ticket WHERE learner_id = $1",
            )
            .bind(learner.as_i32())
            .fetch_optional(&self.pool)
            .await?;
            Ok(row.map(Into::into))
        }
        .boxed()
    }

    fn ticket_by_token(
        &self,
        token: Uuid,
    ) -> BoxFuture<'_, StoreResult<Option<VerificationTicket>>> {
        async move {
            let row = sqlx::query_as::<_, TicketRow>(
                "SELECT learner_id, token, issued_at, verified \
                 FROM verification_ticket WHERE token = $1",
            )
            .bind(token)
            .fetch_optional(&self.pool)
            .await?;
            Ok(row.map(Into::into))
        }
        .boxed()
    }

    fn put_ticket<'a>(
        &'a self,
        learner: LearnerId,
        ticket: &'a NewVerificationTicket,
    ) -> BoxFuture<'a, StoreResult<VerificationTicket>> {
        async move {
            let row = sqlx::query_as::<_, TicketRow>(
                "INSERT INTO verification_ticket (learner_id, token, issued_at, verified) \
                 VALUES ($1, $2, $3, $4) \
                 ON CONFLICT (learner_id) DO UPDATE SET \
                     token = EXCLUDED.token, issued_at = EXCLUDED.issued_at, \
                     verified = EXCLUDED.verified \
                 RETURNING learner_id, token, issued_at, verified",
            )
            .bind(learner.as_i32())
            .bind(ticket.token)
            .bind(ticket.issued_at)
            .bind(ticket.verified)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                if let sqlx::Error::Database(ref db_err) = e
                    && db_err.is_foreign_key_violation()
                {
                    return RepositoryError::NotFound;
                }
                conflict_or(e, "verification token")
            })?;
            Ok(row.into())
        }
        .boxed()
    }

    fn mark_verified(&self, learner: LearnerId) -> BoxFuture<'_, StoreResult<()>> {
        async move {
            let mut tx = self.pool.begin().await?;

            let ticket = sqlx::query(
                "UPDATE verification_ticket SET verified = TRUE WHERE learner_id = $1",
            )
            .bind(learner.as_i32())
            .execute(&mut *tx)
            .await?;
            if ticket.rows_affected() == 0 {
                return Err(RepositoryError::NotFound);
            }

            sqlx::query("UPDATE learner SET is_active = TRUE WHERE id = $1")
                .bind(learner.as_i32())
                .execute(&mut *tx)
                .await?;

            tx.commit().await?;
            Ok(())
        }
        .boxed()
    }

    fn toggle_active(&self, learner: LearnerId) -> BoxFuture<'_, StoreResult<bool>> {
        async move {
            let active: Option<bool> = sqlx::query_scalar(
                "UPDATE learner SET is_active = NOT is_active WHERE id = $1 RETURNING is_active",
            )
            .bind(learner.as_i32())
            .fetch_optional(&self.pool)
            .await?;
            active.ok_or(RepositoryError::NotFound)
        }
        .boxed()
    }

    fn list(&self) -> BoxFuture<'_, StoreResult<Vec<LearnerOverview>>> {
        async move {
            let rows = sqlx::query_as::<_, OverviewRow>(
                "SELECT l.id, l.username, l.email, l.first_name, l.last_name, l.password_hash, \
                        l.is_active, l.date_joined, \
                        COALESCE(t.verified, FALSE) AS verified, \
                        (SELECT COUNT(*) FROM curriculum c WHERE c.learner_id = l.id) AS curriculum_count \
                 FROM learner l \
                 LEFT JOIN verification_ticket t ON t.learner_id = l.id \
                 ORDER BY l.date_joined DESC",
            )
            .fetch_all(&self.pool)
            .await?;

            rows.into_iter()
                .map(|row| {
                    Ok(LearnerOverview {
                        learner: row.learner.try_into()?,
                        verified: row.verified,
                        curriculum_count: row.curriculum_count,
                    })
                })
                .collect()
        }
        .boxed()
    }

    fn delete(&self, learner: LearnerId) -> BoxFuture<'_, StoreResult<DeletedLearnerData>> {
        async move {
            let mut tx = self.pool.begin().await?;

            let (curricula, progress_entries, notes, feedback): (i64, i64, i64, i64) =
                sqlx::query_as(
                    "SELECT (SELECT COUNT(*) FROM curriculum WHERE learner_id = $1), \
                            (SELECT COUNT(*) FROM learner_progress WHERE learner_id = $1), \
                            (SELECT COUNT(*) FROM learner_note WHERE learner_id = $1), \
                            (SELECT COUNT(*) FROM curriculum_feedback WHERE learner_id = $1)",
                )
                .bind(learner.as_i32())
                .fetch_one(&mut *tx)
                .await?;

            // Curricula, progress, notes, feedback and the ticket cascade.
            let deleted = sqlx::query("DELETE FROM learner WHERE id = $1")
                .bind(learner.as_i32())
                .execute(&mut *tx)
                .await?;
            if deleted.rows_affected() == 0 {
                return Err(RepositoryError::NotFound);
            }

            tx.commit().await?;

            Ok(DeletedLearnerData {
                curricula: u64::try_from(curricula).unwrap_or(0),
                progress_entries: u64::try_from(progress_entries).unwrap_or(0),
                notes: u64::try_from(notes).unwrap_or(0),
                feedback: u64::try_from(feedback).unwrap_or(0),
            })
        }
        .boxed()
    }

    fn verify_all(&self) -> BoxFuture<'_, StoreResult<u64>> {
        async move {
            let mut tx = self.pool.begin().await?;

            let verified: Vec<i32> = sqlx::query_scalar(
                "UPDATE verification_ticket SET verified = TRUE WHERE NOT verified \
                 RETURNING learner_id",
            )
            .fetch_all(&mut *tx)
            .await?;

            sqlx::query("UPDATE learner SET is_active = TRUE WHERE id = ANY($1)")
                .bind(&verified)
                .execute(&mut *tx)
                .await?;

            tx.commit().await?;
            Ok(u64::try_from(verified.len()).unwrap_or(u64::MAX))
        }
        .boxed()
    }
}
