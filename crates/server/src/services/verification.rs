//! Learner e-mail verification tickets.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use thiserror::Error;
use uuid::Uuid;

use studyforge_core::LearnerId;

use crate::db::{LearnerStore, RepositoryError};
use crate::models::{NewVerificationTicket, VerificationTicket};

#[derive(Debug, Error)]
pub enum VerificationError {
    #[error("verification token not found")]
    NotFound,

    #[error("verification link has expired")]
    Expired,

    #[error("database error: {0}")]
    Repository(#[from] RepositoryError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyOutcome {
    Verified,
    AlreadyVerified,
}

/// Issues and redeems verification tickets.
#[derive(Clone)]
pub struct VerificationService {
    learners: Arc<dyn LearnerStore>,
    window: Duration,
}

impl VerificationService {
    #[must_use]
    pub fn new(learners: Arc<dyn LearnerStore>, window: Duration) -> Self {
        Self { learners, window }
    }

    #[must_use]
    pub const fn window(&self) -> Duration {
        self.window
    }

    /// Replace the learner's ticket with a fresh, unverified one.
    ///
    /// # Errors
    ///
    /// `NotFound` if the learner does not exist.
    pub async fn issue(
        &self,
        learner: LearnerId,
        now: DateTime<Utc>,
    ) -> Result<VerificationTicket, RepositoryError> {
        self.learners
            .put_ticket(learner, &NewVerificationTicket::fresh(now))
            .await
    }

    #[must_use]
    pub fn is_expired(&self, ticket: &VerificationTicket, now: DateTime<Utc>) -> bool {
        ticket.is_expired(now, self.window)
    }

    /// Redeem `token`: mark the ticket verified and activate the learner.
    ///
    /// Expiry is checked before the verified flag, so an expired link reports
    /// `Expired` even for an account verified some other way.
    ///
    /// # Errors
    ///
    /// `NotFound` for unknown tokens, `Expired` past the activation window.
    #[tracing::instrument(skip(self))]
    pub async fn verify_email(
        &self,
        token: Uuid,
        now: DateTime<Utc>,
    ) -> Result<VerifyOutcome, VerificationError> {
        let ticket = self
            .learners
            .ticket_by_token(token)
            .await?
            .ok_or(VerificationError::NotFound)?;

        if self.is_expired(&ticket, now) {
            return Err(VerificationError::Expired);
        }
        if ticket.verified {
            return Ok(VerifyOutcome::AlreadyVerified);
        }

        self.learners.mark_verified(ticket.learner_id).await?;
        tracing::info!(learner_id = %ticket.learner_id, "Learner e-mail verified");
        Ok(VerifyOutcome::Verified)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use secrecy::SecretString;
    use studyforge_core::{Email, Username};

    use super::*;
    use crate::db::memory::MemoryDb;
    use crate::models::NewLearner;

    async fn learner(db: &MemoryDb, issued: DateTime<Utc>) -> VerificationTicket {
        let (_, ticket) = LearnerStore::create(
            db,
            &NewLearner {
                username: Username::parse("alice").unwrap(),
                email: Email::parse("alice@example.com").unwrap(),
                first_name: "Alice".to_owned(),
                last_name: String::new(),
                password_hash: SecretString::from("x".to_owned()),
                is_active: false,
            },
            &NewVerificationTicket::fresh(issued),
        )
        .await
        .unwrap();
        ticket
    }

    #[tokio::test]
    async fn test_verify_activates_learner() {
        let db = MemoryDb::new();
        let now = Utc::now();
        let ticket = learner(&db, now).await;
        let service = VerificationService::new(Arc::new(db.clone()), Duration::days(7));

        assert_eq!(
            service.verify_email(ticket.token, now).await.unwrap(),
            VerifyOutcome::Verified
        );
        let stored = LearnerStore::find_by_id(&db, ticket.learner_id)
            .await
            .unwrap()
            .unwrap();
        assert!(stored.is_active);

        assert_eq!(
            service.verify_email(ticket.token, now).await.unwrap(),
            VerifyOutcome::AlreadyVerified
        );
    }

    #[tokio::test]
    async fn test_unknown_and_expired_tokens() {
        let db = MemoryDb::new();
        let now = Utc::now();
        let ticket = learner(&db, now - Duration::days(8)).await;
        let service = VerificationService::new(Arc::new(db), Duration::days(7));

        assert!(matches!(
            service.verify_email(Uuid::new_v4(), now).await,
            Err(VerificationError::NotFound)
        ));
        assert!(matches!(
            service.verify_email(ticket.token, now).await,
            Err(VerificationError::Expired)
        ));
    }

    #[tokio::test]
    async fn test_issue_replaces_token() {
        let db = MemoryDb::new();
        let now = Utc::now();
        let old = learner(&db, now - Duration::days(8)).await;
        let service = VerificationService::new(Arc::new(db), Duration::days(7));

        let fresh = service.issue(old.learner_id, now).await.unwrap();
        assert_ne!(fresh.token, old.token);
        assert!(!service.is_expired(&fresh, now));
        assert!(matches!(
            service.verify_email(old.token, now).await,
            Err(VerificationError::NotFound)
        ));
    }
}
