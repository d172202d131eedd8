//! Learner maintenance commands.

use studyforge_core::Email;
use studyforge_server::db::{LearnerStore, PgLearnerStore, RepositoryError};
use thiserror::Error;

use super::{CommandError, connect};

#[derive(Debug, Error)]
pub enum LearnerError {
    #[error(transparent)]
    Command(#[from] CommandError),

    #[error("Invalid email: {0}")]
    InvalidEmail(String),

    #[error("No learner matches {0}")]
    NotFound(String),
}

impl From<RepositoryError> for LearnerError {
    fn from(e: RepositoryError) -> Self {
        Self::Command(CommandError::Store(e))
    }
}

/// Which learners to mark verified.
#[derive(Debug)]
pub enum Target {
    Username(String),
    Email(String),
    All,
}

/// Mark learners verified and active, as if they had followed their link.
///
/// # Errors
///
/// `NotFound` when a named learner does not exist; connection and store
/// failures otherwise.
pub async fn verify(target: Target) -> Result<u64, LearnerError> {
    let pool = connect().await?;
    let store = PgLearnerStore::new(pool);

    let learner = match target {
        Target::All => {
            let changed = store.verify_all().await?;
            tracing::info!(changed, "Learners verified");
            return Ok(changed);
        }
        Target::Username(username) => store
            .find_by_username(&username)
            .await?
            .ok_or(LearnerError::NotFound(username))?,
        Target::Email(raw) => {
            let email = Email::parse(&raw).map_err(|_| LearnerError::InvalidEmail(raw.clone()))?;
            store
                .find_by_email(&email)
                .await?
                .ok_or(LearnerError::NotFound(raw))?
        }
    };

    store.mark_verified(learner.id).await?;
    tracing::info!(learner_id = %learner.id, username = %learner.username, "Learner verified");
    Ok(1)
}
