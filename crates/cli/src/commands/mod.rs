//! Subcommand implementations.
//!
//! Every command reads `DATABASE_URL` (a `.env` file is honoured).

pub mod admin;
pub mod learner;
pub mod migrate;
pub mod sessions;

use sqlx::PgPool;
use thiserror::Error;

/// Failures shared by every command.
#[derive(Debug, Error)]
pub enum CommandError {
    /// Required environment variable is missing.
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(&'static str),

    /// Database connection or query error.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Store-level failure.
    #[error("{0}")]
    Store(#[from] studyforge_server::db::RepositoryError),
}

/// Load `.env` and connect to `DATABASE_URL`.
pub async fn connect() -> Result<PgPool, CommandError> {
    dotenvy::dotenv().ok();

    let database_url =
        std::env::var("DATABASE_URL").map_err(|_| CommandError::MissingEnvVar("DATABASE_URL"))?;

    tracing::info!("Connecting to database...");
    Ok(PgPool::connect(&database_url).await?)
}
