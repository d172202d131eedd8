//! Application state shared across handlers.

use std::sync::Arc;

use crate::config::{AuthSettings, ServerConfig};
use crate::db::Stores;
use crate::services::accounts::AccountService;
use crate::services::auth::password::{Argon2Hasher, CredentialHasher};
use crate::services::auth::{AuthError, LoginResolver};
use crate::services::curriculum::{
    CurriculumError, CurriculumGenerator, CurriculumService, HttpCurriculumGenerator,
    UnconfiguredGenerator,
};
use crate::services::email::{EmailService, LogMailer, VerificationMailer};
use crate::services::sessions::SessionRegistry;
use crate::services::verification::VerificationService;

/// Error building the application state.
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("password hasher: {0}")]
    Hasher(#[from] AuthError),
    #[error("SMTP transport: {0}")]
    Smtp(#[from] lettre::transport::smtp::Error),
    #[error("curriculum client: {0}")]
    Curriculum(#[from] CurriculumError),
}

/// Pluggable collaborators. Production builds them from configuration;
/// tests substitute cheap or recording versions.
pub struct Collaborators {
    pub hasher: Arc<dyn CredentialHasher>,
    pub mailer: Arc<dyn VerificationMailer>,
    pub generator: Arc<dyn CurriculumGenerator>,
}

/// Application state shared across all handlers.
///
/// Cheaply cloneable via `Arc`.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    settings: AuthSettings,
    stores: Stores,
    sessions: SessionRegistry,
    resolver: LoginResolver,
    accounts: AccountService,
    verification: VerificationService,
    curricula: CurriculumService,
}

impl AppState {
    /// Build the state from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if a configured collaborator cannot be constructed.
    pub fn new(config: &ServerConfig, stores: Stores) -> Result<Self, StateError> {
        let mailer: Arc<dyn VerificationMailer> = match &config.email {
            Some(email) => Arc::new(EmailService::new(email)?),
            None => {
                tracing::warn!("SMTP not configured, verification links will only be logged");
                Arc::new(LogMailer)
            }
        };
        let generator: Arc<dyn CurriculumGenerator> = match &config.curriculum {
            Some(curriculum) => Arc::new(HttpCurriculumGenerator::new(curriculum)?),
            None => {
                tracing::warn!("Curriculum service not configured, generation is disabled");
                Arc::new(UnconfiguredGenerator)
            }
        };
        let collaborators = Collaborators {
            hasher: Arc::new(Argon2Hasher::with_defaults()?),
            mailer,
            generator,
        };
        Ok(Self::assemble(config.auth.clone(), stores, collaborators))
    }

    /// Wire services over `stores` with the given collaborators.
    #[must_use]
    pub fn assemble(settings: AuthSettings, stores: Stores, collaborators: Collaborators) -> Self {
        let Collaborators {
            hasher,
            mailer,
            generator,
        } = collaborators;

        let sessions = SessionRegistry::new(stores.sessions.clone(), stores.admins.clone());
        let verification =
            VerificationService::new(stores.learners.clone(), settings.activation_window);
        let resolver = LoginResolver::new(
            stores.admins.clone(),
            stores.learners.clone(),
            sessions.clone(),
            hasher.clone(),
            settings.clone(),
        );
        let accounts = AccountService::new(
            stores.learners.clone(),
            hasher,
            verification.clone(),
            mailer,
            settings.clone(),
        );
        let curricula = CurriculumService::new(generator, stores.curricula.clone());

        Self {
            inner: Arc::new(AppStateInner {
                settings,
                stores,
                sessions,
                resolver,
                accounts,
                verification,
                curricula,
            }),
        }
    }

    #[must_use]
    pub fn settings(&self) -> &AuthSettings {
        &self.inner.settings
    }

    #[must_use]
    pub fn stores(&self) -> &Stores {
        &self.inner.stores
    }

    #[must_use]
    pub fn sessions(&self) -> &SessionRegistry {
        &self.inner.sessions
    }

    #[must_use]
    pub fn resolver(&self) -> &LoginResolver {
        &self.inner.resolver
    }

    #[must_use]
    pub fn accounts(&self) -> &AccountService {
        &self.inner.accounts
    }

    #[must_use]
    pub fn verification(&self) -> &VerificationService {
        &self.inner.verification
    }

    #[must_use]
    pub fn curricula(&self) -> &CurriculumService {
        &self.inner.curricula
    }
}
