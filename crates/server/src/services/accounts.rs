//! Learner self-registration and verification mail.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Deserialize;

use studyforge_core::{Email, Username};

use crate::config::AuthSettings;
use crate::db::{LearnerStore, RepositoryError};
use crate::models::{Learner, NewLearner, NewVerificationTicket, VerificationTicket};
use crate::services::auth::AuthError;
use crate::services::auth::password::{CredentialHasher, validate_password};
use crate::services::email::{VerificationMailer, VerificationMessage};
use crate::services::verification::VerificationService;

/// Registration form.
#[derive(Debug, Clone, Deserialize)]
pub struct RegistrationRequest {
    pub username: String,
    pub email: String,
    pub password: String,
    pub password_confirm: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
}

/// Result of a successful registration.
#[derive(Debug, Clone)]
pub struct Registration {
    pub learner: Learner,
    /// Whether the learner must verify before logging in.
    pub requires_verification: bool,
    /// `false` when verification was required but the mail failed.
    pub verification_email_sent: bool,
}

#[derive(Clone)]
pub struct AccountService {
    learners: Arc<dyn LearnerStore>,
    hasher: Arc<dyn CredentialHasher>,
    verification: VerificationService,
    mailer: Arc<dyn VerificationMailer>,
    settings: AuthSettings,
}

impl AccountService {
    #[must_use]
    pub fn new(
        learners: Arc<dyn LearnerStore>,
        hasher: Arc<dyn CredentialHasher>,
        verification: VerificationService,
        mailer: Arc<dyn VerificationMailer>,
        settings: AuthSettings,
    ) -> Self {
        Self {
            learners,
            hasher,
            verification,
            mailer,
            settings,
        }
    }

    /// Register a learner.
    ///
    /// With verification required the account starts inactive with an
    /// unverified ticket and a mail is sent; a failed mail does not undo the
    /// registration. Otherwise the account is active and verified at once.
    ///
    /// # Errors
    ///
    /// Input validation errors, `UsernameTaken`/`EmailTaken`, or storage errors.
    #[tracing::instrument(skip_all, fields(username = %request.username))]
    pub async fn register(
        &self,
        request: &RegistrationRequest,
        now: DateTime<Utc>,
    ) -> Result<Registration, AuthError> {
        if request.password != request.password_confirm {
            return Err(AuthError::PasswordMismatch);
        }
        validate_password(&request.password)?;
        let username = Username::parse(&request.username)?;
        let email = Email::parse(&request.email)?;

        if self.learners.find_by_username(username.as_str()).await?.is_some() {
            return Err(AuthError::UsernameTaken);
        }
        if self.learners.find_by_email(&email).await?.is_some() {
            return Err(AuthError::EmailTaken);
        }

        let strict = self.settings.require_email_verification;
        let new = NewLearner {
            username,
            email,
            first_name: request.first_name.trim().to_owned(),
            last_name: request.last_name.trim().to_owned(),
            password_hash: self.hasher.hash(&request.password)?,
            is_active: !strict,
        };
        let ticket = if strict {
            NewVerificationTicket::fresh(now)
        } else {
            NewVerificationTicket::verified(now)
        };

        let (learner, ticket) = self
            .learners
            .create(&new, &ticket)
            .await
            .map_err(|e| match e {
                RepositoryError::Conflict(_) => AuthError::UserAlreadyExists,
                other => AuthError::Repository(other),
            })?;
        tracing::info!(learner_id = %learner.id, "Learner registered");

        let verification_email_sent = if strict {
            match self.send(&learner, &ticket).await {
                Ok(()) => true,
                Err(e) => {
                    tracing::warn!(learner_id = %learner.id, error = %e, "Verification email failed");
                    false
                }
            }
        } else {
            false
        };

        Ok(Registration {
            learner,
            requires_verification: strict,
            verification_email_sent,
        })
    }

    /// Re-issue and mail a verification ticket.
    ///
    /// Returns `Ok(false)` without doing anything when the address is unknown
    /// or already verified, so callers can answer the same way in every case.
    ///
    /// # Errors
    ///
    /// `Delivery` when the mail fails, or storage errors.
    #[tracing::instrument(skip_all)]
    pub async fn resend_verification(
        &self,
        email: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, AuthError> {
        let Ok(email) = Email::parse(email) else {
            return Ok(false);
        };
        let Some(learner) = self.learners.find_by_email(&email).await? else {
            return Ok(false);
        };
        if self
            .learners
            .ticket_for(learner.id)
            .await?
            .is_some_and(|t| t.verified)
        {
            return Ok(false);
        }

        let ticket = self.verification.issue(learner.id, now).await?;
        self.send(&learner, &ticket).await?;
        Ok(true)
    }

    async fn send(
        &self,
        learner: &Learner,
        ticket: &VerificationTicket,
    ) -> Result<(), crate::services::email::EmailError> {
        let message = VerificationMessage {
            to: learner.email.clone(),
            username: learner.username.to_string(),
            link: verification_link(&self.settings.base_url, ticket),
        };
        self.mailer.send_verification(&message).await
    }
}

/// Public link that redeems `ticket`.
#[must_use]
pub fn verification_link(base_url: &str, ticket: &VerificationTicket) -> String {
    format!(
        "{}/api/auth/verify/{}",
        base_url.trim_end_matches('/'),
        ticket.token
    )
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::Duration;

    use super::*;
    use crate::db::memory::MemoryDb;
    use crate::services::auth::password::Argon2Hasher;
    use crate::services::email::OutboxMailer;

    fn service(strict: bool) -> (MemoryDb, OutboxMailer, AccountService) {
        let db = MemoryDb::new();
        let outbox = OutboxMailer::new();
        let settings = AuthSettings {
            require_email_verification: strict,
            ..AuthSettings::default()
        };
        let svc = AccountService::new(
            Arc::new(db.clone()),
            Arc::new(Argon2Hasher::for_tests().unwrap()),
            VerificationService::new(Arc::new(db.clone()), settings.activation_window),
            Arc::new(outbox.clone()),
            settings,
        );
        (db, outbox, svc)
    }

    fn request(username: &str) -> RegistrationRequest {
        RegistrationRequest {
            username: username.to_owned(),
            email: format!("{username}@example.com"),
            password: "S3cure!pass".to_owned(),
            password_confirm: "S3cure!pass".to_owned(),
            first_name: "Alice".to_owned(),
            last_name: String::new(),
        }
    }

    #[tokio::test]
    async fn test_strict_registration_sends_mail() {
        let (db, outbox, svc) = service(true);
        let reg = svc.register(&request("alice"), Utc::now()).await.unwrap();
        assert!(!reg.learner.is_active);
        assert!(reg.requires_verification);
        assert!(reg.verification_email_sent);

        let sent = outbox.sent();
        assert_eq!(sent.len(), 1);
        let ticket = db.ticket_for(reg.learner.id).await.unwrap().unwrap();
        assert!(sent[0].link.ends_with(&ticket.token.to_string()));
        assert!(!ticket.verified);
    }

    #[tokio::test]
    async fn test_permissive_registration_is_active() {
        let (db, outbox, svc) = service(false);
        let reg = svc.register(&request("bob"), Utc::now()).await.unwrap();
        assert!(reg.learner.is_active);
        assert!(outbox.sent().is_empty());
        assert!(db.ticket_for(reg.learner.id).await.unwrap().unwrap().verified);
    }

    #[tokio::test]
    async fn test_mail_failure_keeps_account() {
        let (_, outbox, svc) = service(true);
        outbox.set_failing(true);
        let reg = svc.register(&request("carol"), Utc::now()).await.unwrap();
        assert!(!reg.verification_email_sent);
    }

    #[tokio::test]
    async fn test_registration_validation() {
        let (_, _, svc) = service(true);
        let now = Utc::now();

        let mut mismatch = request("dave");
        mismatch.password_confirm = "other".to_owned();
        assert!(matches!(
            svc.register(&mismatch, now).await,
            Err(AuthError::PasswordMismatch)
        ));

        let mut weak = request("dave");
        weak.password = "weak".to_owned();
        weak.password_confirm = "weak".to_owned();
        assert!(matches!(
            svc.register(&weak, now).await,
            Err(AuthError::WeakPassword(_))
        ));

        svc.register(&request("dave"), now).await.unwrap();
        assert!(matches!(
            svc.register(&request("dave"), now).await,
            Err(AuthError::UsernameTaken)
        ));

        let mut same_email = request("dave2");
        same_email.email = "dave@example.com".to_owned();
        assert!(matches!(
            svc.register(&same_email, now).await,
            Err(AuthError::EmailTaken)
        ));
    }

    #[tokio::test]
    async fn test_resend_reissues_ticket() {
        let (db, outbox, svc) = service(true);
        let t0 = Utc::now() - Duration::days(8);
        let reg = svc.register(&request("erin"), t0).await.unwrap();
        let old = db.ticket_for(reg.learner.id).await.unwrap().unwrap();

        assert!(svc.resend_verification("erin@example.com", Utc::now()).await.unwrap());
        let new = db.ticket_for(reg.learner.id).await.unwrap().unwrap();
        assert_ne!(old.token, new.token);
        assert_eq!(outbox.sent().len(), 2);

        assert!(!svc.resend_verification("nobody@example.com", Utc::now()).await.unwrap());
        assert!(!svc.resend_verification("not an email", Utc::now()).await.unwrap());
    }

    #[tokio::test]
    async fn test_resend_surfaces_mail_failure() {
        let (_, outbox, svc) = service(true);
        svc.register(&request("fred"), Utc::now()).await.unwrap();
        outbox.set_failing(true);
        assert!(matches!(
            svc.resend_verification("fred@example.com", Utc::now()).await,
            Err(AuthError::Delivery(_))
        ));
    }
}
