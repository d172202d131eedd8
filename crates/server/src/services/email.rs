//! Verification mail delivery.
//!
//! [`EmailService`] sends over SMTP via lettre. Without SMTP configured the
//! server falls back to [`LogMailer`], which only logs the link. Tests use
//! [`OutboxMailer`].

use std::sync::{Arc, Mutex};

use futures::FutureExt as _;
use futures::future::BoxFuture;
use lettre::{
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
    message::{MultiPart, SinglePart, header::ContentType},
    transport::smtp::{Error as SmtpError, authentication::Credentials},
};
use secrecy::ExposeSecret;
use thiserror::Error;

use studyforge_core::Email;

use crate::config::EmailConfig;

/// Errors that can occur when sending email.
#[derive(Debug, Error)]
pub enum EmailError {
    /// SMTP transport error.
    #[error("SMTP error: {0}")]
    Smtp(#[from] SmtpError),

    /// Failed to build email message.
    #[error("Failed to build message: {0}")]
    MessageBuild(#[from] lettre::error::Error),

    /// Invalid email address.
    #[error("Invalid email address: {0}")]
    InvalidAddress(String),

    /// Delivery refused by a non-SMTP mailer.
    #[error("delivery failed: {0}")]
    Rejected(String),
}

/// A verification message, as handed to a mailer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationMessage {
    pub to: Email,
    pub username: String,
    pub link: String,
}

impl VerificationMessage {
    fn subject() -> &'static str {
        "Verify your Studyforge account"
    }

    fn text_body(&self) -> String {
        format!(
            "Hi {},\n\nConfirm your e-mail address to start learning:\n{}\n\n\
             If you did not sign up, ignore this message.\n",
            self.username, self.link
        )
    }

    fn html_body(&self) -> String {
        format!(
            "<p>Hi {},</p><p>Confirm your e-mail address to start learning:</p>\
             <p><a href=\"{link}\">{link}</a></p>\
             <p>If you did not sign up, ignore this message.</p>",
            html_escape(&self.username),
            link = html_escape(&self.link),
        )
    }
}

fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Delivers verification mail.
pub trait VerificationMailer: Send + Sync {
    fn send_verification<'a>(
        &'a self,
        message: &'a VerificationMessage,
    ) -> BoxFuture<'a, Result<(), EmailError>>;
}

/// SMTP mailer.
#[derive(Clone)]
pub struct EmailService {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    from_address: String,
}

impl EmailService {
    /// Create a new email service from configuration.
    ///
    /// # Errors
    ///
    /// Returns error if the SMTP relay cannot be configured.
    pub fn new(config: &EmailConfig) -> Result<Self, SmtpError> {
        let credentials = Credentials::new(
            config.smtp_username.clone(),
            config.smtp_password.expose_secret().to_string(),
        );

        let mailer = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host)?
            .port(config.smtp_port)
            .credentials(credentials)
            .build();

        Ok(Self {
            mailer,
            from_address: config.from_address.clone(),
        })
    }

    async fn send(&self, message: &VerificationMessage) -> Result<(), EmailError> {
        let email = Message::builder()
            .from(
                self.from_address
                    .parse()
                    .map_err(|_| EmailError::InvalidAddress(self.from_address.clone()))?,
            )
            .to(message
                .to
                .as_str()
                .parse()
                .map_err(|_| EmailError::InvalidAddress(message.to.to_string()))?)
            .subject(VerificationMessage::subject())
            .multipart(
                MultiPart::alternative()
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_PLAIN)
                            .body(message.text_body()),
                    )
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_HTML)
                            .body(message.html_body()),
                    ),
            )?;

        self.mailer.send(email).await?;

        tracing::info!(to = %message.to, "Verification email sent");
        Ok(())
    }
}

impl VerificationMailer for EmailService {
    fn send_verification<'a>(
        &'a self,
        message: &'a VerificationMessage,
    ) -> BoxFuture<'a, Result<(), EmailError>> {
        self.send(message).boxed()
    }
}

/// Logs verification links instead of sending them.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogMailer;

impl VerificationMailer for LogMailer {
    fn send_verification<'a>(
        &'a self,
        message: &'a VerificationMessage,
    ) -> BoxFuture<'a, Result<(), EmailError>> {
        tracing::info!(
            to = %message.to,
            link = %message.link,
            "SMTP not configured, verification link logged instead of sent"
        );
        futures::future::ready(Ok(())).boxed()
    }
}

/// Collects messages in memory. Can be told to fail.
#[derive(Debug, Clone, Default)]
pub struct OutboxMailer {
    sent: Arc<Mutex<Vec<VerificationMessage>>>,
    failing: Arc<std::sync::atomic::AtomicBool>,
}

impl OutboxMailer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing
            .store(failing, std::sync::atomic::Ordering::SeqCst);
    }

    /// Everything delivered so far.
    #[must_use]
    pub fn sent(&self) -> Vec<VerificationMessage> {
        self.sent.lock().map(|m| m.clone()).unwrap_or_default()
    }
}

impl VerificationMailer for OutboxMailer {
    fn send_verification<'a>(
        &'a self,
        message: &'a VerificationMessage,
    ) -> BoxFuture<'a, Result<(), EmailError>> {
        let result = if self.failing.load(std::sync::atomic::Ordering::SeqCst) {
            Err(EmailError::Rejected("outbox set to fail".to_owned()))
        } else {
            self.sent
                .lock()
                .map(|mut m| m.push(message.clone()))
                .map_err(|_| EmailError::Rejected("outbox poisoned".to_owned()))
        };
        futures::future::ready(result).boxed()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn message() -> VerificationMessage {
        VerificationMessage {
            to: Email::parse("alice@example.com").unwrap(),
            username: "<alice>".to_owned(),
            link: "http://localhost:3000/api/auth/verify/abc".to_owned(),
        }
    }

    #[test]
    fn test_bodies_carry_link() {
        let m = message();
        assert!(m.text_body().contains(&m.link));
        assert!(m.html_body().contains(&m.link));
        assert!(m.html_body().contains("&lt;alice&gt;"));
    }

    #[tokio::test]
    async fn test_outbox_records_and_fails() {
        let outbox = OutboxMailer::new();
        outbox.send_verification(&message()).await.unwrap();
        assert_eq!(outbox.sent().len(), 1);

        outbox.set_failing(true);
        assert!(outbox.send_verification(&message()).await.is_err());
        assert_eq!(outbox.sent().len(), 1);
    }
}
