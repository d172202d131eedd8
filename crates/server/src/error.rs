//! Unified error handling with Sentry integration.
//!
//! Every handler returns `Result<T, AppError>`. Responses carry a JSON body
//! `{"success": false, "error": "..."}`; server-side failures are captured to
//! Sentry and never leak their details.

use axum::{
    Json,
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

use crate::db::RepositoryError;
use crate::services::auth::AuthError;
use crate::services::curriculum::CurriculumError;
use crate::services::sessions::SessionError;
use crate::services::verification::VerificationError;

/// Generic login failure text, shared by unknown identifiers and wrong passwords.
pub const INVALID_LOGIN_MESSAGE: &str = "Invalid username/email or password";

/// Application-level error type.
#[derive(Debug, Error)]
pub enum AppError {
    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(RepositoryError),

    #[error("Not found: {0}")]
    NotFound(String),

    /// User is not authenticated.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// User lacks permission.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Bad request from client.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// State conflict, such as a confirmation that does not match.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Admin account is locked.
    #[error("Account locked for {remaining_minutes} more minutes")]
    Locked { remaining_minutes: i64 },

    /// Wrong credentials. Admins are told how many attempts remain.
    #[error("Invalid credentials")]
    InvalidCredentials { remaining_attempts: Option<u32> },

    /// Learner has not verified their e-mail.
    #[error("Email address not verified")]
    Unverified { ticket_expired: bool },

    #[error("Account is inactive")]
    Inactive,

    /// An external dependency (mail, curriculum generation) failed.
    #[error("Upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    /// A required backing store cannot be reached.
    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::Database(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Unauthorized(_) | Self::InvalidCredentials { .. } => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) | Self::Unverified { .. } | Self::Inactive => StatusCode::FORBIDDEN,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Locked { .. } => StatusCode::LOCKED,
            Self::UpstreamUnavailable(_) => StatusCode::BAD_GATEWAY,
            Self::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    /// The message shown to clients.
    #[must_use]
    pub fn public_message(&self) -> String {
        match self {
            Self::Database(_) | Self::Internal(_) => "Internal server error".to_string(),
            Self::UpstreamUnavailable(_) => "External service error".to_string(),
            Self::ServiceUnavailable(_) => {
                "Service temporarily unavailable, please try again".to_string()
            }
            Self::Locked { remaining_minutes } => format!(
                "Account is locked due to too many failed login attempts. \
                 Try again in {remaining_minutes} minutes."
            ),
            Self::InvalidCredentials {
                remaining_attempts: Some(n),
            } => format!("{INVALID_LOGIN_MESSAGE}. {n} attempts remaining."),
            Self::InvalidCredentials {
                remaining_attempts: None,
            } => INVALID_LOGIN_MESSAGE.to_string(),
            Self::Unverified {
                ticket_expired: true,
            } => "Your verification link has expired. Please request a new one.".to_string(),
            Self::Unverified {
                ticket_expired: false,
            } => "Please verify your email address before logging in.".to_string(),
            Self::Inactive => "This account is inactive.".to_string(),
            Self::NotFound(msg)
            | Self::Unauthorized(msg)
            | Self::Forbidden(msg)
            | Self::BadRequest(msg)
            | Self::Conflict(msg) => msg.clone(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        // Capture server errors to Sentry
        if matches!(
            self,
            Self::Database(_)
                | Self::Internal(_)
                | Self::UpstreamUnavailable(_)
                | Self::ServiceUnavailable(_)
        ) {
            let event_id = sentry::capture_error(&self);
            tracing::error!(
                error = %self,
                sentry_event_id = %event_id,
                "Request error"
            );
        }

        let mut body = json!({
            "success": false,
            "error": self.public_message(),
        });
        if let Self::Unverified { ticket_expired } = self {
            body["unverified"] = json!(true);
            body["ticket_expired"] = json!(ticket_expired);
        }

        (self.status(), Json(body)).into_response()
    }
}

impl From<RepositoryError> for AppError {
    fn from(e: RepositoryError) -> Self {
        match e {
            RepositoryError::NotFound => Self::NotFound("Not found".to_string()),
            RepositoryError::Conflict(msg) => Self::Conflict(msg),
            RepositoryError::Unavailable(msg) => Self::ServiceUnavailable(msg),
            other => Self::Database(other),
        }
    }
}

impl From<SessionError> for AppError {
    fn from(e: SessionError) -> Self {
        match e {
            SessionError::Unavailable(msg) => Self::ServiceUnavailable(msg),
            SessionError::Repository(e) => Self::from(e),
            e @ SessionError::TokenGeneration(_) => Self::Internal(e.to_string()),
        }
    }
}

impl From<AuthError> for AppError {
    fn from(e: AuthError) -> Self {
        match e {
            AuthError::InvalidEmail(_) => Self::BadRequest("Invalid email address".to_string()),
            AuthError::InvalidUsername(err) => Self::BadRequest(err.to_string()),
            AuthError::PasswordMismatch => Self::BadRequest("Passwords do not match".to_string()),
            AuthError::WeakPassword(msg) => Self::BadRequest(msg),
            AuthError::UsernameTaken => Self::Conflict("Username already taken".to_string()),
            AuthError::EmailTaken => Self::Conflict("Email already registered".to_string()),
            AuthError::UserAlreadyExists => Self::Conflict("User already exists".to_string()),
            AuthError::PasswordHash => Self::Internal("password hashing failed".to_string()),
            AuthError::Delivery(err) => Self::UpstreamUnavailable(err.to_string()),
            AuthError::Session(err) => Self::from(err),
            AuthError::Repository(err) => Self::from(err),
        }
    }
}

impl From<VerificationError> for AppError {
    fn from(e: VerificationError) -> Self {
        match e {
            VerificationError::NotFound => {
                Self::NotFound("Invalid verification link".to_string())
            }
            VerificationError::Expired => Self::BadRequest(
                "Verification link has expired. Please request a new one.".to_string(),
            ),
            VerificationError::Repository(err) => Self::from(err),
        }
    }
}

impl From<CurriculumError> for AppError {
    fn from(e: CurriculumError) -> Self {
        match e {
            CurriculumError::NotFound => Self::NotFound("Curriculum not found".to_string()),
            CurriculumError::InvalidRequest(msg) => Self::BadRequest(msg),
            CurriculumError::Repository(err) => Self::from(err),
            upstream => Self::UpstreamUnavailable(upstream.to_string()),
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        Self::BadRequest(format!("Invalid JSON: {}", rejection.body_text()))
    }
}

/// Result type alias for `AppError`.
pub type Result<T> = std::result::Result<T, AppError>;

/// Set the Sentry user context from an admin user ID.
pub fn set_sentry_user(admin_user_id: &impl ToString, username: Option<&str>) {
    sentry::configure_scope(|scope| {
        scope.set_user(Some(sentry::User {
            id: Some(admin_user_id.to_string()),
            username: username.map(String::from),
            ..Default::default()
        }));
    });
}

/// Clear the Sentry user context.
pub fn clear_sentry_user() {
    sentry::configure_scope(|scope| {
        scope.set_user(None);
    });
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn get_status(err: impl Into<AppError>) -> StatusCode {
        err.into().into_response().status()
    }

    #[test]
    fn test_app_error_display() {
        let err = AppError::NotFound("learner-123".to_string());
        assert_eq!(err.to_string(), "Not found: learner-123");

        let err = AppError::BadRequest("invalid input".to_string());
        assert_eq!(err.to_string(), "Bad request: invalid input");
    }

    #[test]
    fn test_app_error_status_codes() {
        assert_eq!(get_status(AppError::NotFound("x".into())), StatusCode::NOT_FOUND);
        assert_eq!(get_status(AppError::Conflict("x".into())), StatusCode::CONFLICT);
        assert_eq!(
            get_status(AppError::Locked { remaining_minutes: 30 }),
            StatusCode::LOCKED
        );
        assert_eq!(
            get_status(AppError::InvalidCredentials { remaining_attempts: Some(2) }),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            get_status(AppError::Unverified { ticket_expired: false }),
            StatusCode::FORBIDDEN
        );
        assert_eq!(get_status(AppError::Inactive), StatusCode::FORBIDDEN);
        assert_eq!(
            get_status(AppError::Internal("x".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_service_errors_map_to_statuses() {
        assert_eq!(
            get_status(SessionError::Unavailable("down".into())),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            get_status(RepositoryError::Unavailable("down".into())),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(get_status(AuthError::EmailTaken), StatusCode::CONFLICT);
        assert_eq!(get_status(AuthError::PasswordMismatch), StatusCode::BAD_REQUEST);
        assert_eq!(get_status(VerificationError::NotFound), StatusCode::NOT_FOUND);
        assert_eq!(get_status(VerificationError::Expired), StatusCode::BAD_REQUEST);
        assert_eq!(get_status(CurriculumError::EmptyResponse), StatusCode::BAD_GATEWAY);
        assert_eq!(get_status(CurriculumError::NotConfigured), StatusCode::BAD_GATEWAY);
        assert_eq!(
            get_status(CurriculumError::InvalidRequest("x".into())),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn test_internal_details_are_hidden() {
        let err = AppError::Internal("secret detail".to_string());
        assert_eq!(err.public_message(), "Internal server error");
    }

    #[test]
    fn test_login_messages() {
        assert_eq!(
            AppError::InvalidCredentials { remaining_attempts: None }.public_message(),
            INVALID_LOGIN_MESSAGE
        );
        assert!(
            AppError::InvalidCredentials { remaining_attempts: Some(3) }
                .public_message()
                .contains("3 attempts remaining")
        );
        assert!(
            AppError::Locked { remaining_minutes: 29 }
                .public_message()
                .contains("29 minutes")
        );
    }
}
