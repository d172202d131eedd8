//! Login, logout, registration and e-mail verification.

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tower_sessions::Session;
use uuid::Uuid;

use studyforge_core::{AdminUserId, LearnerId, Permission};

use crate::error::{AppError, clear_sentry_user};
use crate::middleware::{
    RateLimiterLayer, clear_admin_session, set_admin_session, set_current_learner,
};
use crate::models::{AdminUser, ClientContext, CurrentLearner, Learner, SessionToken, keys};
use crate::routes::JsonBody;
use crate::services::accounts::RegistrationRequest;
use crate::services::auth::{LoginOutcome, LoginRequest, LoginWarning};
use crate::services::verification::VerifyOutcome;
use crate::state::AppState;

pub fn router(login_limiter: Option<RateLimiterLayer>) -> Router<AppState> {
    let login_route = Router::new().route("/api/auth/login", post(login));
    let login_route = match login_limiter {
        Some(limiter) => login_route.layer(limiter),
        None => login_route,
    };

    Router::new()
        .merge(login_route)
        .route("/api/auth/logout", post(logout))
        .route("/api/auth/register", post(register))
        .route("/api/auth/verify/{token}", get(verify_email))
        .route("/api/auth/verify/resend", post(resend_verification))
}

#[derive(Debug, Serialize)]
pub struct AdminView {
    pub id: AdminUserId,
    pub username: String,
    pub email: String,
    pub full_name: String,
    pub permissions: Vec<Permission>,
}

impl From<&AdminUser> for AdminView {
    fn from(admin: &AdminUser) -> Self {
        Self {
            id: admin.id,
            username: admin.username.to_string(),
            email: admin.email.to_string(),
            full_name: admin.full_name.clone(),
            permissions: admin.permissions.effective(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct LearnerView {
    pub id: LearnerId,
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
}

impl From<&Learner> for LearnerView {
    fn from(learner: &Learner) -> Self {
        Self {
            id: learner.id,
            username: learner.username.to_string(),
            email: learner.email.to_string(),
            first_name: learner.first_name.clone(),
            last_name: learner.last_name.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(tag = "user_type", rename_all = "snake_case")]
pub enum LoginResponse {
    Admin {
        success: bool,
        admin: AdminView,
        expires_at: DateTime<Utc>,
    },
    Learner {
        success: bool,
        learner: LearnerView,
        #[serde(skip_serializing_if = "Option::is_none")]
        warning: Option<&'static str>,
    },
}

fn session_error(e: &tower_sessions::session::Error) -> AppError {
    AppError::Internal(format!("cookie session: {e}"))
}

/// Rounded up, so a lock with seconds left still reports one minute.
fn remaining_minutes(remaining: chrono::Duration) -> i64 {
    ((remaining.num_seconds() + 59) / 60).max(1)
}

/// Unified login for admins and learners.
///
/// # Errors
///
/// `InvalidCredentials`, `Locked`, `Unverified` or `Inactive` for refused
/// logins; storage errors otherwise.
pub async fn login(
    State(state): State<AppState>,
    session: Session,
    client: ClientContext,
    JsonBody(request): JsonBody<LoginRequest>,
) -> Result<Json<LoginResponse>, AppError> {
    let outcome = state
        .resolver()
        .resolve(&request, &client, Utc::now())
        .await?;

    match outcome {
        LoginOutcome::AdminAuthenticated {
            admin,
            session: issued,
        } => {
            // A previous admin login on this cookie is revoked, not orphaned.
            end_admin_session(&state, &session).await;
            if let Err(e) = session.remove::<CurrentLearner>(keys::CURRENT_LEARNER).await {
                tracing::warn!(error = %e, "Failed to clear learner session on admin login");
            }
            set_admin_session(&session, &issued.token, &admin)
                .await
                .map_err(|e| session_error(&e))?;
            Ok(Json(LoginResponse::Admin {
                success: true,
                admin: AdminView::from(admin.as_ref()),
                expires_at: issued.session.expires_at,
            }))
        }
        LoginOutcome::AdminLockedOut { remaining } => Err(AppError::Locked {
            remaining_minutes: remaining_minutes(remaining),
        }),
        LoginOutcome::AdminRejected { remaining_attempts } => Err(AppError::InvalidCredentials {
            remaining_attempts: Some(remaining_attempts),
        }),
        LoginOutcome::LearnerAuthenticated { learner, warning } => {
            end_admin_session(&state, &session).await;
            set_current_learner(
                &session,
                &CurrentLearner {
                    id: learner.id,
                    username: learner.username.clone(),
                },
            )
            .await
            .map_err(|e| session_error(&e))?;
            Ok(Json(LoginResponse::Learner {
                success: true,
                learner: LearnerView::from(learner.as_ref()),
                warning: warning.map(|w| match w {
                    LoginWarning::UnverifiedEmail => "email_unverified",
                }),
            }))
        }
        LoginOutcome::LearnerUnverified { ticket_expired } => {
            Err(AppError::Unverified { ticket_expired })
        }
        LoginOutcome::LearnerInactive => Err(AppError::Inactive),
        LoginOutcome::Rejected => Err(AppError::InvalidCredentials {
            remaining_attempts: None,
        }),
    }
}

/// Revoke any admin session held by this cookie session. Failures are logged.
async fn end_admin_session(state: &AppState, session: &Session) -> Option<AppError> {
    let raw = session
        .get::<String>(keys::ADMIN_SESSION_TOKEN)
        .await
        .ok()
        .flatten()?;
    clear_admin_session(session).await;
    match state.sessions().revoke(&SessionToken::from_raw(raw)).await {
        Ok(()) => None,
        Err(e) => {
            tracing::error!(error = %e, "Failed to revoke admin session");
            Some(AppError::from(e))
        }
    }
}

/// Log out. The cookie session is always cleared; a failed revocation is
/// still reported.
///
/// # Errors
///
/// Storage errors from revoking the admin session.
pub async fn logout(
    State(state): State<AppState>,
    session: Session,
) -> Result<Json<Value>, AppError> {
    let revoke_error = end_admin_session(&state, &session).await;
    if let Err(e) = session.flush().await {
        tracing::warn!(error = %e, "Failed to flush cookie session");
    }
    clear_sentry_user();

    match revoke_error {
        Some(e) => Err(e),
        None => Ok(Json(json!({
            "success": true,
            "message": "You have been logged out.",
        }))),
    }
}

/// Register a learner.
///
/// # Errors
///
/// `BadRequest` for invalid input, `Conflict` for a taken username or e-mail.
pub async fn register(
    State(state): State<AppState>,
    JsonBody(request): JsonBody<RegistrationRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let registration = state.accounts().register(&request, Utc::now()).await?;

    let message = match (
        registration.requires_verification,
        registration.verification_email_sent,
    ) {
        (false, _) => "Registration successful. You can now log in.",
        (true, true) => "Registration successful. Please check your email to verify your account.",
        (true, false) => {
            "Registration successful, but the verification email could not be sent. \
             Please request a new verification link."
        }
    };

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "message": message,
            "requires_verification": registration.requires_verification,
            "verification_email_sent": registration.verification_email_sent,
            "learner": LearnerView::from(&registration.learner),
        })),
    ))
}

/// Redeem a verification link.
///
/// # Errors
///
/// `NotFound` for unknown or malformed tokens, `BadRequest` when expired.
pub async fn verify_email(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> Result<Json<Value>, AppError> {
    let token = Uuid::parse_str(&token)
        .map_err(|_| AppError::NotFound("Invalid verification link".to_string()))?;

    let outcome = state.verification().verify_email(token, Utc::now()).await?;
    let (message, already_verified) = match outcome {
        VerifyOutcome::Verified => ("Email verified successfully. You can now log in.", false),
        VerifyOutcome::AlreadyVerified => ("Email already verified. You can log in.", true),
    };

    Ok(Json(json!({
        "success": true,
        "message": message,
        "already_verified": already_verified,
    })))
}

#[derive(Debug, Deserialize)]
pub struct ResendRequest {
    pub email: String,
}

/// Re-issue a verification link.
///
/// The answer is the same whether or not a matching unverified account exists.
///
/// # Errors
///
/// `UpstreamUnavailable` when the mail cannot be sent.
pub async fn resend_verification(
    State(state): State<AppState>,
    JsonBody(request): JsonBody<ResendRequest>,
) -> Result<Json<Value>, AppError> {
    let sent = state
        .accounts()
        .resend_verification(&request.email, Utc::now())
        .await?;
    tracing::debug!(sent, "Verification resend handled");

    Ok(Json(json!({
        "success": true,
        "message": "If an unverified account exists for that address, a new verification link has been sent.",
    })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remaining_minutes_rounds_up() {
        assert_eq!(remaining_minutes(chrono::Duration::minutes(30)), 30);
        assert_eq!(remaining_minutes(chrono::Duration::seconds(61)), 2);
        assert_eq!(remaining_minutes(chrono::Duration::seconds(1)), 1);
        assert_eq!(remaining_minutes(chrono::Duration::zero()), 1);
    }
}
