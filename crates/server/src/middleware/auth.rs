//! Authentication extractors.
//!
//! [`RequireAdmin`] resolves the admin session token stored in the cookie
//! session through the [`SessionRegistry`](crate::services::SessionRegistry)
//! on every request, and hands the handler an explicit [`AdminContext`].
//! [`RequireLearner`] does the same for learners, whose login state lives in
//! the cookie session only.

use axum::{
    extract::FromRequestParts,
    http::{StatusCode, request::Parts},
    response::{IntoResponse, Redirect, Response},
};
use chrono::Utc;
use serde_json::json;
use tower_sessions::Session;

use studyforge_core::Permission;

use crate::db::LearnerStore as _;
use crate::error::{AppError, set_sentry_user};
use crate::models::{AdminSession, AdminUser, CurrentLearner, SessionToken, keys};
use crate::services::sessions::SessionValidation;
use crate::state::AppState;

/// A validated admin session, passed explicitly to handlers.
#[derive(Debug, Clone)]
pub struct AdminContext {
    pub admin: AdminUser,
    pub session: AdminSession,
}

impl AdminContext {
    /// Fail with `Forbidden` unless the admin effectively holds `permission`.
    ///
    /// # Errors
    ///
    /// `AppError::Forbidden` when the permission is missing.
    pub fn require(&self, permission: Permission) -> Result<(), AppError> {
        if self.admin.permissions.allows(permission) {
            Ok(())
        } else {
            tracing::warn!(
                admin_id = %self.admin.id,
                permission = %permission,
                "Admin lacks permission"
            );
            Err(AppError::Forbidden(format!(
                "You do not have permission to {}",
                describe(permission)
            )))
        }
    }
}

const fn describe(permission: Permission) -> &'static str {
    match permission {
        Permission::ManageUsers => "manage users",
        Permission::DeleteUsers => "delete users",
        Permission::ManageCurricula => "manage curricula",
        Permission::ViewAnalytics => "view analytics",
        Permission::ManageAdmins => "manage admins",
    }
}

/// Extractor that requires a valid admin session.
///
/// # Example
///
/// ```rust,ignore
/// async fn handler(RequireAdmin(ctx): RequireAdmin) -> Result<Json<Value>, AppError> {
///     ctx.require(Permission::ViewAnalytics)?;
///     // ...
/// }
/// ```
pub struct RequireAdmin(pub AdminContext);

/// Rejection from the authentication extractors.
#[derive(Debug)]
pub enum AuthRejection {
    /// Redirect to login page (for HTML requests).
    RedirectToLogin,
    /// Unauthorized response (for API requests).
    Unauthorized,
    /// The session registry cannot be reached.
    Unavailable,
}

impl AuthRejection {
    fn for_path(parts: &Parts) -> Self {
        if parts.uri.path().starts_with("/api/") {
            Self::Unauthorized
        } else {
            Self::RedirectToLogin
        }
    }
}

impl IntoResponse for AuthRejection {
    fn into_response(self) -> Response {
        match self {
            Self::RedirectToLogin => Redirect::to("/login").into_response(),
            Self::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                axum::Json(json!({
                    "success": false,
                    "error": "Session expired or invalid. Please log in again.",
                })),
            )
                .into_response(),
            Self::Unavailable => {
                AppError::ServiceUnavailable("session registry unreachable".to_string())
                    .into_response()
            }
        }
    }
}

fn cookie_session(parts: &Parts) -> Result<Session, AuthRejection> {
    parts
        .extensions
        .get::<Session>()
        .cloned()
        .ok_or(AuthRejection::Unauthorized)
}

impl FromRequestParts<AppState> for RequireAdmin {
    type Rejection = AuthRejection;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let session = cookie_session(parts)?;

        let raw: String = session
            .get(keys::ADMIN_SESSION_TOKEN)
            .await
            .ok()
            .flatten()
            .ok_or_else(|| AuthRejection::for_path(parts))?;

        let validation = state
            .sessions()
            .validate(&SessionToken::from_raw(raw), Utc::now())
            .await
            .map_err(|_| AuthRejection::Unavailable)?;

        match validation {
            SessionValidation::Valid { admin, session: admin_session } => {
                set_sentry_user(&admin.id, Some(admin.username.as_str()));
                Ok(Self(AdminContext {
                    admin,
                    session: admin_session,
                }))
            }
            SessionValidation::Invalid(reason) => {
                tracing::info!(?reason, "Admin session rejected");
                clear_admin_session(&session).await;
                Err(AuthRejection::for_path(parts))
            }
        }
    }
}

/// Extractor that requires a logged-in, still active learner.
pub struct RequireLearner(pub CurrentLearner);

impl FromRequestParts<AppState> for RequireLearner {
    type Rejection = AuthRejection;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let session = cookie_session(parts)?;

        let current: CurrentLearner = session
            .get(keys::CURRENT_LEARNER)
            .await
            .ok()
            .flatten()
            .ok_or_else(|| AuthRejection::for_path(parts))?;

        match state.stores().learners.find_by_id(current.id).await {
            Ok(Some(learner)) if learner.is_active => Ok(Self(current)),
            Ok(_) => {
                tracing::info!(learner_id = %current.id, "Learner session no longer valid");
                if let Err(e) = session.remove::<CurrentLearner>(keys::CURRENT_LEARNER).await {
                    tracing::warn!(error = %e, "Failed to clear stale learner session");
                }
                Err(AuthRejection::for_path(parts))
            }
            Err(e) if e.is_unavailable() => Err(AuthRejection::Unavailable),
            Err(e) => {
                tracing::error!(error = %e, "Learner lookup failed, failing closed");
                Err(AuthRejection::for_path(parts))
            }
        }
    }
}

/// Store a freshly issued admin session token in the cookie session.
///
/// The session id is cycled first so a pre-login cookie cannot be fixated.
///
/// # Errors
///
/// Returns an error if the session cannot be modified.
pub async fn set_admin_session(
    session: &Session,
    token: &SessionToken,
    admin: &AdminUser,
) -> Result<(), tower_sessions::session::Error> {
    session.cycle_id().await?;
    session
        .insert(keys::ADMIN_SESSION_TOKEN, token.expose())
        .await?;
    session.insert(keys::ADMIN_USER_ID, admin.id).await
}

/// Store the learner identity in the cookie session.
///
/// # Errors
///
/// Returns an error if the session cannot be modified.
pub async fn set_current_learner(
    session: &Session,
    learner: &CurrentLearner,
) -> Result<(), tower_sessions::session::Error> {
    session.cycle_id().await?;
    session.insert(keys::CURRENT_LEARNER, learner).await
}

/// Remove admin keys from the cookie session. Failures are logged.
pub async fn clear_admin_session(session: &Session) {
    if let Err(e) = session.remove::<String>(keys::ADMIN_SESSION_TOKEN).await {
        tracing::warn!(error = %e, "Failed to clear admin session token");
    }
    if let Err(e) = session
        .remove::<studyforge_core::AdminUserId>(keys::ADMIN_USER_ID)
        .await
    {
        tracing::warn!(error = %e, "Failed to clear admin user id");
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::Utc;
    use secrecy::SecretString;
    use studyforge_core::{AdminPermissions, AdminUserId, Email, Username};

    use super::*;
    use crate::services::auth::lockout::LockoutState;

    fn context(permissions: AdminPermissions) -> AdminContext {
        let now = Utc::now();
        AdminContext {
            admin: AdminUser {
                id: AdminUserId::new(1),
                username: Username::parse("root").unwrap(),
                email: Email::parse("root@example.com").unwrap(),
                full_name: "Root".to_string(),
                password_hash: SecretString::from("hash"),
                is_active: true,
                permissions,
                lockout: LockoutState::default(),
                created_at: now,
            },
            session: AdminSession {
                id: studyforge_core::AdminSessionId::new(1),
                admin_user_id: AdminUserId::new(1),
                token_hash: "digest".to_string(),
                created_at: now,
                expires_at: now + chrono::Duration::hours(8),
                ip_address: std::net::IpAddr::from([127, 0, 0, 1]),
                user_agent: String::new(),
                is_active: true,
            },
        }
    }

    #[test]
    fn test_require_checks_effective_permission() {
        let ctx = context(AdminPermissions::default());
        assert!(ctx.require(Permission::ManageUsers).is_ok());
        assert!(matches!(
            ctx.require(Permission::DeleteUsers),
            Err(AppError::Forbidden(_))
        ));

        let root = context(AdminPermissions {
            manage_admins: true,
            delete_users: false,
            ..AdminPermissions::default()
        });
        assert!(root.require(Permission::DeleteUsers).is_ok());
    }

    #[test]
    fn test_rejection_statuses() {
        assert_eq!(
            AuthRejection::Unauthorized.into_response().status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            AuthRejection::Unavailable.into_response().status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            AuthRejection::RedirectToLogin.into_response().status(),
            StatusCode::SEE_OTHER
        );
    }
}
