//! Admin endpoints: identity, learner management, analytics, admin accounts.

use axum::{
    Json, Router,
    extract::{Path, State},
    routing::{get, post},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use studyforge_core::{AdminUserId, LearnerId, Permission};

use crate::error::AppError;
use crate::middleware::RequireAdmin;
use crate::models::{AdminUser, DeletedLearnerData, LearnerOverview, PlatformStats};
use crate::routes::JsonBody;
use crate::routes::auth::{AdminView, LearnerView};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/admin/me", get(me))
        .route("/api/admin/stats", get(stats))
        .route("/api/admin/learners", get(list_learners))
        .route("/api/admin/learners/toggle", post(toggle_learner))
        .route("/api/admin/learners/delete", post(delete_learner))
        .route("/api/admin/admins", get(list_admins))
        .route("/api/admin/admins/{id}/unlock", post(unlock_admin))
}

/// The current admin with effective permissions and session expiry.
pub async fn me(RequireAdmin(ctx): RequireAdmin) -> Json<Value> {
    Json(json!({
        "success": true,
        "admin": AdminView::from(&ctx.admin),
        "session": {
            "created_at": ctx.session.created_at,
            "expires_at": ctx.session.expires_at,
        },
    }))
}

/// Platform counters.
///
/// # Errors
///
/// `Forbidden` without `view_analytics`; storage errors.
pub async fn stats(
    RequireAdmin(ctx): RequireAdmin,
    State(state): State<AppState>,
) -> Result<Json<PlatformStats>, AppError> {
    ctx.require(Permission::ViewAnalytics)?;
    Ok(Json(state.stores().curricula.stats().await?))
}

#[derive(Debug, Serialize)]
pub struct LearnerRow {
    #[serde(flatten)]
    pub learner: LearnerView,
    pub is_active: bool,
    pub verified: bool,
    pub date_joined: DateTime<Utc>,
    pub curriculum_count: i64,
}

impl From<&LearnerOverview> for LearnerRow {
    fn from(overview: &LearnerOverview) -> Self {
        Self {
            learner: LearnerView::from(&overview.learner),
            is_active: overview.learner.is_active,
            verified: overview.verified,
            date_joined: overview.learner.date_joined,
            curriculum_count: overview.curriculum_count,
        }
    }
}

/// Every learner, newest first.
///
/// # Errors
///
/// `Forbidden` without `manage_users`; storage errors.
pub async fn list_learners(
    RequireAdmin(ctx): RequireAdmin,
    State(state): State<AppState>,
) -> Result<Json<Vec<LearnerRow>>, AppError> {
    ctx.require(Permission::ManageUsers)?;
    let learners = state.stores().learners.list().await?;
    Ok(Json(learners.iter().map(LearnerRow::from).collect()))
}

#[derive(Debug, Deserialize)]
pub struct ToggleRequest {
    pub learner_id: LearnerId,
}

/// Flip a learner's active flag.
///
/// # Errors
///
/// `Forbidden` without `manage_users`; `NotFound` for unknown learners.
pub async fn toggle_learner(
    RequireAdmin(ctx): RequireAdmin,
    State(state): State<AppState>,
    JsonBody(request): JsonBody<ToggleRequest>,
) -> Result<Json<Value>, AppError> {
    ctx.require(Permission::ManageUsers)?;
    let is_active = state
        .stores()
        .learners
        .toggle_active(request.learner_id)
        .await
        .map_err(|e| learner_not_found(e.into()))?;

    tracing::info!(
        admin_id = %ctx.admin.id,
        learner_id = %request.learner_id,
        is_active,
        "Learner active flag toggled"
    );
    Ok(Json(json!({
        "success": true,
        "is_active": is_active,
        "message": if is_active { "User activated successfully" } else { "User deactivated successfully" },
    })))
}

#[derive(Debug, Deserialize)]
pub struct DeleteRequest {
    pub learner_id: LearnerId,
    #[serde(default)]
    pub confirm_username: String,
}

#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    pub success: bool,
    pub message: String,
    pub deleted_data: DeletedLearnerData,
}

/// Permanently delete a learner and everything they own.
///
/// `confirm_username` must repeat the learner's username exactly. Learners
/// whose e-mail also belongs to an admin are refused.
///
/// # Errors
///
/// `Forbidden` without `delete_users`, `NotFound` for unknown learners,
/// `Conflict` when the confirmation does not match.
pub async fn delete_learner(
    RequireAdmin(ctx): RequireAdmin,
    State(state): State<AppState>,
    JsonBody(request): JsonBody<DeleteRequest>,
) -> Result<Json<DeleteResponse>, AppError> {
    ctx.require(Permission::DeleteUsers)?;
    let stores = state.stores();

    let learner = stores
        .learners
        .find_by_id(request.learner_id)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found.".to_string()))?;

    if request.confirm_username != learner.username.as_str() {
        tracing::warn!(
            admin_id = %ctx.admin.id,
            learner_id = %learner.id,
            "Learner deletion refused: confirmation mismatch"
        );
        return Err(AppError::Conflict(
            "Username confirmation does not match. Deletion cancelled for security.".to_string(),
        ));
    }

    if stores.admins.email_exists(&learner.email).await? {
        return Err(AppError::BadRequest(
            "Cannot delete admin users through this interface.".to_string(),
        ));
    }

    let deleted_data = stores
        .learners
        .delete(learner.id)
        .await
        .map_err(|e| learner_not_found(e.into()))?;

    tracing::info!(
        admin_id = %ctx.admin.id,
        learner_id = %learner.id,
        curricula = deleted_data.curricula,
        progress_entries = deleted_data.progress_entries,
        notes = deleted_data.notes,
        feedback = deleted_data.feedback,
        "Learner deleted"
    );
    Ok(Json(DeleteResponse {
        success: true,
        message: format!(
            "User \"{}\" ({}) has been permanently deleted.",
            learner.username, learner.email
        ),
        deleted_data,
    }))
}

#[derive(Debug, Serialize)]
pub struct AdminRow {
    #[serde(flatten)]
    pub admin: AdminView,
    pub is_active: bool,
    pub failed_login_attempts: i32,
    pub locked_until: Option<DateTime<Utc>>,
    pub is_locked: bool,
    pub last_login: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl AdminRow {
    fn new(admin: &AdminUser, is_locked: bool) -> Self {
        Self {
            admin: AdminView::from(admin),
            is_active: admin.is_active,
            failed_login_attempts: admin.lockout.failed_attempts,
            locked_until: admin.lockout.locked_until,
            is_locked,
            last_login: admin.lockout.last_login,
            created_at: admin.created_at,
        }
    }
}

/// Every admin with lockout state, ordered by username.
///
/// # Errors
///
/// `Forbidden` without `manage_admins`; storage errors.
pub async fn list_admins(
    RequireAdmin(ctx): RequireAdmin,
    State(state): State<AppState>,
) -> Result<Json<Vec<AdminRow>>, AppError> {
    ctx.require(Permission::ManageAdmins)?;
    let policy = state.resolver().policy();
    let now = Utc::now();
    let admins = state.stores().admins.list().await?;
    Ok(Json(
        admins
            .iter()
            .map(|a| AdminRow::new(a, policy.evaluate(&a.lockout, now).is_locked()))
            .collect(),
    ))
}

/// Clear an admin's lockout and failure counter.
///
/// # Errors
///
/// `Forbidden` without `manage_admins`; `NotFound` for unknown admins.
pub async fn unlock_admin(
    RequireAdmin(ctx): RequireAdmin,
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<Json<Value>, AppError> {
    ctx.require(Permission::ManageAdmins)?;
    let target = AdminUserId::new(id);
    state.stores().admins.unlock(target).await.map_err(|e| match AppError::from(e) {
        AppError::NotFound(_) => AppError::NotFound("Admin not found.".to_string()),
        other => other,
    })?;

    tracing::info!(admin_id = %ctx.admin.id, target_admin_id = %target, "Admin unlocked");
    Ok(Json(json!({
        "success": true,
        "message": "Admin account unlocked.",
    })))
}

fn learner_not_found(e: AppError) -> AppError {
    match e {
        AppError::NotFound(_) => AppError::NotFound("User not found.".to_string()),
        other => other,
    }
}
