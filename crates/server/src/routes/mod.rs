//! HTTP route handlers.
//!
//! # Route Structure
//!
//! ```text
//! GET  /health                          - Liveness
//! GET  /health/ready                    - Session store readiness
//!
//! # Auth (admins and learners share one login)
//! POST /api/auth/login                  - Unified login
//! POST /api/auth/logout                 - Revoke admin session, clear cookie session
//! POST /api/auth/register               - Learner registration
//! GET  /api/auth/verify/{token}         - Redeem a verification link
//! POST /api/auth/verify/resend          - Re-issue a verification link
//!
//! # Admin (session-guarded, permission-checked)
//! GET  /api/admin/me                    - Current admin and effective permissions
//! GET  /api/admin/stats                 - Platform counters (view_analytics)
//! GET  /api/admin/learners              - List learners (manage_users)
//! POST /api/admin/learners/toggle       - Toggle learner active (manage_users)
//! POST /api/admin/learners/delete       - Delete learner (delete_users)
//! GET  /api/admin/admins                - List admins with lockout state (manage_admins)
//! POST /api/admin/admins/{id}/unlock    - Clear an admin lockout (manage_admins)
//! GET  /api/admin/curricula             - Curricula with engagement counters (manage_curricula)
//! GET  /api/admin/feedback              - Every feedback entry (manage_curricula)
//!
//! # Curricula (learner login required)
//! GET  /api/curricula                   - The learner's curricula
//! POST /api/curricula                   - Generate a curriculum
//! POST /api/progress                    - Record task completion
//! GET  /api/curricula/{id}/progress     - Progress and normalized weeks
//! POST /api/notes                       - Add a note
//! GET  /api/curricula/{id}/notes/{week} - Notes on one week
//! POST /api/feedback                    - Rate a curriculum (one rating per learner)
//! ```

pub mod admin_curricula;
pub mod admin_users;
pub mod auth;
pub mod curricula;
pub mod health;

use axum::{Router, extract::FromRequest};

use crate::error::AppError;
use crate::middleware::RateLimiterLayer;
use crate::state::AppState;

/// JSON body extractor whose rejections are `AppError::BadRequest`.
#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct JsonBody<T>(pub T);

/// Build the complete router. `login_limiter` wraps the login route only.
pub fn routes(login_limiter: Option<RateLimiterLayer>) -> Router<AppState> {
    Router::new()
        .merge(health::router())
        .merge(auth::router(login_limiter))
        .merge(admin_users::router())
        .merge(admin_curricula::router())
        .merge(curricula::router())
}
