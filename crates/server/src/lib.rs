//! Studyforge server library.
//!
//! Learner and admin authentication behind one login, server-side admin
//! sessions with absolute expiry, per-admin lockout, permission-guarded admin
//! endpoints and learner curricula.
//!
//! # Security
//!
//! - Admin session tokens are stored only as SHA-256 digests.
//! - Every admin request re-validates its session against the registry.
//! - Admin accounts lock for 30 minutes after 5 consecutive failures.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod state;

use axum::Router;
use tower_sessions::SessionStore;

use crate::middleware::{
    RateLimiterLayer, create_session_layer, request_id_middleware, security_headers_middleware,
};
use crate::state::AppState;

/// The application router with sessions and security headers applied.
///
/// Tracing and Sentry layers are added by the binary.
pub fn app<S>(state: AppState, session_store: S, login_limiter: Option<RateLimiterLayer>) -> Router
where
    S: SessionStore + Clone,
{
    let session_layer = create_session_layer(session_store, state.settings());

    routes::routes(login_limiter)
        .layer(session_layer)
        .layer(axum::middleware::from_fn(security_headers_middleware))
        .layer(axum::middleware::from_fn(request_id_middleware))
        .with_state(state)
}
