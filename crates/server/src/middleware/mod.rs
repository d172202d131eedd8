//! HTTP middleware and extractors.
//!
//! # Middleware Order (outermost first)
//!
//! 1. Sentry layers (capture errors)
//! 2. `TraceLayer` (request tracing)
//! 3. Request ID (add unique ID to each request)
//! 4. Security headers
//! 5. Session layer (tower-sessions)
//! 6. Rate limiting on the login route (governor)
//!
//! Authentication is enforced per handler by the [`auth`] extractors.

pub mod auth;
pub mod client;
pub mod rate_limit;
pub mod request_id;
pub mod security_headers;
pub mod session;

pub use auth::{
    AdminContext, AuthRejection, RequireAdmin, RequireLearner, clear_admin_session,
    set_admin_session, set_current_learner,
};
pub use rate_limit::{RateLimiterLayer, login_rate_limiter};
pub use request_id::{RequestId, request_id_middleware};
pub use security_headers::security_headers_middleware;
pub use session::{create_session_layer, postgres_session_store};
