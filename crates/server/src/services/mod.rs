//! Business logic services.
//!
//! # Services
//!
//! - `accounts` - Learner registration and verification mail
//! - `auth` - Unified admin/learner login with admin lockout
//! - `curriculum` - Outline generation and task progress
//! - `email` - Verification mail delivery via SMTP
//! - `sessions` - Server-side admin session registry
//! - `verification` - E-mail verification tickets

pub mod accounts;
pub mod auth;
pub mod curriculum;
pub mod email;
pub mod sessions;
pub mod verification;

pub use accounts::{AccountService, Registration, RegistrationRequest};
pub use auth::{AuthError, LoginOutcome, LoginRequest, LoginResolver, LoginWarning};
pub use curriculum::{CurriculumError, CurriculumRequest, CurriculumService};
pub use email::{EmailError, EmailService, VerificationMailer};
pub use sessions::{IssuedSession, SessionError, SessionRegistry, SessionValidation};
pub use verification::{VerificationError, VerificationService, VerifyOutcome};
