//! Domain models for the server.
//!
//! These are validated domain objects; the `db` layer converts raw rows into
//! them and rejects anything that does not validate.

pub mod admin_user;
pub mod curriculum;
pub mod learner;
pub mod session;

pub use admin_user::{AdminUser, NewAdminUser};
pub use curriculum::{
    Curriculum, CurriculumSummary, Feedback, FeedbackEntry, NewCurriculum, NewFeedback, NewNote,
    Note, TaskProgress,
};
pub use learner::{
    DeletedLearnerData, Learner, LearnerOverview, NewLearner, NewVerificationTicket,
    PlatformStats, TopicCount, VerificationTicket,
};
pub use session::{AdminSession, ClientContext, CurrentLearner, NewAdminSession, SessionToken, keys};
