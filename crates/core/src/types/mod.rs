//! Core types for Studyforge.

pub mod curriculum;
pub mod email;
pub mod feedback;
pub mod id;
pub mod permission;
pub mod username;

pub use curriculum::{
    CurriculumOutline, Difficulty, OutlineError, extract_outline_json, progress_percentage,
};
pub use email::{Email, EmailError};
pub use feedback::{DifficultyRating, Rating, RatingError};
pub use id::*;
pub use permission::{AdminPermissions, Permission};
pub use username::{Username, UsernameError};
