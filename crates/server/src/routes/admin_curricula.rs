//! Admin views over every learner's curricula and feedback.

use axum::{Json, Router, extract::State, routing::get};
use chrono::{DateTime, Utc};
use serde::Serialize;

use studyforge_core::{CurriculumId, Difficulty, DifficultyRating, FeedbackId, Permission};

use crate::error::AppError;
use crate::middleware::RequireAdmin;
use crate::models::{CurriculumSummary, FeedbackEntry};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/admin/curricula", get(list_curricula))
        .route("/api/admin/feedback", get(list_feedback))
}

#[derive(Debug, Serialize)]
pub struct CurriculumRow {
    pub id: CurriculumId,
    pub owner: String,
    pub topic: String,
    pub difficulty: Difficulty,
    pub duration: String,
    pub total_tasks: i32,
    pub completed_tasks: i32,
    pub progress_percentage: f64,
    pub feedback_count: i64,
    pub notes_count: i64,
    /// Mean star rating, absent until someone rates the curriculum.
    pub average_rating: Option<f64>,
    pub created_at: DateTime<Utc>,
}

impl From<&CurriculumSummary> for CurriculumRow {
    fn from(summary: &CurriculumSummary) -> Self {
        let c = &summary.curriculum;
        Self {
            id: c.id,
            owner: summary.owner.clone(),
            topic: c.topic.clone(),
            difficulty: c.difficulty,
            duration: c.duration.clone(),
            total_tasks: c.total_tasks,
            completed_tasks: c.completed_tasks,
            progress_percentage: c.percentage(),
            feedback_count: summary.feedback_count,
            notes_count: summary.notes_count,
            average_rating: summary.average_rating,
            created_at: c.created_at,
        }
    }
}

/// Every curriculum with engagement counters, newest first.
///
/// # Errors
///
/// `Forbidden` without `manage_curricula`; storage errors.
pub async fn list_curricula(
    RequireAdmin(ctx): RequireAdmin,
    State(state): State<AppState>,
) -> Result<Json<Vec<CurriculumRow>>, AppError> {
    ctx.require(Permission::ManageCurricula)?;
    let rows = state.stores().curricula.overview().await?;
    Ok(Json(rows.iter().map(CurriculumRow::from).collect()))
}

#[derive(Debug, Serialize)]
pub struct FeedbackRow {
    pub id: FeedbackId,
    pub curriculum_id: CurriculumId,
    pub topic: String,
    /// `None` when the learner asked to stay anonymous.
    pub learner: Option<String>,
    pub rating: i32,
    pub difficulty_rating: DifficultyRating,
    pub feedback_text: String,
    pub would_recommend: bool,
    pub created_at: DateTime<Utc>,
}

impl From<&FeedbackEntry> for FeedbackRow {
    fn from(entry: &FeedbackEntry) -> Self {
        let f = &entry.feedback;
        Self {
            id: f.id,
            curriculum_id: f.curriculum_id,
            topic: entry.topic.clone(),
            learner: (!f.is_anonymous).then(|| entry.learner_username.clone()),
            rating: f.rating.get(),
            difficulty_rating: f.difficulty_rating,
            feedback_text: f.feedback_text.clone(),
            would_recommend: f.would_recommend,
            created_at: f.created_at,
        }
    }
}

/// Every feedback entry, newest first.
///
/// # Errors
///
/// `Forbidden` without `manage_curricula`; storage errors.
pub async fn list_feedback(
    RequireAdmin(ctx): RequireAdmin,
    State(state): State<AppState>,
) -> Result<Json<Vec<FeedbackRow>>, AppError> {
    ctx.require(Permission::ManageCurricula)?;
    let entries = state.stores().curricula.feedback_entries().await?;
    Ok(Json(entries.iter().map(FeedbackRow::from).collect()))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use studyforge_core::{LearnerId, Rating};

    use super::*;
    use crate::models::Feedback;

    fn entry(is_anonymous: bool) -> FeedbackEntry {
        FeedbackEntry {
            feedback: Feedback {
                id: FeedbackId::new(1),
                learner_id: LearnerId::new(2),
                curriculum_id: CurriculumId::new(3),
                rating: Rating::new(5).unwrap(),
                difficulty_rating: DifficultyRating::Hard,
                feedback_text: "dense but good".to_string(),
                would_recommend: true,
                is_anonymous,
                created_at: Utc::now(),
            },
            learner_username: "ann".to_string(),
            topic: "Rust".to_string(),
        }
    }

    #[test]
    fn test_anonymous_feedback_hides_learner() {
        assert_eq!(FeedbackRow::from(&entry(false)).learner.as_deref(), Some("ann"));
        assert_eq!(FeedbackRow::from(&entry(true)).learner, None);
    }
}
