//! Curricula, per-task progress, notes and feedback.

use chrono::{DateTime, Utc};
use serde::Serialize;

use studyforge_core::{
    CurriculumId, CurriculumOutline, Difficulty, DifficultyRating, FeedbackId, LearnerId, NoteId,
    Rating, progress_percentage,
};

/// A generated curriculum owned by a learner.
#[derive(Debug, Clone)]
pub struct Curriculum {
    pub id: CurriculumId,
    pub learner_id: LearnerId,
    pub topic: String,
    pub difficulty: Difficulty,
    /// Free-form duration label, e.g. "4 weeks".
    pub duration: String,
    pub content: CurriculumOutline,
    pub total_tasks: i32,
    pub completed_tasks: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Curriculum {
    #[must_use]
    pub fn percentage(&self) -> f64 {
        progress_percentage(
            usize::try_from(self.completed_tasks).unwrap_or(0),
            usize::try_from(self.total_tasks).unwrap_or(0),
        )
    }
}

#[derive(Debug, Clone)]
pub struct NewCurriculum {
    pub learner_id: LearnerId,
    pub topic: String,
    pub difficulty: Difficulty,
    pub duration: String,
    pub content: CurriculumOutline,
}

/// Completion state of one `(week, task)` slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskProgress {
    pub week_number: i32,
    pub task_index: i32,
    pub completed: bool,
    pub completed_at: Option<DateTime<Utc>>,
}

/// A learner's note on a curriculum, optionally pinned to a week or task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Note {
    pub id: NoteId,
    pub learner_id: LearnerId,
    pub curriculum_id: CurriculumId,
    pub week_number: Option<i32>,
    pub task_index: Option<i32>,
    pub title: String,
    pub content: String,
    pub is_public: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewNote {
    pub learner_id: LearnerId,
    pub curriculum_id: CurriculumId,
    pub week_number: Option<i32>,
    pub task_index: Option<i32>,
    pub title: String,
    pub content: String,
    pub is_public: bool,
}

/// One learner's rating of one curriculum. Resubmitting replaces it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Feedback {
    pub id: FeedbackId,
    pub learner_id: LearnerId,
    pub curriculum_id: CurriculumId,
    pub rating: Rating,
    pub difficulty_rating: DifficultyRating,
    pub feedback_text: String,
    pub would_recommend: bool,
    pub is_anonymous: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewFeedback {
    pub learner_id: LearnerId,
    pub curriculum_id: CurriculumId,
    pub rating: Rating,
    pub difficulty_rating: DifficultyRating,
    pub feedback_text: String,
    pub would_recommend: bool,
    pub is_anonymous: bool,
}

/// A curriculum row in the admin listing.
#[derive(Debug, Clone)]
pub struct CurriculumSummary {
    pub curriculum: Curriculum,
    pub owner: String,
    pub feedback_count: i64,
    pub notes_count: i64,
    pub average_rating: Option<f64>,
}

/// A feedback row in the admin listing.
#[derive(Debug, Clone)]
pub struct FeedbackEntry {
    pub feedback: Feedback,
    pub learner_username: String,
    pub topic: String,
}
