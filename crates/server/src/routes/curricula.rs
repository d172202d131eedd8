//! Learner curricula: generation, task progress, notes and feedback.

use std::collections::BTreeMap;

use axum::{
    Json, Router,
    extract::{Path, State},
    routing::{get, post},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use studyforge_core::{CurriculumId, Difficulty, NoteId};

use crate::error::AppError;
use crate::middleware::RequireLearner;
use crate::models::{Curriculum, Note, TaskProgress};
use crate::routes::JsonBody;
use crate::services::curriculum::{CurriculumRequest, FeedbackRequest, NoteRequest};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/curricula", get(list).post(generate))
        .route("/api/curricula/{id}/progress", get(progress))
        .route("/api/curricula/{id}/notes/{week}", get(notes))
        .route("/api/progress", post(record_progress))
        .route("/api/notes", post(add_note))
        .route("/api/feedback", post(add_feedback))
}

#[derive(Debug, Serialize)]
pub struct CurriculumView {
    pub id: CurriculumId,
    pub topic: String,
    pub difficulty: Difficulty,
    pub duration: String,
    pub weeks: Vec<Value>,
    pub total_tasks: i32,
    pub completed_tasks: i32,
    pub progress_percentage: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&Curriculum> for CurriculumView {
    fn from(c: &Curriculum) -> Self {
        Self {
            id: c.id,
            topic: c.topic.clone(),
            difficulty: c.difficulty,
            duration: c.duration.clone(),
            weeks: c.content.weeks().to_vec(),
            total_tasks: c.total_tasks,
            completed_tasks: c.completed_tasks,
            progress_percentage: c.percentage(),
            created_at: c.created_at,
            updated_at: c.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CurriculumResponse {
    pub success: bool,
    pub curriculum: CurriculumView,
}

/// The learner's curricula, newest first.
///
/// # Errors
///
/// Storage errors.
pub async fn list(
    RequireLearner(learner): RequireLearner,
    State(state): State<AppState>,
) -> Result<Json<Vec<CurriculumView>>, AppError> {
    let curricula = state.curricula().list_for(learner.id).await?;
    Ok(Json(curricula.iter().map(CurriculumView::from).collect()))
}

/// Generate and store a curriculum.
///
/// # Errors
///
/// `BadRequest` for invalid input, `UpstreamUnavailable` when generation fails.
pub async fn generate(
    RequireLearner(learner): RequireLearner,
    State(state): State<AppState>,
    JsonBody(request): JsonBody<CurriculumRequest>,
) -> Result<Json<CurriculumResponse>, AppError> {
    let curriculum = state.curricula().generate_for(learner.id, &request).await?;
    Ok(Json(CurriculumResponse {
        success: true,
        curriculum: CurriculumView::from(&curriculum),
    }))
}

#[derive(Debug, Deserialize)]
pub struct ProgressRequest {
    pub curriculum_id: CurriculumId,
    pub week_number: i32,
    pub task_index: i32,
    #[serde(default)]
    pub is_completed: bool,
}

#[derive(Debug, Serialize)]
pub struct ProgressUpdate {
    pub success: bool,
    pub progress_percentage: f64,
    pub is_completed: bool,
    pub congratulations: bool,
}

/// Record one task's completion.
///
/// # Errors
///
/// `NotFound` unless the learner owns the curriculum, `BadRequest` for a slot
/// outside the outline.
pub async fn record_progress(
    RequireLearner(learner): RequireLearner,
    State(state): State<AppState>,
    JsonBody(request): JsonBody<ProgressRequest>,
) -> Result<Json<ProgressUpdate>, AppError> {
    let curriculum = state
        .curricula()
        .record_completion(
            learner.id,
            request.curriculum_id,
            request.week_number,
            request.task_index,
            request.is_completed,
            Utc::now(),
        )
        .await?;

    let percentage = curriculum.percentage();
    let finished = percentage >= 100.0;
    Ok(Json(ProgressUpdate {
        success: true,
        progress_percentage: percentage,
        is_completed: finished,
        congratulations: finished,
    }))
}

#[derive(Debug, Serialize)]
pub struct SlotView {
    pub completed: bool,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
pub struct ProgressView {
    pub success: bool,
    /// Keyed by week number, then task index.
    pub progress: BTreeMap<i32, BTreeMap<i32, SlotView>>,
    pub overall_percentage: f64,
    pub curriculum_content: Vec<Value>,
}

fn group_by_week(slots: Vec<TaskProgress>) -> BTreeMap<i32, BTreeMap<i32, SlotView>> {
    let mut weeks: BTreeMap<i32, BTreeMap<i32, SlotView>> = BTreeMap::new();
    for slot in slots {
        weeks.entry(slot.week_number).or_default().insert(
            slot.task_index,
            SlotView {
                completed: slot.completed,
                completed_at: slot.completed_at,
            },
        );
    }
    weeks
}

/// Per-slot progress with the normalized weeks.
///
/// # Errors
///
/// `NotFound` unless the learner owns the curriculum.
pub async fn progress(
    RequireLearner(learner): RequireLearner,
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<Json<ProgressView>, AppError> {
    let (curriculum, slots) = state
        .curricula()
        .progress(learner.id, CurriculumId::new(id))
        .await?;

    Ok(Json(ProgressView {
        success: true,
        progress: group_by_week(slots),
        overall_percentage: curriculum.percentage(),
        curriculum_content: curriculum.content.weeks().to_vec(),
    }))
}

#[derive(Debug, Serialize)]
pub struct NoteView {
    pub id: NoteId,
    pub week_number: Option<i32>,
    pub task_index: Option<i32>,
    pub title: String,
    pub content: String,
    pub is_public: bool,
    pub created_at: DateTime<Utc>,
}

impl From<&Note> for NoteView {
    fn from(note: &Note) -> Self {
        Self {
            id: note.id,
            week_number: note.week_number,
            task_index: note.task_index,
            title: note.title.clone(),
            content: note.content.clone(),
            is_public: note.is_public,
            created_at: note.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct NoteCreated {
    pub success: bool,
    pub note_id: NoteId,
}

/// Attach a note to a curriculum, week or task.
///
/// # Errors
///
/// `NotFound` unless the learner owns the curriculum, `BadRequest` for empty
/// text or a position outside the outline.
pub async fn add_note(
    RequireLearner(learner): RequireLearner,
    State(state): State<AppState>,
    JsonBody(request): JsonBody<NoteRequest>,
) -> Result<Json<NoteCreated>, AppError> {
    let note = state.curricula().add_note(learner.id, &request).await?;
    Ok(Json(NoteCreated {
        success: true,
        note_id: note.id,
    }))
}

/// The learner's notes on one week, newest first.
///
/// # Errors
///
/// `NotFound` unless the learner owns the curriculum.
pub async fn notes(
    RequireLearner(learner): RequireLearner,
    State(state): State<AppState>,
    Path((id, week)): Path<(i32, i32)>,
) -> Result<Json<Vec<NoteView>>, AppError> {
    let notes = state
        .curricula()
        .notes(learner.id, CurriculumId::new(id), week)
        .await?;
    Ok(Json(notes.iter().map(NoteView::from).collect()))
}

/// Rate a curriculum. Submitting again replaces the earlier rating.
///
/// # Errors
///
/// `NotFound` unless the learner owns the curriculum, `BadRequest` for a
/// rating outside 1-5.
pub async fn add_feedback(
    RequireLearner(learner): RequireLearner,
    State(state): State<AppState>,
    JsonBody(request): JsonBody<FeedbackRequest>,
) -> Result<Json<Value>, AppError> {
    let (feedback, created) = state
        .curricula()
        .submit_feedback(learner.id, &request, Utc::now())
        .await?;
    Ok(Json(serde_json::json!({
        "success": true,
        "feedback_id": feedback.id,
        "created": created,
        "difficulty_rating": feedback.difficulty_rating,
    })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_group_by_week() {
        let slot = |week_number, task_index, completed| TaskProgress {
            week_number,
            task_index,
            completed,
            completed_at: None,
        };
        let grouped = group_by_week(vec![slot(1, 0, true), slot(1, 1, false), slot(2, 0, false)]);
        assert_eq!(grouped.len(), 2);
        assert_eq!(grouped[&1].len(), 2);
        assert!(grouped[&1][&0].completed);
        assert!(!grouped[&2][&0].completed);
    }
}
