//! Curriculum generation through an external generative-text service, plus
//! the learner's progress, notes and feedback on what was generated.
//!
//! The service is asked for a JSON outline; whatever text comes back is
//! searched for a JSON document, normalized to `{ "weeks": [...] }`, and
//! stored against the requesting learner. Every later operation is scoped to
//! curricula the learner owns.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::FutureExt as _;
use futures::future::BoxFuture;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderValue};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::instrument;

use serde_json::Value;
use studyforge_core::{
    CurriculumId, CurriculumOutline, Difficulty, DifficultyRating, LearnerId, OutlineError,
    Rating, extract_outline_json,
};

use crate::config::CurriculumServiceConfig;
use crate::db::{CurriculumStore, RepositoryError};
use crate::models::{Curriculum, Feedback, NewCurriculum, NewFeedback, NewNote, Note, TaskProgress};

/// Longest accepted plan, in weeks.
pub const MAX_DURATION_WEEKS: u32 = 52;

const MAX_TOPIC_CHARS: usize = 200;

const MAX_NOTE_TITLE_CHARS: usize = 200;

#[derive(Debug, Error)]
pub enum CurriculumError {
    /// No generator is configured.
    #[error("curriculum generation is not configured")]
    NotConfigured,

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The service answered with a non-success status.
    #[error("generation service returned {status}: {message}")]
    Upstream { status: u16, message: String },

    /// The response carried no text.
    #[error("generation service returned no text")]
    EmptyResponse,

    /// The text did not contain a usable outline.
    #[error("invalid outline from generation service: {0}")]
    Outline(#[from] OutlineError),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("curriculum not found")]
    NotFound,

    #[error("database error: {0}")]
    Repository(#[from] RepositoryError),
}

impl CurriculumError {
    /// Whether the failure lies with the external service.
    #[must_use]
    pub const fn is_upstream(&self) -> bool {
        matches!(
            self,
            Self::NotConfigured
                | Self::Http(_)
                | Self::Upstream { .. }
                | Self::EmptyResponse
                | Self::Outline(_)
        )
    }
}

/// Produces outline text for a topic.
pub trait CurriculumGenerator: Send + Sync {
    fn generate<'a>(
        &'a self,
        topic: &'a str,
        duration: &'a str,
        difficulty: Difficulty,
    ) -> BoxFuture<'a, Result<String, CurriculumError>>;
}

/// Used when no generation service is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnconfiguredGenerator;

impl CurriculumGenerator for UnconfiguredGenerator {
    fn generate<'a>(
        &'a self,
        _topic: &'a str,
        _duration: &'a str,
        _difficulty: Difficulty,
    ) -> BoxFuture<'a, Result<String, CurriculumError>> {
        futures::future::ready(Err(CurriculumError::NotConfigured)).boxed()
    }
}

/// Generative Language API client (`models/{model}:generateContent`).
#[derive(Clone)]
pub struct HttpCurriculumGenerator {
    client: reqwest::Client,
    endpoint: String,
    model: String,
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    contents: [Content<'a>; 1],
}

#[derive(Serialize)]
struct Content<'a> {
    parts: [Part<'a>; 1],
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

impl HttpCurriculumGenerator {
    /// # Errors
    ///
    /// `InvalidRequest` if the API key is not a valid header value, `Http` if
    /// the client cannot be built.
    pub fn new(config: &CurriculumServiceConfig) -> Result<Self, CurriculumError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let mut key = HeaderValue::from_str(config.api_key.expose_secret())
            .map_err(|_| CurriculumError::InvalidRequest("API key is not a valid header".to_owned()))?;
        key.set_sensitive(true);
        headers.insert("x-goog-api-key", key);

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(config.timeout)
            .build()?;

        Ok(Self {
            client,
            endpoint: format!(
                "{}/models/{}:generateContent",
                config.api_url.trim_end_matches('/'),
                config.model
            ),
            model: config.model.clone(),
        })
    }

    #[instrument(skip(self), fields(model = %self.model))]
    async fn call(
        &self,
        topic: &str,
        duration: &str,
        difficulty: Difficulty,
    ) -> Result<String, CurriculumError> {
        let prompt = outline_prompt(topic, duration, difficulty);
        let request = GenerateRequest {
            contents: [Content {
                parts: [Part { text: &prompt }],
            }],
        };

        let response = self.client.post(&self.endpoint).json(&request).send().await?;
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            tracing::warn!(status = status.as_u16(), "Generation service error");
            return Err(CurriculumError::Upstream {
                status: status.as_u16(),
                message: message.chars().take(500).collect(),
            });
        }

        let body: GenerateResponse = response.json().await?;
        body.candidates
            .into_iter()
            .filter_map(|c| c.content)
            .flat_map(|c| c.parts)
            .find_map(|p| p.text)
            .filter(|t| !t.trim().is_empty())
            .ok_or(CurriculumError::EmptyResponse)
    }
}

impl CurriculumGenerator for HttpCurriculumGenerator {
    fn generate<'a>(
        &'a self,
        topic: &'a str,
        duration: &'a str,
        difficulty: Difficulty,
    ) -> BoxFuture<'a, Result<String, CurriculumError>> {
        self.call(topic, duration, difficulty).boxed()
    }
}

fn outline_prompt(topic: &str, duration: &str, difficulty: Difficulty) -> String {
    format!(
        r#"Create a detailed {duration} curriculum for learning {topic} at {difficulty} level.

Format as JSON with this structure:
{{
    "weeks": [
        {{
            "week": 1,
            "title": "Week title",
            "description": "What will be covered",
            "tasks": [
                {{
                    "task": "Specific learning task",
                    "resources": ["Resource 1", "Resource 2"],
                    "videos": ["Video URL or search term"]
                }}
            ]
        }}
    ]
}}

Make it practical and hands-on with real-world applications.
Include 3-4 tasks per week.
Focus on {topic} fundamentals and practical skills.
Return only valid JSON, no extra text."#
    )
}

/// A learner's request for a new curriculum.
#[derive(Debug, Clone, Deserialize)]
pub struct CurriculumRequest {
    pub topic: String,
    /// Length in weeks.
    pub duration: u32,
    #[serde(default)]
    pub difficulty: Difficulty,
}

/// A note on a curriculum, a week or a single task.
#[derive(Debug, Clone, Deserialize)]
pub struct NoteRequest {
    pub curriculum_id: CurriculumId,
    #[serde(default)]
    pub week_number: Option<i32>,
    #[serde(default)]
    pub task_index: Option<i32>,
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub is_public: bool,
}

const fn recommend_by_default() -> bool {
    true
}

/// A learner's rating of a curriculum.
#[derive(Debug, Clone, Deserialize)]
pub struct FeedbackRequest {
    pub curriculum_id: CurriculumId,
    pub rating: i32,
    /// A 1-5 slider position or a label; see [`DifficultyRating::from_answer`].
    #[serde(default)]
    pub difficulty_rating: Option<Value>,
    #[serde(default)]
    pub feedback_text: String,
    #[serde(default = "recommend_by_default")]
    pub would_recommend: bool,
    #[serde(default)]
    pub is_anonymous: bool,
}

/// Generates and stores curricula.
#[derive(Clone)]
pub struct CurriculumService {
    generator: Arc<dyn CurriculumGenerator>,
    store: Arc<dyn CurriculumStore>,
}

impl CurriculumService {
    #[must_use]
    pub fn new(generator: Arc<dyn CurriculumGenerator>, store: Arc<dyn CurriculumStore>) -> Self {
        Self { generator, store }
    }

    /// Generate a curriculum for `learner` and store it.
    ///
    /// # Errors
    ///
    /// `InvalidRequest` for a bad topic or duration, upstream errors from the
    /// generator, or storage errors.
    #[instrument(skip(self, request), fields(topic = %request.topic))]
    pub async fn generate_for(
        &self,
        learner: LearnerId,
        request: &CurriculumRequest,
    ) -> Result<Curriculum, CurriculumError> {
        let topic = request.topic.trim();
        if topic.is_empty() || topic.chars().count() > MAX_TOPIC_CHARS {
            return Err(CurriculumError::InvalidRequest(format!(
                "topic must be 1-{MAX_TOPIC_CHARS} characters"
            )));
        }
        if !(1..=MAX_DURATION_WEEKS).contains(&request.duration) {
            return Err(CurriculumError::InvalidRequest(format!(
                "duration must be 1-{MAX_DURATION_WEEKS} weeks"
            )));
        }
        let duration = duration_label(request.duration);

        let text = self
            .generator
            .generate(topic, &duration, request.difficulty)
            .await?;
        let content = CurriculumOutline::normalize(extract_outline_json(&text)?)?;

        let curriculum = self
            .store
            .create(&NewCurriculum {
                learner_id: learner,
                topic: topic.to_owned(),
                difficulty: request.difficulty,
                duration,
                content,
            })
            .await?;
        tracing::info!(curriculum_id = %curriculum.id, tasks = curriculum.total_tasks, "Curriculum generated");
        Ok(curriculum)
    }

    /// Record one task's completion and return the updated curriculum.
    ///
    /// # Errors
    ///
    /// `NotFound` unless `learner` owns the curriculum, `InvalidRequest` when
    /// the slot is not in the outline.
    #[instrument(skip(self))]
    pub async fn record_completion(
        &self,
        learner: LearnerId,
        curriculum: CurriculumId,
        week_number: i32,
        task_index: i32,
        completed: bool,
        now: DateTime<Utc>,
    ) -> Result<Curriculum, CurriculumError> {
        let owned = self
            .store
            .find_owned(curriculum, learner)
            .await?
            .ok_or(CurriculumError::NotFound)?;
        if !owned.content.has_task(week_number, task_index) {
            return Err(CurriculumError::InvalidRequest(format!(
                "no task {task_index} in week {week_number}"
            )));
        }
        Ok(self
            .store
            .record_completion(curriculum, week_number, task_index, completed, now)
            .await?)
    }

    /// The curriculum with every slot's progress, missing slots as not completed.
    ///
    /// # Errors
    ///
    /// `NotFound` unless `learner` owns the curriculum.
    pub async fn progress(
        &self,
        learner: LearnerId,
        curriculum: CurriculumId,
    ) -> Result<(Curriculum, Vec<TaskProgress>), CurriculumError> {
        let owned = self
            .store
            .find_owned(curriculum, learner)
            .await?
            .ok_or(CurriculumError::NotFound)?;
        let recorded = self.store.progress(curriculum).await?;

        let slots = owned
            .content
            .task_slots()
            .into_iter()
            .map(|(week_number, task_index)| {
                recorded
                    .iter()
                    .find(|p| p.week_number == week_number && p.task_index == task_index)
                    .cloned()
                    .unwrap_or(TaskProgress {
                        week_number,
                        task_index,
                        completed: false,
                        completed_at: None,
                    })
            })
            .collect();
        Ok((owned, slots))
    }

    /// # Errors
    ///
    /// Storage errors.
    pub async fn list_for(&self, learner: LearnerId) -> Result<Vec<Curriculum>, CurriculumError> {
        Ok(self.store.list_for(learner).await?)
    }

    async fn owned(
        &self,
        learner: LearnerId,
        curriculum: CurriculumId,
    ) -> Result<Curriculum, CurriculumError> {
        self.store
            .find_owned(curriculum, learner)
            .await?
            .ok_or(CurriculumError::NotFound)
    }

    /// Attach a note to one of the learner's curricula.
    ///
    /// A note pinned to a task must also name its week, and the week or task
    /// must exist in the outline.
    ///
    /// # Errors
    ///
    /// `NotFound` unless `learner` owns the curriculum, `InvalidRequest` for
    /// an empty title or content, or a position outside the outline.
    #[instrument(skip(self, request), fields(curriculum_id = %request.curriculum_id))]
    pub async fn add_note(
        &self,
        learner: LearnerId,
        request: &NoteRequest,
    ) -> Result<Note, CurriculumError> {
        let title = request.title.trim();
        if title.is_empty() || title.chars().count() > MAX_NOTE_TITLE_CHARS {
            return Err(CurriculumError::InvalidRequest(format!(
                "title must be 1-{MAX_NOTE_TITLE_CHARS} characters"
            )));
        }
        if request.content.trim().is_empty() {
            return Err(CurriculumError::InvalidRequest(
                "content must not be empty".to_owned(),
            ));
        }

        let owned = self.owned(learner, request.curriculum_id).await?;
        let placed = match (request.week_number, request.task_index) {
            (None, None) => true,
            (Some(week), None) => owned.content.has_week(week),
            (Some(week), Some(task)) => owned.content.has_task(week, task),
            (None, Some(_)) => false,
        };
        if !placed {
            return Err(CurriculumError::InvalidRequest(
                "note position is not in the curriculum".to_owned(),
            ));
        }

        let note = self
            .store
            .add_note(&NewNote {
                learner_id: learner,
                curriculum_id: owned.id,
                week_number: request.week_number,
                task_index: request.task_index,
                title: title.to_owned(),
                content: request.content.clone(),
                is_public: request.is_public,
            })
            .await?;
        tracing::info!(note_id = %note.id, "Note added");
        Ok(note)
    }

    /// The learner's notes on one week, newest first.
    ///
    /// # Errors
    ///
    /// `NotFound` unless `learner` owns the curriculum.
    pub async fn notes(
        &self,
        learner: LearnerId,
        curriculum: CurriculumId,
        week_number: i32,
    ) -> Result<Vec<Note>, CurriculumError> {
        self.owned(learner, curriculum).await?;
        Ok(self.store.notes_for(curriculum, learner, week_number).await?)
    }

    /// Record or replace the learner's feedback on one of their curricula.
    /// Returns the stored feedback and whether it is new.
    ///
    /// # Errors
    ///
    /// `NotFound` unless `learner` owns the curriculum, `InvalidRequest` for a
    /// rating outside 1-5.
    #[instrument(skip(self, request), fields(curriculum_id = %request.curriculum_id))]
    pub async fn submit_feedback(
        &self,
        learner: LearnerId,
        request: &FeedbackRequest,
        now: DateTime<Utc>,
    ) -> Result<(Feedback, bool), CurriculumError> {
        let rating = Rating::new(request.rating)
            .map_err(|e| CurriculumError::InvalidRequest(e.to_string()))?;
        let owned = self.owned(learner, request.curriculum_id).await?;

        let (feedback, created) = self
            .store
            .upsert_feedback(
                &NewFeedback {
                    learner_id: learner,
                    curriculum_id: owned.id,
                    rating,
                    difficulty_rating: DifficultyRating::from_answer(
                        request.difficulty_rating.as_ref(),
                    ),
                    feedback_text: request.feedback_text.trim().to_owned(),
                    would_recommend: request.would_recommend,
                    is_anonymous: request.is_anonymous,
                },
                now,
            )
            .await?;
        tracing::info!(feedback_id = %feedback.id, created, rating = rating.get(), "Feedback recorded");
        Ok((feedback, created))
    }
}

fn duration_label(weeks: u32) -> String {
    if weeks == 1 {
        "1 week".to_owned()
    } else {
        format!("{weeks} weeks")
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use secrecy::SecretString;
    use studyforge_core::{Email, Username};

    use super::*;
    use crate::db::LearnerStore;
    use crate::db::memory::MemoryDb;
    use crate::models::{NewLearner, NewVerificationTicket};

    struct CannedGenerator(&'static str);

    impl CurriculumGenerator for CannedGenerator {
        fn generate<'a>(
            &'a self,
            _topic: &'a str,
            _duration: &'a str,
            _difficulty: Difficulty,
        ) -> BoxFuture<'a, Result<String, CurriculumError>> {
            futures::future::ready(Ok(self.0.to_owned())).boxed()
        }
    }

    async fn learner(db: &MemoryDb) -> LearnerId {
        let (l, _) = LearnerStore::create(
            db,
            &NewLearner {
                username: Username::parse("ann").unwrap(),
                email: Email::parse("ann@example.com").unwrap(),
                first_name: String::new(),
                last_name: String::new(),
                password_hash: SecretString::from("x".to_owned()),
                is_active: true,
            },
            &NewVerificationTicket::verified(Utc::now()),
        )
        .await
        .unwrap();
        l.id
    }

    const PROSE_WRAPPED: &str = "Here you go!\n[{\"week\": 1, \"title\": \"Intro\", \
        \"tasks\": [{\"task\": \"a\"}, {\"task\": \"b\"}]}, {\"week\": 2, \"tasks\": [{\"task\": \"c\"}]}]\nGood luck.";

    #[tokio::test]
    async fn test_generate_normalizes_and_stores() {
        let db = MemoryDb::new();
        let id = learner(&db).await;
        let svc = CurriculumService::new(Arc::new(CannedGenerator(PROSE_WRAPPED)), Arc::new(db));

        let c = svc
            .generate_for(
                id,
                &CurriculumRequest {
                    topic: "  Rust  ".to_owned(),
                    duration: 2,
                    difficulty: Difficulty::Intermediate,
                },
            )
            .await
            .unwrap();
        assert_eq!(c.topic, "Rust");
        assert_eq!(c.duration, "2 weeks");
        assert_eq!(c.total_tasks, 3);
        assert!(c.content.as_value().get("weeks").is_some());
    }

    #[tokio::test]
    async fn test_unusable_text_is_upstream_error() {
        let db = MemoryDb::new();
        let id = learner(&db).await;
        let svc = CurriculumService::new(Arc::new(CannedGenerator("sorry, no")), Arc::new(db));
        let err = svc
            .generate_for(
                id,
                &CurriculumRequest {
                    topic: "Rust".to_owned(),
                    duration: 4,
                    difficulty: Difficulty::Beginner,
                },
            )
            .await
            .unwrap_err();
        assert!(err.is_upstream());
    }

    #[tokio::test]
    async fn test_request_validation() {
        let svc = CurriculumService::new(Arc::new(UnconfiguredGenerator), Arc::new(MemoryDb::new()));
        for (topic, duration) in [("", 4), ("Rust", 0), ("Rust", 53)] {
            let err = svc
                .generate_for(
                    LearnerId::new(1),
                    &CurriculumRequest {
                        topic: topic.to_owned(),
                        duration,
                        difficulty: Difficulty::Beginner,
                    },
                )
                .await
                .unwrap_err();
            assert!(matches!(err, CurriculumError::InvalidRequest(_)));
        }
    }

    #[tokio::test]
    async fn test_progress_flow_and_ownership() {
        let db = MemoryDb::new();
        let id = learner(&db).await;
        let svc = CurriculumService::new(Arc::new(CannedGenerator(PROSE_WRAPPED)), Arc::new(db));
        let c = svc
            .generate_for(
                id,
                &CurriculumRequest {
                    topic: "Rust".to_owned(),
                    duration: 2,
                    difficulty: Difficulty::Beginner,
                },
            )
            .await
            .unwrap();

        let now = Utc::now();
        let updated = svc.record_completion(id, c.id, 2, 0, true, now).await.unwrap();
        assert_eq!(updated.completed_tasks, 1);

        assert!(matches!(
            svc.record_completion(id, c.id, 2, 5, true, now).await,
            Err(CurriculumError::InvalidRequest(_))
        ));
        assert!(matches!(
            svc.record_completion(LearnerId::new(999), c.id, 1, 0, true, now).await,
            Err(CurriculumError::NotFound)
        ));

        let (_, slots) = svc.progress(id, c.id).await.unwrap();
        assert_eq!(slots.len(), 3);
        assert_eq!(slots.iter().filter(|s| s.completed).count(), 1);
    }

    #[tokio::test]
    async fn test_unconfigured_generator() {
        let err = UnconfiguredGenerator
            .generate("Rust", "1 week", Difficulty::Beginner)
            .await
            .unwrap_err();
        assert!(matches!(err, CurriculumError::NotConfigured));
        assert!(err.is_upstream());
    }

    async fn generated(svc: &CurriculumService, learner: LearnerId) -> Curriculum {
        svc.generate_for(
            learner,
            &CurriculumRequest {
                topic: "Rust".to_owned(),
                duration: 2,
                difficulty: Difficulty::Beginner,
            },
        )
        .await
        .unwrap()
    }

    fn note(curriculum: CurriculumId, week: Option<i32>, task: Option<i32>, title: &str) -> NoteRequest {
        NoteRequest {
            curriculum_id: curriculum,
            week_number: week,
            task_index: task,
            title: title.to_owned(),
            content: "remember the borrow checker".to_owned(),
            is_public: false,
        }
    }

    #[tokio::test]
    async fn test_notes_are_placed_and_scoped() {
        let db = MemoryDb::new();
        let id = learner(&db).await;
        let svc = CurriculumService::new(Arc::new(CannedGenerator(PROSE_WRAPPED)), Arc::new(db));
        let c = generated(&svc, id).await;

        svc.add_note(id, &note(c.id, Some(1), None, "first")).await.unwrap();
        svc.add_note(id, &note(c.id, Some(1), Some(1), "second")).await.unwrap();
        svc.add_note(id, &note(c.id, Some(2), Some(0), "other week")).await.unwrap();
        svc.add_note(id, &note(c.id, None, None, "whole plan")).await.unwrap();

        let week_one = svc.notes(id, c.id, 1).await.unwrap();
        let titles: Vec<_> = week_one.iter().map(|n| n.title.as_str()).collect();
        assert_eq!(titles, ["second", "first"]);

        for bad in [
            note(c.id, Some(3), None, "no such week"),
            note(c.id, Some(2), Some(4), "no such task"),
            note(c.id, None, Some(0), "task without week"),
            note(c.id, Some(1), None, "   "),
        ] {
            assert!(matches!(
                svc.add_note(id, &bad).await,
                Err(CurriculumError::InvalidRequest(_))
            ));
        }

        let stranger = LearnerId::new(999);
        assert!(matches!(
            svc.add_note(stranger, &note(c.id, None, None, "mine now")).await,
            Err(CurriculumError::NotFound)
        ));
        assert!(matches!(
            svc.notes(stranger, c.id, 1).await,
            Err(CurriculumError::NotFound)
        ));
    }

    #[tokio::test]
    async fn test_feedback_upserts_per_learner_and_curriculum() {
        let db = MemoryDb::new();
        let id = learner(&db).await;
        let svc = CurriculumService::new(
            Arc::new(CannedGenerator(PROSE_WRAPPED)),
            Arc::new(db.clone()),
        );
        let c = generated(&svc, id).await;
        let now = Utc::now();

        let mut request = FeedbackRequest {
            curriculum_id: c.id,
            rating: 4,
            difficulty_rating: Some(serde_json::json!(5)),
            feedback_text: " great ".to_owned(),
            would_recommend: true,
            is_anonymous: false,
        };
        let (first, created) = svc.submit_feedback(id, &request, now).await.unwrap();
        assert!(created);
        assert_eq!(first.rating.get(), 4);
        assert_eq!(first.difficulty_rating, DifficultyRating::TooHard);
        assert_eq!(first.feedback_text, "great");

        request.rating = 2;
        request.difficulty_rating = None;
        let (second, created) = svc.submit_feedback(id, &request, now).await.unwrap();
        assert!(!created);
        assert_eq!(second.id, first.id);
        assert_eq!(second.rating.get(), 2);
        assert_eq!(second.difficulty_rating, DifficultyRating::JustRight);

        let summary = db.overview().await.unwrap();
        assert_eq!(summary.len(), 1);
        assert_eq!(summary[0].feedback_count, 1);
        assert_eq!(summary[0].average_rating, Some(2.0));

        request.rating = 6;
        assert!(matches!(
            svc.submit_feedback(id, &request, now).await,
            Err(CurriculumError::InvalidRequest(_))
        ));
    }
}
