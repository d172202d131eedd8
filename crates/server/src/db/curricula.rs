//! `PostgreSQL` store for curricula, learner progress, notes and feedback.

use chrono::{DateTime, Utc};
use futures::FutureExt as _;
use futures::future::BoxFuture;
use sqlx::PgPool;

use studyforge_core::{
    CurriculumId, CurriculumOutline, Difficulty, DifficultyRating, FeedbackId, LearnerId, NoteId,
    Rating,
};

use super::{CurriculumStore, RepositoryError, StoreResult};
use crate::models::{
    Curriculum, CurriculumSummary, Feedback, FeedbackEntry, NewCurriculum, NewFeedback, NewNote,
    Note, PlatformStats, TaskProgress, TopicCount,
};

const CURRICULUM_COLUMNS: &str = "id, learner_id, topic, difficulty, duration, content, \
     total_tasks, completed_tasks, created_at, updated_at";

const NOTE_COLUMNS: &str = "id, learner_id, curriculum_id, week_number, task_index, title, \
     content, is_public, created_at, updated_at";

const FEEDBACK_COLUMNS: &str = "id, learner_id, curriculum_id, rating, difficulty_rating, \
     feedback_text, would_recommend, is_anonymous, created_at";

/// How many topics the stats view reports.
const POPULAR_TOPICS: i64 = 5;

#[derive(Debug, sqlx::FromRow)]
struct CurriculumRow {
    id: i32,
    learner_id: i32,
    topic: String,
    difficulty: String,
    duration: String,
    content: serde_json::Value,
    total_tasks: i32,
    completed_tasks: i32,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<CurriculumRow> for Curriculum {
    type Error = RepositoryError;

    fn try_from(row: CurriculumRow) -> Result<Self, Self::Error> {
        let difficulty: Difficulty = row
            .difficulty
            .parse()
            .map_err(RepositoryError::DataCorruption)?;

        Ok(Self {
            id: CurriculumId::new(row.id),
            learner_id: LearnerId::new(row.learner_id),
            topic: row.topic,
            difficulty,
            duration: row.duration,
            content: CurriculumOutline::from_stored(row.content),
            total_tasks: row.total_tasks,
            completed_tasks: row.completed_tasks,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ProgressRow {
    week_number: i32,
    task_index: i32,
    completed: bool,
    completed_at: Option<DateTime<Utc>>,
}

impl From<ProgressRow> for TaskProgress {
    fn from(row: ProgressRow) -> Self {
        Self {
            week_number: row.week_number,
            task_index: row.task_index,
            completed: row.completed,
            completed_at: row.completed_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct NoteRow {
    id: i32,
    learner_id: i32,
    curriculum_id: i32,
    week_number: Option<i32>,
    task_index: Option<i32>,
    title: String,
    content: String,
    is_public: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<NoteRow> for Note {
    fn from(row: NoteRow) -> Self {
        Self {
            id: NoteId::new(row.id),
            learner_id: LearnerId::new(row.learner_id),
            curriculum_id: CurriculumId::new(row.curriculum_id),
            week_number: row.week_number,
            task_index: row.task_index,
            title: row.title,
            content: row.content,
            is_public: row.is_public,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct FeedbackRow {
    id: i32,
    learner_id: i32,
    curriculum_id: i32,
    rating: i32,
    difficulty_rating: String,
    feedback_text: String,
    would_recommend: bool,
    is_anonymous: bool,
    created_at: DateTime<Utc>,
}

impl TryFrom<FeedbackRow> for Feedback {
    type Error = RepositoryError;

    fn try_from(row: FeedbackRow) -> Result<Self, Self::Error> {
        let rating = Rating::new(row.rating)
            .map_err(|e| RepositoryError::DataCorruption(e.to_string()))?;
        let difficulty_rating: DifficultyRating = row
            .difficulty_rating
            .parse()
            .map_err(RepositoryError::DataCorruption)?;

        Ok(Self {
            id: FeedbackId::new(row.id),
            learner_id: LearnerId::new(row.learner_id),
            curriculum_id: CurriculumId::new(row.curriculum_id),
            rating,
            difficulty_rating,
            feedback_text: row.feedback_text,
            would_recommend: row.would_recommend,
            is_anonymous: row.is_anonymous,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct SummaryRow {
    #[sqlx(flatten)]
    curriculum: CurriculumRow,
    owner: String,
    feedback_count: i64,
    notes_count: i64,
    average_rating: Option<f64>,
}

#[derive(Debug, sqlx::FromRow)]
struct FeedbackEntryRow {
    #[sqlx(flatten)]
    feedback: FeedbackRow,
    learner_username: String,
    topic: String,
}

#[derive(Debug, sqlx::FromRow)]
struct UpsertedFeedbackRow {
    #[sqlx(flatten)]
    feedback: FeedbackRow,
    created: bool,
}

/// Curricula in `PostgreSQL`.
#[derive(Clone)]
pub struct PgCurriculumStore {
    pool: PgPool,
}

impl PgCurriculumStore {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl CurriculumStore for PgCurriculumStore {
    fn create<'a>(&'a self, new: &'a NewCurriculum) -> BoxFuture<'a, StoreResult<Curriculum>> {
        async move {
            let total = i32::try_from(new.content.total_tasks()).unwrap_or(i32::MAX);
            let row = sqlx::query_as::<_, CurriculumRow>(&format!(
                "INSERT INTO curriculum (learner_id, topic, difficulty, duration, content, total_tasks) \
                 VALUES ($1, $2, $3, $4, $5, $6) \
                 RETURNING {CURRICULUM_COLUMNS}"
            ))
            .bind(new.learner_id.as_i32())
            .bind(&new.topic)
            .bind(new.difficulty.as_str())
            .bind(&new.duration)
            .bind(new.content.as_value())
            .bind(total)
            .fetch_one(&self.pool)
            .await?;

            row.try_into()
        }
        .boxed()
    }

    fn find_owned(
        &self,
        id: CurriculumId,
        owner: LearnerId,
    ) -> BoxFuture<'_, StoreResult<Option<Curriculum>>> {
        async move {
            let row = sqlx::query_as::<_, CurriculumRow>(&format!(
                "SELECT {CURRICULUM_COLUMNS} FROM curriculum WHERE id = $1 AND learner_id = $2"
            ))
            .bind(id.as_i32())
            .bind(owner.as_i32())
            .fetch_optional(&self.pool)
            .await?;

            row.map(TryInto::try_into).transpose()
        }
        .boxed()
    }

    fn list_for(&self, owner: LearnerId) -> BoxFuture<'_, StoreResult<Vec<Curriculum>>> {
        async move {
            let rows = sqlx::query_as::<_, CurriculumRow>(&format!(
                "SELECT {CURRICULUM_COLUMNS} FROM curriculum WHERE learner_id = $1 \
                 ORDER BY created_at DESC"
            ))
            .bind(owner.as_i32())
            .fetch_all(&self.pool)
            .await?;

            rows.into_iter().map(TryInto::try_into).collect()
        }
        .boxed()
    }

    fn record_completion(
        &self,
        curriculum: CurriculumId,
        week_number: i32,
        task_index: i32,
        completed: bool,
        now: DateTime<Utc>,
    ) -> BoxFuture<'_, StoreResult<Curriculum>> {
        async move {
            let mut tx = self.pool.begin().await?;

            let upserted = sqlx::query(
                "INSERT INTO learner_progress \
                     (learner_id, curriculum_id, week_number, task_index, completed, completed_at) \
                 SELECT c.learner_id, c.id, $2, $3, $4, CASE WHEN $4 THEN $5 END \
                 FROM curriculum c WHERE c.id = $1 \
                 ON CONFLICT (learner_id, curriculum_id, week_number, task_index) DO UPDATE SET \
                     completed = EXCLUDED.completed, completed_at = EXCLUDED.completed_at",
            )
            .bind(curriculum.as_i32())
            .bind(week_number)
            .bind(task_index)
            .bind(completed)
            .bind(now)
            .execute(&mut *tx)
            .await?;
            if upserted.rows_affected() == 0 {
                return Err(RepositoryError::NotFound);
            }

            let row = sqlx::query_as::<_, CurriculumRow>(&format!(
                "UPDATE curriculum SET \
                     completed_tasks = (SELECT COUNT(*) FROM learner_progress \
                                        WHERE curriculum_id = $1 AND completed), \
                     updated_at = $2 \
                 WHERE id = $1 \
                 RETURNING {CURRICULUM_COLUMNS}"
            ))
            .bind(curriculum.as_i32())
            .bind(now)
            .fetch_one(&mut *tx)
            .await?;

            tx.commit().await?;
            row.try_into()
        }
        .boxed()
    }

    fn progress(&self, curriculum: CurriculumId) -> BoxFuture<'_, StoreResult<Vec<TaskProgress>>> {
        async move {
            let rows = sqlx::query_as::<_, ProgressRow>(
                "SELECT week_number, task_index, completed, completed_at \
                 FROM learner_progress WHERE curriculum_id = $1 \
                 ORDER BY week_number, task_index",
            )
            .bind(curriculum.as_i32())
            .fetch_all(&self.pool)
            .await?;
            Ok(rows.into_iter().map(Into::into).collect())
        }
        .boxed()
    }

    fn add_note<'a>(&'a self, new: &'a NewNote) -> BoxFuture<'a, StoreResult<Note>> {
        async move {
            let row = sqlx::query_as::<_, NoteRow>(&format!(
                "INSERT INTO learner_note \
                     (learner_id, curriculum_id, week_number, task_index, title, content, is_public) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7) \
                 RETURNING {NOTE_COLUMNS}"
            ))
            .bind(new.learner_id.as_i32())
            .bind(new.curriculum_id.as_i32())
            .bind(new.week_number)
            .bind(new.task_index)
            .bind(&new.title)
            .bind(&new.content)
            .bind(new.is_public)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| match e {
                sqlx::Error::Database(ref db) if db.is_foreign_key_violation() => {
                    RepositoryError::NotFound
                }
                other => other.into(),
            })?;

            Ok(row.into())
        }
        .boxed()
    }

    fn notes_for(
        &self,
        curriculum: CurriculumId,
        owner: LearnerId,
        week_number: i32,
    ) -> BoxFuture<'_, StoreResult<Vec<Note>>> {
        async move {
            let rows = sqlx::query_as::<_, NoteRow>(&format!(
                "SELECT {NOTE_COLUMNS} FROM learner_note \
                 WHERE curriculum_id = $1 AND learner_id = $2 AND week_number = $3 \
                 ORDER BY created_at DESC, id DESC"
            ))
            .bind(curriculum.as_i32())
            .bind(owner.as_i32())
            .bind(week_number)
            .fetch_all(&self.pool)
            .await?;

            Ok(rows.into_iter().map(Into::into).collect())
        }
        .boxed()
    }

    fn upsert_feedback<'a>(
        &'a self,
        new: &'a NewFeedback,
        now: DateTime<Utc>,
    ) -> BoxFuture<'a, StoreResult<(Feedback, bool)>> {
        async move {
            // `xmax = 0` only for a freshly inserted row.
            let row = sqlx::query_as::<_, UpsertedFeedbackRow>(&format!(
                "INSERT INTO curriculum_feedback \
                     (learner_id, curriculum_id, rating, difficulty_rating, feedback_text, \
                      would_recommend, is_anonymous, created_at) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
                 ON CONFLICT (learner_id, curriculum_id) DO UPDATE SET \
                     rating = EXCLUDED.rating, \
                     difficulty_rating = EXCLUDED.difficulty_rating, \
                     feedback_text = EXCLUDED.feedback_text, \
                     would_recommend = EXCLUDED.would_recommend, \
                     is_anonymous = EXCLUDED.is_anonymous \
                 RETURNING {FEEDBACK_COLUMNS}, (xmax = 0) AS created"
            ))
            .bind(new.learner_id.as_i32())
            .bind(new.curriculum_id.as_i32())
            .bind(new.rating.get())
            .bind(new.difficulty_rating.as_str())
            .bind(&new.feedback_text)
            .bind(new.would_recommend)
            .bind(new.is_anonymous)
            .bind(now)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| match e {
                sqlx::Error::Database(ref db) if db.is_foreign_key_violation() => {
                    RepositoryError::NotFound
                }
                other => other.into(),
            })?;

            Ok((row.feedback.try_into()?, row.created))
        }
        .boxed()
    }

    fn overview(&self) -> BoxFuture<'_, StoreResult<Vec<CurriculumSummary>>> {
        async move {
            let rows = sqlx::query_as::<_, SummaryRow>(
                "SELECT c.id, c.learner_id, c.topic, c.difficulty, c.duration, c.content, \
                        c.total_tasks, c.completed_tasks, c.created_at, c.updated_at, \
                        l.username AS owner, \
                        (SELECT COUNT(*) FROM curriculum_feedback f WHERE f.curriculum_id = c.id) \
                            AS feedback_count, \
                        (SELECT COUNT(*) FROM learner_note n WHERE n.curriculum_id = c.id) \
                            AS notes_count, \
                        (SELECT AVG(f.rating)::float8 FROM curriculum_feedback f \
                         WHERE f.curriculum_id = c.id) AS average_rating \
                 FROM curriculum c \
                 JOIN learner l ON l.id = c.learner_id \
                 ORDER BY c.created_at DESC, c.id DESC",
            )
            .fetch_all(&self.pool)
            .await?;

            rows.into_iter()
                .map(|row| {
                    Ok(CurriculumSummary {
                        curriculum: row.curriculum.try_into()?,
                        owner: row.owner,
                        feedback_count: row.feedback_count,
                        notes_count: row.notes_count,
                        average_rating: row.average_rating,
                    })
                })
                .collect()
        }
        .boxed()
    }

    fn feedback_entries(&self) -> BoxFuture<'_, StoreResult<Vec<FeedbackEntry>>> {
        async move {
            let rows = sqlx::query_as::<_, FeedbackEntryRow>(
                "SELECT f.id, f.learner_id, f.curriculum_id, f.rating, f.difficulty_rating, \
                        f.feedback_text, f.would_recommend, f.is_anonymous, f.created_at, \
                        l.username AS learner_username, c.topic \
                 FROM curriculum_feedback f \
                 JOIN learner l ON l.id = f.learner_id \
                 JOIN curriculum c ON c.id = f.curriculum_id \
                 ORDER BY f.created_at DESC, f.id DESC",
            )
            .fetch_all(&self.pool)
            .await?;

            rows.into_iter()
                .map(|row| {
                    Ok(FeedbackEntry {
                        feedback: row.feedback.try_into()?,
                        learner_username: row.learner_username,
                        topic: row.topic,
                    })
                })
                .collect()
        }
        .boxed()
    }

    fn stats(&self) -> BoxFuture<'_, StoreResult<PlatformStats>> {
        async move {
            let (total_learners, active_learners, total_curricula, total_notes, total_feedback): (
                i64,
                i64,
                i64,
                i64,
                i64,
            ) = sqlx::query_as(
                "SELECT (SELECT COUNT(*) FROM learner), \
                        (SELECT COUNT(*) FROM learner WHERE is_active), \
                        (SELECT COUNT(*) FROM curriculum), \
                        (SELECT COUNT(*) FROM learner_note), \
                        (SELECT COUNT(*) FROM curriculum_feedback)",
            )
            .fetch_one(&self.pool)
            .await?;

            let topics: Vec<(String, i64)> = sqlx::query_as(
                "SELECT topic, COUNT(*) AS n FROM curriculum \
                 GROUP BY topic ORDER BY n DESC, topic LIMIT $1",
            )
            .bind(POPULAR_TOPICS)
            .fetch_all(&self.pool)
            .await?;

            Ok(PlatformStats {
                total_learners,
                active_learners,
                total_curricula,
                total_notes,
                total_feedback,
                popular_topics: topics
                    .into_iter()
                    .map(|(topic, count)| TopicCount { topic, count })
                    .collect(),
            })
        }
        .boxed()
    }
}
