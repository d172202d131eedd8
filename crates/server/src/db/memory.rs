//! In-process implementations of every store trait.
//!
//! One [`MemoryDb`] holds all tables behind a single mutex, so each trait
//! method is one atomic transition just like the SQL statements in the
//! `PostgreSQL` stores. Used by unit tests and the integration suite.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use futures::FutureExt as _;
use futures::future::{BoxFuture, ready};
use uuid::Uuid;

use studyforge_core::{
    AdminSessionId, AdminUserId, CurriculumId, Email, FeedbackId, LearnerId, NoteId,
};

use super::{
    AdminSessionStore, AdminUserStore, CurriculumStore, LearnerStore, RepositoryError,
    StoreResult,
};
use crate::models::{
    AdminSession, AdminUser, Curriculum, CurriculumSummary, DeletedLearnerData, Feedback,
    FeedbackEntry, Learner, LearnerOverview, NewAdminSession, NewAdminUser, NewCurriculum,
    NewFeedback, NewLearner, NewNote, NewVerificationTicket, Note, PlatformStats, TaskProgress,
    TopicCount, VerificationTicket,
};
use crate::services::auth::lockout::{LockoutPolicy, LockoutState};

#[derive(Default)]
struct Tables {
    next_id: i32,
    admins: BTreeMap<i32, AdminUser>,
    sessions: HashMap<String, AdminSession>,
    learners: BTreeMap<i32, Learner>,
    tickets: HashMap<i32, VerificationTicket>,
    curricula: BTreeMap<i32, Curriculum>,
    /// Keyed by `(curriculum, week, task)`.
    progress: BTreeMap<(i32, i32, i32), TaskProgress>,
    notes: BTreeMap<i32, Note>,
    feedback: BTreeMap<i32, Feedback>,
}

impl Tables {
    fn allocate_id(&mut self) -> i32 {
        self.next_id += 1;
        self.next_id
    }
}

/// All stores in one process-local state.
#[derive(Clone, Default)]
pub struct MemoryDb {
    tables: Arc<Mutex<Tables>>,
    unavailable: Arc<AtomicBool>,
}

impl MemoryDb {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent call fail with [`RepositoryError::Unavailable`].
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn tables(&self) -> StoreResult<MutexGuard<'_, Tables>> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(RepositoryError::Unavailable(
                "memory store switched off".to_owned(),
            ));
        }
        self.tables
            .lock()
            .map_err(|_| RepositoryError::Unavailable("memory store poisoned".to_owned()))
    }

    /// Admin sessions for `admin` that are still marked active.
    #[must_use]
    pub fn active_sessions(&self, admin: AdminUserId) -> usize {
        self.tables.lock().map_or(0, |tables| {
            tables
                .sessions
                .values()
                .filter(|s| s.admin_user_id == admin && s.is_active)
                .count()
        })
    }

    /// Drop a learner's ticket, leaving an account that predates verification.
    #[cfg(test)]
    pub(crate) fn forget_ticket(&self, learner: LearnerId) {
        if let Ok(mut tables) = self.tables.lock() {
            tables.tickets.remove(&learner.as_i32());
        }
    }

    fn with<T, F>(&self, f: F) -> StoreResult<T>
    where
        F: FnOnce(&mut Tables) -> StoreResult<T>,
    {
        let mut tables = self.tables()?;
        f(&mut tables)
    }
}

fn done<'a, T: Send + 'a>(result: StoreResult<T>) -> BoxFuture<'a, StoreResult<T>> {
    ready(result).boxed()
}

// =============================================================================
// Admin users
// =============================================================================

impl AdminUserStore for MemoryDb {
    fn find_by_id(&self, id: AdminUserId) -> BoxFuture<'_, StoreResult<Option<AdminUser>>> {
        done(self.with(|t| Ok(t.admins.get(&id.as_i32()).cloned())))
    }

    fn find_active_by_username<'a>(
        &'a self,
        username: &'a str,
    ) -> BoxFuture<'a, StoreResult<Option<AdminUser>>> {
        done(self.with(|t| {
            Ok(t.admins
                .values()
                .find(|a| a.is_active && a.username.as_str() == username)
                .cloned())
        }))
    }

    fn email_exists<'a>(&'a self, email: &'a Email) -> BoxFuture<'a, StoreResult<bool>> {
        done(self.with(|t| Ok(t.admins.values().any(|a| &a.email == email))))
    }

    fn create<'a>(&'a self, new: &'a NewAdminUser) -> BoxFuture<'a, StoreResult<AdminUser>> {
        done(self.with(|t| {
            if t
                .admins
                .values()
                .any(|a| a.username == new.username || a.email == new.email)
            {
                return Err(RepositoryError::Conflict(
                    "admin username or email already exists".to_owned(),
                ));
            }
            let id = t.allocate_id();
            let admin = AdminUser {
                id: AdminUserId::new(id),
                username: new.username.clone(),
                email: new.email.clone(),
                full_name: new.full_name.clone(),
                password_hash: new.password_hash.clone(),
                is_active: true,
                permissions: new.permissions,
                lockout: LockoutState::default(),
                created_at: Utc::now(),
            };
            t.admins.insert(id, admin.clone());
            Ok(admin)
        }))
    }

    fn list(&self) -> BoxFuture<'_, StoreResult<Vec<AdminUser>>> {
        done(self.with(|t| {
            let mut admins: Vec<_> = t.admins.values().cloned().collect();
            admins.sort_by(|a, b| a.username.as_str().cmp(b.username.as_str()));
            Ok(admins)
        }))
    }

    fn record_failure(
        &self,
        id: AdminUserId,
        now: DateTime<Utc>,
        policy: LockoutPolicy,
    ) -> BoxFuture<'_, StoreResult<LockoutState>> {
        done(self.with(|t| {
            let admin = t
                .admins
                .get_mut(&id.as_i32())
                .ok_or(RepositoryError::NotFound)?;
            admin.lockout = policy.record_failure(&admin.lockout, now);
            Ok(admin.lockout)
        }))
    }

    fn record_success(
        &self,
        id: AdminUserId,
        now: DateTime<Utc>,
    ) -> BoxFuture<'_, StoreResult<LockoutState>> {
        done(self.with(|t| {
            let admin = t
                .admins
                .get_mut(&id.as_i32())
                .ok_or(RepositoryError::NotFound)?;
            admin.lockout = LockoutPolicy::default().record_success(&admin.lockout, now);
            Ok(admin.lockout)
        }))
    }

    fn unlock(&self, id: AdminUserId) -> BoxFuture<'_, StoreResult<()>> {
        done(self.with(|t| {
            let admin = t
                .admins
                .get_mut(&id.as_i32())
                .ok_or(RepositoryError::NotFound)?;
            admin.lockout = LockoutPolicy::default().unlock(&admin.lockout);
            Ok(())
        }))
    }

    fn unlock_by_username<'a>(&'a self, username: &'a str) -> BoxFuture<'a, StoreResult<()>> {
        done(self.with(|t| {
            let admin = t
                .admins
                .values_mut()
                .find(|a| a.username.as_str() == username)
                .ok_or(RepositoryError::NotFound)?;
            admin.lockout = LockoutPolicy::default().unlock(&admin.lockout);
            Ok(())
        }))
    }
}

// =============================================================================
// Learners
// =============================================================================

fn ticket_from(learner: LearnerId, new: &NewVerificationTicket) -> VerificationTicket {
    VerificationTicket {
        learner_id: learner,
        token: new.token,
        issued_at: new.issued_at,
        verified: new.verified,
    }
}

fn token_taken(t: &Tables, token: Uuid, except: Option<LearnerId>) -> bool {
    t.tickets
        .values()
        .any(|tk| tk.token == token && Some(tk.learner_id) != except)
}

impl LearnerStore for MemoryDb {
    fn find_by_id(&self, id: LearnerId) -> BoxFuture<'_, StoreResult<Option<Learner>>> {
        done(self.with(|t| Ok(t.learners.get(&id.as_i32()).cloned())))
    }

    fn find_by_username<'a>(
        &'a self,
        username: &'a str,
    ) -> BoxFuture<'a, StoreResult<Option<Learner>>> {
        done(self.with(|t| {
            Ok(t.learners
                .values()
                .find(|l| l.username.as_str() == username)
                .cloned())
        }))
    }

    fn find_by_email<'a>(
        &'a self,
        email: &'a Email,
    ) -> BoxFuture<'a, StoreResult<Option<Learner>>> {
        done(self.with(|t| Ok(t.learners.values().find(|l| &l.email == email).cloned())))
    }

    fn create<'a>(
        &'a self,
        new: &'a NewLearner,
        ticket: &'a NewVerificationTicket,
    ) -> BoxFuture<'a, StoreResult<(Learner, VerificationTicket)>> {
        done(self.with(|t| {
            if t
                .learners
                .values()
                .any(|l| l.username == new.username || l.email == new.email)
            {
                return Err(RepositoryError::Conflict(
                    "username or email already exists".to_owned(),
                ));
            }
            if token_taken(t, ticket.token, None) {
                return Err(RepositoryError::Conflict(
                    "verification token already exists".to_owned(),
                ));
            }
            let id = t.allocate_id();
            let learner = Learner {
                id: LearnerId::new(id),
                username: new.username.clone(),
                email: new.email.clone(),
                first_name: new.first_name.clone(),
                last_name: new.last_name.clone(),
                password_hash: new.password_hash.clone(),
                is_active: new.is_active,
                date_joined: Utc::now(),
            };
            let ticket = ticket_from(learner.id, ticket);
            t.learners.insert(id, learner.clone());
            t.tickets.insert(id, ticket.clone());
            Ok((learner, ticket))
        }))
    }

    fn ticket_for(
        &self,
        learner: LearnerId,
    ) -> BoxFuture<'_, StoreResult<Option<VerificationTicket>>> {
        done(self.with(|t| Ok(t.tickets.get(&learner.as_i32()).cloned())))
    }

    fn ticket_by_token(
        &self,
        token: Uuid,
    ) -> BoxFuture<'_, StoreResult<Option<VerificationTicket>>> {
        done(self.with(|t| Ok(t.tickets.values().find(|tk| tk.token == token).cloned())))
    }

    fn put_ticket<'a>(
        &'a self,
        learner: LearnerId,
        ticket: &'a NewVerificationTicket,
    ) -> BoxFuture<'a, StoreResult<VerificationTicket>> {
        done(self.with(|t| {
            if !t.learners.contains_key(&learner.as_i32()) {
                return Err(RepositoryError::NotFound);
            }
            if token_taken(t, ticket.token, Some(learner)) {
                return Err(RepositoryError::Conflict(
                    "verification token already exists".to_owned(),
                ));
            }
            let ticket = ticket_from(learner, ticket);
            t.tickets.insert(learner.as_i32(), ticket.clone());
            Ok(ticket)
        }))
    }

    fn mark_verified(&self, learner: LearnerId) -> BoxFuture<'_, StoreResult<()>> {
        done(self.with(|t| {
            let ticket = t
                .tickets
                .get_mut(&learner.as_i32())
                .ok_or(RepositoryError::NotFound)?;
            ticket.verified = true;
            if let Some(l) = t.learners.get_mut(&learner.as_i32()) {
                l.is_active = true;
            }
            Ok(())
        }))
    }

    fn toggle_active(&self, learner: LearnerId) -> BoxFuture<'_, StoreResult<bool>> {
        done(self.with(|t| {
            let l = t
                .learners
                .get_mut(&learner.as_i32())
                .ok_or(RepositoryError::NotFound)?;
            l.is_active = !l.is_active;
            Ok(l.is_active)
        }))
    }

    fn list(&self) -> BoxFuture<'_, StoreResult<Vec<LearnerOverview>>> {
        done(self.with(|t| {
            let mut rows: Vec<_> = t
                .learners
                .values()
                .map(|l| LearnerOverview {
                    learner: l.clone(),
                    verified: t.tickets.get(&l.id.as_i32()).is_some_and(|tk| tk.verified),
                    curriculum_count: i64::try_from(
                        t.curricula
                            .values()
                            .filter(|c| c.learner_id == l.id)
                            .count(),
                    )
                    .unwrap_or(i64::MAX),
                })
                .collect();
            rows.sort_by(|a, b| b.learner.date_joined.cmp(&a.learner.date_joined));
            Ok(rows)
        }))
    }

    fn delete(&self, learner: LearnerId) -> BoxFuture<'_, StoreResult<DeletedLearnerData>> {
        done(self.with(|t| {
            if t.learners.remove(&learner.as_i32()).is_none() {
                return Err(RepositoryError::NotFound);
            }
            t.tickets.remove(&learner.as_i32());

            let owned: Vec<i32> = t
                .curricula
                .values()
                .filter(|c| c.learner_id == learner)
                .map(|c| c.id.as_i32())
                .collect();
            let before = t.progress.len();
            t.progress.retain(|(cid, _, _), _| !owned.contains(cid));
            let progress_entries = before - t.progress.len();
            for cid in &owned {
                t.curricula.remove(cid);
            }

            // Notes and feedback go with the learner and with their curricula.
            let gone = |owner: LearnerId, curriculum: CurriculumId| {
                owner == learner || owned.contains(&curriculum.as_i32())
            };
            let notes = t.notes.values().filter(|n| n.learner_id == learner).count();
            let feedback = t.feedback.values().filter(|f| f.learner_id == learner).count();
            t.notes.retain(|_, n| !gone(n.learner_id, n.curriculum_id));
            t.feedback.retain(|_, f| !gone(f.learner_id, f.curriculum_id));

            Ok(DeletedLearnerData {
                curricula: owned.len() as u64,
                progress_entries: progress_entries as u64,
                notes: notes as u64,
                feedback: feedback as u64,
            })
        }))
    }

    fn verify_all(&self) -> BoxFuture<'_, StoreResult<u64>> {
        done(self.with(|t| {
            let mut changed = 0;
            for ticket in t.tickets.values_mut().filter(|tk| !tk.verified) {
                ticket.verified = true;
                if let Some(l) = t.learners.get_mut(&ticket.learner_id.as_i32()) {
                    l.is_active = true;
                }
                changed += 1;
            }
            Ok(changed)
        }))
    }
}

// =============================================================================
// Admin sessions
// =============================================================================

impl AdminSessionStore for MemoryDb {
    fn insert_if_absent<'a>(
        &'a self,
        new: &'a NewAdminSession,
    ) -> BoxFuture<'a, StoreResult<Option<AdminSession>>> {
        done(self.with(|t| {
            if t.sessions.contains_key(&new.token_hash) {
                return Ok(None);
            }
            let id = t.allocate_id();
            let session = AdminSession {
                id: AdminSessionId::new(id),
                admin_user_id: new.admin_user_id,
                token_hash: new.token_hash.clone(),
                created_at: new.created_at,
                expires_at: new.expires_at,
                ip_address: new.ip_address,
                user_agent: new.user_agent.clone(),
                is_active: true,
            };
            t.sessions.insert(new.token_hash.clone(), session.clone());
            Ok(Some(session))
        }))
    }

    fn find_by_token_hash<'a>(
        &'a self,
        token_hash: &'a str,
    ) -> BoxFuture<'a, StoreResult<Option<AdminSession>>> {
        done(self.with(|t| Ok(t.sessions.get(token_hash).cloned())))
    }

    fn deactivate<'a>(&'a self, token_hash: &'a str) -> BoxFuture<'a, StoreResult<bool>> {
        done(self.with(|t| {
            Ok(t.sessions
                .get_mut(token_hash)
                .filter(|s| s.is_active)
                .map(|s| s.is_active = false)
                .is_some())
        }))
    }

    fn purge_expired(&self, now: DateTime<Utc>) -> BoxFuture<'_, StoreResult<u64>> {
        done(self.with(|t| {
            let before = t.sessions.len();
            t.sessions.retain(|_, s| s.expires_at >= now);
            Ok((before - t.sessions.len()) as u64)
        }))
    }

    fn ping(&self) -> BoxFuture<'_, StoreResult<()>> {
        done(self.with(|_| Ok(())))
    }
}

// =============================================================================
// Curricula
// =============================================================================

impl CurriculumStore for MemoryDb {
    fn create<'a>(&'a self, new: &'a NewCurriculum) -> BoxFuture<'a, StoreResult<Curriculum>> {
        done(self.with(|t| {
            if !t.learners.contains_key(&new.learner_id.as_i32()) {
                return Err(RepositoryError::NotFound);
            }
            let id = t.allocate_id();
            let now = Utc::now();
            let curriculum = Curriculum {
                id: CurriculumId::new(id),
                learner_id: new.learner_id,
                topic: new.topic.clone(),
                difficulty: new.difficulty,
                duration: new.duration.clone(),
                content: new.content.clone(),
                total_tasks: i32::try_from(new.content.total_tasks()).unwrap_or(i32::MAX),
                completed_tasks: 0,
                created_at: now,
                updated_at: now,
            };
            t.curricula.insert(id, curriculum.clone());
            Ok(curriculum)
        }))
    }

    fn find_owned(
        &self,
        id: CurriculumId,
        owner: LearnerId,
    ) -> BoxFuture<'_, StoreResult<Option<Curriculum>>> {
        done(self.with(|t| {
            Ok(t.curricula
                .get(&id.as_i32())
                .filter(|c| c.learner_id == owner)
                .cloned())
        }))
    }

    fn list_for(&self, owner: LearnerId) -> BoxFuture<'_, StoreResult<Vec<Curriculum>>> {
        done(self.with(|t| {
            let mut list: Vec<_> = t
                .curricula
                .values()
                .filter(|c| c.learner_id == owner)
                .cloned()
                .collect();
            list.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            Ok(list)
        }))
    }

    fn record_completion(
        &self,
        curriculum: CurriculumId,
        week_number: i32,
        task_index: i32,
        completed: bool,
        now: DateTime<Utc>,
    ) -> BoxFuture<'_, StoreResult<Curriculum>> {
        done(self.with(|t| {
            let cid = curriculum.as_i32();
            if !t.curricula.contains_key(&cid) {
                return Err(RepositoryError::NotFound);
            }
            t.progress.insert(
                (cid, week_number, task_index),
                TaskProgress {
                    week_number,
                    task_index,
                    completed,
                    completed_at: completed.then_some(now),
                },
            );
            let done_count = t
                .progress
                .iter()
                .filter(|((c, _, _), p)| *c == cid && p.completed)
                .count();
            let c = t
                .curricula
                .get_mut(&cid)
                .ok_or(RepositoryError::NotFound)?;
            c.completed_tasks = i32::try_from(done_count).unwrap_or(i32::MAX);
            c.updated_at = now;
            Ok(c.clone())
        }))
    }

    fn progress(&self, curriculum: CurriculumId) -> BoxFuture<'_, StoreResult<Vec<TaskProgress>>> {
        done(self.with(|t| {
            Ok(t.progress
                .iter()
                .filter(|((c, _, _), _)| *c == curriculum.as_i32())
                .map(|(_, p)| p.clone())
                .collect())
        }))
    }

    fn add_note<'a>(&'a self, new: &'a NewNote) -> BoxFuture<'a, StoreResult<Note>> {
        done(self.with(|t| {
            if !t.curricula.contains_key(&new.curriculum_id.as_i32()) {
                return Err(RepositoryError::NotFound);
            }
            let id = t.allocate_id();
            let now = Utc::now();
            let note = Note {
                id: NoteId::new(id),
                learner_id: new.learner_id,
                curriculum_id: new.curriculum_id,
                week_number: new.week_number,
                task_index: new.task_index,
                title: new.title.clone(),
                content: new.content.clone(),
                is_public: new.is_public,
                created_at: now,
                updated_at: now,
            };
            t.notes.insert(id, note.clone());
            Ok(note)
        }))
    }

    fn notes_for(
        &self,
        curriculum: CurriculumId,
        owner: LearnerId,
        week_number: i32,
    ) -> BoxFuture<'_, StoreResult<Vec<Note>>> {
        done(self.with(|t| {
            // Newest first; ids break ties between notes made in the same instant.
            let mut notes: Vec<_> = t
                .notes
                .values()
                .filter(|n| {
                    n.curriculum_id == curriculum
                        && n.learner_id == owner
                        && n.week_number == Some(week_number)
                })
                .cloned()
                .collect();
            notes.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
            Ok(notes)
        }))
    }

    fn upsert_feedback<'a>(
        &'a self,
        new: &'a NewFeedback,
        now: DateTime<Utc>,
    ) -> BoxFuture<'a, StoreResult<(Feedback, bool)>> {
        done(self.with(|t| {
            if !t.curricula.contains_key(&new.curriculum_id.as_i32()) {
                return Err(RepositoryError::NotFound);
            }
            let existing = t
                .feedback
                .values()
                .find(|f| f.learner_id == new.learner_id && f.curriculum_id == new.curriculum_id)
                .map(|f| (f.id, f.created_at));
            let (id, created_at, created) = match existing {
                Some((id, created_at)) => (id, created_at, false),
                None => (FeedbackId::new(t.allocate_id()), now, true),
            };
            let feedback = Feedback {
                id,
                learner_id: new.learner_id,
                curriculum_id: new.curriculum_id,
                rating: new.rating,
                difficulty_rating: new.difficulty_rating,
                feedback_text: new.feedback_text.clone(),
                would_recommend: new.would_recommend,
                is_anonymous: new.is_anonymous,
                created_at,
            };
            t.feedback.insert(id.as_i32(), feedback.clone());
            Ok((feedback, created))
        }))
    }

    fn overview(&self) -> BoxFuture<'_, StoreResult<Vec<CurriculumSummary>>> {
        done(self.with(|t| {
            let count = |n: usize| i64::try_from(n).unwrap_or(i64::MAX);
            let mut rows: Vec<_> = t
                .curricula
                .values()
                .map(|c| {
                    let ratings: Vec<i32> = t
                        .feedback
                        .values()
                        .filter(|f| f.curriculum_id == c.id)
                        .map(|f| f.rating.get())
                        .collect();
                    let average_rating = (!ratings.is_empty()).then(|| {
                        f64::from(ratings.iter().sum::<i32>())
                            / f64::from(u32::try_from(ratings.len()).unwrap_or(u32::MAX))
                    });
                    CurriculumSummary {
                        curriculum: c.clone(),
                        owner: t
                            .learners
                            .get(&c.learner_id.as_i32())
                            .map(|l| l.username.to_string())
                            .unwrap_or_default(),
                        feedback_count: count(ratings.len()),
                        notes_count: count(
                            t.notes.values().filter(|n| n.curriculum_id == c.id).count(),
                        ),
                        average_rating,
                    }
                })
                .collect();
            rows.sort_by(|a, b| {
                b.curriculum
                    .created_at
                    .cmp(&a.curriculum.created_at)
                    .then(b.curriculum.id.cmp(&a.curriculum.id))
            });
            Ok(rows)
        }))
    }

    fn feedback_entries(&self) -> BoxFuture<'_, StoreResult<Vec<FeedbackEntry>>> {
        done(self.with(|t| {
            let mut rows: Vec<_> = t
                .feedback
                .values()
                .map(|f| FeedbackEntry {
                    feedback: f.clone(),
                    learner_username: t
                        .learners
                        .get(&f.learner_id.as_i32())
                        .map(|l| l.username.to_string())
                        .unwrap_or_default(),
                    topic: t
                        .curricula
                        .get(&f.curriculum_id.as_i32())
                        .map(|c| c.topic.clone())
                        .unwrap_or_default(),
                })
                .collect();
            rows.sort_by(|a, b| {
                b.feedback
                    .created_at
                    .cmp(&a.feedback.created_at)
                    .then(b.feedback.id.cmp(&a.feedback.id))
            });
            Ok(rows)
        }))
    }

    fn stats(&self) -> BoxFuture<'_, StoreResult<PlatformStats>> {
        done(self.with(|t| {
            let mut by_topic: HashMap<&str, i64> = HashMap::new();
            for c in t.curricula.values() {
                *by_topic.entry(c.topic.as_str()).or_default() += 1;
            }
            let mut popular_topics: Vec<TopicCount> = by_topic
                .into_iter()
                .map(|(topic, count)| TopicCount {
                    topic: topic.to_owned(),
                    count,
                })
                .collect();
            popular_topics.sort_by(|a, b| b.count.cmp(&a.count).then(a.topic.cmp(&b.topic)));
            popular_topics.truncate(5);

            let count = |n: usize| i64::try_from(n).unwrap_or(i64::MAX);
            Ok(PlatformStats {
                total_learners: count(t.learners.len()),
                active_learners: count(t.learners.values().filter(|l| l.is_active).count()),
                total_curricula: count(t.curricula.len()),
                total_notes: count(t.notes.len()),
                total_feedback: count(t.feedback.len()),
                popular_topics,
            })
        }))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::Duration;
    use secrecy::SecretString;
    use serde_json::json;
    use studyforge_core::{AdminPermissions, CurriculumOutline, Difficulty, Username};

    use super::*;

    fn new_admin(name: &str) -> NewAdminUser {
        NewAdminUser {
            username: Username::parse(name).unwrap(),
            email: Email::parse(&format!("{name}@example.com")).unwrap(),
            full_name: name.to_owned(),
            password_hash: SecretString::from("hash".to_owned()),
            permissions: AdminPermissions::default(),
        }
    }

    fn new_learner(name: &str) -> NewLearner {
        NewLearner {
            username: Username::parse(name).unwrap(),
            email: Email::parse(&format!("{name}@example.com")).unwrap(),
            first_name: String::new(),
            last_name: String::new(),
            password_hash: SecretString::from("hash".to_owned()),
            is_active: true,
        }
    }

    #[tokio::test]
    async fn test_admin_uniqueness() {
        let db = MemoryDb::new();
        AdminUserStore::create(&db, &new_admin("root")).await.unwrap();
        let err = AdminUserStore::create(&db, &new_admin("root"))
            .await
            .unwrap_err();
        assert!(matches!(err, RepositoryError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_record_failure_locks_after_threshold() {
        let db = MemoryDb::new();
        let admin = AdminUserStore::create(&db, &new_admin("root")).await.unwrap();
        let now = Utc::now();
        let policy = LockoutPolicy::default();
        let mut state = LockoutState::default();
        for _ in 0..5 {
            state = db.record_failure(admin.id, now, policy).await.unwrap();
        }
        assert_eq!(state.failed_attempts, 5);
        assert!(policy.evaluate(&state, now).is_locked());

        // Locked: further failures leave the counter alone.
        let again = db.record_failure(admin.id, now, policy).await.unwrap();
        assert_eq!(again, state);
    }

    #[tokio::test]
    async fn test_record_success_refused_while_locked() {
        let db = MemoryDb::new();
        let admin = AdminUserStore::create(&db, &new_admin("root")).await.unwrap();
        let now = Utc::now();
        let policy = LockoutPolicy::default();
        for _ in 0..5 {
            db.record_failure(admin.id, now, policy).await.unwrap();
        }

        let refused = db.record_success(admin.id, now).await.unwrap();
        assert_eq!(refused.failed_attempts, 5);
        assert!(policy.evaluate(&refused, now).is_locked());
        assert_eq!(refused.last_login, None);

        let later = now + Duration::minutes(30);
        let reset = db.record_success(admin.id, later).await.unwrap();
        assert_eq!(reset.failed_attempts, 0);
        assert_eq!(reset.locked_until, None);
        assert_eq!(reset.last_login, Some(later));

        assert!(matches!(
            db.record_success(AdminUserId::new(999), now).await,
            Err(RepositoryError::NotFound)
        ));
    }

    #[tokio::test]
    async fn test_session_insert_if_absent() {
        let db = MemoryDb::new();
        let now = Utc::now();
        let new = NewAdminSession {
            admin_user_id: AdminUserId::new(1),
            token_hash: "h".to_owned(),
            created_at: now,
            expires_at: now + Duration::hours(8),
            ip_address: "127.0.0.1".parse().unwrap(),
            user_agent: String::new(),
        };
        assert!(db.insert_if_absent(&new).await.unwrap().is_some());
        assert!(db.insert_if_absent(&new).await.unwrap().is_none());
        assert!(db.deactivate("h").await.unwrap());
        assert!(!db.deactivate("h").await.unwrap());
        assert!(!db.deactivate("unknown").await.unwrap());
    }

    #[tokio::test]
    async fn test_purge_only_removes_expired() {
        let db = MemoryDb::new();
        let now = Utc::now();
        for (hash, expires) in [("old", now - Duration::minutes(1)), ("new", now + Duration::hours(1))] {
            db.insert_if_absent(&NewAdminSession {
                admin_user_id: AdminUserId::new(1),
                token_hash: hash.to_owned(),
                created_at: now,
                expires_at: expires,
                ip_address: "127.0.0.1".parse().unwrap(),
                user_agent: String::new(),
            })
            .await
            .unwrap();
        }
        assert_eq!(db.purge_expired(now).await.unwrap(), 1);
        assert!(db.find_by_token_hash("new").await.unwrap().is_some());
        assert!(db.find_by_token_hash("old").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_learner_cascades() {
        let db = MemoryDb::new();
        let (learner, _) = LearnerStore::create(
            &db,
            &new_learner("bob"),
            &NewVerificationTicket::fresh(Utc::now()),
        )
        .await
        .unwrap();
        let content = CurriculumOutline::normalize(json!([{"week": 1, "tasks": ["a", "b"]}])).unwrap();
        let curriculum = CurriculumStore::create(
            &db,
            &NewCurriculum {
                learner_id: learner.id,
                topic: "Rust".to_owned(),
                difficulty: Difficulty::Beginner,
                duration: "1 week".to_owned(),
                content,
            },
        )
        .await
        .unwrap();
        db.record_completion(curriculum.id, 1, 0, true, Utc::now())
            .await
            .unwrap();

        let deleted = LearnerStore::delete(&db, learner.id).await.unwrap();
        assert_eq!(
            deleted,
            DeletedLearnerData {
                curricula: 1,
                progress_entries: 1,
                notes: 0,
                feedback: 0,
            }
        );
        assert!(db.ticket_for(learner.id).await.unwrap().is_none());
        assert!(matches!(
            LearnerStore::delete(&db, learner.id).await,
            Err(RepositoryError::NotFound)
        ));
    }

    #[tokio::test]
    async fn test_record_completion_recounts() {
        let db = MemoryDb::new();
        let (learner, _) = LearnerStore::create(
            &db,
            &new_learner("ann"),
            &NewVerificationTicket::verified(Utc::now()),
        )
        .await
        .unwrap();
        let content =
            CurriculumOutline::normalize(json!([{"week": 1, "tasks": ["a", "b", "c", "d"]}])).unwrap();
        let c = CurriculumStore::create(
            &db,
            &NewCurriculum {
                learner_id: learner.id,
                topic: "Go".to_owned(),
                difficulty: Difficulty::Advanced,
                duration: "1 week".to_owned(),
                content,
            },
        )
        .await
        .unwrap();
        assert_eq!(c.total_tasks, 4);

        let now = Utc::now();
        db.record_completion(c.id, 1, 0, true, now).await.unwrap();
        let c2 = db.record_completion(c.id, 1, 1, true, now).await.unwrap();
        assert_eq!(c2.completed_tasks, 2);
        assert!((c2.percentage() - 50.0).abs() < f64::EPSILON);

        let c3 = db.record_completion(c.id, 1, 0, false, now).await.unwrap();
        assert_eq!(c3.completed_tasks, 1);
    }

    #[tokio::test]
    async fn test_unavailable_switch() {
        let db = MemoryDb::new();
        db.set_unavailable(true);
        assert!(db.ping().await.unwrap_err().is_unavailable());
        db.set_unavailable(false);
        db.ping().await.unwrap();
    }
}
