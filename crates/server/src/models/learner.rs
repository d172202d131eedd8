//! Learner principal and e-mail verification ticket types.

use chrono::{DateTime, Duration, Utc};
use secrecy::SecretString;
use serde::Serialize;
use uuid::Uuid;

use studyforge_core::{Email, LearnerId, Username};

/// A learner (domain type).
#[derive(Debug, Clone)]
pub struct Learner {
    pub id: LearnerId,
    pub username: Username,
    pub email: Email,
    pub first_name: String,
    pub last_name: String,
    /// Argon2id PHC string.
    pub password_hash: SecretString,
    /// Gated by e-mail verification when verification is required.
    pub is_active: bool,
    pub date_joined: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewLearner {
    pub username: Username,
    pub email: Email,
    pub first_name: String,
    pub last_name: String,
    pub password_hash: SecretString,
    pub is_active: bool,
}

/// One-to-one e-mail verification state for a learner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationTicket {
    pub learner_id: LearnerId,
    pub token: Uuid,
    pub issued_at: Option<DateTime<Utc>>,
    pub verified: bool,
}

impl VerificationTicket {
    /// Expired iff never issued, or `now` is past `issued_at + window`.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>, window: Duration) -> bool {
        self.issued_at.is_none_or(|issued| now > issued + window)
    }
}

#[derive(Debug, Clone)]
pub struct NewVerificationTicket {
    pub token: Uuid,
    pub issued_at: Option<DateTime<Utc>>,
    pub verified: bool,
}

impl NewVerificationTicket {
    /// A fresh, unverified ticket issued at `now`.
    #[must_use]
    pub fn fresh(now: DateTime<Utc>) -> Self {
        Self {
            token: Uuid::new_v4(),
            issued_at: Some(now),
            verified: false,
        }
    }

    /// An already-verified ticket, for accounts that predate verification.
    #[must_use]
    pub fn verified(now: DateTime<Utc>) -> Self {
        Self {
            token: Uuid::new_v4(),
            issued_at: Some(now),
            verified: true,
        }
    }
}

/// A learner row in the admin listing.
#[derive(Debug, Clone)]
pub struct LearnerOverview {
    pub learner: Learner,
    pub verified: bool,
    pub curriculum_count: i64,
}

/// What went away with a deleted learner.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DeletedLearnerData {
    pub curricula: u64,
    pub progress_entries: u64,
    pub notes: u64,
    pub feedback: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TopicCount {
    pub topic: String,
    pub count: i64,
}

/// Platform-wide counters for the admin dashboard.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PlatformStats {
    pub total_learners: i64,
    pub active_learners: i64,
    pub total_curricula: i64,
    pub total_notes: i64,
    pub total_feedback: i64,
    pub popular_topics: Vec<TopicCount>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn ticket(issued_at: Option<DateTime<Utc>>) -> VerificationTicket {
        VerificationTicket {
            learner_id: LearnerId::new(1),
            token: Uuid::new_v4(),
            issued_at,
            verified: false,
        }
    }

    #[test]
    fn test_ticket_without_issue_date_is_expired() {
        let now = Utc.with_ymd_and_hms(2026, 5, 1, 0, 0, 0).unwrap();
        assert!(ticket(None).is_expired(now, Duration::days(7)));
    }

    #[test]
    fn test_ticket_expiry_window() {
        let issued = Utc.with_ymd_and_hms(2026, 5, 1, 0, 0, 0).unwrap();
        let t = ticket(Some(issued));
        let window = Duration::days(7);
        assert!(!t.is_expired(issued + Duration::days(7), window));
        assert!(t.is_expired(issued + Duration::days(7) + Duration::seconds(1), window));
        assert!(t.is_expired(issued + Duration::days(8), window));
    }
}
