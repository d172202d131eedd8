//! Admin brute-force lockout policy.
//!
//! Pure state transitions over an admin's failed-attempt counter and lock
//! expiry. Stores apply the same transitions atomically (see
//! [`crate::db::AdminUserStore::record_failure`]); this module is the single
//! definition of what those transitions mean.

use chrono::{DateTime, Duration, Utc};

/// Failures before an admin account is locked.
pub const LOCKOUT_THRESHOLD: i32 = 5;

/// How long a lock lasts.
pub const LOCKOUT_DURATION_MINUTES: i64 = 30;

/// Lockout-relevant fields of an admin principal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LockoutState {
    pub failed_attempts: i32,
    pub locked_until: Option<DateTime<Utc>>,
    pub last_login: Option<DateTime<Utc>>,
}

/// Result of evaluating a lockout state at a point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockStatus {
    Locked { remaining: Duration },
    Unlocked,
}

impl LockStatus {
    #[must_use]
    pub const fn is_locked(&self) -> bool {
        matches!(self, Self::Locked { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockoutPolicy {
    pub threshold: i32,
    pub lock_duration: Duration,
}

impl Default for LockoutPolicy {
    fn default() -> Self {
        Self {
            threshold: LOCKOUT_THRESHOLD,
            lock_duration: Duration::minutes(LOCKOUT_DURATION_MINUTES),
        }
    }
}

impl LockoutPolicy {
    /// Locked iff `locked_until` is set and strictly after `now`.
    ///
    /// The counter alone never locks; an elapsed `locked_until` reads as
    /// unlocked even before anything clears it.
    #[must_use]
    pub fn evaluate(&self, state: &LockoutState, now: DateTime<Utc>) -> LockStatus {
        match state.locked_until {
            Some(until) if until > now => LockStatus::Locked {
                remaining: until - now,
            },
            _ => LockStatus::Unlocked,
        }
    }

    /// Count one failed attempt, locking once the counter reaches the threshold.
    ///
    /// A failure recorded while locked is a no-op, so the counter cannot
    /// grow without bound during a lock.
    #[must_use]
    pub fn record_failure(&self, state: &LockoutState, now: DateTime<Utc>) -> LockoutState {
        if self.evaluate(state, now).is_locked() {
            return *state;
        }
        let failed_attempts = state.failed_attempts.saturating_add(1);
        let locked_until = if failed_attempts >= self.threshold {
            Some(now + self.lock_duration)
        } else {
            state.locked_until
        };
        LockoutState {
            failed_attempts,
            locked_until,
            last_login: state.last_login,
        }
    }

    /// Clear the counter and stamp `last_login`.
    ///
    /// A success evaluated while locked is refused and returns the state
    /// unchanged, so a lock set by concurrent failures survives.
    #[must_use]
    pub fn record_success(&self, state: &LockoutState, now: DateTime<Utc>) -> LockoutState {
        if self.evaluate(state, now).is_locked() {
            return *state;
        }
        LockoutState {
            failed_attempts: 0,
            locked_until: None,
            last_login: Some(now),
        }
    }

    /// Operator unlock. Leaves `last_login` untouched.
    #[must_use]
    pub const fn unlock(&self, state: &LockoutState) -> LockoutState {
        LockoutState {
            failed_attempts: 0,
            locked_until: None,
            last_login: state.last_login,
        }
    }

    /// `threshold - failed_attempts`, floored at zero.
    #[must_use]
    pub fn remaining_attempts(&self, state: &LockoutState) -> u32 {
        u32::try_from(self.threshold.saturating_sub(state.failed_attempts)).unwrap_or(0)
    }
}
