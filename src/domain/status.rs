//! Authentication-relevant account status and the throttling policy.
//!
//! Two independent state machines live on a user record:
//!
//! - activation: `Unactivated -> Activated`, one way, via code exchange;
//! - lockout: `Normal -> TemporarilySuspended -> Normal` (timeout or admin), and
//!   `Normal | TemporarilySuspended -> Banned`, which never reverts.
//!
//! Everything here is pure so that the repository can run it inside its
//! read-modify-write cycle, which may re-apply it after a version conflict.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use super::clock;
use crate::config::AuthThrottleConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivationState {
    Unactivated,
    Activated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum LockoutStatus {
    Normal,
    TemporarilySuspended { until: DateTime<Utc> },
    Banned,
}

/// Throttle columns of a user row.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ThrottleState {
    pub failed_attempts: i32,
    pub last_failed_at: Option<DateTime<Utc>>,
    pub suspended_until: Option<DateTime<Utc>>,
    pub suspension_count: i32,
    pub banned_at: Option<DateTime<Utc>>,
}

impl ThrottleState {
    #[must_use]
    pub fn status(&self, now: DateTime<Utc>) -> LockoutStatus {
        if self.banned_at.is_some() {
            return LockoutStatus::Banned;
        }
        match self.suspended_until {
            Some(until) if until > now => LockoutStatus::TemporarilySuspended { until },
            _ => LockoutStatus::Normal,
        }
    }

    /// Admin lift of a temporary suspension. Has no effect on a ban.
    pub fn unsuspend(&mut self) {
        self.suspended_until = None;
        self.failed_attempts = 0;
        self.last_failed_at = None;
    }

    pub fn ban(&mut self, now: DateTime<Utc>) {
        if self.banned_at.is_none() {
            self.banned_at = Some(now);
        }
        self.suspended_until = None;
    }
}

/// Escalating lockout policy built from `[security.auth_throttle]`.
#[derive(Debug, Clone)]
pub struct ThrottlePolicy {
    pub max_attempts: u32,
    pub window: Duration,
    pub lockout: Duration,
    pub suspensions_before_ban: u32,
    login_base_delay_ms: u64,
    login_max_delay_ms: u64,
    password_base_delay_ms: u64,
    password_max_delay_ms: u64,
}

impl From<&AuthThrottleConfig> for ThrottlePolicy {
    fn from(cfg: &AuthThrottleConfig) -> Self {
        Self {
            max_attempts: cfg.max_attempts.max(1),
            window: clock::seconds(cfg.window_seconds),
            lockout: clock::seconds(cfg.lockout_seconds),
            suspensions_before_ban: cfg.suspensions_before_ban,
            login_base_delay_ms: cfg.login_base_delay_ms,
            login_max_delay_ms: cfg.login_max_delay_ms,
            password_base_delay_ms: cfg.password_base_delay_ms,
            password_max_delay_ms: cfg.password_max_delay_ms,
        }
    }
}

impl ThrottlePolicy {
    /// Records one failed password check and returns the resulting status.
    ///
    /// Failures older than the window do not count towards the next lockout.
    /// Reaching `max_attempts` starts a timed suspension; reaching
    /// `suspensions_before_ban` suspensions bans the account.
    pub fn record_failure(&self, state: &mut ThrottleState, now: DateTime<Utc>) -> LockoutStatus {
        if state.banned_at.is_some() {
            return LockoutStatus::Banned;
        }

        let window_expired = state
            .last_failed_at
            .is_none_or(|last| now - last > self.window);
        if window_expired {
            state.failed_attempts = 0;
        }

        state.failed_attempts += 1;
        state.last_failed_at = Some(now);

        if state.failed_attempts < i32::try_from(self.max_attempts).unwrap_or(i32::MAX) {
            return state.status(now);
        }

        state.failed_attempts = 0;
        state.suspension_count += 1;

        let ban_threshold = i32::try_from(self.suspensions_before_ban).unwrap_or(i32::MAX);
        if self.suspensions_before_ban > 0 && state.suspension_count >= ban_threshold {
            state.ban(now);
        } else {
            state.suspended_until = Some(clock::deadline(now, self.lockout));
        }

        state.status(now)
    }

    /// Clears counters after a successful login.
    pub fn record_success(&self, state: &mut ThrottleState) {
        state.failed_attempts = 0;
        state.last_failed_at = None;
        state.suspended_until = None;
        state.suspension_count = 0;
    }

    /// Delay before answering a failed login, `base * 2^(n-1)` capped.
    #[must_use]
    pub fn login_delay(&self, failures: u32) -> std::time::Duration {
        backoff(self.login_base_delay_ms, self.login_max_delay_ms, failures)
    }

    #[must_use]
    pub fn password_delay(&self, failures: u32) -> std::time::Duration {
        backoff(self.password_base_delay_ms, self.password_max_delay_ms, failures)
    }
}

fn backoff(base_ms: u64, max_ms: u64, failures: u32) -> std::time::Duration {
    if failures == 0 || base_ms == 0 {
        return std::time::Duration::ZERO;
    }
    let factor = 1u64.checked_shl(failures.saturating_sub(1)).unwrap_or(u64::MAX);
    let delay = base_ms.saturating_mul(factor).min(max_ms);
    std::time::Duration::from_millis(delay)
}
