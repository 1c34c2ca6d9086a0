//! Retry policy and attempt state machine
//!
//! The executor loop drives a [`RetryState`]: each failure is recorded and the
//! state answers with either a delay before the next attempt or the terminal
//! error. Backoff and exhaustion are decided here, away from HTTP.

use chrono::{DateTime, Utc};
use std::time::Duration;

use super::error::ClientError;

/// Per-call retry parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one
    pub max_attempts: u32,
    /// Hard deadline for each attempt
    pub attempt_timeout: Duration,
    /// Delay after the first failure; doubled for each later one
    pub initial_backoff: Duration,
    /// Cap for the computed exponential delay
    pub max_backoff: Duration,
    /// Server hints longer than this end the call instead of waiting
    pub max_retry_after: Duration,
    /// Additional statuses treated as service-unavailable
    pub retryable_statuses: Vec<u16>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            attempt_timeout: Duration::from_secs(10),
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(30),
            max_retry_after: Duration::from_secs(60),
            retryable_statuses: Vec::new(),
        }
    }
}

impl RetryPolicy {
    /// Single attempt, no retries.
    pub fn no_retry() -> Self {
        Self::default().with_max_attempts(1)
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = timeout;
        self
    }

    pub fn with_initial_backoff(mut self, backoff: Duration) -> Self {
        self.initial_backoff = backoff;
        self
    }

    pub fn with_max_backoff(mut self, backoff: Duration) -> Self {
        self.max_backoff = backoff;
        self
    }

    pub fn with_max_retry_after(mut self, limit: Duration) -> Self {
        self.max_retry_after = limit;
        self
    }

    pub fn with_retryable_statuses(mut self, statuses: Vec<u16>) -> Self {
        self.retryable_statuses = statuses;
        self
    }

    /// Attempts actually allowed; at least one.
    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Exponential delay after the failed attempt with 0-based index `attempt`.
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        self.initial_backoff
            .checked_mul(factor)
            .unwrap_or(self.max_backoff)
            .min(self.max_backoff)
    }
}

/// What to do after a failed attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Sleep this long, then try again
    RetryAfter(Duration),
    /// Stop and surface this error
    GiveUp(ClientError),
}

/// Transient state of one call: how many attempts have been started.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RetryState {
    attempts: u32,
}

impl RetryState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark the start of an attempt; returns its 1-based number.
    pub fn begin_attempt(&mut self) -> u32 {
        self.attempts += 1;
        self.attempts
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Decide the next step after the current attempt failed with `error`.
    ///
    /// Non-idempotent requests are only retried when the error proves the
    /// upstream did not act on the request.
    pub fn record_failure(
        &self,
        error: ClientError,
        policy: &RetryPolicy,
        idempotent: bool,
    ) -> RetryDecision {
        if !error.is_retryable() || self.attempts >= policy.attempts() {
            return RetryDecision::GiveUp(error);
        }
        if !idempotent && !error.request_not_processed() {
            return RetryDecision::GiveUp(error);
        }

        let backoff = policy.backoff_for(self.attempts.saturating_sub(1));
        match error.retry_after() {
            Some(hint) if hint > policy.max_retry_after => RetryDecision::GiveUp(error),
            Some(hint) => RetryDecision::RetryAfter(hint.max(backoff)),
            None => RetryDecision::RetryAfter(backoff),
        }
    }
}

/// Parse a `Retry-After` header: delta-seconds or an HTTP-date.
///
/// Dates in the past yield a zero delay.
pub fn parse_retry_after(value: &str, now: DateTime<Utc>) -> Option<Duration> {
    let value = value.trim();
    if let Ok(seconds) = value.parse::<u64>() {
        return Some(Duration::from_secs(seconds));
    }

    let date = DateTime::parse_from_rfc2822(value).ok()?;
    let delta = date.with_timezone(&Utc) - now;
    Some(delta.to_std().unwrap_or(Duration::ZERO))
}
