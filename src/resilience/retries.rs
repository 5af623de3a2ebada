//! Retry and failover bookkeeping.
//!
//! # Responsibilities
//! - Carry per-request `{attempts, retries}` counters as an immutable value
//! - Decide whether to resubmit to the same backend or fail over
//!
//! # Design Decisions
//! - Counters are never shared between requests; each step yields a new value
//! - A fixed delay separates resubmissions to the same backend
//! - The retry count is per request, not per backend: once it is spent,
//!   every later backend is abandoned on its first failure

use std::time::Duration;

use crate::config::RetryConfig;

/// Limits applied to every request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Highest `attempts` value still allowed to select a backend.
    pub max_attempts: u32,
    /// Resubmissions to one backend before it is marked dead.
    pub max_retries: u32,
    /// Delay before each resubmission.
    pub backoff: Duration,
}

impl RetryPolicy {
    /// Whether a request carrying `state` may still select a backend.
    pub fn can_attempt(&self, state: RetryState) -> bool {
        state.attempts <= self.max_attempts
    }

    /// Whether a request carrying `state` may resubmit to its current backend.
    pub fn can_retry(&self, state: RetryState) -> bool {
        state.retries < self.max_retries
    }

    /// Most upstream round trips one request can make: every retry on the
    /// first backend plus one try per remaining attempt.
    pub fn max_upstream_contacts(&self) -> u32 {
        self.max_retries
            .saturating_add(self.max_attempts)
            .saturating_add(1)
    }

    /// Longest a request can spend dispatching when every contact runs
    /// into `connect_timeout`.
    pub fn worst_case_duration(&self, connect_timeout: Duration) -> Duration {
        connect_timeout
            .saturating_mul(self.max_upstream_contacts())
            .saturating_add(self.backoff.saturating_mul(self.max_retries))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            max_retries: config.max_retries,
            backoff: Duration::from_millis(config.backoff_ms),
        }
    }
}

/// Request-scoped counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetryState {
    /// Distinct backend selections already abandoned.
    pub attempts: u32,
    /// Resubmissions already made for this request.
    pub retries: u32,
}

impl RetryState {
    pub fn new(attempts: u32, retries: u32) -> Self {
        Self { attempts, retries }
    }

    /// State for the next resubmission to the same backend.
    #[must_use]
    pub fn next_retry(self) -> Self {
        Self {
            retries: self.retries.saturating_add(1),
            ..self
        }
    }

    /// State for re-dispatching to a freshly selected backend. The retry
    /// count carries over.
    #[must_use]
    pub fn next_attempt(self) -> Self {
        Self {
            attempts: self.attempts.saturating_add(1),
            ..self
        }
    }
}
