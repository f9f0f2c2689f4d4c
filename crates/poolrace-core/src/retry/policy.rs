use std::fmt;
use std::time::Duration;

use super::classify::{ErrorKind, SignatureMatchers};
use super::error::StoreError;
use crate::config::{ConfigError, RetryConfig};

/// Per-task attempt bookkeeping, owned by the worker driving that task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttemptState {
    /// Store invocations made so far (1 after the first call fails).
    pub attempt: u32,
    /// Time since the first invocation started.
    pub elapsed: Duration,
}

/// Why the policy stopped retrying.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GiveUpReason {
    /// Error did not match any transient signature.
    Fatal,
    /// Attempt ceiling reached.
    AttemptsExhausted,
    /// Elapsed-time ceiling exceeded.
    TimeoutExhausted,
}

impl fmt::Display for GiveUpReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GiveUpReason::Fatal => write!(f, "fatal"),
            GiveUpReason::AttemptsExhausted => write!(f, "attempts-exhausted"),
            GiveUpReason::TimeoutExhausted => write!(f, "timeout-exhausted"),
        }
    }
}

/// Decision returned by the retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry after the given delay.
    Retry(Duration),
    /// Stop; the task is terminal.
    GiveUp(GiveUpReason),
}

/// Exponential backoff policy with a delay ceiling, an attempt ceiling, and an
/// elapsed-time ceiling.
///
/// Pure: `decide` never sleeps or touches I/O, so the caller owns the wait.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    matchers: SignatureMatchers,
    /// Maximum number of store invocations per task (including the first).
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Growth factor per retry; must be >= 1.
    pub exponent: f64,
    /// Upper bound on a single backoff delay.
    pub max_delay: Duration,
    /// Give up once this much time has passed since the first invocation.
    pub max_elapsed: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            matchers: SignatureMatchers::default(),
            max_attempts: 10,
            base_delay: Duration::from_millis(100),
            exponent: 1.1,
            max_delay: Duration::from_secs(30),
            max_elapsed: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Build a policy from the `[retry]` config section, compiling its matchers.
    pub fn from_config(cfg: &RetryConfig) -> Result<Self, ConfigError> {
        cfg.validate()?;
        Ok(Self {
            matchers: SignatureMatchers::new(&cfg.match_patterns)?,
            max_attempts: cfg.max_attempts,
            base_delay: Duration::from_millis(cfg.backoff_base_ms),
            exponent: cfg.backoff_exponent,
            max_delay: Duration::from_millis(cfg.max_delay_ms),
            max_elapsed: Duration::from_millis(cfg.timeout_ms),
        })
    }

    /// Replace the signature matchers.
    pub fn with_matchers(mut self, matchers: SignatureMatchers) -> Self {
        self.matchers = matchers;
        self
    }

    pub fn classify(&self, error: &StoreError) -> ErrorKind {
        self.matchers.classify(error)
    }

    /// Decide what to do after a failed invocation.
    ///
    /// Fatal errors stop immediately. Otherwise the attempt ceiling is checked
    /// before the elapsed ceiling, so the first bound hit is the one reported.
    pub fn decide(&self, error: &StoreError, state: &AttemptState) -> RetryDecision {
        if self.classify(error) == ErrorKind::Fatal {
            return RetryDecision::GiveUp(GiveUpReason::Fatal);
        }
        if state.attempt >= self.max_attempts {
            return RetryDecision::GiveUp(GiveUpReason::AttemptsExhausted);
        }
        if state.elapsed > self.max_elapsed {
            return RetryDecision::GiveUp(GiveUpReason::TimeoutExhausted);
        }
        RetryDecision::Retry(self.backoff(state.attempt))
    }

    /// Backoff before retry number `retry` (1-based):
    /// `min(max_delay, base_delay * exponent^(retry - 1))`.
    pub fn backoff(&self, retry: u32) -> Duration {
        let power = retry.saturating_sub(1).min(i32::MAX as u32) as i32;
        let raw_nanos = self.base_delay.as_nanos() as f64 * self.exponent.powi(power);
        let ceiling_nanos = self.max_delay.as_nanos() as f64;
        if !raw_nanos.is_finite() || raw_nanos >= ceiling_nanos {
            return self.max_delay;
        }
        Duration::from_nanos(raw_nanos.round() as u64)
    }
}
