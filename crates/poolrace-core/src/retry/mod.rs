//! Retry and backoff policy.
//!
//! This module encapsulates error classification (connection failures,
//! timeouts, read resets) and exponential backoff decisions so that the
//! dispatcher's workers share one consistent, side-effect-free policy.

mod classify;
mod error;
mod policy;
mod run;

pub use classify::{ErrorKind, SignatureMatchers, DEFAULT_MATCH_PATTERNS};
pub use error::StoreError;
pub use policy::{AttemptState, GiveUpReason, RetryDecision, RetryPolicy};
pub use run::{run_with_retry, RetryOutcome, RetryRun};
