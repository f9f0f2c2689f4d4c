//! Retry loop: invoke until success, give-up, or cancellation.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::error::StoreError;
use super::policy::{AttemptState, GiveUpReason, RetryDecision, RetryPolicy};

/// How a retried operation ended.
#[derive(Debug)]
pub enum RetryOutcome<T> {
    Succeeded(T),
    GaveUp {
        reason: GiveUpReason,
        error: StoreError,
    },
    /// Cancelled before the next invocation could start.
    Abandoned,
}

/// Result of [`run_with_retry`] plus the bookkeeping the caller reports.
#[derive(Debug)]
pub struct RetryRun<T> {
    pub outcome: RetryOutcome<T>,
    /// Invocations actually made.
    pub attempts: u32,
    pub elapsed: Duration,
}

/// Runs `f` until it succeeds or the retry policy says to stop.
///
/// On a retryable failure, waits for the backoff delay then tries again.
/// No invocation starts once `cancel` has fired; a wait in progress is cut
/// short and the run ends as `Abandoned`.
pub async fn run_with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    mut f: F,
) -> RetryRun<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, StoreError>>,
{
    let started = Instant::now();
    let mut attempt = 0u32;
    loop {
        if cancel.is_cancelled() {
            return RetryRun {
                outcome: RetryOutcome::Abandoned,
                attempts: attempt,
                elapsed: started.elapsed(),
            };
        }
        attempt += 1;
        let error = match f().await {
            Ok(value) => {
                return RetryRun {
                    outcome: RetryOutcome::Succeeded(value),
                    attempts: attempt,
                    elapsed: started.elapsed(),
                }
            }
            Err(e) => e,
        };
        let state = AttemptState {
            attempt,
            elapsed: started.elapsed(),
        };
        match policy.decide(&error, &state) {
            RetryDecision::GiveUp(reason) => {
                return RetryRun {
                    outcome: RetryOutcome::GaveUp { reason, error },
                    attempts: attempt,
                    elapsed: state.elapsed,
                }
            }
            RetryDecision::Retry(delay) => {
                tracing::debug!(
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    signature = %error.signature,
                    "transient store error, backing off"
                );
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = cancel.cancelled() => {}
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn refused() -> StoreError {
        StoreError::new("ConnectionRefusedError", "refused")
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_after_transient_failures() {
        let policy = RetryPolicy::default();
        let calls = &AtomicU32::new(0);
        let run = run_with_retry(&policy, &CancellationToken::new(), move || async move {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(refused())
            } else {
                Ok(7)
            }
        })
        .await;
        assert!(matches!(run.outcome, RetryOutcome::Succeeded(7)));
        assert_eq!(run.attempts, 3);
        // 100ms + 110ms of backoff on the paused clock.
        assert!(run.elapsed >= Duration::from_millis(210));
        assert!(run.elapsed < Duration::from_millis(220));
    }

    #[tokio::test(start_paused = true)]
    async fn elapsed_ceiling_stops_retrying() {
        let mut policy = RetryPolicy::default();
        policy.max_attempts = u32::MAX;
        policy.base_delay = Duration::from_secs(1);
        policy.exponent = 1.0;
        policy.max_elapsed = Duration::from_millis(2500);
        let run = run_with_retry(&policy, &CancellationToken::new(), || async {
            Err::<(), _>(refused())
        })
        .await;
        match run.outcome {
            RetryOutcome::GaveUp { reason, .. } => {
                assert_eq!(reason, GiveUpReason::TimeoutExhausted)
            }
            other => panic!("expected give-up, got {other:?}"),
        }
        assert_eq!(run.attempts, 4);
    }

    #[tokio::test]
    async fn cancelled_before_start_makes_no_call() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let calls = &AtomicU32::new(0);
        let run = run_with_retry(&RetryPolicy::default(), &cancel, move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok::<_, StoreError>(())
        })
        .await;
        assert!(matches!(run.outcome, RetryOutcome::Abandoned));
        assert_eq!(run.attempts, 0);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_during_backoff_abandons() {
        let mut policy = RetryPolicy::default();
        policy.base_delay = Duration::from_secs(60);
        policy.max_delay = Duration::from_secs(60);
        policy.max_elapsed = Duration::from_secs(600);
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            trigger.cancel();
        });
        let calls = &AtomicU32::new(0);
        let run = run_with_retry(&policy, &cancel, move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err::<(), _>(refused())
        })
        .await;
        assert!(matches!(run.outcome, RetryOutcome::Abandoned));
        assert_eq!(run.attempts, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
