//! Bounded dispatch: keep up to `limit` tasks in flight until the source is
//! drained or the run is cancelled.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::{self, JoinError, JoinSet};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::event::{EventSink, TaskOutcome, TerminalEvent};
use super::guard::SlotGuard;
use super::source::WorkSource;
use super::state::{DispatcherState, Summary};
use super::worker::{self, WorkerContext};
use crate::retry::{RetryPolicy, StoreError};
use crate::store::Store;

/// Startup failure; nothing has been dispatched when this is returned.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("concurrency limit must be at least 1")]
    ZeroConcurrency,
}

/// Pool-aware task dispatcher.
pub struct Dispatcher {
    store: Arc<dyn Store>,
    policy: Arc<RetryPolicy>,
    limit: usize,
    events: Option<EventSink>,
}

impl Dispatcher {
    pub fn new(
        store: Arc<dyn Store>,
        policy: RetryPolicy,
        limit: usize,
    ) -> Result<Self, DispatchError> {
        if limit == 0 {
            return Err(DispatchError::ZeroConcurrency);
        }
        Ok(Self {
            store,
            policy: Arc::new(policy),
            limit,
            events: None,
        })
    }

    /// Send one [`TerminalEvent`] per task to `events`.
    pub fn with_events(mut self, events: EventSink) -> Self {
        self.events = Some(events);
        self
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Dispatch every descriptor from `source` with at most `limit` in flight.
    ///
    /// Descriptors are pulled only once a slot is free. For a finite source
    /// this resolves when every task is terminal; for an unbounded source it
    /// resolves only after `cancel` fires. On cancellation no new invocation
    /// starts, in-flight invocations finish, and whatever is left in a finite
    /// source is counted as abandoned.
    pub async fn run<S: WorkSource>(&self, mut source: S, cancel: &CancellationToken) -> Summary {
        let state = Arc::new(DispatcherState::new(self.limit));
        let slots = Arc::new(Semaphore::new(self.limit));
        let ctx = WorkerContext {
            store: Arc::clone(&self.store),
            policy: Arc::clone(&self.policy),
            state: Arc::clone(&state),
            events: self.events.clone(),
            cancel: cancel.clone(),
        };
        let started = Instant::now();
        let mut workers = JoinSet::new();
        // Descriptor id per live worker, so a panic can still be attributed.
        let mut running: HashMap<task::Id, u64> = HashMap::with_capacity(self.limit);
        let mut drained = false;

        tracing::info!(limit = self.limit, "dispatch started");

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                Some(joined) = workers.join_next_with_id(), if !workers.is_empty() => {
                    self.reap(joined, &mut running, &state);
                }
                permit = Arc::clone(&slots).acquire_owned() => {
                    let Ok(permit) = permit else { break };
                    let Some(task) = source.next_task() else {
                        drained = true;
                        break;
                    };
                    let task_id = task.id;
                    let slot = SlotGuard::new(permit, Arc::clone(&state));
                    let handle = workers.spawn(worker::drive(task, slot, ctx.clone()));
                    running.insert(handle.id(), task_id);
                }
            }
        }

        if !drained {
            // An unbounded source has no remainder to count.
            if let Some(pending) = source.remaining().filter(|n| *n > 0) {
                state.record_many(TaskOutcome::Abandoned, pending);
                tracing::info!(pending, "cancelled with tasks still queued");
            }
        }

        while let Some(joined) = workers.join_next_with_id().await {
            self.reap(joined, &mut running, &state);
        }

        let summary = state.summary(started.elapsed());
        tracing::info!(
            succeeded = summary.succeeded,
            failed_fatal = summary.failed_fatal,
            failed_exhausted = summary.failed_exhausted,
            abandoned = summary.abandoned,
            peak_in_flight = summary.peak_in_flight,
            elapsed_ms = summary.elapsed.as_millis() as u64,
            "dispatch finished"
        );
        summary
    }

    /// A worker that returned normally has already recorded its outcome.
    /// One that panicked has not, so record it as fatal here.
    fn reap(
        &self,
        joined: Result<(task::Id, ()), JoinError>,
        running: &mut HashMap<task::Id, u64>,
        state: &DispatcherState,
    ) {
        let e = match joined {
            Ok((id, ())) => {
                running.remove(&id);
                return;
            }
            Err(e) => e,
        };
        let task_id = running.remove(&e.id()).unwrap_or(u64::MAX);
        tracing::error!(task = task_id, error = %e, "worker task panicked");
        state.record(TaskOutcome::FailedFatal);
        if let Some(events) = &self.events {
            events.emit(TerminalEvent {
                task_id,
                outcome: TaskOutcome::FailedFatal,
                reason: None,
                error: Some(StoreError::new("WorkerPanicked", e.to_string())),
                attempts: 0,
                elapsed: std::time::Duration::ZERO,
            });
        }
    }
}

/// One-shot form of [`Dispatcher::run`].
pub async fn run<S: WorkSource>(
    source: S,
    store: Arc<dyn Store>,
    limit: usize,
    policy: RetryPolicy,
    cancel: &CancellationToken,
) -> Result<Summary, DispatchError> {
    let dispatcher = Dispatcher::new(store, policy, limit)?;
    Ok(dispatcher.run(source, cancel).await)
}
