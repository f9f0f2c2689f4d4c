//! Drive one task from its first invocation to a terminal outcome.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use super::event::{EventSink, TaskOutcome, TaskState, TerminalEvent};
use super::guard::SlotGuard;
use super::source::TaskDescriptor;
use super::state::DispatcherState;
use crate::retry::{run_with_retry, GiveUpReason, RetryOutcome, RetryPolicy};
use crate::store::Store;

/// Everything a worker needs besides its task and slot.
#[derive(Clone)]
pub(super) struct WorkerContext {
    pub(super) store: Arc<dyn Store>,
    pub(super) policy: Arc<RetryPolicy>,
    pub(super) state: Arc<DispatcherState>,
    pub(super) events: Option<EventSink>,
    pub(super) cancel: CancellationToken,
}

/// Runs `task` while holding `slot` across every retry, records the outcome,
/// releases the slot, then emits the terminal event.
pub(super) async fn drive(task: TaskDescriptor, slot: SlotGuard, ctx: WorkerContext) {
    tracing::trace!(task = task.id, state = ?TaskState::InFlight);

    let store = &*ctx.store;
    let query = &task.query;
    let run = run_with_retry(&ctx.policy, &ctx.cancel, move || store.execute(query)).await;

    let (outcome, reason, error) = match run.outcome {
        RetryOutcome::Succeeded(_) => (TaskOutcome::Succeeded, None, None),
        RetryOutcome::GaveUp { reason, error } => {
            let outcome = match reason {
                GiveUpReason::Fatal => TaskOutcome::FailedFatal,
                GiveUpReason::AttemptsExhausted | GiveUpReason::TimeoutExhausted => {
                    TaskOutcome::FailedExhausted
                }
            };
            tracing::warn!(
                task = task.id,
                attempts = run.attempts,
                %reason,
                error = %error,
                "task failed"
            );
            (outcome, Some(reason), Some(error))
        }
        RetryOutcome::Abandoned => (TaskOutcome::Abandoned, None, None),
    };

    ctx.state.record(outcome);
    drop(slot);
    tracing::trace!(task = task.id, state = ?TaskState::Done(outcome), attempts = run.attempts);

    if let Some(events) = &ctx.events {
        events.emit(TerminalEvent {
            task_id: task.id,
            outcome,
            reason,
            error,
            attempts: run.attempts,
            elapsed: run.elapsed,
        });
    }
}
