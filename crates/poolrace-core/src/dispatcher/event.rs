//! Per-task lifecycle and the terminal event emitted to observers.

use std::fmt;
use std::time::Duration;

use tokio::sync::mpsc;

use crate::retry::{GiveUpReason, StoreError};

/// Lifecycle of one task.
///
/// `Pending -> InFlight -> {Succeeded | Retrying -> InFlight | FailedFatal |
/// FailedExhausted}`; a task still pending or retrying at cancellation ends
/// `Abandoned`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Pending,
    InFlight,
    Retrying,
    Done(TaskOutcome),
}

impl TaskState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskState::Done(_))
    }
}

/// Terminal outcome of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskOutcome {
    Succeeded,
    FailedFatal,
    FailedExhausted,
    Abandoned,
}

impl fmt::Display for TaskOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskOutcome::Succeeded => "succeeded",
            TaskOutcome::FailedFatal => "failed-fatal",
            TaskOutcome::FailedExhausted => "failed-exhausted",
            TaskOutcome::Abandoned => "abandoned",
        };
        f.write_str(s)
    }
}

/// Fired exactly once per task, after its slot has been released.
#[derive(Debug, Clone)]
pub struct TerminalEvent {
    /// Descriptor id, also for a worker that panicked before reporting.
    pub task_id: u64,
    pub outcome: TaskOutcome,
    /// Why retrying stopped; `None` for successes and abandoned tasks.
    pub reason: Option<GiveUpReason>,
    /// The last store error, if the task failed.
    pub error: Option<StoreError>,
    /// Store invocations made for this task.
    pub attempts: u32,
    pub elapsed: Duration,
}

/// Non-blocking sender for terminal events.
///
/// Backed by an unbounded channel so a slow observer never stalls the
/// dispatcher; a dropped receiver just means nobody is listening.
#[derive(Debug, Clone)]
pub struct EventSink(mpsc::UnboundedSender<TerminalEvent>);

impl EventSink {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<TerminalEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self(tx), rx)
    }

    pub(super) fn emit(&self, event: TerminalEvent) {
        let _ = self.0.send(event);
    }
}

impl From<mpsc::UnboundedSender<TerminalEvent>> for EventSink {
    fn from(tx: mpsc::UnboundedSender<TerminalEvent>) -> Self {
        Self(tx)
    }
}
