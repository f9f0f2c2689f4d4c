//! Dispatcher state shared by every worker: slot counter and outcome tally.
//!
//! This is the only mutable state that crosses worker boundaries; every
//! field is an atomic so workers never contend on a lock.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use super::event::TaskOutcome;

/// Live counters for one dispatcher run.
#[derive(Debug)]
pub struct DispatcherState {
    limit: usize,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
    succeeded: AtomicU64,
    failed_fatal: AtomicU64,
    failed_exhausted: AtomicU64,
    abandoned: AtomicU64,
}

impl DispatcherState {
    pub fn new(limit: usize) -> Self {
        Self {
            limit,
            in_flight: AtomicUsize::new(0),
            peak_in_flight: AtomicUsize::new(0),
            succeeded: AtomicU64::new(0),
            failed_fatal: AtomicU64::new(0),
            failed_exhausted: AtomicU64::new(0),
            abandoned: AtomicU64::new(0),
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Workers currently holding a slot.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Mark a slot taken. Returns the in-flight count including this one.
    pub(super) fn enter(&self) -> usize {
        let now = self.in_flight.fetch_add(1, Ordering::AcqRel) + 1;
        debug_assert!(now <= self.limit, "in-flight {} exceeds limit {}", now, self.limit);
        self.peak_in_flight.fetch_max(now, Ordering::AcqRel);
        now
    }

    /// Mark a slot released.
    pub(super) fn leave(&self) {
        self.in_flight.fetch_sub(1, Ordering::AcqRel);
    }

    pub(super) fn record(&self, outcome: TaskOutcome) {
        self.record_many(outcome, 1);
    }

    pub(super) fn record_many(&self, outcome: TaskOutcome, n: u64) {
        let counter = match outcome {
            TaskOutcome::Succeeded => &self.succeeded,
            TaskOutcome::FailedFatal => &self.failed_fatal,
            TaskOutcome::FailedExhausted => &self.failed_exhausted,
            TaskOutcome::Abandoned => &self.abandoned,
        };
        counter.fetch_add(n, Ordering::AcqRel);
    }

    /// Snapshot the tally.
    pub fn summary(&self, elapsed: Duration) -> Summary {
        Summary {
            succeeded: self.succeeded.load(Ordering::Acquire),
            failed_fatal: self.failed_fatal.load(Ordering::Acquire),
            failed_exhausted: self.failed_exhausted.load(Ordering::Acquire),
            abandoned: self.abandoned.load(Ordering::Acquire),
            peak_in_flight: self.peak_in_flight.load(Ordering::Acquire),
            elapsed,
        }
    }
}

/// Terminal-outcome counts for a finished (or cancelled) run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Summary {
    pub succeeded: u64,
    pub failed_fatal: u64,
    pub failed_exhausted: u64,
    /// Tasks cut off by cancellation, including ones never pulled from a finite source.
    pub abandoned: u64,
    /// Highest number of simultaneously held slots observed.
    pub peak_in_flight: usize,
    pub elapsed: Duration,
}

impl Summary {
    /// Tasks that reached a terminal outcome of their own.
    pub fn completed(&self) -> u64 {
        self.succeeded + self.failed_fatal + self.failed_exhausted
    }

    pub fn total(&self) -> u64 {
        self.completed() + self.abandoned
    }
}
