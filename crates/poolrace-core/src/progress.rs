//! Running tally built from terminal events (counts, rate, ETA).
//!
//! The dispatcher only emits events; observers such as the CLI fold them into
//! a `ProgressStats` and compute rate = completed / elapsed_secs and
//! ETA = (total - completed) / rate.

use crate::dispatcher::{TaskOutcome, TerminalEvent};

/// Snapshot of run progress (CLI-friendly).
#[derive(Debug, Clone, Default)]
pub struct ProgressStats {
    pub succeeded: u64,
    pub failed_fatal: u64,
    pub failed_exhausted: u64,
    pub abandoned: u64,
    /// Store invocations beyond the first, summed over all tasks.
    pub retries: u64,
    /// Planned task count; `None` for an unbounded run.
    pub total: Option<u64>,
    /// Elapsed time since the run started (seconds).
    pub elapsed_secs: f64,
}

impl ProgressStats {
    pub fn new(total: Option<u64>) -> Self {
        Self {
            total,
            ..Self::default()
        }
    }

    /// Fold one terminal event into the tally.
    pub fn observe(&mut self, event: &TerminalEvent) {
        match event.outcome {
            TaskOutcome::Succeeded => self.succeeded += 1,
            TaskOutcome::FailedFatal => self.failed_fatal += 1,
            TaskOutcome::FailedExhausted => self.failed_exhausted += 1,
            TaskOutcome::Abandoned => self.abandoned += 1,
        }
        self.retries += u64::from(event.attempts.saturating_sub(1));
    }

    /// Tasks that reached their own terminal outcome.
    pub fn completed(&self) -> u64 {
        self.succeeded + self.failed_fatal + self.failed_exhausted
    }

    /// Completion rate in tasks per second (0 if elapsed is 0).
    pub fn tasks_per_sec(&self) -> f64 {
        if self.elapsed_secs <= 0.0 {
            return 0.0;
        }
        self.completed() as f64 / self.elapsed_secs
    }

    /// Fraction complete in [0.0, 1.0]; `None` for an unbounded run.
    pub fn fraction(&self) -> Option<f64> {
        let total = self.total?;
        if total == 0 {
            return Some(1.0);
        }
        Some((self.completed() as f64 / total as f64).min(1.0))
    }

    /// Estimated seconds remaining (None if unbounded or rate is 0).
    pub fn eta_secs(&self) -> Option<f64> {
        let remaining = self.total?.saturating_sub(self.completed());
        if remaining == 0 {
            return Some(0.0);
        }
        let rate = self.tasks_per_sec();
        if rate <= 0.0 {
            return None;
        }
        Some(remaining as f64 / rate)
    }
}
