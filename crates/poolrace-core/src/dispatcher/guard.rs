//! RAII slot: holds a semaphore permit and the in-flight count together.

use std::sync::Arc;

use tokio::sync::OwnedSemaphorePermit;

use super::state::DispatcherState;

/// One concurrency slot. Dropping it releases the permit and decrements the
/// in-flight counter, on every exit path including a panicking worker.
pub(super) struct SlotGuard {
    state: Arc<DispatcherState>,
    _permit: OwnedSemaphorePermit,
}

impl SlotGuard {
    pub(super) fn new(permit: OwnedSemaphorePermit, state: Arc<DispatcherState>) -> Self {
        state.enter();
        Self {
            state,
            _permit: permit,
        }
    }
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        self.state.leave();
    }
}
