//! Bounded dispatcher.
//!
//! Pulls task descriptors lazily from a work source, holds one slot per task
//! from first invocation through every retry, and tallies exactly one
//! terminal outcome per task. A task's failure never stops its siblings.

mod event;
mod guard;
mod run;
mod source;
mod state;
mod worker;

pub use event::{EventSink, TaskOutcome, TaskState, TerminalEvent};
pub use run::{run, DispatchError, Dispatcher};
pub use source::{Bounded, RepeatSource, TaskDescriptor, Unbounded, WorkSource};
pub use state::{DispatcherState, Summary};
