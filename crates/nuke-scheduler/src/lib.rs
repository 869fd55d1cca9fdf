//! Teardown scheduling for gcp-nuke.
//!
//! Runs one task per registered resource kind. Each task lists its kind,
//! waits for the kinds it depends on to drain, then removes its items,
//! retrying while the backend reports transient errors.

pub mod error;
pub mod orchestrator;
mod retry;
mod waiter;

#[cfg(test)]
mod testing;

pub use error::TeardownError;
pub use orchestrator::{Completion, KindState, Teardown, TeardownEvent, TeardownReport};
