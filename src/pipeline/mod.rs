//! The scan pipeline.
//!
//! This module provides:
//! - Shared run state: counters and the cancellation flag
//! - The bounded task queue between the walker and the workers
//! - The reuse-or-rescan decision against a previous index
//! - The fault-isolating worker pool
//! - [`Pipeline`], which wires the stages together for one run

mod diff;
mod pool;
mod queue;
mod run;
mod state;

pub use diff::{decide, Decision, ReusePolicy};
pub use pool::{FatalSlot, ScanTask, WorkerContext, WorkerPool};
pub use queue::TaskQueue;
pub use run::Pipeline;
pub use state::{RunState, RunStateSnapshot};
