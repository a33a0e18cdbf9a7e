//! Logging, metrics and progress reporting.

mod metrics;
mod observability;
mod progress;

pub use metrics::{init_metrics, render as render_metrics, update_from_snapshot};
pub use observability::{init_tracing, spans};
pub use progress::ProgressReporter;
