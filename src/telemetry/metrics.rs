//! Prometheus metrics definitions.

use once_cell::sync::Lazy;
use prometheus::{
    register_int_gauge, register_int_gauge_vec, Encoder, IntGauge, IntGaugeVec, TextEncoder,
};

use crate::document::Status;
use crate::pipeline::RunStateSnapshot;
use crate::{Error, Result};

/// Filesystem entries yielded by the walker.
pub static ENTRIES_SEEN: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!("sifter_entries_seen", "Entries yielded by the walker")
        .expect("valid metric definition")
});

/// Tasks handed to the worker pool.
pub static TASKS_QUEUED: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!("sifter_tasks_queued", "Tasks submitted to the worker queue")
        .expect("valid metric definition")
});

/// Tasks finished by workers.
pub static TASKS_COMPLETED: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!("sifter_tasks_completed", "Tasks completed by workers")
        .expect("valid metric definition")
});

/// Tasks submitted but not yet completed.
pub static QUEUE_DEPTH: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!(
        "sifter_queue_depth",
        "Tasks waiting for or held by a worker"
    )
    .expect("valid metric definition")
});

/// Documents copied from the previous index.
pub static DOCUMENTS_REUSED: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!(
        "sifter_documents_reused",
        "Documents carried over from the previous index"
    )
    .expect("valid metric definition")
});

/// Documents written, by status.
pub static DOCUMENTS: Lazy<IntGaugeVec> = Lazy::new(|| {
    register_int_gauge_vec!(
        "sifter_documents",
        "Documents written to the index by status",
        &["status"]
    )
    .expect("valid metric definition")
});

/// Directories or roots that could not be read.
pub static TRAVERSAL_ERRORS: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!(
        "sifter_traversal_errors",
        "Directories or roots that could not be traversed"
    )
    .expect("valid metric definition")
});

/// Initialize all metrics (call once at startup).
pub fn init_metrics() {
    let _ = &*ENTRIES_SEEN;
    let _ = &*TASKS_QUEUED;
    let _ = &*TASKS_COMPLETED;
    let _ = &*QUEUE_DEPTH;
    let _ = &*DOCUMENTS_REUSED;
    let _ = &*DOCUMENTS;
    let _ = &*TRAVERSAL_ERRORS;

    tracing::debug!("Prometheus metrics initialized");
}

fn gauge_value(n: u64) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

/// Copy a counter snapshot into the gauges.
pub fn update_from_snapshot(snapshot: &RunStateSnapshot) {
    ENTRIES_SEEN.set(gauge_value(snapshot.entries_seen));
    TASKS_QUEUED.set(gauge_value(snapshot.tasks_queued));
    TASKS_COMPLETED.set(gauge_value(snapshot.tasks_completed));
    QUEUE_DEPTH.set(gauge_value(snapshot.pending()));
    DOCUMENTS_REUSED.set(gauge_value(snapshot.reused));
    TRAVERSAL_ERRORS.set(gauge_value(snapshot.traversal_errors));

    for (status, n) in [
        (Status::Indexed, snapshot.indexed),
        (Status::Skipped, snapshot.skipped),
        (Status::Errored, snapshot.errored),
    ] {
        DOCUMENTS
            .with_label_values(&[status.as_str()])
            .set(gauge_value(n));
    }
}

/// Render every registered metric in the Prometheus text format.
///
/// # Errors
///
/// Returns an error if encoding fails.
pub fn render() -> Result<String> {
    let mut buf = Vec::new();
    TextEncoder::new()
        .encode(&prometheus::gather(), &mut buf)
        .map_err(|e| Error::internal(format!("failed to encode metrics: {e}")))?;
    String::from_utf8(buf).map_err(|e| Error::internal(format!("metrics are not UTF-8: {e}")))
}
