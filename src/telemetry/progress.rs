//! Periodic progress reporting for a running scan.
//!
//! A [`ProgressReporter`] samples [`RunState`] on an interval, logs the
//! counters, mirrors them into the Prometheus gauges, and publishes each
//! sample on a `watch` channel for anyone interested in live updates.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::metrics;
use crate::pipeline::{RunState, RunStateSnapshot};

/// Background task publishing [`RunStateSnapshot`]s.
#[derive(Debug)]
pub struct ProgressReporter {
    updates: watch::Receiver<RunStateSnapshot>,
    shutdown: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

impl ProgressReporter {
    /// Start reporting on the current tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    #[must_use]
    pub fn spawn(state: Arc<RunState>, interval: Duration) -> Self {
        let (tx, updates) = watch::channel(state.snapshot());
        let (shutdown, mut shutdown_rx) = oneshot::channel();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately.
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => publish(&state, &tx, false),
                    _ = &mut shutdown_rx => {
                        publish(&state, &tx, true);
                        break;
                    }
                }
            }
        });

        Self {
            updates,
            shutdown,
            handle,
        }
    }

    /// A receiver that sees every published snapshot.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<RunStateSnapshot> {
        self.updates.clone()
    }

    /// Stop reporting and return the final snapshot.
    pub async fn stop(self) -> RunStateSnapshot {
        let _ = self.shutdown.send(());
        if let Err(e) = self.handle.await {
            tracing::warn!(error = %e, "Progress reporter task failed");
        }
        let last = *self.updates.borrow();
        last
    }
}

fn publish(state: &RunState, tx: &watch::Sender<RunStateSnapshot>, last: bool) {
    let snapshot = state.snapshot();
    metrics::update_from_snapshot(&snapshot);

    if last {
        tracing::debug!(?snapshot, "Final progress sample");
    } else {
        tracing::info!(
            seen = snapshot.entries_seen,
            written = snapshot.documents_written(),
            reused = snapshot.reused,
            pending = snapshot.pending(),
            errors = snapshot.errors(),
            "Scan progress"
        );
    }

    tx.send_replace(snapshot);
}
