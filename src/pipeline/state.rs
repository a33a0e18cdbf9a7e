//! Run-wide counters and the cancellation flag.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::document::Status;

/// Counters shared by the walker, the worker pool and the index writer.
///
/// Created at run start and handed out by `Arc`; read as a whole only through
/// [`RunState::snapshot`].
#[derive(Debug, Default)]
pub struct RunState {
    pub entries_seen: AtomicU64,
    pub tasks_queued: AtomicU64,
    pub tasks_completed: AtomicU64,
    pub reused: AtomicU64,
    pub indexed: AtomicU64,
    pub skipped: AtomicU64,
    pub errored: AtomicU64,
    pub traversal_errors: AtomicU64,
    cancelled: AtomicBool,
}

impl RunState {
    /// Create fresh state for a run.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Request cooperative cancellation.
    pub fn cancel(&self) {
        if !self.cancelled.swap(true, Ordering::SeqCst) {
            tracing::info!("Cancellation requested");
        }
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// The raw flag, for blocking points that poll it.
    #[must_use]
    pub const fn cancel_flag(&self) -> &AtomicBool {
        &self.cancelled
    }

    /// Count a written document by status.
    pub fn record_status(&self, status: Status) {
        let counter = match status {
            Status::Indexed => &self.indexed,
            Status::Skipped => &self.skipped,
            Status::Errored => &self.errored,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Get a snapshot of current counters.
    #[must_use]
    pub fn snapshot(&self) -> RunStateSnapshot {
        RunStateSnapshot {
            entries_seen: self.entries_seen.load(Ordering::Relaxed),
            tasks_queued: self.tasks_queued.load(Ordering::Relaxed),
            tasks_completed: self.tasks_completed.load(Ordering::Relaxed),
            reused: self.reused.load(Ordering::Relaxed),
            indexed: self.indexed.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            errored: self.errored.load(Ordering::Relaxed),
            traversal_errors: self.traversal_errors.load(Ordering::Relaxed),
            cancelled: self.is_cancelled(),
        }
    }
}

/// Point-in-time copy of [`RunState`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStateSnapshot {
    pub entries_seen: u64,
    pub tasks_queued: u64,
    pub tasks_completed: u64,
    pub reused: u64,
    pub indexed: u64,
    pub skipped: u64,
    pub errored: u64,
    pub traversal_errors: u64,
    pub cancelled: bool,
}

impl RunStateSnapshot {
    /// Documents written so far, reused ones included.
    #[must_use]
    pub const fn documents_written(&self) -> u64 {
        self.indexed + self.skipped + self.errored
    }

    /// Tasks still queued or in flight.
    #[must_use]
    pub const fn pending(&self) -> u64 {
        self.tasks_queued.saturating_sub(self.tasks_completed)
    }

    /// Errors of any kind.
    #[must_use]
    pub const fn errors(&self) -> u64 {
        self.errored + self.traversal_errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_starts_at_zero() {
        let state = RunState::new();
        assert_eq!(state.snapshot(), RunStateSnapshot::default());
    }

    #[test]
    fn test_record_status() {
        let state = RunState::new();
        state.record_status(Status::Indexed);
        state.record_status(Status::Indexed);
        state.record_status(Status::Skipped);
        state.record_status(Status::Errored);

        let snapshot = state.snapshot();
        assert_eq!(snapshot.indexed, 2);
        assert_eq!(snapshot.skipped, 1);
        assert_eq!(snapshot.errored, 1);
        assert_eq!(snapshot.documents_written(), 4);
    }

    #[test]
    fn test_cancel_is_sticky() {
        let state = RunState::new();
        assert!(!state.is_cancelled());
        state.cancel();
        state.cancel();
        assert!(state.is_cancelled());
        assert!(state.snapshot().cancelled);
    }

    #[test]
    fn test_pending_and_errors() {
        let state = RunState::new();
        state.tasks_queued.fetch_add(5, Ordering::Relaxed);
        state.tasks_completed.fetch_add(3, Ordering::Relaxed);
        state.errored.fetch_add(1, Ordering::Relaxed);
        state.traversal_errors.fetch_add(2, Ordering::Relaxed);

        let snapshot = state.snapshot();
        assert_eq!(snapshot.pending(), 2);
        assert_eq!(snapshot.errors(), 3);
    }

    #[test]
    fn test_counters_from_many_threads() {
        let state = RunState::new();
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let state = Arc::clone(&state);
                std::thread::spawn(move || {
                    for _ in 0..1000 {
                        state.entries_seen.fetch_add(1, Ordering::Relaxed);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(state.snapshot().entries_seen, 4000);
    }
}
