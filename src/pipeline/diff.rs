//! Reuse-or-rescan decisions against the previous run.

use crate::document::{Document, Status};
use crate::storage::PreviousSnapshot;
use crate::walker::{EntryKey, ScanEntry};

/// What to do with an entry.
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    /// Carry the previous document over unchanged.
    Reuse(Document),
    /// Extract again.
    Rescan,
}

/// Which previous outcomes may be reused.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReusePolicy {
    /// Retry files previously skipped by policy.
    pub rescan_skipped: bool,
}

impl ReusePolicy {
    const fn reusable(self, status: Status) -> bool {
        match status {
            Status::Indexed => true,
            Status::Skipped => !self.rescan_skipped,
            Status::Errored => false,
        }
    }
}

/// Decide whether `entry` can reuse its previous document.
///
/// Compares size, mtime and kind exactly; never touches file content.
#[must_use]
pub fn decide(
    entry: &ScanEntry,
    key: &EntryKey,
    previous: &PreviousSnapshot,
    policy: ReusePolicy,
) -> Decision {
    match previous.get(key) {
        Some(doc)
            if doc.size == entry.size
                && doc.mtime == entry.mtime
                && doc.kind == entry.kind
                && policy.reusable(doc.status) =>
        {
            Decision::Reuse(doc.clone())
        }
        _ => Decision::Rescan,
    }
}
