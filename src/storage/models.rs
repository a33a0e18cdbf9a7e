//! Records stored alongside documents in an index file.

use serde::{Deserialize, Serialize};

/// Identity of the run that wrote an index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexMeta {
    pub run_id: String,
    pub roots: Vec<String>,
    /// Unix timestamp when the index was created.
    pub started_at: i64,
    /// Highest committed sequence number.
    pub committed: u64,
}

/// Committed document counts by status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    pub indexed: u64,
    pub skipped: u64,
    pub errored: u64,
}

impl StatusCounts {
    #[must_use]
    pub const fn total(&self) -> u64 {
        self.indexed + self.skipped + self.errored
    }
}

/// Summary written by `finalize`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: String,
    pub roots: Vec<String>,
    /// Documents in the index, by status.
    pub documents: StatusCounts,
    /// Documents carried over unchanged from the previous run.
    pub reused: u64,
    /// Documents produced by extraction this run.
    pub extracted: u64,
    pub entries_seen: u64,
    pub traversal_errors: u64,
    pub duration_ms: u64,
    pub cancelled: bool,
    /// RFC 3339 timestamp.
    pub finished_at: String,
}
