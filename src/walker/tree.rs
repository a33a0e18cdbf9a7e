//! Lazy directory traversal.
//!
//! Walks one root depth-first, pruning excluded subtrees and emitting a
//! [`ScanEntry`] for every accepted non-directory object. Unreadable
//! directories are logged and skipped; symlink cycles are detected against
//! the ancestors on the current path and never followed twice.

#![allow(clippy::module_name_repetitions)]

use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;
use std::sync::Arc;

use walkdir::{DirEntry, WalkDir};

use super::entry::{EntryKind, ScanEntry};
use super::filter::{PathFilter, WalkRules};
use crate::error::WalkError;
use crate::pipeline::RunState;
use crate::Result;

type RawWalk = Box<dyn Iterator<Item = walkdir::Result<DirEntry>>>;

/// Iterator over the accepted entries below one root.
pub struct TreeWalker {
    root: PathBuf,
    rules: WalkRules,
    filter: PathFilter,
    inner: RawWalk,
    state: Arc<RunState>,
}

impl TreeWalker {
    /// Prepare a walk of `root`.
    ///
    /// Nothing is read beyond resolving the root until the iterator is
    /// polled.
    ///
    /// # Errors
    ///
    /// Returns an error if the root cannot be resolved or a pattern is invalid.
    pub fn new(root: impl AsRef<Path>, rules: &WalkRules, state: Arc<RunState>) -> Result<Self> {
        let root = root.as_ref();
        let root = root.canonicalize().map_err(|e| WalkError::RootNotFound {
            path: root.display().to_string(),
            reason: e.to_string(),
        })?;

        let filter = PathFilter::new(&root, rules)?;
        let prune = filter.clone();

        let mut walk = WalkDir::new(&root)
            .follow_links(rules.follow_symlinks)
            .sort_by_file_name();
        if let Some(depth) = rules.max_depth {
            walk = walk.max_depth(depth);
        }

        let inner = walk.into_iter().filter_entry(move |e| {
            e.depth() == 0 || !prune.is_excluded(e.path(), e.file_type().is_dir())
        });

        tracing::debug!(root = %root.display(), ?rules, "Walker prepared");

        Ok(Self {
            root,
            rules: rules.clone(),
            filter,
            inner: Box::new(inner),
            state,
        })
    }

    /// The resolved root.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn record_error(&self, err: &walkdir::Error) {
        if let Some(ancestor) = err.loop_ancestor() {
            tracing::info!(
                path = ?err.path(),
                ancestor = %ancestor.display(),
                "Skipping symlink cycle"
            );
            return;
        }

        tracing::warn!(path = ?err.path(), error = %err, "Error walking directory");
        self.state.traversal_errors.fetch_add(1, Ordering::Relaxed);
    }

    fn accept(&self, entry: &DirEntry) -> Option<ScanEntry> {
        let metadata = match entry.metadata() {
            Ok(m) => m,
            Err(err) => {
                self.record_error(&err);
                return None;
            }
        };

        let scan_entry = ScanEntry::from_metadata(entry.path().to_path_buf(), &metadata);

        if scan_entry.kind == EntryKind::File && !self.rules.size_accepted(scan_entry.size) {
            tracing::trace!(path = %entry.path().display(), size = scan_entry.size, "Outside size bounds");
            return None;
        }

        if !self.filter.is_included(entry.path()) {
            return None;
        }

        Some(scan_entry)
    }
}

impl Iterator for TreeWalker {
    type Item = ScanEntry;

    fn next(&mut self) -> Option<ScanEntry> {
        loop {
            if self.state.is_cancelled() {
                tracing::debug!(root = %self.root.display(), "Walk stopped by cancellation");
                return None;
            }

            let entry = match self.inner.next()? {
                Ok(entry) => entry,
                Err(err) => {
                    self.record_error(&err);
                    continue;
                }
            };

            // Directories are traversed, never emitted.
            if entry.file_type().is_dir() {
                continue;
            }

            if let Some(scan_entry) = self.accept(&entry) {
                return Some(scan_entry);
            }
        }
    }
}
