//! Type dispatch: classify an entry, apply policy, run its extractor.

use std::any::Any;
use std::collections::HashMap;
use std::io;
use std::panic::{catch_unwind, AssertUnwindSafe};

use super::read::hash_file;
use super::sniff::classify_path;
use super::{
    Budget, CapabilityTag, Classification, Extraction, ExtractionResult, ExtractorRegistry,
    FailureKind, SkipReason,
};
use crate::walker::{EntryKind, ScanEntry};

/// Size and mode policy applied before an extractor runs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchLimits {
    /// Ceiling for tags without their own entry. Falls back to the task
    /// budget when unset.
    pub default_ceiling: Option<u64>,
    /// Per-tag size ceilings in bytes.
    pub ceilings: HashMap<CapabilityTag, u64>,
    /// Record metadata only; never run extractors.
    pub metadata_only: bool,
    /// Hash every regular file the extractor did not hash.
    pub checksums: bool,
}

impl DispatchLimits {
    /// Effective ceiling for a tag.
    #[must_use]
    pub fn ceiling(&self, tag: CapabilityTag, budget: &Budget) -> u64 {
        self.ceilings
            .get(&tag)
            .copied()
            .or(self.default_ceiling)
            .unwrap_or(budget.max_size)
    }
}

/// Classification plus the extraction result for one entry.
#[derive(Debug, Clone, PartialEq)]
pub struct Outcome {
    /// `None` when the file could not even be opened for sniffing.
    pub classification: Option<Classification>,
    pub result: ExtractionResult,
}

/// Routes entries to extraction capabilities.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    registry: ExtractorRegistry,
    limits: DispatchLimits,
}

impl Dispatcher {
    #[must_use]
    pub const fn new(registry: ExtractorRegistry, limits: DispatchLimits) -> Self {
        Self { registry, limits }
    }

    #[must_use]
    pub const fn limits(&self) -> &DispatchLimits {
        &self.limits
    }

    /// Classify an entry by content.
    ///
    /// Non-file entries are classified from their kind without any I/O.
    ///
    /// # Errors
    ///
    /// Returns an error if a regular file cannot be opened or read.
    pub fn classify(&self, entry: &ScanEntry) -> io::Result<Classification> {
        match entry.kind {
            EntryKind::File => classify_path(&entry.path, entry.extension().as_deref()),
            EntryKind::Symlink => Ok(Classification::new(CapabilityTag::Symlink, "inode/symlink")),
            EntryKind::Directory => Ok(Classification::new(CapabilityTag::Special, "inode/directory")),
            EntryKind::Unsupported => Ok(Classification::new(CapabilityTag::Special, "inode/x-special")),
        }
    }

    /// Apply policy and run the capability registered for the classification.
    #[must_use]
    pub fn dispatch(
        &self,
        classification: &Classification,
        entry: &ScanEntry,
        budget: &Budget,
    ) -> ExtractionResult {
        if self.limits.metadata_only {
            return ExtractionResult::Success(
                Extraction::new().with_mime(classification.mime.clone()),
            );
        }

        let Some(extractor) = self.registry.get(classification.tag) else {
            return ExtractionResult::Skipped(SkipReason::Unsupported);
        };

        let ceiling = self.limits.ceiling(classification.tag, budget);
        if entry.size > ceiling {
            tracing::debug!(
                path = %entry.path.display(),
                size = entry.size,
                ceiling,
                tag = %classification.tag,
                "Skipping oversized file"
            );
            return ExtractionResult::Skipped(SkipReason::Oversized);
        }

        let budget = Budget::new(ceiling, budget.timeout);
        extractor.extract(&entry.path, classification.tag, &budget)
    }

    /// Classify, dispatch and apply checksum mode.
    ///
    /// A panicking extractor is reported as a [`FailureKind::Fault`].
    #[must_use]
    pub fn run(&self, entry: &ScanEntry, budget: &Budget) -> Outcome {
        let classification = match self.classify(entry) {
            Ok(c) => c,
            Err(e) => {
                return Outcome {
                    classification: None,
                    result: ExtractionResult::hard(FailureKind::Io, e.to_string()),
                }
            }
        };

        let result = catch_unwind(AssertUnwindSafe(|| {
            self.extract(&classification, entry, budget)
        }))
        .unwrap_or_else(|payload| {
            let msg = panic_message(payload.as_ref());
            tracing::warn!(path = %entry.path.display(), panic = %msg, "Extractor panicked");
            ExtractionResult::hard(FailureKind::Fault, format!("extractor panicked: {msg}"))
        });

        Outcome {
            classification: Some(classification),
            result,
        }
    }

    /// Dispatch an already classified entry, then apply checksum mode.
    #[must_use]
    pub fn extract(
        &self,
        classification: &Classification,
        entry: &ScanEntry,
        budget: &Budget,
    ) -> ExtractionResult {
        let result = self.dispatch(classification, entry, budget);
        if self.limits.checksums && entry.kind == EntryKind::File {
            fill_checksum(result, entry, budget)
        } else {
            result
        }
    }
}

/// Best-effort text of a panic payload.
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Hash the file when the extractor produced fields but no hash.
fn fill_checksum(mut result: ExtractionResult, entry: &ScanEntry, budget: &Budget) -> ExtractionResult {
    let Some(extraction) = result.extraction_mut() else {
        return result;
    };
    if extraction.content_hash.is_some() {
        return result;
    }

    // Only the time budget applies; the tag ceiling bounds extraction, not hashing.
    let hash_budget = Budget::new(u64::MAX, budget.timeout);
    match hash_file(&entry.path, &hash_budget) {
        Ok(hash) => extraction.content_hash = Some(hash),
        Err(failure) => {
            tracing::warn!(
                path = %entry.path.display(),
                error = %failure,
                "Checksum failed"
            );
        }
    }
    result
}
