//! Crash-safe, append-only index writer.

use std::path::{Path, PathBuf};
use std::time::Duration;

use parking_lot::Mutex;
use uuid::Uuid;

use super::connection::Database;
use super::documents::{count_by_status, insert_document};
use super::meta::{init_meta, set_committed, store_summary};
use super::models::RunSummary;
use super::schema::{migrate, verify_schema};
use crate::document::{now_unix, Document};
use crate::error::StorageError;
use crate::pipeline::RunStateSnapshot;
use crate::Result;

#[derive(Debug, Default)]
struct WriterState {
    /// Last committed sequence number.
    seq: u64,
    /// Set by the first successful finalize.
    summary: Option<RunSummary>,
}

/// Appends documents to a new index file.
///
/// Each append is one transaction that inserts the row and advances the
/// commit marker, so a crash at any point leaves every earlier append
/// readable. Appends from any number of threads are serialized.
#[derive(Debug)]
pub struct IndexWriter {
    db: Database,
    run_id: Uuid,
    roots: Vec<String>,
    state: Mutex<WriterState>,
}

impl IndexWriter {
    /// Create the index file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::AlreadyExists`] if the file exists and
    /// `overwrite` is false, or an error if it cannot be created.
    pub fn create(
        path: impl AsRef<Path>,
        run_id: Uuid,
        roots: &[PathBuf],
        overwrite: bool,
    ) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            if !overwrite {
                return Err(StorageError::AlreadyExists(path.display().to_string()).into());
            }
            remove_index_files(path)?;
        }

        let db = Database::open(path)?;
        let roots: Vec<String> = roots
            .iter()
            .map(|r| r.to_string_lossy().into_owned())
            .collect();

        db.with_transaction(|conn| {
            migrate(conn)?;
            verify_schema(conn)?;
            init_meta(conn, &run_id.to_string(), &roots, now_unix())
        })?;

        tracing::info!(path = %path.display(), run_id = %run_id, "Created index");

        Ok(Self {
            db,
            run_id,
            roots,
            state: Mutex::new(WriterState::default()),
        })
    }

    #[must_use]
    pub const fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Number of committed documents.
    #[must_use]
    pub fn committed(&self) -> u64 {
        self.state.lock().seq
    }

    /// Append one document and commit it.
    ///
    /// Returns the document's sequence number.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Finalized`] after [`IndexWriter::finalize`],
    /// or a storage error if the write fails (including a duplicate key).
    pub fn append(&self, doc: &Document) -> Result<u64> {
        let mut state = self.state.lock();
        if state.summary.is_some() {
            return Err(StorageError::Finalized.into());
        }

        let seq = state.seq + 1;
        self.db.with_transaction(|conn| {
            insert_document(conn, seq, doc)?;
            set_committed(conn, seq)
        })?;
        state.seq = seq;

        tracing::trace!(seq, key = %doc.key, status = %doc.status, "Appended document");
        Ok(seq)
    }

    /// Write the run summary and close the index to further appends.
    ///
    /// Idempotent: later calls return the first summary without writing.
    ///
    /// # Errors
    ///
    /// Returns an error if the summary cannot be written.
    pub fn finalize(&self, stats: &RunStateSnapshot, duration: Duration) -> Result<RunSummary> {
        let mut state = self.state.lock();
        if let Some(summary) = &state.summary {
            return Ok(summary.clone());
        }

        let summary = self.db.with_transaction(|conn| {
            let documents = count_by_status(conn)?;
            let summary = RunSummary {
                run_id: self.run_id.to_string(),
                roots: self.roots.clone(),
                documents,
                reused: stats.reused,
                extracted: documents.total().saturating_sub(stats.reused),
                entries_seen: stats.entries_seen,
                traversal_errors: stats.traversal_errors,
                duration_ms: u64::try_from(duration.as_millis()).unwrap_or(u64::MAX),
                cancelled: stats.cancelled,
                finished_at: chrono::Utc::now().to_rfc3339(),
            };
            store_summary(conn, &summary)?;
            Ok(summary)
        })?;

        if let Err(e) = self.db.checkpoint() {
            tracing::warn!(error = %e, "WAL checkpoint after finalize failed");
        }

        tracing::info!(
            run_id = %summary.run_id,
            indexed = summary.documents.indexed,
            skipped = summary.documents.skipped,
            errored = summary.documents.errored,
            reused = summary.reused,
            cancelled = summary.cancelled,
            "Index finalized"
        );

        state.summary = Some(summary.clone());
        Ok(summary)
    }
}

/// Remove an index file and its WAL side files.
fn remove_index_files(path: &Path) -> Result<()> {
    std::fs::remove_file(path)?;
    for suffix in ["-wal", "-shm"] {
        let mut side = path.as_os_str().to_owned();
        side.push(suffix);
        match std::fs::remove_file(&side) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{IdKind, Status};
    use crate::error::Error;
    use crate::storage::IndexReader;
    use crate::walker::{EntryKey, EntryKind};
    use std::collections::{BTreeMap, BTreeSet};
    use tempfile::TempDir;

    fn doc(key: &str, status: Status) -> Document {
        Document {
            id: format!("id-{key}"),
            id_kind: IdKind::Path,
            key: EntryKey::new(key),
            path: format!("/r/{key}"),
            size: 1,
            mtime: 2,
            kind: EntryKind::File,
            mime: None,
            capability: None,
            fields: BTreeMap::new(),
            text: None,
            tags: BTreeSet::new(),
            thumbnail: None,
            status,
            error: None,
            indexed_at: 0,
        }
    }

    fn create(tmp: &TempDir) -> IndexWriter {
        IndexWriter::create(
            tmp.path().join("index.db"),
            Uuid::new_v4(),
            &[PathBuf::from("/r")],
            false,
        )
        .unwrap()
    }

    #[test]
    fn test_append_assigns_sequence() {
        let tmp = TempDir::new().unwrap();
        let writer = create(&tmp);
        assert_eq!(writer.append(&doc("a", Status::Indexed)).unwrap(), 1);
        assert_eq!(writer.append(&doc("b", Status::Skipped)).unwrap(), 2);
        assert_eq!(writer.committed(), 2);
    }

    #[test]
    fn test_duplicate_key_is_error_and_not_committed() {
        let tmp = TempDir::new().unwrap();
        let writer = create(&tmp);
        writer.append(&doc("a", Status::Indexed)).unwrap();
        assert!(writer.append(&doc("a", Status::Errored)).is_err());
        assert_eq!(writer.committed(), 1);
        assert_eq!(writer.append(&doc("b", Status::Indexed)).unwrap(), 2);
    }

    #[test]
    fn test_refuses_existing_without_overwrite() {
        let tmp = TempDir::new().unwrap();
        drop(create(&tmp));
        let err = IndexWriter::create(tmp.path().join("index.db"), Uuid::new_v4(), &[], false)
            .unwrap_err();
        assert!(matches!(err, Error::Storage(StorageError::AlreadyExists(_))));

        let writer =
            IndexWriter::create(tmp.path().join("index.db"), Uuid::new_v4(), &[], true).unwrap();
        assert_eq!(writer.committed(), 0);
    }

    #[test]
    fn test_finalize_is_idempotent_and_blocks_appends() {
        let tmp = TempDir::new().unwrap();
        let writer = create(&tmp);
        writer.append(&doc("a", Status::Indexed)).unwrap();
        writer.append(&doc("b", Status::Errored)).unwrap();

        let stats = RunStateSnapshot {
            entries_seen: 2,
            reused: 1,
            ..RunStateSnapshot::default()
        };
        let first = writer.finalize(&stats, Duration::from_millis(15)).unwrap();
        assert_eq!(first.documents.indexed, 1);
        assert_eq!(first.documents.errored, 1);
        assert_eq!(first.reused, 1);
        assert_eq!(first.extracted, 1);
        assert_eq!(first.duration_ms, 15);

        let second = writer
            .finalize(&RunStateSnapshot::default(), Duration::ZERO)
            .unwrap();
        assert_eq!(second, first);

        let err = writer.append(&doc("c", Status::Indexed)).unwrap_err();
        assert!(matches!(err, Error::Storage(StorageError::Finalized)));
    }

    #[test]
    fn test_unfinalized_index_is_readable() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("index.db");
        let writer = create(&tmp);
        writer.append(&doc("a", Status::Indexed)).unwrap();
        writer.append(&doc("b", Status::Indexed)).unwrap();
        drop(writer);

        let reader = IndexReader::open(&path).unwrap();
        assert_eq!(reader.documents().unwrap().len(), 2);
        assert!(reader.summary().unwrap().is_none());
    }
}
