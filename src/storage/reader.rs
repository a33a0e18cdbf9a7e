//! Read access to finished or interrupted index files.

use std::path::Path;

use super::connection::Database;
use super::documents::{count_by_status, count_documents, get_document, list_documents};
use super::meta::{get_meta, get_summary};
use super::models::{IndexMeta, RunSummary, StatusCounts};
use super::schema::verify_schema;
use crate::document::Document;
use crate::walker::EntryKey;
use crate::Result;

/// Query-only view of an index file.
///
/// Only committed documents are visible.
#[derive(Debug, Clone)]
pub struct IndexReader {
    db: Database,
}

impl IndexReader {
    /// Open an existing index.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is missing or is not an index.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let db = Database::open_existing(path)?;
        db.with_conn(verify_schema)?;
        Ok(Self { db })
    }

    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn meta(&self) -> Result<Option<IndexMeta>> {
        self.db.with_conn(get_meta)
    }

    /// Summary of the run, `None` if it never finalized.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn summary(&self) -> Result<Option<RunSummary>> {
        self.db.with_conn(get_summary)
    }

    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn documents(&self) -> Result<Vec<Document>> {
        self.db.with_conn(list_documents)
    }

    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn get(&self, key: &EntryKey) -> Result<Option<Document>> {
        self.db.with_conn(|conn| get_document(conn, key))
    }

    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn count(&self) -> Result<u64> {
        self.db.with_conn(count_documents)
    }

    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn status_counts(&self) -> Result<StatusCounts> {
        self.db.with_conn(count_by_status)
    }
}
