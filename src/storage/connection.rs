//! `SQLite` connection handling for index files.
//!
//! An index is written through a single read-write handle in WAL mode with
//! `synchronous = NORMAL`, so a crash loses at most the transaction in
//! progress. Previous indexes are opened through `query_only` handles.

use parking_lot::Mutex;
use rusqlite::{Connection, OpenFlags, TransactionBehavior};
use std::path::Path;
use std::sync::Arc;

use crate::error::StorageError;
use crate::Result;

const WRITER_PRAGMAS: &str = "
    PRAGMA journal_mode = WAL;
    PRAGMA synchronous = NORMAL;
    PRAGMA cache_size = -32000;
    PRAGMA temp_store = MEMORY;
";

/// How a handle may touch the file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Access {
    /// Create if missing, read and write.
    Write,
    /// Existing file only; writes are rejected.
    Query,
}

/// Shared, serialized handle to one index file.
///
/// Cloning shares the underlying connection.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
    path: String,
}

impl Database {
    /// Open or create an index file for writing.
    ///
    /// Missing parent directories are created.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or configured.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        Self::connect(path, Access::Write)
    }

    /// Open an existing index file for queries only.
    ///
    /// # Errors
    ///
    /// Returns an error if the file does not exist or cannot be opened.
    pub fn open_existing(path: impl AsRef<Path>) -> Result<Self> {
        Self::connect(path.as_ref(), Access::Query)
    }

    /// In-memory database, for tests.
    ///
    /// # Errors
    ///
    /// Returns an error if `SQLite` cannot allocate the database.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| StorageError::Database(format!("failed to open in-memory database: {e}")))?;
        Self::configure(conn, ":memory:".to_string(), Access::Write)
    }

    fn connect(path: &Path, access: Access) -> Result<Self> {
        let path_str = path.to_string_lossy().to_string();

        let mut flags = OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        if access == Access::Write {
            flags |= OpenFlags::SQLITE_OPEN_CREATE;
        }

        let conn = Connection::open_with_flags(path, flags)
            .map_err(|e| StorageError::Database(format!("failed to open '{path_str}': {e}")))?;
        Self::configure(conn, path_str, access)
    }

    fn configure(conn: Connection, path: String, access: Access) -> Result<Self> {
        let pragmas = match access {
            Access::Write => WRITER_PRAGMAS,
            Access::Query => "PRAGMA query_only = ON;",
        };
        conn.execute_batch(pragmas)
            .map_err(|e| StorageError::Database(format!("failed to configure '{path}': {e}")))?;

        tracing::debug!(path = %path, ?access, "Database opened");

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            path,
        })
    }

    /// Run `f` with exclusive access to the connection.
    ///
    /// # Errors
    ///
    /// Returns whatever `f` returns.
    pub fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self.conn.lock();
        f(&conn)
    }

    /// Run `f` inside an immediate transaction.
    ///
    /// Commits if `f` succeeds; otherwise the transaction is rolled back
    /// when dropped.
    ///
    /// # Errors
    ///
    /// Returns an error if the transaction cannot begin or commit, or if
    /// `f` fails.
    pub fn with_transaction<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let mut conn = self.conn.lock();
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(|e| StorageError::Database(format!("failed to begin transaction: {e}")))?;

        let value = f(&tx)?;

        tx.commit()
            .map_err(|e| StorageError::Database(format!("failed to commit: {e}")))?;
        Ok(value)
    }

    /// Fold the WAL back into the main database file.
    ///
    /// # Errors
    ///
    /// Returns an error if the checkpoint fails.
    pub fn checkpoint(&self) -> Result<()> {
        self.with_conn(|conn| {
            conn.query_row("PRAGMA wal_checkpoint(TRUNCATE)", [], |_| Ok(()))
                .map_err(|e| StorageError::Database(format!("checkpoint failed: {e}")).into())
        })
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}
