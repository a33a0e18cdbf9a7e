//! Document rows.
//!
//! Reads only return committed rows: `seq <= index_meta.committed`.

use rusqlite::{Connection, Row};

use super::models::StatusCounts;
use crate::document::{Document, IdKind, Status};
use crate::error::StorageError;
use crate::extract::CapabilityTag;
use crate::walker::{EntryKey, EntryKind};
use crate::Result;

const COLUMNS: &str = "key, id, id_kind, path, size, mtime, kind, mime, capability, fields, \
                       text, tags, thumbnail, status, error, indexed_at";

const COMMITTED: &str = "seq <= (SELECT COALESCE(MAX(committed), 0) FROM index_meta)";

/// Insert a document with the given sequence number.
///
/// # Errors
///
/// Returns an error if serialization fails or a row with the same key exists.
pub fn insert_document(conn: &Connection, seq: u64, doc: &Document) -> Result<()> {
    let fields = serde_json::to_string(&doc.fields).map_err(StorageError::from)?;
    let tags = serde_json::to_string(&doc.tags).map_err(StorageError::from)?;

    conn.execute(
        &format!("INSERT INTO documents (seq, {COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"),
        rusqlite::params![
            to_sql_int(seq),
            doc.key.as_str(),
            doc.id,
            doc.id_kind.as_str(),
            doc.path,
            to_sql_int(doc.size),
            doc.mtime,
            doc.kind.as_str(),
            doc.mime,
            doc.capability.map(CapabilityTag::as_str),
            fields,
            doc.text,
            tags,
            doc.thumbnail,
            doc.status.as_str(),
            doc.error,
            doc.indexed_at,
        ],
    )
    .map_err(|e| StorageError::Database(format!("failed to insert '{}': {e}", doc.key)))?;

    Ok(())
}

/// Get a committed document by key.
///
/// # Errors
///
/// Returns an error if the query fails or the row is malformed.
pub fn get_document(conn: &Connection, key: &EntryKey) -> Result<Option<Document>> {
    let result = conn.query_row(
        &format!("SELECT {COLUMNS} FROM documents WHERE key = ? AND {COMMITTED}"),
        [key.as_str()],
        RawDocument::from_row,
    );

    match result {
        Ok(raw) => Ok(Some(raw.into_document()?)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(StorageError::Database(e.to_string()).into()),
    }
}

/// List committed documents in append order.
///
/// # Errors
///
/// Returns an error if the query fails or a row is malformed.
pub fn list_documents(conn: &Connection) -> Result<Vec<Document>> {
    let mut stmt = conn
        .prepare(&format!("SELECT {COLUMNS} FROM documents WHERE {COMMITTED} ORDER BY seq"))
        .map_err(StorageError::from)?;

    let raws = stmt
        .query_map([], RawDocument::from_row)
        .map_err(StorageError::from)?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(StorageError::from)?;

    raws.into_iter().map(RawDocument::into_document).collect()
}

/// Count committed documents by status.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn count_by_status(conn: &Connection) -> Result<StatusCounts> {
    let mut stmt = conn
        .prepare(&format!(
            "SELECT status, COUNT(*) FROM documents WHERE {COMMITTED} GROUP BY status"
        ))
        .map_err(StorageError::from)?;

    let rows = stmt
        .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))
        .map_err(StorageError::from)?;

    let mut counts = StatusCounts::default();
    for row in rows {
        let (status, n) = row.map_err(StorageError::from)?;
        let n = u64::try_from(n).unwrap_or(0);
        match Status::parse(&status) {
            Some(Status::Indexed) => counts.indexed = n,
            Some(Status::Skipped) => counts.skipped = n,
            Some(Status::Errored) => counts.errored = n,
            None => tracing::warn!(status = %status, "Unknown document status in index"),
        }
    }
    Ok(counts)
}

/// Count committed documents.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn count_documents(conn: &Connection) -> Result<u64> {
    let n: i64 = conn
        .query_row(
            &format!("SELECT COUNT(*) FROM documents WHERE {COMMITTED}"),
            [],
            |row| row.get(0),
        )
        .map_err(StorageError::from)?;
    Ok(u64::try_from(n).unwrap_or(0))
}

fn to_sql_int(n: u64) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

/// Row as stored, before parsing the text-encoded columns.
struct RawDocument {
    key: String,
    id: String,
    id_kind: String,
    path: String,
    size: i64,
    mtime: i64,
    kind: String,
    mime: Option<String>,
    capability: Option<String>,
    fields: String,
    text: Option<String>,
    tags: String,
    thumbnail: Option<String>,
    status: String,
    error: Option<String>,
    indexed_at: i64,
}

impl RawDocument {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            key: row.get(0)?,
            id: row.get(1)?,
            id_kind: row.get(2)?,
            path: row.get(3)?,
            size: row.get(4)?,
            mtime: row.get(5)?,
            kind: row.get(6)?,
            mime: row.get(7)?,
            capability: row.get(8)?,
            fields: row.get(9)?,
            text: row.get(10)?,
            tags: row.get(11)?,
            thumbnail: row.get(12)?,
            status: row.get(13)?,
            error: row.get(14)?,
            indexed_at: row.get(15)?,
        })
    }

    fn into_document(self) -> Result<Document> {
        let malformed = |column: &str, value: &str| {
            StorageError::Serialization(format!("bad {column} '{value}' for '{}'", self.key))
        };

        let id_kind =
            IdKind::parse(&self.id_kind).ok_or_else(|| malformed("id_kind", &self.id_kind))?;
        let kind = EntryKind::parse(&self.kind).ok_or_else(|| malformed("kind", &self.kind))?;
        let status =
            Status::parse(&self.status).ok_or_else(|| malformed("status", &self.status))?;
        let capability = match &self.capability {
            Some(c) => Some(
                c.parse::<CapabilityTag>()
                    .map_err(|_| malformed("capability", c))?,
            ),
            None => None,
        };
        let fields = serde_json::from_str(&self.fields).map_err(StorageError::from)?;
        let tags = serde_json::from_str(&self.tags).map_err(StorageError::from)?;

        Ok(Document {
            id: self.id,
            id_kind,
            key: EntryKey::new(self.key),
            path: self.path,
            size: u64::try_from(self.size).unwrap_or(0),
            mtime: self.mtime,
            kind,
            mime: self.mime,
            capability,
            fields,
            text: self.text,
            tags,
            thumbnail: self.thumbnail,
            status,
            error: self.error,
            indexed_at: self.indexed_at,
        })
    }
}
