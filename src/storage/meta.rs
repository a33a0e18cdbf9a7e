//! The commit marker, run identity and stored summary.

use rusqlite::Connection;

use super::models::{IndexMeta, RunSummary};
use crate::error::StorageError;
use crate::Result;

/// Write the run identity with a zero commit marker.
///
/// # Errors
///
/// Returns an error if the row already exists or cannot be written.
pub fn init_meta(conn: &Connection, run_id: &str, roots: &[String], started_at: i64) -> Result<()> {
    let roots = serde_json::to_string(roots).map_err(StorageError::from)?;
    conn.execute(
        "INSERT INTO index_meta (id, run_id, roots, started_at, committed) VALUES (1, ?, ?, ?, 0)",
        rusqlite::params![run_id, roots, started_at],
    )
    .map_err(|e| StorageError::Database(format!("failed to write index meta: {e}")))?;
    Ok(())
}

/// Read the run identity and commit marker.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn get_meta(conn: &Connection) -> Result<Option<IndexMeta>> {
    let result = conn.query_row(
        "SELECT run_id, roots, started_at, committed FROM index_meta WHERE id = 1",
        [],
        |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, i64>(2)?,
                row.get::<_, i64>(3)?,
            ))
        },
    );

    match result {
        Ok((run_id, roots, started_at, committed)) => Ok(Some(IndexMeta {
            run_id,
            roots: serde_json::from_str(&roots).map_err(StorageError::from)?,
            started_at,
            committed: u64::try_from(committed).unwrap_or(0),
        })),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(StorageError::Database(e.to_string()).into()),
    }
}

/// Advance the commit marker.
///
/// # Errors
///
/// Returns an error if the update fails.
pub fn set_committed(conn: &Connection, seq: u64) -> Result<()> {
    let seq = i64::try_from(seq).map_err(|_| StorageError::Database(format!("sequence {seq} out of range")))?;
    let updated = conn
        .execute("UPDATE index_meta SET committed = ? WHERE id = 1", [seq])
        .map_err(|e| StorageError::Database(format!("failed to advance commit marker: {e}")))?;
    if updated == 0 {
        return Err(StorageError::not_found("index_meta", "1").into());
    }
    Ok(())
}

/// Store the run summary.
///
/// # Errors
///
/// Returns an error if a summary was already stored.
pub fn store_summary(conn: &Connection, summary: &RunSummary) -> Result<()> {
    let json = serde_json::to_string(summary).map_err(StorageError::from)?;
    conn.execute("INSERT INTO run_summary (id, summary) VALUES (1, ?)", [json])
        .map_err(|e| StorageError::Database(format!("failed to store summary: {e}")))?;
    Ok(())
}

/// Read the run summary, present only if the run finalized.
///
/// # Errors
///
/// Returns an error if the query fails or the summary is malformed.
pub fn get_summary(conn: &Connection) -> Result<Option<RunSummary>> {
    let result = conn.query_row("SELECT summary FROM run_summary WHERE id = 1", [], |row| {
        row.get::<_, String>(0)
    });

    match result {
        Ok(json) => Ok(Some(serde_json::from_str(&json).map_err(StorageError::from)?)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(StorageError::Database(e.to_string()).into()),
    }
}
