//! `SQLite` index files.
//!
//! This module provides:
//! - The append-only [`IndexWriter`] with its commit marker and run summary
//! - [`IndexReader`] for finished or interrupted indexes
//! - [`PreviousSnapshot`], the previous run's documents keyed for reuse

mod connection;
mod documents;
mod meta;
mod models;
mod reader;
mod schema;
mod snapshot;
mod writer;

pub use connection::Database;
pub use documents::{count_by_status, count_documents, get_document, insert_document, list_documents};
pub use meta::{get_meta, get_summary, init_meta, set_committed, store_summary};
pub use models::{IndexMeta, RunSummary, StatusCounts};
pub use reader::IndexReader;
pub use schema::{migrate, verify_schema, SCHEMA_VERSION};
pub use snapshot::PreviousSnapshot;
pub use writer::IndexWriter;
