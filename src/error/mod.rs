//! Error types and Result aliases for Sifter.
//!
//! This module defines the run-level error hierarchy. Per-file extraction
//! problems are not errors at this level: they are folded into a document
//! status by the worker pool (see [`crate::extract::FailureKind`]).

use thiserror::Error;

/// Result type alias using Sifter's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for Sifter operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Index storage error.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Tree walking error.
    #[error("walk error: {0}")]
    Walk(#[from] WalkError),

    /// Task queue error.
    #[error("queue error: {0}")]
    Queue(#[from] QueueError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Index storage errors.
#[derive(Error, Debug)]
pub enum StorageError {
    /// `SQLite` database error.
    #[error("database error: {0}")]
    Database(String),

    /// Record not found.
    #[error("not found: {entity} with id '{id}'")]
    NotFound { entity: &'static str, id: String },

    /// Schema migration error.
    #[error("migration error: {0}")]
    Migration(String),

    /// A stored column could not be (de)serialized.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// The output index already exists and overwriting was not requested.
    #[error("index already exists at '{0}'")]
    AlreadyExists(String),

    /// Append attempted after the index was finalized.
    #[error("index has been finalized")]
    Finalized,
}

/// Tree walking errors.
#[derive(Error, Debug)]
pub enum WalkError {
    /// Scan root does not exist or cannot be resolved.
    #[error("scan root '{path}' not found: {reason}")]
    RootNotFound { path: String, reason: String },

    /// An include or exclude glob failed to compile.
    #[error("invalid pattern: {0}")]
    InvalidPattern(String),
}

/// Task queue errors.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueError {
    /// The queue was closed; no further submissions are accepted.
    #[error("queue closed")]
    Closed,

    /// The run was cancelled while waiting for capacity.
    #[error("run cancelled")]
    Cancelled,
}

impl Error {
    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an internal error.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}

impl StorageError {
    /// Create a not-found error.
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            id: id.into(),
        }
    }
}

impl From<rusqlite::Error> for StorageError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Database(e.to_string())
    }
}

impl From<rusqlite::Error> for Error {
    fn from(e: rusqlite::Error) -> Self {
        Self::Storage(e.into())
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}
