//! Sifter
//!
//! Incremental filesystem content indexer. A scan walks one or more roots,
//! reuses documents whose files are unchanged since a previous index, runs
//! content extractors on the rest in a fault-isolating worker pool, and
//! writes every result to a fresh `SQLite` index file.

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod document;
pub mod error;
pub mod extract;
pub mod pipeline;
pub mod storage;
pub mod telemetry;
pub mod walker;

pub use config::Config;
pub use error::{Error, Result};
pub use pipeline::{Pipeline, RunState};
