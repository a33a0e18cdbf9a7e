//! Configuration management for Sifter.
//!
//! A [`Config`] is built by the CLI from command-line flags, each with a
//! `SIFTER_*` environment variable fallback, and validated before a run.

mod settings;

pub use settings::{parse_ceiling, parse_size, Config, MAX_WORKERS};
