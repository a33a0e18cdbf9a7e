//! Sifter - incremental filesystem content indexer
//!
//! Entry point for the `sifter` command.

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use sifter::config::{parse_ceiling, parse_size};
use sifter::extract::CapabilityTag;
use sifter::storage::IndexReader;
use sifter::telemetry::{init_metrics, init_tracing, render_metrics, ProgressReporter};
use sifter::walker::KeyMode;
use sifter::{Config, Error, Pipeline, Result, RunState};

/// Sifter - incremental filesystem content indexer
#[derive(Parser, Debug)]
#[command(name = "sifter")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, env = "SIFTER_LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Enable JSON logging output
    #[arg(long, global = true, env = "SIFTER_LOG_JSON")]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Scan directory trees into a new index file
    Scan(ScanArgs),

    /// Print the summary stored in an index file
    Stats {
        /// Index file to inspect
        index: PathBuf,
    },
}

#[derive(Args, Debug)]
#[allow(clippy::struct_excessive_bools)]
struct ScanArgs {
    /// Directories to scan
    #[arg(required = true, env = "SIFTER_ROOTS", value_delimiter = ',')]
    roots: Vec<PathBuf>,

    /// Index file to write
    #[arg(short, long, env = "SIFTER_OUTPUT", default_value = "index.db")]
    output: PathBuf,

    /// Previous index to reuse unchanged documents from
    #[arg(short, long, env = "SIFTER_PREVIOUS")]
    previous: Option<PathBuf>,

    /// Ignore the previous index and extract everything
    #[arg(long, env = "SIFTER_FULL")]
    full: bool,

    /// Replace the output file if it exists
    #[arg(long, env = "SIFTER_OVERWRITE")]
    overwrite: bool,

    /// Gitignore-style patterns to exclude
    #[arg(short, long = "exclude", env = "SIFTER_EXCLUDE", value_delimiter = ',')]
    excludes: Vec<String>,

    /// Gitignore-style patterns files must match
    #[arg(short, long = "include", env = "SIFTER_INCLUDE", value_delimiter = ',')]
    includes: Vec<String>,

    /// Maximum directory depth below each root
    #[arg(long, env = "SIFTER_MAX_DEPTH")]
    max_depth: Option<usize>,

    /// Smallest file size to index (e.g. 1K)
    #[arg(long, env = "SIFTER_MIN_SIZE", value_parser = size_arg, default_value = "0")]
    min_size: u64,

    /// Largest file size to index (e.g. 4G)
    #[arg(long, env = "SIFTER_MAX_SIZE", value_parser = size_arg)]
    max_size: Option<u64>,

    /// Descend into symlinked directories
    #[arg(long, env = "SIFTER_FOLLOW_SYMLINKS")]
    follow_symlinks: bool,

    /// Match entries against the previous index by path or inode
    #[arg(long, env = "SIFTER_KEY_MODE", default_value = "path")]
    key_mode: KeyMode,

    /// Number of worker threads (default: available parallelism)
    #[arg(short, long, env = "SIFTER_WORKERS")]
    workers: Option<usize>,

    /// Task queue capacity (default: 4 per worker)
    #[arg(long, env = "SIFTER_QUEUE_CAPACITY")]
    queue_capacity: Option<usize>,

    /// Per-file extraction timeout in seconds
    #[arg(long, env = "SIFTER_TIMEOUT_SECS", default_value = "30")]
    timeout_secs: u64,

    /// Size ceiling for one capability, as tag=size (repeatable)
    #[arg(long = "ceiling", env = "SIFTER_CEILINGS", value_delimiter = ',', value_parser = ceiling_arg)]
    ceilings: Vec<(CapabilityTag, u64)>,

    /// Size ceiling for capabilities without their own
    #[arg(long, env = "SIFTER_DEFAULT_CEILING", value_parser = size_arg, default_value = "64M")]
    default_ceiling: u64,

    /// Maximum bytes of text kept per document
    #[arg(long, env = "SIFTER_MAX_TEXT_LEN", default_value = "100000")]
    max_text_len: usize,

    /// Record metadata only, without running extractors
    #[arg(long, env = "SIFTER_METADATA_ONLY")]
    metadata_only: bool,

    /// Hash every regular file
    #[arg(long, env = "SIFTER_CHECKSUMS")]
    checksums: bool,

    /// Retry files the previous run skipped
    #[arg(long, env = "SIFTER_RESCAN_SKIPPED")]
    rescan_skipped: bool,

    /// Seconds between progress reports
    #[arg(long, env = "SIFTER_PROGRESS_SECS", default_value = "5")]
    progress_secs: u64,

    /// Print Prometheus metrics after the summary
    #[arg(long, env = "SIFTER_PRINT_METRICS")]
    print_metrics: bool,
}

impl ScanArgs {
    fn into_config(self, log_level: String, log_json: bool) -> Config {
        let defaults = Config::default();
        Config {
            roots: self.roots,
            output: self.output,
            previous: self.previous,
            incremental: !self.full,
            overwrite: self.overwrite,
            excludes: self.excludes,
            includes: self.includes,
            max_depth: self.max_depth,
            min_size: self.min_size,
            max_size: self.max_size,
            follow_symlinks: self.follow_symlinks,
            key_mode: self.key_mode,
            workers: self.workers.unwrap_or(defaults.workers),
            queue_capacity: self.queue_capacity,
            timeout: Duration::from_secs(self.timeout_secs),
            default_ceiling: self.default_ceiling,
            ceilings: self.ceilings.into_iter().collect(),
            max_text_len: self.max_text_len,
            metadata_only: self.metadata_only,
            checksums: self.checksums,
            rescan_skipped: self.rescan_skipped,
            log_level,
            log_json,
            progress_interval: Duration::from_secs(self.progress_secs),
        }
    }
}

fn size_arg(s: &str) -> std::result::Result<u64, String> {
    parse_size(s).map_err(|e| e.to_string())
}

fn ceiling_arg(s: &str) -> std::result::Result<(CapabilityTag, u64), String> {
    parse_ceiling(s).map_err(|e| e.to_string())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_tracing(&cli.log_level, cli.log_json);

    tracing::debug!("Sifter v{} starting", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Command::Scan(args) => {
            let print_metrics = args.print_metrics;
            scan(args.into_config(cli.log_level, cli.log_json), print_metrics).await
        }
        Command::Stats { index } => stats(&index),
    }
}

async fn scan(config: Config, print_metrics: bool) -> Result<()> {
    tracing::debug!(?config, "Configuration loaded");

    let pipeline = Pipeline::new(config)?;
    init_metrics();

    let state = RunState::new();

    let signal_state = Arc::clone(&state);
    let signal = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, finishing in-flight files");
            signal_state.cancel();
        }
    });

    let reporter = ProgressReporter::spawn(Arc::clone(&state), pipeline.config().progress_interval);
    let result = pipeline.run_async(Arc::clone(&state)).await;
    reporter.stop().await;
    signal.abort();

    let summary = result?;
    let json = serde_json::to_string_pretty(&summary)
        .map_err(|e| Error::internal(format!("failed to encode summary: {e}")))?;
    println!("{json}");

    if print_metrics {
        print!("{}", render_metrics()?);
    }

    Ok(())
}

fn stats(index: &std::path::Path) -> Result<()> {
    let reader = IndexReader::open(index)?;

    let report = serde_json::json!({
        "meta": reader.meta()?,
        "summary": reader.summary()?,
        "committed": reader.count()?,
        "documents": reader.status_counts()?,
    });
    let json = serde_json::to_string_pretty(&report)
        .map_err(|e| Error::internal(format!("failed to encode stats: {e}")))?;
    println!("{json}");

    Ok(())
}
