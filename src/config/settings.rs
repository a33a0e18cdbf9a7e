//! Configuration settings and validation.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use crate::extract::{Budget, CapabilityTag, DispatchLimits};
use crate::pipeline::ReusePolicy;
use crate::walker::{KeyMode, WalkRules};
use crate::{Error, Result};

/// Upper bound on worker threads.
pub const MAX_WORKERS: usize = 256;

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Settings for one scan run.
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory trees to scan.
    pub roots: Vec<PathBuf>,

    /// Index file to write.
    pub output: PathBuf,

    /// Index from an earlier run, used for reuse in incremental mode.
    pub previous: Option<PathBuf>,

    /// Reuse unchanged documents from `previous`.
    pub incremental: bool,

    /// Replace `output` if it exists.
    pub overwrite: bool,

    /// Gitignore-style patterns pruned from the walk.
    pub excludes: Vec<String>,

    /// Gitignore-style patterns files must match, when non-empty.
    pub includes: Vec<String>,

    pub max_depth: Option<usize>,
    pub min_size: u64,
    pub max_size: Option<u64>,
    pub follow_symlinks: bool,
    pub key_mode: KeyMode,

    /// Number of worker threads.
    pub workers: usize,

    /// Task queue capacity; `None` means four tasks per worker.
    pub queue_capacity: Option<usize>,

    /// Wall-clock budget for one extraction.
    pub timeout: Duration,

    /// Size ceiling for tags without their own entry in `ceilings`.
    pub default_ceiling: u64,

    /// Per-tag size ceilings in bytes.
    pub ceilings: HashMap<CapabilityTag, u64>,

    /// Maximum bytes of text kept per document.
    pub max_text_len: usize,

    /// Record file metadata without running extractors.
    pub metadata_only: bool,

    /// Compute a content hash for every regular file.
    pub checksums: bool,

    /// Retry files the previous run skipped by policy.
    pub rescan_skipped: bool,

    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Emit logs as JSON.
    pub log_json: bool,

    /// How often progress is reported.
    pub progress_interval: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            roots: Vec::new(),
            output: PathBuf::from("index.db"),
            previous: None,
            incremental: true,
            overwrite: false,
            excludes: Vec::new(),
            includes: Vec::new(),
            max_depth: None,
            min_size: 0,
            max_size: None,
            follow_symlinks: false,
            key_mode: KeyMode::Path,
            workers: std::thread::available_parallelism()
                .map(|n| n.get().min(MAX_WORKERS))
                .unwrap_or(4),
            queue_capacity: None,
            timeout: Duration::from_secs(30),
            default_ceiling: 64 * 1024 * 1024,
            ceilings: HashMap::new(),
            max_text_len: 100_000,
            metadata_only: false,
            checksums: false,
            rescan_skipped: false,
            log_level: "info".to_string(),
            log_json: false,
            progress_interval: Duration::from_secs(5),
        }
    }
}

impl Config {
    /// Create a new configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate configuration values.
    ///
    /// # Errors
    ///
    /// Returns an error naming the first invalid setting.
    pub fn validate(&self) -> Result<()> {
        if self.roots.is_empty() {
            return Err(Error::config("roots: at least one scan root is required"));
        }

        if self.workers == 0 || self.workers > MAX_WORKERS {
            return Err(Error::config(format!(
                "workers must be between 1 and {MAX_WORKERS}, got {}",
                self.workers
            )));
        }

        if self.queue_capacity == Some(0) {
            return Err(Error::config("queue_capacity cannot be 0"));
        }

        if self.timeout.is_zero() {
            return Err(Error::config("timeout cannot be 0"));
        }

        if self.default_ceiling == 0 {
            return Err(Error::config("default_ceiling cannot be 0"));
        }

        if let Some((tag, _)) = self.ceilings.iter().find(|(_, v)| **v == 0) {
            return Err(Error::config(format!("ceiling for '{tag}' cannot be 0")));
        }

        if self.max_text_len == 0 {
            return Err(Error::config("max_text_len cannot be 0"));
        }

        if let Some(max) = self.max_size {
            if max < self.min_size {
                return Err(Error::config(format!(
                    "max_size ({max}) is smaller than min_size ({})",
                    self.min_size
                )));
            }
        }

        if !LOG_LEVELS.contains(&self.log_level.to_lowercase().as_str()) {
            return Err(Error::config(format!(
                "invalid log level '{}', must be one of: {}",
                self.log_level,
                LOG_LEVELS.join(", ")
            )));
        }

        if self.progress_interval.is_zero() {
            return Err(Error::config("progress_interval cannot be 0"));
        }

        Ok(())
    }

    /// Effective queue capacity.
    #[must_use]
    pub fn queue_capacity(&self) -> usize {
        self.queue_capacity
            .unwrap_or_else(|| self.workers.saturating_mul(4))
            .max(1)
    }

    /// The previous index to diff against, if incremental mode applies.
    #[must_use]
    pub fn previous_index(&self) -> Option<&PathBuf> {
        self.previous.as_ref().filter(|_| self.incremental)
    }

    #[must_use]
    pub fn walk_rules(&self) -> WalkRules {
        WalkRules {
            excludes: self.excludes.clone(),
            includes: self.includes.clone(),
            max_depth: self.max_depth,
            min_size: self.min_size,
            max_size: self.max_size,
            follow_symlinks: self.follow_symlinks,
        }
    }

    #[must_use]
    pub fn dispatch_limits(&self) -> DispatchLimits {
        DispatchLimits {
            default_ceiling: Some(self.default_ceiling),
            ceilings: self.ceilings.clone(),
            metadata_only: self.metadata_only,
            checksums: self.checksums,
        }
    }

    /// Budget attached to every task.
    #[must_use]
    pub fn budget(&self) -> Budget {
        let largest = self
            .ceilings
            .values()
            .copied()
            .fold(self.default_ceiling, u64::max);
        Budget::new(largest, self.timeout)
    }

    #[must_use]
    pub const fn reuse_policy(&self) -> ReusePolicy {
        ReusePolicy {
            rescan_skipped: self.rescan_skipped,
        }
    }
}

/// Parse a byte size with an optional binary suffix: `512`, `64K`, `8MiB`, `1g`.
///
/// # Errors
///
/// Returns an error if the number or suffix is invalid.
pub fn parse_size(s: &str) -> Result<u64> {
    let s = s.trim();
    let split = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
    let (digits, suffix) = s.split_at(split);
    let n: u64 = digits
        .parse()
        .map_err(|_| Error::config(format!("invalid size '{s}'")))?;

    let shift = match suffix.trim().to_lowercase().as_str() {
        "" | "b" => 0,
        "k" | "kb" | "kib" => 10,
        "m" | "mb" | "mib" => 20,
        "g" | "gb" | "gib" => 30,
        other => return Err(Error::config(format!("invalid size suffix '{other}' in '{s}'"))),
    };

    n.checked_mul(1 << shift)
        .ok_or_else(|| Error::config(format!("size '{s}' is too large")))
}

/// Parse a per-tag ceiling of the form `tag=size`.
///
/// # Errors
///
/// Returns an error if the tag is unknown or the size is invalid.
pub fn parse_ceiling(s: &str) -> Result<(CapabilityTag, u64)> {
    let (tag, size) = s
        .split_once('=')
        .ok_or_else(|| Error::config(format!("ceiling '{s}' must be tag=size")))?;
    let tag = tag.trim().parse::<CapabilityTag>().map_err(Error::config)?;
    Ok((tag, parse_size(size)?))
}
