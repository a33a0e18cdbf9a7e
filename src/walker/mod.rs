//! Filesystem traversal.
//!
//! This module provides:
//! - Lazy depth-first walking with symlink cycle detection
//! - Gitignore-style include/exclude rules, depth and size bounds
//! - The `ScanEntry` and `EntryKey` types shared by the pipeline

mod entry;
mod filter;
mod tree;

pub use entry::{EntryKey, EntryKind, FileId, KeyMode, ScanEntry};
pub use filter::{PathFilter, WalkRules};
pub use tree::TreeWalker;
