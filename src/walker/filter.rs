//! Inclusion and exclusion rules for the tree walker.

use std::path::Path;

use ignore::gitignore::{Gitignore, GitignoreBuilder};

use crate::error::WalkError;
use crate::Result;

/// Traversal rules supplied by configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WalkRules {
    /// Gitignore-style patterns; matching directories are pruned entirely.
    pub excludes: Vec<String>,
    /// Gitignore-style patterns; when non-empty, files must match one.
    pub includes: Vec<String>,
    /// Maximum depth below the root (root is depth 0).
    pub max_depth: Option<usize>,
    /// Files smaller than this are not emitted.
    pub min_size: u64,
    /// Files larger than this are not emitted.
    pub max_size: Option<u64>,
    /// Follow symbolic links (with cycle detection).
    pub follow_symlinks: bool,
}

impl WalkRules {
    /// Check the size bounds.
    #[must_use]
    pub fn size_accepted(&self, size: u64) -> bool {
        size >= self.min_size && self.max_size.map_or(true, |max| size <= max)
    }
}

/// Compiled path filter for one scan root.
#[derive(Debug, Clone)]
pub struct PathFilter {
    excludes: Option<Gitignore>,
    includes: Option<Gitignore>,
}

impl PathFilter {
    /// Compile the rules' patterns relative to `root`.
    ///
    /// # Errors
    ///
    /// Returns an error if a pattern is invalid.
    pub fn new(root: impl AsRef<Path>, rules: &WalkRules) -> Result<Self> {
        let root = root.as_ref();
        Ok(Self {
            excludes: compile(root, &rules.excludes)?,
            includes: compile(root, &rules.includes)?,
        })
    }

    /// Whether a path is excluded. Excluded directories are not descended.
    #[must_use]
    pub fn is_excluded(&self, path: &Path, is_dir: bool) -> bool {
        self.excludes
            .as_ref()
            .is_some_and(|gi| gi.matched(path, is_dir).is_ignore())
    }

    /// Whether a non-directory entry passes the include list.
    #[must_use]
    pub fn is_included(&self, path: &Path) -> bool {
        self.includes
            .as_ref()
            .map_or(true, |gi| gi.matched(path, false).is_ignore())
    }
}

fn compile(root: &Path, patterns: &[String]) -> Result<Option<Gitignore>> {
    if patterns.is_empty() {
        return Ok(None);
    }

    let mut builder = GitignoreBuilder::new(root);
    for pattern in patterns {
        builder
            .add_line(None, pattern)
            .map_err(|e| WalkError::InvalidPattern(format!("'{pattern}': {e}")))?;
    }

    let gitignore = builder
        .build()
        .map_err(|e| WalkError::InvalidPattern(e.to_string()))?;

    Ok(Some(gitignore))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rules(excludes: &[&str], includes: &[&str]) -> WalkRules {
        WalkRules {
            excludes: excludes.iter().map(ToString::to_string).collect(),
            includes: includes.iter().map(ToString::to_string).collect(),
            ..Default::default()
        }
    }

    #[test]
    fn test_no_patterns_accepts_everything() {
        let filter = PathFilter::new("/data", &WalkRules::default()).unwrap();
        assert!(!filter.is_excluded(Path::new("/data/a.txt"), false));
        assert!(filter.is_included(Path::new("/data/a.txt")));
    }

    #[test]
    fn test_exclude_directory_name() {
        let filter = PathFilter::new("/data", &rules(&[".git"], &[])).unwrap();
        assert!(filter.is_excluded(Path::new("/data/.git"), true));
        assert!(filter.is_excluded(Path::new("/data/sub/.git"), true));
        assert!(!filter.is_excluded(Path::new("/data/src"), true));
    }

    #[test]
    fn test_exclude_glob() {
        let filter = PathFilter::new("/data", &rules(&["*.log", "/build/"], &[])).unwrap();
        assert!(filter.is_excluded(Path::new("/data/debug.log"), false));
        assert!(filter.is_excluded(Path::new("/data/build"), true));
        assert!(!filter.is_excluded(Path::new("/data/src/build"), true));
        assert!(!filter.is_excluded(Path::new("/data/main.rs"), false));
    }

    #[test]
    fn test_include_list() {
        let filter = PathFilter::new("/data", &rules(&[], &["*.txt", "*.md"])).unwrap();
        assert!(filter.is_included(Path::new("/data/a.txt")));
        assert!(filter.is_included(Path::new("/data/docs/readme.md")));
        assert!(!filter.is_included(Path::new("/data/a.bin")));
    }

    #[test]
    fn test_size_bounds() {
        let rules = WalkRules {
            min_size: 10,
            max_size: Some(100),
            ..Default::default()
        };
        assert!(!rules.size_accepted(9));
        assert!(rules.size_accepted(10));
        assert!(rules.size_accepted(100));
        assert!(!rules.size_accepted(101));
        assert!(WalkRules::default().size_accepted(0));
    }
}
