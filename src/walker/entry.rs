//! Filesystem entries discovered by the walker.

use std::fmt;
use std::fs::Metadata;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

#[cfg(unix)]
use std::os::unix::fs::MetadataExt;

use serde::{Deserialize, Serialize};

/// Kind of filesystem object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    File,
    Directory,
    Symlink,
    Unsupported,
}

impl EntryKind {
    /// Classify from file metadata (not following links).
    #[must_use]
    pub fn from_metadata(metadata: &Metadata) -> Self {
        let ft = metadata.file_type();
        if ft.is_file() {
            Self::File
        } else if ft.is_dir() {
            Self::Directory
        } else if ft.is_symlink() {
            Self::Symlink
        } else {
            Self::Unsupported
        }
    }

    /// Stable string form, used in the index.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::File => "file",
            Self::Directory => "directory",
            Self::Symlink => "symlink",
            Self::Unsupported => "unsupported",
        }
    }

    /// Parse the string form written by [`EntryKind::as_str`].
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "file" => Some(Self::File),
            "directory" => Some(Self::Directory),
            "symlink" => Some(Self::Symlink),
            "unsupported" => Some(Self::Unsupported),
            _ => None,
        }
    }
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Device and inode pair identifying a file on unix systems.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FileId {
    pub dev: u64,
    pub ino: u64,
}

impl FileId {
    /// Read the identity from metadata. Always `None` off unix.
    #[must_use]
    #[allow(clippy::missing_const_for_fn)]
    pub fn from_metadata(metadata: &Metadata) -> Option<Self> {
        #[cfg(unix)]
        {
            Some(Self {
                dev: metadata.dev(),
                ino: metadata.ino(),
            })
        }
        #[cfg(not(unix))]
        {
            let _ = metadata;
            None
        }
    }
}

/// How entries are matched against the previous run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyMode {
    /// Key by absolute path.
    #[default]
    Path,
    /// Key by device and inode, falling back to path where unavailable.
    Inode,
}

impl std::str::FromStr for KeyMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "path" => Ok(Self::Path),
            "inode" => Ok(Self::Inode),
            other => Err(format!("unknown key mode '{other}', expected 'path' or 'inode'")),
        }
    }
}

/// Stable key matching an entry against a prior run.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntryKey(String);

impl EntryKey {
    /// Wrap an already-encoded key.
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Key for a path.
    #[must_use]
    pub fn for_path(path: &Path) -> Self {
        Self(format!("path:{}", path.to_string_lossy()))
    }

    /// Key for a device/inode pair.
    #[must_use]
    pub fn for_file_id(id: FileId) -> Self {
        Self(format!("inode:{}:{}", id.dev, id.ino))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One filesystem object discovered by the walker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanEntry {
    /// Absolute path.
    pub path: PathBuf,
    /// Absolute path of the containing directory.
    pub parent: PathBuf,
    /// Size in bytes (zero for non-files).
    pub size: u64,
    /// Modification time in nanoseconds since the Unix epoch.
    pub mtime: i64,
    /// Device and inode, where the platform exposes them.
    pub file_id: Option<FileId>,
    pub kind: EntryKind,
}

impl ScanEntry {
    /// Build an entry from a path and its metadata.
    ///
    /// `metadata` decides the kind, so pass link metadata when symlinks are
    /// not followed.
    #[must_use]
    pub fn from_metadata(path: PathBuf, metadata: &Metadata) -> Self {
        let kind = EntryKind::from_metadata(metadata);
        let parent = path.parent().map(Path::to_path_buf).unwrap_or_default();
        let size = if kind == EntryKind::File {
            metadata.len()
        } else {
            0
        };

        Self {
            path,
            parent,
            size,
            mtime: metadata.modified().map_or(0, system_time_nanos),
            file_id: FileId::from_metadata(metadata),
            kind,
        }
    }

    /// Compute the entry key for the given mode.
    #[must_use]
    pub fn key(&self, mode: KeyMode) -> EntryKey {
        match (mode, self.file_id) {
            (KeyMode::Inode, Some(id)) => EntryKey::for_file_id(id),
            _ => EntryKey::for_path(&self.path),
        }
    }

    /// File name, lossily converted.
    #[must_use]
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// Lowercased extension, if any.
    #[must_use]
    pub fn extension(&self) -> Option<String> {
        self.path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase)
    }
}

/// Convert a timestamp to signed nanoseconds since the epoch.
fn system_time_nanos(t: SystemTime) -> i64 {
    match t.duration_since(UNIX_EPOCH) {
        Ok(d) => i64::try_from(d.as_nanos()).unwrap_or(i64::MAX),
        Err(e) => i64::try_from(e.duration().as_nanos()).map_or(i64::MIN, |n| -n),
    }
}
