//! Canonical document records.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::extract::CapabilityTag;
use crate::walker::{EntryKey, EntryKind};

/// Get current Unix timestamp.
pub(crate) fn now_unix() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| i64::try_from(d.as_secs()).unwrap_or(0))
        .unwrap_or(0)
}

/// Outcome status recorded on a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Indexed,
    Skipped,
    Errored,
}

impl Status {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Indexed => "indexed",
            Self::Skipped => "skipped",
            Self::Errored => "errored",
        }
    }

    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "indexed" => Some(Self::Indexed),
            "skipped" => Some(Self::Skipped),
            "errored" => Some(Self::Errored),
            _ => None,
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a document identifier was derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdKind {
    /// Hash of the file content; stable while content is unchanged.
    Content,
    /// Hash of the path; not content-stable.
    Path,
}

impl IdKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Content => "content",
            Self::Path => "path",
        }
    }

    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "content" => Some(Self::Content),
            "path" => Some(Self::Path),
            _ => None,
        }
    }
}

/// A typed metadata value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    List(Vec<FieldValue>),
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_owned())
    }
}

impl From<i64> for FieldValue {
    fn from(n: i64) -> Self {
        Self::Int(n)
    }
}

/// The normalized record for one file, as written to the index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Content hash, or path hash when content was not read.
    pub id: String,
    pub id_kind: IdKind,
    pub key: EntryKey,
    pub path: String,
    pub size: u64,
    /// Nanoseconds since the Unix epoch.
    pub mtime: i64,
    pub kind: EntryKind,
    pub mime: Option<String>,
    pub capability: Option<CapabilityTag>,
    pub fields: BTreeMap<String, FieldValue>,
    pub text: Option<String>,
    pub tags: BTreeSet<String>,
    pub thumbnail: Option<String>,
    pub status: Status,
    pub error: Option<String>,
    /// Unix timestamp when the document was built.
    pub indexed_at: i64,
}

impl Document {
    /// Whether the identifier tracks content.
    #[must_use]
    pub fn is_content_stable(&self) -> bool {
        self.id_kind == IdKind::Content
    }

    #[must_use]
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.contains(tag)
    }
}
