//! Content extraction capabilities and type dispatch.
//!
//! This module provides:
//! - The [`Extractor`] capability interface and a registry keyed by tag
//! - Magic-byte classification of files into capability tags
//! - The dispatcher that applies size ceilings and runs extractors
//! - Built-in extractors for plain text and image headers

mod dispatch;
mod image;
mod read;
mod registry;
mod sniff;
mod text;

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

pub use dispatch::{DispatchLimits, Dispatcher, Outcome};
pub(crate) use dispatch::panic_message;
pub use self::image::ImageExtractor;
pub use read::{hash_file, read_hashed, HashedRead};
pub use registry::ExtractorRegistry;
pub use sniff::{sniff, Classification, SNIFF_LEN};
pub use text::TextExtractor;

/// Classification label selecting which extraction logic applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CapabilityTag {
    Text,
    Image,
    Audio,
    Video,
    Archive,
    Document,
    Font,
    Application,
    Binary,
    Symlink,
    Special,
}

impl CapabilityTag {
    pub const ALL: [Self; 11] = [
        Self::Text,
        Self::Image,
        Self::Audio,
        Self::Video,
        Self::Archive,
        Self::Document,
        Self::Font,
        Self::Application,
        Self::Binary,
        Self::Symlink,
        Self::Special,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Image => "image",
            Self::Audio => "audio",
            Self::Video => "video",
            Self::Archive => "archive",
            Self::Document => "document",
            Self::Font => "font",
            Self::Application => "application",
            Self::Binary => "binary",
            Self::Symlink => "symlink",
            Self::Special => "special",
        }
    }
}

impl fmt::Display for CapabilityTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for CapabilityTag {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.to_lowercase();
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == lower)
            .ok_or_else(|| format!("unknown capability tag '{s}'"))
    }
}

/// Limits an extraction must honor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Budget {
    /// Maximum bytes the extractor may read.
    pub max_size: u64,
    /// Wall-clock limit, enforced by the worker pool and checked best-effort
    /// by extractors.
    pub timeout: Duration,
}

impl Budget {
    #[must_use]
    pub const fn new(max_size: u64, timeout: Duration) -> Self {
        Self { max_size, timeout }
    }

    /// Deadline for an extraction starting now.
    #[must_use]
    pub fn deadline(&self) -> Instant {
        Instant::now() + self.timeout
    }
}

/// Why an extraction failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Input could not be parsed.
    Corrupt,
    /// The file could not be read.
    Io,
    /// Time or size budget exceeded.
    ResourceExceeded,
    /// The extractor panicked or its thread died.
    Fault,
}

impl FailureKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Corrupt => "corrupt",
            Self::Io => "io",
            Self::ResourceExceeded => "resource_exceeded",
            Self::Fault => "fault",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failure with its kind and a human-readable message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    pub kind: FailureKind,
    pub message: String,
}

impl Failure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl From<std::io::Error> for Failure {
    fn from(e: std::io::Error) -> Self {
        Self::new(FailureKind::Io, e.to_string())
    }
}

/// Why a file was skipped by policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// No capability registered for the tag.
    Unsupported,
    /// Larger than the tag's size ceiling.
    Oversized,
}

impl SkipReason {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Unsupported => "unsupported",
            Self::Oversized => "oversized",
        }
    }
}

/// Raw output of an extractor, before normalization.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Extraction {
    pub fields: BTreeMap<String, serde_json::Value>,
    pub text: Option<String>,
    pub thumbnail: Option<String>,
    /// Hex content hash, when the extractor read the whole file.
    pub content_hash: Option<String>,
    /// Mime type refined by the extractor.
    pub mime: Option<String>,
}

impl Extraction {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    #[must_use]
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    #[must_use]
    pub fn with_content_hash(mut self, hash: impl Into<String>) -> Self {
        self.content_hash = Some(hash.into());
        self
    }

    #[must_use]
    pub fn with_mime(mut self, mime: impl Into<String>) -> Self {
        self.mime = Some(mime.into());
        self
    }
}

/// Outcome of invoking an extraction capability.
#[derive(Debug, Clone, PartialEq)]
pub enum ExtractionResult {
    Success(Extraction),
    /// Skipped by policy; not an error.
    Skipped(SkipReason),
    /// Some fields were recovered.
    PartialFailure(Extraction, Failure),
    HardFailure(Failure),
}

impl ExtractionResult {
    pub fn hard(kind: FailureKind, message: impl Into<String>) -> Self {
        Self::HardFailure(Failure::new(kind, message))
    }

    /// The extraction payload, if any fields were produced.
    #[must_use]
    pub const fn extraction(&self) -> Option<&Extraction> {
        match self {
            Self::Success(e) | Self::PartialFailure(e, _) => Some(e),
            Self::Skipped(_) | Self::HardFailure(_) => None,
        }
    }

    #[must_use]
    pub fn extraction_mut(&mut self) -> Option<&mut Extraction> {
        match self {
            Self::Success(e) | Self::PartialFailure(e, _) => Some(e),
            Self::Skipped(_) | Self::HardFailure(_) => None,
        }
    }
}

/// An extraction capability for one format family.
///
/// Implementations should honor the budget best-effort; the worker pool
/// enforces the time limit regardless and converts panics to
/// [`FailureKind::Fault`].
pub trait Extractor: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Extract fields and text from the file at `path`.
    fn extract(&self, path: &Path, tag: CapabilityTag, budget: &Budget) -> ExtractionResult;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_from_str() {
        assert_eq!("IMAGE".parse::<CapabilityTag>().unwrap(), CapabilityTag::Image);
        assert!("pdf".parse::<CapabilityTag>().is_err());
        for tag in CapabilityTag::ALL {
            assert_eq!(tag.as_str().parse::<CapabilityTag>().unwrap(), tag);
        }
    }

    #[test]
    fn test_failure_from_io() {
        let failure: Failure =
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied").into();
        assert_eq!(failure.kind, FailureKind::Io);
        assert_eq!(failure.to_string(), "io: denied");
    }

    #[test]
    fn test_extraction_accessors() {
        let mut ok = ExtractionResult::Success(Extraction::new().with_field("lines", 3));
        assert!(ok.extraction().is_some());
        ok.extraction_mut().unwrap().content_hash = Some("abc".into());
        assert_eq!(ok.extraction().unwrap().content_hash.as_deref(), Some("abc"));

        assert!(ExtractionResult::Skipped(SkipReason::Oversized).extraction().is_none());
        assert!(ExtractionResult::hard(FailureKind::Fault, "boom").extraction().is_none());
    }
}
