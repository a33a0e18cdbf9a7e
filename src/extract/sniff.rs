//! Content sniffing.
//!
//! Uses the `infer` crate to detect file types from magic bytes. When the
//! header matches nothing known, a text-like payload is classified as text
//! and the extension is only used to refine its mime type. The extension
//! alone never decides the tag of non-empty content.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use infer::MatcherType;

use super::CapabilityTag;

/// Bytes read from the start of a file for sniffing.
pub const SNIFF_LEN: usize = 8192;

const OCTET_STREAM: &str = "application/octet-stream";

/// Text extensions and their mime types, used as hints only.
const TEXT_HINTS: &[(&str, &str)] = &[
    ("txt", "text/plain"),
    ("log", "text/plain"),
    ("md", "text/markdown"),
    ("markdown", "text/markdown"),
    ("rst", "text/x-rst"),
    ("csv", "text/csv"),
    ("tsv", "text/tab-separated-values"),
    ("json", "application/json"),
    ("yaml", "application/yaml"),
    ("yml", "application/yaml"),
    ("toml", "application/toml"),
    ("xml", "application/xml"),
    ("html", "text/html"),
    ("htm", "text/html"),
    ("css", "text/css"),
    ("js", "text/javascript"),
    ("rs", "text/x-rust"),
    ("py", "text/x-python"),
    ("c", "text/x-c"),
    ("h", "text/x-c"),
    ("sh", "application/x-sh"),
];

/// Result of classifying a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub tag: CapabilityTag,
    pub mime: String,
}

impl Classification {
    pub fn new(tag: CapabilityTag, mime: impl Into<String>) -> Self {
        Self {
            tag,
            mime: mime.into(),
        }
    }
}

/// Classify a header, with the lowercased extension as a fallback hint.
#[must_use]
pub fn sniff(header: &[u8], extension: Option<&str>) -> Classification {
    let hint = extension.and_then(text_hint);

    if header.is_empty() {
        return hint.map_or_else(
            || Classification::new(CapabilityTag::Binary, "application/x-empty"),
            |mime| Classification::new(CapabilityTag::Text, mime),
        );
    }

    if let Some(kind) = infer::get(header) {
        let tag = match kind.matcher_type() {
            MatcherType::App => CapabilityTag::Application,
            MatcherType::Archive => CapabilityTag::Archive,
            MatcherType::Audio => CapabilityTag::Audio,
            MatcherType::Book | MatcherType::Doc => CapabilityTag::Document,
            MatcherType::Font => CapabilityTag::Font,
            MatcherType::Image => CapabilityTag::Image,
            MatcherType::Text => CapabilityTag::Text,
            MatcherType::Video => CapabilityTag::Video,
            _ => CapabilityTag::Binary,
        };
        return Classification::new(tag, kind.mime_type());
    }

    if looks_like_text(header) {
        return Classification::new(CapabilityTag::Text, hint.unwrap_or("text/plain"));
    }

    Classification::new(CapabilityTag::Binary, OCTET_STREAM)
}

/// Read the header of `path` and classify it.
///
/// # Errors
///
/// Returns an error if the file cannot be opened or read.
pub fn classify_path(path: &Path, extension: Option<&str>) -> std::io::Result<Classification> {
    let mut header = Vec::with_capacity(SNIFF_LEN);
    File::open(path)?
        .take(SNIFF_LEN as u64)
        .read_to_end(&mut header)?;
    Ok(sniff(&header, extension))
}

fn text_hint(extension: &str) -> Option<&'static str> {
    TEXT_HINTS
        .iter()
        .find(|(ext, _)| *ext == extension)
        .map(|(_, mime)| *mime)
}

/// No NUL bytes and valid UTF-8, allowing a multi-byte sequence cut off by
/// the end of the header.
fn looks_like_text(header: &[u8]) -> bool {
    if header.contains(&0) {
        return false;
    }
    match std::str::from_utf8(header) {
        Ok(_) => true,
        Err(e) => e.error_len().is_none(),
    }
}
