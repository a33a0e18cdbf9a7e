//! Plain text extractor.

use std::path::Path;

use super::read::read_hashed;
use super::{Budget, CapabilityTag, Extraction, ExtractionResult, Extractor, Failure, FailureKind};

/// Upper bound on text kept in memory; the hash still covers the whole file.
const TEXT_KEEP_BYTES: usize = 8 * 1024 * 1024;

/// Reads UTF-8 text, counting lines and words.
#[derive(Debug, Default, Clone, Copy)]
pub struct TextExtractor;

impl Extractor for TextExtractor {
    fn name(&self) -> &'static str {
        "text"
    }

    fn extract(&self, path: &Path, _tag: CapabilityTag, budget: &Budget) -> ExtractionResult {
        let read = match read_hashed(path, TEXT_KEEP_BYTES, budget) {
            Ok(read) => read,
            Err(failure) => return ExtractionResult::HardFailure(failure),
        };

        let (text, valid) = decode(&read.bytes, read.truncated());
        let lines = text.lines().count();
        let words = text.split_whitespace().count();

        let mut extraction = Extraction::new()
            .with_field("lines", lines)
            .with_field("words", words)
            .with_field("encoding", "utf-8")
            .with_content_hash(read.hash.clone());
        if read.truncated() {
            extraction = extraction.with_field("text_complete", false);
        }
        let extraction = extraction.with_text(text);

        if valid {
            ExtractionResult::Success(extraction)
        } else {
            ExtractionResult::PartialFailure(
                extraction,
                Failure::new(FailureKind::Corrupt, "invalid UTF-8 sequences replaced"),
            )
        }
    }
}

/// Decode bytes, returning the text and whether the input was valid UTF-8.
///
/// When `truncated` is set the bytes are a prefix of the file, so a
/// multi-byte character cut off at the end is dropped rather than reported.
fn decode(bytes: &[u8], truncated: bool) -> (String, bool) {
    match std::str::from_utf8(bytes) {
        Ok(s) => (s.to_owned(), true),
        Err(e) if truncated && e.error_len().is_none() => {
            let valid = std::str::from_utf8(&bytes[..e.valid_up_to()]).unwrap_or_default();
            (valid.to_owned(), true)
        }
        Err(_) => (String::from_utf8_lossy(bytes).into_owned(), false),
    }
}
