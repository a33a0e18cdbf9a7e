//! Image header extractor.
//!
//! Dimensions come from the container headers via the `image` crate's format
//! decoders. No pixel data is decoded.

use std::io::Cursor;
use std::path::Path;

use image::{ImageFormat, ImageReader};

use super::read::read_hashed;
use super::{Budget, CapabilityTag, Extraction, ExtractionResult, Extractor, Failure, FailureKind};

/// Enough to get past large EXIF segments in front of a JPEG frame header.
const HEADER_KEEP_BYTES: usize = 256 * 1024;

/// Extracts format and pixel dimensions.
#[derive(Debug, Default, Clone, Copy)]
pub struct ImageExtractor;

impl Extractor for ImageExtractor {
    fn name(&self) -> &'static str {
        "image"
    }

    fn extract(&self, path: &Path, _tag: CapabilityTag, budget: &Budget) -> ExtractionResult {
        let read = match read_hashed(path, HEADER_KEEP_BYTES, budget) {
            Ok(read) => read,
            Err(failure) => return ExtractionResult::HardFailure(failure),
        };

        let extraction = Extraction::new().with_content_hash(read.hash.clone());

        match read_header(&read.bytes) {
            Ok(info) => ExtractionResult::Success(
                extraction
                    .with_field("format", info.format)
                    .with_field("width", info.width)
                    .with_field("height", info.height),
            ),
            Err(reason) => ExtractionResult::PartialFailure(
                extraction,
                Failure::new(FailureKind::Corrupt, reason),
            ),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ImageInfo {
    format: &'static str,
    width: u32,
    height: u32,
}

/// Guess the format from magic bytes and read the dimensions from its header.
fn read_header(bytes: &[u8]) -> Result<ImageInfo, String> {
    let reader = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| format!("failed to read image header: {e}"))?;
    let Some(format) = reader.format() else {
        return Err("unrecognized image format".to_string());
    };
    let (width, height) = reader
        .into_dimensions()
        .map_err(|e| format!("unreadable {} header: {e}", format_name(format)))?;

    Ok(ImageInfo {
        format: format_name(format),
        width,
        height,
    })
}

fn format_name(format: ImageFormat) -> &'static str {
    match format {
        ImageFormat::Png => "png",
        ImageFormat::Gif => "gif",
        ImageFormat::Bmp => "bmp",
        ImageFormat::Jpeg => "jpeg",
        ImageFormat::WebP => "webp",
        other => other.extensions_str().first().copied().unwrap_or("unknown"),
    }
}
