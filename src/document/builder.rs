//! Normalizes extraction output into documents.

use std::collections::{BTreeMap, BTreeSet};

use serde_json::Value;

use super::models::{now_unix, Document, FieldValue, IdKind, Status};
use crate::extract::{Extraction, ExtractionResult, Outcome};
use crate::walker::{EntryKey, ScanEntry};

/// Tag added when text was cut to the length limit.
pub const TRUNCATED_TAG: &str = "truncated";

/// Builds [`Document`]s from dispatch outcomes.
#[derive(Debug, Clone, Copy)]
pub struct DocumentBuilder {
    max_text_len: usize,
}

impl DocumentBuilder {
    #[must_use]
    pub const fn new(max_text_len: usize) -> Self {
        Self { max_text_len }
    }

    /// Assemble the document for an entry.
    #[must_use]
    pub fn build(&self, entry: &ScanEntry, key: EntryKey, outcome: Outcome) -> Document {
        let path = entry.path.to_string_lossy().into_owned();
        let mut tags = BTreeSet::new();
        let mut error = None;

        let (status, extraction) = match outcome.result {
            ExtractionResult::Success(e) => (Status::Indexed, Some(e)),
            ExtractionResult::PartialFailure(e, failure) => {
                tags.insert(format!("warning:{}", failure.kind));
                error = Some(failure.to_string());
                (Status::Indexed, Some(e))
            }
            ExtractionResult::Skipped(reason) => {
                tags.insert(format!("skipped:{}", reason.as_str()));
                (Status::Skipped, None)
            }
            ExtractionResult::HardFailure(failure) => {
                error = Some(failure.to_string());
                (Status::Errored, None)
            }
        };

        if let Some(c) = &outcome.classification {
            tags.insert(format!("type:{}", c.tag));
        }

        let Extraction {
            fields,
            text,
            thumbnail,
            content_hash,
            mime,
        } = extraction.unwrap_or_default();

        let text = text.map(|t| {
            let (t, truncated) = truncate_text(t, self.max_text_len);
            if truncated {
                tags.insert(TRUNCATED_TAG.to_owned());
            }
            t
        });

        let (id, id_kind) = content_hash.map_or_else(
            || (path_id(&path), IdKind::Path),
            |hash| (hash, IdKind::Content),
        );

        Document {
            id,
            id_kind,
            key,
            size: entry.size,
            mtime: entry.mtime,
            kind: entry.kind,
            mime: mime.or_else(|| outcome.classification.as_ref().map(|c| c.mime.clone())),
            capability: outcome.classification.as_ref().map(|c| c.tag),
            fields: coerce_fields(fields),
            text,
            tags,
            thumbnail,
            status,
            error,
            indexed_at: now_unix(),
            path,
        }
    }
}

/// Identifier for documents without a content hash.
#[must_use]
pub fn path_id(path: &str) -> String {
    blake3::hash(format!("path:{path}").as_bytes())
        .to_hex()
        .to_string()
}

/// Cut `text` to at most `max` bytes without splitting a character.
fn truncate_text(mut text: String, max: usize) -> (String, bool) {
    if text.len() <= max {
        return (text, false);
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    text.truncate(end);
    (text, true)
}

fn coerce_fields(raw: BTreeMap<String, Value>) -> BTreeMap<String, FieldValue> {
    raw.into_iter()
        .filter_map(|(name, value)| coerce(value).map(|v| (name, v)))
        .collect()
}

/// Convert a raw JSON value. Nulls are dropped.
fn coerce(value: Value) -> Option<FieldValue> {
    match value {
        Value::Null => None,
        Value::Bool(b) => Some(FieldValue::Bool(b)),
        Value::Number(n) => Some(
            n.as_i64()
                .map(FieldValue::Int)
                .or_else(|| n.as_f64().map(FieldValue::Float))
                .unwrap_or_else(|| FieldValue::Text(n.to_string())),
        ),
        Value::String(s) => Some(FieldValue::Text(s)),
        Value::Array(items) => Some(FieldValue::List(items.into_iter().filter_map(coerce).collect())),
        obj @ Value::Object(_) => Some(FieldValue::Text(obj.to_string())),
    }
}
