//! The previous run's documents, keyed for reuse lookups.

use std::collections::HashMap;
use std::path::Path;

use super::reader::IndexReader;
use crate::document::Document;
use crate::walker::EntryKey;
use crate::Result;

/// Read-only map from entry key to the previous run's document.
#[derive(Debug, Clone, Default)]
pub struct PreviousSnapshot {
    docs: HashMap<EntryKey, Document>,
}

impl PreviousSnapshot {
    /// An empty snapshot; every entry is rescanned.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Load the committed documents of an index file.
    ///
    /// Works on interrupted runs too.
    ///
    /// # Errors
    ///
    /// Returns an error if the index cannot be opened or read.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let reader = IndexReader::open(path)?;
        if reader.summary()?.is_none() {
            tracing::warn!(path = %path.display(), "Previous index was not finalized, using committed documents");
        }
        let snapshot = Self::from_documents(reader.documents()?);
        tracing::info!(path = %path.display(), documents = snapshot.len(), "Loaded previous index");
        Ok(snapshot)
    }

    #[must_use]
    pub fn from_documents(docs: impl IntoIterator<Item = Document>) -> Self {
        Self {
            docs: docs.into_iter().map(|d| (d.key.clone(), d)).collect(),
        }
    }

    #[must_use]
    pub fn get(&self, key: &EntryKey) -> Option<&Document> {
        self.docs.get(key)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.docs.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{IdKind, Status};
    use crate::pipeline::RunStateSnapshot;
    use crate::storage::IndexWriter;
    use crate::walker::EntryKind;
    use std::collections::{BTreeMap, BTreeSet};
    use std::time::Duration;
    use tempfile::TempDir;
    use uuid::Uuid;

    fn doc(key: &str) -> Document {
        Document {
            id: key.into(),
            id_kind: IdKind::Content,
            key: EntryKey::new(key),
            path: key.into(),
            size: 0,
            mtime: 0,
            kind: EntryKind::File,
            mime: None,
            capability: None,
            fields: BTreeMap::new(),
            text: None,
            tags: BTreeSet::new(),
            thumbnail: None,
            status: Status::Indexed,
            error: None,
            indexed_at: 0,
        }
    }

    #[test]
    fn test_load_finalized_index() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("prev.db");
        let writer = IndexWriter::create(&path, Uuid::new_v4(), &[], false).unwrap();
        writer.append(&doc("a")).unwrap();
        writer.append(&doc("b")).unwrap();
        writer
            .finalize(&RunStateSnapshot::default(), Duration::ZERO)
            .unwrap();
        drop(writer);

        let snapshot = PreviousSnapshot::load(&path).unwrap();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot.get(&EntryKey::new("a")).unwrap().id, "a");
        assert!(snapshot.get(&EntryKey::new("c")).is_none());
    }

    #[test]
    fn test_empty() {
        assert!(PreviousSnapshot::empty().is_empty());
        let snapshot = PreviousSnapshot::from_documents([doc("x")]);
        assert!(!snapshot.is_empty());
    }
}
