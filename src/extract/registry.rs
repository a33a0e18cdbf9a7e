//! Capability registry keyed by tag.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use super::{CapabilityTag, Extractor, ImageExtractor, TextExtractor};

/// Maps capability tags to extractors.
///
/// Built once before a run and shared read-only by every worker.
#[derive(Clone, Default)]
pub struct ExtractorRegistry {
    extractors: HashMap<CapabilityTag, Arc<dyn Extractor>>,
}

impl ExtractorRegistry {
    /// An empty registry; every file is skipped as unsupported.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in text and image extractors.
    #[must_use]
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(CapabilityTag::Text, Arc::new(TextExtractor));
        registry.register(CapabilityTag::Image, Arc::new(ImageExtractor));
        registry
    }

    /// Register an extractor for a tag, replacing any previous one.
    pub fn register(&mut self, tag: CapabilityTag, extractor: Arc<dyn Extractor>) {
        if let Some(old) = self.extractors.insert(tag, extractor) {
            tracing::debug!(tag = %tag, replaced = old.name(), "Replaced extractor");
        }
    }

    #[must_use]
    pub fn get(&self, tag: CapabilityTag) -> Option<&Arc<dyn Extractor>> {
        self.extractors.get(&tag)
    }

    /// Registered tags, sorted.
    #[must_use]
    pub fn tags(&self) -> Vec<CapabilityTag> {
        let mut tags: Vec<_> = self.extractors.keys().copied().collect();
        tags.sort_unstable();
        tags
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.extractors.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.extractors.is_empty()
    }
}

impl fmt::Debug for ExtractorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for tag in self.tags() {
            if let Some(extractor) = self.extractors.get(&tag) {
                map.entry(&tag, &extractor.name());
            }
        }
        map.finish()
    }
}
