//! The output of one reindexing resolution.

use ahash::AHashSet;
use entwine_model::DocumentKey;

/// The set of (type, identifier) pairs whose documents must be re-derived
/// after one mutation.
///
/// Insertion order is preserved and the same key never appears twice, no
/// matter how many traversal branches reach it.
#[derive(Debug, Default)]
pub struct ReindexingResolution {
    ordered: Vec<DocumentKey>,
    seen: AHashSet<DocumentKey>,
}

impl ReindexingResolution {
    pub fn new() -> ReindexingResolution {
        ReindexingResolution::default()
    }

    /// Adds a key, returning `true` if it was not present yet.
    pub fn insert(&mut self, key: DocumentKey) -> bool {
        if self.seen.insert(key.clone()) {
            self.ordered.push(key);
            true
        } else {
            false
        }
    }

    pub fn contains(&self, key: &DocumentKey) -> bool {
        self.seen.contains(key)
    }

    pub fn len(&self) -> usize {
        self.ordered.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ordered.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &DocumentKey> {
        self.ordered.iter()
    }

    pub fn into_keys(self) -> Vec<DocumentKey> {
        self.ordered
    }
}
