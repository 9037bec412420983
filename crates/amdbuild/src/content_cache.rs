//! Processed source cache shared by every layer of a build

use std::hash::BuildHasherDefault;

use indexmap::IndexMap;
use rustc_hash::FxHasher;

type FxIndexMap<K, V> = IndexMap<K, V, BuildHasherDefault<FxHasher>>;

/// URL to fully processed source text
///
/// Entries are never evicted. Whether an entry may be used is decided by the
/// loader, which bypasses it for modules still waiting on full execution and
/// overwrites it with the reprocessed text.
#[derive(Debug, Default)]
pub struct ContentCache {
    entries: FxIndexMap<String, String>,
}

impl ContentCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, url: &str) -> Option<&str> {
        self.entries.get(url).map(String::as_str)
    }

    pub fn contains(&self, url: &str) -> bool {
        self.entries.contains_key(url)
    }

    /// Store the processed text for `url`, replacing any previous entry
    pub fn insert(&mut self, url: &str, contents: String) {
        self.entries.insert(url.to_owned(), contents);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
