//! Per-layer build state
//!
//! A layer is one bundling pass producing one combined output. Everything the
//! output assembler needs to know about the pass is collected here, most
//! importantly [`LayerState::build_file_paths`], the order in which module
//! files finished resolving.

use std::hash::BuildHasherDefault;

use indexmap::{IndexMap, IndexSet};
use log::info;
use rustc_hash::{FxHashSet, FxHasher};

type FxIndexMap<K, V> = IndexMap<K, V, BuildHasherDefault<FxHasher>>;
type FxIndexSet<T> = IndexSet<T, BuildHasherDefault<FxHasher>>;

/// URL scheme used for modules that must be left out of the build
pub const EMPTY_SCHEME: &str = "empty:";

/// Whether `url` can be inlined into a build
///
/// Network locations, query strings and `empty:` mappings cannot. Windows
/// drive letters contain a colon, so only `://` counts as a protocol.
pub fn is_supported_build_url(url: &str) -> bool {
    !url.contains("://")
        && !url.contains('?')
        && !url.starts_with(EMPTY_SCHEME)
        && !url.starts_with("//")
}

#[derive(Debug, Default)]
pub struct LayerState {
    build_path_map: FxIndexMap<String, String>,
    build_file_to_module: FxIndexMap<String, String>,
    build_file_paths: Vec<String>,
    path_added: FxHashSet<String>,
    modules_with_names: FxIndexSet<String>,
    needs_define: FxIndexSet<String>,
    ignored_urls: FxIndexSet<String>,
    existing_require_url: Option<String>,
}

impl LayerState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Like [`is_supported_build_url`], logging each rejected URL once
    pub fn is_supported_url(&mut self, url: &str) -> bool {
        if is_supported_build_url(url) {
            return true;
        }
        self.record_ignored(url);
        false
    }

    /// Returns true, and logs, only the first time `url` is ignored
    fn record_ignored(&mut self, url: &str) -> bool {
        if !self.ignored_urls.insert(url.to_owned()) {
            return false;
        }
        info!("Cannot optimize network URL, skipping: {url}");
        true
    }

    /// Remember where `module_name` was loaded from
    pub fn record_path(&mut self, module_name: &str, url: &str) {
        if let Some(previous) = self
            .build_path_map
            .insert(module_name.to_owned(), url.to_owned())
        {
            if previous != url
                && self.build_file_to_module.get(&previous).map(String::as_str) == Some(module_name)
            {
                self.build_file_to_module.shift_remove(&previous);
            }
        }
        self.build_file_to_module
            .insert(url.to_owned(), module_name.to_owned());
    }

    /// Plugin resources have no file of their own, so the id is its own path
    pub fn add_plugin_resource(&mut self, id: &str) -> bool {
        if !self.path_added.insert(id.to_owned()) {
            return false;
        }
        self.build_file_paths.push(id.to_owned());
        self.build_path_map.insert(id.to_owned(), id.to_owned());
        self.build_file_to_module
            .insert(id.to_owned(), id.to_owned());
        self.modules_with_names.insert(id.to_owned());
        true
    }

    /// Append `url` for `id` if the module was actually loaded by this layer
    pub fn add_loaded_path(&mut self, id: &str, url: &str) -> bool {
        if !self.build_path_map.contains_key(id) || self.path_added.contains(url) {
            return false;
        }
        self.path_added.insert(url.to_owned());
        self.build_file_paths.push(url.to_owned());
        true
    }

    pub fn mark_needs_define(&mut self, module_name: &str) {
        self.needs_define.insert(module_name.to_owned());
    }

    /// Note that `module_name` declared itself, unless its declaration is synthesized
    pub fn note_named_module(&mut self, module_name: &str) {
        if !self.needs_define.contains(module_name) {
            self.modules_with_names.insert(module_name.to_owned());
        }
    }

    /// The first URL found to embed a module system bootstrap wins
    pub fn record_existing_require(&mut self, url: &str) -> bool {
        if self.existing_require_url.is_some() {
            return false;
        }
        self.existing_require_url = Some(url.to_owned());
        true
    }

    pub fn build_path_map(&self) -> &FxIndexMap<String, String> {
        &self.build_path_map
    }

    pub fn build_file_to_module(&self) -> &FxIndexMap<String, String> {
        &self.build_file_to_module
    }

    /// Files and plugin resources in first-resolved order
    pub fn build_file_paths(&self) -> &[String] {
        &self.build_file_paths
    }

    pub fn modules_with_names(&self) -> &FxIndexSet<String> {
        &self.modules_with_names
    }

    pub fn needs_define(&self) -> &FxIndexSet<String> {
        &self.needs_define
    }

    pub fn ignored_urls(&self) -> &FxIndexSet<String> {
        &self.ignored_urls
    }

    pub fn existing_require_url(&self) -> Option<&str> {
        self.existing_require_url.as_deref()
    }
}
