//! Known loader plugins and their build extensions

use std::hash::BuildHasherDefault;

use indexmap::IndexMap;
use log::debug;
use rustc_hash::FxHasher;

type FxIndexMap<K, V> = IndexMap<K, V, BuildHasherDefault<FxHasher>>;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PluginRecord {
    /// Id of the module whose source replaced the plugin's at build time
    pub builder: Option<String>,
}

#[derive(Debug, Default)]
pub struct PluginRegistry {
    plugins: FxIndexMap<String, PluginRecord>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true the first time `plugin_id` is seen
    pub fn register(&mut self, plugin_id: &str) -> bool {
        if self.plugins.contains_key(plugin_id) {
            return false;
        }
        debug!("Registered loader plugin {plugin_id}");
        self.plugins
            .insert(plugin_id.to_owned(), PluginRecord::default());
        true
    }

    pub fn is_plugin(&self, id: &str) -> bool {
        self.plugins.contains_key(id)
    }

    pub fn record_builder(&mut self, plugin_id: &str, builder_id: &str) {
        debug!("Plugin {plugin_id} builds with {builder_id}");
        self.plugins.entry(plugin_id.to_owned()).or_default().builder =
            Some(builder_id.to_owned());
    }

    pub fn builder_of(&self, plugin_id: &str) -> Option<&str> {
        self.plugins
            .get(plugin_id)
            .and_then(|record| record.builder.as_deref())
    }

    pub fn get(&self, plugin_id: &str) -> Option<&PluginRecord> {
        self.plugins.get(plugin_id)
    }

    pub fn plugin_ids(&self) -> impl Iterator<Item = &str> {
        self.plugins.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_and_builder() {
        let mut registry = PluginRegistry::new();
        assert!(registry.register("text"));
        assert!(!registry.register("text"));
        assert!(registry.is_plugin("text"));
        assert!(!registry.is_plugin("json"));
        assert_eq!(registry.builder_of("text"), None);

        registry.record_builder("text", "textBuilder");
        assert_eq!(registry.builder_of("text"), Some("textBuilder"));
        assert_eq!(
            registry.get("text"),
            Some(&PluginRecord {
                builder: Some("textBuilder".to_owned())
            })
        );
        assert_eq!(registry.plugin_ids().collect::<Vec<_>>(), ["text"]);
    }
}
