//! Build configuration loaded from TOML

use std::path::Path;

use anyhow::{Context, Result};
use indexmap::IndexMap;
use serde::Deserialize;

use crate::shim::ShimConfig;

/// One bundling pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LayerConfig {
    pub name: String,
    /// Module ids resolved to seed the layer, in order
    #[serde(default)]
    pub include: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BuildConfig {
    /// Directory module ids are resolved against
    pub base_url: String,
    /// Output directory; URLs of ids with an explicit extension are made relative to it
    pub dir: Option<String>,
    /// Used instead of `dir` when it is not set
    pub dir_base_url: Option<String>,
    /// Id prefix to path mappings; the longest matching prefix wins
    pub paths: IndexMap<String, String>,
    /// Feature flags handed to static extraction
    pub has: IndexMap<String, bool>,
    /// Pragma flags used when stripping `//>>` conditional blocks
    pub pragmas: IndexMap<String, bool>,
    /// Dependencies and exports of scripts that do not call `define`
    pub shim: IndexMap<String, ShimConfig>,
    pub find_nested_dependencies: bool,
    /// Wrap sources that never call `define` as CommonJS modules
    pub cjs_translate: bool,
    /// How often one module may be discarded for full execution per layer
    pub max_reloads_per_module: u32,
    pub layers: Vec<LayerConfig>,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            base_url: "./".to_owned(),
            dir: None,
            dir_base_url: None,
            paths: IndexMap::new(),
            has: IndexMap::new(),
            pragmas: IndexMap::new(),
            shim: IndexMap::new(),
            find_nested_dependencies: false,
            cjs_translate: false,
            max_reloads_per_module: 1,
            layers: Vec::new(),
        }
    }
}

impl BuildConfig {
    pub fn from_toml_str(source: &str) -> Result<Self> {
        let mut config: Self = toml::from_str(source).context("Invalid build configuration")?;
        if !config.base_url.is_empty() && !config.base_url.ends_with('/') {
            config.base_url.push('/');
        }
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let source = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_toml_str(&source)
            .with_context(|| format!("Failed to load config file {}", path.display()))
    }

    /// Prefix applied to URLs of module ids that name a file directly
    pub fn output_base(&self) -> &str {
        self.dir
            .as_deref()
            .or(self.dir_base_url.as_deref())
            .unwrap_or("")
    }
}
