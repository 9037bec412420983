//! Build session: state shared by every layer of one build run

use log::{debug, trace, warn};

use crate::{
    collaborators::{Evaluator, FileSystem, ReadHooks, SourceProcessor},
    config::BuildConfig,
    content_cache::ContentCache,
    context::ResolutionContext,
    error::{BuildResult, ErrorKind},
    exec_classifier::ExecutionClassifier,
    layer::LayerState,
    module_map::{ModuleMap, has_explicit_extension},
    plugin_registry::PluginRegistry,
    shim::{ShimFactory, make_shim_exports},
};

/// External collaborators a session drives
pub struct Collaborators {
    pub file_system: Box<dyn FileSystem>,
    pub processor: Box<dyn SourceProcessor>,
    pub evaluator: Box<dyn Evaluator>,
    pub hooks: ReadHooks,
}

impl Collaborators {
    pub fn new(
        file_system: impl FileSystem + 'static,
        processor: impl SourceProcessor + 'static,
        evaluator: impl Evaluator + 'static,
    ) -> Self {
        Self {
            file_system: Box::new(file_system),
            processor: Box::new(processor),
            evaluator: Box::new(evaluator),
            hooks: ReadHooks::default(),
        }
    }

    #[must_use]
    pub fn with_hooks(mut self, hooks: ReadHooks) -> Self {
        self.hooks = hooks;
        self
    }
}

impl std::fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collaborators")
            .field("hooks", &self.hooks)
            .finish_non_exhaustive()
    }
}

/// Owns the content cache, execution classifier and plugin registry, which
/// survive layer resets, plus the current layer's context and state, which do not.
#[derive(Debug)]
pub struct BuildSession {
    config: BuildConfig,
    pub(crate) io: Collaborators,
    pub(crate) cache: ContentCache,
    pub(crate) classifier: ExecutionClassifier,
    pub(crate) plugins: PluginRegistry,
    pub(crate) context: ResolutionContext,
    pub(crate) layer: LayerState,
}

impl BuildSession {
    pub fn new(config: BuildConfig, io: Collaborators) -> Self {
        Self {
            context: ResolutionContext::new(config.clone()),
            config,
            io,
            cache: ContentCache::new(),
            classifier: ExecutionClassifier::new(),
            plugins: PluginRegistry::new(),
            layer: LayerState::new(),
        }
    }

    /// Start a new layer with an empty context and layer state, returning the
    /// context of the previous layer
    pub fn reset_layer(&mut self) -> ResolutionContext {
        debug!("Starting a new build layer");
        self.layer = LayerState::new();
        std::mem::replace(
            &mut self.context,
            ResolutionContext::new(self.config.clone()),
        )
    }

    pub fn config(&self) -> &BuildConfig {
        &self.config
    }

    pub fn layer(&self) -> &LayerState {
        &self.layer
    }

    pub fn context(&self) -> &ResolutionContext {
        &self.context
    }

    pub fn cache(&self) -> &ContentCache {
        &self.cache
    }

    pub fn classifier(&self) -> &ExecutionClassifier {
        &self.classifier
    }

    /// Hosts that change a module's execution requirements go through here
    pub fn classifier_mut(&mut self) -> &mut ExecutionClassifier {
        &mut self.classifier
    }

    pub fn plugins(&self) -> &PluginRegistry {
        &self.plugins
    }

    /// Whether `url` can be inlined, logging rejected URLs once per layer
    pub fn is_supported_url(&mut self, url: &str) -> bool {
        self.layer.is_supported_url(url)
    }

    /// Raw file access offered to plugins
    pub fn read_file(&self, url: &str) -> BuildResult<String> {
        self.io.file_system.read_file(url).map_err(|source| {
            ErrorKind::Read {
                url: url.to_owned(),
                source,
            }
            .into()
        })
    }

    pub fn file_exists(&self, path: &str) -> bool {
        self.io.file_system.exists(path)
    }

    /// Called for a source that never declares itself
    pub fn mark_needs_define(&mut self, module_name: &str) {
        self.layer.mark_needs_define(module_name);
    }

    /// Built factory for a shimmed script that configures `exports`
    pub fn shim_exports(&self, id: &str) -> Option<ShimFactory> {
        let exports = self.config.shim.get(id)?.exports.as_ref()?;
        Some(make_shim_exports(exports))
    }

    /// Prefix URLs of ids that name a file directly with the output base
    pub(crate) fn normalize_url_with_base(&self, module_name: &str, url: &str) -> String {
        if has_explicit_extension(module_name) {
            format!("{}{url}", self.config.output_base())
        } else {
            url.to_owned()
        }
    }

    /// Runs before `map` is enabled as a dependency of `parent`
    ///
    /// Spreads full execution from parent to child and discards modules that
    /// were defined from extracted contents but now need a real execution.
    pub fn on_dependency_enable(
        &mut self,
        map: &ModuleMap,
        parent: Option<&ModuleMap>,
    ) -> BuildResult<()> {
        let id = map.id.as_str();
        let defined = self.context.is_defined(id);

        if let Some(parent) = parent {
            if defined
                && self.classifier.needs_full_exec(&parent.id)
                && !self.classifier.is_fully_executed(id)
            {
                self.classifier.mark_needs_full_exec(id);
            }
            self.classifier.propagate(&parent.id, id, defined);
        }

        if self.classifier.requires_reload(id, defined) {
            self.reload(id)?;
        }
        Ok(())
    }

    /// Discard `id` from the current layer so it is resolved again
    pub(crate) fn reload(&mut self, id: &str) -> BuildResult<()> {
        let reloads = self.context.count_reload(id);
        if reloads > self.config.max_reloads_per_module {
            return Err(ErrorKind::ReloadCycle {
                id: id.to_owned(),
                reloads: reloads - 1,
            }
            .into());
        }
        warn!("Reloading {id} to run it in full");
        self.context.undef(id);
        Ok(())
    }

    /// Runs whenever a module or plugin resource finished resolving
    pub fn on_resource_resolved(&mut self, map: &ModuleMap) {
        let id = map.id.as_str();
        if self.classifier.needs_full_exec(id) {
            self.classifier.mark_full_exec_complete(id);
        }

        if map.is_plugin_resource() {
            if self.layer.add_plugin_resource(id) {
                trace!("Layer path #{}: {id}", self.layer.build_file_paths().len());
            }
        } else if let Some(url) = map.url.as_deref() {
            if self.layer.is_supported_url(url) {
                let url = self.normalize_url_with_base(id, url);
                if self.layer.add_loaded_path(id, &url) {
                    trace!("Layer path #{}: {url}", self.layer.build_file_paths().len());
                }
            }
        }
    }
}
