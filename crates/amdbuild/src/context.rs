//! Module registry of one layer
//!
//! The context owns everything the resolver knows about modules in the
//! current layer: their state, the URLs already fetched, declarations waiting
//! for the module they name, and the stack of modules being resolved. It is
//! replaced wholesale when a new layer starts.

use std::hash::BuildHasherDefault;

use indexmap::IndexMap;
use log::trace;
use rustc_hash::{FxHashMap, FxHashSet, FxHasher};

use crate::{
    collaborators::{Artifact, Definition},
    config::BuildConfig,
    layer::EMPTY_SCHEME,
    module_map::{ModuleMap, has_explicit_extension, normalize, split_prefix},
};

type FxIndexMap<K, V> = IndexMap<K, V, BuildHasherDefault<FxHasher>>;

/// Ids provided by the module system itself
pub const SPECIAL_IDS: [&str; 3] = ["require", "exports", "module"];

/// Lifecycle of a module within a layer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleState {
    /// Its source is being fetched and evaluated
    Loading,
    /// Declaration known from extracted contents, dependencies resolving
    StaticExtracted,
    /// Declaration known from a real execution, dependencies resolving
    FullyExecuted,
    Completed,
    Failed,
}

/// What a completed module contributed to the build
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessedModule {
    StaticDependencies(Vec<String>),
    FullyExecuted(Artifact),
}

#[derive(Debug, Clone)]
pub struct ModuleRecord {
    pub state: ModuleState,
    pub url: Option<String>,
    pub processed: Option<ProcessedModule>,
}

#[derive(Debug)]
pub struct ResolutionContext {
    config: BuildConfig,
    registry: FxIndexMap<String, ModuleRecord>,
    url_fetched: FxHashSet<String>,
    /// Declarations evaluated but not yet claimed by a completing module
    define_queue: Vec<Definition>,
    /// Named declarations for modules that have not been requested yet
    pending_defines: FxIndexMap<String, Definition>,
    reloads: FxHashMap<String, u32>,
    stack: Vec<String>,
}

impl ResolutionContext {
    pub fn new(config: BuildConfig) -> Self {
        Self {
            config,
            registry: FxIndexMap::default(),
            url_fetched: FxHashSet::default(),
            define_queue: Vec::new(),
            pending_defines: FxIndexMap::default(),
            reloads: FxHashMap::default(),
            stack: Vec::new(),
        }
    }

    pub fn config(&self) -> &BuildConfig {
        &self.config
    }

    /// Resolve `name` as referenced from `parent`
    pub fn make_module_map(
        &self,
        name: &str,
        parent: Option<&ModuleMap>,
        is_define: bool,
    ) -> ModuleMap {
        let parent_id = parent.map(|parent| parent.id.as_str());
        let (prefix, resource) = split_prefix(name);

        match prefix {
            Some(prefix) => {
                let prefix = normalize(prefix, parent_id);
                let resource = normalize(resource, parent_id);
                ModuleMap {
                    id: format!("{prefix}!{resource}"),
                    name: name.to_owned(),
                    prefix: Some(prefix),
                    resource: Some(resource),
                    url: None,
                    parent_id: parent_id.map(str::to_owned),
                    is_define,
                }
            }
            None => {
                let id = if has_explicit_extension(name) {
                    name.to_owned()
                } else {
                    normalize(name, parent_id)
                };
                ModuleMap {
                    url: Some(self.name_to_url(&id)),
                    id,
                    name: name.to_owned(),
                    prefix: None,
                    resource: None,
                    parent_id: parent_id.map(str::to_owned),
                    is_define,
                }
            }
        }
    }

    /// Location of the source for a plain module id
    pub fn name_to_url(&self, id: &str) -> String {
        if has_explicit_extension(id) {
            return id.to_owned();
        }

        let segments: Vec<&str> = id.split('/').collect();
        let mut path = id.to_owned();
        for len in (1..=segments.len()).rev() {
            let candidate = segments[..len].join("/");
            if let Some(mapped) = self.config.paths.get(&candidate) {
                if mapped.starts_with(EMPTY_SCHEME) {
                    return EMPTY_SCHEME.to_owned();
                }
                path = std::iter::once(mapped.as_str())
                    .chain(segments[len..].iter().copied())
                    .collect::<Vec<_>>()
                    .join("/");
                break;
            }
        }

        let url = if path.contains('?') {
            path
        } else {
            format!("{path}.js")
        };
        if url.starts_with('/') || url.contains(':') {
            url
        } else {
            format!("{}{url}", self.config.base_url)
        }
    }

    pub fn state(&self, id: &str) -> Option<ModuleState> {
        self.registry.get(id).map(|record| record.state)
    }

    pub fn record(&self, id: &str) -> Option<&ModuleRecord> {
        self.registry.get(id)
    }

    pub fn is_defined(&self, id: &str) -> bool {
        self.state(id) == Some(ModuleState::Completed)
    }

    pub(crate) fn set_state(&mut self, id: &str, state: ModuleState, url: Option<&str>) {
        trace!("{id} -> {state:?}");
        let record = self
            .registry
            .entry(id.to_owned())
            .or_insert_with(|| ModuleRecord {
                state,
                url: None,
                processed: None,
            });
        record.state = state;
        if let Some(url) = url {
            record.url = Some(url.to_owned());
        }
    }

    pub(crate) fn complete(&mut self, id: &str, processed: ProcessedModule) {
        self.set_state(id, ModuleState::Completed, None);
        if let Some(record) = self.registry.get_mut(id) {
            record.processed = Some(processed);
        }
    }

    /// Start fetching `url`; false when another module already fetched it
    pub(crate) fn mark_fetched(&mut self, url: &str) -> bool {
        self.url_fetched.insert(url.to_owned())
    }

    pub(crate) fn clear_fetched(&mut self, url: &str) {
        self.url_fetched.remove(url);
    }

    pub(crate) fn queue_definitions(&mut self, definitions: Vec<Definition>) {
        self.define_queue.extend(definitions);
    }

    /// Claim the declaration for `module_name` from the evaluated contents
    ///
    /// The first anonymous declaration belongs to the module being completed.
    /// Named declarations for other ids are kept until those ids are requested.
    pub(crate) fn take_definition(&mut self, module_name: &str) -> Option<Definition> {
        let mut found = None;
        for definition in std::mem::take(&mut self.define_queue) {
            match &definition.name {
                Some(name) if name != module_name => {
                    if !self.registry.contains_key(name) {
                        self.pending_defines
                            .entry(name.clone())
                            .or_insert(definition);
                    }
                }
                _ if found.is_none() => found = Some(definition),
                _ => trace!("Ignoring repeated declaration for {module_name}"),
            }
        }
        found.or_else(|| self.pending_defines.shift_remove(module_name))
    }

    pub(crate) fn take_pending_definition(&mut self, id: &str) -> Option<Definition> {
        self.pending_defines.shift_remove(id)
    }

    /// Forget `id` so the next request resolves it from scratch
    pub(crate) fn undef(&mut self, id: &str) {
        if let Some(record) = self.registry.shift_remove(id) {
            if let Some(url) = record.url {
                self.url_fetched.remove(&url);
            }
        }
        self.pending_defines.shift_remove(id);
    }

    /// Count a forced reload of `id`, returning the total for this layer
    pub(crate) fn count_reload(&mut self, id: &str) -> u32 {
        let reloads = self.reloads.entry(id.to_owned()).or_insert(0);
        *reloads += 1;
        *reloads
    }

    pub(crate) fn push(&mut self, id: &str) {
        self.stack.push(id.to_owned());
    }

    pub(crate) fn pop(&mut self) {
        self.stack.pop();
    }

    /// Whether `id` is somewhere up the current resolution chain
    pub fn is_resolving(&self, id: &str) -> bool {
        self.stack.iter().any(|entry| entry == id)
    }

    /// Ids currently being resolved, outermost first
    pub fn resolution_stack(&self) -> &[String] {
        &self.stack
    }
}
