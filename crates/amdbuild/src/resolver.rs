//! Recursive dependency resolution for one layer
//!
//! Requesting a module enables it: its source is loaded, the declaration it
//! makes is claimed, each dependency is enabled in turn, and finally the
//! module is defined and reported to the layer. Because definition happens
//! after all dependencies are defined, the order in which modules reach
//! [`BuildSession::on_resource_resolved`] is a dependency-first order.
//!
//! A module found on the resolution stack is treated as satisfied, which is
//! how dependency cycles are broken.

use log::{debug, trace};

use crate::{
    collaborators::Definition,
    context::{ModuleState, ProcessedModule, SPECIAL_IDS},
    error::{BuildResult, ErrorKind},
    module_map::ModuleMap,
    session::BuildSession,
};

impl BuildSession {
    /// Resolve the given module ids, in order, into the current layer
    pub fn require<S: AsRef<str>>(&mut self, names: &[S]) -> BuildResult<()> {
        for name in names {
            let map = self.context.make_module_map(name.as_ref(), None, false);
            debug!("Requiring {}", map.id);
            self.enable(&map, None)?;
        }
        Ok(())
    }

    pub(crate) fn enable(&mut self, map: &ModuleMap, parent: Option<&ModuleMap>) -> BuildResult<()> {
        self.on_dependency_enable(map, parent)?;

        let id = map.id.as_str();
        if self.context.is_defined(id) {
            return Ok(());
        }
        if self.context.is_resolving(id) {
            trace!("Dependency cycle reaches {id}, treating it as satisfied");
            return Ok(());
        }

        self.context.push(id);
        let result = match (&map.prefix, &map.resource) {
            (Some(prefix), Some(resource)) => self.call_plugin(map, prefix, resource),
            _ => self.fetch(map),
        };
        self.context.pop();

        if result.is_err() {
            self.context.set_state(id, ModuleState::Failed, None);
        }
        result
    }

    fn fetch(&mut self, map: &ModuleMap) -> BuildResult<()> {
        let id = map.id.as_str();
        if let Some(definition) = self.context.take_pending_definition(id) {
            trace!("{id} was declared by a file loaded earlier");
            return self.init(map, Some(definition));
        }

        let url = map.url.clone().unwrap_or_default();
        if !self.context.mark_fetched(&url) {
            debug!("{url} was already fetched and did not declare {id}");
            return self.init(map, None);
        }

        self.context.set_state(id, ModuleState::Loading, Some(&url));
        self.on_module_load(id, &url)
    }

    /// Claim the declaration evaluated for `module_name` and resolve it
    ///
    /// Sources that never declared anything complete as modules without
    /// dependencies.
    pub(crate) fn complete_load(&mut self, module_name: &str) -> BuildResult<()> {
        let definition = self.context.take_definition(module_name);
        let map = self.context.make_module_map(module_name, None, true);
        self.init(&map, definition)
    }

    fn init(&mut self, map: &ModuleMap, definition: Option<Definition>) -> BuildResult<()> {
        let id = map.id.as_str();
        let declared = definition.is_some();
        let mut definition = definition.unwrap_or_default();
        if let Some(shim) = self.config().shim.get(id) {
            for dep in &shim.deps {
                if !definition.deps.contains(dep) {
                    definition.deps.push(dep.clone());
                }
            }
        }
        if definition.needs_define {
            self.mark_needs_define(id);
        }

        let state = if self.classifier.needs_full_exec(id) {
            ModuleState::FullyExecuted
        } else {
            ModuleState::StaticExtracted
        };
        self.context.set_state(id, state, None);

        let mut deps = Vec::with_capacity(definition.deps.len());
        for dep in &definition.deps {
            if SPECIAL_IDS.contains(&dep.as_str()) {
                continue;
            }
            let dep_map = self.context.make_module_map(dep, Some(map), true);
            self.enable(&dep_map, Some(map))?;
            deps.push(dep_map.id);
        }

        self.define(map, deps, declared)
    }

    fn define(&mut self, map: &ModuleMap, deps: Vec<String>, declared: bool) -> BuildResult<()> {
        let id = map.id.as_str();
        let processed = if self.classifier.needs_full_exec(id) {
            let artifact = self
                .io
                .evaluator
                .execute(id, &deps)
                .map_err(|source| ErrorKind::Evaluation {
                    module: id.to_owned(),
                    source,
                })?;
            ProcessedModule::FullyExecuted(artifact)
        } else {
            ProcessedModule::StaticDependencies(deps)
        };

        if declared {
            self.layer.note_named_module(id);
        }
        self.context.complete(id, processed);
        self.on_resource_resolved(map);
        Ok(())
    }

    /// Resolve `prefix!resource` by running the plugin in full first
    fn call_plugin(&mut self, map: &ModuleMap, prefix: &str, resource: &str) -> BuildResult<()> {
        let plugin_map = self.context.make_module_map(prefix, None, false);
        let plugin_id = plugin_map.id.as_str();
        self.plugins.register(plugin_id);
        self.classifier.mark_needs_full_exec(plugin_id);

        self.enable(&plugin_map, Some(map))?;
        if !self.context.is_defined(plugin_id) {
            return Err(ErrorKind::PluginNotReady {
                plugin: plugin_id.to_owned(),
                resource: resource.to_owned(),
            }
            .into());
        }

        self.context
            .set_state(&map.id, ModuleState::FullyExecuted, None);
        let resource_deps = self
            .io
            .evaluator
            .load_resource(plugin_id, resource)
            .map_err(|source| ErrorKind::Evaluation {
                module: map.id.clone(),
                source,
            })?;

        let mut deps = Vec::with_capacity(resource_deps.len());
        for dep in &resource_deps {
            let dep_map = self.context.make_module_map(dep, Some(map), true);
            self.enable(&dep_map, Some(map))?;
            deps.push(dep_map.id);
        }

        self.define(map, deps, true)
    }
}
