//! Loading a single module's contents
//!
//! Raw source goes through the read hooks, pragma stripping, bootstrap
//! detection, plugin builder substitution and, for modules that do not need
//! full execution, static extraction. The result is cached per URL and handed
//! to the evaluator in the matching [`ExecMode`].

use log::{debug, trace};

use crate::{
    collaborators::{ExecMode, ExtractOptions, PragmaPhase},
    error::{BuildError, BuildResult, ErrorKind},
    layer::EMPTY_SCHEME,
    scan::find_plugin_builder,
    session::BuildSession,
};

impl BuildSession {
    /// Load `module_name` from `url` and signal its completion
    pub fn on_module_load(&mut self, module_name: &str, url: &str) -> BuildResult<()> {
        // every module mapped to `empty:` has to be visited on its own
        if url.starts_with(EMPTY_SCHEME) {
            self.context.clear_fetched(url);
        }

        if !self.layer.is_supported_url(url) {
            return self.complete_load(module_name);
        }

        let url = self.normalize_url_with_base(module_name, url);
        self.layer.record_path(module_name, &url);

        if self.plugins.is_plugin(module_name) {
            self.classifier.mark_needs_full_exec(module_name);
        }

        self.load_contents(module_name, &url)
            .and_then(|()| {
                self.complete_load(module_name)
                    .map_err(|err| err.push_module(module_name))
            })
            .map_err(|err| err.with_file_name(&url))
    }

    fn load_contents(&mut self, module_name: &str, url: &str) -> BuildResult<()> {
        let full = self.classifier.needs_full_exec(module_name);
        let reusable = !full || self.classifier.is_fully_executed(module_name);

        let cached = if reusable {
            self.cache.get(url).map(str::to_owned)
        } else {
            None
        };
        let contents = match cached {
            Some(cached) => {
                trace!("Using cached contents of {url}");
                cached
            }
            None => {
                let contents = self.process_source(module_name, url)?;
                self.cache.insert(url, contents.clone());
                contents
            }
        };

        if contents.is_empty() {
            return Ok(());
        }

        let mode = if full { ExecMode::Full } else { ExecMode::Static };
        let definitions = self
            .io
            .evaluator
            .evaluate(module_name, url, &contents, mode)
            .map_err(|source| ErrorKind::Evaluation {
                module: module_name.to_owned(),
                source,
            })?;
        self.context.queue_definitions(definitions);
        Ok(())
    }

    fn process_source(&mut self, module_name: &str, url: &str) -> BuildResult<String> {
        debug!("Reading {module_name} from {url}");
        let raw = self.read_file(url)?;
        let contents = self
            .io
            .hooks
            .apply(module_name, url, raw)
            .map_err(ErrorKind::Hook)?;
        let mut contents = self
            .io
            .processor
            .strip_conditionals(url, &contents, self.config(), PragmaPhase::OnExecute)
            .map_err(ErrorKind::Hook)?;

        if self.layer.existing_require_url().is_none()
            && self
                .io
                .processor
                .detects_bootstrap(url, &contents)
                .map_err(|err| BuildError::parse(url, err))?
        {
            debug!("{url} already contains a module loader");
            self.layer.record_existing_require(url);
        }

        if self.plugins.is_plugin(module_name) {
            if let Some(builder) = find_plugin_builder(&contents) {
                contents = self.read_plugin_builder(module_name, &builder)?;
            }
        }

        if !self.classifier.needs_full_exec(module_name) {
            let options = ExtractOptions {
                insert_define: true,
                has: &self.config().has,
                find_nested: self.config().find_nested_dependencies,
            };
            contents = self
                .io
                .processor
                .static_extract(module_name, url, &contents, options)
                .map_err(|err| BuildError::parse(url, err))?;
        }

        Ok(contents)
    }

    /// Raw source of the build extension a plugin points at
    fn read_plugin_builder(&mut self, plugin_id: &str, builder: &str) -> BuildResult<String> {
        let plugin_map = self.context.make_module_map(plugin_id, None, false);
        let builder_map = self.context.make_module_map(builder, Some(&plugin_map), true);
        self.plugins.record_builder(plugin_id, &builder_map.id);
        let builder_url = self.context.name_to_url(&builder_map.id);
        self.read_file(&builder_url)
    }
}
