//! Interfaces the build core consumes from its surroundings
//!
//! The core never touches the disk, parses JavaScript, or runs module code on
//! its own. Those jobs belong to the implementations of the traits below, which
//! a [`BuildSession`](crate::session::BuildSession) owns for its lifetime.

use std::{fmt, io};

use indexmap::IndexMap;

use crate::{config::BuildConfig, error::ParseError};

/// Raw source access
pub trait FileSystem {
    fn read_file(&self, url: &str) -> io::Result<String>;

    fn exists(&self, path: &str) -> bool;
}

/// Phase in which conditional pragmas are being stripped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum PragmaPhase {
    /// Source is about to be evaluated by the build
    OnExecute,
}

/// Options forwarded to the static extractor
#[derive(Debug, Clone, Copy)]
pub struct ExtractOptions<'a> {
    /// Emit a `needsDefine` marker for sources that never call `define`
    pub insert_define: bool,
    /// Feature flags known at build time
    pub has: &'a IndexMap<String, bool>,
    /// Also collect `require` calls nested inside functions
    pub find_nested: bool,
}

/// Source processing that happens before evaluation
pub trait SourceProcessor {
    /// Remove build-only conditional blocks
    fn strip_conditionals(
        &self,
        url: &str,
        text: &str,
        config: &BuildConfig,
        phase: PragmaPhase,
    ) -> anyhow::Result<String>;

    /// Reduce a source to the declarations needed to discover its dependencies
    fn static_extract(
        &self,
        module_name: &str,
        url: &str,
        text: &str,
        options: ExtractOptions<'_>,
    ) -> Result<String, ParseError>;

    /// Whether the source already embeds a module system bootstrap
    fn detects_bootstrap(&self, url: &str, text: &str) -> Result<bool, ParseError>;
}

/// How module contents are handed to the evaluator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecMode {
    /// Contents are extractor output; only declarations are observed
    Static,
    /// Contents are the real source and must actually run
    Full,
}

/// A module declaration observed while evaluating contents
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Definition {
    /// Explicit id, `None` for an anonymous declaration
    pub name: Option<String>,
    /// Dependency identifiers as written in the source
    pub deps: Vec<String>,
    /// The declaration was synthesized because the source never declared itself
    pub needs_define: bool,
}

impl Definition {
    pub fn named(name: impl Into<String>, deps: Vec<String>) -> Self {
        Self {
            name: Some(name.into()),
            deps,
            needs_define: false,
        }
    }

    pub fn anonymous(deps: Vec<String>) -> Self {
        Self {
            name: None,
            deps,
            needs_define: false,
        }
    }
}

/// Opaque result of running a module factory at build time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact(String);

impl Artifact {
    pub fn new(payload: impl Into<String>) -> Self {
        Self(payload.into())
    }

    pub fn payload(&self) -> &str {
        &self.0
    }
}

/// Sandboxed execution of module code
pub trait Evaluator {
    /// Run `contents` and report every declaration it made
    fn evaluate(
        &mut self,
        module_name: &str,
        url: &str,
        contents: &str,
        mode: ExecMode,
    ) -> anyhow::Result<Vec<Definition>>;

    /// Invoke the factory of a fully executed module
    fn execute(&mut self, id: &str, deps: &[String]) -> anyhow::Result<Artifact>;

    /// Ask a fully executed loader plugin to load `resource`, returning the
    /// module ids the resource depends on
    fn load_resource(&mut self, plugin_id: &str, resource: &str) -> anyhow::Result<Vec<String>>;
}

type TranslateFn = dyn Fn(&str, &str) -> anyhow::Result<String>;
type ReadFilterFn = dyn Fn(&str, &str, &str) -> anyhow::Result<String>;

/// Optional transforms applied to raw source right after it is read
#[derive(Default)]
pub struct ReadHooks {
    translate: Option<Box<TranslateFn>>,
    on_read: Option<Box<ReadFilterFn>>,
}

impl ReadHooks {
    /// Convert foreign module formats, called with `(url, text)`
    #[must_use]
    pub fn with_translate(
        mut self,
        hook: impl Fn(&str, &str) -> anyhow::Result<String> + 'static,
    ) -> Self {
        self.translate = Some(Box::new(hook));
        self
    }

    /// User read filter, called with `(module_name, url, text)`
    #[must_use]
    pub fn with_on_read(
        mut self,
        hook: impl Fn(&str, &str, &str) -> anyhow::Result<String> + 'static,
    ) -> Self {
        self.on_read = Some(Box::new(hook));
        self
    }

    pub(crate) fn apply(&self, module_name: &str, url: &str, text: String) -> anyhow::Result<String> {
        let text = match &self.translate {
            Some(translate) => translate(url, &text)?,
            None => text,
        };
        match &self.on_read {
            Some(on_read) => on_read(module_name, url, &text),
            None => Ok(text),
        }
    }
}

impl fmt::Debug for ReadHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReadHooks")
            .field("translate", &self.translate.is_some())
            .field("on_read", &self.on_read.is_some())
            .finish()
    }
}
