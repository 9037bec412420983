//! Error types raised while resolving and loading modules
//!
//! Every fatal failure is a [`BuildError`]: an [`ErrorKind`] plus the file the
//! failure was attributed to and the chain of modules whose completion was in
//! progress when it surfaced. The chain is accumulated while the error unwinds
//! through nested module loads, so a single value describes the whole
//! resolution path.

use std::fmt;

use thiserror::Error;

/// Result type used throughout the build core
pub type BuildResult<T> = Result<T, BuildError>;

/// Failure reported by a static extractor or bootstrap detector
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ParseError {
    pub message: String,
}

impl ParseError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// What went wrong
#[derive(Debug, Error)]
pub enum ErrorKind {
    /// Source could not be parsed for dependency extraction
    #[error("Parse error for file: {url}\n{source}")]
    Parse {
        url: String,
        #[source]
        source: ParseError,
    },

    /// The raw file could not be read
    #[error("Unable to read {url}")]
    Read {
        url: String,
        #[source]
        source: std::io::Error,
    },

    /// A user supplied transform hook failed; its error is passed through as-is
    #[error(transparent)]
    Hook(anyhow::Error),

    /// The evaluator rejected module contents or a factory call
    #[error("Evaluation of {module} failed")]
    Evaluation {
        module: String,
        #[source]
        source: anyhow::Error,
    },

    /// A module kept being invalidated for full execution
    #[error("Module {id} was reloaded {reloads} times in one layer, refusing to reload it again")]
    ReloadCycle { id: String, reloads: u32 },

    /// A plugin resource was requested while its plugin was still resolving
    #[error("Loader plugin {plugin} is not ready to load {resource}")]
    PluginNotReady { plugin: String, resource: String },
}

/// Fatal error for the current layer
#[derive(Debug)]
pub struct BuildError {
    kind: ErrorKind,
    file_name: Option<String>,
    module_trail: Vec<String>,
}

impl BuildError {
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            file_name: None,
            module_trail: Vec::new(),
        }
    }

    pub fn kind(&self) -> &ErrorKind {
        &self.kind
    }

    /// The file the error was attributed to, if any
    pub fn file_name(&self) -> Option<&str> {
        self.file_name.as_deref()
    }

    /// Modules whose completion failed, innermost first
    pub fn module_trail(&self) -> &[String] {
        &self.module_trail
    }

    /// Attach `url` unless an inner load already attributed the error
    #[must_use]
    pub fn with_file_name(mut self, url: &str) -> Self {
        if self.file_name.is_none() {
            self.file_name = Some(url.to_owned());
        }
        self
    }

    /// Record that completing `module_name` failed because of this error
    #[must_use]
    pub fn push_module(mut self, module_name: &str) -> Self {
        self.module_trail.push(module_name.to_owned());
        self
    }

    pub(crate) fn parse(url: &str, source: ParseError) -> Self {
        ErrorKind::Parse {
            url: url.to_owned(),
            source,
        }
        .into()
    }
}

impl From<ErrorKind> for BuildError {
    fn from(kind: ErrorKind) -> Self {
        Self::new(kind)
    }
}

impl fmt::Display for BuildError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;
        if !self.module_trail.is_empty() {
            write!(f, "\nIn module tree:")?;
            for (depth, module) in self.module_trail.iter().rev().enumerate() {
                write!(f, "\n{:indent$}{module}", "", indent = 4 + depth * 2)?;
            }
        }
        Ok(())
    }
}

impl std::error::Error for BuildError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        std::error::Error::source(&self.kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_name_keeps_innermost_url() {
        let err = BuildError::parse("lib/b.js", ParseError::new("unexpected token"))
            .with_file_name("lib/b.js")
            .with_file_name("main.js");
        assert_eq!(err.file_name(), Some("lib/b.js"));
    }

    #[test]
    fn test_module_trail_renders_outermost_first() {
        let err = BuildError::parse("c.js", ParseError::new("bad"))
            .push_module("c")
            .push_module("b")
            .push_module("main");
        assert_eq!(err.module_trail(), ["c", "b", "main"]);
        assert_eq!(
            err.to_string(),
            "Parse error for file: c.js\nbad\nIn module tree:\n    main\n      b\n        c"
        );
    }

    #[test]
    fn test_hook_errors_are_not_rewrapped() {
        let err = BuildError::from(ErrorKind::Hook(anyhow::anyhow!("filter exploded")));
        assert_eq!(err.to_string(), "filter exploded");
    }
}
