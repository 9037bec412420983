//! Build-time factories for shimmed non-AMD scripts

use serde::Deserialize;

/// How a shimmed script exposes its value
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum ShimExports {
    /// Name of the global the script assigns, e.g. `"Backbone"`
    Global(String),
    /// Source of an init function called with the global object as `this`
    Init { init: String },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ShimConfig {
    /// Modules that must be loaded before the script runs
    pub deps: Vec<String>,
    pub exports: Option<ShimExports>,
}

/// Factory source text for a shimmed script
///
/// The text is already in its built form, so the output assembler can emit it
/// as-is instead of stringifying a runtime function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShimFactory(String);

impl ShimFactory {
    pub fn source(&self) -> &str {
        &self.0
    }
}

pub fn make_shim_exports(exports: &ShimExports) -> ShimFactory {
    let body = match exports {
        ShimExports::Global(name) => format!("        return global.{name};\n"),
        ShimExports::Init { init } => format!(
            "        var func = {init};\n        return func.apply(global, arguments);\n"
        ),
    };
    ShimFactory(format!(
        "(function (global) {{\n    return function () {{\n{body}    }}\n}}(this))"
    ))
}
