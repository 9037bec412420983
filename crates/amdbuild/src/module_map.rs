//! Module identifiers and their resolved view
//!
//! An id is either a plain module name (`app/util`) or a loader plugin
//! reference (`text!app/tpl.html`). Relative names (`./x`, `../x`) are
//! normalized against the id of the module that referenced them.

use once_cell::sync::Lazy;
use regex::Regex;

/// Ids matching this name a file directly instead of going through `base_url`
static EXPLICIT_FILE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^/|:|\?|\.js$").expect("explicit file pattern is valid"));

/// Whether `name` names a file directly (absolute path, protocol, query or `.js`)
pub fn has_explicit_extension(name: &str) -> bool {
    EXPLICIT_FILE_RE.is_match(name)
}

/// Resolved view of a module id within one resolution context
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleMap {
    /// Normalized id, including the plugin prefix if any
    pub id: String,
    /// Name as originally written
    pub name: String,
    pub prefix: Option<String>,
    pub resource: Option<String>,
    /// Location of the module source; plugin references have none
    pub url: Option<String>,
    pub parent_id: Option<String>,
    /// Created for a `define` dependency rather than a top level request
    pub is_define: bool,
}

impl ModuleMap {
    pub fn is_plugin_resource(&self) -> bool {
        self.prefix.is_some()
    }
}

/// Split `prefix!resource`; names without `!` have no prefix
pub fn split_prefix(name: &str) -> (Option<&str>, &str) {
    match name.split_once('!') {
        Some((prefix, resource)) => (Some(prefix), resource),
        None => (None, name),
    }
}

/// Resolve `name` against the id of the module that referenced it
///
/// Only names starting with `.` are relative. They resolve against the
/// directory part of `base`; `..` segments past the root are kept so the
/// resulting URL still points somewhere sensible.
pub fn normalize(name: &str, base: Option<&str>) -> String {
    let relative = name.starts_with('.');
    let mut segments: Vec<&str> = match base {
        Some(base) if relative => {
            let mut parts: Vec<&str> = base.split('/').collect();
            parts.pop();
            parts
        }
        _ => Vec::new(),
    };

    for part in name.split('/') {
        match part {
            "." => {}
            ".." if segments.last().is_some_and(|last| *last != "..") => {
                segments.pop();
            }
            _ => segments.push(part),
        }
    }

    segments.join("/")
}
