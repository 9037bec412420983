//! Dependency tracking and execution classification for AMD layer builds
//!
//! A [`BuildSession`](session::BuildSession) resolves module graphs one layer
//! at a time. For every module it decides whether statically extracted
//! declarations are enough or whether the module has to run at build time,
//! and it records the order in which module files finished resolving so the
//! output of each layer can be assembled deterministically.

pub mod amd_scan;
pub mod collaborators;
pub mod config;
pub mod content_cache;
pub mod context;
pub mod error;
pub mod exec_classifier;
pub mod host;
pub mod layer;
mod loader;
pub mod module_map;
pub mod plugin_registry;
mod resolver;
pub mod scan;
pub mod session;
pub mod shim;
