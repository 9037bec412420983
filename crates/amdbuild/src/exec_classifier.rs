//! Static extraction vs. full execution bookkeeping
//!
//! Most modules only need their dependency list, which static extraction
//! provides. Loader plugins, and every module a plugin depends on, have to be
//! run for real because what they contribute to the build is only known once
//! their code executes. The classifier records which ids are in that second
//! group and which of them have actually completed a full execution.

use std::hash::BuildHasherDefault;

use indexmap::IndexSet;
use log::trace;
use rustc_hash::FxHasher;

type FxIndexSet<T> = IndexSet<T, BuildHasherDefault<FxHasher>>;

#[derive(Debug, Default)]
pub struct ExecutionClassifier {
    need_full_exec: FxIndexSet<String>,
    full_exec: FxIndexSet<String>,
}

impl ExecutionClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark_needs_full_exec(&mut self, id: &str) {
        if self.need_full_exec.insert(id.to_owned()) {
            trace!("{id} needs full execution");
        }
    }

    pub fn needs_full_exec(&self, id: &str) -> bool {
        self.need_full_exec.contains(id)
    }

    pub fn is_fully_executed(&self, id: &str) -> bool {
        self.full_exec.contains(id)
    }

    /// A dependency of a fully executed module must be fully executed too,
    /// unless it is already defined. Returns whether `child` was newly marked.
    pub fn propagate(&mut self, parent: &str, child: &str, child_defined: bool) -> bool {
        if child_defined || !self.needs_full_exec(parent) || self.needs_full_exec(child) {
            return false;
        }
        trace!("{child} inherits full execution from {parent}");
        self.need_full_exec.insert(child.to_owned())
    }

    /// Record a finished full execution; ignored for ids that never needed one
    pub fn mark_full_exec_complete(&mut self, id: &str) -> bool {
        if !self.needs_full_exec(id) {
            return false;
        }
        self.full_exec.insert(id.to_owned())
    }

    /// A defined module that still waits on full execution was defined from
    /// statically extracted contents and has to be resolved again.
    pub fn requires_reload(&self, id: &str, defined: bool) -> bool {
        defined && self.needs_full_exec(id) && !self.is_fully_executed(id)
    }

    /// Forget that `id` completed full execution, so the next encounter
    /// executes it again
    pub fn invalidate(&mut self, id: &str) -> bool {
        self.full_exec.shift_remove(id)
    }

    /// Ids needing full execution, in the order they were first marked
    pub fn pending_full_exec(&self) -> impl Iterator<Item = &str> {
        self.need_full_exec
            .iter()
            .filter(|id| !self.full_exec.contains(id.as_str()))
            .map(String::as_str)
    }
}
