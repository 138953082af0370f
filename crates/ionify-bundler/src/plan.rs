//! The build plan handed to the external planner/emitter.

use std::path::PathBuf;

use ionify_core::{ContentHash, ModuleId, ModuleKind, VersionHash};
use ionify_graph::GraphStore;

use crate::error::BuildError;

/// One module as the planner sees it.
#[derive(Debug, Clone)]
pub struct PlannedModule {
    pub id: ModuleId,
    pub hash: ContentHash,
    pub kind: ModuleKind,
    pub static_deps: Vec<ModuleId>,
    pub dynamic_deps: Vec<ModuleId>,
    /// CAS directory holding this module's artifacts, when the module
    /// went through the transform stage.
    pub artifact_dir: Option<PathBuf>,
}

/// Everything the external chunk planner consumes: the version
/// namespace, the resolved entry set, and the transformed module set in
/// discovery order.
#[derive(Debug, Clone)]
pub struct BuildPlan {
    pub version: VersionHash,
    pub entries: Vec<ModuleId>,
    pub modules: Vec<PlannedModule>,
}

impl BuildPlan {
    pub fn module(&self, id: &ModuleId) -> Option<&PlannedModule> {
        self.modules.iter().find(|m| &m.id == id)
    }
}

/// Entry fallback for an empty entry list: graph orphans (nodes with no
/// dependents) in sorted order; if the graph has nodes but no orphans,
/// the first module by sorted order.
pub fn fallback_entries(graph: &GraphStore) -> Result<Vec<ModuleId>, BuildError> {
    let mut nodes = graph.snapshot()?;
    nodes.sort_by_key(|n| n.id.as_key());

    let mut orphans = Vec::new();
    for node in &nodes {
        if graph.dependents(&node.id)?.is_empty() {
            orphans.push(node.id.clone());
        }
    }

    if !orphans.is_empty() {
        return Ok(orphans);
    }
    Ok(nodes.first().map(|n| vec![n.id.clone()]).unwrap_or_default())
}
