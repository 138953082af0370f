//! Graph node representation.

use serde::{Deserialize, Serialize};

use ionify_core::{ContentHash, ModuleId, ModuleKind, VersionHash};

/// One module in the dependency graph.
///
/// Persisted with bincode inside the graph database. `content_hash` is
/// `None` until the module's bytes have been read at least once;
/// `config_hash` records the version the node was last recorded under,
/// and a node whose `config_hash` disagrees with the current version is
/// treated as missing everywhere.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleNode {
    pub id: ModuleId,
    pub content_hash: Option<ContentHash>,
    pub kind: ModuleKind,
    /// Insertion-ordered, duplicate-free.
    pub static_deps: Vec<ModuleId>,
    /// Insertion-ordered, duplicate-free.
    pub dynamic_deps: Vec<ModuleId>,
    pub config_hash: Option<VersionHash>,
    /// Informational only; never participates in change detection.
    pub mtime_ms: Option<u64>,
}

impl ModuleNode {
    /// Static deps followed by dynamic deps not already present.
    pub fn all_deps(&self) -> Vec<ModuleId> {
        let mut deps = self.static_deps.clone();
        for dep in &self.dynamic_deps {
            if !deps.contains(dep) {
                deps.push(dep.clone());
            }
        }
        deps
    }

    /// Whether `other` appears in either dep set.
    pub fn depends_on(&self, other: &ModuleId) -> bool {
        self.static_deps.contains(other) || self.dynamic_deps.contains(other)
    }
}

/// Deduplicate while preserving first-occurrence order.
pub(crate) fn dedup_ordered(deps: &[ModuleId]) -> Vec<ModuleId> {
    let mut out = Vec::with_capacity(deps.len());
    for dep in deps {
        if !out.contains(dep) {
            out.push(dep.clone());
        }
    }
    out
}
