//! The build engine: entry BFS, worker-pool transforms, CAS writes.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use tokio::fs;
use tracing::{info, warn};

use ionify_core::{ContentHash, ModuleId, ModuleKind, VersionHash};
use ionify_graph::GraphStore;
use ionify_resolver::{scan_imports, Resolver};
use ionify_store::ContentStore;
use ionify_transform::{TransformJob, WorkerPool};

use crate::error::BuildError;
use crate::plan::{fallback_entries, BuildPlan, PlannedModule};

/// Orchestrates one production build over shared core services.
pub struct BuildEngine {
    version: VersionHash,
    graph: Arc<GraphStore>,
    resolver: Arc<Resolver>,
    cas: ContentStore,
    pool: Arc<WorkerPool>,
}

struct DiscoveredModule {
    id: ModuleId,
    hash: ContentHash,
    kind: ModuleKind,
    static_deps: Vec<ModuleId>,
    dynamic_deps: Vec<ModuleId>,
    source: Option<String>,
}

impl BuildEngine {
    pub fn new(
        version: VersionHash,
        graph: Arc<GraphStore>,
        resolver: Arc<Resolver>,
        cas: ContentStore,
        pool: Arc<WorkerPool>,
    ) -> Self {
        Self {
            version,
            graph,
            resolver,
            cas,
            pool,
        }
    }

    /// Run a full build from the given entries.
    ///
    /// An empty entry list falls back to graph orphans (and from there
    /// to the first module in deterministic order). Discovery is BFS:
    /// cycles terminate through the visited set, and a specifier that
    /// has already been queued is not resolved again.
    pub async fn build(&self, entries: &[PathBuf]) -> Result<BuildPlan, BuildError> {
        let started = Instant::now();

        let entry_ids: Vec<ModuleId> = if entries.is_empty() {
            fallback_entries(&self.graph)?
        } else {
            entries.iter().map(|p| ModuleId::new(p.clone())).collect()
        };

        for (entry, given) in entry_ids.iter().zip(entries.iter()) {
            if !given.as_path().is_file() {
                return Err(BuildError::EntryNotFound(entry.path().to_path_buf()));
            }
        }

        let discovered = self.discover(&entry_ids).await?;
        let transformed = self.transform(&discovered).await?;

        let plan = BuildPlan {
            version: self.version.clone(),
            entries: entry_ids,
            modules: transformed,
        };

        info!(
            modules = plan.modules.len(),
            entries = plan.entries.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "build graph complete"
        );
        Ok(plan)
    }

    /// BFS from the entry set, recording every module in the graph.
    async fn discover(&self, entries: &[ModuleId]) -> Result<Vec<DiscoveredModule>, BuildError> {
        let mut queue: VecDeque<ModuleId> = entries.iter().cloned().collect();
        let mut seen: Vec<String> = entries.iter().map(|e| e.as_key()).collect();
        let mut discovered = Vec::new();

        while let Some(id) = queue.pop_front() {
            let module = match self.load_module(&id).await {
                Ok(module) => module,
                Err(BuildError::Io { path, source }) => {
                    // A dep that vanished mid-build is skipped, not fatal.
                    warn!("skipping unreadable module {}: {}", path.display(), source);
                    continue;
                }
                Err(other) => return Err(other),
            };

            self.graph.record(
                &module.id,
                module.hash,
                &module.static_deps,
                &module.dynamic_deps,
                module.kind,
                mtime_ms(id.path()),
            )?;

            for dep in module.static_deps.iter().chain(module.dynamic_deps.iter()) {
                let key = dep.as_key();
                if !seen.contains(&key) {
                    seen.push(key);
                    queue.push_back(dep.clone());
                }
            }

            discovered.push(module);
        }

        Ok(discovered)
    }

    async fn load_module(&self, id: &ModuleId) -> Result<DiscoveredModule, BuildError> {
        let path = id.path().to_path_buf();
        let bytes = fs::read(&path).await.map_err(|source| BuildError::Io {
            path: path.clone(),
            source,
        })?;
        let hash = ContentHash::of(&bytes);
        let kind = ModuleKind::infer(id);

        let (static_deps, dynamic_deps, source) = match kind {
            ModuleKind::Js => {
                let text = String::from_utf8_lossy(&bytes).into_owned();
                let imports = scan_imports(&text);
                let static_deps = self.resolve_all(&imports.static_specifiers, &path);
                let dynamic_deps = self.resolve_all(&imports.dynamic_specifiers, &path);
                (static_deps, dynamic_deps, Some(text))
            }
            ModuleKind::Css | ModuleKind::CssModule | ModuleKind::Json => {
                let text = String::from_utf8_lossy(&bytes).into_owned();
                (Vec::new(), Vec::new(), Some(text))
            }
            ModuleKind::Asset => (Vec::new(), Vec::new(), None),
        };

        Ok(DiscoveredModule {
            id: id.clone(),
            hash,
            kind,
            static_deps,
            dynamic_deps,
            source,
        })
    }

    /// Resolve specifiers, tolerating misses (warn and skip): the build
    /// treats externals and unresolvable imports alike as out of graph.
    fn resolve_all(&self, specifiers: &[String], importer: &Path) -> Vec<ModuleId> {
        let mut deps = Vec::new();
        for specifier in specifiers {
            let (spec_path, query) = match specifier.split_once('?') {
                Some((p, q)) => (p, Some(q)),
                None => (specifier.as_str(), None),
            };
            match self.resolver.resolve(spec_path, importer) {
                Some(resolved) => {
                    let dep = match query {
                        Some(q) => ModuleId::with_query(resolved, q),
                        None => ModuleId::new(resolved),
                    };
                    if !deps.contains(&dep) {
                        deps.push(dep);
                    }
                }
                None => {
                    warn!(
                        "unresolved import '{}' from {} (left external)",
                        specifier,
                        importer.display()
                    );
                }
            }
        }
        deps
    }

    /// Transform every JS/CSS module through the worker pool and write
    /// artifacts into the CAS. Transform failures abort the build.
    async fn transform(
        &self,
        discovered: &[DiscoveredModule],
    ) -> Result<Vec<PlannedModule>, BuildError> {
        let mut jobs = Vec::new();
        let mut job_indices = Vec::new();
        for (index, module) in discovered.iter().enumerate() {
            let Some(source) = &module.source else {
                continue;
            };
            if matches!(module.kind, ModuleKind::Json | ModuleKind::Asset) {
                continue;
            }
            jobs.push(TransformJob {
                id: module.id.as_key(),
                path: module.id.path().to_path_buf(),
                ext: module.id.extension().unwrap_or_default(),
                code: source.clone(),
                module_hash: Some(module.hash),
            });
            job_indices.push(index);
        }

        let results = self.pool.run_many(jobs).await?;

        let mut artifact_dirs: Vec<Option<PathBuf>> = vec![None; discovered.len()];
        for (result, &index) in results.into_iter().zip(job_indices.iter()) {
            let module = &discovered[index];
            let output = result.map_err(|message| BuildError::Transform {
                module: module.id.to_string(),
                message,
            })?;

            let artifact = format!("transformed.{}", output.output_type);
            if let Err(e) =
                self.cas
                    .write(&self.version, &module.hash, &artifact, output.code.as_bytes())
            {
                warn!("cas write failed for {}: {}", module.id, e);
            } else {
                if let Some(map) = &output.map {
                    if let Err(e) = self.cas.write(
                        &self.version,
                        &module.hash,
                        &format!("{}.map", artifact),
                        map.as_bytes(),
                    ) {
                        warn!("cas map write failed for {}: {}", module.id, e);
                    }
                }
                artifact_dirs[index] = Some(self.cas.path_for(&self.version, &module.hash));
            }
        }

        Ok(discovered
            .iter()
            .enumerate()
            .map(|(index, module)| PlannedModule {
                id: module.id.clone(),
                hash: module.hash,
                kind: module.kind,
                static_deps: module.static_deps.clone(),
                dynamic_deps: module.dynamic_deps.clone(),
                artifact_dir: artifact_dirs[index].take(),
            })
            .collect())
    }
}

fn mtime_ms(path: &Path) -> Option<u64> {
    std::fs::metadata(path)
        .and_then(|m| m.modified())
        .ok()
        .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
        .map(|d| d.as_millis() as u64)
}
