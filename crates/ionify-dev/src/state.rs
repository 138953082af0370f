//! Shared dev-server state.
//!
//! All services here are process-wide, thread-safe, and owned by this
//! struct: one shutdown path closes them in order.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use ionify_core::VersionHash;
use ionify_graph::GraphStore;
use ionify_resolver::Resolver;
use ionify_transform::TransformEngine;

use crate::hmr::HmrCoordinator;
use crate::watcher::FileWatcher;

/// Everything a request handler can reach.
pub struct DevState {
    /// Project root; public URLs resolve against it.
    pub root: PathBuf,

    /// Current configuration version.
    pub version: VersionHash,

    pub graph: Arc<GraphStore>,
    pub resolver: Arc<Resolver>,
    pub engine: Arc<TransformEngine>,
    pub watcher: Arc<FileWatcher>,
    pub hmr: Arc<HmrCoordinator>,

    /// Placeholder values substituted into served JS
    /// (`process.env.KEY` / `import.meta.env.KEY`).
    pub env: HashMap<String, String>,
}

pub type SharedState = Arc<DevState>;

impl DevState {
    /// Assemble the full service stack for a project root.
    ///
    /// Derives the version hash, opens the version-scoped graph store
    /// under `.ionify/graph.db`, points the CAS at `.ionify/cas`,
    /// registers the built-in CSS loaders, and starts the watcher.
    /// Returns the shared state plus the watcher's event receiver for
    /// [`crate::dispatch::spawn_change_loop`].
    pub fn bootstrap(
        root: PathBuf,
        config: &ionify_config::EngineConfig,
        options: &ionify_config::TransformOptions,
        env: HashMap<String, String>,
    ) -> Result<(SharedState, tokio::sync::mpsc::Receiver<crate::watcher::WatchEvent>), crate::error::DevError>
    {
        use ionify_store::ContentStore;
        use ionify_transform::{CssInlineLoader, CssModulesLoader, LoaderRegistry};

        let version = ionify_config::compute_version(config);
        ionify_config::env::export_config_hash(&version);

        let ionify_dir = root.join(".ionify");
        let graph = Arc::new(GraphStore::open(&ionify_dir.join("graph.db"), version.clone())?);

        let resolver = Arc::new(Resolver::new(ionify_resolver::ResolverOptions::for_project(
            root.clone(),
        )));

        let cas = ContentStore::new(ionify_dir.join("cas"));

        let mut registry = LoaderRegistry::new();
        registry.add(CssModulesLoader);
        registry.add(CssInlineLoader);
        let engine = Arc::new(TransformEngine::new(
            registry,
            version.clone(),
            Some(cas),
            options.transform_cache_max,
        ));

        let (watcher, watch_rx) = FileWatcher::new(
            crate::watcher::DEFAULT_DEBOUNCE,
            crate::watcher::DEFAULT_POLL_INTERVAL,
        )?;

        let state = Arc::new(DevState {
            root,
            version,
            graph,
            resolver,
            engine,
            watcher: Arc::new(watcher),
            hmr: Arc::new(HmrCoordinator::new()),
            env,
        });
        Ok((state, watch_rx))
    }
}
