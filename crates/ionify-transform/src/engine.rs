//! The transform engine: loader chain execution behind a two-level
//! cache (in-memory LRU, then CAS under the current version) with
//! in-flight deduplication.
//!
//! Concurrent requests for the same memo key share one execution; late
//! arrivals await the in-flight result over a watch channel. The LRU
//! and in-flight map live behind one lock whose critical sections never
//! perform I/O.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tokio::sync::watch;
use tracing::{debug, warn};

use ionify_core::{hash, ContentHash, ModuleId, ModuleKind, VersionHash};
use ionify_store::ContentStore;

use crate::error::TransformError;
use crate::loader::{Loader, LoaderContext, LoaderRegistry};
use crate::lru::TimestampLru;

/// A finished transform, cheap to clone out of the cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedTransform {
    pub code: String,
    pub map: Option<String>,
}

/// Everything the engine needs to transform one module.
#[derive(Debug, Clone)]
pub struct TransformInput {
    pub id: ModuleId,
    pub kind: ModuleKind,
    pub module_hash: ContentHash,
    pub source: String,
}

/// Cache counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineStats {
    pub hits: u64,
    pub misses: u64,
    pub size: usize,
}

type SharedResult = Option<Result<CachedTransform, String>>;

struct EngineState {
    lru: TimestampLru<CachedTransform>,
    inflight: FxHashMap<String, watch::Receiver<SharedResult>>,
}

enum Probe {
    Hit(CachedTransform),
    Wait(watch::Receiver<SharedResult>),
    Run(watch::Sender<SharedResult>),
}

/// Memoized, CAS-backed loader chain runner.
pub struct TransformEngine {
    registry: LoaderRegistry,
    version: VersionHash,
    cas: Option<ContentStore>,
    state: Mutex<EngineState>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl TransformEngine {
    /// `cache_limit` is the LRU capacity (default 5000 at the call
    /// sites, overridable via `IONIFY_DEV_TRANSFORM_CACHE_MAX`).
    pub fn new(
        registry: LoaderRegistry,
        version: VersionHash,
        cas: Option<ContentStore>,
        cache_limit: usize,
    ) -> Self {
        Self {
            registry,
            version,
            cas,
            state: Mutex::new(EngineState {
                lru: TimestampLru::new(cache_limit),
                inflight: FxHashMap::default(),
            }),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn stats(&self) -> EngineStats {
        EngineStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            size: self.state.lock().lru.len(),
        }
    }

    /// Run the loader chain for a module, deduplicating concurrent
    /// executions of the same `(module_hash, loader_signature)`.
    pub async fn run(&self, input: &TransformInput) -> Result<CachedTransform, TransformError> {
        let ctx = LoaderContext::new(input.id.clone(), input.kind);
        let chain = self.registry.matching(&ctx);

        if chain.is_empty() {
            // Nothing to do; identity transforms are not worth caching.
            return Ok(CachedTransform {
                code: input.source.clone(),
                map: None,
            });
        }

        let signature = hash::hash_many(chain.iter().map(|l| l.name().as_bytes().to_vec()));
        let memo_key = hash::to_hex(&hash::hash_many([
            input.module_hash.as_bytes().as_slice(),
            signature.as_slice(),
        ]));

        loop {
            match self.probe(&memo_key) {
                Probe::Hit(cached) => {
                    self.hits.fetch_add(1, Ordering::Relaxed);
                    return Ok(cached);
                }
                Probe::Wait(mut rx) => {
                    // The runner publishes exactly one value. A dropped
                    // sender means the runner died; re-probe and take
                    // over.
                    if rx.changed().await.is_err() {
                        continue;
                    }
                    let value = rx.borrow().clone();
                    match value {
                        Some(Ok(cached)) => {
                            self.hits.fetch_add(1, Ordering::Relaxed);
                            return Ok(cached);
                        }
                        Some(Err(message)) => {
                            return Err(TransformError::Failed {
                                module: input.id.to_string(),
                                message,
                            });
                        }
                        None => continue,
                    }
                }
                Probe::Run(tx) => {
                    let outcome = self.execute(input, &ctx, &chain, &memo_key);
                    let shared = match &outcome {
                        Ok(cached) => Ok(cached.clone()),
                        Err(e) => Err(e.to_string()),
                    };
                    {
                        let mut state = self.state.lock();
                        if let Ok(cached) = &shared {
                            state.lru.insert(memo_key.clone(), cached.clone());
                        }
                        state.inflight.remove(&memo_key);
                    }
                    let _ = tx.send(Some(shared));
                    return outcome;
                }
            }
        }
    }

    fn probe(&self, memo_key: &str) -> Probe {
        let mut state = self.state.lock();
        if let Some(cached) = state.lru.get(memo_key) {
            return Probe::Hit(cached.clone());
        }
        if let Some(rx) = state.inflight.get(memo_key) {
            return Probe::Wait(rx.clone());
        }
        let (tx, rx) = watch::channel(None);
        state.inflight.insert(memo_key.to_string(), rx);
        Probe::Run(tx)
    }

    /// Cache-miss path: CAS lookup, then the loader chain.
    fn execute(
        &self,
        input: &TransformInput,
        ctx: &LoaderContext,
        chain: &[Arc<dyn Loader>],
        memo_key: &str,
    ) -> Result<CachedTransform, TransformError> {
        let artifact = artifact_name(ctx);

        if let Some(cas) = &self.cas {
            match cas.read(&self.version, &input.module_hash, artifact) {
                Ok(Some(bytes)) => {
                    let code = String::from_utf8_lossy(&bytes).into_owned();
                    let map = cas
                        .read(&self.version, &input.module_hash, &format!("{}.map", artifact))
                        .ok()
                        .flatten()
                        .map(|b| String::from_utf8_lossy(&b).into_owned());
                    self.hits.fetch_add(1, Ordering::Relaxed);
                    debug!(module = %input.id, memo_key, "transform served from cas");
                    return Ok(CachedTransform { code, map });
                }
                Ok(None) => {}
                Err(e) => warn!("cas read failed for {}: {}", input.id, e),
            }
        }

        self.misses.fetch_add(1, Ordering::Relaxed);

        let mut code = input.source.clone();
        let mut map = None;
        for loader in chain {
            if let Some(output) = loader.transform(ctx, &code)? {
                code = output.code;
                if output.map.is_some() {
                    map = output.map;
                }
            }
        }

        if let Some(cas) = &self.cas {
            // CAS write failures are non-fatal; the in-memory result
            // still serves this process.
            if let Err(e) = cas.write(&self.version, &input.module_hash, artifact, code.as_bytes())
            {
                warn!("cas write failed for {}: {}", input.id, e);
            } else if let Some(map) = &map {
                if let Err(e) = cas.write(
                    &self.version,
                    &input.module_hash,
                    &format!("{}.map", artifact),
                    map.as_bytes(),
                ) {
                    warn!("cas map write failed for {}: {}", input.id, e);
                }
            }
        }

        Ok(CachedTransform { code, map })
    }
}

/// CSS stays CSS on disk; everything else (including CSS modules and
/// inlined CSS, whose transformed form is JS) lands as JS.
fn artifact_name(ctx: &LoaderContext) -> &'static str {
    match ctx.kind {
        ModuleKind::Css if !ctx.has_query_flag("inline") => "transformed.css",
        _ => "transformed.js",
    }
}
