//! redb-backed persistent graph store.
//!
//! Nodes and the reverse index live in two tables updated inside one
//! write transaction, so a reader that observes a forward edge always
//! observes the matching reverse entry. Regular commits are non-durable
//! for speed; [`GraphStore::flush`] upgrades everything written so far
//! to durable, and a background thread auto-flushes roughly 250 ms after
//! the last write.

use std::collections::VecDeque;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use redb::{Database, Durability, ReadableTable, TableDefinition};
use rustc_hash::FxHashSet;
use tracing::{debug, warn};

use ionify_core::{ContentHash, ModuleId, ModuleKind, VersionHash};

use crate::error::GraphError;
use crate::node::{dedup_ordered, ModuleNode};

/// Node table: module key -> bincode [`ModuleNode`].
const NODES: TableDefinition<&str, &[u8]> = TableDefinition::new("nodes");

/// Reverse index: module key -> bincode `Vec<String>` of dependent keys.
const REVERSE: TableDefinition<&str, &[u8]> = TableDefinition::new("reverse");

/// Quiet period after the last write before the auto-flush fires.
const AUTO_FLUSH_IDLE: Duration = Duration::from_millis(250);

/// Auto-flush poll tick.
const AUTO_FLUSH_TICK: Duration = Duration::from_millis(50);

struct StoreInner {
    db: Database,
    version: VersionHash,
    dirty: AtomicBool,
    last_write: Mutex<Instant>,
    stop: AtomicBool,
}

impl StoreInner {
    /// Durable empty commit: upgrades all prior buffered commits.
    fn flush(&self) -> Result<(), GraphError> {
        let txn = self.db.begin_write()?;
        txn.commit()?;
        self.dirty.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn mark_dirty(&self) {
        *self.last_write.lock() = Instant::now();
        self.dirty.store(true, Ordering::SeqCst);
    }
}

/// Persistent module/edge database, namespaced by configuration version.
///
/// Thread-safe: readers run concurrently, writers serialize through the
/// underlying database. The store is the sole mutator of module nodes.
pub struct GraphStore {
    inner: Arc<StoreInner>,
    flusher: Mutex<Option<thread::JoinHandle<()>>>,
}

impl GraphStore {
    /// Open (or create) the store under a version-scoped namespace:
    /// `<path>/v<version>/graph.redb`. Different versions never share
    /// trees, so a configuration change starts from an empty graph.
    pub fn open(path: &Path, version: VersionHash) -> Result<Self, GraphError> {
        let dir = path.join(format!("v{}", version));
        std::fs::create_dir_all(&dir)?;

        let db = Database::create(dir.join("graph.redb"))?;

        // Create tables up front so read transactions never miss them.
        let txn = db.begin_write()?;
        {
            let _ = txn.open_table(NODES)?;
            let _ = txn.open_table(REVERSE)?;
        }
        txn.commit()?;

        let inner = Arc::new(StoreInner {
            db,
            version,
            dirty: AtomicBool::new(false),
            last_write: Mutex::new(Instant::now()),
            stop: AtomicBool::new(false),
        });

        let flusher_inner = Arc::clone(&inner);
        let flusher = thread::Builder::new()
            .name("ionify-graph-flush".into())
            .spawn(move || {
                while !flusher_inner.stop.load(Ordering::SeqCst) {
                    thread::sleep(AUTO_FLUSH_TICK);
                    let idle = flusher_inner.last_write.lock().elapsed();
                    if flusher_inner.dirty.load(Ordering::SeqCst) && idle >= AUTO_FLUSH_IDLE {
                        if let Err(e) = flusher_inner.flush() {
                            warn!("graph auto-flush failed: {}", e);
                        }
                    }
                }
            })?;

        Ok(Self {
            inner,
            flusher: Mutex::new(Some(flusher)),
        })
    }

    /// The version this store is namespaced under.
    pub fn version(&self) -> &VersionHash {
        &self.inner.version
    }

    /// Upsert a node and synchronize the reverse index in the same
    /// atomic unit.
    ///
    /// Returns `true` when the node is new, its content hash moved, or
    /// either dep set changed. Kind and mtime updates alone do not count
    /// as changes.
    pub fn record(
        &self,
        id: &ModuleId,
        hash: ContentHash,
        static_deps: &[ModuleId],
        dynamic_deps: &[ModuleId],
        kind: ModuleKind,
        mtime_ms: Option<u64>,
    ) -> Result<bool, GraphError> {
        let static_deps = dedup_ordered(static_deps);
        let dynamic_deps = dedup_ordered(dynamic_deps);
        let key = id.as_key();

        let mut txn = self.inner.db.begin_write()?;
        txn.set_durability(Durability::None);
        let changed;
        {
            let mut nodes = txn.open_table(NODES)?;
            let mut reverse = txn.open_table(REVERSE)?;

            let prev_raw = read_node(&nodes, &key)?;
            // A node recorded under another version is missing for
            // change detection, but its edges still need unlinking.
            let prev_current = prev_raw
                .as_ref()
                .filter(|n| n.config_hash.as_ref() == Some(&self.inner.version));

            changed = match prev_current {
                None => true,
                Some(prev) => {
                    prev.content_hash != Some(hash)
                        || prev.static_deps != static_deps
                        || prev.dynamic_deps != dynamic_deps
                }
            };

            let node = ModuleNode {
                id: id.clone(),
                content_hash: Some(hash),
                kind,
                static_deps,
                dynamic_deps,
                config_hash: Some(self.inner.version.clone()),
                mtime_ms,
            };

            let prev_deps = prev_raw.as_ref().map(|n| n.all_deps()).unwrap_or_default();
            let new_deps = node.all_deps();

            for dep in &new_deps {
                if !prev_deps.contains(dep) {
                    add_reverse_entry(&mut reverse, &dep.as_key(), &key)?;
                }
            }
            for dep in &prev_deps {
                if !new_deps.contains(dep) {
                    remove_reverse_entry(&mut reverse, &dep.as_key(), &key)?;
                }
            }

            let bytes = bincode::serialize(&node)?;
            nodes.insert(key.as_str(), bytes.as_slice())?;
        }
        txn.commit()?;
        self.inner.mark_dirty();

        debug!(module = %id, changed, "graph record");
        Ok(changed)
    }

    /// Fetch a node. Nodes recorded under another version are missing.
    pub fn get(&self, id: &ModuleId) -> Result<Option<ModuleNode>, GraphError> {
        let txn = self.inner.db.begin_read()?;
        let nodes = txn.open_table(NODES)?;
        Ok(read_node(&nodes, &id.as_key())?
            .filter(|n| n.config_hash.as_ref() == Some(&self.inner.version)))
    }

    /// Forward dependencies: static deps followed by dynamic deps.
    pub fn deps(&self, id: &ModuleId) -> Result<Vec<ModuleId>, GraphError> {
        Ok(self.get(id)?.map(|n| n.all_deps()).unwrap_or_default())
    }

    /// Reverse dependencies, answered from the reverse index (never a
    /// scan of the node table).
    pub fn dependents(&self, id: &ModuleId) -> Result<Vec<ModuleId>, GraphError> {
        let txn = self.inner.db.begin_read()?;
        let reverse = txn.open_table(REVERSE)?;
        Ok(read_key_list(&reverse, &id.as_key())?
            .into_iter()
            .map(|k| ModuleId::parse(&k))
            .collect())
    }

    /// Delete a node and prune it from every other node's dep sets,
    /// using the reverse index to find dependents directly.
    pub fn remove(&self, id: &ModuleId) -> Result<(), GraphError> {
        let key = id.as_key();

        let mut txn = self.inner.db.begin_write()?;
        txn.set_durability(Durability::None);
        {
            let mut nodes = txn.open_table(NODES)?;
            let mut reverse = txn.open_table(REVERSE)?;

            if let Some(node) = read_node(&nodes, &key)? {
                for dep in node.all_deps() {
                    remove_reverse_entry(&mut reverse, &dep.as_key(), &key)?;
                }
            }

            for dependent_key in read_key_list(&reverse, &key)? {
                if let Some(mut dependent) = read_node(&nodes, &dependent_key)? {
                    dependent.static_deps.retain(|d| d != id);
                    dependent.dynamic_deps.retain(|d| d != id);
                    let bytes = bincode::serialize(&dependent)?;
                    nodes.insert(dependent_key.as_str(), bytes.as_slice())?;
                }
            }

            reverse.remove(key.as_str())?;
            nodes.remove(key.as_str())?;
        }
        txn.commit()?;
        self.inner.mark_dirty();
        Ok(())
    }

    /// BFS over the reverse index from the seed set.
    ///
    /// The result contains the seeds first (in the given order, deduped)
    /// followed by discovered dependents in BFS order. A visited set
    /// makes cyclic graphs terminate.
    pub fn collect_affected(&self, seeds: &[ModuleId]) -> Result<Vec<ModuleId>, GraphError> {
        let txn = self.inner.db.begin_read()?;
        let reverse = txn.open_table(REVERSE)?;

        let mut visited: FxHashSet<String> = FxHashSet::default();
        let mut out: Vec<ModuleId> = Vec::new();
        let mut queue: VecDeque<String> = VecDeque::new();

        for seed in seeds {
            let key = seed.as_key();
            if visited.insert(key.clone()) {
                out.push(seed.clone());
                queue.push_back(key);
            }
        }

        while let Some(key) = queue.pop_front() {
            for dependent in read_key_list(&reverse, &key)? {
                if visited.insert(dependent.clone()) {
                    out.push(ModuleId::parse(&dependent));
                    queue.push_back(dependent);
                }
            }
        }

        Ok(out)
    }

    /// Full dump of current-version nodes, for analysis and fallback
    /// emitters.
    pub fn snapshot(&self) -> Result<Vec<ModuleNode>, GraphError> {
        let txn = self.inner.db.begin_read()?;
        let nodes = txn.open_table(NODES)?;

        let mut out = Vec::new();
        for entry in nodes.iter()? {
            let (_, value) = entry?;
            let node: ModuleNode = bincode::deserialize(value.value())?;
            if node.config_hash.as_ref() == Some(&self.inner.version) {
                out.push(node);
            }
        }
        Ok(out)
    }

    /// Make every prior write survive a crash.
    pub fn flush(&self) -> Result<(), GraphError> {
        self.inner.flush()
    }
}

impl Drop for GraphStore {
    fn drop(&mut self) {
        self.inner.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.flusher.lock().take() {
            let _ = handle.join();
        }
        if self.inner.dirty.load(Ordering::SeqCst) {
            if let Err(e) = self.inner.flush() {
                warn!("graph flush on close failed: {}", e);
            }
        }
    }
}

fn read_node<T>(table: &T, key: &str) -> Result<Option<ModuleNode>, GraphError>
where
    T: ReadableTable<&'static str, &'static [u8]>,
{
    match table.get(key)? {
        Some(guard) => Ok(Some(bincode::deserialize(guard.value())?)),
        None => Ok(None),
    }
}

fn read_key_list<T>(table: &T, key: &str) -> Result<Vec<String>, GraphError>
where
    T: ReadableTable<&'static str, &'static [u8]>,
{
    match table.get(key)? {
        Some(guard) => Ok(bincode::deserialize(guard.value())?),
        None => Ok(Vec::new()),
    }
}

fn add_reverse_entry(
    table: &mut redb::Table<'_, &'static str, &'static [u8]>,
    key: &str,
    dependent: &str,
) -> Result<(), GraphError> {
    let mut list = read_key_list(table, key)?;
    if !list.iter().any(|k| k == dependent) {
        list.push(dependent.to_string());
        let bytes = bincode::serialize(&list)?;
        table.insert(key, bytes.as_slice())?;
    }
    Ok(())
}

fn remove_reverse_entry(
    table: &mut redb::Table<'_, &'static str, &'static [u8]>,
    key: &str,
    dependent: &str,
) -> Result<(), GraphError> {
    let mut list = read_key_list(table, key)?;
    let before = list.len();
    list.retain(|k| k != dependent);
    if list.len() != before {
        if list.is_empty() {
            table.remove(key)?;
        } else {
            let bytes = bincode::serialize(&list)?;
            table.insert(key, bytes.as_slice())?;
        }
    }
    Ok(())
}
