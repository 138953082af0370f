//! Timestamped LRU for transformed code.
//!
//! Eviction removes the oldest `len - limit` entries by last-access
//! stamp in one pass, rather than evicting on every insert.

use rustc_hash::FxHashMap;

struct Entry<V> {
    value: V,
    last_access: u64,
}

pub struct TimestampLru<V> {
    map: FxHashMap<String, Entry<V>>,
    tick: u64,
    limit: usize,
}

impl<V> TimestampLru<V> {
    pub fn new(limit: usize) -> Self {
        Self {
            map: FxHashMap::default(),
            tick: 0,
            limit: limit.max(1),
        }
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Look up and refresh the access stamp.
    pub fn get(&mut self, key: &str) -> Option<&V> {
        self.tick += 1;
        let tick = self.tick;
        self.map.get_mut(key).map(|entry| {
            entry.last_access = tick;
            &entry.value
        })
    }

    /// Insert, then evict down to the limit if needed.
    pub fn insert(&mut self, key: String, value: V) {
        self.tick += 1;
        self.map.insert(
            key,
            Entry {
                value,
                last_access: self.tick,
            },
        );
        self.evict_excess();
    }

    fn evict_excess(&mut self) {
        if self.map.len() <= self.limit {
            return;
        }
        let excess = self.map.len() - self.limit;
        let mut stamps: Vec<(u64, String)> = self
            .map
            .iter()
            .map(|(k, e)| (e.last_access, k.clone()))
            .collect();
        stamps.sort();
        for (_, key) in stamps.into_iter().take(excess) {
            self.map.remove(&key);
        }
    }
}
