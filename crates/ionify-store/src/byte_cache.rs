//! Opaque keyed byte cache (loader-level).
//!
//! A flat `<root>/cache/<key>` tree predating the versioned CAS, kept
//! for loaders that cache derived bytes under their own keys. Keys are
//! content-addressed to filenames, so callers may use arbitrary
//! strings.

use std::io;
use std::path::PathBuf;

use tracing::warn;

use ionify_core::hash;

use crate::CasError;

/// Loader-facing byte cache. Misses and unreadable entries both read
/// as `None`; writes are best-effort from the caller's point of view.
#[derive(Debug, Clone)]
pub struct ByteCache {
    root: PathBuf,
}

impl ByteCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(hash::to_hex(&hash::hash_bytes(key.as_bytes())))
    }

    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        match std::fs::read(self.path_for(key)) {
            Ok(bytes) => Some(bytes),
            Err(e) if e.kind() == io::ErrorKind::NotFound => None,
            Err(e) => {
                warn!("byte cache read failed for '{}': {}", key, e);
                None
            }
        }
    }

    pub fn put(&self, key: &str, bytes: &[u8]) -> Result<(), CasError> {
        std::fs::create_dir_all(&self.root).map_err(|e| CasError::Io {
            path: self.root.clone(),
            source: e,
        })?;
        let path = self.path_for(key);
        let tmp = path.with_extension(format!("tmp.{}", std::process::id()));
        std::fs::write(&tmp, bytes).map_err(|e| CasError::Io {
            path: tmp.clone(),
            source: e,
        })?;
        std::fs::rename(&tmp, &path).map_err(|e| CasError::Io { path, source: e })
    }

    pub fn remove(&self, key: &str) {
        let _ = std::fs::remove_file(self.path_for(key));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_put_get_remove() {
        let dir = TempDir::new().unwrap();
        let cache = ByteCache::new(dir.path().join("cache"));

        assert!(cache.get("loader:sass:a").is_none());
        cache.put("loader:sass:a", b"compiled").unwrap();
        assert_eq!(cache.get("loader:sass:a").unwrap(), b"compiled");

        cache.remove("loader:sass:a");
        assert!(cache.get("loader:sass:a").is_none());
    }

    #[test]
    fn test_arbitrary_keys() {
        let dir = TempDir::new().unwrap();
        let cache = ByteCache::new(dir.path().join("cache"));

        let key = "weird/key: with spaces and ../dots";
        cache.put(key, b"ok").unwrap();
        assert_eq!(cache.get(key).unwrap(), b"ok");
    }
}
