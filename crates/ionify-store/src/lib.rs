//! Version-namespaced content-addressable artifact store.
//!
//! Layout: `<cas_root>/<version_hash>/<module_hash>/<artifact_name>`.
//! Presence of an artifact proves it is the deterministic transform of
//! the module whose content hash names the directory, under the version
//! that names the tree. Reads under one version never observe bytes
//! produced under another, which makes invalidation after a config
//! change free: the new version simply sees an empty directory.

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, warn};

use ionify_core::{ContentHash, VersionHash};

pub mod byte_cache;

pub use byte_cache::ByteCache;

/// CAS errors. Callers treat write failures as non-fatal (warn and
/// continue); the transform result is still served from memory.
#[derive(Debug, Error)]
pub enum CasError {
    #[error("cas io error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl CasError {
    fn io(path: &Path, source: io::Error) -> Self {
        CasError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// On-disk artifact store rooted at `<project>/.ionify/cas`.
#[derive(Debug, Clone)]
pub struct ContentStore {
    root: PathBuf,
}

impl ContentStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding every artifact of one module under one version.
    pub fn path_for(&self, version: &VersionHash, module_hash: &ContentHash) -> PathBuf {
        self.root
            .join(version.as_str())
            .join(module_hash.to_hex())
    }

    /// Whether a named artifact exists.
    pub fn exists(&self, version: &VersionHash, module_hash: &ContentHash, name: &str) -> bool {
        self.path_for(version, module_hash).join(name).is_file()
    }

    /// Write an artifact.
    ///
    /// Creates parent directories and lands the bytes via a `.tmp`
    /// sibling plus atomic rename, so concurrent writers of identical
    /// bytes are safe and readers never observe half-written files.
    /// Overwrite is allowed; the operation is idempotent for equal
    /// bytes.
    pub fn write(
        &self,
        version: &VersionHash,
        module_hash: &ContentHash,
        name: &str,
        bytes: &[u8],
    ) -> Result<(), CasError> {
        let dir = self.path_for(version, module_hash);
        std::fs::create_dir_all(&dir).map_err(|e| CasError::io(&dir, e))?;

        let final_path = dir.join(name);
        let tmp_path = dir.join(format!("{}.tmp.{}", name, std::process::id()));
        std::fs::write(&tmp_path, bytes).map_err(|e| CasError::io(&tmp_path, e))?;
        std::fs::rename(&tmp_path, &final_path).map_err(|e| CasError::io(&final_path, e))?;

        debug!(artifact = %final_path.display(), size = bytes.len(), "cas write");
        Ok(())
    }

    /// Read an artifact, `None` when absent.
    pub fn read(
        &self,
        version: &VersionHash,
        module_hash: &ContentHash,
        name: &str,
    ) -> Result<Option<Vec<u8>>, CasError> {
        let path = self.path_for(version, module_hash).join(name);
        match std::fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(CasError::io(&path, e)),
        }
    }

    /// Delete every version directory other than `keep`.
    ///
    /// Returns the number of version trees removed. Individual removal
    /// failures are logged and skipped; GC is best-effort.
    pub fn gc_versions(&self, keep: &VersionHash) -> Result<usize, CasError> {
        let entries = match std::fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(CasError::io(&self.root, e)),
        };

        let mut removed = 0;
        for entry in entries {
            let entry = entry.map_err(|e| CasError::io(&self.root, e))?;
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }
            let dir_name = entry.file_name();
            if dir_name.to_string_lossy() == keep.as_str() {
                continue;
            }
            match std::fs::remove_dir_all(&path) {
                Ok(()) => removed += 1,
                Err(e) => warn!("cas gc skipped {}: {}", path.display(), e),
            }
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn version(tag: &str) -> VersionHash {
        VersionHash::from_hex(format!("{:0<16}", tag))
    }

    #[test]
    fn test_write_then_read_round_trip() {
        let dir = TempDir::new().unwrap();
        let store = ContentStore::new(dir.path());
        let v = version("a");
        let hash = ContentHash::of(b"source");

        store.write(&v, &hash, "transformed.js", b"export {}").unwrap();
        let bytes = store.read(&v, &hash, "transformed.js").unwrap().unwrap();
        assert_eq!(bytes, b"export {}");
        assert!(store.exists(&v, &hash, "transformed.js"));
    }

    #[test]
    fn test_read_missing_is_none() {
        let dir = TempDir::new().unwrap();
        let store = ContentStore::new(dir.path());
        let result = store
            .read(&version("a"), &ContentHash::of(b"x"), "transformed.js")
            .unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_rewrite_same_bytes_idempotent() {
        let dir = TempDir::new().unwrap();
        let store = ContentStore::new(dir.path());
        let v = version("a");
        let hash = ContentHash::of(b"source");

        store.write(&v, &hash, "transformed.js", b"code").unwrap();
        store.write(&v, &hash, "transformed.js", b"code").unwrap();
        assert_eq!(
            store.read(&v, &hash, "transformed.js").unwrap().unwrap(),
            b"code"
        );
    }

    #[test]
    fn test_versions_isolated() {
        let dir = TempDir::new().unwrap();
        let store = ContentStore::new(dir.path());
        let hash = ContentHash::of(b"source");

        store
            .write(&version("old"), &hash, "transformed.js", b"old bytes")
            .unwrap();

        // The new version sees nothing, the old tree is untouched.
        assert!(store
            .read(&version("new"), &hash, "transformed.js")
            .unwrap()
            .is_none());
        assert!(store.exists(&version("old"), &hash, "transformed.js"));
    }

    #[test]
    fn test_sourcemap_sibling() {
        let dir = TempDir::new().unwrap();
        let store = ContentStore::new(dir.path());
        let v = version("a");
        let hash = ContentHash::of(b"source");

        store.write(&v, &hash, "transformed.js", b"code").unwrap();
        store.write(&v, &hash, "transformed.js.map", b"{}").unwrap();

        assert!(store.exists(&v, &hash, "transformed.js"));
        assert!(store.exists(&v, &hash, "transformed.js.map"));
    }

    #[test]
    fn test_gc_removes_stale_versions_only() {
        let dir = TempDir::new().unwrap();
        let store = ContentStore::new(dir.path());
        let hash = ContentHash::of(b"source");

        store.write(&version("old1"), &hash, "transformed.js", b"1").unwrap();
        store.write(&version("old2"), &hash, "transformed.js", b"2").unwrap();
        store.write(&version("live"), &hash, "transformed.js", b"3").unwrap();

        let removed = store.gc_versions(&version("live")).unwrap();
        assert_eq!(removed, 2);
        assert!(store.exists(&version("live"), &hash, "transformed.js"));
        assert!(!store.exists(&version("old1"), &hash, "transformed.js"));
    }

    #[test]
    fn test_gc_on_missing_root() {
        let dir = TempDir::new().unwrap();
        let store = ContentStore::new(dir.path().join("never-created"));
        assert_eq!(store.gc_versions(&version("a")).unwrap(), 0);
    }
}
