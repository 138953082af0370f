//! Module identity and digest newtypes.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::hash::{self, Hash256};

/// Identity of a source module: an absolute filesystem path plus an
/// optional query suffix (`?inline`, `?module`, ...).
///
/// Equality and hashing cover path *and* query, so `app.css` and
/// `app.css?inline` are distinct modules with distinct graph nodes and
/// cache entries.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ModuleId {
    path: PathBuf,
    query: Option<String>,
}

impl ModuleId {
    /// Create an id from an absolute path with no query.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            query: None,
        }
    }

    /// Create an id from an absolute path and a query suffix.
    ///
    /// An empty query is normalized to no query.
    pub fn with_query(path: impl Into<PathBuf>, query: impl Into<String>) -> Self {
        let query = query.into();
        Self {
            path: path.into(),
            query: if query.is_empty() { None } else { Some(query) },
        }
    }

    /// Parse `"/abs/path?query"` back into an id.
    pub fn parse(key: &str) -> Self {
        match key.split_once('?') {
            Some((path, query)) => Self::with_query(path, query),
            None => Self::new(key),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn query(&self) -> Option<&str> {
        self.query.as_deref()
    }

    /// Stable string form usable as a database key: `path?query`.
    pub fn as_key(&self) -> String {
        match &self.query {
            Some(q) => format!("{}?{}", self.path.display(), q),
            None => self.path.display().to_string(),
        }
    }

    /// Lowercased extension of the underlying file, if any.
    pub fn extension(&self) -> Option<String> {
        self.path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
    }
}

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_key())
    }
}

/// 32-byte content digest of file bytes or transformed artifact bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentHash(pub Hash256);

impl ContentHash {
    /// Digest a byte slice.
    pub fn of(bytes: &[u8]) -> Self {
        Self(hash::hash_bytes(bytes))
    }

    pub fn as_bytes(&self) -> &Hash256 {
        &self.0
    }

    /// Hex form, used wherever the hash is surfaced (CAS paths, HMR
    /// summaries, headers).
    pub fn to_hex(&self) -> String {
        hash::to_hex(&self.0)
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// First 16 hex characters of the SHA-256 over the canonical
/// configuration. Namespaces every piece of derived on-disk state, so
/// artifacts produced under incompatible configurations never collide.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VersionHash(String);

impl VersionHash {
    /// Length of the hex form.
    pub const LEN: usize = 16;

    /// Truncate a full digest down to the version prefix.
    pub fn from_digest(digest: &Hash256) -> Self {
        Self(hash::to_hex(digest)[..Self::LEN].to_string())
    }

    /// Wrap an already-computed 16-hex-char string (e.g. from the
    /// `IONIFY_CONFIG_HASH` environment variable).
    pub fn from_hex(hex: impl Into<String>) -> Self {
        Self(hex.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VersionHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Coarse classification of a module, derived from its extension unless
/// a loader overrides it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ModuleKind {
    Js,
    Css,
    CssModule,
    Asset,
    Json,
}

impl ModuleKind {
    /// Derive the kind from a module id (extension + query conventions).
    ///
    /// `*.module.css` and `?module` on a CSS path classify as
    /// [`ModuleKind::CssModule`].
    pub fn infer(id: &ModuleId) -> Self {
        let ext = id.extension().unwrap_or_default();
        match ext.as_str() {
            "js" | "jsx" | "ts" | "tsx" | "mjs" | "cjs" | "html" => ModuleKind::Js,
            "json" => ModuleKind::Json,
            "css" => {
                let file_name = id
                    .path()
                    .file_name()
                    .and_then(|n| n.to_str())
                    .unwrap_or_default();
                let is_module = file_name.ends_with(".module.css")
                    || id.query().is_some_and(|q| q.split('&').any(|p| p == "module"));
                if is_module {
                    ModuleKind::CssModule
                } else {
                    ModuleKind::Css
                }
            }
            _ => ModuleKind::Asset,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_module_id_equality_includes_query() {
        let plain = ModuleId::new("/src/app.css");
        let inline = ModuleId::with_query("/src/app.css", "inline");
        assert_ne!(plain, inline);
        assert_eq!(inline, ModuleId::with_query("/src/app.css", "inline"));
    }

    #[test]
    fn test_module_id_key_round_trip() {
        let id = ModuleId::with_query("/src/app.css", "inline");
        assert_eq!(ModuleId::parse(&id.as_key()), id);

        let plain = ModuleId::new("/src/index.ts");
        assert_eq!(ModuleId::parse(&plain.as_key()), plain);
    }

    #[test]
    fn test_module_id_empty_query_normalized() {
        assert_eq!(
            ModuleId::with_query("/a.js", ""),
            ModuleId::new("/a.js")
        );
    }

    #[test]
    fn test_content_hash_hex() {
        let hash = ContentHash::of(b"body { color: red }");
        assert_eq!(hash.to_hex().len(), 64);
        assert_eq!(hash, ContentHash::of(b"body { color: red }"));
    }

    #[test]
    fn test_version_hash_prefix() {
        let digest = crate::hash::hash_bytes(b"config");
        let version = VersionHash::from_digest(&digest);
        assert_eq!(version.as_str().len(), VersionHash::LEN);
        assert!(crate::hash::to_hex(&digest).starts_with(version.as_str()));
    }

    #[test]
    fn test_kind_inference() {
        assert_eq!(ModuleKind::infer(&ModuleId::new("/a/main.tsx")), ModuleKind::Js);
        assert_eq!(ModuleKind::infer(&ModuleId::new("/a/data.json")), ModuleKind::Json);
        assert_eq!(ModuleKind::infer(&ModuleId::new("/a/site.css")), ModuleKind::Css);
        assert_eq!(
            ModuleKind::infer(&ModuleId::new("/a/button.module.css")),
            ModuleKind::CssModule
        );
        assert_eq!(
            ModuleKind::infer(&ModuleId::with_query("/a/site.css", "module")),
            ModuleKind::CssModule
        );
        assert_eq!(ModuleKind::infer(&ModuleId::new("/a/logo.svg")), ModuleKind::Asset);
    }
}
