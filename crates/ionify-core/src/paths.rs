//! Mapping between absolute filesystem paths and public dev-server URLs.
//!
//! Paths inside the project root map to `/`-rooted relative URLs. Paths
//! outside the root (linked packages, monorepo siblings) are carried as
//! `/__ionify_module/<base64url>` so they survive URL transport. The
//! encoding is a compatibility device only; `decode_public_path` always
//! normalizes and compares against the root before trusting a URL.

use std::path::{Component, Path, PathBuf};

use base64::prelude::{Engine as _, BASE64_URL_SAFE_NO_PAD};
use path_clean::PathClean;

/// Reserved URL prefix for modules that live outside the project root.
pub const MODULE_PREFIX: &str = "__ionify_module";

/// Errors from URL decoding.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum PathMapError {
    /// The URL's normalized resolution escapes the project root.
    #[error("path '{0}' resolves outside the project root")]
    OutsideRoot(String),

    /// The `__ionify_module` payload is not valid base64url.
    #[error("malformed module path encoding: {0}")]
    MalformedEncoding(String),
}

/// Map an absolute path to its public URL.
///
/// Inside `root` the URL is `/` + the relative path with `/` separators;
/// outside it is `/__ionify_module/<base64url(abs_path)>`.
pub fn public_path_for(root: &Path, abs_path: &Path) -> String {
    let abs_path = abs_path.to_path_buf().clean();
    match abs_path.strip_prefix(root) {
        Ok(rel) => {
            let mut url = String::from("/");
            let parts: Vec<String> = rel
                .components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect();
            url.push_str(&parts.join("/"));
            url
        }
        Err(_) => {
            let encoded =
                BASE64_URL_SAFE_NO_PAD.encode(abs_path.to_string_lossy().as_bytes());
            format!("/{}/{}", MODULE_PREFIX, encoded)
        }
    }
}

/// Decode a public URL back to an absolute path.
///
/// Rejects URLs whose normalized resolution escapes `root` unless they
/// carry the module prefix, and rejects malformed base64url payloads.
pub fn decode_public_path(root: &Path, url: &str) -> Result<PathBuf, PathMapError> {
    let trimmed = url.trim_start_matches('/');

    if let Some(encoded) = trimmed
        .strip_prefix(MODULE_PREFIX)
        .and_then(|rest| rest.strip_prefix('/'))
    {
        let bytes = BASE64_URL_SAFE_NO_PAD
            .decode(encoded)
            .map_err(|e| PathMapError::MalformedEncoding(e.to_string()))?;
        let text = String::from_utf8(bytes)
            .map_err(|e| PathMapError::MalformedEncoding(e.to_string()))?;
        return Ok(PathBuf::from(text).clean());
    }

    // Reject any component that could climb out before joining.
    let candidate = PathBuf::from(trimmed);
    if candidate
        .components()
        .any(|c| matches!(c, Component::ParentDir))
    {
        return Err(PathMapError::OutsideRoot(url.to_string()));
    }

    let resolved = root.join(candidate).clean();
    if !resolved.starts_with(root) {
        return Err(PathMapError::OutsideRoot(url.to_string()));
    }
    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inside_root_round_trip() {
        let root = Path::new("/project");
        let path = Path::new("/project/src/index.ts");

        let url = public_path_for(root, path);
        assert_eq!(url, "/src/index.ts");
        assert_eq!(decode_public_path(root, &url).unwrap(), path);
    }

    #[test]
    fn test_outside_root_round_trip() {
        let root = Path::new("/project");
        let path = Path::new("/other/lib/util.js");

        let url = public_path_for(root, path);
        assert!(url.starts_with(&format!("/{}/", MODULE_PREFIX)));
        assert_eq!(decode_public_path(root, &url).unwrap(), path);
    }

    #[test]
    fn test_traversal_rejected() {
        let root = Path::new("/project");
        let err = decode_public_path(root, "/../etc/passwd").unwrap_err();
        assert!(matches!(err, PathMapError::OutsideRoot(_)));

        let err = decode_public_path(root, "/src/../../etc/passwd").unwrap_err();
        assert!(matches!(err, PathMapError::OutsideRoot(_)));
    }

    #[test]
    fn test_malformed_encoding_rejected() {
        let root = Path::new("/project");
        let url = format!("/{}/not%base64!", MODULE_PREFIX);
        let err = decode_public_path(root, &url).unwrap_err();
        assert!(matches!(err, PathMapError::MalformedEncoding(_)));
    }

    #[test]
    fn test_dot_segments_normalized_inside_root() {
        let root = Path::new("/project");
        assert_eq!(
            decode_public_path(root, "/src/./index.ts").unwrap(),
            Path::new("/project/src/index.ts")
        );
    }
}
