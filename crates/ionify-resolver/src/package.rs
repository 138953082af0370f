//! `node_modules` package resolution.
//!
//! Walks up from the importer's directory looking for
//! `node_modules/<pkg>`, then resolves inside the package: the
//! `exports` field first (conditions applied in declared order), then
//! the `module`/`main` fields, then `index.<ext>` probing.

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use crate::extensions::{try_extensions, try_index_files};

/// Split a bare specifier into `(package_name, subpath)`.
///
/// Scoped packages keep their first two segments: `@scope/pkg/sub`
/// splits into `@scope/pkg` and `sub`.
pub fn split_package_specifier(specifier: &str) -> (String, Option<String>) {
    let mut segments = specifier.splitn(3, '/');
    if specifier.starts_with('@') {
        let scope = segments.next().unwrap_or_default();
        let name = segments.next();
        match name {
            Some(name) => (
                format!("{}/{}", scope, name),
                segments.next().map(str::to_string),
            ),
            None => (scope.to_string(), None),
        }
    } else {
        let name = segments.next().unwrap_or_default().to_string();
        let rest: Vec<&str> = segments.collect();
        let subpath = if rest.is_empty() {
            None
        } else {
            Some(rest.join("/"))
        };
        (name, subpath)
    }
}

/// Walk ancestor directories of `importer_dir` for
/// `node_modules/<pkg>` and resolve inside the first hit.
pub fn resolve_package(
    specifier: &str,
    importer_dir: &Path,
    extensions: &[String],
    conditions: &[String],
) -> Option<PathBuf> {
    let (pkg_name, subpath) = split_package_specifier(specifier);
    if pkg_name.is_empty() {
        return None;
    }

    for dir in importer_dir.ancestors() {
        let pkg_dir = dir.join("node_modules").join(&pkg_name);
        if pkg_dir.is_dir() {
            return resolve_in_package(&pkg_dir, subpath.as_deref(), extensions, conditions);
        }
    }
    None
}

fn resolve_in_package(
    pkg_dir: &Path,
    subpath: Option<&str>,
    extensions: &[String],
    conditions: &[String],
) -> Option<PathBuf> {
    let manifest = read_manifest(pkg_dir);

    if let Some(manifest) = &manifest {
        if let Some(exports) = manifest.get("exports") {
            let key = match subpath {
                Some(sub) => format!("./{}", sub),
                None => ".".to_string(),
            };
            if let Some(target) = resolve_exports(exports, &key, conditions) {
                let candidate = pkg_dir.join(target.trim_start_matches("./"));
                return try_extensions(&candidate, extensions);
            }
            // An exports field is exhaustive; a miss is a miss.
            debug!(pkg = %pkg_dir.display(), key, "exports field has no matching entry");
            return None;
        }
    }

    if let Some(sub) = subpath {
        let candidate = pkg_dir.join(sub);
        return try_extensions(&candidate, extensions)
            .or_else(|| try_index_files(&candidate, extensions));
    }

    if let Some(manifest) = &manifest {
        for field in ["module", "main"] {
            if let Some(entry) = manifest.get(field).and_then(Value::as_str) {
                let candidate = pkg_dir.join(entry.trim_start_matches("./"));
                if let Some(resolved) = try_extensions(&candidate, extensions)
                    .or_else(|| try_index_files(&candidate, extensions))
                {
                    return Some(resolved);
                }
            }
        }
    }

    try_index_files(pkg_dir, extensions)
}

fn read_manifest(pkg_dir: &Path) -> Option<Value> {
    let raw = std::fs::read_to_string(pkg_dir.join("package.json")).ok()?;
    serde_json::from_str(&raw).ok()
}

/// Resolve an `exports` value against a subpath key.
///
/// Handles the three shapes: a bare string (root export only), a map of
/// subpath keys, and a map of condition keys. Condition keys are tried
/// in declared order, accepting those in `conditions` plus `default`.
fn resolve_exports(exports: &Value, key: &str, conditions: &[String]) -> Option<String> {
    match exports {
        Value::String(target) => {
            if key == "." {
                Some(target.clone())
            } else {
                None
            }
        }
        Value::Object(map) => {
            let is_subpath_map = map.keys().any(|k| k.starts_with('.'));
            if is_subpath_map {
                if let Some(entry) = map.get(key) {
                    return resolve_conditions(entry, conditions);
                }
                // Single-wildcard subpath patterns: "./sub/*" etc.
                for (pattern, entry) in map {
                    if let Some((prefix, suffix)) = pattern.split_once('*') {
                        if key.len() >= prefix.len() + suffix.len()
                            && key.starts_with(prefix)
                            && key.ends_with(suffix)
                        {
                            let captured = &key[prefix.len()..key.len() - suffix.len()];
                            return resolve_conditions(entry, conditions)
                                .map(|t| t.replacen('*', captured, 1));
                        }
                    }
                }
                None
            } else {
                if key != "." {
                    return None;
                }
                resolve_conditions(exports, conditions)
            }
        }
        _ => None,
    }
}

fn resolve_conditions(entry: &Value, conditions: &[String]) -> Option<String> {
    match entry {
        Value::String(target) => Some(target.clone()),
        Value::Object(map) => {
            for (condition, value) in map {
                if condition == "default" || conditions.iter().any(|c| c == condition) {
                    if let Some(target) = resolve_conditions(value, conditions) {
                        return Some(target);
                    }
                }
            }
            None
        }
        _ => None,
    }
}
