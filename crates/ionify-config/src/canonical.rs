//! Canonicalization of engine configuration into a version hash.
//!
//! The canonical form is a JSON value with every set-like array sorted
//! and deduplicated, every disabled/empty optional collapsed to `null`,
//! and every mapping serialized with recursively sorted keys. The
//! serialization is byte-identical for logically identical inputs, which
//! is what makes the version hash a safe namespace for derived state.

use serde_json::{json, Map, Value};
use sha2::{Digest, Sha256};

use ionify_core::VersionHash;

use crate::config::EngineConfig;

/// Produce the canonical JSON value for a configuration.
pub fn canonicalize(config: &EngineConfig) -> Value {
    let treeshake = match &config.treeshake {
        None => Value::Null,
        Some(ts) => {
            let mut include = ts.include.clone();
            include.sort();
            include.dedup();
            let mut exclude = ts.exclude.clone();
            exclude.sort();
            exclude.dedup();
            json!({
                "exclude": exclude,
                "include": include,
                "mode": ts.mode.as_str(),
            })
        }
    };

    let scope_hoist = match &config.scope_hoist {
        None => Value::Null,
        Some(sh) => json!({
            "combine_variables": sh.combine_variables,
            "constant_folding": sh.constant_folding,
            "inline_functions": sh.inline_functions,
        }),
    };

    let mut plugins = config.plugins.clone();
    plugins.sort();
    plugins.dedup();

    let mut entry: Vec<String> = config
        .entry
        .iter()
        .map(|p| p.display().to_string())
        .collect();
    entry.sort();
    entry.dedup();
    let entry = if entry.is_empty() {
        Value::Null
    } else {
        json!(entry)
    };

    let mut canonical = Map::new();
    canonical.insert("asset_options".into(), canonical_mapping(&config.asset_options));
    canonical.insert("css_options".into(), canonical_mapping(&config.css_options));
    canonical.insert("entry".into(), entry);
    canonical.insert("minifier".into(), json!(config.minifier.as_str()));
    canonical.insert("parser_mode".into(), json!(config.parser_mode.as_str()));
    canonical.insert("plugins".into(), json!(plugins));
    canonical.insert("scope_hoist".into(), scope_hoist);
    canonical.insert("treeshake".into(), treeshake);
    Value::Object(canonical)
}

/// Compute the version hash: SHA-256 over the canonical serialization,
/// truncated to the first 16 hex characters.
pub fn compute_version(config: &EngineConfig) -> VersionHash {
    let canonical = canonicalize(config);
    let serialized =
        serde_json::to_string(&canonical).expect("canonical config is always serializable");
    let mut hasher = Sha256::new();
    hasher.update(serialized.as_bytes());
    VersionHash::from_digest(&hasher.finalize().into())
}

/// Empty mappings collapse to `null`; non-empty mappings are rebuilt
/// with recursively sorted keys.
fn canonical_mapping(map: &Map<String, Value>) -> Value {
    if map.is_empty() {
        Value::Null
    } else {
        sort_value(&Value::Object(map.clone()))
    }
}

fn sort_value(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut sorted = Map::new();
            for key in keys {
                sorted.insert(key.clone(), sort_value(&map[key]));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(sort_value).collect()),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::config::{ParserMode, ScopeHoistConfig, TreeshakeConfig, TreeshakeMode};

    #[test]
    fn test_version_ignores_set_ordering() {
        let a = EngineConfig {
            parser_mode: ParserMode::Oxc,
            plugins: vec!["a".into(), "b".into()],
            ..Default::default()
        };
        let b = EngineConfig {
            parser_mode: ParserMode::Oxc,
            plugins: vec!["b".into(), "a".into()],
            ..Default::default()
        };
        assert_eq!(compute_version(&a), compute_version(&b));
    }

    #[test]
    fn test_version_distinguishes_parser_mode() {
        let a = EngineConfig {
            parser_mode: ParserMode::Oxc,
            plugins: vec!["a".into(), "b".into()],
            ..Default::default()
        };
        let b = EngineConfig {
            parser_mode: ParserMode::Swc,
            plugins: vec!["a".into(), "b".into()],
            ..Default::default()
        };
        assert_ne!(compute_version(&a), compute_version(&b));
    }

    #[test]
    fn test_duplicate_plugins_collapse() {
        let a = EngineConfig {
            plugins: vec!["x".into(), "x".into(), "y".into()],
            ..Default::default()
        };
        let b = EngineConfig {
            plugins: vec!["y".into(), "x".into()],
            ..Default::default()
        };
        assert_eq!(compute_version(&a), compute_version(&b));
    }

    #[test]
    fn test_empty_mapping_equals_null() {
        let config = EngineConfig::default();
        let canonical = canonicalize(&config);
        assert_eq!(canonical["css_options"], Value::Null);
        assert_eq!(canonical["asset_options"], Value::Null);
        assert_eq!(canonical["entry"], Value::Null);
    }

    #[test]
    fn test_mapping_key_order_irrelevant() {
        let mut first = Map::new();
        first.insert("b".into(), json!(1));
        first.insert("a".into(), json!({"z": 1, "y": 2}));

        let mut second = Map::new();
        second.insert("a".into(), json!({"y": 2, "z": 1}));
        second.insert("b".into(), json!(1));

        let a = EngineConfig {
            css_options: first,
            ..Default::default()
        };
        let b = EngineConfig {
            css_options: second,
            ..Default::default()
        };
        assert_eq!(compute_version(&a), compute_version(&b));
    }

    #[test]
    fn test_treeshake_include_sorted() {
        let a = EngineConfig {
            treeshake: Some(TreeshakeConfig {
                mode: TreeshakeMode::Aggressive,
                include: vec!["b".into(), "a".into()],
                exclude: vec![],
            }),
            ..Default::default()
        };
        let b = EngineConfig {
            treeshake: Some(TreeshakeConfig {
                mode: TreeshakeMode::Aggressive,
                include: vec!["a".into(), "b".into(), "b".into()],
                exclude: vec![],
            }),
            ..Default::default()
        };
        assert_eq!(compute_version(&a), compute_version(&b));
    }

    #[test]
    fn test_scope_hoist_explicit_booleans() {
        let config = EngineConfig {
            scope_hoist: Some(ScopeHoistConfig::default()),
            ..Default::default()
        };
        let canonical = canonicalize(&config);
        assert_eq!(canonical["scope_hoist"]["inline_functions"], json!(false));
        assert_eq!(canonical["scope_hoist"]["constant_folding"], json!(false));
        assert_eq!(canonical["scope_hoist"]["combine_variables"], json!(false));
    }

    #[test]
    fn test_entries_sorted_and_absolute() {
        let a = EngineConfig {
            entry: vec![PathBuf::from("/src/b.ts"), PathBuf::from("/src/a.ts")],
            ..Default::default()
        };
        let b = EngineConfig {
            entry: vec![PathBuf::from("/src/a.ts"), PathBuf::from("/src/b.ts")],
            ..Default::default()
        };
        assert_eq!(compute_version(&a), compute_version(&b));
    }

    #[test]
    fn test_version_hash_length() {
        let version = compute_version(&EngineConfig::default());
        assert_eq!(version.as_str().len(), 16);
    }
}
