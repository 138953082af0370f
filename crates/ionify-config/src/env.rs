//! Environment ingestion.
//!
//! All `IONIFY_*` variables are read once at startup and folded into the
//! configuration before the version hash is computed. `IONIFY_CONFIG_HASH`
//! goes the other way: the core exports it so transform workers can
//! namespace their own state without re-deriving the hash.

use ionify_core::VersionHash;
use tracing::warn;

use crate::config::{EngineConfig, ScopeHoistConfig, TransformOptions, TreeshakeConfig};

/// Name of the variable the core exports for workers.
pub const CONFIG_HASH_VAR: &str = "IONIFY_CONFIG_HASH";

/// Overrides collected from the environment.
#[derive(Debug, Clone, Default)]
pub struct EnvOverrides {
    parser: Option<String>,
    minifier: Option<String>,
    treeshake: Option<String>,
    treeshake_include: Option<String>,
    treeshake_exclude: Option<String>,
    scope_hoist: Option<String>,
    scope_hoist_inline: Option<String>,
    scope_hoist_const: Option<String>,
    scope_hoist_combine: Option<String>,
    optimization_level: Option<String>,
    sourcemaps: Option<String>,
    transform_cache_max: Option<String>,
}

impl EnvOverrides {
    /// Read from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read through a lookup function. Tests inject their own.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            parser: lookup("IONIFY_PARSER"),
            minifier: lookup("IONIFY_MINIFIER"),
            treeshake: lookup("IONIFY_TREESHAKE"),
            treeshake_include: lookup("IONIFY_TREESHAKE_INCLUDE"),
            treeshake_exclude: lookup("IONIFY_TREESHAKE_EXCLUDE"),
            scope_hoist: lookup("IONIFY_SCOPE_HOIST"),
            scope_hoist_inline: lookup("IONIFY_SCOPE_HOIST_INLINE"),
            scope_hoist_const: lookup("IONIFY_SCOPE_HOIST_CONST"),
            scope_hoist_combine: lookup("IONIFY_SCOPE_HOIST_COMBINE"),
            optimization_level: lookup("IONIFY_OPTIMIZATION_LEVEL"),
            sourcemaps: lookup("IONIFY_SOURCEMAPS"),
            transform_cache_max: lookup("IONIFY_DEV_TRANSFORM_CACHE_MAX"),
        }
    }

    /// Fold the overrides into a configuration. Unparseable values are
    /// logged and skipped rather than aborting startup.
    pub fn apply(&self, config: &mut EngineConfig) {
        if let Some(parser) = &self.parser {
            match parser.parse() {
                Ok(mode) => config.parser_mode = mode,
                Err(e) => warn!("ignoring IONIFY_PARSER: {}", e),
            }
        }
        if let Some(minifier) = &self.minifier {
            match minifier.parse() {
                Ok(mode) => config.minifier = mode,
                Err(e) => warn!("ignoring IONIFY_MINIFIER: {}", e),
            }
        }

        if let Some(raw) = &self.treeshake {
            if !parse_bool(raw) {
                config.treeshake = None;
            } else {
                let ts = config.treeshake.get_or_insert_with(TreeshakeConfig::default);
                if let Some(include) = &self.treeshake_include {
                    ts.include = split_list(include);
                }
                if let Some(exclude) = &self.treeshake_exclude {
                    ts.exclude = split_list(exclude);
                }
            }
        }

        if let Some(raw) = &self.scope_hoist {
            if !parse_bool(raw) {
                config.scope_hoist = None;
            } else {
                let sh = config.scope_hoist.get_or_insert_with(ScopeHoistConfig::default);
                if let Some(v) = &self.scope_hoist_inline {
                    sh.inline_functions = parse_bool(v);
                }
                if let Some(v) = &self.scope_hoist_const {
                    sh.constant_folding = parse_bool(v);
                }
                if let Some(v) = &self.scope_hoist_combine {
                    sh.combine_variables = parse_bool(v);
                }
            }
        }
    }

    /// Fold the runtime-only overrides into transform options.
    pub fn apply_transform_options(&self, opts: &mut TransformOptions) {
        if let Some(raw) = &self.optimization_level {
            match raw.parse::<u8>() {
                Ok(level) => opts.optimization_level = level,
                Err(_) => warn!("ignoring IONIFY_OPTIMIZATION_LEVEL: not a number"),
            }
        }
        if let Some(raw) = &self.sourcemaps {
            opts.sourcemaps = parse_bool(raw);
        }
        if let Some(raw) = &self.transform_cache_max {
            match raw.parse::<usize>() {
                Ok(max) if max > 0 => opts.transform_cache_max = max,
                _ => warn!("ignoring IONIFY_DEV_TRANSFORM_CACHE_MAX: not a positive number"),
            }
        }
    }
}

/// Export the computed hash for worker processes.
pub fn export_config_hash(version: &VersionHash) {
    std::env::set_var(CONFIG_HASH_VAR, version.as_str());
}

fn parse_bool(raw: &str) -> bool {
    matches!(
        raw.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "on" | "yes"
    )
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{MinifierMode, ParserMode};
    use std::collections::HashMap;

    fn overrides(pairs: &[(&str, &str)]) -> EnvOverrides {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        EnvOverrides::from_lookup(|name| map.get(name).cloned())
    }

    #[test]
    fn test_parser_and_minifier_override() {
        let mut config = EngineConfig::default();
        overrides(&[("IONIFY_PARSER", "swc"), ("IONIFY_MINIFIER", "oxc")]).apply(&mut config);
        assert_eq!(config.parser_mode, ParserMode::Swc);
        assert_eq!(config.minifier, MinifierMode::Oxc);
    }

    #[test]
    fn test_invalid_parser_ignored() {
        let mut config = EngineConfig::default();
        overrides(&[("IONIFY_PARSER", "quickjs")]).apply(&mut config);
        assert_eq!(config.parser_mode, ParserMode::Hybrid);
    }

    #[test]
    fn test_treeshake_enable_with_lists() {
        let mut config = EngineConfig::default();
        overrides(&[
            ("IONIFY_TREESHAKE", "1"),
            ("IONIFY_TREESHAKE_INCLUDE", "src/a.ts, src/b.ts"),
            ("IONIFY_TREESHAKE_EXCLUDE", "vendor"),
        ])
        .apply(&mut config);

        let ts = config.treeshake.expect("treeshake enabled");
        assert_eq!(ts.include, vec!["src/a.ts", "src/b.ts"]);
        assert_eq!(ts.exclude, vec!["vendor"]);
    }

    #[test]
    fn test_treeshake_disable() {
        let mut config = EngineConfig {
            treeshake: Some(TreeshakeConfig::default()),
            ..Default::default()
        };
        overrides(&[("IONIFY_TREESHAKE", "off")]).apply(&mut config);
        assert!(config.treeshake.is_none());
    }

    #[test]
    fn test_scope_hoist_flags() {
        let mut config = EngineConfig::default();
        overrides(&[
            ("IONIFY_SCOPE_HOIST", "true"),
            ("IONIFY_SCOPE_HOIST_INLINE", "1"),
            ("IONIFY_SCOPE_HOIST_COMBINE", "0"),
        ])
        .apply(&mut config);

        let sh = config.scope_hoist.expect("scope hoist enabled");
        assert!(sh.inline_functions);
        assert!(!sh.constant_folding);
        assert!(!sh.combine_variables);
    }

    #[test]
    fn test_transform_options() {
        let mut opts = TransformOptions::default();
        overrides(&[
            ("IONIFY_OPTIMIZATION_LEVEL", "2"),
            ("IONIFY_SOURCEMAPS", "0"),
            ("IONIFY_DEV_TRANSFORM_CACHE_MAX", "100"),
        ])
        .apply_transform_options(&mut opts);

        assert_eq!(opts.optimization_level, 2);
        assert!(!opts.sourcemaps);
        assert_eq!(opts.transform_cache_max, 100);
    }

    #[test]
    fn test_zero_cache_max_rejected() {
        let mut opts = TransformOptions::default();
        overrides(&[("IONIFY_DEV_TRANSFORM_CACHE_MAX", "0")]).apply_transform_options(&mut opts);
        assert_eq!(opts.transform_cache_max, 5000);
    }
}
