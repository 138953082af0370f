//! Engine configuration types.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Which parser engine handles JS/TS sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParserMode {
    Oxc,
    Swc,
    #[default]
    Hybrid,
}

impl ParserMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParserMode::Oxc => "oxc",
            ParserMode::Swc => "swc",
            ParserMode::Hybrid => "hybrid",
        }
    }
}

impl std::str::FromStr for ParserMode {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "oxc" => Ok(ParserMode::Oxc),
            "swc" => Ok(ParserMode::Swc),
            "hybrid" => Ok(ParserMode::Hybrid),
            other => Err(format!("invalid parser mode: {}", other)),
        }
    }
}

/// Which minifier engine runs in production builds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MinifierMode {
    Oxc,
    Swc,
    #[default]
    Auto,
}

impl MinifierMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            MinifierMode::Oxc => "oxc",
            MinifierMode::Swc => "swc",
            MinifierMode::Auto => "auto",
        }
    }
}

impl std::str::FromStr for MinifierMode {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "oxc" => Ok(MinifierMode::Oxc),
            "swc" => Ok(MinifierMode::Swc),
            "auto" => Ok(MinifierMode::Auto),
            other => Err(format!("invalid minifier mode: {}", other)),
        }
    }
}

/// Treeshaking aggressiveness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TreeshakeMode {
    #[default]
    Safe,
    Aggressive,
}

impl TreeshakeMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            TreeshakeMode::Safe => "safe",
            TreeshakeMode::Aggressive => "aggressive",
        }
    }
}

/// Treeshaking configuration. `None` at the [`EngineConfig`] level means
/// treeshaking is disabled.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TreeshakeConfig {
    #[serde(default)]
    pub mode: TreeshakeMode,

    /// Module patterns forced into the shake set.
    #[serde(default)]
    pub include: Vec<String>,

    /// Module patterns exempted from shaking.
    #[serde(default)]
    pub exclude: Vec<String>,
}

/// Scope hoisting options. `None` at the [`EngineConfig`] level means
/// scope hoisting is disabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ScopeHoistConfig {
    #[serde(default)]
    pub inline_functions: bool,

    #[serde(default)]
    pub constant_folding: bool,

    #[serde(default)]
    pub combine_variables: bool,
}

/// The configuration record the version hash is computed over.
///
/// Only these fields participate in canonicalization (§ version
/// canonicalizer); runtime knobs that do not affect artifact bytes live
/// in [`TransformOptions`].
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub parser_mode: ParserMode,

    #[serde(default)]
    pub minifier: MinifierMode,

    #[serde(default)]
    pub treeshake: Option<TreeshakeConfig>,

    #[serde(default)]
    pub scope_hoist: Option<ScopeHoistConfig>,

    /// Plugin names only; implementations are registered separately.
    #[serde(default)]
    pub plugins: Vec<String>,

    /// Absolute entry paths.
    #[serde(default)]
    pub entry: Vec<PathBuf>,

    #[serde(default)]
    pub css_options: serde_json::Map<String, serde_json::Value>,

    #[serde(default)]
    pub asset_options: serde_json::Map<String, serde_json::Value>,
}

/// Runtime transform knobs that do not participate in version hashing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransformOptions {
    /// 0 disables optimization passes entirely.
    pub optimization_level: u8,

    pub sourcemaps: bool,

    /// In-memory transform cache capacity (entries).
    pub transform_cache_max: usize,
}

impl Default for TransformOptions {
    fn default() -> Self {
        Self {
            optimization_level: 1,
            sourcemaps: true,
            transform_cache_max: 5000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.parser_mode, ParserMode::Hybrid);
        assert_eq!(config.minifier, MinifierMode::Auto);
        assert!(config.treeshake.is_none());
        assert!(config.scope_hoist.is_none());
        assert!(config.plugins.is_empty());
    }

    #[test]
    fn test_parser_mode_from_str() {
        assert_eq!("oxc".parse::<ParserMode>().unwrap(), ParserMode::Oxc);
        assert_eq!("SWC".parse::<ParserMode>().unwrap(), ParserMode::Swc);
        assert!("v8".parse::<ParserMode>().is_err());
    }

    #[test]
    fn test_config_deserializes_with_missing_fields() {
        let config: EngineConfig = serde_json::from_str(r#"{"parser_mode": "oxc"}"#).unwrap();
        assert_eq!(config.parser_mode, ParserMode::Oxc);
        assert_eq!(config.minifier, MinifierMode::Auto);
    }
}
