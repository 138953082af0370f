//! Configuration model for the Ionify build engine.
//!
//! The engine configuration is normalized into a canonical form and
//! hashed into a [`VersionHash`](ionify_core::VersionHash) that
//! namespaces every piece of derived on-disk state (graph database, CAS
//! artifacts). Two logically identical configurations always canonicalize
//! to byte-identical serializations, so independent processes agree on
//! the namespace.

pub mod canonical;
pub mod config;
pub mod env;
pub mod error;

pub use canonical::{canonicalize, compute_version};
pub use config::{
    EngineConfig, MinifierMode, ParserMode, ScopeHoistConfig, TransformOptions, TreeshakeConfig,
    TreeshakeMode,
};
pub use env::EnvOverrides;
pub use error::ConfigError;
