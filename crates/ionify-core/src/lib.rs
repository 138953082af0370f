//! Core types shared across the Ionify build engine.
//!
//! This crate holds the vocabulary the rest of the workspace speaks:
//! module identity ([`ModuleId`], [`ModuleKind`]), content digests
//! ([`ContentHash`], [`VersionHash`]), the deterministic hasher, and the
//! mapping between filesystem paths and public URLs.

pub mod hash;
pub mod module;
pub mod paths;

pub use hash::{hash_bytes, hash_many, Hash256};
pub use module::{ContentHash, ModuleId, ModuleKind, VersionHash};
pub use paths::{decode_public_path, public_path_for, PathMapError, MODULE_PREFIX};
