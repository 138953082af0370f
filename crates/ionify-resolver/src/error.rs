//! Resolution errors.

use std::path::PathBuf;

use thiserror::Error;

/// A specifier could not be resolved under strict resolution.
///
/// Loaders that tolerate misses never see this; they receive `None`
/// from the non-strict entry point instead.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("cannot resolve '{specifier}' imported from '{}'", importer.display())]
pub struct ResolveError {
    pub specifier: String,
    pub importer: PathBuf,
}
