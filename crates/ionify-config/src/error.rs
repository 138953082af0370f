//! Configuration errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file has invalid JSON syntax.
    #[error("invalid configuration JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    /// Invalid value for a configuration option.
    #[error("invalid value for '{field}': {value}")]
    InvalidValue { field: String, value: String },

    /// I/O error while reading configuration.
    #[error("failed to read configuration: {0}")]
    Io(#[from] std::io::Error),
}
