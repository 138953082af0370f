//! Transform pipeline errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransformError {
    /// A loader in the chain failed.
    #[error("loader '{loader}' failed on {module}: {message}")]
    Loader {
        loader: String,
        module: String,
        message: String,
    },

    /// The transform failed; carries the message of the originating
    /// failure for callers awaiting a shared in-flight execution.
    #[error("transform failed on {module}: {message}")]
    Failed { module: String, message: String },
}

/// Worker pool lifecycle errors. Transform failures inside a worker are
/// never surfaced this way; they travel as `{error}` job results.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PoolError {
    #[error("worker pool is closed")]
    Closed,
}
