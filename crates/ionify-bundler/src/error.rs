//! Build errors.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum BuildError {
    /// An entry point does not exist on disk.
    #[error("entry point not found: {}", .0.display())]
    EntryNotFound(PathBuf),

    /// Graph store failure; fatal for the build.
    #[error("graph error: {0}")]
    Graph(#[from] ionify_graph::GraphError),

    /// The worker pool was closed mid-build.
    #[error("worker pool error: {0}")]
    Pool(#[from] ionify_transform::PoolError),

    /// A module transform failed. In build mode this aborts.
    #[error("transform failed for {module}: {message}")]
    Transform { module: String, message: String },

    /// I/O failure reading a module.
    #[error("io error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
