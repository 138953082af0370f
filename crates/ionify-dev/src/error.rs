//! Dev server errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DevError {
    /// Server lifecycle failure (bind, serve).
    #[error("server error: {0}")]
    Server(String),

    /// File watcher failure.
    #[error("watch error: {0}")]
    Watch(#[from] notify::Error),

    /// The watcher was closed; no further paths can be registered.
    #[error("watcher is closed")]
    WatcherClosed,

    /// The HMR coordinator was closed.
    #[error("hmr coordinator is closed")]
    HmrClosed,

    /// Graph store failure. Fatal for the current request only; the
    /// server keeps running.
    #[error("graph error: {0}")]
    Graph(#[from] ionify_graph::GraphError),

    /// Transform failure; surfaced over the HMR error channel in dev.
    #[error(transparent)]
    Transform(#[from] ionify_transform::TransformError),

    /// I/O failure.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T, E = DevError> = std::result::Result<T, E>;
