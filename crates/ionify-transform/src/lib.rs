//! Transform pipeline: ordered loaders, memoized + CAS-backed engine,
//! and a bounded worker pool for CPU-heavy transforms.

pub mod builtins;
pub mod engine;
pub mod error;
pub mod loader;
pub mod lru;
pub mod pool;
pub mod transformer;

pub use builtins::{asset_shim, substitute_env, CssInlineLoader, CssModulesLoader};
pub use engine::{CachedTransform, EngineStats, TransformEngine, TransformInput};
pub use error::{PoolError, TransformError};
pub use loader::{Loader, LoaderContext, LoaderOutput, LoaderRegistry};
pub use pool::WorkerPool;
pub use transformer::{JobOutput, PassthroughTransformer, TransformJob, Transformer};
