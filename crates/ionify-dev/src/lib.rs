//! Ionify development server.
//!
//! Ties the core services together behind an HTTP surface: per-request
//! resolve → read → transform → respond, a file watcher feeding the
//! incremental change engine, and the hot-update protocol over a
//! long-lived event channel.

pub mod dispatch;
pub mod error;
pub mod hmr;
pub mod server;
pub mod state;
pub mod watcher;

pub use error::DevError;
pub use hmr::{HmrCoordinator, HmrEvent, ModuleSummary, PendingUpdate, UpdateReason};
pub use server::{DevServer, DevServerConfig};
pub use state::{DevState, SharedState};
pub use watcher::{FileWatcher, WatchEvent};
