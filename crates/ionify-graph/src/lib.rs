//! Persistent module dependency graph.
//!
//! The graph store is the heart of incremental correctness: it persists
//! module nodes with their content hashes and dependency edges, keeps a
//! reverse index consistent with forward edges in the same atomic unit,
//! and answers affected-set queries for the change engine.

pub mod error;
pub mod node;
pub mod store;

pub use error::GraphError;
pub use node::ModuleNode;
pub use store::GraphStore;
