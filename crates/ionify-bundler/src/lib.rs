//! Production build orchestration.
//!
//! Walks the module graph breadth-first from the entry set, records
//! every discovered module, runs unique modules through the worker
//! pool, writes artifacts into the CAS, and hands the resulting
//! [`BuildPlan`] to the external planner/emitter.

pub mod build;
pub mod error;
pub mod plan;

pub use build::BuildEngine;
pub use error::BuildError;
pub use plan::{fallback_entries, BuildPlan, PlannedModule};
