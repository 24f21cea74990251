//! Order orchestration over the worker pool.
//!
//! This crate provides [`OrderOrchestrator`], which drives the pool in two
//! modes — parallel batch processing with a per-item timeout fallback, and
//! a multi-stage streaming pipeline (validate → compute-total → finalize) —
//! and composes the repository with the pool for status updates.

mod error;
mod orchestrator;

pub use error::OrchestratorError;
pub use orchestrator::OrderOrchestrator;
