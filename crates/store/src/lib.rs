//! Order persistence port for the pipeline.
//!
//! This crate provides:
//! - [`OrderRepository`] — the save/find/update/delete contract the
//!   orchestrator consumes
//! - [`InMemoryOrderRepository`] — a store object owning its map and lock,
//!   injected by construction

mod error;
mod memory;
mod repository;

pub use error::{Result, StoreError};
pub use memory::InMemoryOrderRepository;
pub use repository::OrderRepository;
