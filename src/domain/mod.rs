//! Domain layer for the tripwright planning engine
//!
//! This module contains the planner record, per-domain planning state,
//! and the port traits the engine consumes.

pub mod errors;
pub mod models;
pub mod ports;

// Re-export error types for convenient access
pub use errors::{DomainError, DomainResult};
