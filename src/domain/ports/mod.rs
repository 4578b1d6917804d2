//! Port trait definitions (Hexagonal Architecture)
//!
//! This module defines the async trait interface that infrastructure
//! adapters must implement:
//! - CapabilityProvider: external lookups (entry requirements, transport,
//!   lodging, activities, research)
//!
//! The trait keeps the planning core independent of any provider's wire
//! format.

pub mod capability_provider;

pub use capability_provider::{CapabilityError, CapabilityProvider, CapabilityQuery};
