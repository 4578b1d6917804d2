//! Tripwright - group trip planning engine
//!
//! Tripwright collects trip facts into a planner record, then runs one
//! pipeline per planning domain (entry requirements, transport, lodging,
//! activities) over a static dependency DAG and consolidates the resolved
//! choices into a trip summary.
//!
//! # Architecture
//!
//! This crate follows Hexagonal Architecture principles:
//!
//! - **Domain Layer** (`domain`): Planner record, domain state, errors and ports
//! - **Service Layer** (`services`): Store, derivers, dispatch, appliers, orchestration
//! - **Adapters** (`adapters`): Capability providers (HTTP, fixtures, mock)
//! - **Infrastructure Layer** (`infrastructure`): Configuration and logging
//! - **CLI Layer** (`cli`): Command-line interface
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use tripwright::adapters::providers::FixtureCapabilityProvider;
//! use tripwright::{Config, Dispatcher, DomainOrchestrator, TripRecordStore};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::default();
//!     let store = Arc::new(TripRecordStore::new());
//!     // ... apply intake updates ...
//!     let dispatcher = Arc::new(Dispatcher::new(
//!         Arc::new(FixtureCapabilityProvider::generated()),
//!         config.dispatch.clone(),
//!         &config.rate_limit,
//!     ));
//!     let report = DomainOrchestrator::new(store, dispatcher, config.orchestrator)
//!         .run()
//!         .await?;
//!     println!("{:?}", report.summary);
//!     Ok(())
//! }
//! ```

pub mod adapters;
pub mod cli;
pub mod domain;
pub mod infrastructure;
pub mod services;

// Re-export commonly used types for convenience
pub use domain::models::{
    Config, Domain, DomainState, IntakeDocument, PlannerRecord, PlannerStatus, SearchResult,
    SearchTask, TripSummary,
};
pub use domain::ports::{CapabilityError, CapabilityProvider, CapabilityQuery};
pub use domain::{DomainError, DomainResult};
pub use infrastructure::config::{ConfigError, ConfigLoader};
pub use services::{
    DependencyResolver, Dispatcher, DomainOrchestrator, DomainOutcome, RunReport,
    SummarySynthesizer, TripRecordStore,
};
