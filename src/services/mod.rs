pub mod dependency_resolver;
pub mod dispatcher;
pub mod domain_orchestrator;
pub mod result_appliers;
pub mod status_machine;
pub mod summary_synthesizer;
pub mod task_derivers;
pub mod trip_record_store;

pub use dependency_resolver::DependencyResolver;
pub use dispatcher::Dispatcher;
pub use domain_orchestrator::{DomainOrchestrator, DomainOutcome, ExecutionEvent, RunReport};
pub use result_appliers::{applier_for, ApplyOutcome, ResultApplier};
pub use status_machine::{StatusMachine, Transition};
pub use summary_synthesizer::SummarySynthesizer;
pub use task_derivers::{deriver_for, DeriveContext, Derivation, TaskDeriver};
pub use trip_record_store::{DomainWriter, StoreSnapshot, TripRecordStore};
