pub mod config;
pub mod dag;
pub mod domain_state;
pub mod intake;
pub mod planner;
pub mod summary;

pub use config::{
    Config, DispatchConfig, LoggingConfig, OrchestratorConfig, ProvidersConfig, RateLimitConfig,
};
pub use dag::{DagEdge, DomainDag};
pub use domain_state::{
    CapabilityKind, Choice, Confidence, Domain, DomainState, GroupingKey, Price, PriceBasis,
    SearchResult, SearchTask, SelectedOption, SelectionKind, TaskStatus, TravelOption,
};
pub use intake::{
    CompletenessReport, HubUpdate, IntakeDocument, PartyComposition, PreferencesUpdate,
    TravelerUpdate, TripDetailsUpdate,
};
pub use planner::{
    BudgetMode, DateWindow, HubCodes, MissingField, Pace, PlannerRecord, PlannerStatus,
    Preferences, TravelerConstraints, Traveler, TravelerIndex, TravelerRole, TripDetails,
};
pub use summary::{
    ActionItem, ActionKind, BudgetComparison, CostEstimate, DomainHighlight, TripSummary,
};
