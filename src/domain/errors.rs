//! Domain errors for the tripwright planning engine.

use thiserror::Error;

use super::models::{Domain, MissingField, PlannerStatus, TaskStatus};

/// Format a list of missing intake fields: `destination, start_date`.
fn format_missing(fields: &[MissingField]) -> String {
    fields
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Domain-level errors that can occur while planning a trip.
///
/// Only [`DomainError::IntakeIncomplete`] and [`DomainError::DependencyNotReady`]
/// are expected to reach callers of the orchestrator; capability failures are
/// converted into degraded results by the dispatcher and never surface here.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DomainError {
    #[error("Intake incomplete, missing: {}", format_missing(.missing))]
    IntakeIncomplete { missing: Vec<MissingField> },

    #[error("Intake is closed: record is in {0} phase")]
    IntakeClosed(PlannerStatus),

    #[error("Dependency not ready for {domain}: {reason}")]
    DependencyNotReady { domain: Domain, reason: String },

    #[error("Capability unavailable for task {task_id}: {reason}")]
    CapabilityUnavailable { task_id: String, reason: String },

    #[error("Capability returned invalid output for task {task_id}: {reason}")]
    CapabilityInvalidOutput { task_id: String, reason: String },

    #[error("Conflicting duplicate result for task {task_id} in {domain}")]
    DuplicateApplyConflict { domain: Domain, task_id: String },

    #[error("Unknown task {task_id} in {domain}")]
    UnknownTask { domain: Domain, task_id: String },

    #[error("Traveler not found: {0}")]
    TravelerNotFound(u32),

    #[error("Invalid status transition from {from} to {to}")]
    InvalidStatusTransition { from: PlannerStatus, to: PlannerStatus },

    #[error("Invalid task transition for {task_id} from {from:?} to {to:?}")]
    InvalidTaskTransition {
        task_id: String,
        from: TaskStatus,
        to: TaskStatus,
    },

    #[error("Planning incomplete, unsettled domains: {0:?}")]
    PlanningIncomplete(Vec<Domain>),

    #[error("Domain dependency cycle detected: {0:?}")]
    DagCycle(Vec<Domain>),

    #[error("Write ownership violation: {0}")]
    WriteOwnership(String),

    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl DomainError {
    /// Whether the error is meant to be shown to the intake collaborator or caller.
    pub fn is_caller_visible(&self) -> bool {
        matches!(
            self,
            Self::IntakeIncomplete { .. } | Self::DependencyNotReady { .. }
        )
    }
}

pub type DomainResult<T> = Result<T, DomainError>;

impl From<serde_json::Error> for DomainError {
    fn from(err: serde_json::Error) -> Self {
        DomainError::SerializationError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intake_incomplete_lists_fields() {
        let err = DomainError::IntakeIncomplete {
            missing: vec![MissingField::Destination, MissingField::StartDate],
        };
        assert_eq!(
            err.to_string(),
            "Intake incomplete, missing: destination, start_date"
        );
        assert!(err.is_caller_visible());
    }

    #[test]
    fn test_capability_errors_are_internal() {
        let err = DomainError::CapabilityUnavailable {
            task_id: "lodging-lhr-0".to_string(),
            reason: "timeout".to_string(),
        };
        assert!(!err.is_caller_visible());
    }
}
