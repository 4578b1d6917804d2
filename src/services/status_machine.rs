//! Top-level planning phase transitions.
//!
//! The status machine is the only writer of `PlannerRecord::status`. Callers
//! hold the store's record lock while invoking it.

use std::collections::BTreeMap;

use tracing::info;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{Domain, DomainState, PlannerRecord, PlannerStatus, TripSummary};

/// Outcome of a transition request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Advanced {
        from: PlannerStatus,
        to: PlannerStatus,
    },
    /// The record was already at or past the requested phase
    Unchanged(PlannerStatus),
}

#[derive(Debug, Clone, Copy, Default)]
pub struct StatusMachine;

impl StatusMachine {
    /// `intake -> planning`, on the collaborator's explicit ready signal.
    ///
    /// A no-op once planning has started.
    pub fn confirm_ready(record: &mut PlannerRecord) -> DomainResult<Transition> {
        if record.status >= PlannerStatus::Planning {
            return Ok(Transition::Unchanged(record.status));
        }

        let missing = record.missing_fields();
        if !missing.is_empty() {
            return Err(DomainError::IntakeIncomplete { missing });
        }

        Self::advance(record, PlannerStatus::Planning)
    }

    /// `planning -> done`, once every required domain settled and the summary
    /// covers each of them.
    pub fn complete(
        record: &mut PlannerRecord,
        states: &BTreeMap<Domain, DomainState>,
        required: &[Domain],
        summary: &TripSummary,
    ) -> DomainResult<Transition> {
        match record.status {
            PlannerStatus::Done => return Ok(Transition::Unchanged(PlannerStatus::Done)),
            PlannerStatus::Intake => {
                return Err(DomainError::InvalidStatusTransition {
                    from: PlannerStatus::Intake,
                    to: PlannerStatus::Done,
                });
            }
            PlannerStatus::Planning => {}
        }

        let unsettled = Self::unsettled_domains(states, required);
        if !unsettled.is_empty() {
            return Err(DomainError::PlanningIncomplete(unsettled));
        }

        let uncovered: Vec<Domain> = required
            .iter()
            .filter(|d| summary.highlight(**d).is_none())
            .copied()
            .collect();
        if !uncovered.is_empty() {
            return Err(DomainError::ValidationFailed(format!(
                "summary has no highlight for {uncovered:?}"
            )));
        }

        Self::advance(record, PlannerStatus::Done)
    }

    /// Required domains that are missing, never completed a pass, or still
    /// have tasks without a result.
    pub fn unsettled_domains(
        states: &BTreeMap<Domain, DomainState>,
        required: &[Domain],
    ) -> Vec<Domain> {
        required
            .iter()
            .filter(|d| !states.get(d).is_some_and(DomainState::is_settled))
            .copied()
            .collect()
    }

    fn advance(record: &mut PlannerRecord, to: PlannerStatus) -> DomainResult<Transition> {
        let from = record.status;
        if from.successor() != Some(to) {
            return Err(DomainError::InvalidStatusTransition { from, to });
        }
        record.status = to;
        info!(from = %from, to = %to, "planner status advanced");
        Ok(Transition::Advanced { from, to })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{
        BudgetMode, CostEstimate, DomainHighlight, MissingField, SearchResult, Traveler,
        TravelerRole,
    };
    use chrono::NaiveDate;

    fn complete_record() -> PlannerRecord {
        let mut record = PlannerRecord::new();
        record.trip.destination = Some("Lisbon".to_string());
        record.trip.origin = Some("Accra".to_string());
        record.trip.start_date = NaiveDate::from_ymd_opt(2025, 6, 1);
        record.trip.end_date = NaiveDate::from_ymd_opt(2025, 6, 8);
        let mut traveler = Traveler::new(0, TravelerRole::Adult);
        traveler.nationality = Some("GH".to_string());
        record.travelers.push(traveler);
        record.next_traveler_index = 1;
        record.preferences.budget_mode = Some(BudgetMode::Standard);
        record
    }

    fn summary() -> TripSummary {
        TripSummary {
            destination: "Lisbon".to_string(),
            traveler_count: 1,
            requested_window: None,
            adjusted_window: None,
            highlights: Domain::ALL
                .iter()
                .map(|&domain| DomainHighlight {
                    domain,
                    summary: String::new(),
                    selections: vec![],
                    notes: vec![],
                    degraded: false,
                })
                .collect(),
            costs: CostEstimate::default(),
            budget: None,
            action_items: vec![],
        }
    }

    fn settled_states() -> BTreeMap<Domain, DomainState> {
        Domain::ALL
            .iter()
            .map(|&d| {
                let mut state = DomainState::new(d);
                state.completed_passes = 1;
                (d, state)
            })
            .collect()
    }

    #[test]
    fn test_confirm_ready_incomplete() {
        let mut record = PlannerRecord::new();
        record.trip.destination = Some("Lisbon".to_string());

        let err = StatusMachine::confirm_ready(&mut record).unwrap_err();
        match err {
            DomainError::IntakeIncomplete { missing } => {
                assert!(missing.contains(&MissingField::Origin));
                assert!(missing.contains(&MissingField::Travelers));
                assert!(!missing.contains(&MissingField::Destination));
            }
            other => panic!("Expected IntakeIncomplete, got {other:?}"),
        }
        assert_eq!(record.status, PlannerStatus::Intake);
    }

    #[test]
    fn test_confirm_ready_is_noop_after_planning() {
        let mut record = complete_record();
        assert_eq!(
            StatusMachine::confirm_ready(&mut record).unwrap(),
            Transition::Advanced {
                from: PlannerStatus::Intake,
                to: PlannerStatus::Planning
            }
        );
        assert_eq!(
            StatusMachine::confirm_ready(&mut record).unwrap(),
            Transition::Unchanged(PlannerStatus::Planning)
        );
    }

    #[test]
    fn test_complete_requires_planning() {
        let mut record = complete_record();
        let err =
            StatusMachine::complete(&mut record, &settled_states(), &Domain::ALL, &summary())
                .unwrap_err();
        assert!(matches!(err, DomainError::InvalidStatusTransition { .. }));
    }

    #[test]
    fn test_complete_names_unsettled_domains() {
        let mut record = complete_record();
        StatusMachine::confirm_ready(&mut record).unwrap();

        let mut states = settled_states();
        states.remove(&Domain::Activities);
        if let Some(lodging) = states.get_mut(&Domain::Lodging) {
            lodging.search_tasks.push(crate::domain::models::SearchTask::new(
                "lodging-lisbon-0",
                Domain::Lodging,
                crate::domain::models::GroupingKey::new(vec![0], "Lisbon", None),
            ));
        }

        let err = StatusMachine::complete(&mut record, &states, &Domain::ALL, &summary())
            .unwrap_err();
        assert_eq!(
            err,
            DomainError::PlanningIncomplete(vec![Domain::Lodging, Domain::Activities])
        );
        assert_eq!(record.status, PlannerStatus::Planning);

        if let Some(lodging) = states.get_mut(&Domain::Lodging) {
            lodging.results.insert(
                "lodging-lisbon-0".to_string(),
                SearchResult::stub("lodging-lisbon-0", "timeout"),
            );
        }
        let mut activities = DomainState::new(Domain::Activities);
        activities.completed_passes = 1;
        states.insert(Domain::Activities, activities);

        assert!(matches!(
            StatusMachine::complete(&mut record, &states, &Domain::ALL, &summary()),
            Ok(Transition::Advanced {
                to: PlannerStatus::Done,
                ..
            })
        ));
    }

    #[test]
    fn test_complete_requires_highlight_per_domain() {
        let mut record = complete_record();
        StatusMachine::confirm_ready(&mut record).unwrap();

        let mut partial = summary();
        partial.highlights.retain(|h| h.domain != Domain::Transport);

        let err = StatusMachine::complete(&mut record, &settled_states(), &Domain::ALL, &partial)
            .unwrap_err();
        assert!(matches!(err, DomainError::ValidationFailed(ref msg) if msg.contains("Transport")));
        assert_eq!(record.status, PlannerStatus::Planning);

        StatusMachine::complete(&mut record, &settled_states(), &Domain::ALL, &summary()).unwrap();
        assert_eq!(record.status, PlannerStatus::Done);
    }
}
