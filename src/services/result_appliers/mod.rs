//! Result application per planning domain.
//!
//! Applying a result is exactly-once per task id: an identical re-apply
//! changes nothing, a different result replaces the previous one (last write
//! wins, logged as a conflict). Choices and the domain summary are rebuilt
//! from every recorded result in task order after each apply, so the state
//! does not depend on the order results arrived in.

pub mod activities;
pub mod entry_requirements;
pub mod lodging;
pub mod transport;

use tracing::{debug, warn};

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    Choice, Domain, DomainState, SearchResult, SearchTask, SelectedOption, SelectionKind,
    TaskStatus,
};

pub use activities::ActivitiesApplier;
pub use entry_requirements::EntryRequirementsApplier;
pub use lodging::LodgingApplier;
pub use transport::TransportApplier;

/// Fallback order after a task's own preference.
const FALLBACK_SELECTIONS: [SelectionKind; 3] = [
    SelectionKind::Chosen,
    SelectionKind::Balanced,
    SelectionKind::Cheapest,
];

/// What an apply did to the state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// First result for the task
    Recorded,
    /// Identical to the recorded result; nothing changed
    Unchanged,
    /// Replaced a different earlier result
    Replaced,
}

/// Domain-specific parts of result application.
pub trait ResultApplier: Send + Sync {
    fn domain(&self) -> Domain;

    /// Extra detail for a task's summary line.
    fn detail(&self, _task: &SearchTask, _result: &SearchResult, _choice: &Choice) -> Option<String> {
        None
    }

    /// Domain-wide notes appended after the per-task lines.
    fn notes(&self, _state: &DomainState) -> Vec<String> {
        Vec::new()
    }

    /// Merge `result` into `state`.
    fn apply(&self, state: &mut DomainState, result: SearchResult) -> DomainResult<ApplyOutcome> {
        apply_result(self, state, result)
    }
}

/// Applier for a domain.
pub fn applier_for(domain: Domain) -> Box<dyn ResultApplier> {
    match domain {
        Domain::EntryRequirements => Box::new(EntryRequirementsApplier),
        Domain::Transport => Box::new(TransportApplier),
        Domain::Lodging => Box::new(LodgingApplier),
        Domain::Activities => Box::new(ActivitiesApplier),
    }
}

fn apply_result<A: ResultApplier + ?Sized>(
    applier: &A,
    state: &mut DomainState,
    result: SearchResult,
) -> DomainResult<ApplyOutcome> {
    let domain = state.domain;
    if state.task(&result.task_id).is_none() {
        return Err(DomainError::UnknownTask {
            domain,
            task_id: result.task_id,
        });
    }

    let outcome = match state.results.get(&result.task_id) {
        Some(previous) if *previous == result => return Ok(ApplyOutcome::Unchanged),
        Some(_) => {
            let conflict = DomainError::DuplicateApplyConflict {
                domain,
                task_id: result.task_id.clone(),
            };
            warn!(domain = %domain, task_id = %result.task_id, error = %conflict, "replacing earlier result");
            ApplyOutcome::Replaced
        }
        None => ApplyOutcome::Recorded,
    };

    let status = if result.is_empty() {
        TaskStatus::Failed
    } else {
        TaskStatus::Completed
    };
    let task_id = result.task_id.clone();
    state.transition_task(&task_id, status)?;
    state.results.insert(task_id.clone(), result);

    rebuild(applier, state);
    debug!(domain = %domain, task_id = %task_id, outcome = ?outcome, "result applied");
    Ok(outcome)
}

/// Recompute choices and the summary from every recorded result.
fn rebuild<A: ResultApplier + ?Sized>(applier: &A, state: &mut DomainState) {
    let choices: Vec<Choice> = state
        .search_tasks
        .iter()
        .filter_map(|task| {
            state
                .results
                .get(&task.task_id)
                .map(|result| build_choice(task, result))
        })
        .collect();
    state.choices = choices;
    state.overall_summary = Some(summarize(applier, state));
}

/// The choice for one task: preference, then chosen, balanced, cheapest, first option.
pub fn build_choice(task: &SearchTask, result: &SearchResult) -> Choice {
    if result.is_empty() {
        let rationale = if result.degraded {
            result.rationale.clone()
        } else {
            "no options returned".to_string()
        };
        return Choice {
            task_id: task.task_id.clone(),
            travelers: task.key.travelers.clone(),
            selected: None,
            alternatives: Vec::new(),
            rationale,
            degraded: true,
        };
    }

    let picked = task
        .preference
        .iter()
        .chain(FALLBACK_SELECTIONS.iter())
        .find_map(|&kind| result.selected(kind).map(|option| (option, Some(kind))))
        .or_else(|| result.options.first().map(|option| (option, None)));

    let (selected, alternatives, rationale) = match picked {
        Some((option, kind)) => {
            let alternatives = result
                .options
                .iter()
                .filter(|o| o.id != option.id)
                .map(|o| o.id.clone())
                .collect();
            let rationale = if result.rationale.is_empty() {
                match kind {
                    Some(kind) => format!("{} option", kind.as_str()),
                    None => "first available option".to_string(),
                }
            } else {
                result.rationale.clone()
            };
            (
                Some(SelectedOption::from_option(option, kind)),
                alternatives,
                rationale,
            )
        }
        None => (None, Vec::new(), result.rationale.clone()),
    };

    Choice {
        task_id: task.task_id.clone(),
        travelers: task.key.travelers.clone(),
        selected,
        alternatives,
        rationale,
        degraded: false,
    }
}

pub(crate) fn format_travelers(travelers: &[u32]) -> String {
    let list: Vec<String> = travelers.iter().map(ToString::to_string).collect();
    format!("[{}]", list.join(", "))
}

/// Header plus one line per task, then domain notes.
fn summarize<A: ResultApplier + ?Sized>(applier: &A, state: &DomainState) -> String {
    let domain = state.domain;
    let mut lines = vec![format!(
        "{}: {}/{} tasks resolved, {} degraded",
        domain.label(),
        state.results.len(),
        state.search_tasks.len(),
        state.degraded_count()
    )];

    for task in &state.search_tasks {
        let travelers = format_travelers(&task.key.travelers);
        let line = match (state.results.get(&task.task_id), state.choice(&task.task_id)) {
            (Some(result), Some(choice)) => {
                let detail = applier
                    .detail(task, result, choice)
                    .map(|d| format!("; {d}"))
                    .unwrap_or_default();
                match &choice.selected {
                    _ if choice.degraded => format!(
                        "- {}: missing {} data for travelers {travelers} ({}){detail}",
                        task.task_id,
                        domain.data_noun(),
                        choice.rationale
                    ),
                    Some(selected) => format!(
                        "- {}: {}{} for travelers {travelers}{detail}",
                        task.task_id,
                        selected.name,
                        selected
                            .price
                            .as_ref()
                            .map(|p| format!(" ({:.2} {})", p.amount, p.currency))
                            .unwrap_or_default()
                    ),
                    None => format!(
                        "- {}: no selection for travelers {travelers}{detail}",
                        task.task_id
                    ),
                }
            }
            _ => format!("- {}: pending for travelers {travelers}", task.task_id),
        };
        lines.push(line);
    }

    lines.extend(applier.notes(state));
    lines.join("\n")
}
