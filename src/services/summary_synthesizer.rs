//! Consolidated trip summary.
//!
//! A pure function of the final record and every domain state. The output
//! only depends on its inputs, so re-running it over the same session gives
//! an identical summary.

use std::collections::{BTreeMap, BTreeSet};

use crate::domain::models::{
    ActionItem, ActionKind, BudgetComparison, Choice, CostEstimate, DateWindow, Domain,
    DomainHighlight, DomainState, PlannerRecord, TravelerIndex, TripSummary,
};
use crate::services::result_appliers::entry_requirements::{needs_visa, result_lead_days};
use crate::services::result_appliers::format_travelers;

/// Currency assumed for a budget stated without one when the estimate is mixed.
const DEFAULT_BUDGET_CURRENCY: &str = "USD";

pub struct SummarySynthesizer;

impl SummarySynthesizer {
    pub fn synthesize(
        record: &PlannerRecord,
        states: &BTreeMap<Domain, DomainState>,
    ) -> TripSummary {
        let requested_window = record.requested_window();
        let costs = cost_estimate(states);
        let budget = budget_comparison(record, &costs);

        TripSummary {
            destination: record.trip.destination.clone().unwrap_or_default(),
            traveler_count: record.travelers.len(),
            requested_window,
            adjusted_window: adjusted_window(states.get(&Domain::Transport), requested_window),
            highlights: Domain::ALL
                .iter()
                .map(|&domain| highlight(domain, states.get(&domain)))
                .collect(),
            costs,
            budget,
            action_items: action_items(states),
        }
    }
}

/// Latest shifted transport window, if any group's dates moved.
fn adjusted_window(
    transport: Option<&DomainState>,
    requested: Option<DateWindow>,
) -> Option<DateWindow> {
    transport?
        .search_tasks
        .iter()
        .filter_map(|t| t.key.window)
        .filter(|w| Some(*w) != requested)
        .max()
}

fn selection_line(choice: &Choice) -> Option<String> {
    let selected = choice.selected.as_ref()?;
    let price = selected
        .price
        .as_ref()
        .map(|p| format!(" ({:.2} {})", p.amount, p.currency))
        .unwrap_or_default();
    Some(format!(
        "{}{price} for travelers {}",
        selected.name,
        format_travelers(&choice.travelers)
    ))
}

fn highlight(domain: Domain, state: Option<&DomainState>) -> DomainHighlight {
    let Some(state) = state else {
        return DomainHighlight {
            domain,
            summary: format!("{}: not planned", domain.label()),
            selections: Vec::new(),
            notes: vec![format!("{} did not run", domain.label())],
            degraded: true,
        };
    };

    let selections = state
        .choices
        .iter()
        .filter(|c| !c.degraded)
        .filter_map(selection_line)
        .collect();

    let mut notes: Vec<String> = state
        .choices
        .iter()
        .filter(|c| c.degraded)
        .map(|c| {
            format!(
                "missing {} data for travelers {} ({})",
                domain.data_noun(),
                format_travelers(&c.travelers),
                c.rationale
            )
        })
        .collect();
    let unresolved = state.unresolved_tasks();
    notes.extend(
        unresolved
            .iter()
            .map(|t| format!("{} has no result", t.task_id)),
    );

    DomainHighlight {
        domain,
        summary: state
            .overall_summary
            .clone()
            .unwrap_or_else(|| format!("{}: no results recorded", domain.label())),
        selections,
        degraded: !notes.is_empty(),
        notes,
    }
}

fn cost_estimate(states: &BTreeMap<Domain, DomainState>) -> CostEstimate {
    let mut costs = CostEstimate::default();
    for (domain, state) in states {
        for choice in state.choices.iter().filter(|c| !c.degraded) {
            if let Some((currency, amount)) = choice.total_price() {
                costs.add(*domain, &currency, amount);
            }
        }
    }
    costs
}

fn budget_comparison(record: &PlannerRecord, costs: &CostEstimate) -> Option<BudgetComparison> {
    let total_budget = record.preferences.total_budget?;
    let currency = record
        .preferences
        .budget_currency
        .clone()
        .or_else(|| match costs.total_by_currency.len() {
            1 => costs.total_by_currency.keys().next().cloned(),
            _ => None,
        })
        .unwrap_or_else(|| DEFAULT_BUDGET_CURRENCY.to_string());

    let estimated = costs.total_in(&currency);
    let uncompared_currencies = costs
        .total_by_currency
        .keys()
        .filter(|c| **c != currency)
        .cloned()
        .collect();

    Some(BudgetComparison {
        total_budget,
        estimated,
        remaining: total_budget - estimated,
        within_budget: estimated <= total_budget,
        currency,
        uncompared_currencies,
    })
}

fn visa_items(entry: &DomainState) -> Vec<ActionItem> {
    entry
        .choices
        .iter()
        .filter_map(|choice| {
            let result = entry.results.get(&choice.task_id)?;
            let option = result.option(&choice.selected.as_ref()?.option_id)?;
            if !needs_visa(option) {
                return None;
            }
            let lead_days = result_lead_days(result, Some(choice));
            let timing = lead_days
                .map(|d| format!(", allow {d} day(s) for processing"))
                .unwrap_or_default();
            Some(ActionItem {
                kind: ActionKind::VisaApplication,
                domain: Domain::EntryRequirements,
                description: format!(
                    "Apply for {} for travelers {}{timing}",
                    option.name,
                    format_travelers(&choice.travelers)
                ),
                travelers: choice.travelers.clone(),
                lead_days,
            })
        })
        .collect()
}

fn retry_item(domain: Domain, state: &DomainState) -> Option<ActionItem> {
    let degraded: Vec<&Choice> = state.choices.iter().filter(|c| c.degraded).collect();
    if degraded.is_empty() {
        return None;
    }
    let travelers: BTreeSet<TravelerIndex> = degraded
        .iter()
        .flat_map(|c| c.travelers.iter().copied())
        .collect();
    Some(ActionItem {
        kind: ActionKind::RetryDomain,
        domain,
        description: format!(
            "Retry {} lookups: {} task(s) returned no data",
            domain.label().to_lowercase(),
            degraded.len()
        ),
        travelers: travelers.into_iter().collect(),
        lead_days: None,
    })
}

fn book_item(domain: Domain, choice: &Choice) -> Option<ActionItem> {
    if choice.degraded {
        return None;
    }
    let selected = choice.selected.as_ref()?;
    let when = match (selected.start_date, selected.end_date) {
        (Some(start), Some(end)) => format!(" for {start}..{end}"),
        (Some(start), None) => format!(" on {start}"),
        _ => String::new(),
    };
    Some(ActionItem {
        kind: ActionKind::Book,
        domain,
        description: format!("Book {}{when}", selected.name),
        travelers: choice.travelers.clone(),
        lead_days: None,
    })
}

/// Follow-ups ordered by kind, then domain, then task order.
fn action_items(states: &BTreeMap<Domain, DomainState>) -> Vec<ActionItem> {
    let mut items = Vec::new();

    if let Some(entry) = states.get(&Domain::EntryRequirements) {
        items.extend(visa_items(entry));
    }

    items.extend(
        states
            .iter()
            .filter_map(|(domain, state)| retry_item(*domain, state)),
    );

    for (domain, state) in states {
        items.extend(state.unresolved_tasks().into_iter().map(|task| ActionItem {
            kind: ActionKind::ResolveTask,
            domain: *domain,
            description: format!("Resolve {}: no result recorded", task.task_id),
            travelers: task.key.travelers.clone(),
            lead_days: None,
        }));
    }

    for (domain, state) in states
        .iter()
        .filter(|(d, _)| **d != Domain::EntryRequirements)
    {
        items.extend(state.choices.iter().filter_map(|c| book_item(*domain, c)));
    }

    items
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;
    use crate::domain::models::{
        BudgetMode, GroupingKey, PriceBasis, SearchResult, SearchTask, SelectionKind, Traveler,
        TravelerRole, TravelOption,
    };
    use crate::services::result_appliers::applier_for;

    fn d(m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, m, day).unwrap()
    }

    fn record() -> PlannerRecord {
        let mut record = PlannerRecord::new();
        record.trip.destination = Some("London".to_string());
        record.trip.start_date = Some(d(6, 6));
        record.trip.end_date = Some(d(6, 13));
        record.preferences.budget_mode = Some(BudgetMode::Standard);
        record.preferences.total_budget = Some(2000.0);
        record.preferences.budget_currency = Some("GBP".to_string());
        record.travelers.push(Traveler::new(0, TravelerRole::Adult));
        record.travelers.push(Traveler::new(1, TravelerRole::Adult));
        record
    }

    fn state_with(domain: Domain, task: SearchTask, result: SearchResult) -> DomainState {
        let mut state = DomainState::new(domain);
        state.append_tasks(vec![task]).unwrap();
        applier_for(domain).apply(&mut state, result).unwrap();
        state.completed_passes = 1;
        state
    }

    fn states() -> BTreeMap<Domain, DomainState> {
        let mut states = BTreeMap::new();

        let mut entry = SearchResult::new("entry-ng-london-0");
        entry.options = vec![TravelOption::new("v", "UK visitor visa")
            .with_attribute("needs_visa", true)
            .with_attribute("processing_days", 21)];
        states.insert(
            Domain::EntryRequirements,
            state_with(
                Domain::EntryRequirements,
                SearchTask::new(
                    "entry-ng-london-0",
                    Domain::EntryRequirements,
                    GroupingKey::new(vec![0, 1], "NG:London", None),
                ),
                entry,
            ),
        );

        let mut flight = SearchResult::new("transport-los-lhr-0");
        flight.options = vec![TravelOption::new("f1", "LOS-LHR")
            .with_price(450.0, "GBP", PriceBasis::PerPerson)
            .with_dates(Some(d(6, 22)), Some(d(6, 29)))];
        flight.selections.insert(SelectionKind::Balanced, "f1".to_string());
        states.insert(
            Domain::Transport,
            state_with(
                Domain::Transport,
                SearchTask::new(
                    "transport-los-lhr-0",
                    Domain::Transport,
                    GroupingKey::new(vec![0, 1], "LOS-LHR", Some(DateWindow::new(d(6, 22), d(6, 29)))),
                ),
                flight,
            ),
        );

        states.insert(
            Domain::Lodging,
            state_with(
                Domain::Lodging,
                SearchTask::new(
                    "lodging-london-0",
                    Domain::Lodging,
                    GroupingKey::new(vec![0, 1], "London", Some(DateWindow::new(d(6, 22), d(6, 29)))),
                ),
                SearchResult::stub("lodging-london-0", "capability call timed out"),
            ),
        );
        states
    }

    #[test]
    fn test_summary_costs_and_budget() {
        let summary = SummarySynthesizer::synthesize(&record(), &states());

        assert_eq!(summary.costs.total_in("GBP"), 900.0);
        assert_eq!(summary.costs.domain_total(Domain::Lodging, "GBP"), 0.0);
        let budget = summary.budget.unwrap();
        assert_eq!(budget.remaining, 1100.0);
        assert!(budget.within_budget);
        assert_eq!(
            summary.adjusted_window,
            Some(DateWindow::new(d(6, 22), d(6, 29)))
        );
    }

    #[test]
    fn test_degraded_and_missing_domains_are_noted() {
        let summary = SummarySynthesizer::synthesize(&record(), &states());

        let lodging = summary.highlight(Domain::Lodging).unwrap();
        assert!(lodging.degraded);
        assert!(lodging.notes[0].starts_with("missing lodging data for travelers [0, 1]"));

        let activities = summary.highlight(Domain::Activities).unwrap();
        assert!(activities.degraded);
        assert!(summary.is_degraded());
    }

    #[test]
    fn test_action_items() {
        let summary = SummarySynthesizer::synthesize(&record(), &states());
        let kinds: Vec<ActionKind> = summary.action_items.iter().map(|a| a.kind).collect();
        assert_eq!(
            kinds,
            vec![
                ActionKind::VisaApplication,
                ActionKind::RetryDomain,
                ActionKind::Book
            ]
        );
        assert_eq!(summary.action_items[0].lead_days, Some(21));
        assert_eq!(summary.action_items[1].domain, Domain::Lodging);
        assert_eq!(summary.action_items[2].description, "Book LOS-LHR for 2025-06-22..2025-06-29");
    }

    #[test]
    fn test_deterministic() {
        let states = states();
        assert_eq!(
            SummarySynthesizer::synthesize(&record(), &states),
            SummarySynthesizer::synthesize(&record(), &states)
        );
    }
}
