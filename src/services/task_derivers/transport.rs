use chrono::{Duration, NaiveDate};
use serde_json::json;

use super::{group_ordered, DeriveContext, Derivation, TaskBatch, TaskDeriver};
use crate::domain::models::{
    BudgetMode, DateWindow, Domain, DomainState, GroupingKey, PlannerRecord, SearchTask,
    SelectionKind, TravelerRole,
};
use crate::services::result_appliers::entry_requirements::lead_days_for;

/// Days added when a shifted start reaches the requested end and the
/// requested trip length is unusable.
const MIN_SHIFTED_TRIP_DAYS: i64 = 3;

/// Outcome of applying an entry-requirement lead time to the requested window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TravelWindow {
    pub requested: DateWindow,
    pub effective: DateWindow,
    pub lead_days: u32,
}

impl TravelWindow {
    pub fn shifted(&self) -> bool {
        self.effective.start != self.requested.start
    }
}

/// Shift the requested window so departure is no earlier than
/// `planning_date + lead_days`. Never moves the start earlier.
pub fn shift_window(
    requested: DateWindow,
    planning_date: NaiveDate,
    lead_days: u32,
    flexible_dates: bool,
) -> TravelWindow {
    let safe_departure = planning_date + Duration::days(i64::from(lead_days));
    if safe_departure <= requested.start {
        return TravelWindow {
            requested,
            effective: requested,
            lead_days,
        };
    }

    let length = requested.end - requested.start;
    let end = if safe_departure >= requested.end {
        let length = if length.num_days() <= 0 {
            Duration::days(MIN_SHIFTED_TRIP_DAYS)
        } else {
            length
        };
        safe_departure + length
    } else if flexible_dates {
        safe_departure + length
    } else {
        requested.end
    };

    TravelWindow {
        requested,
        effective: DateWindow::new(safe_departure, end),
        lead_days,
    }
}

fn cabin_for(budget: Option<BudgetMode>) -> &'static str {
    match budget {
        Some(BudgetMode::Luxury) => "business",
        _ => "economy",
    }
}

fn preference_for(budget: Option<BudgetMode>) -> Vec<SelectionKind> {
    match budget {
        Some(BudgetMode::Economy) => vec![SelectionKind::Cheapest],
        Some(BudgetMode::Luxury) => vec![SelectionKind::Fastest],
        _ => vec![SelectionKind::Balanced],
    }
}

fn count_role(record: &PlannerRecord, indexes: &[u32], role: TravelerRole) -> usize {
    indexes
        .iter()
        .filter_map(|&i| record.traveler(i))
        .filter(|t| t.role == role)
        .count()
}

/// Round-trip transport searches, one per (departure point, arrival point).
///
/// Requires entry requirements to be settled: the worst lead time among a
/// group's travelers decides the earliest safe departure.
#[derive(Debug, Clone, Copy, Default)]
pub struct TransportDeriver;

impl TaskDeriver for TransportDeriver {
    fn domain(&self) -> Domain {
        Domain::Transport
    }

    fn upstream(&self) -> &'static [Domain] {
        &[Domain::EntryRequirements]
    }

    fn derive(&self, ctx: &DeriveContext<'_>, existing: &DomainState) -> Derivation {
        let entry = match ctx.settled(Domain::EntryRequirements) {
            Ok(state) => state,
            Err(reason) => return Derivation::UpstreamNotReady(reason),
        };

        let record = ctx.record;
        let mut batch = TaskBatch::new(existing);

        let (Some(arrival), Some(requested)) = (record.arrival_point(), record.requested_window())
        else {
            return batch.finish();
        };

        let groups = group_ordered(record.travelers.iter(), |t| {
            record
                .departure_point(t)
                .unwrap_or_else(|| "unknown".to_string())
        });

        for (departure, members) in groups {
            let indexes: Vec<u32> = members.iter().map(|t| t.index).collect();
            let lead_days = indexes
                .iter()
                .filter_map(|&i| lead_days_for(entry, i))
                .max()
                .unwrap_or(0);
            let window = shift_window(
                requested,
                ctx.planning_date,
                lead_days,
                record.trip.flexible_dates,
            );

            let key = GroupingKey::new(
                indexes.clone(),
                format!("{departure}-{arrival}"),
                Some(window.effective),
            );

            batch.push(key, |task_id, key| {
                let mut task = SearchTask::new(task_id, Domain::Transport, key)
                    .with_parameter("origin", departure.as_str())
                    .with_parameter("destination", arrival.as_str())
                    .with_parameter("original_departure_date", requested.start.to_string())
                    .with_parameter("original_return_date", requested.end.to_string())
                    .with_parameter("departure_date", window.effective.start.to_string())
                    .with_parameter("return_date", window.effective.end.to_string())
                    .with_parameter("lead_days", lead_days)
                    .with_parameter("cabin", cabin_for(record.preferences.budget_mode))
                    .with_parameter(
                        "budget_mode",
                        json!(record.preferences.budget_mode.map(|b| b.as_str())),
                    )
                    .with_parameter(
                        "adults",
                        count_role(record, &indexes, TravelerRole::Adult)
                            + count_role(record, &indexes, TravelerRole::Senior),
                    )
                    .with_parameter(
                        "children",
                        count_role(record, &indexes, TravelerRole::Child),
                    )
                    .with_parameter(
                        "transport_preferences",
                        json!(record.preferences.transport_preferences),
                    )
                    .with_preference(preference_for(record.preferences.budget_mode));
                if window.shifted() {
                    task = task.with_parameter(
                        "adjustment_reason",
                        format!(
                            "departure moved to {} to respect entry-requirement processing of {lead_days} day(s)",
                            window.effective.start
                        ),
                    );
                }
                task
            });
        }

        batch.finish()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::domain::models::{SearchResult, Traveler};

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn test_shift_window_never_earlier() {
        let requested = DateWindow::new(d(2025, 6, 10), d(2025, 6, 17));
        let window = shift_window(requested, d(2025, 6, 1), 3, false);
        assert_eq!(window.effective, requested);
        assert!(!window.shifted());
    }

    #[test]
    fn test_shift_window_keeps_end_when_inflexible() {
        let requested = DateWindow::new(d(2025, 6, 10), d(2025, 6, 20));
        let window = shift_window(requested, d(2025, 6, 1), 14, false);
        assert_eq!(window.effective, DateWindow::new(d(2025, 6, 15), d(2025, 6, 20)));
    }

    #[test]
    fn test_shift_window_preserves_length_when_flexible() {
        let requested = DateWindow::new(d(2025, 6, 10), d(2025, 6, 20));
        let window = shift_window(requested, d(2025, 6, 1), 14, true);
        assert_eq!(window.effective, DateWindow::new(d(2025, 6, 15), d(2025, 6, 25)));
    }

    #[test]
    fn test_shift_window_past_requested_end() {
        let requested = DateWindow::new(d(2025, 6, 6), d(2025, 6, 13));
        let window = shift_window(requested, d(2025, 6, 1), 30, false);
        assert_eq!(window.effective, DateWindow::new(d(2025, 7, 1), d(2025, 7, 8)));

        let same_day = DateWindow::new(d(2025, 6, 6), d(2025, 6, 6));
        let window = shift_window(same_day, d(2025, 6, 1), 30, false);
        assert_eq!(window.effective, DateWindow::new(d(2025, 7, 1), d(2025, 7, 4)));
    }

    fn record() -> PlannerRecord {
        let mut record = PlannerRecord::new();
        record.trip.destination = Some("London".to_string());
        record.hubs.destination = Some("LHR".to_string());
        record.trip.origin = Some("Lagos".to_string());
        record.trip.start_date = Some(d(2025, 6, 6));
        record.trip.end_date = Some(d(2025, 6, 13));
        record.preferences.budget_mode = Some(BudgetMode::Luxury);
        for i in 0..3 {
            let mut t = Traveler::new(i, TravelerRole::Adult);
            t.nationality = Some("NG".to_string());
            if i == 2 {
                t.origin_hub = Some("ABV".to_string());
            }
            record.travelers.push(t);
        }
        record
    }

    #[test]
    fn test_requires_settled_entry_requirements() {
        let record = record();
        let upstream = BTreeMap::new();
        let ctx = DeriveContext::new(&record, &upstream, d(2025, 6, 1));

        let derivation = TransportDeriver.derive(&ctx, &DomainState::new(Domain::Transport));
        assert!(matches!(derivation, Derivation::UpstreamNotReady(_)));
    }

    #[test]
    fn test_groups_by_departure_point() {
        let record = record();
        let mut entry = DomainState::new(Domain::EntryRequirements);
        entry.completed_passes = 1;
        let mut upstream = BTreeMap::new();
        upstream.insert(Domain::EntryRequirements, entry);
        let ctx = DeriveContext::new(&record, &upstream, d(2025, 6, 1));

        let derivation = TransportDeriver.derive(&ctx, &DomainState::new(Domain::Transport));
        let tasks = derivation.tasks();

        assert_eq!(tasks.len(), 2);
        assert_eq!(tasks[0].task_id, "transport-lagos-lhr-0");
        assert_eq!(tasks[0].key.travelers, vec![0, 1]);
        assert_eq!(tasks[1].task_id, "transport-abv-lhr-1");
        assert_eq!(tasks[0].parameter_str("cabin"), Some("business"));
        assert_eq!(tasks[0].key.window.map(|w| w.start), Some(d(2025, 6, 6)));
    }

    #[test]
    fn test_lead_time_shifts_group_window() {
        let record = record();
        let mut entry = DomainState::new(Domain::EntryRequirements);
        entry
            .append_tasks(vec![SearchTask::new(
                "entry-ng-london-0",
                Domain::EntryRequirements,
                GroupingKey::new(vec![0, 1, 2], "NG:London", None),
            )])
            .unwrap();
        let mut result = SearchResult::new("entry-ng-london-0");
        result
            .hints
            .insert("processing_time".to_string(), "15-30 business days".to_string());
        entry.results.insert("entry-ng-london-0".to_string(), result);
        entry.completed_passes = 1;

        let mut upstream = BTreeMap::new();
        upstream.insert(Domain::EntryRequirements, entry);
        let ctx = DeriveContext::new(&record, &upstream, d(2025, 6, 1));

        let derivation = TransportDeriver.derive(&ctx, &DomainState::new(Domain::Transport));
        let task = &derivation.tasks()[0];

        assert_eq!(task.parameter_date("departure_date"), Some(d(2025, 7, 1)));
        assert_eq!(task.parameter_date("original_departure_date"), Some(d(2025, 6, 6)));
        assert!(task.parameter_str("adjustment_reason").is_some());
    }
}
