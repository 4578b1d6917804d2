use serde_json::json;

use super::{group_ordered, DeriveContext, Derivation, TaskBatch, TaskDeriver};
use crate::domain::models::{
    BudgetMode, DateWindow, Domain, DomainState, GroupingKey, SearchTask, SelectionKind,
    Traveler, TravelerIndex,
};

/// Arrival and departure of one traveler according to transport state.
fn travel_dates(transport: &DomainState, traveler: TravelerIndex) -> Option<DateWindow> {
    let task = transport
        .search_tasks
        .iter()
        .find(|t| t.covers(traveler))?;
    let window = task.key.window?;
    let selected = transport
        .choice(&task.task_id)
        .and_then(|c| c.selected.as_ref());

    let arrival = selected.and_then(|s| s.start_date).unwrap_or(window.start);
    let departure = selected.and_then(|s| s.end_date).unwrap_or(window.end);
    Some(DateWindow::new(arrival, departure.max(arrival)))
}

/// Travelers grouped by shared stay window, in traveler order.
///
/// A traveler's stay runs from their transport arrival to their return
/// departure; travelers without transport dates use `fallback`.
pub fn stay_groups(
    transport: &DomainState,
    travelers: &[TravelerIndex],
    fallback: Option<DateWindow>,
) -> Vec<(DateWindow, Vec<TravelerIndex>)> {
    group_ordered(travelers.iter().copied(), |&t| {
        travel_dates(transport, t).or(fallback)
    })
    .into_iter()
    .filter_map(|(window, members)| window.map(|w| (w, members)))
    .collect()
}

/// Lodging searches at the destination, one per traveler group sharing a
/// stay window.
///
/// Requires transport to be settled: check-in follows each group's arrival.
#[derive(Debug, Clone, Copy, Default)]
pub struct LodgingDeriver;

impl TaskDeriver for LodgingDeriver {
    fn domain(&self) -> Domain {
        Domain::Lodging
    }

    fn upstream(&self) -> &'static [Domain] {
        &[Domain::Transport]
    }

    fn derive(&self, ctx: &DeriveContext<'_>, existing: &DomainState) -> Derivation {
        let transport = match ctx.settled(Domain::Transport) {
            Ok(state) => state,
            Err(reason) => return Derivation::UpstreamNotReady(reason),
        };

        let record = ctx.record;
        let mut batch = TaskBatch::new(existing);

        let Some(destination) = record.trip.destination.clone() else {
            return batch.finish();
        };

        let indexes: Vec<TravelerIndex> = record.travelers.iter().map(|t| t.index).collect();
        let prefs = &record.preferences;

        for (stay, members) in stay_groups(transport, &indexes, record.requested_window()) {
            let travelers: Vec<&Traveler> =
                members.iter().filter_map(|&i| record.traveler(i)).collect();

            let has_children = travelers.iter().any(|t| t.is_child());
            let mut preference = Vec::new();
            if has_children {
                preference.push(SelectionKind::FamilyFriendly);
            }
            if prefs.budget_mode == Some(BudgetMode::Luxury) {
                preference.push(SelectionKind::Luxury);
            }
            if preference.is_empty() {
                preference.push(SelectionKind::Balanced);
            }

            let special_requirements: Vec<String> = travelers
                .iter()
                .flat_map(|t| {
                    t.constraints
                        .mobility
                        .iter()
                        .chain(t.constraints.sensory.iter())
                        .cloned()
                })
                .collect();

            let guests = members.len();
            let key = GroupingKey::new(members, destination.clone(), Some(stay));
            batch.push(key, |task_id, key| {
                SearchTask::new(task_id, Domain::Lodging, key)
                    .with_parameter("location", destination.as_str())
                    .with_parameter("check_in_date", stay.start.to_string())
                    .with_parameter("check_out_date", stay.end.to_string())
                    .with_parameter("nights", stay.nights())
                    .with_parameter("guests", guests)
                    .with_parameter("has_children", has_children)
                    .with_parameter("budget_mode", json!(prefs.budget_mode.map(|b| b.as_str())))
                    .with_parameter(
                        "neighborhood_preferences",
                        json!(prefs.neighborhood_preferences),
                    )
                    .with_parameter("neighborhood_avoid", json!(prefs.neighborhood_avoid))
                    .with_parameter("room_configuration", json!(prefs.room_configuration))
                    .with_parameter("special_requirements", json!(special_requirements))
                    .with_preference(preference)
            });
        }

        batch.finish()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use chrono::NaiveDate;

    use super::*;
    use crate::domain::models::{Choice, PlannerRecord, SelectedOption, TravelerRole};

    fn d(m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, m, day).unwrap()
    }

    fn record() -> PlannerRecord {
        let mut record = PlannerRecord::new();
        record.trip.destination = Some("London".to_string());
        record.trip.start_date = Some(d(6, 6));
        record.trip.end_date = Some(d(6, 13));
        record.travelers.push(Traveler::new(0, TravelerRole::Adult));
        record.travelers.push(Traveler::new(1, TravelerRole::Child));
        record
    }

    fn transport() -> DomainState {
        let mut state = DomainState::new(Domain::Transport);
        state
            .append_tasks(vec![
                SearchTask::new(
                    "transport-a-0",
                    Domain::Transport,
                    GroupingKey::new(vec![0], "A-LHR", Some(DateWindow::new(d(6, 6), d(6, 13)))),
                ),
                SearchTask::new(
                    "transport-b-1",
                    Domain::Transport,
                    GroupingKey::new(vec![1], "B-LHR", Some(DateWindow::new(d(6, 6), d(6, 13)))),
                ),
            ])
            .unwrap();
        state.choices.push(Choice {
            task_id: "transport-b-1".to_string(),
            travelers: vec![1],
            selected: Some(SelectedOption {
                option_id: "f1".to_string(),
                name: "Late flight".to_string(),
                selection: None,
                price: None,
                start_date: Some(d(6, 8)),
                end_date: Some(d(6, 14)),
            }),
            alternatives: vec![],
            rationale: String::new(),
            degraded: false,
        });
        state.completed_passes = 1;
        state
    }

    fn settled(mut transport: DomainState) -> BTreeMap<Domain, DomainState> {
        let ids: Vec<String> = transport.search_tasks.iter().map(|t| t.task_id.clone()).collect();
        for id in ids {
            transport
                .results
                .insert(id.clone(), crate::domain::models::SearchResult::new(id));
        }
        BTreeMap::from([(Domain::Transport, transport)])
    }

    #[test]
    fn test_stay_groups_follow_transport_dates() {
        let groups = stay_groups(&transport(), &[0, 1, 2], Some(DateWindow::new(d(6, 6), d(6, 13))));
        assert_eq!(
            groups,
            vec![
                (DateWindow::new(d(6, 6), d(6, 13)), vec![0, 2]),
                (DateWindow::new(d(6, 8), d(6, 14)), vec![1]),
            ]
        );
    }

    #[test]
    fn test_one_task_per_stay_window() {
        let record = record();
        let upstream = settled(transport());
        let ctx = DeriveContext::new(&record, &upstream, d(6, 1));

        let derivation = LodgingDeriver.derive(&ctx, &DomainState::new(Domain::Lodging));
        let tasks = derivation.tasks();

        assert_eq!(tasks.len(), 2);
        assert_eq!(tasks[0].task_id, "lodging-london-0");
        assert_eq!(tasks[0].travelers(), &[0]);
        assert_eq!(tasks[0].parameter_date("check_in_date"), Some(d(6, 6)));
        assert_eq!(tasks[0].preference, vec![SelectionKind::Balanced]);

        assert_eq!(tasks[1].task_id, "lodging-london-1");
        assert_eq!(tasks[1].travelers(), &[1]);
        assert_eq!(tasks[1].parameter_date("check_in_date"), Some(d(6, 8)));
        assert_eq!(tasks[1].parameter_date("check_out_date"), Some(d(6, 14)));
        assert_eq!(tasks[1].preference, vec![SelectionKind::FamilyFriendly]);
    }

    #[test]
    fn test_shared_stay_is_one_task() {
        let record = record();
        let mut transport = transport();
        transport.choices.clear();
        let upstream = settled(transport);
        let ctx = DeriveContext::new(&record, &upstream, d(6, 1));

        let derivation = LodgingDeriver.derive(&ctx, &DomainState::new(Domain::Lodging));
        let tasks = derivation.tasks();

        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].travelers(), &[0, 1]);
        assert_eq!(tasks[0].preference, vec![SelectionKind::FamilyFriendly]);
        assert_eq!(tasks[0].parameter_date("check_in_date"), Some(d(6, 6)));
        assert_eq!(tasks[0].parameters["guests"], 2);

        // Re-deriving over the derived task adds nothing.
        let mut lodging = DomainState::new(Domain::Lodging);
        lodging.append_tasks(tasks.to_vec()).unwrap();
        assert!(LodgingDeriver.derive(&ctx, &lodging).tasks().is_empty());
    }

    #[test]
    fn test_waits_for_transport() {
        let record = record();
        let mut upstream = BTreeMap::new();
        upstream.insert(Domain::Transport, DomainState::new(Domain::Transport));
        let ctx = DeriveContext::new(&record, &upstream, d(6, 1));

        assert!(matches!(
            LodgingDeriver.derive(&ctx, &DomainState::new(Domain::Lodging)),
            Derivation::UpstreamNotReady(_)
        ));
    }
}
