use std::collections::BTreeSet;

use chrono::Duration;
use serde_json::json;

use super::{DeriveContext, Derivation, TaskBatch, TaskDeriver};
use crate::domain::models::{
    DateWindow, Domain, DomainState, GroupingKey, Pace, PlannerRecord, SearchTask, SelectionKind,
    TravelerIndex,
};

const SLOTS: [&str; 3] = ["morning", "afternoon", "evening"];

fn slot_names(pace: Pace) -> Vec<&'static str> {
    SLOTS[..usize::from(pace.slots_per_day())].to_vec()
}

/// Split an inclusive stay into consecutive chunks of at most `chunk_days` days.
pub fn day_chunks(stay: DateWindow, chunk_days: u32) -> Vec<DateWindow> {
    let chunk = i64::from(chunk_days.max(1));
    let mut chunks = Vec::new();
    let mut start = stay.start;
    let end = stay.end.max(stay.start);
    while start <= end {
        let chunk_end = (start + Duration::days(chunk - 1)).min(end);
        chunks.push(DateWindow::new(start, chunk_end));
        start = chunk_end + Duration::days(1);
    }
    chunks
}

fn union_interests(record: &PlannerRecord, travelers: &[TravelerIndex]) -> Vec<String> {
    let mut interests: BTreeSet<String> = record.preferences.interests.iter().cloned().collect();
    for traveler in travelers.iter().filter_map(|&i| record.traveler(i)) {
        interests.extend(traveler.interests.iter().cloned());
    }
    interests.into_iter().collect()
}

/// Day-by-day activity searches over each lodging stay.
///
/// Requires lodging to be settled: stays and base locations come from the
/// lodging choices.
#[derive(Debug, Clone, Copy)]
pub struct ActivitiesDeriver {
    chunk_days: u32,
}

impl ActivitiesDeriver {
    pub fn new(chunk_days: u32) -> Self {
        Self {
            chunk_days: chunk_days.max(1),
        }
    }
}

impl Default for ActivitiesDeriver {
    fn default() -> Self {
        Self::new(3)
    }
}

impl TaskDeriver for ActivitiesDeriver {
    fn domain(&self) -> Domain {
        Domain::Activities
    }

    fn upstream(&self) -> &'static [Domain] {
        &[Domain::Lodging]
    }

    fn derive(&self, ctx: &DeriveContext<'_>, existing: &DomainState) -> Derivation {
        let lodging = match ctx.settled(Domain::Lodging) {
            Ok(state) => state,
            Err(reason) => return Derivation::UpstreamNotReady(reason),
        };

        let record = ctx.record;
        let prefs = &record.preferences;
        let mut batch = TaskBatch::new(existing);

        for stay_task in &lodging.search_tasks {
            let Some(task_window) = stay_task.key.window else {
                continue;
            };
            let selected = lodging
                .choice(&stay_task.task_id)
                .and_then(|c| c.selected.as_ref());
            let stay = DateWindow::new(
                selected.and_then(|s| s.start_date).unwrap_or(task_window.start),
                selected.and_then(|s| s.end_date).unwrap_or(task_window.end),
            );
            let base_location = selected.map(|s| s.name.clone());

            let travelers = stay_task.key.travelers.clone();
            let members: Vec<_> = travelers
                .iter()
                .filter_map(|&i| record.traveler(i))
                .collect();
            let has_children = members.iter().any(|t| t.is_child());
            let has_mobility_constraints =
                members.iter().any(|t| !t.constraints.mobility.is_empty());
            let dietary: BTreeSet<String> = members
                .iter()
                .flat_map(|t| t.constraints.dietary.iter().cloned())
                .collect();
            let interests = union_interests(record, &travelers);
            let preference = if has_children {
                vec![SelectionKind::FamilyFriendly]
            } else {
                vec![SelectionKind::Balanced]
            };

            for chunk in day_chunks(stay, self.chunk_days) {
                let key = GroupingKey::new(
                    travelers.clone(),
                    stay_task.key.location.clone(),
                    Some(chunk),
                );
                batch.push(key, |task_id, key| {
                    SearchTask::new(task_id, Domain::Activities, key)
                        .with_parameter("location", stay_task.key.location.as_str())
                        .with_parameter("base_location", json!(base_location))
                        .with_parameter("start_date", chunk.start.to_string())
                        .with_parameter("end_date", chunk.end.to_string())
                        .with_parameter("days", chunk.nights() + 1)
                        .with_parameter("pace", prefs.pace.as_str())
                        .with_parameter("slots_per_day", prefs.pace.slots_per_day())
                        .with_parameter("slots", json!(slot_names(prefs.pace)))
                        .with_parameter("interests", json!(interests))
                        .with_parameter("must_do", json!(prefs.must_do))
                        .with_parameter("nice_to_have", json!(prefs.nice_to_have))
                        .with_parameter("has_children", has_children)
                        .with_parameter("has_mobility_constraints", has_mobility_constraints)
                        .with_parameter("dietary", json!(dietary))
                        .with_preference(preference.clone())
                });
            }
        }

        batch.finish()
    }
}
