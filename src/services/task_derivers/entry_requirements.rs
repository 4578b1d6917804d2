use serde_json::json;

use super::{group_ordered, DeriveContext, Derivation, TaskBatch, TaskDeriver};
use crate::domain::models::{Domain, DomainState, GroupingKey, SearchTask, SelectionKind};

/// Entry-requirement lookups, one per (nationality, destination).
///
/// Independent of every other domain.
#[derive(Debug, Clone, Copy, Default)]
pub struct EntryRequirementsDeriver;

impl TaskDeriver for EntryRequirementsDeriver {
    fn domain(&self) -> Domain {
        Domain::EntryRequirements
    }

    fn derive(&self, ctx: &DeriveContext<'_>, existing: &DomainState) -> Derivation {
        let record = ctx.record;
        let mut batch = TaskBatch::new(existing);

        let Some(destination) = record.trip.destination.as_deref() else {
            return batch.finish();
        };

        let groups = group_ordered(record.travelers.iter(), |t| {
            t.nationality.clone().unwrap_or_else(|| "unknown".to_string())
        });

        for (nationality, members) in groups {
            let key = GroupingKey::new(
                members.iter().map(|t| t.index).collect(),
                format!("{nationality}:{destination}"),
                record.requested_window(),
            );

            batch.push(key, |task_id, key| {
                SearchTask::new(task_id, Domain::EntryRequirements, key)
                    .with_parameter("nationality", nationality.as_str())
                    .with_parameter("destination", destination)
                    .with_parameter("origin", json!(record.trip.origin))
                    .with_parameter("travel_purpose", "tourism")
                    .with_parameter(
                        "start_date",
                        json!(record.trip.start_date.map(|d| d.to_string())),
                    )
                    .with_parameter(
                        "end_date",
                        json!(record.trip.end_date.map(|d| d.to_string())),
                    )
                    .with_preference(vec![SelectionKind::Chosen])
            });
        }

        batch.finish()
    }
}
