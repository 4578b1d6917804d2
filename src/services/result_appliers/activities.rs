use super::ResultApplier;
use crate::domain::models::{Choice, Domain, SearchResult, SearchTask};

#[derive(Debug, Clone, Copy, Default)]
pub struct ActivitiesApplier;

impl ResultApplier for ActivitiesApplier {
    fn domain(&self) -> Domain {
        Domain::Activities
    }

    fn detail(&self, task: &SearchTask, result: &SearchResult, _choice: &Choice) -> Option<String> {
        let window = task.key.window?;
        let slots = task
            .parameters
            .get("slots_per_day")
            .and_then(serde_json::Value::as_u64)
            .unwrap_or(1);
        Some(format!(
            "days {window}, {slots} slot(s) per day, {} idea(s)",
            result.options.len()
        ))
    }
}
