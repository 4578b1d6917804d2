use super::ResultApplier;
use crate::domain::models::{Choice, Domain, SearchResult, SearchTask};

#[derive(Debug, Clone, Copy, Default)]
pub struct LodgingApplier;

impl ResultApplier for LodgingApplier {
    fn domain(&self) -> Domain {
        Domain::Lodging
    }

    fn detail(&self, task: &SearchTask, result: &SearchResult, choice: &Choice) -> Option<String> {
        let window = task.key.window?;
        let mut detail = format!("stay {window}");
        let neighborhood = choice
            .selected
            .as_ref()
            .and_then(|s| result.option(&s.option_id))
            .and_then(|o| o.attributes.get("neighborhood"))
            .and_then(serde_json::Value::as_str);
        if let Some(neighborhood) = neighborhood {
            detail.push_str(&format!(" in {neighborhood}"));
        }
        Some(detail)
    }
}
