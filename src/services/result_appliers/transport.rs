use super::ResultApplier;
use crate::domain::models::{Choice, Domain, SearchResult, SearchTask};

#[derive(Debug, Clone, Copy, Default)]
pub struct TransportApplier;

impl ResultApplier for TransportApplier {
    fn domain(&self) -> Domain {
        Domain::Transport
    }

    fn detail(&self, task: &SearchTask, _result: &SearchResult, choice: &Choice) -> Option<String> {
        let window = task.key.window?;
        let mut detail = format!("travel {window}");
        if let Some(duration) = choice
            .selected
            .as_ref()
            .and_then(|s| s.start_date.zip(s.end_date))
            .map(|(start, end)| format!(", selected {start}..{end}"))
        {
            detail.push_str(&duration);
        }
        if task.parameter_str("adjustment_reason").is_some() {
            detail.push_str(" (shifted for entry requirements)");
        }
        Some(detail)
    }
}
