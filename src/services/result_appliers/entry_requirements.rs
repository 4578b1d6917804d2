//! Entry-requirement results: visa needs and processing lead times.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use regex::Regex;

use super::ResultApplier;
use crate::domain::models::{
    Choice, Domain, DomainState, SearchResult, SearchTask, TravelOption, TravelerIndex,
};

/// Bounds for an extracted processing time, in days.
pub const MIN_LEAD_DAYS: u32 = 1;
pub const MAX_LEAD_DAYS: u32 = 120;

const PROCESSING_TIME_HINT: &str = "processing_time";
const PROCESSING_DAYS_ATTR: &str = "processing_days";
const NEEDS_VISA_ATTRS: [&str; 2] = ["needs_visa", "visa_required"];

fn digits() -> Option<&'static Regex> {
    static DIGITS: OnceLock<Option<Regex>> = OnceLock::new();
    DIGITS.get_or_init(|| Regex::new(r"\d+").ok()).as_ref()
}

/// Largest integer in free text such as `"15-30 business days"`, clamped.
pub fn parse_processing_days(text: &str) -> Option<u32> {
    digits()?
        .find_iter(text)
        .filter_map(|m| m.as_str().parse::<u64>().ok())
        .max()
        .map(clamp_days)
}

fn clamp_days(days: u64) -> u32 {
    u32::try_from(days)
        .unwrap_or(MAX_LEAD_DAYS)
        .clamp(MIN_LEAD_DAYS, MAX_LEAD_DAYS)
}

fn attribute_days(option: &TravelOption) -> Option<u32> {
    match option.attributes.get(PROCESSING_DAYS_ATTR)? {
        serde_json::Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().map(|f| f.max(0.0).ceil() as u64))
            .map(clamp_days),
        serde_json::Value::String(s) => parse_processing_days(s),
        _ => None,
    }
}

/// Whether an option says a visa is needed.
pub fn needs_visa(option: &TravelOption) -> bool {
    NEEDS_VISA_ATTRS
        .iter()
        .filter_map(|attr| option.attributes.get(*attr))
        .any(|value| match value {
            serde_json::Value::Bool(b) => *b,
            serde_json::Value::String(s) => {
                matches!(s.to_ascii_lowercase().as_str(), "true" | "yes" | "required")
            }
            _ => false,
        })
}

fn selected_option<'a>(result: &'a SearchResult, choice: Option<&Choice>) -> Option<&'a TravelOption> {
    let id = &choice?.selected.as_ref()?.option_id;
    result.option(id)
}

/// Lead days implied by a result: the processing-time hint and the selected
/// option's processing days, whichever is larger.
pub fn result_lead_days(result: &SearchResult, choice: Option<&Choice>) -> Option<u32> {
    if result.degraded {
        return None;
    }
    let from_hint = result
        .hints
        .get(PROCESSING_TIME_HINT)
        .and_then(|h| parse_processing_days(h));
    let from_option = selected_option(result, choice).and_then(attribute_days);
    from_hint.max(from_option)
}

/// Worst-case lead days for one traveler across the tasks covering them.
pub fn lead_days_for(state: &DomainState, traveler: TravelerIndex) -> Option<u32> {
    state
        .search_tasks
        .iter()
        .filter(|t| t.covers(traveler))
        .filter_map(|t| {
            let result = state.results.get(&t.task_id)?;
            result_lead_days(result, state.choice(&t.task_id))
        })
        .max()
}

/// Traveler to lead days, for travelers with a known processing time.
pub fn lead_days_by_traveler(state: &DomainState) -> BTreeMap<TravelerIndex, u32> {
    let mut leads = BTreeMap::new();
    for task in &state.search_tasks {
        for &traveler in &task.key.travelers {
            if let Some(days) = lead_days_for(state, traveler) {
                leads.insert(traveler, days);
            }
        }
    }
    leads
}

/// Travelers whose selected entry option needs a visa, sorted.
pub fn travelers_needing_visa(state: &DomainState) -> Vec<TravelerIndex> {
    let mut travelers: Vec<TravelerIndex> = state
        .choices
        .iter()
        .filter(|choice| {
            state
                .results
                .get(&choice.task_id)
                .and_then(|r| selected_option(r, Some(choice)))
                .is_some_and(needs_visa)
        })
        .flat_map(|c| c.travelers.iter().copied())
        .collect();
    travelers.sort_unstable();
    travelers.dedup();
    travelers
}

#[derive(Debug, Clone, Copy, Default)]
pub struct EntryRequirementsApplier;

impl ResultApplier for EntryRequirementsApplier {
    fn domain(&self) -> Domain {
        Domain::EntryRequirements
    }

    fn detail(&self, _task: &SearchTask, result: &SearchResult, choice: &Choice) -> Option<String> {
        let visa = selected_option(result, Some(choice)).map(|o| {
            if needs_visa(o) {
                "visa required"
            } else {
                "no visa required"
            }
        });
        let lead = result_lead_days(result, Some(choice)).map(|d| format!("processing {d} day(s)"));
        match (visa, lead) {
            (Some(v), Some(l)) => Some(format!("{v}, {l}")),
            (Some(v), None) => Some(v.to_string()),
            (None, Some(l)) => Some(l),
            (None, None) => None,
        }
    }

    fn notes(&self, state: &DomainState) -> Vec<String> {
        let mut notes = Vec::new();

        let leads = lead_days_by_traveler(state);
        if let Some(max) = leads.values().max() {
            let detail: Vec<String> = leads
                .iter()
                .map(|(traveler, days)| format!("{traveler}: {days}d"))
                .collect();
            notes.push(format!(
                "Longest processing lead time: {max} day(s) ({})",
                detail.join(", ")
            ));
        }

        let visas = travelers_needing_visa(state);
        if !visas.is_empty() {
            notes.push(format!(
                "Travelers needing visas: {}",
                super::format_travelers(&visas)
            ));
        }

        notes
    }
}
