//! Per-domain planning state.
//!
//! Each planning domain owns one [`DomainState`]: the tasks derived for it,
//! the results recorded against those tasks, and the choices and summary
//! computed from the results. Tasks and results are append-only; tasks only
//! ever change status.

use std::collections::BTreeMap;
use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::planner::{DateWindow, TravelerIndex};
use crate::domain::errors::{DomainError, DomainResult};

/// A planning concern with its own pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Domain {
    EntryRequirements,
    Transport,
    Lodging,
    Activities,
}

impl Domain {
    pub const ALL: [Domain; 4] = [
        Domain::EntryRequirements,
        Domain::Transport,
        Domain::Lodging,
        Domain::Activities,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::EntryRequirements => "entry_requirements",
            Self::Transport => "transport",
            Self::Lodging => "lodging",
            Self::Activities => "activities",
        }
    }

    /// Prefix used for task ids.
    pub fn task_prefix(&self) -> &'static str {
        match self {
            Self::EntryRequirements => "entry",
            Self::Transport => "transport",
            Self::Lodging => "lodging",
            Self::Activities => "activity",
        }
    }

    /// Human-facing heading for summaries.
    pub fn label(&self) -> &'static str {
        match self {
            Self::EntryRequirements => "Entry requirements",
            Self::Transport => "Transport",
            Self::Lodging => "Lodging",
            Self::Activities => "Activities",
        }
    }

    /// Noun used when describing missing data ("missing lodging data").
    pub fn data_noun(&self) -> &'static str {
        match self {
            Self::EntryRequirements => "entry-requirement",
            Self::Transport => "transport",
            Self::Lodging => "lodging",
            Self::Activities => "activity",
        }
    }

    pub fn capability(&self) -> CapabilityKind {
        match self {
            Self::EntryRequirements => CapabilityKind::EntryRequirementLookup,
            Self::Transport => CapabilityKind::TransportSearch,
            Self::Lodging => CapabilityKind::LodgingSearch,
            Self::Activities => CapabilityKind::ActivitySearch,
        }
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of external lookup a task needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CapabilityKind {
    EntryRequirementLookup,
    TransportSearch,
    LodgingSearch,
    ActivitySearch,
    Research,
}

impl CapabilityKind {
    pub const ALL: [CapabilityKind; 5] = [
        CapabilityKind::EntryRequirementLookup,
        CapabilityKind::TransportSearch,
        CapabilityKind::LodgingSearch,
        CapabilityKind::ActivitySearch,
        CapabilityKind::Research,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::EntryRequirementLookup => "entry_requirement_lookup",
            Self::TransportSearch => "transport_search",
            Self::LodgingSearch => "lodging_search",
            Self::ActivitySearch => "activity_search",
            Self::Research => "research",
        }
    }
}

impl fmt::Display for CapabilityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status of a search task.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Derived, not yet sent to a provider
    #[default]
    Pending,
    /// Sent to a provider, no result recorded yet
    Dispatched,
    /// A usable result was applied
    Completed,
    /// A degraded result was applied
    Failed,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Dispatched => "dispatched",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// A result has been recorded for the task.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Valid transitions from this status.
    ///
    /// Resolved tasks may flip between completed and failed when a later
    /// result replaces an earlier one.
    pub fn valid_transitions(&self) -> Vec<TaskStatus> {
        match self {
            Self::Pending => vec![Self::Dispatched, Self::Completed, Self::Failed],
            Self::Dispatched => vec![Self::Pending, Self::Completed, Self::Failed],
            Self::Completed | Self::Failed => vec![Self::Completed, Self::Failed],
        }
    }

    pub fn can_transition_to(&self, new_status: Self) -> bool {
        self.valid_transitions().contains(&new_status)
    }
}

/// Grouping key of a task: which travelers, where, and when.
///
/// Two tasks with equal keys would issue the same external lookup, so a
/// domain never holds two tasks with the same key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct GroupingKey {
    /// Sorted traveler indexes
    pub travelers: Vec<TravelerIndex>,
    pub location: String,
    #[serde(default)]
    pub window: Option<DateWindow>,
}

impl GroupingKey {
    pub fn new(
        mut travelers: Vec<TravelerIndex>,
        location: impl Into<String>,
        window: Option<DateWindow>,
    ) -> Self {
        travelers.sort_unstable();
        travelers.dedup();
        Self {
            travelers,
            location: location.into(),
            window,
        }
    }
}

/// Canonical selection buckets a provider may fill.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionKind {
    Chosen,
    Cheapest,
    Fastest,
    Balanced,
    BestLocation,
    FamilyFriendly,
    Luxury,
}

impl SelectionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Chosen => "chosen",
            Self::Cheapest => "cheapest",
            Self::Fastest => "fastest",
            Self::Balanced => "balanced",
            Self::BestLocation => "best_location",
            Self::FamilyFriendly => "family_friendly",
            Self::Luxury => "luxury",
        }
    }
}

/// A unit of derived work requiring an external lookup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchTask {
    pub task_id: String,
    pub domain: Domain,
    pub capability: CapabilityKind,
    pub key: GroupingKey,
    /// Domain-specific query parameters forwarded to the provider
    #[serde(default)]
    pub parameters: BTreeMap<String, serde_json::Value>,
    /// Selection buckets the applier should try first, in order
    #[serde(default)]
    pub preference: Vec<SelectionKind>,
    #[serde(default)]
    pub status: TaskStatus,
}

impl SearchTask {
    pub fn new(task_id: impl Into<String>, domain: Domain, key: GroupingKey) -> Self {
        Self {
            task_id: task_id.into(),
            domain,
            capability: domain.capability(),
            key,
            parameters: BTreeMap::new(),
            preference: Vec::new(),
            status: TaskStatus::Pending,
        }
    }

    pub fn with_parameter(mut self, name: &str, value: impl Into<serde_json::Value>) -> Self {
        self.parameters.insert(name.to_string(), value.into());
        self
    }

    pub fn with_preference(mut self, preference: Vec<SelectionKind>) -> Self {
        self.preference = preference;
        self
    }

    pub fn travelers(&self) -> &[TravelerIndex] {
        &self.key.travelers
    }

    pub fn covers(&self, traveler: TravelerIndex) -> bool {
        self.key.travelers.binary_search(&traveler).is_ok()
    }

    pub fn parameter_str(&self, name: &str) -> Option<&str> {
        self.parameters.get(name).and_then(serde_json::Value::as_str)
    }

    pub fn parameter_date(&self, name: &str) -> Option<NaiveDate> {
        self.parameter_str(name)
            .and_then(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok())
    }
}

/// How a price applies to the party.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceBasis {
    #[default]
    Total,
    PerPerson,
}

/// A priced amount.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Price {
    pub amount: f64,
    pub currency: String,
    #[serde(default)]
    pub basis: PriceBasis,
}

impl Price {
    /// Amount owed by a party of `party_size`.
    pub fn total_for(&self, party_size: usize) -> f64 {
        match self.basis {
            PriceBasis::Total => self.amount,
            #[allow(clippy::cast_precision_loss)]
            PriceBasis::PerPerson => self.amount * party_size.max(1) as f64,
        }
    }
}

/// A normalized option returned by a provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TravelOption {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub price: Option<Price>,
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
    #[serde(default)]
    pub duration_minutes: Option<u32>,
    #[serde(default)]
    pub attributes: BTreeMap<String, serde_json::Value>,
}

impl TravelOption {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            category: None,
            price: None,
            start_date: None,
            end_date: None,
            duration_minutes: None,
            attributes: BTreeMap::new(),
        }
    }

    pub fn with_price(mut self, amount: f64, currency: &str, basis: PriceBasis) -> Self {
        self.price = Some(Price {
            amount,
            currency: currency.to_string(),
            basis,
        });
        self
    }

    pub fn with_dates(mut self, start: Option<NaiveDate>, end: Option<NaiveDate>) -> Self {
        self.start_date = start;
        self.end_date = end;
        self
    }

    pub fn with_attribute(mut self, name: &str, value: impl Into<serde_json::Value>) -> Self {
        self.attributes.insert(name.to_string(), value.into());
        self
    }
}

/// Provider confidence in a result.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    High,
    Medium,
    Low,
    #[default]
    Unknown,
}

/// Normalized output of a capability call for one task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub task_id: String,
    #[serde(default)]
    pub options: Vec<TravelOption>,
    #[serde(default)]
    pub selections: BTreeMap<SelectionKind, String>,
    #[serde(default)]
    pub confidence: Confidence,
    /// Free-form hints such as `processing_time` or `fee`
    #[serde(default)]
    pub hints: BTreeMap<String, String>,
    #[serde(default)]
    pub rationale: String,
    /// True when synthesized by the dispatcher after a failed lookup
    #[serde(default)]
    pub degraded: bool,
}

impl SearchResult {
    pub fn new(task_id: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
            options: Vec::new(),
            selections: BTreeMap::new(),
            confidence: Confidence::Unknown,
            hints: BTreeMap::new(),
            rationale: String::new(),
            degraded: false,
        }
    }

    /// Empty but well-formed result standing in for a failed lookup.
    pub fn stub(task_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            rationale: reason.into(),
            degraded: true,
            confidence: Confidence::Low,
            ..Self::new(task_id)
        }
    }

    pub fn option(&self, id: &str) -> Option<&TravelOption> {
        self.options.iter().find(|o| o.id == id)
    }

    pub fn selected(&self, kind: SelectionKind) -> Option<&TravelOption> {
        self.selections.get(&kind).and_then(|id| self.option(id))
    }

    /// No usable data: degraded or without options.
    pub fn is_empty(&self) -> bool {
        self.degraded || self.options.is_empty()
    }
}

/// Reference to the option picked for a choice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectedOption {
    pub option_id: String,
    pub name: String,
    #[serde(default)]
    pub selection: Option<SelectionKind>,
    #[serde(default)]
    pub price: Option<Price>,
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
}

impl SelectedOption {
    pub fn from_option(option: &TravelOption, selection: Option<SelectionKind>) -> Self {
        Self {
            option_id: option.id.clone(),
            name: option.name.clone(),
            selection,
            price: option.price.clone(),
            start_date: option.start_date,
            end_date: option.end_date,
        }
    }
}

/// The resolved selection for the travelers covered by one task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Choice {
    pub task_id: String,
    pub travelers: Vec<TravelerIndex>,
    #[serde(default)]
    pub selected: Option<SelectedOption>,
    #[serde(default)]
    pub alternatives: Vec<String>,
    pub rationale: String,
    #[serde(default)]
    pub degraded: bool,
}

impl Choice {
    /// Price for the whole covered subset, if the selected option is priced.
    pub fn total_price(&self) -> Option<(String, f64)> {
        let price = self.selected.as_ref()?.price.as_ref()?;
        Some((price.currency.clone(), price.total_for(self.travelers.len())))
    }
}

/// All planning state owned by one domain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainState {
    pub domain: Domain,
    #[serde(default)]
    pub search_tasks: Vec<SearchTask>,
    /// At most one result per task id
    #[serde(default)]
    pub results: BTreeMap<String, SearchResult>,
    #[serde(default)]
    pub choices: Vec<Choice>,
    #[serde(default)]
    pub overall_summary: Option<String>,
    /// Number of pipeline passes that ran to completion
    #[serde(default)]
    pub completed_passes: u32,
}

impl DomainState {
    pub fn new(domain: Domain) -> Self {
        Self {
            domain,
            search_tasks: Vec::new(),
            results: BTreeMap::new(),
            choices: Vec::new(),
            overall_summary: None,
            completed_passes: 0,
        }
    }

    pub fn task(&self, task_id: &str) -> Option<&SearchTask> {
        self.search_tasks.iter().find(|t| t.task_id == task_id)
    }

    pub fn has_key(&self, key: &GroupingKey) -> bool {
        self.search_tasks.iter().any(|t| &t.key == key)
    }

    /// Append derived tasks, skipping any whose grouping key already exists.
    ///
    /// Returns the ids of the tasks actually added.
    pub fn append_tasks(&mut self, tasks: Vec<SearchTask>) -> DomainResult<Vec<String>> {
        let mut added = Vec::new();
        for task in tasks {
            if task.domain != self.domain {
                return Err(DomainError::WriteOwnership(format!(
                    "task {} belongs to {}, not {}",
                    task.task_id, task.domain, self.domain
                )));
            }
            if self.has_key(&task.key) {
                continue;
            }
            if self.task(&task.task_id).is_some() {
                return Err(DomainError::ValidationFailed(format!(
                    "duplicate task id {} in {}",
                    task.task_id, self.domain
                )));
            }
            added.push(task.task_id.clone());
            self.search_tasks.push(task);
        }
        Ok(added)
    }

    /// Move a task to a new status, enforcing the allowed transitions.
    pub fn transition_task(&mut self, task_id: &str, status: TaskStatus) -> DomainResult<()> {
        let domain = self.domain;
        let task = self
            .search_tasks
            .iter_mut()
            .find(|t| t.task_id == task_id)
            .ok_or_else(|| DomainError::UnknownTask {
                domain,
                task_id: task_id.to_string(),
            })?;

        if task.status == status {
            return Ok(());
        }
        if !task.status.can_transition_to(status) {
            return Err(DomainError::InvalidTaskTransition {
                task_id: task_id.to_string(),
                from: task.status,
                to: status,
            });
        }
        task.status = status;
        Ok(())
    }

    /// Tasks without a recorded result, in task order.
    pub fn unresolved_tasks(&self) -> Vec<&SearchTask> {
        self.search_tasks
            .iter()
            .filter(|t| !self.results.contains_key(&t.task_id))
            .collect()
    }

    /// At least one pass completed and every task has a result.
    pub fn is_settled(&self) -> bool {
        self.completed_passes > 0 && self.unresolved_tasks().is_empty()
    }

    pub fn degraded_count(&self) -> usize {
        self.results.values().filter(|r| r.degraded).count()
    }

    /// Choices covering a traveler, in task order.
    pub fn choices_for(&self, traveler: TravelerIndex) -> Vec<&Choice> {
        self.choices
            .iter()
            .filter(|c| c.travelers.contains(&traveler))
            .collect()
    }

    pub fn choice(&self, task_id: &str) -> Option<&Choice> {
        self.choices.iter().find(|c| c.task_id == task_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(id: &str, travelers: Vec<TravelerIndex>, location: &str) -> SearchTask {
        SearchTask::new(
            id,
            Domain::Lodging,
            GroupingKey::new(travelers, location, None),
        )
    }

    #[test]
    fn test_grouping_key_sorts_travelers() {
        let key = GroupingKey::new(vec![3, 1, 2, 1], "LHR", None);
        assert_eq!(key.travelers, vec![1, 2, 3]);
    }

    #[test]
    fn test_append_skips_equivalent_keys() {
        let mut state = DomainState::new(Domain::Lodging);
        let added = state
            .append_tasks(vec![task("lodging-a-0", vec![0, 1], "London")])
            .unwrap();
        assert_eq!(added, vec!["lodging-a-0".to_string()]);

        let added = state
            .append_tasks(vec![task("lodging-a-1", vec![1, 0], "London")])
            .unwrap();
        assert!(added.is_empty());
        assert_eq!(state.search_tasks.len(), 1);
    }

    #[test]
    fn test_append_rejects_foreign_domain() {
        let mut state = DomainState::new(Domain::Transport);
        let err = state
            .append_tasks(vec![task("lodging-a-0", vec![0], "London")])
            .unwrap_err();
        assert!(matches!(err, DomainError::WriteOwnership(_)));
    }

    #[test]
    fn test_task_transitions() {
        let mut state = DomainState::new(Domain::Lodging);
        state
            .append_tasks(vec![task("lodging-a-0", vec![0], "London")])
            .unwrap();

        state
            .transition_task("lodging-a-0", TaskStatus::Dispatched)
            .unwrap();
        state
            .transition_task("lodging-a-0", TaskStatus::Completed)
            .unwrap();
        let err = state
            .transition_task("lodging-a-0", TaskStatus::Pending)
            .unwrap_err();
        assert!(matches!(err, DomainError::InvalidTaskTransition { .. }));
    }

    #[test]
    fn test_settled_requires_pass_and_results() {
        let mut state = DomainState::new(Domain::Lodging);
        assert!(!state.is_settled());
        state.completed_passes = 1;
        assert!(state.is_settled());

        state
            .append_tasks(vec![task("lodging-a-0", vec![0], "London")])
            .unwrap();
        assert!(!state.is_settled());

        state
            .results
            .insert("lodging-a-0".to_string(), SearchResult::new("lodging-a-0"));
        assert!(state.is_settled());
    }

    #[test]
    fn test_per_person_price_scales_with_party() {
        let price = Price {
            amount: 100.0,
            currency: "USD".to_string(),
            basis: PriceBasis::PerPerson,
        };
        assert!((price.total_for(4) - 400.0).abs() < f64::EPSILON);
        assert!((price.total_for(0) - 100.0).abs() < f64::EPSILON);
    }
}
