//! Task derivation per planning domain.
//!
//! A deriver is a pure function of the planner record, the upstream domain
//! states and the planning date. It returns the tasks that are not yet
//! present in the domain (by grouping key), with ids continuing the
//! domain's task sequence, so it can be re-run any number of times.

pub mod activities;
pub mod entry_requirements;
pub mod lodging;
pub mod transport;

use std::collections::BTreeMap;

use chrono::NaiveDate;

use crate::domain::models::{Domain, DomainState, GroupingKey, PlannerRecord, SearchTask};

pub use activities::ActivitiesDeriver;
pub use entry_requirements::EntryRequirementsDeriver;
pub use lodging::LodgingDeriver;
pub use transport::TransportDeriver;

/// Inputs shared by every deriver.
#[derive(Debug, Clone, Copy)]
pub struct DeriveContext<'a> {
    pub record: &'a PlannerRecord,
    /// Read-only snapshots of other domains
    pub upstream: &'a BTreeMap<Domain, DomainState>,
    /// "Today" for lead-time arithmetic
    pub planning_date: NaiveDate,
}

impl<'a> DeriveContext<'a> {
    pub fn new(
        record: &'a PlannerRecord,
        upstream: &'a BTreeMap<Domain, DomainState>,
        planning_date: NaiveDate,
    ) -> Self {
        Self {
            record,
            upstream,
            planning_date,
        }
    }

    /// Upstream state that has settled, or the reason it is not usable yet.
    pub fn settled(&self, domain: Domain) -> Result<&'a DomainState, String> {
        match self.upstream.get(&domain) {
            Some(state) if state.is_settled() => Ok(state),
            Some(state) => Err(format!(
                "{domain} has {} unresolved task(s) after {} pass(es)",
                state.unresolved_tasks().len(),
                state.completed_passes
            )),
            None => Err(format!("{domain} has not run yet")),
        }
    }
}

/// Outcome of one derivation.
#[derive(Debug, Clone, PartialEq)]
pub enum Derivation {
    /// Tasks to append; empty when everything is already derived
    Tasks(Vec<SearchTask>),
    /// Upstream state is not settled yet; the pass should be retried
    UpstreamNotReady(String),
}

impl Derivation {
    pub fn tasks(&self) -> &[SearchTask] {
        match self {
            Self::Tasks(tasks) => tasks,
            Self::UpstreamNotReady(_) => &[],
        }
    }
}

/// Computes new search tasks for one domain.
pub trait TaskDeriver: Send + Sync {
    fn domain(&self) -> Domain;

    /// Domains that must be settled before this deriver yields tasks.
    fn upstream(&self) -> &'static [Domain] {
        &[]
    }

    fn derive(&self, ctx: &DeriveContext<'_>, existing: &DomainState) -> Derivation;
}

/// Deriver for a domain.
pub fn deriver_for(domain: Domain, activity_chunk_days: u32) -> Box<dyn TaskDeriver> {
    match domain {
        Domain::EntryRequirements => Box::new(EntryRequirementsDeriver),
        Domain::Transport => Box::new(TransportDeriver),
        Domain::Lodging => Box::new(LodgingDeriver),
        Domain::Activities => Box::new(ActivitiesDeriver::new(activity_chunk_days)),
    }
}

/// Lowercase ASCII slug: `"New York (JFK)"` becomes `"new-york-jfk"`.
pub fn slug(location: &str) -> String {
    let mut out = String::with_capacity(location.len());
    for c in location.chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c.to_ascii_lowercase());
        } else if !out.ends_with('-') && !out.is_empty() {
            out.push('-');
        }
    }
    while out.ends_with('-') {
        out.pop();
    }
    if out.is_empty() {
        out.push_str("unknown");
    }
    out
}

/// Accumulates derived tasks, skipping keys already present and numbering
/// ids after the existing tasks.
pub(crate) struct TaskBatch<'a> {
    existing: &'a DomainState,
    tasks: Vec<SearchTask>,
}

impl<'a> TaskBatch<'a> {
    pub(crate) fn new(existing: &'a DomainState) -> Self {
        Self {
            existing,
            tasks: Vec::new(),
        }
    }

    /// Add a task built by `build` from its id, unless the key is already known.
    pub(crate) fn push(
        &mut self,
        key: GroupingKey,
        build: impl FnOnce(String, GroupingKey) -> SearchTask,
    ) {
        if self.existing.has_key(&key) || self.tasks.iter().any(|t| t.key == key) {
            return;
        }
        let sequence = self.existing.search_tasks.len() + self.tasks.len();
        let task_id = format!(
            "{}-{}-{sequence}",
            self.existing.domain.task_prefix(),
            slug(&key.location)
        );
        self.tasks.push(build(task_id, key));
    }

    pub(crate) fn finish(self) -> Derivation {
        Derivation::Tasks(self.tasks)
    }
}

/// Group items by a key, preserving first-seen order of the keys.
pub(crate) fn group_ordered<T, K: PartialEq>(
    items: impl IntoIterator<Item = T>,
    key: impl Fn(&T) -> K,
) -> Vec<(K, Vec<T>)> {
    let mut groups: Vec<(K, Vec<T>)> = Vec::new();
    for item in items {
        let k = key(&item);
        match groups.iter_mut().find(|(existing, _)| *existing == k) {
            Some((_, members)) => members.push(item),
            None => groups.push((k, vec![item])),
        }
    }
    groups
}
