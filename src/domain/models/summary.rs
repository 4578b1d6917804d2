//! Consolidated trip summary handed to narrative and UI consumers.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::domain_state::Domain;
use super::planner::{DateWindow, TravelerIndex};

/// One structured summary of the fully planned trip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TripSummary {
    pub destination: String,
    pub traveler_count: usize,
    pub requested_window: Option<DateWindow>,
    /// Set when entry-requirement lead times moved the travel dates
    pub adjusted_window: Option<DateWindow>,
    pub highlights: Vec<DomainHighlight>,
    pub costs: CostEstimate,
    pub budget: Option<BudgetComparison>,
    pub action_items: Vec<ActionItem>,
}

impl TripSummary {
    pub fn highlight(&self, domain: Domain) -> Option<&DomainHighlight> {
        self.highlights.iter().find(|h| h.domain == domain)
    }

    pub fn is_degraded(&self) -> bool {
        self.highlights.iter().any(|h| h.degraded)
    }
}

/// Per-domain view of the resolved choices.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainHighlight {
    pub domain: Domain,
    /// The domain's `overall_summary`, or a placeholder when it never ran
    pub summary: String,
    /// One line per selected option
    pub selections: Vec<String>,
    /// Notes about missing data
    pub notes: Vec<String>,
    pub degraded: bool,
}

/// Aggregate price of the selected options.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CostEstimate {
    /// Currency code to total amount
    pub total_by_currency: BTreeMap<String, f64>,
    pub by_domain: BTreeMap<Domain, BTreeMap<String, f64>>,
}

impl CostEstimate {
    pub fn add(&mut self, domain: Domain, currency: &str, amount: f64) {
        *self
            .total_by_currency
            .entry(currency.to_string())
            .or_insert(0.0) += amount;
        *self
            .by_domain
            .entry(domain)
            .or_default()
            .entry(currency.to_string())
            .or_insert(0.0) += amount;
    }

    pub fn total_in(&self, currency: &str) -> f64 {
        self.total_by_currency.get(currency).copied().unwrap_or(0.0)
    }

    pub fn domain_total(&self, domain: Domain, currency: &str) -> f64 {
        self.by_domain
            .get(&domain)
            .and_then(|m| m.get(currency))
            .copied()
            .unwrap_or(0.0)
    }
}

/// Estimated cost against the stated total budget.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BudgetComparison {
    pub total_budget: f64,
    pub currency: String,
    /// Estimate in the budget currency
    pub estimated: f64,
    pub remaining: f64,
    pub within_budget: bool,
    /// Currencies priced in the estimate that could not be compared
    pub uncompared_currencies: Vec<String>,
}

/// What an action item asks the traveler to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    VisaApplication,
    RetryDomain,
    ResolveTask,
    Book,
}

/// A follow-up for the traveler or the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionItem {
    pub kind: ActionKind,
    pub domain: Domain,
    pub description: String,
    #[serde(default)]
    pub travelers: Vec<TravelerIndex>,
    /// Days of lead time required before departure
    #[serde(default)]
    pub lead_days: Option<u32>,
}
