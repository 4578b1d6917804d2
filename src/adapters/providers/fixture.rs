//! Fixture-backed capability provider.
//!
//! Answers queries from canned payloads loaded from a YAML or JSON file:
//!
//! ```yaml
//! capabilities:
//!   lodging_search:
//!     options:
//!       - { id: hotel-1, name: Riverside Hotel, price: { amount: 900, currency: GBP } }
//!     selections: { balanced: hotel-1 }
//! tasks:
//!   entry-ng-london-0:
//!     options:
//!       - { id: uk-visitor, name: Standard Visitor visa, attributes: { needs_visa: true } }
//!     hints: { processing_time: "15-21 days" }
//! generate_missing: true
//! ```
//!
//! Task entries win over capability entries. Options without dates take the
//! query window.

use std::collections::BTreeMap;
use std::path::Path;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use super::mock::default_payload;
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::CapabilityKind;
use crate::domain::ports::{CapabilityError, CapabilityProvider, CapabilityQuery};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FixtureSet {
    #[serde(default)]
    pub capabilities: BTreeMap<CapabilityKind, Value>,
    #[serde(default)]
    pub tasks: BTreeMap<String, Value>,
    /// Answer unmatched queries with a generated single-option payload
    #[serde(default)]
    pub generate_missing: bool,
}

pub struct FixtureCapabilityProvider {
    fixtures: FixtureSet,
}

impl FixtureCapabilityProvider {
    pub fn new(fixtures: FixtureSet) -> Self {
        Self { fixtures }
    }

    /// Provider that only generates payloads.
    pub fn generated() -> Self {
        Self::new(FixtureSet {
            generate_missing: true,
            ..FixtureSet::default()
        })
    }

    pub fn from_file(path: &Path) -> DomainResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            DomainError::ValidationFailed(format!("cannot read fixtures {}: {e}", path.display()))
        })?;
        Self::parse(&content)
    }

    /// Parse fixtures from YAML (JSON is accepted too).
    pub fn parse(content: &str) -> DomainResult<Self> {
        let fixtures: FixtureSet = serde_yaml::from_str(content)
            .map_err(|e| DomainError::SerializationError(format!("invalid fixtures: {e}")))?;
        Ok(Self::new(fixtures))
    }

    fn lookup(&self, query: &CapabilityQuery) -> Option<Value> {
        self.fixtures
            .tasks
            .get(&query.task_id)
            .or_else(|| self.fixtures.capabilities.get(&query.capability))
            .cloned()
    }
}

fn fill_dates(payload: &mut Value, query: &CapabilityQuery) {
    let Some(window) = query.window else {
        return;
    };
    let Some(options) = payload.get_mut("options").and_then(Value::as_array_mut) else {
        return;
    };
    for option in options.iter_mut().filter_map(Value::as_object_mut) {
        option
            .entry("start_date")
            .or_insert_with(|| json!(window.start));
        option.entry("end_date").or_insert_with(|| json!(window.end));
    }
}

#[async_trait]
impl CapabilityProvider for FixtureCapabilityProvider {
    fn name(&self) -> &'static str {
        "fixture"
    }

    async fn query(&self, query: CapabilityQuery) -> Result<Value, CapabilityError> {
        match self.lookup(&query) {
            Some(mut payload) => {
                fill_dates(&mut payload, &query);
                debug!(task_id = %query.task_id, "fixture hit");
                Ok(payload)
            }
            None if self.fixtures.generate_missing => Ok(default_payload(&query)),
            None => Err(CapabilityError::Unavailable(format!(
                "no fixture for {} ({})",
                query.task_id, query.capability
            ))),
        }
    }
}
