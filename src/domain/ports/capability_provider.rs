//! Capability provider port - interface for external lookups.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::models::{
    CapabilityKind, DateWindow, Domain, SearchTask, SelectionKind, TravelerIndex,
};

/// Structured query sent to a capability provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapabilityQuery {
    pub task_id: String,
    pub capability: CapabilityKind,
    pub domain: Domain,
    pub travelers: Vec<TravelerIndex>,
    pub location: String,
    #[serde(default)]
    pub window: Option<DateWindow>,
    #[serde(default)]
    pub parameters: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    pub preference: Vec<SelectionKind>,
}

impl From<&SearchTask> for CapabilityQuery {
    fn from(task: &SearchTask) -> Self {
        Self {
            task_id: task.task_id.clone(),
            capability: task.capability,
            domain: task.domain,
            travelers: task.key.travelers.clone(),
            location: task.key.location.clone(),
            window: task.key.window,
            parameters: task.parameters.clone(),
            preference: task.preference.clone(),
        }
    }
}

/// Failure reported by a capability provider.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CapabilityError {
    #[error("Capability unavailable: {0}")]
    Unavailable(String),

    #[error("Transient capability failure: {0}")]
    Transient(String),

    #[error("Capability call timed out after {0}ms")]
    Timeout(u64),

    #[error("Query rejected: {0}")]
    Rejected(String),

    #[error("Invalid capability output: {0}")]
    InvalidOutput(String),
}

impl CapabilityError {
    /// Worth one more attempt.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_) | Self::Timeout(_))
    }
}

/// Trait for external lookup implementations.
///
/// Providers answer entry-requirement lookups, transport, lodging and
/// activity searches, and generic research with a JSON payload. The
/// dispatcher normalizes and validates the payload, so providers never see
/// planning state.
#[async_trait]
pub trait CapabilityProvider: Send + Sync {
    /// Get the provider name.
    fn name(&self) -> &'static str;

    /// Whether the provider can answer queries of this kind.
    fn supports(&self, _capability: CapabilityKind) -> bool {
        true
    }

    /// Run one query.
    async fn query(&self, query: CapabilityQuery) -> Result<serde_json::Value, CapabilityError>;
}
