//! Mock capability provider for testing.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::RwLock;

use crate::domain::models::{CapabilityKind, Domain};
use crate::domain::ports::{CapabilityError, CapabilityProvider, CapabilityQuery};

/// Mock response configuration.
#[derive(Debug, Clone)]
pub struct MockResponse {
    /// Payload returned on success
    pub payload: Option<Value>,
    /// Error returned instead of a payload
    pub error: Option<CapabilityError>,
    /// Simulated latency
    pub delay_ms: u64,
}

impl MockResponse {
    pub fn success(payload: Value) -> Self {
        Self {
            payload: Some(payload),
            error: None,
            delay_ms: 0,
        }
    }

    pub fn failure(error: CapabilityError) -> Self {
        Self {
            payload: None,
            error: Some(error),
            delay_ms: 0,
        }
    }

    pub fn with_delay_ms(mut self, delay_ms: u64) -> Self {
        self.delay_ms = delay_ms;
        self
    }
}

/// Canned payload used when nothing was configured for a query.
///
/// One option covering the query window, selected as `chosen`.
pub fn default_payload(query: &CapabilityQuery) -> Value {
    let id = format!("{}-a", query.task_id);
    let mut option = json!({
        "id": id,
        "name": format!("{} option for {}", query.domain.label(), query.location),
        "price": {"amount": 100.0, "currency": "USD", "basis": "total"},
    });
    if let Some(window) = query.window {
        option["start_date"] = json!(window.start);
        option["end_date"] = json!(window.end);
    }
    json!({
        "task_id": query.task_id,
        "options": [option],
        "selections": {"chosen": id},
        "confidence": "medium",
    })
}

/// Mock provider with scripted responses and call recording.
///
/// Resolution order per query: the task's script queue, the task's fixed
/// response, the domain's fixed response, then [`default_payload`].
pub struct MockCapabilityProvider {
    scripts: Arc<RwLock<HashMap<String, VecDeque<MockResponse>>>>,
    task_overrides: Arc<RwLock<HashMap<String, MockResponse>>>,
    domain_overrides: Arc<RwLock<HashMap<Domain, MockResponse>>>,
    calls: Arc<RwLock<HashMap<String, u32>>>,
    queries: Arc<RwLock<Vec<CapabilityQuery>>>,
    unsupported: Vec<CapabilityKind>,
}

impl MockCapabilityProvider {
    pub fn new() -> Self {
        Self {
            scripts: Arc::new(RwLock::new(HashMap::new())),
            task_overrides: Arc::new(RwLock::new(HashMap::new())),
            domain_overrides: Arc::new(RwLock::new(HashMap::new())),
            calls: Arc::new(RwLock::new(HashMap::new())),
            queries: Arc::new(RwLock::new(Vec::new())),
            unsupported: Vec::new(),
        }
    }

    /// Provider that refuses the given capability kinds.
    pub fn without(mut self, capability: CapabilityKind) -> Self {
        self.unsupported.push(capability);
        self
    }

    /// Responses returned in order for successive calls of a task.
    pub async fn script(&self, task_id: &str, responses: Vec<MockResponse>) {
        let mut scripts = self.scripts.write().await;
        scripts.insert(task_id.to_string(), responses.into());
    }

    /// Set a fixed response for a task ID.
    pub async fn set_response(&self, task_id: &str, response: MockResponse) {
        let mut overrides = self.task_overrides.write().await;
        overrides.insert(task_id.to_string(), response);
    }

    /// Set a fixed response for every task of a domain.
    pub async fn set_domain_response(&self, domain: Domain, response: MockResponse) {
        let mut overrides = self.domain_overrides.write().await;
        overrides.insert(domain, response);
    }

    pub async fn call_count(&self, task_id: &str) -> u32 {
        self.calls.read().await.get(task_id).copied().unwrap_or(0)
    }

    pub async fn total_calls(&self) -> u32 {
        self.calls.read().await.values().sum()
    }

    /// Every query received, in arrival order.
    pub async fn queries(&self) -> Vec<CapabilityQuery> {
        self.queries.read().await.clone()
    }

    async fn response_for(&self, query: &CapabilityQuery) -> Option<MockResponse> {
        if let Some(queue) = self.scripts.write().await.get_mut(&query.task_id) {
            if let Some(next) = queue.pop_front() {
                return Some(next);
            }
        }
        if let Some(response) = self.task_overrides.read().await.get(&query.task_id) {
            return Some(response.clone());
        }
        self.domain_overrides.read().await.get(&query.domain).cloned()
    }
}

impl Default for MockCapabilityProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CapabilityProvider for MockCapabilityProvider {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn supports(&self, capability: CapabilityKind) -> bool {
        !self.unsupported.contains(&capability)
    }

    async fn query(&self, query: CapabilityQuery) -> Result<Value, CapabilityError> {
        *self
            .calls
            .write()
            .await
            .entry(query.task_id.clone())
            .or_insert(0) += 1;
        self.queries.write().await.push(query.clone());

        let Some(response) = self.response_for(&query).await else {
            return Ok(default_payload(&query));
        };

        if response.delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(response.delay_ms)).await;
        }
        match (response.error, response.payload) {
            (Some(error), _) => Err(error),
            (None, Some(payload)) => Ok(payload),
            (None, None) => Ok(default_payload(&query)),
        }
    }
}
