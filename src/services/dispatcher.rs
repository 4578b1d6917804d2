//! Capability dispatch with deterministic fallback.
//!
//! The dispatcher waits on the shared rate limiter, calls the provider with a
//! per-call timeout, retries transient failures after a backoff delay, and
//! validates the payload. Every failure becomes a degraded stub result, so a
//! dispatched task always ends up with a result.

use std::collections::{BTreeMap, BTreeSet};
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use backoff::backoff::Backoff;
use backoff::{ExponentialBackoff, ExponentialBackoffBuilder};
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::domain::errors::DomainError;
use crate::domain::models::{
    Confidence, DispatchConfig, RateLimitConfig, SearchResult, SearchTask, SelectionKind,
    TravelOption,
};
use crate::domain::ports::{CapabilityError, CapabilityProvider, CapabilityQuery};

/// Payload shape accepted from providers.
#[derive(Debug, Deserialize)]
struct ProviderPayload {
    #[serde(default)]
    task_id: Option<String>,
    #[serde(default)]
    options: Vec<TravelOption>,
    #[serde(default)]
    selections: BTreeMap<String, String>,
    #[serde(default)]
    confidence: Option<Confidence>,
    #[serde(default)]
    hints: BTreeMap<String, serde_json::Value>,
    #[serde(default, alias = "summary")]
    rationale: Option<String>,
}

fn selection_kind(name: &str) -> Option<SelectionKind> {
    serde_json::from_value(serde_json::Value::String(name.to_string())).ok()
}

/// Validate a provider payload and normalize it into a result for `task_id`.
pub fn normalize(task_id: &str, value: serde_json::Value) -> Result<SearchResult, String> {
    let payload: ProviderPayload =
        serde_json::from_value(value).map_err(|e| format!("unparseable payload: {e}"))?;

    if let Some(echoed) = &payload.task_id {
        if echoed != task_id {
            return Err(format!("payload answers task {echoed}"));
        }
    }

    let mut ids = BTreeSet::new();
    for option in &payload.options {
        if option.id.trim().is_empty() {
            return Err("option with empty id".to_string());
        }
        if !ids.insert(option.id.as_str()) {
            return Err(format!("duplicate option id {}", option.id));
        }
        if let Some(price) = &option.price {
            if !price.amount.is_finite() || price.amount < 0.0 {
                return Err(format!("invalid price {} on option {}", price.amount, option.id));
            }
        }
    }

    let mut selections = BTreeMap::new();
    for (name, option_id) in payload.selections {
        let Some(kind) = selection_kind(&name) else {
            debug!(task_id, selection = %name, "ignoring unknown selection bucket");
            continue;
        };
        if !ids.contains(option_id.as_str()) {
            return Err(format!("selection {name} references unknown option {option_id}"));
        }
        selections.insert(kind, option_id);
    }

    let hints = payload
        .hints
        .into_iter()
        .map(|(k, v)| match v {
            serde_json::Value::String(s) => (k, s),
            other => (k, other.to_string()),
        })
        .collect();

    Ok(SearchResult {
        task_id: task_id.to_string(),
        options: payload.options,
        selections,
        confidence: payload.confidence.unwrap_or_default(),
        hints,
        rationale: payload.rationale.unwrap_or_default(),
        degraded: false,
    })
}

/// Invokes a capability provider for one task at a time.
pub struct Dispatcher {
    provider: Arc<dyn CapabilityProvider>,
    limiter: Option<Arc<DefaultDirectRateLimiter>>,
    config: DispatchConfig,
}

impl Dispatcher {
    pub fn new(
        provider: Arc<dyn CapabilityProvider>,
        config: DispatchConfig,
        rate_limit: &RateLimitConfig,
    ) -> Self {
        Self {
            provider,
            limiter: build_limiter(rate_limit).map(Arc::new),
            config,
        }
    }

    /// Dispatcher without rate limiting, mostly for tests.
    pub fn unlimited(provider: Arc<dyn CapabilityProvider>, config: DispatchConfig) -> Self {
        Self {
            provider,
            limiter: None,
            config,
        }
    }

    pub fn provider_name(&self) -> &'static str {
        self.provider.name()
    }

    fn backoff(&self) -> ExponentialBackoff {
        ExponentialBackoffBuilder::new()
            .with_initial_interval(Duration::from_millis(self.config.initial_backoff_ms))
            .with_max_interval(Duration::from_millis(self.config.max_backoff_ms))
            .with_randomization_factor(0.0)
            .with_max_elapsed_time(None)
            .build()
    }

    /// Run the task's query. Never fails: errors become a degraded stub.
    pub async fn dispatch(&self, task: &SearchTask) -> SearchResult {
        let task_id = task.task_id.as_str();

        if !self.provider.supports(task.capability) {
            let err = DomainError::CapabilityUnavailable {
                task_id: task_id.to_string(),
                reason: format!("{} does not support {}", self.provider.name(), task.capability),
            };
            warn!(task_id, error = %err, "dispatch degraded");
            return SearchResult::stub(task_id, err.to_string());
        }

        let timeout = Duration::from_millis(self.config.timeout_ms);
        let attempts = self.config.max_retries.saturating_add(1);
        let mut backoff = self.backoff();
        let mut attempt = 0;

        let failure = loop {
            attempt += 1;
            if let Some(limiter) = &self.limiter {
                limiter.until_ready().await;
            }

            let query = CapabilityQuery::from(task);
            let outcome = match tokio::time::timeout(timeout, self.provider.query(query)).await {
                Ok(outcome) => outcome,
                Err(_) => Err(CapabilityError::Timeout(self.config.timeout_ms)),
            };

            match outcome {
                Ok(value) => match normalize(task_id, value) {
                    Ok(result) => {
                        debug!(task_id, attempt, options = result.options.len(), "dispatch succeeded");
                        return result;
                    }
                    Err(reason) => {
                        break DomainError::CapabilityInvalidOutput {
                            task_id: task_id.to_string(),
                            reason,
                        };
                    }
                },
                Err(err) if err.is_transient() && attempt < attempts => {
                    let delay = backoff
                        .next_backoff()
                        .unwrap_or_else(|| Duration::from_millis(self.config.max_backoff_ms));
                    warn!(
                        task_id,
                        attempt,
                        error = %err,
                        delay_ms = delay.as_millis() as u64,
                        "transient capability failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(err) => {
                    break DomainError::CapabilityUnavailable {
                        task_id: task_id.to_string(),
                        reason: err.to_string(),
                    };
                }
            }
        };

        warn!(task_id, attempts = attempt, error = %failure, "dispatch degraded");
        SearchResult::stub(task_id, failure.to_string())
    }
}

fn build_limiter(config: &RateLimitConfig) -> Option<DefaultDirectRateLimiter> {
    if !config.requests_per_second.is_finite() || config.requests_per_second <= 0.0 {
        return None;
    }
    let period = Duration::from_secs_f64(1.0 / config.requests_per_second);
    let burst = NonZeroU32::new(config.burst_size.max(1))?;
    let quota = Quota::with_period(period)?.allow_burst(burst);
    Some(RateLimiter::direct(quota))
}
