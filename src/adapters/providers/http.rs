//! HTTP capability provider.
//!
//! Posts each [`CapabilityQuery`] as JSON to the endpoint configured for its
//! capability kind and returns the response body. Status codes map onto
//! [`CapabilityError`] so the dispatcher can tell retryable failures apart.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use tracing::debug;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{CapabilityKind, ProvidersConfig};
use crate::domain::ports::{CapabilityError, CapabilityProvider, CapabilityQuery};

pub struct HttpCapabilityProvider {
    http: Client,
    endpoints: BTreeMap<CapabilityKind, String>,
    api_key: Option<String>,
}

impl HttpCapabilityProvider {
    pub fn new(config: &ProvidersConfig) -> DomainResult<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .user_agent(concat!("tripwright/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| DomainError::ValidationFailed(format!("HTTP client: {e}")))?;
        Ok(Self {
            http,
            endpoints: config.endpoints.clone(),
            api_key: config.api_key.clone(),
        })
    }

    fn endpoint(&self, capability: CapabilityKind) -> Option<&str> {
        self.endpoints.get(&capability).map(String::as_str)
    }
}

fn classify_status(status: StatusCode, body: String) -> CapabilityError {
    let detail = format!("{status}: {body}");
    if status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
        || status.is_server_error()
    {
        CapabilityError::Transient(detail)
    } else {
        CapabilityError::Rejected(detail)
    }
}

fn classify_transport(err: &reqwest::Error) -> CapabilityError {
    if err.is_timeout() || err.is_connect() {
        CapabilityError::Transient(err.to_string())
    } else {
        CapabilityError::Unavailable(err.to_string())
    }
}

#[async_trait]
impl CapabilityProvider for HttpCapabilityProvider {
    fn name(&self) -> &'static str {
        "http"
    }

    fn supports(&self, capability: CapabilityKind) -> bool {
        self.endpoint(capability).is_some()
    }

    async fn query(&self, query: CapabilityQuery) -> Result<serde_json::Value, CapabilityError> {
        let url = self.endpoint(query.capability).ok_or_else(|| {
            CapabilityError::Unavailable(format!("no endpoint for {}", query.capability))
        })?;

        let mut request = self.http.post(url).json(&query);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|e| classify_transport(&e))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status, body));
        }

        debug!(task_id = %query.task_id, %status, "capability response received");
        response
            .json::<serde_json::Value>()
            .await
            .map_err(|e| CapabilityError::InvalidOutput(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        assert!(classify_status(StatusCode::SERVICE_UNAVAILABLE, String::new()).is_transient());
        assert!(classify_status(StatusCode::TOO_MANY_REQUESTS, String::new()).is_transient());
        assert!(matches!(
            classify_status(StatusCode::BAD_REQUEST, "bad".to_string()),
            CapabilityError::Rejected(_)
        ));
    }

    #[test]
    fn test_supports_only_configured_capabilities() {
        let mut config = ProvidersConfig::default();
        config.endpoints.insert(
            CapabilityKind::LodgingSearch,
            "http://localhost:9/lodging".to_string(),
        );
        let provider = HttpCapabilityProvider::new(&config).unwrap();
        assert!(provider.supports(CapabilityKind::LodgingSearch));
        assert!(!provider.supports(CapabilityKind::TransportSearch));
    }
}
