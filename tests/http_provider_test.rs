//! HTTP capability provider against a mock server.

use std::collections::BTreeMap;
use std::sync::Arc;

use mockito::{Matcher, Server};
use serde_json::json;
use tripwright::adapters::providers::HttpCapabilityProvider;
use tripwright::domain::models::{
    CapabilityKind, DispatchConfig, GroupingKey, ProvidersConfig, SearchTask,
};
use tripwright::{CapabilityError, CapabilityProvider, CapabilityQuery, Dispatcher, Domain};

fn lodging_task() -> SearchTask {
    SearchTask::new(
        "lodging-london-0",
        Domain::Lodging,
        GroupingKey::new(vec![0, 1], "London", None),
    )
    .with_parameter("nights", 5)
}

fn provider_for(server: &Server, api_key: Option<&str>) -> HttpCapabilityProvider {
    let config = ProvidersConfig {
        endpoints: BTreeMap::from([(
            CapabilityKind::LodgingSearch,
            format!("{}/lodging", server.url()),
        )]),
        request_timeout_secs: 5,
        api_key: api_key.map(ToString::to_string),
    };
    HttpCapabilityProvider::new(&config).expect("Failed to create provider")
}

fn dispatcher(provider: HttpCapabilityProvider) -> Dispatcher {
    Dispatcher::unlimited(
        Arc::new(provider),
        DispatchConfig {
            timeout_ms: 2_000,
            max_retries: 1,
            initial_backoff_ms: 1,
            max_backoff_ms: 5,
        },
    )
}

#[tokio::test]
async fn test_successful_query_is_normalized() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/lodging")
        .match_header("authorization", "Bearer secret")
        .match_header("content-type", "application/json")
        .match_body(Matcher::PartialJson(json!({
            "task_id": "lodging-london-0",
            "capability": "lodging_search",
            "parameters": {"nights": 5}
        })))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            json!({
                "task_id": "lodging-london-0",
                "options": [
                    {"id": "h1", "name": "Budget Inn", "price": {"amount": 400.0, "currency": "GBP"}},
                    {"id": "h2", "name": "Family Suites", "price": {"amount": 900.0, "currency": "GBP"}}
                ],
                "selections": {"cheapest": "h1", "family_friendly": "h2"},
                "confidence": "high"
            })
            .to_string(),
        )
        .expect(1)
        .create_async()
        .await;

    let result = dispatcher(provider_for(&server, Some("secret")))
        .dispatch(&lodging_task())
        .await;

    assert!(!result.degraded);
    assert_eq!(result.options.len(), 2);
    assert_eq!(result.selections.len(), 2);
    mock.assert_async().await;
}

#[tokio::test]
async fn test_server_errors_are_retried_then_degraded() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/lodging")
        .with_status(503)
        .with_body("upstream unavailable")
        .expect(2)
        .create_async()
        .await;

    let result = dispatcher(provider_for(&server, None))
        .dispatch(&lodging_task())
        .await;

    assert!(result.degraded);
    assert!(result.options.is_empty());
    assert!(result.rationale.contains("503"));
    mock.assert_async().await;
}

#[tokio::test]
async fn test_client_errors_are_not_retried() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/lodging")
        .with_status(422)
        .with_body(r#"{"error": "unknown city"}"#)
        .expect(1)
        .create_async()
        .await;

    let provider = provider_for(&server, None);
    let err = provider
        .query(CapabilityQuery::from(&lodging_task()))
        .await
        .unwrap_err();
    assert!(matches!(err, CapabilityError::Rejected(_)));
    assert!(!err.is_transient());
    mock.assert_async().await;
}

#[tokio::test]
async fn test_malformed_body_is_invalid_output() {
    let mut server = Server::new_async().await;
    let _mock = server
        .mock("POST", "/lodging")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body("<html>not json</html>")
        .create_async()
        .await;

    let provider = provider_for(&server, None);
    let err = provider
        .query(CapabilityQuery::from(&lodging_task()))
        .await
        .unwrap_err();
    assert!(matches!(err, CapabilityError::InvalidOutput(_)));
}

#[tokio::test]
async fn test_unconfigured_capability_is_not_called() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", Matcher::Any)
        .expect(0)
        .create_async()
        .await;

    let provider = provider_for(&server, None);
    assert!(!provider.supports(CapabilityKind::TransportSearch));

    let transport = SearchTask::new(
        "transport-lagos-london-0",
        Domain::Transport,
        GroupingKey::new(vec![0], "Lagos-London", None),
    );
    let result = dispatcher(provider).dispatch(&transport).await;

    assert!(result.degraded);
    assert!(result.rationale.contains("does not support"));
    mock.assert_async().await;
}
