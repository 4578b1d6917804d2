//! Common test utilities for integration tests
//!
//! Provides shared fixtures: intake documents, stores, fast dispatch
//! settings and orchestrators wired to the mock capability provider.

#![allow(dead_code)]

use std::sync::Arc;

use chrono::{Duration, NaiveDate};
use serde_json::json;
use tripwright::adapters::providers::{MockCapabilityProvider, MockResponse};
use tripwright::domain::models::{
    BudgetMode, DispatchConfig, IntakeDocument, OrchestratorConfig, PreferencesUpdate,
    TravelerRole, TravelerUpdate, TripDetailsUpdate,
};
use tripwright::{Dispatcher, DomainOrchestrator, TripRecordStore};

/// "Today" for every scenario.
pub fn planning_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 3, 1).unwrap()
}

pub fn days_after_planning(days: i64) -> NaiveDate {
    planning_date() + Duration::days(days)
}

fn traveler(role: TravelerRole, age: u8, nationality: &str) -> TravelerUpdate {
    TravelerUpdate {
        role: Some(role),
        age: Some(age),
        nationality: Some(nationality.to_string()),
        ..TravelerUpdate::default()
    }
}

/// Two adults and two children flying Lagos to London, departing five days
/// after the planning date. Traveler 0 holds a Nigerian passport, the rest
/// British ones.
pub fn family_intake() -> IntakeDocument {
    IntakeDocument {
        trip: TripDetailsUpdate {
            destination: Some("London".to_string()),
            origin: Some("Lagos".to_string()),
            start_date: Some(days_after_planning(5)),
            end_date: Some(days_after_planning(11)),
            flexible_dates: Some(false),
        },
        travelers: vec![
            traveler(TravelerRole::Adult, 41, "NG"),
            traveler(TravelerRole::Adult, 39, "GB"),
            traveler(TravelerRole::Child, 9, "GB"),
            traveler(TravelerRole::Child, 6, "GB"),
        ],
        preferences: PreferencesUpdate {
            budget_mode: Some(BudgetMode::Standard),
            total_budget: Some(5000.0),
            budget_currency: Some("USD".to_string()),
            interests: Some(vec!["museums".to_string(), "parks".to_string()]),
            ..PreferencesUpdate::default()
        },
        ..IntakeDocument::default()
    }
}

pub async fn store_with(document: IntakeDocument) -> Arc<TripRecordStore> {
    let store = TripRecordStore::new();
    store
        .apply_intake(document)
        .await
        .expect("intake should apply");
    Arc::new(store)
}

pub fn fast_dispatch() -> DispatchConfig {
    DispatchConfig {
        timeout_ms: 100,
        max_retries: 1,
        initial_backoff_ms: 1,
        max_backoff_ms: 5,
    }
}

pub fn orchestrator_config(max_concurrency: usize) -> OrchestratorConfig {
    OrchestratorConfig {
        max_concurrency,
        max_pass_retries: 5,
        pass_retry_delay_ms: 50,
        ..OrchestratorConfig::default()
    }
}

pub fn orchestrator(
    store: Arc<TripRecordStore>,
    provider: Arc<MockCapabilityProvider>,
    max_concurrency: usize,
) -> DomainOrchestrator {
    DomainOrchestrator::new(
        store,
        Arc::new(Dispatcher::unlimited(provider, fast_dispatch())),
        orchestrator_config(max_concurrency),
    )
    .with_planning_date(planning_date())
}

/// Entry-requirement response for a visa with the given processing time.
pub fn visa_response(task_id: &str, processing_days: u32) -> MockResponse {
    MockResponse::success(json!({
        "task_id": task_id,
        "options": [{
            "id": "uk-standard-visitor",
            "name": "UK Standard Visitor visa",
            "price": {"amount": 127.0, "currency": "USD", "basis": "per_person"},
            "attributes": {"needs_visa": true, "processing_days": processing_days}
        }],
        "selections": {"chosen": "uk-standard-visitor"},
        "confidence": "high",
        "hints": {"processing_time": format!("{processing_days} days")}
    }))
}

/// Setup test logging
///
/// Initializes tracing subscriber for test output.
pub fn setup_test_logging() {
    use tracing_subscriber::fmt;

    let _ = fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}
