//! End-to-end planning runs against the mock and fixture providers.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{
    days_after_planning, family_intake, orchestrator, orchestrator_config, planning_date,
    setup_test_logging, store_with, visa_response,
};
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tripwright::adapters::providers::{FixtureCapabilityProvider, MockCapabilityProvider, MockResponse};
use tripwright::domain::models::{
    ActionKind, DagEdge, DispatchConfig, DomainDag, OrchestratorConfig, PlannerStatus,
    TaskStatus, TravelerRole, TravelerUpdate,
};
use tripwright::{
    Dispatcher, Domain, DomainError, DomainOrchestrator, DomainOutcome, TripRecordStore,
};

const NG_ENTRY_TASK: &str = "entry-ng-london-0";

#[tokio::test]
async fn test_visa_lead_time_shifts_transport_and_lodging() {
    setup_test_logging();
    let store = store_with(family_intake()).await;
    let provider = Arc::new(MockCapabilityProvider::new());
    provider
        .set_response(NG_ENTRY_TASK, visa_response(NG_ENTRY_TASK, 30))
        .await;

    let report = orchestrator(store.clone(), provider, 4).run().await.unwrap();
    assert!(report.is_complete(), "outcomes: {:?}", report.outcomes);
    assert_eq!(store.status().await, PlannerStatus::Done);

    let entry = store.domain_state(Domain::EntryRequirements).await.unwrap();
    assert_eq!(entry.search_tasks.len(), 2);
    assert_eq!(entry.search_tasks[0].task_id, NG_ENTRY_TASK);

    // One shared departure point, so one transport search for everyone.
    let transport = store.domain_state(Domain::Transport).await.unwrap();
    assert_eq!(transport.search_tasks.len(), 1);
    let trip = &transport.search_tasks[0];
    assert_eq!(trip.travelers(), &[0, 1, 2, 3]);
    assert_eq!(
        trip.key.window.map(|w| w.start),
        Some(days_after_planning(30))
    );
    assert_eq!(
        trip.parameter_date("departure_date"),
        Some(days_after_planning(30))
    );
    assert_eq!(
        trip.parameter_date("original_departure_date"),
        Some(days_after_planning(5))
    );

    let lodging = store.domain_state(Domain::Lodging).await.unwrap();
    assert_eq!(
        lodging.search_tasks[0].parameter_date("check_in_date"),
        Some(days_after_planning(30))
    );

    let summary = report.summary.unwrap();
    assert_eq!(
        summary.adjusted_window.map(|w| w.start),
        Some(days_after_planning(30))
    );
    let visa = summary
        .action_items
        .iter()
        .find(|item| item.kind == ActionKind::VisaApplication)
        .expect("visa action item");
    assert_eq!(visa.travelers, vec![0]);
    assert_eq!(visa.lead_days, Some(30));
    assert_eq!(summary.action_items[0].kind, ActionKind::VisaApplication);
}

#[tokio::test]
async fn test_no_lead_time_keeps_requested_dates() {
    let store = store_with(family_intake()).await;
    let provider = Arc::new(MockCapabilityProvider::new());

    let report = orchestrator(store.clone(), provider, 4).run().await.unwrap();
    assert!(report.is_complete());

    let transport = store.domain_state(Domain::Transport).await.unwrap();
    assert_eq!(
        transport.search_tasks[0].parameter_date("departure_date"),
        Some(days_after_planning(5))
    );
    assert!(report.summary.unwrap().adjusted_window.is_none());
}

#[tokio::test]
async fn test_lodging_timeout_degrades_but_completes() {
    let store = store_with(family_intake()).await;
    let provider = Arc::new(MockCapabilityProvider::new());
    provider
        .set_domain_response(
            Domain::Lodging,
            MockResponse::success(json!({"options": []})).with_delay_ms(500),
        )
        .await;

    let report = orchestrator(store.clone(), provider.clone(), 4)
        .run()
        .await
        .unwrap();
    assert!(report.is_complete());

    let lodging = store.domain_state(Domain::Lodging).await.unwrap();
    assert_eq!(lodging.degraded_count(), 1);
    let choice = &lodging.choices[0];
    assert!(choice.degraded);
    assert!(choice.selected.is_none());
    assert_eq!(lodging.search_tasks[0].status, TaskStatus::Failed);

    // One call plus one retry, then the stub.
    let task_id = &lodging.search_tasks[0].task_id;
    assert_eq!(provider.call_count(task_id).await, 2);

    let summary = report.summary.unwrap();
    assert!(summary.is_degraded());
    let highlight = summary.highlight(Domain::Lodging).unwrap();
    assert!(highlight.degraded);
    assert!(highlight
        .notes
        .iter()
        .any(|note| note.contains("missing lodging data")));
    assert!(summary
        .action_items
        .iter()
        .any(|item| item.kind == ActionKind::RetryDomain && item.domain == Domain::Lodging));
}

#[tokio::test]
async fn test_concurrency_does_not_change_final_state() {
    let mut states = Vec::new();
    let mut summaries = Vec::new();

    for concurrency in [1, 4] {
        let store = store_with(family_intake()).await;
        let provider = Arc::new(MockCapabilityProvider::new());
        provider
            .set_response(NG_ENTRY_TASK, visa_response(NG_ENTRY_TASK, 12))
            .await;

        let report = orchestrator(store.clone(), provider, concurrency)
            .run()
            .await
            .unwrap();
        assert!(report.is_complete(), "concurrency {concurrency}");

        states.push(serde_json::to_value(store.domain_states().await).unwrap());
        summaries.push(serde_json::to_value(report.summary).unwrap());
    }

    assert_eq!(states[0], states[1]);
    assert_eq!(summaries[0], summaries[1]);
}

#[tokio::test]
async fn test_missing_upstream_reports_dependency_not_ready() {
    // Transport needs entry requirements, which this graph never runs.
    let dag = DomainDag::new(
        vec![Domain::Transport, Domain::Lodging],
        vec![DagEdge::new(Domain::Transport, Domain::Lodging)],
    );
    let store = store_with(family_intake()).await;
    let provider = Arc::new(MockCapabilityProvider::new());

    let report = orchestrator(store.clone(), provider.clone(), 2)
        .with_dag(dag)
        .run()
        .await
        .unwrap();

    assert!(matches!(
        report.outcomes[&Domain::Transport],
        DomainOutcome::DependencyNotReady(_)
    ));
    assert!(matches!(
        report.outcomes[&Domain::Lodging],
        DomainOutcome::Skipped(_)
    ));
    assert!(report.errors.iter().any(|err| matches!(
        err,
        DomainError::DependencyNotReady {
            domain: Domain::Transport,
            ..
        }
    )));
    assert!(report.summary.is_none());
    assert_eq!(store.status().await, PlannerStatus::Planning);
    assert_eq!(provider.total_calls().await, 0);
}

#[tokio::test]
async fn test_transport_waits_for_slow_entry_pass() {
    setup_test_logging();
    let mut intake = family_intake();
    for (traveler, nationality) in intake.travelers.iter_mut().zip(["NG", "GB", "US", "GH"]) {
        traveler.nationality = Some(nationality.to_string());
    }
    intake.travelers.push(TravelerUpdate {
        role: Some(TravelerRole::Adult),
        age: Some(70),
        nationality: Some("FR".to_string()),
        ..TravelerUpdate::default()
    });
    let store = store_with(intake).await;

    // Every entry lookup hangs past the dispatch timeout, and five lookups
    // need three dispatch rounds at a concurrency of two.
    let provider = Arc::new(MockCapabilityProvider::new());
    provider
        .set_domain_response(
            Domain::EntryRequirements,
            MockResponse::success(json!({"options": []})).with_delay_ms(5_000),
        )
        .await;

    let dispatcher = Arc::new(Dispatcher::unlimited(
        provider.clone(),
        DispatchConfig {
            timeout_ms: 150,
            ..common::fast_dispatch()
        },
    ));
    let config = OrchestratorConfig {
        max_pass_retries: 2,
        pass_retry_delay_ms: 50,
        ..orchestrator_config(2)
    };
    let report = DomainOrchestrator::new(store.clone(), dispatcher, config)
        .with_planning_date(planning_date())
        .run()
        .await
        .unwrap();

    assert!(report.is_complete(), "outcomes: {:?}", report.outcomes);
    assert!(report.errors.is_empty());
    match &report.outcomes[&Domain::Transport] {
        DomainOutcome::Settled { retries, .. } => assert_eq!(*retries, 0),
        other => panic!("transport did not settle: {other:?}"),
    }

    let entry = store.domain_state(Domain::EntryRequirements).await.unwrap();
    assert_eq!(entry.search_tasks.len(), 5);
    assert_eq!(entry.degraded_count(), 5);
    assert_eq!(
        store.domain_state(Domain::Transport).await.unwrap().search_tasks.len(),
        1
    );
}

#[tokio::test]
async fn test_incomplete_intake_never_dispatches() {
    let mut intake = family_intake();
    intake.trip.destination = None;
    let store = store_with(intake).await;
    let provider = Arc::new(MockCapabilityProvider::new());

    let err = orchestrator(store.clone(), provider.clone(), 4)
        .run()
        .await
        .unwrap_err();

    assert!(matches!(err, DomainError::IntakeIncomplete { .. }));
    assert_eq!(store.status().await, PlannerStatus::Intake);
    assert_eq!(provider.total_calls().await, 0);
}

#[tokio::test]
async fn test_cancelled_run_resumes_without_duplicates() {
    let store = store_with(family_intake()).await;
    let slow = Arc::new(MockCapabilityProvider::new());
    slow.set_domain_response(
        Domain::EntryRequirements,
        MockResponse::success(json!({"options": [{"id": "evisa", "name": "eVisa"}]}))
            .with_delay_ms(200),
    )
    .await;

    let dispatcher = Arc::new(Dispatcher::unlimited(
        slow,
        DispatchConfig {
            timeout_ms: 2_000,
            ..common::fast_dispatch()
        },
    ));
    let cancel = CancellationToken::new();
    let first = DomainOrchestrator::new(store.clone(), dispatcher, orchestrator_config(4))
        .with_planning_date(planning_date())
        .with_cancellation(cancel.clone());

    let canceller = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();
    });
    let report = first.run().await.unwrap();
    canceller.await.unwrap();

    assert!(report.cancelled);
    assert!(!report.is_complete());
    assert_eq!(store.status().await, PlannerStatus::Planning);

    let provider = Arc::new(MockCapabilityProvider::new());
    let report = orchestrator(store.clone(), provider, 4).run().await.unwrap();
    assert!(report.is_complete());

    for state in store.domain_states().await.values() {
        let mut ids: Vec<&str> = state.search_tasks.iter().map(|t| t.task_id.as_str()).collect();
        let total = ids.len();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), total, "duplicate tasks in {}", state.domain);
        assert!(state
            .search_tasks
            .iter()
            .all(|t| t.status != TaskStatus::Dispatched));
    }
}

#[tokio::test]
async fn test_completed_record_rerun_is_stable() {
    let store = store_with(family_intake()).await;
    let provider = Arc::new(MockCapabilityProvider::new());

    orchestrator(store.clone(), provider.clone(), 4)
        .run()
        .await
        .unwrap();
    let calls = provider.total_calls().await;
    let before = serde_json::to_value(store.domain_states().await).unwrap();

    let report = orchestrator(store.clone(), provider.clone(), 4)
        .run()
        .await
        .unwrap();
    assert_eq!(report.status, PlannerStatus::Done);
    assert_eq!(provider.total_calls().await, calls);

    let after = serde_json::to_value(store.domain_states().await).unwrap();
    assert_eq!(
        before["entry_requirements"]["search_tasks"],
        after["entry_requirements"]["search_tasks"]
    );
    assert_eq!(before["lodging"]["results"], after["lodging"]["results"]);
}

#[tokio::test]
async fn test_fixture_provider_plans_trip() {
    let fixtures = FixtureCapabilityProvider::parse(
        r#"
capabilities:
  lodging_search:
    options:
      - id: riverside
        name: Riverside Family Suites
        price: { amount: 1400, currency: USD }
    selections: { family_friendly: riverside }
  transport_search:
    options:
      - id: los-lhr
        name: LOS-LHR return
        price: { amount: 650, currency: USD, basis: per_person }
    selections: { balanced: los-lhr }
generate_missing: true
"#,
    )
    .unwrap();

    let store = store_with(family_intake()).await;
    let dispatcher = Arc::new(Dispatcher::unlimited(
        Arc::new(fixtures),
        common::fast_dispatch(),
    ));
    let report = DomainOrchestrator::new(store.clone(), dispatcher, orchestrator_config(4))
        .with_planning_date(planning_date())
        .run()
        .await
        .unwrap();
    assert!(report.is_complete());

    let summary = report.summary.unwrap();
    let lodging = summary.highlight(Domain::Lodging).unwrap();
    assert!(lodging
        .selections
        .iter()
        .any(|s| s.contains("Riverside Family Suites")));
    assert!(summary.costs.domain_total(Domain::Transport, "USD") >= 650.0);
    let budget = summary.budget.unwrap();
    assert_eq!(budget.currency, "USD");
}

#[tokio::test]
async fn test_store_rejects_intake_after_planning_starts() {
    let store = store_with(family_intake()).await;
    orchestrator(store.clone(), Arc::new(MockCapabilityProvider::new()), 4)
        .run()
        .await
        .unwrap();

    let err = store
        .update_trip_details(Default::default())
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::IntakeClosed(_)));

    // A fresh store still accepts intake.
    TripRecordStore::new()
        .update_trip_details(Default::default())
        .await
        .unwrap();
}
