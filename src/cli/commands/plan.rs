//! Plan command: confirm the intake, run every domain pipeline, print the summary.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::Args;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{info, warn};

use super::intake_store;
use crate::adapters::providers::{FixtureCapabilityProvider, HttpCapabilityProvider};
use crate::cli::display::{list_table, output, render_list, CommandOutput};
use crate::domain::models::{ActionKind, Config, TripSummary};
use crate::domain::ports::CapabilityProvider;
use crate::services::{DomainOrchestrator, DomainOutcome, Dispatcher, ExecutionEvent, RunReport};

#[derive(Args, Debug)]
pub struct PlanArgs {
    /// Intake record (YAML or JSON)
    pub record: PathBuf,

    /// Serve capability responses from a fixture file
    #[arg(long, conflicts_with = "http")]
    pub fixtures: Option<PathBuf>,

    /// Call the HTTP endpoints from the providers config
    #[arg(long)]
    pub http: bool,

    /// Date lead times count from (YYYY-MM-DD, defaults to today)
    #[arg(long)]
    pub planning_date: Option<NaiveDate>,
}

impl PlanArgs {
    fn provider(&self, config: &Config) -> Result<Arc<dyn CapabilityProvider>> {
        if let Some(path) = &self.fixtures {
            let provider = FixtureCapabilityProvider::from_file(path)
                .with_context(|| format!("Failed to load fixtures from {}", path.display()))?;
            return Ok(Arc::new(provider));
        }
        if self.http {
            let provider = HttpCapabilityProvider::new(&config.providers)
                .context("Failed to build HTTP capability provider")?;
            return Ok(Arc::new(provider));
        }
        Ok(Arc::new(FixtureCapabilityProvider::generated()))
    }
}

#[derive(Debug, Serialize)]
pub struct PlanOutput {
    pub status: String,
    pub cancelled: bool,
    pub outcomes: BTreeMap<String, String>,
    pub errors: Vec<String>,
    pub summary: Option<TripSummary>,
}

fn describe_outcome(outcome: &DomainOutcome) -> String {
    match outcome {
        DomainOutcome::Settled {
            tasks,
            dispatched,
            degraded,
            ..
        } => format!("settled: {tasks} task(s), {dispatched} dispatched, {degraded} degraded"),
        DomainOutcome::DependencyNotReady(reason) => format!("dependency not ready: {reason}"),
        DomainOutcome::Skipped(reason) => format!("skipped: {reason}"),
        DomainOutcome::Cancelled => "cancelled".to_string(),
        DomainOutcome::Failed(reason) => format!("failed: {reason}"),
    }
}

fn action_label(kind: ActionKind) -> &'static str {
    match kind {
        ActionKind::VisaApplication => "visa",
        ActionKind::RetryDomain => "retry",
        ActionKind::ResolveTask => "resolve",
        ActionKind::Book => "book",
    }
}

impl From<&RunReport> for PlanOutput {
    fn from(report: &RunReport) -> Self {
        Self {
            status: report.status.as_str().to_string(),
            cancelled: report.cancelled,
            outcomes: report
                .outcomes
                .iter()
                .map(|(domain, outcome)| (domain.as_str().to_string(), describe_outcome(outcome)))
                .collect(),
            errors: report.errors.iter().map(ToString::to_string).collect(),
            summary: report.summary.clone(),
        }
    }
}

impl PlanOutput {
    fn summary_sections(summary: &TripSummary) -> Vec<String> {
        let mut sections = Vec::new();

        let mut header = format!(
            "{}: {} traveler(s)",
            summary.destination, summary.traveler_count
        );
        if let Some(window) = &summary.requested_window {
            header.push_str(&format!(", requested {window}"));
        }
        if let Some(window) = &summary.adjusted_window {
            header.push_str(&format!(", adjusted to {window}"));
        }
        sections.push(header);

        let mut highlights = list_table(&["domain", "selections", "notes"]);
        for highlight in &summary.highlights {
            highlights.add_row(vec![
                highlight.domain.label().to_string(),
                highlight.selections.join("\n"),
                highlight.notes.join("\n"),
            ]);
        }
        sections.push(render_list(
            "Highlights",
            &highlights,
            summary.highlights.len(),
        ));

        let mut costs = list_table(&["currency", "total"]);
        for (currency, total) in &summary.costs.total_by_currency {
            costs.add_row(vec![currency.clone(), format!("{total:.2}")]);
        }
        sections.push(render_list(
            "Estimated costs",
            &costs,
            summary.costs.total_by_currency.len(),
        ));

        if let Some(budget) = &summary.budget {
            let verdict = if budget.within_budget {
                "within budget"
            } else {
                "over budget"
            };
            sections.push(format!(
                "Budget: {:.2} of {:.2} {} ({verdict}, {:.2} remaining)",
                budget.estimated, budget.total_budget, budget.currency, budget.remaining
            ));
        }

        let mut actions = list_table(&["kind", "domain", "description"]);
        for item in &summary.action_items {
            actions.add_row(vec![
                action_label(item.kind).to_string(),
                item.domain.label().to_string(),
                item.description.clone(),
            ]);
        }
        sections.push(render_list(
            "Action items",
            &actions,
            summary.action_items.len(),
        ));

        sections
    }
}

impl CommandOutput for PlanOutput {
    fn to_human(&self) -> String {
        let mut sections = vec![format!("Status: {}", self.status)];
        if self.cancelled {
            sections.push("Run cancelled before every domain settled".to_string());
        }

        let mut outcomes = list_table(&["domain", "outcome"]);
        for (domain, outcome) in &self.outcomes {
            outcomes.add_row(vec![domain.clone(), outcome.clone()]);
        }
        sections.push(render_list("Domains", &outcomes, self.outcomes.len()));

        for error in &self.errors {
            sections.push(format!("Error: {error}"));
        }

        if let Some(summary) = &self.summary {
            sections.extend(Self::summary_sections(summary));
        }

        sections.join("\n\n")
    }
}

/// One progress line per interesting event.
fn describe_event(event: &ExecutionEvent) -> Option<String> {
    match event {
        ExecutionEvent::WaveStarted {
            wave_number,
            domains,
        } => {
            let names: Vec<&str> = domains.iter().map(|d| d.label()).collect();
            Some(format!("wave {wave_number}: {}", names.join(", ")))
        }
        ExecutionEvent::PassRetrying {
            domain,
            attempt,
            reason,
        } => Some(format!(
            "{}: waiting on upstream (attempt {attempt}): {reason}",
            domain.label()
        )),
        ExecutionEvent::DomainFinished { domain, outcome } => {
            Some(format!("{}: {}", domain.label(), describe_outcome(outcome)))
        }
        _ => None,
    }
}

pub async fn execute(args: PlanArgs, config: &Config, json_mode: bool) -> Result<()> {
    let store = intake_store(&args.record).await?;
    let provider = args.provider(config)?;
    let dispatcher = Arc::new(Dispatcher::new(
        provider,
        config.dispatch.clone(),
        &config.rate_limit,
    ));
    info!(provider = dispatcher.provider_name(), "planning trip");

    let (tx, mut rx) = mpsc::channel(64);
    let mut orchestrator =
        DomainOrchestrator::new(store, dispatcher, config.orchestrator.clone()).with_events(tx);
    if let Some(date) = args.planning_date {
        orchestrator = orchestrator.with_planning_date(date);
    }

    let progress = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            if json_mode {
                continue;
            }
            if let Some(line) = describe_event(&event) {
                eprintln!("{line}");
            }
        }
    });

    let cancel = orchestrator.cancellation_token();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, cancelling run");
            cancel.cancel();
        }
    });

    let result = orchestrator.run().await;
    interrupt.abort();
    drop(orchestrator);
    let _ = progress.await;

    let report = result.context("Planning could not start")?;
    output(&PlanOutput::from(&report), json_mode);

    if !report.is_complete() {
        anyhow::bail!(
            "Planning incomplete: {} of {} domain(s) settled",
            report.outcomes.values().filter(|o| o.is_settled()).count(),
            report.outcomes.len()
        );
    }
    Ok(())
}
