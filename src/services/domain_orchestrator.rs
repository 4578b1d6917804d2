//! Wave-based execution of the domain pipelines.
//!
//! The domain DAG is grouped into waves. Domains of a wave run their
//! pipeline pass concurrently, bounded by `max_concurrency`:
//! `TaskDeriver -> Dispatcher (every pending task) -> ResultApplier (every result)`.
//! A deriver whose upstream pipeline is still running in the same wave waits
//! for that pass to end. An upstream that is not running and not settled is
//! retried at pipeline level, waking on store changes, up to
//! `max_pass_retries` times.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveDate, Utc};
use tokio::sync::{mpsc, watch, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    Domain, DomainDag, DomainState, OrchestratorConfig, PlannerStatus, SearchResult, SearchTask,
    TaskStatus, TripSummary,
};
use crate::services::dependency_resolver::DependencyResolver;
use crate::services::dispatcher::Dispatcher;
use crate::services::result_appliers::applier_for;
use crate::services::summary_synthesizer::SummarySynthesizer;
use crate::services::task_derivers::{deriver_for, DeriveContext, Derivation};
use crate::services::trip_record_store::TripRecordStore;

/// How one domain's pipeline ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DomainOutcome {
    /// Every task has a result
    Settled {
        tasks: usize,
        new_tasks: usize,
        dispatched: usize,
        degraded: usize,
        retries: u32,
    },
    /// Upstream stayed unsettled past the retry bound
    DependencyNotReady(String),
    /// Not run because an upstream domain did not settle
    Skipped(String),
    Cancelled,
    Failed(String),
}

impl DomainOutcome {
    pub fn is_settled(&self) -> bool {
        matches!(self, Self::Settled { .. })
    }
}

/// Event emitted during a run.
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionEvent {
    Started { wave_count: usize },
    WaveStarted { wave_number: usize, domains: Vec<Domain> },
    PassRetrying { domain: Domain, attempt: u32, reason: String },
    TaskDispatched { domain: Domain, task_id: String },
    TaskResolved { domain: Domain, task_id: String, degraded: bool },
    DomainFinished { domain: Domain, outcome: DomainOutcome },
    WaveCompleted { wave_number: usize },
    Completed { status: PlannerStatus },
}

/// What a run did.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub outcomes: BTreeMap<Domain, DomainOutcome>,
    /// Caller-visible dependency errors, one per affected domain
    pub errors: Vec<DomainError>,
    /// Present once every domain settled
    pub summary: Option<TripSummary>,
    pub status: PlannerStatus,
    pub cancelled: bool,
}

impl RunReport {
    pub fn is_complete(&self) -> bool {
        self.status == PlannerStatus::Done
    }

    pub fn skipped(&self) -> Vec<Domain> {
        self.outcomes
            .iter()
            .filter(|(_, o)| matches!(o, DomainOutcome::Skipped(_)))
            .map(|(d, _)| *d)
            .collect()
    }
}

/// State shared by every pipeline of a run.
struct PassContext {
    store: Arc<TripRecordStore>,
    dispatcher: Arc<Dispatcher>,
    dispatch_permits: Arc<Semaphore>,
    config: OrchestratorConfig,
    planning_date: NaiveDate,
    cancel: CancellationToken,
    events: Option<mpsc::Sender<ExecutionEvent>>,
    /// Domains with a pipeline pass in flight
    running: watch::Sender<BTreeSet<Domain>>,
}

impl PassContext {
    async fn emit(&self, event: ExecutionEvent) {
        if let Some(tx) = &self.events {
            let _ = tx.send(event).await;
        }
    }

    fn mark_running(&self, domain: Domain) {
        self.running.send_modify(|running| {
            running.insert(domain);
        });
    }
}

/// Clears a domain from the running set when its pass ends, even on panic.
struct RunningGuard {
    ctx: Arc<PassContext>,
    domain: Domain,
}

impl Drop for RunningGuard {
    fn drop(&mut self) {
        let domain = self.domain;
        self.ctx.running.send_modify(|running| {
            running.remove(&domain);
        });
    }
}

pub struct DomainOrchestrator {
    store: Arc<TripRecordStore>,
    dispatcher: Arc<Dispatcher>,
    config: OrchestratorConfig,
    dag: DomainDag,
    planning_date: NaiveDate,
    cancel: CancellationToken,
    events: Option<mpsc::Sender<ExecutionEvent>>,
}

impl DomainOrchestrator {
    pub fn new(
        store: Arc<TripRecordStore>,
        dispatcher: Arc<Dispatcher>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            store,
            dispatcher,
            config,
            dag: DomainDag::standard(),
            planning_date: Utc::now().date_naive(),
            cancel: CancellationToken::new(),
            events: None,
        }
    }

    /// "Today" for lead-time arithmetic.
    pub fn with_planning_date(mut self, planning_date: NaiveDate) -> Self {
        self.planning_date = planning_date;
        self
    }

    pub fn with_dag(mut self, dag: DomainDag) -> Self {
        self.dag = dag;
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_events(mut self, events: mpsc::Sender<ExecutionEvent>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Confirm the record is ready, run every wave, and complete planning
    /// when all domains settled.
    pub async fn run(&self) -> DomainResult<RunReport> {
        self.store.confirm_ready().await?;

        let resolver = DependencyResolver::new();
        resolver.validate_edges(&self.dag)?;
        let waves = resolver.execution_waves(&self.dag)?;

        let max_concurrency = self.config.max_concurrency.max(1);
        let ctx = Arc::new(PassContext {
            store: Arc::clone(&self.store),
            dispatcher: Arc::clone(&self.dispatcher),
            dispatch_permits: Arc::new(Semaphore::new(max_concurrency)),
            config: self.config.clone(),
            planning_date: self.planning_date,
            cancel: self.cancel.clone(),
            events: self.events.clone(),
            running: watch::Sender::new(BTreeSet::new()),
        });
        let pass_permits = Arc::new(Semaphore::new(max_concurrency));

        info!(
            waves = waves.len(),
            max_concurrency,
            planning_date = %self.planning_date,
            "planning run started"
        );
        ctx.emit(ExecutionEvent::Started {
            wave_count: waves.len(),
        })
        .await;

        let mut outcomes: BTreeMap<Domain, DomainOutcome> = BTreeMap::new();

        for (wave_idx, wave) in waves.iter().enumerate() {
            ctx.emit(ExecutionEvent::WaveStarted {
                wave_number: wave_idx + 1,
                domains: wave.clone(),
            })
            .await;

            let mut join = JoinSet::new();
            for &domain in wave {
                if self.cancel.is_cancelled() {
                    outcomes.insert(domain, DomainOutcome::Cancelled);
                    continue;
                }
                if let Some(reason) = self.blocked_by(domain, &outcomes) {
                    info!(domain = %domain, %reason, "domain skipped");
                    let outcome = DomainOutcome::Skipped(reason);
                    ctx.emit(ExecutionEvent::DomainFinished {
                        domain,
                        outcome: outcome.clone(),
                    })
                    .await;
                    outcomes.insert(domain, outcome);
                    continue;
                }

                let permit = Arc::clone(&pass_permits)
                    .acquire_owned()
                    .await
                    .map_err(|_| DomainError::ValidationFailed("pass semaphore closed".to_string()))?;
                // Marked before spawning so later domains of the wave see it.
                ctx.mark_running(domain);
                let guard = RunningGuard {
                    ctx: Arc::clone(&ctx),
                    domain,
                };
                let ctx = Arc::clone(&ctx);
                join.spawn(async move {
                    let _permit = permit;
                    let _guard = guard;
                    let outcome = run_domain(&ctx, domain).await;
                    ctx.emit(ExecutionEvent::DomainFinished {
                        domain,
                        outcome: outcome.clone(),
                    })
                    .await;
                    (domain, outcome)
                });
            }

            while let Some(joined) = join.join_next().await {
                match joined {
                    Ok((domain, outcome)) => {
                        outcomes.insert(domain, outcome);
                    }
                    Err(err) => warn!(error = %err, "domain pipeline aborted"),
                }
            }

            ctx.emit(ExecutionEvent::WaveCompleted {
                wave_number: wave_idx + 1,
            })
            .await;
        }

        for domain in &self.dag.nodes {
            outcomes
                .entry(*domain)
                .or_insert_with(|| DomainOutcome::Failed("pipeline aborted".to_string()));
        }

        let errors: Vec<DomainError> = outcomes
            .iter()
            .filter_map(|(domain, outcome)| match outcome {
                DomainOutcome::DependencyNotReady(reason) | DomainOutcome::Skipped(reason) => {
                    Some(DomainError::DependencyNotReady {
                        domain: *domain,
                        reason: reason.clone(),
                    })
                }
                _ => None,
            })
            .collect();

        let summary = if outcomes.values().all(DomainOutcome::is_settled) {
            let snapshot = self.store.snapshot().await;
            let summary = SummarySynthesizer::synthesize(&snapshot.record, &snapshot.states);
            self.store
                .complete_planning(&self.dag.nodes, &summary)
                .await?;
            Some(summary)
        } else {
            None
        };

        let status = self.store.status().await;
        info!(
            status = %status,
            settled = outcomes.values().filter(|o| o.is_settled()).count(),
            errors = errors.len(),
            "planning run finished"
        );
        ctx.emit(ExecutionEvent::Completed { status }).await;

        Ok(RunReport {
            outcomes,
            errors,
            summary,
            status,
            cancelled: self.cancel.is_cancelled(),
        })
    }

    /// Reason a domain cannot run, if an upstream domain did not settle.
    fn blocked_by(&self, domain: Domain, outcomes: &BTreeMap<Domain, DomainOutcome>) -> Option<String> {
        self.dag
            .dependencies_of(domain)
            .into_iter()
            .find(|dep| !outcomes.get(dep).is_some_and(DomainOutcome::is_settled))
            .map(|dep| format!("upstream {dep} did not settle"))
    }
}

/// Return dispatched tasks that never got a result to pending.
fn requeue_unresolved(state: &mut DomainState) -> DomainResult<usize> {
    let interrupted: Vec<String> = state
        .unresolved_tasks()
        .into_iter()
        .filter(|t| t.status == TaskStatus::Dispatched)
        .map(|t| t.task_id.clone())
        .collect();
    for task_id in &interrupted {
        state.transition_task(task_id, TaskStatus::Pending)?;
    }
    Ok(interrupted.len())
}

/// Derive, waiting while an upstream pass is in flight and retrying while
/// an idle upstream is unsettled.
async fn derive_tasks(
    ctx: &PassContext,
    domain: Domain,
    existing: &DomainState,
) -> Result<(Vec<SearchTask>, u32), DomainOutcome> {
    let deriver = deriver_for(domain, ctx.config.activity_chunk_days);
    let delay = Duration::from_millis(ctx.config.pass_retry_delay_ms);
    let mut retries = 0;

    loop {
        if ctx.cancel.is_cancelled() {
            return Err(DomainOutcome::Cancelled);
        }

        let mut changes = ctx.store.subscribe();
        let mut running = ctx.running.subscribe();
        let snapshot = ctx.store.snapshot().await;
        let derive_ctx = DeriveContext::new(&snapshot.record, &snapshot.states, ctx.planning_date);

        let reason = match deriver.derive(&derive_ctx, existing) {
            Derivation::Tasks(tasks) => return Ok((tasks, retries)),
            Derivation::UpstreamNotReady(reason) => reason,
        };

        let in_flight: Vec<Domain> = {
            let running = running.borrow_and_update();
            deriver
                .upstream()
                .iter()
                .copied()
                .filter(|d| running.contains(d))
                .collect()
        };
        if !in_flight.is_empty() {
            debug!(domain = %domain, upstream = ?in_flight, "waiting for upstream pass");
            tokio::select! {
                _ = running.changed() => {}
                () = ctx.cancel.cancelled() => return Err(DomainOutcome::Cancelled),
            }
            continue;
        }

        if retries >= ctx.config.max_pass_retries {
            warn!(domain = %domain, retries, %reason, "upstream not ready, giving up");
            return Err(DomainOutcome::DependencyNotReady(reason));
        }
        retries += 1;
        debug!(domain = %domain, attempt = retries, %reason, "upstream not ready, waiting");
        ctx.emit(ExecutionEvent::PassRetrying {
            domain,
            attempt: retries,
            reason,
        })
        .await;

        tokio::select! {
            _ = changes.changed() => {}
            () = tokio::time::sleep(delay) => {}
            () = ctx.cancel.cancelled() => return Err(DomainOutcome::Cancelled),
        }
    }
}

/// Dispatch tasks with bounded concurrency; results keyed by task order.
async fn dispatch_all(
    ctx: &PassContext,
    domain: Domain,
    tasks: Vec<SearchTask>,
) -> BTreeMap<usize, SearchResult> {
    let mut join = JoinSet::new();
    for (order, task) in tasks.into_iter().enumerate() {
        let permit = tokio::select! {
            biased;
            () = ctx.cancel.cancelled() => break,
            permit = Arc::clone(&ctx.dispatch_permits).acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => break,
            },
        };
        ctx.emit(ExecutionEvent::TaskDispatched {
            domain,
            task_id: task.task_id.clone(),
        })
        .await;

        let dispatcher = Arc::clone(&ctx.dispatcher);
        join.spawn(async move {
            let _permit = permit;
            (order, dispatcher.dispatch(&task).await)
        });
    }

    let mut results = BTreeMap::new();
    while let Some(joined) = join.join_next().await {
        match joined {
            Ok((order, result)) => {
                results.insert(order, result);
            }
            Err(err) => warn!(domain = %domain, error = %err, "dispatch aborted"),
        }
    }
    results
}

/// One pipeline pass for `domain`.
async fn run_domain(ctx: &PassContext, domain: Domain) -> DomainOutcome {
    let writer = match ctx.store.writer(domain) {
        Ok(writer) => writer,
        Err(err) => return DomainOutcome::Failed(err.to_string()),
    };
    let applier = applier_for(domain);

    let existing = writer.snapshot().await;
    let (tasks, retries) = match derive_tasks(ctx, domain, &existing).await {
        Ok(derived) => derived,
        Err(outcome) => return outcome,
    };
    let new_tasks = tasks.len();

    let pending = writer
        .update(|state| {
            let requeued = requeue_unresolved(state)?;
            if requeued > 0 {
                info!(domain = %domain, requeued, "re-dispatching interrupted tasks");
            }
            state.append_tasks(tasks)?;
            let pending: Vec<SearchTask> = state.unresolved_tasks().into_iter().cloned().collect();
            for task in &pending {
                state.transition_task(&task.task_id, TaskStatus::Dispatched)?;
            }
            Ok(pending)
        })
        .await;
    let pending = match pending {
        Ok(pending) => pending,
        Err(err) => return DomainOutcome::Failed(err.to_string()),
    };

    info!(domain = %domain, new_tasks, dispatching = pending.len(), "pipeline pass started");
    let results = dispatch_all(ctx, domain, pending).await;
    let dispatched = results.len();
    let resolved: Vec<(String, bool)> = results
        .values()
        .map(|r| (r.task_id.clone(), r.degraded))
        .collect();
    let cancelled = ctx.cancel.is_cancelled();

    let committed = writer
        .update(|state| {
            for result in results.into_values() {
                let task_id = result.task_id.clone();
                if let Err(err) = applier.apply(state, result) {
                    warn!(domain = %domain, task_id = %task_id, error = %err, "result not applied");
                }
            }
            requeue_unresolved(state)?;
            if !cancelled {
                state.completed_passes += 1;
            }
            Ok((
                state.is_settled(),
                state.search_tasks.len(),
                state.degraded_count(),
                state.unresolved_tasks().len(),
            ))
        })
        .await;

    for (task_id, degraded) in resolved {
        ctx.emit(ExecutionEvent::TaskResolved {
            domain,
            task_id,
            degraded,
        })
        .await;
    }

    match committed {
        Ok((true, tasks, degraded, _)) => {
            info!(domain = %domain, tasks, degraded, "domain settled");
            DomainOutcome::Settled {
                tasks,
                new_tasks,
                dispatched,
                degraded,
                retries,
            }
        }
        Ok(_) if cancelled => {
            info!(domain = %domain, "pipeline pass cancelled");
            DomainOutcome::Cancelled
        }
        Ok((false, _, _, unresolved)) => {
            DomainOutcome::Failed(format!("{unresolved} task(s) without a result"))
        }
        Err(err) => DomainOutcome::Failed(err.to_string()),
    }
}
