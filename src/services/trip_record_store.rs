//! In-session record store.
//!
//! Holds the one [`PlannerRecord`] and the per-domain [`DomainState`]s of a
//! planning session. Intake mutations and status transitions go through the
//! record lock; each domain's state is writable only through that domain's
//! [`DomainWriter`]. Every committed write bumps a version counter that
//! pipelines waiting on upstream state can subscribe to.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{watch, RwLock};
use tracing::{debug, info};

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    CompletenessReport, Domain, DomainState, HubUpdate, IntakeDocument, PartyComposition,
    PlannerRecord, PlannerStatus, PreferencesUpdate, Traveler, TravelerIndex, TravelerUpdate,
    TripDetailsUpdate, TripSummary,
};
use crate::services::status_machine::{StatusMachine, Transition};

struct DomainSlot {
    state: RwLock<Option<DomainState>>,
    claimed: AtomicBool,
}

impl DomainSlot {
    fn new() -> Self {
        Self {
            state: RwLock::new(None),
            claimed: AtomicBool::new(false),
        }
    }
}

/// Consistent read-only view of the store.
#[derive(Debug, Clone, PartialEq)]
pub struct StoreSnapshot {
    pub record: PlannerRecord,
    pub states: BTreeMap<Domain, DomainState>,
}

impl StoreSnapshot {
    pub fn state(&self, domain: Domain) -> Option<&DomainState> {
        self.states.get(&domain)
    }
}

/// Session store for the planner record and domain states.
pub struct TripRecordStore {
    record: RwLock<PlannerRecord>,
    slots: BTreeMap<Domain, Arc<DomainSlot>>,
    version: Arc<watch::Sender<u64>>,
}

impl TripRecordStore {
    pub fn new() -> Self {
        Self::with_record(PlannerRecord::new())
    }

    /// Start a session from an existing record.
    pub fn with_record(record: PlannerRecord) -> Self {
        let (version, _) = watch::channel(0);
        Self {
            record: RwLock::new(record),
            slots: Domain::ALL
                .iter()
                .map(|&d| (d, Arc::new(DomainSlot::new())))
                .collect(),
            version: Arc::new(version),
        }
    }

    /// Receiver notified after every committed write.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.version.subscribe()
    }

    pub fn version(&self) -> u64 {
        *self.version.borrow()
    }

    fn bump(&self) {
        bump_version(&self.version);
    }

    pub async fn record(&self) -> PlannerRecord {
        self.record.read().await.clone()
    }

    pub async fn status(&self) -> PlannerStatus {
        self.record.read().await.status
    }

    /// State of a domain, if its pipeline has run.
    pub async fn domain_state(&self, domain: Domain) -> Option<DomainState> {
        match self.slots.get(&domain) {
            Some(slot) => slot.state.read().await.clone(),
            None => None,
        }
    }

    /// Every domain state created so far.
    pub async fn domain_states(&self) -> BTreeMap<Domain, DomainState> {
        let mut states = BTreeMap::new();
        for (domain, slot) in &self.slots {
            if let Some(state) = slot.state.read().await.clone() {
                states.insert(*domain, state);
            }
        }
        states
    }

    pub async fn snapshot(&self) -> StoreSnapshot {
        let record = self.record().await;
        let states = self.domain_states().await;
        StoreSnapshot { record, states }
    }

    /// Claim write ownership of a domain's state.
    ///
    /// Only one writer per domain may exist at a time; the claim is released
    /// when the writer is dropped.
    pub fn writer(&self, domain: Domain) -> DomainResult<DomainWriter> {
        let slot = self
            .slots
            .get(&domain)
            .ok_or_else(|| DomainError::WriteOwnership(format!("no slot for {domain}")))?;

        if slot
            .claimed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(DomainError::WriteOwnership(format!(
                "{domain} already has a writer"
            )));
        }

        Ok(DomainWriter {
            domain,
            slot: Arc::clone(slot),
            version: Arc::clone(&self.version),
        })
    }

    // ----- intake entry points -----

    async fn mutate_intake<T>(
        &self,
        f: impl FnOnce(&mut PlannerRecord) -> DomainResult<T>,
    ) -> DomainResult<T> {
        let mut guard = self.record.write().await;
        if guard.status != PlannerStatus::Intake {
            return Err(DomainError::IntakeClosed(guard.status));
        }
        let mut draft = guard.clone();
        let value = f(&mut draft)?;
        *guard = draft;
        drop(guard);
        self.bump();
        Ok(value)
    }

    pub async fn update_trip_details(&self, update: TripDetailsUpdate) -> DomainResult<()> {
        self.mutate_intake(|record| {
            update.apply_to(&mut record.trip);
            Ok(())
        })
        .await
    }

    /// Add a traveler and return its new, never reused index.
    pub async fn add_traveler(&self, update: TravelerUpdate) -> DomainResult<TravelerIndex> {
        self.mutate_intake(|record| Ok(push_traveler(record, update)))
            .await
    }

    /// Add a whole party given as head counts.
    pub async fn add_party(&self, party: PartyComposition) -> DomainResult<Vec<TravelerIndex>> {
        self.mutate_intake(|record| {
            Ok(party
                .members()
                .into_iter()
                .map(|member| push_traveler(record, member))
                .collect())
        })
        .await
    }

    pub async fn update_traveler(
        &self,
        index: TravelerIndex,
        update: TravelerUpdate,
    ) -> DomainResult<()> {
        self.mutate_intake(|record| {
            let traveler = record
                .travelers
                .iter_mut()
                .find(|t| t.index == index)
                .ok_or(DomainError::TravelerNotFound(index))?;
            update.apply_to(traveler);
            Ok(())
        })
        .await
    }

    pub async fn remove_traveler(&self, index: TravelerIndex) -> DomainResult<()> {
        self.mutate_intake(|record| {
            let before = record.travelers.len();
            record.travelers.retain(|t| t.index != index);
            if record.travelers.len() == before {
                return Err(DomainError::TravelerNotFound(index));
            }
            Ok(())
        })
        .await
    }

    pub async fn update_preferences(&self, update: PreferencesUpdate) -> DomainResult<()> {
        self.mutate_intake(|record| {
            update.apply_to(&mut record.preferences);
            Ok(())
        })
        .await
    }

    pub async fn update_hubs(&self, mut update: HubUpdate) -> DomainResult<()> {
        self.mutate_intake(|record| {
            update.apply_trip_codes(&mut record.hubs);
            for (index, hub) in std::mem::take(&mut update.travelers) {
                let traveler = record
                    .travelers
                    .iter_mut()
                    .find(|t| t.index == index)
                    .ok_or(DomainError::TravelerNotFound(index))?;
                traveler.origin_hub = Some(hub);
            }
            Ok(())
        })
        .await
    }

    /// Replay a captured intake document through the entry points above.
    pub async fn apply_intake(&self, document: IntakeDocument) -> DomainResult<()> {
        self.update_trip_details(document.trip).await?;
        if let Some(party) = document.party {
            self.add_party(party).await?;
        }
        for traveler in document.travelers {
            self.add_traveler(traveler).await?;
        }
        self.update_preferences(document.preferences).await?;
        self.update_hubs(document.hubs).await
    }

    pub async fn check_completeness(&self) -> CompletenessReport {
        let record = self.record.read().await;
        let missing = record.missing_fields();
        CompletenessReport {
            status: record.status,
            complete: missing.is_empty(),
            missing,
        }
    }

    // ----- status transitions -----

    /// The collaborator's explicit ready signal.
    pub async fn confirm_ready(&self) -> DomainResult<Transition> {
        let mut record = self.record.write().await;
        let transition = StatusMachine::confirm_ready(&mut record)?;
        drop(record);
        if matches!(transition, Transition::Advanced { .. }) {
            self.bump();
        }
        Ok(transition)
    }

    /// Move to `done` once the required domains settled and a summary exists.
    pub async fn complete_planning(
        &self,
        required: &[Domain],
        summary: &TripSummary,
    ) -> DomainResult<Transition> {
        let mut record = self.record.write().await;
        // Held across the settledness check and the status write.
        let states = self.domain_states().await;
        let transition = StatusMachine::complete(&mut record, &states, required, summary)?;
        drop(record);
        if matches!(transition, Transition::Advanced { .. }) {
            self.bump();
        }
        Ok(transition)
    }
}

impl Default for TripRecordStore {
    fn default() -> Self {
        Self::new()
    }
}

fn push_traveler(record: &mut PlannerRecord, update: TravelerUpdate) -> TravelerIndex {
    let index = record.next_traveler_index;
    record.next_traveler_index += 1;
    let mut traveler = Traveler::new(index, update.role_or_default());
    update.apply_to(&mut traveler);
    record.travelers.push(traveler);
    debug!(traveler = index, "traveler added");
    index
}

fn bump_version(version: &watch::Sender<u64>) {
    version.send_modify(|v| *v += 1);
}

/// Exclusive write handle for one domain's state.
pub struct DomainWriter {
    domain: Domain,
    slot: Arc<DomainSlot>,
    version: Arc<watch::Sender<u64>>,
}

impl DomainWriter {
    pub fn domain(&self) -> Domain {
        self.domain
    }

    /// Current state, created lazily on first access.
    pub async fn snapshot(&self) -> DomainState {
        self.slot
            .state
            .read()
            .await
            .clone()
            .unwrap_or_else(|| DomainState::new(self.domain))
    }

    /// Apply `f` to a draft of the state and commit it only if `f` succeeds.
    pub async fn update<R>(
        &self,
        f: impl FnOnce(&mut DomainState) -> DomainResult<R>,
    ) -> DomainResult<R> {
        let mut guard = self.slot.state.write().await;
        let mut draft = guard
            .clone()
            .unwrap_or_else(|| DomainState::new(self.domain));
        let value = f(&mut draft)?;

        let changed = guard.as_ref() != Some(&draft);
        if guard.is_none() {
            info!(domain = %self.domain, "domain state created");
        }
        *guard = Some(draft);
        drop(guard);

        if changed {
            bump_version(&self.version);
        }
        Ok(value)
    }
}

impl Drop for DomainWriter {
    fn drop(&mut self) {
        self.slot.claimed.store(false, Ordering::Release);
    }
}
