//! Field-group updates supplied by the intake collaborator.
//!
//! Every update merges only the fields that are set, so a collaborator can
//! send partial facts as they are learned.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::planner::{
    BudgetMode, HubCodes, MissingField, Pace, PlannerStatus, Preferences, Traveler,
    TravelerConstraints, TravelerIndex, TravelerRole, TripDetails,
};

fn merge<T>(target: &mut Option<T>, value: Option<T>) {
    if value.is_some() {
        *target = value;
    }
}

/// Destination, origin and dates.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TripDetailsUpdate {
    pub destination: Option<String>,
    pub origin: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub flexible_dates: Option<bool>,
}

impl TripDetailsUpdate {
    pub fn apply_to(self, trip: &mut TripDetails) {
        merge(&mut trip.destination, self.destination);
        merge(&mut trip.origin, self.origin);
        merge(&mut trip.start_date, self.start_date);
        merge(&mut trip.end_date, self.end_date);
        if let Some(flexible) = self.flexible_dates {
            trip.flexible_dates = flexible;
        }
    }
}

/// Facts about one traveler.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TravelerUpdate {
    pub role: Option<TravelerRole>,
    pub age: Option<u8>,
    pub nationality: Option<String>,
    pub origin: Option<String>,
    pub origin_hub: Option<String>,
    pub interests: Option<Vec<String>>,
    pub constraints: Option<TravelerConstraints>,
}

impl TravelerUpdate {
    pub fn apply_to(self, traveler: &mut Traveler) {
        if let Some(role) = self.role {
            traveler.role = role;
        }
        merge(&mut traveler.age, self.age);
        merge(&mut traveler.nationality, self.nationality);
        merge(&mut traveler.origin, self.origin);
        merge(&mut traveler.origin_hub, self.origin_hub);
        if let Some(interests) = self.interests {
            traveler.interests = interests;
        }
        if let Some(constraints) = self.constraints {
            traveler.constraints = constraints;
        }
    }

    /// Role to use when the update creates a new traveler.
    pub fn role_or_default(&self) -> TravelerRole {
        self.role.unwrap_or(match self.age {
            Some(age) if age < 18 => TravelerRole::Child,
            Some(age) if age >= 65 => TravelerRole::Senior,
            _ => TravelerRole::Adult,
        })
    }
}

/// Budget, pace and the free-form preference fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreferencesUpdate {
    pub budget_mode: Option<BudgetMode>,
    pub total_budget: Option<f64>,
    pub budget_currency: Option<String>,
    pub pace: Option<Pace>,
    pub interests: Option<Vec<String>>,
    pub must_do: Option<Vec<String>>,
    pub nice_to_have: Option<Vec<String>>,
    pub neighborhood_preferences: Option<Vec<String>>,
    pub neighborhood_avoid: Option<Vec<String>>,
    pub room_configuration: Option<String>,
    pub transport_preferences: Option<Vec<String>>,
    pub notes: Option<String>,
}

impl PreferencesUpdate {
    pub fn apply_to(self, prefs: &mut Preferences) {
        merge(&mut prefs.budget_mode, self.budget_mode);
        merge(&mut prefs.total_budget, self.total_budget);
        merge(&mut prefs.budget_currency, self.budget_currency);
        if let Some(pace) = self.pace {
            prefs.pace = pace;
        }
        for (target, value) in [
            (&mut prefs.interests, self.interests),
            (&mut prefs.must_do, self.must_do),
            (&mut prefs.nice_to_have, self.nice_to_have),
            (&mut prefs.neighborhood_preferences, self.neighborhood_preferences),
            (&mut prefs.neighborhood_avoid, self.neighborhood_avoid),
            (&mut prefs.transport_preferences, self.transport_preferences),
        ] {
            if let Some(value) = value {
                *target = value;
            }
        }
        merge(&mut prefs.room_configuration, self.room_configuration);
        merge(&mut prefs.notes, self.notes);
    }
}

/// Resolved airport or hub codes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HubUpdate {
    pub origin: Option<String>,
    pub destination: Option<String>,
    /// Per-traveler origin hubs
    pub travelers: BTreeMap<TravelerIndex, String>,
}

impl HubUpdate {
    /// Apply the trip-level codes. Per-traveler codes are applied by the store,
    /// which owns traveler lookup.
    pub fn apply_trip_codes(&mut self, hubs: &mut HubCodes) {
        merge(&mut hubs.origin, self.origin.take());
        merge(&mut hubs.destination, self.destination.take());
    }
}

/// Party given as head counts rather than individual travelers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PartyComposition {
    pub adults: u32,
    pub children: u32,
    pub seniors: u32,
    /// Nationality assigned to every generated traveler
    pub nationality: Option<String>,
    /// Origin assigned to every generated traveler
    pub origin: Option<String>,
}

impl PartyComposition {
    /// Traveler updates for every member of the party, adults first.
    pub fn members(&self) -> Vec<TravelerUpdate> {
        let roles = std::iter::repeat(TravelerRole::Adult)
            .take(self.adults as usize)
            .chain(std::iter::repeat(TravelerRole::Child).take(self.children as usize))
            .chain(std::iter::repeat(TravelerRole::Senior).take(self.seniors as usize));

        roles
            .map(|role| TravelerUpdate {
                role: Some(role),
                nationality: self.nationality.clone(),
                origin: self.origin.clone(),
                ..TravelerUpdate::default()
            })
            .collect()
    }
}

/// Result of the completeness query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletenessReport {
    pub status: PlannerStatus,
    pub complete: bool,
    pub missing: Vec<MissingField>,
}

/// A whole intake conversation captured as one document.
///
/// Used by the CLI to replay collected facts through the store's
/// mutation entry points.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IntakeDocument {
    pub trip: TripDetailsUpdate,
    pub hubs: HubUpdate,
    pub travelers: Vec<TravelerUpdate>,
    pub party: Option<PartyComposition>,
    pub preferences: PreferencesUpdate,
}
