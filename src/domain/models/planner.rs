//! Planner record domain model.
//!
//! The planner record holds every trip fact gathered during intake: where,
//! when, who, and how. It is the single upstream input to all domain
//! pipelines.

use std::collections::BTreeSet;
use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Stable traveler identity within a record.
pub type TravelerIndex = u32;

/// Top-level planning phase.
///
/// Ordering follows the lifecycle, so `status` can only ever move forward.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum PlannerStatus {
    /// Trip facts are still being collected
    #[default]
    Intake,
    /// Domain pipelines are running
    Planning,
    /// Every domain settled and a summary was produced
    Done,
}

impl PlannerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Intake => "intake",
            Self::Planning => "planning",
            Self::Done => "done",
        }
    }

    /// The next phase in the lifecycle, if any.
    pub fn successor(&self) -> Option<Self> {
        match self {
            Self::Intake => Some(Self::Planning),
            Self::Planning => Some(Self::Done),
            Self::Done => None,
        }
    }
}

impl fmt::Display for PlannerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Traveler role within the party.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TravelerRole {
    Adult,
    Child,
    Senior,
}

impl TravelerRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Adult => "adult",
            Self::Child => "child",
            Self::Senior => "senior",
        }
    }
}

/// Budget mode for the whole trip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BudgetMode {
    Economy,
    Standard,
    Luxury,
}

impl BudgetMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Economy => "economy",
            Self::Standard => "standard",
            Self::Luxury => "luxury",
        }
    }
}

/// Daily pace preference.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Pace {
    Relaxed,
    #[default]
    Moderate,
    Busy,
}

impl Pace {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Relaxed => "relaxed",
            Self::Moderate => "moderate",
            Self::Busy => "busy",
        }
    }

    /// Number of activity slots to fill per day.
    pub fn slots_per_day(&self) -> u8 {
        match self {
            Self::Relaxed => 1,
            Self::Moderate => 2,
            Self::Busy => 3,
        }
    }
}

/// Inclusive date window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DateWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateWindow {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    /// Length of the window in nights (`end - start`).
    pub fn nights(&self) -> i64 {
        (self.end - self.start).num_days()
    }

    pub fn is_valid(&self) -> bool {
        self.end >= self.start
    }
}

impl fmt::Display for DateWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}

/// Per-traveler constraints.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TravelerConstraints {
    #[serde(default)]
    pub mobility: Vec<String>,
    #[serde(default)]
    pub dietary: Vec<String>,
    #[serde(default)]
    pub sensory: Vec<String>,
}

impl TravelerConstraints {
    pub fn is_empty(&self) -> bool {
        self.mobility.is_empty() && self.dietary.is_empty() && self.sensory.is_empty()
    }
}

/// A member of the travelling party.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Traveler {
    /// Stable index, never reused within a record
    pub index: TravelerIndex,
    pub role: TravelerRole,
    #[serde(default)]
    pub age: Option<u8>,
    #[serde(default)]
    pub nationality: Option<String>,
    /// Departure city when it differs from the trip origin
    #[serde(default)]
    pub origin: Option<String>,
    /// Resolved departure hub code (e.g. an airport code)
    #[serde(default)]
    pub origin_hub: Option<String>,
    #[serde(default)]
    pub interests: Vec<String>,
    #[serde(default)]
    pub constraints: TravelerConstraints,
}

impl Traveler {
    pub fn new(index: TravelerIndex, role: TravelerRole) -> Self {
        Self {
            index,
            role,
            age: None,
            nationality: None,
            origin: None,
            origin_hub: None,
            interests: Vec::new(),
            constraints: TravelerConstraints::default(),
        }
    }

    pub fn is_child(&self) -> bool {
        self.role == TravelerRole::Child
    }

    pub fn has_origin_info(&self) -> bool {
        self.origin.is_some() || self.origin_hub.is_some()
    }
}

/// Where and when.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TripDetails {
    #[serde(default)]
    pub destination: Option<String>,
    #[serde(default)]
    pub origin: Option<String>,
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
    #[serde(default)]
    pub flexible_dates: bool,
}

/// Resolved hub codes for the trip as a whole.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HubCodes {
    #[serde(default)]
    pub origin: Option<String>,
    #[serde(default)]
    pub destination: Option<String>,
}

/// Trip-wide preferences.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Preferences {
    #[serde(default)]
    pub budget_mode: Option<BudgetMode>,
    #[serde(default)]
    pub total_budget: Option<f64>,
    #[serde(default)]
    pub budget_currency: Option<String>,
    #[serde(default)]
    pub pace: Pace,
    #[serde(default)]
    pub interests: Vec<String>,
    #[serde(default)]
    pub must_do: Vec<String>,
    #[serde(default)]
    pub nice_to_have: Vec<String>,
    #[serde(default)]
    pub neighborhood_preferences: Vec<String>,
    #[serde(default)]
    pub neighborhood_avoid: Vec<String>,
    #[serde(default)]
    pub room_configuration: Option<String>,
    #[serde(default)]
    pub transport_preferences: Vec<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

/// The single trip record of a planning session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlannerRecord {
    #[serde(default)]
    pub trip: TripDetails,
    #[serde(default)]
    pub hubs: HubCodes,
    #[serde(default)]
    pub travelers: Vec<Traveler>,
    #[serde(default)]
    pub preferences: Preferences,
    #[serde(default)]
    pub status: PlannerStatus,
    /// Next index to hand out; indexes are never reused
    #[serde(default)]
    pub next_traveler_index: TravelerIndex,
}

impl PlannerRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requested travel window, when both dates are known.
    pub fn requested_window(&self) -> Option<DateWindow> {
        match (self.trip.start_date, self.trip.end_date) {
            (Some(start), Some(end)) => Some(DateWindow::new(start, end)),
            _ => None,
        }
    }

    pub fn traveler(&self, index: TravelerIndex) -> Option<&Traveler> {
        self.travelers.iter().find(|t| t.index == index)
    }

    /// Effective departure point for a traveler: own hub, own origin, trip hub, trip origin.
    pub fn departure_point(&self, traveler: &Traveler) -> Option<String> {
        traveler
            .origin_hub
            .clone()
            .or_else(|| traveler.origin.clone())
            .or_else(|| self.hubs.origin.clone())
            .or_else(|| self.trip.origin.clone())
    }

    /// Effective arrival point: destination hub, then destination.
    pub fn arrival_point(&self) -> Option<String> {
        self.hubs
            .destination
            .clone()
            .or_else(|| self.trip.destination.clone())
    }

    /// Evaluate the completeness predicate and list every missing field.
    pub fn missing_fields(&self) -> Vec<MissingField> {
        let mut missing = Vec::new();

        if self.trip.destination.is_none() {
            missing.push(MissingField::Destination);
        }

        let has_trip_origin = self.trip.origin.is_some() || self.hubs.origin.is_some();
        let every_traveler_has_origin =
            !self.travelers.is_empty() && self.travelers.iter().all(Traveler::has_origin_info);
        if !has_trip_origin && !every_traveler_has_origin {
            missing.push(MissingField::Origin);
        }

        match (self.trip.start_date, self.trip.end_date) {
            (None, None) => {
                missing.push(MissingField::StartDate);
                missing.push(MissingField::EndDate);
            }
            (None, Some(_)) => missing.push(MissingField::StartDate),
            (Some(_), None) => missing.push(MissingField::EndDate),
            (Some(start), Some(end)) => {
                if end < start {
                    missing.push(MissingField::ValidDateRange);
                }
            }
        }

        if self.travelers.is_empty() {
            missing.push(MissingField::Travelers);
        }

        for traveler in &self.travelers {
            if traveler.nationality.is_none() {
                missing.push(MissingField::Nationality(traveler.index));
            }
        }

        if self.preferences.budget_mode.is_none() {
            missing.push(MissingField::BudgetMode);
        }

        missing
    }

    pub fn is_intake_complete(&self) -> bool {
        self.missing_fields().is_empty()
    }

    /// Distinct nationalities across the party, sorted.
    pub fn nationalities(&self) -> BTreeSet<String> {
        self.travelers
            .iter()
            .filter_map(|t| t.nationality.clone())
            .collect()
    }
}

/// A field the completeness predicate found missing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "field", content = "traveler")]
pub enum MissingField {
    Destination,
    Origin,
    StartDate,
    EndDate,
    ValidDateRange,
    Travelers,
    Nationality(TravelerIndex),
    BudgetMode,
}

impl fmt::Display for MissingField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Destination => f.write_str("destination"),
            Self::Origin => f.write_str("origin"),
            Self::StartDate => f.write_str("start_date"),
            Self::EndDate => f.write_str("end_date"),
            Self::ValidDateRange => f.write_str("valid_date_range"),
            Self::Travelers => f.write_str("travelers"),
            Self::Nationality(index) => write!(f, "nationality[{index}]"),
            Self::BudgetMode => f.write_str("budget_mode"),
        }
    }
}
