use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Lifecycle status of a breeding plan.
///
/// The first eleven variants (excluding `Committed`) form the ordered
/// progression. `Canceled`, `Unsuccessful` and `OnHold` are reachable from
/// any non-terminal status; `Dissolved` is reached only through the
/// dissolve operation once every offspring is deceased.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PlanStatus {
    Planning,
    /// Deprecated spelling of [`PlanStatus::Cycle`]; still readable from old rows.
    Committed,
    Cycle,
    CycleExpected,
    HormoneTesting,
    Bred,
    Pregnant,
    Birthed,
    Born,
    Weaned,
    Placement,
    PlanComplete,
    Canceled,
    Unsuccessful,
    OnHold,
    Dissolved,
}

impl PlanStatus {
    pub const ALL: [PlanStatus; 16] = [
        Self::Planning,
        Self::Committed,
        Self::Cycle,
        Self::CycleExpected,
        Self::HormoneTesting,
        Self::Bred,
        Self::Pregnant,
        Self::Birthed,
        Self::Born,
        Self::Weaned,
        Self::Placement,
        Self::PlanComplete,
        Self::Canceled,
        Self::Unsuccessful,
        Self::OnHold,
        Self::Dissolved,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Planning => "PLANNING",
            Self::Committed => "COMMITTED",
            Self::Cycle => "CYCLE",
            Self::CycleExpected => "CYCLE_EXPECTED",
            Self::HormoneTesting => "HORMONE_TESTING",
            Self::Bred => "BRED",
            Self::Pregnant => "PREGNANT",
            Self::Birthed => "BIRTHED",
            Self::Born => "BORN",
            Self::Weaned => "WEANED",
            Self::Placement => "PLACEMENT",
            Self::PlanComplete => "PLAN_COMPLETE",
            Self::Canceled => "CANCELED",
            Self::Unsuccessful => "UNSUCCESSFUL",
            Self::OnHold => "ON_HOLD",
            Self::Dissolved => "DISSOLVED",
        }
    }
}

impl fmt::Display for PlanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PlanStatus {
    type Err = PlanStatusParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_ascii_uppercase();
        Self::ALL
            .into_iter()
            .find(|v| v.as_str() == upper)
            .ok_or_else(|| PlanStatusParseError(s.to_owned()))
    }
}

/// Error returned when parsing an invalid [`PlanStatus`] string.
#[derive(Debug, Clone)]
pub struct PlanStatusParseError(pub String);

impl fmt::Display for PlanStatusParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid plan status: {:?}", self.0)
    }
}

impl std::error::Error for PlanStatusParseError {}

// ---------------------------------------------------------------------------

/// Species of the animals in a plan; selects the timeline profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Species {
    Dog,
    Cat,
    Horse,
    Goat,
    Sheep,
    Rabbit,
    Pig,
    Cattle,
    Alpaca,
}

impl Species {
    pub const ALL: [Species; 9] = [
        Self::Dog,
        Self::Cat,
        Self::Horse,
        Self::Goat,
        Self::Sheep,
        Self::Rabbit,
        Self::Pig,
        Self::Cattle,
        Self::Alpaca,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Dog => "DOG",
            Self::Cat => "CAT",
            Self::Horse => "HORSE",
            Self::Goat => "GOAT",
            Self::Sheep => "SHEEP",
            Self::Rabbit => "RABBIT",
            Self::Pig => "PIG",
            Self::Cattle => "CATTLE",
            Self::Alpaca => "ALPACA",
        }
    }
}

impl fmt::Display for Species {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Species {
    type Err = SpeciesParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_ascii_uppercase();
        Self::ALL
            .into_iter()
            .find(|v| v.as_str() == upper)
            .ok_or_else(|| SpeciesParseError(s.to_owned()))
    }
}

/// Error returned when parsing an invalid [`Species`] string.
#[derive(Debug, Clone)]
pub struct SpeciesParseError(pub String);

impl fmt::Display for SpeciesParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid species: {:?}", self.0)
    }
}

impl std::error::Error for SpeciesParseError {}

// ---------------------------------------------------------------------------

/// Which observed date is treated as ground truth for the timeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReproAnchorMode {
    CycleStart,
    Ovulation,
    BreedingDate,
}

impl fmt::Display for ReproAnchorMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::CycleStart => "CYCLE_START",
            Self::Ovulation => "OVULATION",
            Self::BreedingDate => "BREEDING_DATE",
        };
        f.write_str(s)
    }
}

impl FromStr for ReproAnchorMode {
    type Err = ReproAnchorModeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "CYCLE_START" => Ok(Self::CycleStart),
            "OVULATION" => Ok(Self::Ovulation),
            "BREEDING_DATE" => Ok(Self::BreedingDate),
            _ => Err(ReproAnchorModeParseError(s.to_owned())),
        }
    }
}

/// Error returned when parsing an invalid [`ReproAnchorMode`] string.
#[derive(Debug, Clone)]
pub struct ReproAnchorModeParseError(pub String);

impl fmt::Display for ReproAnchorModeParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid anchor mode: {:?}", self.0)
    }
}

impl std::error::Error for ReproAnchorModeParseError {}

// ---------------------------------------------------------------------------

/// Confidence in the projected dates, derived from the anchor mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DateConfidence {
    High,
    Medium,
    Low,
}

impl fmt::Display for DateConfidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::High => "HIGH",
            Self::Medium => "MEDIUM",
            Self::Low => "LOW",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------

/// How an ovulation date was confirmed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OvulationMethod {
    ProgesteroneTest,
    LhTest,
    Ultrasound,
    VaginalCytology,
    Palpation,
    Other,
}

impl fmt::Display for OvulationMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::ProgesteroneTest => "PROGESTERONE_TEST",
            Self::LhTest => "LH_TEST",
            Self::Ultrasound => "ULTRASOUND",
            Self::VaginalCytology => "VAGINAL_CYTOLOGY",
            Self::Palpation => "PALPATION",
            Self::Other => "OTHER",
        };
        f.write_str(s)
    }
}

impl FromStr for OvulationMethod {
    type Err = OvulationMethodParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "PROGESTERONE_TEST" => Ok(Self::ProgesteroneTest),
            "LH_TEST" => Ok(Self::LhTest),
            "ULTRASOUND" => Ok(Self::Ultrasound),
            "VAGINAL_CYTOLOGY" => Ok(Self::VaginalCytology),
            "PALPATION" => Ok(Self::Palpation),
            "OTHER" => Ok(Self::Other),
            _ => Err(OvulationMethodParseError(s.to_owned())),
        }
    }
}

/// Error returned when parsing an invalid [`OvulationMethod`] string.
#[derive(Debug, Clone)]
pub struct OvulationMethodParseError(pub String);

impl fmt::Display for OvulationMethodParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid ovulation confirmation method: {:?}", self.0)
    }
}

impl std::error::Error for OvulationMethodParseError {}

// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AnimalSex {
    Female,
    Male,
}

impl fmt::Display for AnimalSex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Female => "FEMALE",
            Self::Male => "MALE",
        })
    }
}

impl FromStr for AnimalSex {
    type Err = AnimalSexParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "FEMALE" | "F" => Ok(Self::Female),
            "MALE" | "M" => Ok(Self::Male),
            _ => Err(AnimalSexParseError(s.to_owned())),
        }
    }
}

/// Error returned when parsing an invalid [`AnimalSex`] string.
#[derive(Debug, Clone)]
pub struct AnimalSexParseError(pub String);

impl fmt::Display for AnimalSexParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid sex: {:?}", self.0)
    }
}

impl std::error::Error for AnimalSexParseError {}

// ---------------------------------------------------------------------------
// Row types
// ---------------------------------------------------------------------------

/// A single attempt to produce offspring from a dam and sire (or, for
/// embryo transfer, a donor dam carried by a recipient female).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct BreedingPlan {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub code: Option<String>,
    pub name: String,
    pub species: Species,
    pub dam_id: Option<Uuid>,
    pub sire_id: Option<Uuid>,
    pub recipient_id: Option<Uuid>,
    pub embryo_transfer: bool,

    pub status: PlanStatus,
    pub status_before_hold: Option<PlanStatus>,

    pub repro_anchor_mode: ReproAnchorMode,
    pub date_confidence_level: Option<DateConfidence>,
    pub cycle_start_unknown: bool,

    pub cycle_start_observed: Option<NaiveDate>,
    pub ovulation_confirmed: Option<NaiveDate>,
    pub ovulation_confirmation_method: Option<OvulationMethod>,
    pub hormone_testing_start_date: Option<NaiveDate>,
    pub breed_date_actual: Option<NaiveDate>,
    pub breed_date_reference: Option<NaiveDate>,

    pub locked_cycle_start: Option<NaiveDate>,
    pub locked_ovulation_date: Option<NaiveDate>,
    pub locked_due_date: Option<NaiveDate>,
    pub locked_placement_start_date: Option<NaiveDate>,

    pub expected_cycle_start: Option<NaiveDate>,
    pub expected_ovulation: Option<NaiveDate>,
    pub expected_due_date: Option<NaiveDate>,
    pub expected_weaned_date: Option<NaiveDate>,
    pub expected_placement_start: Option<NaiveDate>,
    pub expected_placement_completed: Option<NaiveDate>,

    pub birth_date_actual: Option<NaiveDate>,
    pub weaned_date_actual: Option<NaiveDate>,
    pub placement_start_date_actual: Option<NaiveDate>,
    pub placement_completed_date_actual: Option<NaiveDate>,
    pub completed_date_actual: Option<NaiveDate>,

    pub ovulation_offset_variance_days: Option<i32>,

    pub committed_at: Option<DateTime<Utc>>,
    pub committed_by: Option<String>,

    pub archived: bool,
    pub deleted_at: Option<DateTime<Utc>>,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl BreedingPlan {
    /// The four locked dates, in cycle-start, ovulation, due, placement order.
    pub fn locked_group(&self) -> [Option<NaiveDate>; 4] {
        [
            self.locked_cycle_start,
            self.locked_ovulation_date,
            self.locked_due_date,
            self.locked_placement_start_date,
        ]
    }

    pub fn is_locked(&self) -> bool {
        self.locked_group().iter().all(Option::is_some)
    }

    pub fn parent_ids(&self) -> Vec<Uuid> {
        [self.dam_id, self.sire_id, self.recipient_id]
            .into_iter()
            .flatten()
            .collect()
    }
}

/// Append-only audit entry written with every lifecycle mutation.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct BreedingPlanEvent {
    pub id: Uuid,
    /// Insertion order; breaks ties between events written in one transaction.
    pub seq: i64,
    pub tenant_id: Uuid,
    pub plan_id: Uuid,
    pub event_type: String,
    pub occurred_at: DateTime<Utc>,
    pub label: String,
    pub data: serde_json::Value,
    pub recorded_by: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Animal {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub name: String,
    pub species: Species,
    pub sex: AnimalSex,
    pub in_active_breeding_plan: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Offspring {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub plan_id: Uuid,
    pub name: String,
    pub deceased_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct WaitlistEntry {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub plan_id: Uuid,
    pub buyer_name: String,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plan_status_display_roundtrip() {
        for v in PlanStatus::ALL {
            let parsed: PlanStatus = v.to_string().parse().expect("should parse");
            assert_eq!(v, parsed);
        }
    }

    #[test]
    fn plan_status_parse_is_case_insensitive() {
        assert_eq!("on_hold".parse::<PlanStatus>().unwrap(), PlanStatus::OnHold);
        assert_eq!(
            "Plan_Complete".parse::<PlanStatus>().unwrap(),
            PlanStatus::PlanComplete
        );
    }

    #[test]
    fn plan_status_invalid() {
        assert!("whelping".parse::<PlanStatus>().is_err());
    }

    #[test]
    fn species_display_roundtrip() {
        for v in Species::ALL {
            let parsed: Species = v.to_string().parse().expect("should parse");
            assert_eq!(v, parsed);
        }
    }

    #[test]
    fn species_invalid() {
        let err = "dragon".parse::<Species>().unwrap_err();
        assert_eq!(err.to_string(), "invalid species: \"dragon\"");
    }

    #[test]
    fn anchor_mode_parses_known_values() {
        assert_eq!(
            "cycle_start".parse::<ReproAnchorMode>().unwrap(),
            ReproAnchorMode::CycleStart
        );
        assert_eq!(
            "BREEDING_DATE".parse::<ReproAnchorMode>().unwrap(),
            ReproAnchorMode::BreedingDate
        );
        assert!("lunar".parse::<ReproAnchorMode>().is_err());
    }

    #[test]
    fn ovulation_method_roundtrip() {
        let variants = [
            OvulationMethod::ProgesteroneTest,
            OvulationMethod::LhTest,
            OvulationMethod::Ultrasound,
            OvulationMethod::VaginalCytology,
            OvulationMethod::Palpation,
            OvulationMethod::Other,
        ];
        for v in &variants {
            let parsed: OvulationMethod = v.to_string().parse().expect("should parse");
            assert_eq!(*v, parsed);
        }
    }

    #[test]
    fn animal_sex_accepts_short_forms() {
        assert_eq!("f".parse::<AnimalSex>().unwrap(), AnimalSex::Female);
        assert_eq!("MALE".parse::<AnimalSex>().unwrap(), AnimalSex::Male);
        assert!("x".parse::<AnimalSex>().is_err());
    }
}
