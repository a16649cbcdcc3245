//! Named accessors for the date columns of a [`BreedingPlan`].
//!
//! Patches, phase ownership and the dependency chain all refer to dates
//! through [`DateField`] so the rules can be written as tables.

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;

use breedplan_db::models::BreedingPlan;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DateField {
    CycleStartObserved,
    OvulationConfirmed,
    HormoneTestingStartDate,
    BreedDateActual,
    LockedCycleStart,
    LockedOvulationDate,
    LockedDueDate,
    LockedPlacementStartDate,
    ExpectedCycleStart,
    ExpectedOvulation,
    ExpectedDueDate,
    ExpectedWeanedDate,
    ExpectedPlacementStart,
    ExpectedPlacementCompleted,
    BirthDateActual,
    WeanedDateActual,
    PlacementStartDateActual,
    PlacementCompletedDateActual,
    CompletedDateActual,
}

impl DateField {
    pub const ALL: [DateField; 19] = [
        Self::CycleStartObserved,
        Self::OvulationConfirmed,
        Self::HormoneTestingStartDate,
        Self::BreedDateActual,
        Self::LockedCycleStart,
        Self::LockedOvulationDate,
        Self::LockedDueDate,
        Self::LockedPlacementStartDate,
        Self::ExpectedCycleStart,
        Self::ExpectedOvulation,
        Self::ExpectedDueDate,
        Self::ExpectedWeanedDate,
        Self::ExpectedPlacementStart,
        Self::ExpectedPlacementCompleted,
        Self::BirthDateActual,
        Self::WeanedDateActual,
        Self::PlacementStartDateActual,
        Self::PlacementCompletedDateActual,
        Self::CompletedDateActual,
    ];

    /// The locked-date group, set and cleared as one unit.
    pub const LOCKED_GROUP: [DateField; 4] = [
        Self::LockedCycleStart,
        Self::LockedOvulationDate,
        Self::LockedDueDate,
        Self::LockedPlacementStartDate,
    ];

    /// Recorded milestones in dependency order. An entry may not be
    /// cleared while a later one is populated.
    pub const CHAIN: [DateField; 6] = [
        Self::CycleStartObserved,
        Self::BreedDateActual,
        Self::BirthDateActual,
        Self::WeanedDateActual,
        Self::PlacementStartDateActual,
        Self::PlacementCompletedDateActual,
    ];

    /// Column name, also used in error payloads and event diffs.
    pub fn name(self) -> &'static str {
        match self {
            Self::CycleStartObserved => "cycle_start_observed",
            Self::OvulationConfirmed => "ovulation_confirmed",
            Self::HormoneTestingStartDate => "hormone_testing_start_date",
            Self::BreedDateActual => "breed_date_actual",
            Self::LockedCycleStart => "locked_cycle_start",
            Self::LockedOvulationDate => "locked_ovulation_date",
            Self::LockedDueDate => "locked_due_date",
            Self::LockedPlacementStartDate => "locked_placement_start_date",
            Self::ExpectedCycleStart => "expected_cycle_start",
            Self::ExpectedOvulation => "expected_ovulation",
            Self::ExpectedDueDate => "expected_due_date",
            Self::ExpectedWeanedDate => "expected_weaned_date",
            Self::ExpectedPlacementStart => "expected_placement_start",
            Self::ExpectedPlacementCompleted => "expected_placement_completed",
            Self::BirthDateActual => "birth_date_actual",
            Self::WeanedDateActual => "weaned_date_actual",
            Self::PlacementStartDateActual => "placement_start_date_actual",
            Self::PlacementCompletedDateActual => "placement_completed_date_actual",
            Self::CompletedDateActual => "completed_date_actual",
        }
    }

    pub fn is_locked_group(self) -> bool {
        Self::LOCKED_GROUP.contains(&self)
    }

    pub fn is_expected(self) -> bool {
        matches!(
            self,
            Self::ExpectedCycleStart
                | Self::ExpectedOvulation
                | Self::ExpectedDueDate
                | Self::ExpectedWeanedDate
                | Self::ExpectedPlacementStart
                | Self::ExpectedPlacementCompleted
        )
    }

    pub fn get(self, plan: &BreedingPlan) -> Option<NaiveDate> {
        match self {
            Self::CycleStartObserved => plan.cycle_start_observed,
            Self::OvulationConfirmed => plan.ovulation_confirmed,
            Self::HormoneTestingStartDate => plan.hormone_testing_start_date,
            Self::BreedDateActual => plan.breed_date_actual,
            Self::LockedCycleStart => plan.locked_cycle_start,
            Self::LockedOvulationDate => plan.locked_ovulation_date,
            Self::LockedDueDate => plan.locked_due_date,
            Self::LockedPlacementStartDate => plan.locked_placement_start_date,
            Self::ExpectedCycleStart => plan.expected_cycle_start,
            Self::ExpectedOvulation => plan.expected_ovulation,
            Self::ExpectedDueDate => plan.expected_due_date,
            Self::ExpectedWeanedDate => plan.expected_weaned_date,
            Self::ExpectedPlacementStart => plan.expected_placement_start,
            Self::ExpectedPlacementCompleted => plan.expected_placement_completed,
            Self::BirthDateActual => plan.birth_date_actual,
            Self::WeanedDateActual => plan.weaned_date_actual,
            Self::PlacementStartDateActual => plan.placement_start_date_actual,
            Self::PlacementCompletedDateActual => plan.placement_completed_date_actual,
            Self::CompletedDateActual => plan.completed_date_actual,
        }
    }

    pub fn set(self, plan: &mut BreedingPlan, value: Option<NaiveDate>) {
        let slot = match self {
            Self::CycleStartObserved => &mut plan.cycle_start_observed,
            Self::OvulationConfirmed => &mut plan.ovulation_confirmed,
            Self::HormoneTestingStartDate => &mut plan.hormone_testing_start_date,
            Self::BreedDateActual => &mut plan.breed_date_actual,
            Self::LockedCycleStart => &mut plan.locked_cycle_start,
            Self::LockedOvulationDate => &mut plan.locked_ovulation_date,
            Self::LockedDueDate => &mut plan.locked_due_date,
            Self::LockedPlacementStartDate => &mut plan.locked_placement_start_date,
            Self::ExpectedCycleStart => &mut plan.expected_cycle_start,
            Self::ExpectedOvulation => &mut plan.expected_ovulation,
            Self::ExpectedDueDate => &mut plan.expected_due_date,
            Self::ExpectedWeanedDate => &mut plan.expected_weaned_date,
            Self::ExpectedPlacementStart => &mut plan.expected_placement_start,
            Self::ExpectedPlacementCompleted => &mut plan.expected_placement_completed,
            Self::BirthDateActual => &mut plan.birth_date_actual,
            Self::WeanedDateActual => &mut plan.weaned_date_actual,
            Self::PlacementStartDateActual => &mut plan.placement_start_date_actual,
            Self::PlacementCompletedDateActual => &mut plan.placement_completed_date_actual,
            Self::CompletedDateActual => &mut plan.completed_date_actual,
        };
        *slot = value;
    }
}

impl fmt::Display for DateField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DateField {
    type Err = DateFieldParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase().replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|f| f.name() == wanted)
            .ok_or_else(|| DateFieldParseError(s.to_owned()))
    }
}

/// Error returned when parsing an unknown [`DateField`] name.
#[derive(Debug, Clone)]
pub struct DateFieldParseError(pub String);

impl fmt::Display for DateFieldParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown date field: {:?}", self.0)
    }
}

impl std::error::Error for DateFieldParseError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_parse_back() {
        for field in DateField::ALL {
            assert_eq!(field.name().parse::<DateField>().unwrap(), field);
        }
        assert_eq!(
            "birth-date-actual".parse::<DateField>().unwrap(),
            DateField::BirthDateActual
        );
        assert!("due".parse::<DateField>().is_err());
    }

    #[test]
    fn locked_group_is_not_expected() {
        for field in DateField::LOCKED_GROUP {
            assert!(field.is_locked_group());
            assert!(!field.is_expected());
        }
    }
}
