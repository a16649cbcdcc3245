//! Timeline projection: derive every expected reproductive date from a
//! single anchor date.
//!
//! Projection is pure calendar-day arithmetic on [`NaiveDate`], so results
//! never depend on the local timezone or DST transitions.

use chrono::{Days, NaiveDate};
use serde::Serialize;

use breedplan_db::models::{DateConfidence, ReproAnchorMode};

use crate::error::LifecycleError;
use crate::species::SpeciesProfile;

/// The full set of projected dates for one anchor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Timeline {
    pub cycle_start: NaiveDate,
    pub ovulation: NaiveDate,
    pub due_date: NaiveDate,
    pub weaned_date: NaiveDate,
    pub placement_start: NaiveDate,
    pub placement_completed: NaiveDate,
}

/// Reject anchor modes the species cannot support.
///
/// Breeding-date anchoring needs an induced ovulator. Ovulation anchoring
/// needs a spontaneous ovulator with a usable ovulation test. Cycle-start
/// anchoring is always available.
pub fn check_anchor_capability(
    profile: &SpeciesProfile,
    mode: ReproAnchorMode,
) -> Result<(), LifecycleError> {
    let reason = match mode {
        ReproAnchorMode::CycleStart => return Ok(()),
        ReproAnchorMode::BreedingDate if !profile.induced_ovulator => {
            "breeding-date anchoring requires an induced ovulator"
        }
        ReproAnchorMode::Ovulation if profile.induced_ovulator => {
            "induced ovulators have no independent ovulation signal"
        }
        ReproAnchorMode::Ovulation if !profile.supports_ovulation_testing => {
            "no ovulation test is available for this species"
        }
        _ => return Ok(()),
    };

    Err(LifecycleError::SpeciesCapabilityViolation {
        species: profile.species,
        anchor_mode: mode,
        reason: reason.to_owned(),
    })
}

/// Project the full timeline from `anchor` interpreted according to `mode`.
///
/// Runs [`check_anchor_capability`] first; an unsupported mode is an error,
/// never a silent fallback to another mode.
pub fn project(
    mode: ReproAnchorMode,
    anchor: NaiveDate,
    profile: &SpeciesProfile,
) -> Result<Timeline, LifecycleError> {
    check_anchor_capability(profile, mode)?;

    let offset = profile.ovulation_offset_days;
    let (cycle_start, ovulation) = match mode {
        ReproAnchorMode::CycleStart => (anchor, add_days(anchor, offset)?),
        ReproAnchorMode::Ovulation | ReproAnchorMode::BreedingDate => {
            (add_days(anchor, -offset)?, anchor)
        }
    };

    let due_date = add_days(ovulation, profile.gestation_days)?;
    let weaned_date = add_days(due_date, profile.care_days)?;
    let placement_start = add_days(due_date, profile.placement_start_weeks * 7)?;
    let placement_completed = add_days(placement_start, profile.placement_extension_weeks * 7)?;

    Ok(Timeline {
        cycle_start,
        ovulation,
        due_date,
        weaned_date,
        placement_start,
        placement_completed,
    })
}

/// Confidence of dates projected from a locked anchor of this mode.
pub fn confidence_for(mode: ReproAnchorMode) -> DateConfidence {
    match mode {
        ReproAnchorMode::Ovulation => DateConfidence::High,
        ReproAnchorMode::CycleStart | ReproAnchorMode::BreedingDate => DateConfidence::Medium,
    }
}

/// Days between the observed ovulation and the one the species profile
/// predicts from `cycle_start`. Positive means ovulation came late.
pub fn ovulation_variance_days(
    cycle_start: NaiveDate,
    ovulation: NaiveDate,
    profile: &SpeciesProfile,
) -> i32 {
    let observed = (ovulation - cycle_start).num_days();
    i32::try_from(observed - profile.ovulation_offset_days).unwrap_or(i32::MAX)
}

fn add_days(date: NaiveDate, days: i64) -> Result<NaiveDate, LifecycleError> {
    let shifted = if days >= 0 {
        date.checked_add_days(Days::new(days.unsigned_abs()))
    } else {
        date.checked_sub_days(Days::new(days.unsigned_abs()))
    };
    shifted.ok_or_else(|| {
        LifecycleError::validation(format!("date {date} shifted by {days} days is out of range"))
    })
}
