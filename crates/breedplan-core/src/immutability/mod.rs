//! Rules for when recorded dates may still change.
//!
//! Observed dates may be corrected while their phase is open, but only
//! within a tolerance measured from the value captured when the phase was
//! locked. Corrections are never measured from the current value, so a
//! chain of small edits cannot walk a date arbitrarily far.

use chrono::NaiveDate;
use tracing::debug;

use breedplan_db::models::{BreedingPlan, PlanStatus};

use crate::error::LifecycleError;
use crate::fields::DateField;
use crate::plan::patch::PlanPatch;
use crate::state::PlanStateMachine;

pub const CYCLE_START_TOLERANCE_DAYS: i64 = 3;
pub const OVULATION_TOLERANCE_DAYS: i64 = 2;
pub const BREED_DATE_TOLERANCE_DAYS: i64 = 2;

/// Dates that freeze once a birth is recorded.
const UPSTREAM_OF_BIRTH: [DateField; 4] = [
    DateField::CycleStartObserved,
    DateField::OvulationConfirmed,
    DateField::HormoneTestingStartDate,
    DateField::BreedDateActual,
];

/// Decide whether every change in `patch` is permitted for `plan`.
///
/// Only entries whose value actually differs are judged; resubmitting a
/// stored value is always accepted.
pub fn validate_patch(plan: &BreedingPlan, patch: &PlanPatch) -> Result<(), LifecycleError> {
    let changed: Vec<(DateField, Option<NaiveDate>)> = patch.changed_dates(plan).collect();

    if plan.status == PlanStatus::Canceled {
        if let Some((field, _)) = changed.first() {
            return Err(LifecycleError::immutable(
                field.name(),
                "the plan is canceled and its dates are frozen",
            ));
        }
    }

    if let (Some(new_code), Some(existing)) = (&patch.code, &plan.code) {
        if new_code != existing {
            return Err(LifecycleError::immutable(
                "code",
                format!("code {existing} is already assigned"),
            ));
        }
    }

    if patch.status.map(PlanStateMachine::canonical) == Some(PlanStatus::Planning) {
        debug!(plan_id = %plan.id, "reset to PLANNING, skipping date immutability checks");
        return Ok(());
    }

    if let Some(mode) = patch.repro_anchor_mode {
        if mode != plan.repro_anchor_mode && plan.status != PlanStatus::Planning {
            return Err(LifecycleError::immutable(
                "repro_anchor_mode",
                format!(
                    "the anchor mode is fixed once the plan leaves PLANNING (currently {})",
                    plan.status
                ),
            ));
        }
    }

    check_locked_group(plan, patch, &changed)?;

    for (field, value) in changed {
        check_date(plan, field, value)?;
    }
    Ok(())
}

fn check_locked_group(
    plan: &BreedingPlan,
    patch: &PlanPatch,
    changed: &[(DateField, Option<NaiveDate>)],
) -> Result<(), LifecycleError> {
    let Some((first, _)) = changed.iter().find(|(f, _)| f.is_locked_group()) else {
        return Ok(());
    };

    if plan.status != PlanStatus::Planning {
        return Err(LifecycleError::immutable(
            first.name(),
            "locked dates change only through lock, upgrade or rewind",
        ));
    }

    let missing: Vec<&'static str> = DateField::LOCKED_GROUP
        .iter()
        .filter(|f| patch.date_after(plan, **f).is_none())
        .map(|f| f.name())
        .collect();
    if !missing.is_empty() && missing.len() < DateField::LOCKED_GROUP.len() {
        return Err(LifecycleError::missing_fields(
            format!(
                "the locked-date group must be set as a whole; missing {}",
                missing.join(", ")
            ),
            missing,
        ));
    }
    Ok(())
}

fn check_date(
    plan: &BreedingPlan,
    field: DateField,
    value: Option<NaiveDate>,
) -> Result<(), LifecycleError> {
    if field == DateField::BirthDateActual && plan.birth_date_actual.is_some() {
        return Err(LifecycleError::immutable(
            field.name(),
            "a recorded birth date cannot be changed or cleared",
        ));
    }
    if plan.birth_date_actual.is_some() && UPSTREAM_OF_BIRTH.contains(&field) {
        return Err(LifecycleError::immutable(
            field.name(),
            "frozen once a birth date is recorded",
        ));
    }

    match field {
        DateField::CycleStartObserved => in_cycle_phase(
            plan,
            field,
            plan.locked_cycle_start,
            value,
            CYCLE_START_TOLERANCE_DAYS,
        ),
        DateField::OvulationConfirmed => in_cycle_phase(
            plan,
            field,
            plan.locked_ovulation_date,
            value,
            OVULATION_TOLERANCE_DAYS,
        ),
        DateField::BreedDateActual => {
            if PlanStateMachine::reached(effective_status(plan), PlanStatus::Birthed) {
                return Err(LifecycleError::immutable(
                    field.name(),
                    "the breeding date is fixed from BIRTHED on",
                ));
            }
            match plan.breed_date_reference {
                Some(reference) => {
                    within_tolerance(field, reference, value, BREED_DATE_TOLERANCE_DAYS)
                }
                None => Ok(()),
            }
        }
        _ => Ok(()),
    }
}

/// Corrections to a cycle-phase observation. Unlocked plans are free;
/// locked plans accept a clear or a value within `tolerance` of the locked
/// reference, and only until the cycle phase ends.
fn in_cycle_phase(
    plan: &BreedingPlan,
    field: DateField,
    reference: Option<NaiveDate>,
    value: Option<NaiveDate>,
    tolerance: i64,
) -> Result<(), LifecycleError> {
    let Some(reference) = reference else {
        return Ok(());
    };

    let status = effective_status(plan);
    let phase_open =
        status == PlanStatus::Planning || PlanStateMachine::is_cycle_phase(status);
    if !phase_open {
        return Err(LifecycleError::immutable(
            field.name(),
            format!("the cycle phase has ended (status {})", plan.status),
        ));
    }
    within_tolerance(field, reference, value, tolerance)
}

fn within_tolerance(
    field: DateField,
    reference: NaiveDate,
    value: Option<NaiveDate>,
    tolerance: i64,
) -> Result<(), LifecycleError> {
    let Some(value) = value else {
        return Ok(());
    };
    let drift = (value - reference).num_days().abs();
    if drift > tolerance {
        return Err(LifecycleError::immutable(
            field.name(),
            format!(
                "{value} is {drift} day(s) from the locked value {reference}; \
                 at most {tolerance} allowed"
            ),
        ));
    }
    Ok(())
}

/// An on-hold plan is judged by the status it was held in.
fn effective_status(plan: &BreedingPlan) -> PlanStatus {
    match (plan.status, plan.status_before_hold) {
        (PlanStatus::OnHold, Some(held)) => held,
        (status, _) => status,
    }
}

/// Reject clearing a milestone while a later milestone stays populated.
pub fn check_dependency_chain(
    before: &BreedingPlan,
    after: &BreedingPlan,
) -> Result<(), LifecycleError> {
    for (idx, field) in DateField::CHAIN.iter().enumerate() {
        let cleared = field.get(before).is_some() && field.get(after).is_none();
        if !cleared {
            continue;
        }
        let later: Vec<&'static str> = DateField::CHAIN[idx + 1..]
            .iter()
            .filter(|f| f.get(after).is_some())
            .map(|f| f.name())
            .collect();
        if !later.is_empty() {
            return Err(LifecycleError::validation(format!(
                "cannot clear {} while {} is set",
                field.name(),
                later.join(", ")
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use breedplan_db::models::{ReproAnchorMode, Species};

    use super::*;
    use crate::testing::{date, locked_dog, plan};

    fn expect_immutable(result: Result<(), LifecycleError>, expected_field: &str) {
        match result {
            Err(LifecycleError::ImmutableFieldViolation { field, .. }) => {
                assert_eq!(field, expected_field)
            }
            other => panic!("expected ImmutableFieldViolation, got {other:?}"),
        }
    }

    fn bred_dog() -> BreedingPlan {
        let mut p = locked_dog(PlanStatus::Bred);
        p.breed_date_actual = Some(date(2024, 1, 14));
        p.breed_date_reference = Some(date(2024, 1, 14));
        p
    }

    #[test]
    fn breed_date_tolerance_in_bred() {
        let p = bred_dog();

        let three_days = PlanPatch::new().set_date(DateField::BreedDateActual, date(2024, 1, 17));
        expect_immutable(validate_patch(&p, &three_days), "breed_date_actual");

        let one_day = PlanPatch::new().set_date(DateField::BreedDateActual, date(2024, 1, 15));
        validate_patch(&p, &one_day).expect("1-day correction is inside tolerance");
    }

    #[test]
    fn tolerance_is_measured_from_locked_reference() {
        let mut p = bred_dog();
        // Already corrected once to the edge of the window.
        p.breed_date_actual = Some(date(2024, 1, 16));
        let further = PlanPatch::new().set_date(DateField::BreedDateActual, date(2024, 1, 17));
        expect_immutable(validate_patch(&p, &further), "breed_date_actual");
    }

    #[test]
    fn cycle_start_tolerance_within_cycle_phase() {
        let p = locked_dog(PlanStatus::Cycle);

        let ok = PlanPatch::new().set_date(DateField::CycleStartObserved, date(2024, 1, 4));
        validate_patch(&p, &ok).expect("3 days is allowed for cycle start");

        let too_far = PlanPatch::new().set_date(DateField::CycleStartObserved, date(2023, 12, 28));
        expect_immutable(validate_patch(&p, &too_far), "cycle_start_observed");

        let clear = PlanPatch::new().clear_date(DateField::CycleStartObserved);
        validate_patch(&p, &clear).expect("clearing inside the phase is allowed");
    }

    #[test]
    fn cycle_start_frozen_after_cycle_phase() {
        let p = bred_dog();
        let clear = PlanPatch::new().clear_date(DateField::CycleStartObserved);
        expect_immutable(validate_patch(&p, &clear), "cycle_start_observed");
    }

    #[test]
    fn ovulation_tolerance_is_two_days() {
        let mut p = locked_dog(PlanStatus::HormoneTesting);
        p.ovulation_confirmed = Some(date(2024, 1, 13));
        let patch = PlanPatch::new().set_date(DateField::OvulationConfirmed, date(2024, 1, 16));
        expect_immutable(validate_patch(&p, &patch), "ovulation_confirmed");
    }

    #[test]
    fn birth_freezes_upstream_dates() {
        let mut p = bred_dog();
        p.status = PlanStatus::Birthed;
        p.hormone_testing_start_date = Some(date(2024, 1, 8));
        p.birth_date_actual = Some(date(2024, 3, 17));

        for field in [
            DateField::CycleStartObserved,
            DateField::HormoneTestingStartDate,
            DateField::BreedDateActual,
        ] {
            let shifted = PlanPatch::new().set_date(field, date(2024, 1, 9));
            expect_immutable(validate_patch(&p, &shifted), field.name());
        }

        let same = PlanPatch::new()
            .set_date(DateField::CycleStartObserved, date(2024, 1, 1))
            .set_date(DateField::BreedDateActual, date(2024, 1, 14));
        validate_patch(&p, &same).expect("resubmitting stored values is fine");
    }

    #[test]
    fn birth_date_has_zero_tolerance() {
        let mut p = bred_dog();
        p.status = PlanStatus::Birthed;
        p.birth_date_actual = Some(date(2024, 3, 17));

        let shift = PlanPatch::new().set_date(DateField::BirthDateActual, date(2024, 3, 18));
        expect_immutable(validate_patch(&p, &shift), "birth_date_actual");

        let clear = PlanPatch::new().clear_date(DateField::BirthDateActual);
        expect_immutable(validate_patch(&p, &clear), "birth_date_actual");
    }

    #[test]
    fn canceled_plans_reject_any_date_change() {
        let p = locked_dog(PlanStatus::Canceled);
        let patch = PlanPatch::new().set_date(DateField::ExpectedWeanedDate, date(2024, 5, 1));
        expect_immutable(validate_patch(&p, &patch), "expected_weaned_date");
    }

    #[test]
    fn reset_to_planning_skips_checks() {
        let mut p = bred_dog();
        p.birth_date_actual = Some(date(2024, 3, 17));
        let patch = PlanPatch::new()
            .status(PlanStatus::Planning)
            .clear_date(DateField::BirthDateActual)
            .clear_date(DateField::BreedDateActual);
        validate_patch(&p, &patch).expect("full reset may wipe dates");
    }

    #[test]
    fn anchor_mode_changes_only_in_planning() {
        let planning = plan(Species::Dog, PlanStatus::Planning);
        let patch = PlanPatch {
            repro_anchor_mode: Some(ReproAnchorMode::Ovulation),
            ..PlanPatch::default()
        };
        validate_patch(&planning, &patch).expect("anchor mode is free in PLANNING");

        let cycle = locked_dog(PlanStatus::Cycle);
        expect_immutable(validate_patch(&cycle, &patch), "repro_anchor_mode");
    }

    #[test]
    fn partial_locked_group_lists_missing_field() {
        let p = plan(Species::Dog, PlanStatus::Planning);
        let patch = PlanPatch::new()
            .set_date(DateField::LockedCycleStart, date(2024, 1, 1))
            .set_date(DateField::LockedOvulationDate, date(2024, 1, 13))
            .set_date(DateField::LockedDueDate, date(2024, 3, 16));
        match validate_patch(&p, &patch) {
            Err(LifecycleError::ValidationFailed { missing, .. }) => {
                assert_eq!(missing, vec!["locked_placement_start_date"]);
            }
            other => panic!("expected ValidationFailed, got {other:?}"),
        }

        let full = patch.set_date(DateField::LockedPlacementStartDate, date(2024, 5, 11));
        validate_patch(&p, &full).expect("complete group is accepted");
    }

    #[test]
    fn locked_group_frozen_outside_planning() {
        let p = locked_dog(PlanStatus::Cycle);
        let patch = PlanPatch::new().set_date(DateField::LockedDueDate, date(2024, 3, 20));
        expect_immutable(validate_patch(&p, &patch), "locked_due_date");
    }

    #[test]
    fn code_is_write_once() {
        let mut p = locked_dog(PlanStatus::Cycle);
        p.code = Some("DOG-2024-0001".into());
        let patch = PlanPatch {
            code: Some("DOG-2024-0099".into()),
            ..PlanPatch::default()
        };
        expect_immutable(validate_patch(&p, &patch), "code");

        let reset = PlanPatch {
            code: Some("DOG-2024-0099".into()),
            ..PlanPatch::new().status(PlanStatus::Planning)
        };
        expect_immutable(validate_patch(&p, &reset), "code");
    }

    #[test]
    fn dependency_chain_blocks_clearing_earlier_milestone() {
        let mut before = bred_dog();
        before.birth_date_actual = Some(date(2024, 3, 17));
        before.weaned_date_actual = Some(date(2024, 4, 28));

        let mut after = before.clone();
        after.birth_date_actual = None;
        let err = check_dependency_chain(&before, &after).unwrap_err();
        assert!(err.to_string().contains("weaned_date_actual"));

        after.weaned_date_actual = None;
        check_dependency_chain(&before, &after).expect("both cleared together");
    }
}
