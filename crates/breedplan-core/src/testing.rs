//! In-memory plan fixtures for unit tests of the pure engines.

use chrono::{NaiveDate, TimeZone, Utc};
use uuid::Uuid;

use breedplan_db::models::{BreedingPlan, PlanStatus, ReproAnchorMode, Species};

pub(crate) fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// A paired plan with no dates at all.
pub(crate) fn plan(species: Species, status: PlanStatus) -> BreedingPlan {
    let created = Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap();
    BreedingPlan {
        id: Uuid::new_v4(),
        tenant_id: Uuid::new_v4(),
        code: None,
        name: "fixture".to_owned(),
        species,
        dam_id: Some(Uuid::new_v4()),
        sire_id: Some(Uuid::new_v4()),
        recipient_id: None,
        embryo_transfer: false,
        status,
        status_before_hold: None,
        repro_anchor_mode: ReproAnchorMode::CycleStart,
        date_confidence_level: None,
        cycle_start_unknown: false,
        cycle_start_observed: None,
        ovulation_confirmed: None,
        ovulation_confirmation_method: None,
        hormone_testing_start_date: None,
        breed_date_actual: None,
        breed_date_reference: None,
        locked_cycle_start: None,
        locked_ovulation_date: None,
        locked_due_date: None,
        locked_placement_start_date: None,
        expected_cycle_start: None,
        expected_ovulation: None,
        expected_due_date: None,
        expected_weaned_date: None,
        expected_placement_start: None,
        expected_placement_completed: None,
        birth_date_actual: None,
        weaned_date_actual: None,
        placement_start_date_actual: None,
        placement_completed_date_actual: None,
        completed_date_actual: None,
        ovulation_offset_variance_days: None,
        committed_at: None,
        committed_by: None,
        archived: false,
        deleted_at: None,
        version: 0,
        created_at: created,
        updated_at: created,
    }
}

/// A dog plan locked on a 2024-01-01 cycle start, in `status`.
pub(crate) fn locked_dog(status: PlanStatus) -> BreedingPlan {
    let mut p = plan(Species::Dog, status);
    p.cycle_start_observed = Some(date(2024, 1, 1));
    p.locked_cycle_start = Some(date(2024, 1, 1));
    p.locked_ovulation_date = Some(date(2024, 1, 13));
    p.locked_due_date = Some(date(2024, 3, 16));
    p.locked_placement_start_date = Some(date(2024, 5, 11));
    p
}
