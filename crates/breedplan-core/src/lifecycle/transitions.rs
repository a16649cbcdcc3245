//! Pure computation of each lifecycle operation.
//!
//! Every function takes the plan as read under the row lock and returns the
//! plan to store plus its events, or the error that rejects the request.
//! Nothing here touches the database.

use chrono::{DateTime, NaiveDate, Utc};
use serde_json::json;

use breedplan_db::models::{
    BreedingPlan, DateConfidence, OvulationMethod, PlanStatus, ReproAnchorMode,
};

use crate::error::LifecycleError;
use crate::fields::DateField;
use crate::immutability::{check_dependency_chain, validate_patch};
use crate::plan::patch::PlanPatch;
use crate::species::SpeciesProfile;
use crate::state::{DependentCounts, PlanStateMachine};
use crate::timeline::{self, Timeline};

use super::events::{EventKind, Mutation, PlanEvent};

/// Anchor supplied to [`lock`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockRequest {
    pub anchor_mode: ReproAnchorMode,
    pub anchor_date: NaiveDate,
    pub confirmation_method: Option<OvulationMethod>,
}

/// Status changes with a dedicated entry point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusChange {
    Hold,
    Resume,
    Cancel,
    MarkUnsuccessful,
}

fn set_locked(plan: &mut BreedingPlan, t: &Timeline) {
    plan.locked_cycle_start = Some(t.cycle_start);
    plan.locked_ovulation_date = Some(t.ovulation);
    plan.locked_due_date = Some(t.due_date);
    plan.locked_placement_start_date = Some(t.placement_start);
}

/// Overwrite the expected dates from ovulation onwards.
fn set_expected_downstream(plan: &mut BreedingPlan, t: &Timeline) {
    plan.expected_ovulation = Some(t.ovulation);
    plan.expected_due_date = Some(t.due_date);
    plan.expected_weaned_date = Some(t.weaned_date);
    plan.expected_placement_start = Some(t.placement_start);
    plan.expected_placement_completed = Some(t.placement_completed);
}

fn set_expected(plan: &mut BreedingPlan, t: &Timeline) {
    plan.expected_cycle_start = Some(t.cycle_start);
    set_expected_downstream(plan, t);
}

fn require_parents(plan: &BreedingPlan, operation: &str) -> Result<(), LifecycleError> {
    let missing = PlanStateMachine::missing_parents(plan);
    if missing.is_empty() {
        return Ok(());
    }
    Err(LifecycleError::missing_fields(
        format!("{operation} requires {}", missing.join(", ")),
        missing,
    ))
}

fn status_payload(from: PlanStatus, to: PlanStatus) -> serde_json::Value {
    json!({ "from": from, "to": to })
}

/// Lock the cycle on an anchor date and enter `CYCLE`.
pub fn lock(
    plan: &BreedingPlan,
    request: &LockRequest,
    profile: &SpeciesProfile,
) -> Result<Mutation, LifecycleError> {
    if plan.status != PlanStatus::Planning {
        return Err(LifecycleError::conflict(format!(
            "lock is only valid from PLANNING; plan is {}",
            plan.status
        )));
    }
    let projected = timeline::project(request.anchor_mode, request.anchor_date, profile)?;
    require_parents(plan, "lock")?;

    let mut next = plan.clone();
    set_locked(&mut next, &projected);
    set_expected(&mut next, &projected);
    next.repro_anchor_mode = request.anchor_mode;
    next.date_confidence_level = Some(timeline::confidence_for(request.anchor_mode));
    next.ovulation_offset_variance_days = None;

    match request.anchor_mode {
        ReproAnchorMode::CycleStart => {
            next.cycle_start_observed = Some(request.anchor_date);
            next.ovulation_confirmed = None;
            next.ovulation_confirmation_method = None;
        }
        ReproAnchorMode::Ovulation => {
            next.cycle_start_observed = None;
            next.ovulation_confirmed = Some(request.anchor_date);
            next.ovulation_confirmation_method = request.confirmation_method;
        }
        ReproAnchorMode::BreedingDate => {
            next.cycle_start_observed = None;
            next.ovulation_confirmed = None;
            next.ovulation_confirmation_method = None;
            next.breed_date_actual = Some(request.anchor_date);
            next.breed_date_reference = Some(request.anchor_date);
        }
    }
    next.status = PlanStatus::Cycle;

    let locked = PlanEvent::new(
        EventKind::AnchorLocked,
        format!(
            "Cycle locked on {} anchor {}",
            request.anchor_mode, request.anchor_date
        ),
        json!({
            "anchor_mode": request.anchor_mode,
            "anchor_date": request.anchor_date,
            "confirmation_method": request.confirmation_method,
            "timeline": projected,
        }),
    );
    let started = PlanEvent::new(
        EventKind::CycleStarted,
        "Cycle started",
        status_payload(plan.status, PlanStatus::Cycle),
    );
    Ok(Mutation {
        plan: next,
        events: vec![locked, started],
    })
}

/// Refine a cycle-start lock with a confirmed ovulation date.
pub fn upgrade_to_ovulation(
    plan: &BreedingPlan,
    ovulation: NaiveDate,
    method: OvulationMethod,
    profile: &SpeciesProfile,
) -> Result<Mutation, LifecycleError> {
    if plan.repro_anchor_mode != ReproAnchorMode::CycleStart {
        return Err(LifecycleError::conflict(format!(
            "can only upgrade from cycle-start anchoring; plan is anchored on {}",
            plan.repro_anchor_mode
        )));
    }
    if !profile.supports_ovulation_upgrade {
        return Err(LifecycleError::SpeciesCapabilityViolation {
            species: profile.species,
            anchor_mode: ReproAnchorMode::Ovulation,
            reason: "the species does not support upgrading to an ovulation anchor".to_owned(),
        });
    }
    let in_window =
        PlanStateMachine::is_cycle_phase(plan.status) || plan.status == PlanStatus::Bred;
    if !in_window || !plan.is_locked() {
        return Err(LifecycleError::conflict(format!(
            "upgrade needs a locked plan between CYCLE and BRED; plan is {}",
            plan.status
        )));
    }
    let cycle_start = plan
        .cycle_start_observed
        .or(plan.locked_cycle_start)
        .ok_or_else(|| {
            LifecycleError::missing_fields(
                "upgrade requires a cycle-start date",
                vec![DateField::CycleStartObserved.name()],
            )
        })?;
    if ovulation <= cycle_start {
        return Err(LifecycleError::validation(format!(
            "ovulation {ovulation} must be after the cycle start {cycle_start}"
        )));
    }

    let projected = timeline::project(ReproAnchorMode::Ovulation, ovulation, profile)?;
    let variance = timeline::ovulation_variance_days(cycle_start, ovulation, profile);

    let mut next = plan.clone();
    next.locked_ovulation_date = Some(projected.ovulation);
    next.locked_due_date = Some(projected.due_date);
    next.locked_placement_start_date = Some(projected.placement_start);
    set_expected_downstream(&mut next, &projected);
    next.repro_anchor_mode = ReproAnchorMode::Ovulation;
    next.date_confidence_level = Some(DateConfidence::High);
    next.ovulation_confirmed = Some(ovulation);
    next.ovulation_confirmation_method = Some(method);
    next.ovulation_offset_variance_days = Some(variance);

    let event = PlanEvent::new(
        EventKind::OvulationUpgraded,
        format!("Anchor upgraded to confirmed ovulation on {ovulation}"),
        json!({
            "ovulation_date": ovulation,
            "confirmation_method": method,
            "variance_days": variance,
            "before": {
                "ovulation": plan.locked_ovulation_date,
                "due_date": plan.locked_due_date,
                "placement_start": plan.locked_placement_start_date,
            },
            "after": {
                "ovulation": projected.ovulation,
                "due_date": projected.due_date,
                "placement_start": projected.placement_start,
            },
        }),
    );
    Ok(Mutation::new(next, event))
}

/// Drop a confirmed ovulation anchor back to cycle-start anchoring. The
/// locked ovulation date stays as an estimate.
pub fn clear_ovulation(plan: &BreedingPlan) -> Result<Mutation, LifecycleError> {
    if !PlanStateMachine::is_cycle_phase(plan.status) {
        return Err(LifecycleError::conflict(format!(
            "ovulation can only be cleared during the cycle phase; plan is {}",
            plan.status
        )));
    }
    if plan.repro_anchor_mode != ReproAnchorMode::Ovulation {
        return Err(LifecycleError::conflict(format!(
            "plan is anchored on {}, not a confirmed ovulation",
            plan.repro_anchor_mode
        )));
    }

    let mut next = plan.clone();
    next.repro_anchor_mode = ReproAnchorMode::CycleStart;
    next.ovulation_confirmed = None;
    next.ovulation_confirmation_method = None;
    next.ovulation_offset_variance_days = None;
    next.date_confidence_level = Some(DateConfidence::Medium);

    let event = PlanEvent::new(
        EventKind::OvulationCleared,
        "Confirmed ovulation cleared",
        json!({ "previous_ovulation": plan.ovulation_confirmed }),
    );
    Ok(Mutation::new(next, event))
}

/// `<SPECIES>-<YEAR>-<NNNN>`.
pub fn friendly_code(plan: &BreedingPlan, year: i32, sequence: i64) -> String {
    format!("{}-{year}-{sequence:04}", plan.species)
}

/// Commit a fully locked plan. `code` is used only when the plan has none.
pub fn commit(
    plan: &BreedingPlan,
    code: Option<String>,
    actor: &str,
    now: DateTime<Utc>,
) -> Result<Mutation, LifecycleError> {
    let status = plan.status;
    if PlanStateMachine::is_terminal(status)
        || status == PlanStatus::OnHold
        || PlanStateMachine::reached(status, PlanStatus::Bred)
    {
        return Err(LifecycleError::conflict(format!(
            "cannot commit a plan in {status}"
        )));
    }

    let missing: Vec<&'static str> = DateField::LOCKED_GROUP
        .iter()
        .filter(|f| f.get(plan).is_none())
        .map(|f| f.name())
        .collect();
    if missing.len() == DateField::LOCKED_GROUP.len() {
        return Err(LifecycleError::missing_fields(
            "commit requires a locked cycle",
            missing,
        ));
    }
    if !missing.is_empty() {
        return Err(LifecycleError::conflict(format!(
            "the locked-date group is incomplete (missing {})",
            missing.join(", ")
        )));
    }
    if plan.committed_at.is_some() {
        return Err(LifecycleError::conflict("plan is already committed"));
    }
    require_parents(plan, "commit")?;

    let mut next = plan.clone();
    if status == PlanStatus::Planning {
        next.status = PlanStatus::Cycle;
    }
    if next.code.is_none() {
        next.code = code;
    }
    next.committed_at = Some(now);
    next.committed_by = Some(actor.to_owned());

    let label = match &next.code {
        Some(code) => format!("Plan committed as {code}"),
        None => "Plan committed".to_owned(),
    };
    let event = PlanEvent::new(
        EventKind::Committed,
        label,
        json!({ "code": next.code, "from": status, "to": next.status }),
    );
    Ok(Mutation::new(next, event))
}

/// Undo a commit, returning the plan to `PLANNING`.
pub fn uncommit(
    plan: &BreedingPlan,
    counts: &DependentCounts,
) -> Result<Mutation, LifecycleError> {
    if PlanStateMachine::canonical(plan.status) != PlanStatus::Cycle {
        return Err(LifecycleError::conflict(format!(
            "uncommit is only valid from CYCLE; plan is {}",
            plan.status
        )));
    }
    if plan.committed_at.is_none() {
        return Err(LifecycleError::conflict("plan is not committed"));
    }
    if counts.offspring > 0 || counts.waitlist > 0 {
        return Err(LifecycleError::blocked(
            format!(
                "cannot uncommit: {} offspring and {} waitlist record(s) depend on the plan",
                counts.offspring, counts.waitlist
            ),
            counts.blocking(),
        ));
    }

    let mut next = plan.clone();
    PlanStateMachine::reset_cycle_commitment(&mut next);
    next.status = PlanStatus::Planning;
    check_dependency_chain(plan, &next)?;

    let event = PlanEvent::new(
        EventKind::Uncommitted,
        "Commit reverted",
        status_payload(plan.status, PlanStatus::Planning),
    );
    Ok(Mutation::new(next, event))
}

/// Step back one phase along the rewind map.
pub fn rewind(plan: &BreedingPlan, counts: &DependentCounts) -> Result<Mutation, LifecycleError> {
    let step = PlanStateMachine::rewind_step(plan.status).ok_or_else(|| {
        LifecycleError::conflict(format!("cannot rewind from {}", plan.status))
    })?;
    if !PlanStateMachine::reached(step.to, PlanStatus::Birthed) && counts.offspring > 0 {
        return Err(LifecycleError::blocked(
            format!(
                "cannot rewind to {}: {} offspring record(s) exist",
                step.to, counts.offspring
            ),
            counts.blocking(),
        ));
    }

    let mut next = plan.clone();
    PlanStateMachine::apply_rewind(&mut next, step);
    check_dependency_chain(plan, &next)?;

    let event = PlanEvent::new(
        EventKind::Rewound,
        format!("Rewound from {} to {}", step.from, step.to),
        status_payload(step.from, step.to),
    );
    Ok(Mutation::new(next, event))
}

/// Move a post-birth plan to its next care milestone.
pub fn advance(
    plan: &BreedingPlan,
    milestone: Option<NaiveDate>,
    today: NaiveDate,
    profile: &SpeciesProfile,
) -> Result<Mutation, LifecycleError> {
    let (to, field) = match plan.status {
        PlanStatus::Birthed => (PlanStatus::Born, None),
        PlanStatus::Born => (PlanStatus::Weaned, Some(DateField::WeanedDateActual)),
        PlanStatus::Weaned => (
            PlanStatus::Placement,
            Some(DateField::PlacementStartDateActual),
        ),
        PlanStatus::Placement => (
            PlanStatus::PlanComplete,
            Some(DateField::PlacementCompletedDateActual),
        ),
        other => {
            return Err(LifecycleError::conflict(format!(
                "advance applies from BIRTHED through PLACEMENT; plan is {other}"
            )));
        }
    };

    let mut next = plan.clone();
    match (field, milestone) {
        (Some(field), Some(date)) => {
            if plan.birth_date_actual.is_some_and(|birth| date < birth) {
                return Err(LifecycleError::validation(format!(
                    "{} {date} is before the birth date",
                    field.name()
                )));
            }
            field.set(&mut next, Some(date));
        }
        (None, Some(_)) => {
            return Err(LifecycleError::validation(format!(
                "{to} takes no milestone date"
            )));
        }
        (_, None) => {}
    }
    next.status = to;
    if to == PlanStatus::PlanComplete && next.completed_date_actual.is_none() {
        next.completed_date_actual = Some(today);
    }

    let missing = PlanStateMachine::missing_requirements(&next, to, profile);
    if !missing.is_empty() {
        return Err(LifecycleError::missing_fields(
            format!("{to} requires {}", missing.join(", ")),
            missing,
        ));
    }

    let event = PlanEvent::new(
        EventKind::Advanced,
        format!("Advanced from {} to {to}", plan.status),
        json!({ "from": plan.status, "to": to, "milestone_date": milestone }),
    );
    Ok(Mutation::new(next, event))
}

/// Close a post-birth plan whose offspring have all died.
pub fn dissolve(plan: &BreedingPlan, counts: &DependentCounts) -> Result<Mutation, LifecycleError> {
    let dissolvable = matches!(
        plan.status,
        PlanStatus::Birthed | PlanStatus::Born | PlanStatus::Weaned | PlanStatus::Placement
    );
    if !dissolvable {
        return Err(LifecycleError::conflict(format!(
            "dissolve applies from BIRTHED through PLACEMENT; plan is {}",
            plan.status
        )));
    }
    if counts.offspring_alive > 0 {
        return Err(LifecycleError::blocked(
            format!(
                "{} of {} offspring are still alive",
                counts.offspring_alive, counts.offspring
            ),
            counts.blocking(),
        ));
    }

    let mut next = plan.clone();
    next.status = PlanStatus::Dissolved;

    let event = PlanEvent::new(
        EventKind::Dissolved,
        "Plan dissolved",
        json!({ "from": plan.status, "offspring": counts.offspring }),
    );
    Ok(Mutation::new(next, event))
}

/// Hold, resume, cancel or mark unsuccessful.
pub fn change_status(
    plan: &BreedingPlan,
    change: StatusChange,
    counts: &DependentCounts,
    profile: &SpeciesProfile,
) -> Result<Mutation, LifecycleError> {
    let mut next = plan.clone();
    let kind = match change {
        StatusChange::Hold => {
            if plan.status == PlanStatus::OnHold {
                return Err(LifecycleError::conflict("plan is already on hold"));
            }
            next.status = PlanStatus::OnHold;
            next.status_before_hold = Some(plan.status);
            EventKind::Held
        }
        StatusChange::Resume => {
            if plan.status != PlanStatus::OnHold {
                return Err(LifecycleError::conflict(format!(
                    "only an on-hold plan can resume; plan is {}",
                    plan.status
                )));
            }
            next.status = plan
                .status_before_hold
                .ok_or_else(|| LifecycleError::conflict("no status was recorded before hold"))?;
            next.status_before_hold = None;
            EventKind::Resumed
        }
        StatusChange::Cancel => {
            next.status = PlanStatus::Canceled;
            next.status_before_hold = None;
            EventKind::Canceled
        }
        StatusChange::MarkUnsuccessful => {
            next.status = PlanStatus::Unsuccessful;
            next.status_before_hold = None;
            EventKind::MarkedUnsuccessful
        }
    };
    PlanStateMachine::check_transition(plan, &next, counts, profile)?;

    let event = PlanEvent::new(
        kind,
        format!("Status changed from {} to {}", plan.status, next.status),
        status_payload(plan.status, next.status),
    );
    Ok(Mutation::new(next, event))
}

/// Apply a generic partial update.
///
/// Order: field immutability, derived projections, the dependency chain,
/// then the state machine for any status change. Returns a mutation with
/// no events when the patch changes nothing.
pub fn update(
    plan: &BreedingPlan,
    patch: &PlanPatch,
    counts: &DependentCounts,
    profile: &SpeciesProfile,
    today: NaiveDate,
) -> Result<Mutation, LifecycleError> {
    validate_patch(plan, patch)?;

    let mut next = patch.apply_to(plan);
    if let Some(status) = patch.status {
        next.status = PlanStateMachine::canonical(status);
    }

    if next.repro_anchor_mode != plan.repro_anchor_mode {
        timeline::check_anchor_capability(profile, next.repro_anchor_mode)?;
    }
    if plan.status == PlanStatus::Planning && !next.is_locked() {
        if let Some(Some(start)) = patch.dates.get(&DateField::ExpectedCycleStart) {
            let projected = timeline::project(ReproAnchorMode::CycleStart, *start, profile)?;
            set_expected(&mut next, &projected);
            next.date_confidence_level = Some(DateConfidence::Low);
        }
    }
    if next.is_locked() && !plan.is_locked() {
        next.date_confidence_level = Some(timeline::confidence_for(next.repro_anchor_mode));
    }

    check_dependency_chain(plan, &next)?;

    let status_changed =
        PlanStateMachine::canonical(next.status) != PlanStateMachine::canonical(plan.status);
    if status_changed {
        if next.status == PlanStatus::Planning {
            PlanStateMachine::reset_cycle_commitment(&mut next);
            check_dependency_chain(plan, &next)?;
        }
        PlanStateMachine::check_transition(plan, &next, counts, profile)?;

        if next.status == PlanStatus::OnHold {
            next.status_before_hold = Some(plan.status);
        } else {
            next.status_before_hold = None;
        }
        if PlanStateMachine::reached(next.status, PlanStatus::Bred)
            && next.breed_date_reference.is_none()
        {
            next.breed_date_reference = next.breed_date_actual;
        }
        if next.status == PlanStatus::PlanComplete && next.completed_date_actual.is_none() {
            next.completed_date_actual = Some(today);
        }
    } else {
        next.status = plan.status;
        let parents_changed = next.parent_ids() != plan.parent_ids()
            || next.embryo_transfer != plan.embryo_transfer;
        let needs_parents = plan.status != PlanStatus::Planning
            && !PlanStateMachine::is_terminal(plan.status);
        if parents_changed && needs_parents {
            require_parents(&next, &format!("a plan in {}", plan.status))?;
        }
    }

    if next.breed_date_actual.is_none() {
        next.breed_date_reference = None;
    }

    let mut events = Vec::new();
    if status_changed {
        events.push(PlanEvent::new(
            EventKind::StatusChanged,
            format!("Status changed from {} to {}", plan.status, next.status),
            status_payload(plan.status, next.status),
        ));
    }
    let dates_changed = DateField::ALL
        .iter()
        .any(|f| f.get(plan) != f.get(&next));
    if dates_changed {
        events.push(PlanEvent::new(
            EventKind::DatesUpdated,
            "Plan dates updated",
            json!({}),
        ));
    }
    if events.is_empty() && next != *plan {
        events.push(PlanEvent::new(
            EventKind::PlanUpdated,
            "Plan details updated",
            json!({}),
        ));
    }

    Ok(Mutation { plan: next, events })
}
