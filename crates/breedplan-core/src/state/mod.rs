//! Plan status state machine.
//!
//! The rules are tables keyed by [`PlanStatus`]: progression order, date
//! requirements per target status, the dates each phase owns, and the
//! one-step rewind map. Everything here is pure; the lifecycle layer feeds
//! it plan snapshots and dependent-record counts read inside its
//! transaction.

pub mod dispatch;

use breedplan_db::models::{BreedingPlan, DateConfidence, PlanStatus, ReproAnchorMode};

use crate::error::{BlockingCounts, LifecycleError};
use crate::fields::DateField;
use crate::species::SpeciesProfile;

/// The ordered progression. [`PlanStatus::Committed`] shares the index of
/// [`PlanStatus::Cycle`].
const PROGRESSION: [PlanStatus; 11] = [
    PlanStatus::Planning,
    PlanStatus::Cycle,
    PlanStatus::CycleExpected,
    PlanStatus::HormoneTesting,
    PlanStatus::Bred,
    PlanStatus::Pregnant,
    PlanStatus::Birthed,
    PlanStatus::Born,
    PlanStatus::Weaned,
    PlanStatus::Placement,
    PlanStatus::PlanComplete,
];

/// Statuses in which the dam, sire and recipient count as actively breeding.
pub const ACTIVE_BREEDING_STATUSES: [PlanStatus; 6] = [
    PlanStatus::Cycle,
    PlanStatus::Committed,
    PlanStatus::CycleExpected,
    PlanStatus::HormoneTesting,
    PlanStatus::Bred,
    PlanStatus::Pregnant,
];

/// [`ACTIVE_BREEDING_STATUSES`] as stored status strings, for queries.
pub fn active_breeding_status_names() -> [&'static str; 6] {
    ACTIVE_BREEDING_STATUSES.map(|s| s.as_str())
}

/// Counts of the records that depend on a plan, read in the same
/// transaction as the write they gate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DependentCounts {
    pub offspring: i64,
    pub offspring_alive: i64,
    pub waitlist: i64,
}

impl DependentCounts {
    pub fn blocking(&self) -> BlockingCounts {
        BlockingCounts {
            offspring: self.offspring,
            waitlist: self.waitlist,
        }
    }
}

/// Which fields a rewind clears.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RewindReset {
    /// Status only.
    Nothing,
    /// Locked-date group, commit metadata, the cycle observations and any
    /// recorded breeding attempt.
    CycleCommitment,
    HormoneTesting,
    Birth,
    Weaning,
    PlacementStart,
    Completion,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RewindStep {
    pub from: PlanStatus,
    pub to: PlanStatus,
    pub reset: RewindReset,
}

/// The plan state machine.
///
/// ```text
/// PLANNING -> CYCLE -> CYCLE_EXPECTED -> HORMONE_TESTING -> BRED -> PREGNANT
///   -> BIRTHED -> BORN -> WEANED -> PLACEMENT -> PLAN_COMPLETE
///
/// any non-terminal -> CANCELED | UNSUCCESSFUL | ON_HOLD
/// ON_HOLD          -> status held before
/// BIRTHED..PLACEMENT -> DISSOLVED   (dissolve only)
/// ```
pub struct PlanStateMachine;

impl PlanStateMachine {
    /// Map the deprecated `COMMITTED` spelling onto `CYCLE`.
    pub fn canonical(status: PlanStatus) -> PlanStatus {
        match status {
            PlanStatus::Committed => PlanStatus::Cycle,
            other => other,
        }
    }

    /// Position in the ordered progression; `None` for statuses outside it.
    pub fn ordinal(status: PlanStatus) -> Option<usize> {
        let status = Self::canonical(status);
        PROGRESSION.iter().position(|s| *s == status)
    }

    /// No status change of any kind is allowed from these.
    pub fn is_terminal(status: PlanStatus) -> bool {
        matches!(
            status,
            PlanStatus::Canceled | PlanStatus::Unsuccessful | PlanStatus::Dissolved
        )
    }

    /// Reachable from any non-terminal status.
    pub fn is_escape(status: PlanStatus) -> bool {
        matches!(
            status,
            PlanStatus::Canceled | PlanStatus::Unsuccessful | PlanStatus::OnHold
        )
    }

    pub fn is_cycle_phase(status: PlanStatus) -> bool {
        matches!(
            status,
            PlanStatus::Cycle
                | PlanStatus::Committed
                | PlanStatus::CycleExpected
                | PlanStatus::HormoneTesting
        )
    }

    pub fn is_actively_breeding(status: PlanStatus) -> bool {
        ACTIVE_BREEDING_STATUSES.contains(&status)
    }

    /// `true` when `status` is at or beyond `milestone` in the progression.
    pub fn reached(status: PlanStatus, milestone: PlanStatus) -> bool {
        match (Self::ordinal(status), Self::ordinal(milestone)) {
            (Some(s), Some(m)) => s >= m,
            _ => false,
        }
    }

    /// Actual dates recorded by entering `status`. Regressing out of the
    /// status requires these to be cleared first.
    pub fn owned_dates(status: PlanStatus) -> &'static [DateField] {
        match status {
            PlanStatus::HormoneTesting => &[DateField::HormoneTestingStartDate],
            PlanStatus::Bred => &[DateField::BreedDateActual],
            PlanStatus::Birthed => &[DateField::BirthDateActual],
            PlanStatus::Weaned => &[DateField::WeanedDateActual],
            PlanStatus::Placement => &[DateField::PlacementStartDateActual],
            PlanStatus::PlanComplete => &[
                DateField::PlacementCompletedDateActual,
                DateField::CompletedDateActual,
            ],
            _ => &[],
        }
    }

    /// Parents that must be assigned before the plan leaves `PLANNING`.
    pub fn missing_parents(plan: &BreedingPlan) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if plan.dam_id.is_none() {
            missing.push("dam_id");
        }
        if plan.sire_id.is_none() {
            missing.push("sire_id");
        }
        if plan.embryo_transfer && plan.recipient_id.is_none() {
            missing.push("recipient_id");
        }
        missing
    }

    /// Fields `plan` lacks to be in `target`. Requirements accumulate along
    /// the progression; escape and terminal statuses require nothing.
    pub fn missing_requirements(
        plan: &BreedingPlan,
        target: PlanStatus,
        profile: &SpeciesProfile,
    ) -> Vec<&'static str> {
        let Some(ord) = Self::ordinal(target) else {
            return Vec::new();
        };
        if ord == 0 {
            return Vec::new();
        }

        let mut missing = Self::missing_parents(plan);
        let at_least = |milestone: PlanStatus| Self::reached(target, milestone);

        if Self::is_cycle_phase(target) && !plan.is_locked() {
            missing.extend(
                DateField::LOCKED_GROUP
                    .iter()
                    .filter(|f| f.get(plan).is_none())
                    .map(|f| f.name()),
            );
        }
        if Self::canonical(target) == PlanStatus::HormoneTesting
            && plan.hormone_testing_start_date.is_none()
        {
            missing.push(DateField::HormoneTestingStartDate.name());
        }
        if at_least(PlanStatus::Bred) {
            let cycle_known = plan.cycle_start_observed.is_some()
                || plan.ovulation_confirmed.is_some()
                || plan.cycle_start_unknown
                || profile.induced_ovulator;
            if !cycle_known {
                missing.push(DateField::CycleStartObserved.name());
            }
        }

        let chain = [
            (PlanStatus::Bred, DateField::BreedDateActual),
            (PlanStatus::Birthed, DateField::BirthDateActual),
            (PlanStatus::Weaned, DateField::WeanedDateActual),
            (PlanStatus::Placement, DateField::PlacementStartDateActual),
            (
                PlanStatus::PlanComplete,
                DateField::PlacementCompletedDateActual,
            ),
        ];
        for (milestone, field) in chain {
            if at_least(milestone) && field.get(plan).is_none() {
                missing.push(field.name());
            }
        }

        missing
    }

    /// Validate a freeform status change from `current` to `proposed.status`.
    ///
    /// `proposed` is the plan as it will be written, so dates cleared in the
    /// same request already count as cleared.
    pub fn check_transition(
        current: &BreedingPlan,
        proposed: &BreedingPlan,
        counts: &DependentCounts,
        profile: &SpeciesProfile,
    ) -> Result<(), LifecycleError> {
        let from = current.status;
        let to = proposed.status;
        if Self::canonical(from) == Self::canonical(to) {
            return Ok(());
        }
        if Self::is_terminal(from) {
            return Err(LifecycleError::conflict(format!(
                "plan is {from}; no further status changes are allowed"
            )));
        }
        if to == PlanStatus::Dissolved {
            return Err(LifecycleError::validation(
                "DISSOLVED is reached only through the dissolve operation",
            ));
        }
        if Self::is_escape(to) {
            return Ok(());
        }

        if from == PlanStatus::OnHold {
            let held = current.status_before_hold.map(Self::canonical);
            if held != Some(Self::canonical(to)) {
                let held = held.map_or_else(|| "an unknown status".to_owned(), |s| s.to_string());
                return Err(LifecycleError::conflict(format!(
                    "an on-hold plan may only resume to {held}"
                )));
            }
            return Self::require(proposed, to, profile);
        }

        let (Some(from_ord), Some(to_ord)) = (Self::ordinal(from), Self::ordinal(to)) else {
            return Err(LifecycleError::conflict(format!(
                "no transition from {from} to {to}"
            )));
        };

        if to_ord < from_ord {
            Self::check_regression(proposed, from_ord, to_ord, counts)?;
        }
        Self::require(proposed, to, profile)
    }

    fn require(
        plan: &BreedingPlan,
        target: PlanStatus,
        profile: &SpeciesProfile,
    ) -> Result<(), LifecycleError> {
        let missing = Self::missing_requirements(plan, target, profile);
        if missing.is_empty() {
            Ok(())
        } else {
            Err(LifecycleError::missing_fields(
                format!("{target} requires {}", missing.join(", ")),
                missing,
            ))
        }
    }

    fn check_regression(
        proposed: &BreedingPlan,
        from_ord: usize,
        to_ord: usize,
        counts: &DependentCounts,
    ) -> Result<(), LifecycleError> {
        let to = PROGRESSION[to_ord];
        if !Self::reached(to, PlanStatus::Birthed) && counts.offspring > 0 {
            return Err(LifecycleError::blocked(
                format!(
                    "cannot regress to {to}: {} offspring record(s) exist",
                    counts.offspring
                ),
                counts.blocking(),
            ));
        }

        let still_set: Vec<&'static str> = PROGRESSION[to_ord + 1..=from_ord]
            .iter()
            .flat_map(|s| Self::owned_dates(*s))
            .filter(|f| f.get(proposed).is_some())
            .map(|f| f.name())
            .collect();
        if !still_set.is_empty() {
            return Err(LifecycleError::validation(format!(
                "clear {} before regressing to {to}",
                still_set.join(", ")
            )));
        }
        Ok(())
    }

    /// The one-step rewind for `status`, if it has one.
    pub fn rewind_step(status: PlanStatus) -> Option<RewindStep> {
        use PlanStatus as S;
        use RewindReset as R;

        let (to, reset) = match status {
            S::Cycle | S::Committed => (S::Planning, R::CycleCommitment),
            S::CycleExpected => (S::Cycle, R::Nothing),
            S::HormoneTesting => (S::Cycle, R::HormoneTesting),
            S::Bred => (S::Planning, R::CycleCommitment),
            S::Pregnant => (S::Bred, R::Nothing),
            S::Birthed => (S::Pregnant, R::Birth),
            S::Born => (S::Birthed, R::Nothing),
            S::Weaned => (S::Born, R::Weaning),
            S::Placement => (S::Weaned, R::PlacementStart),
            S::PlanComplete => (S::Placement, R::Completion),
            S::Planning | S::Canceled | S::Unsuccessful | S::OnHold | S::Dissolved => {
                return None;
            }
        };
        Some(RewindStep {
            from: status,
            to,
            reset,
        })
    }

    /// Apply `step` to `plan`: set the target status and clear exactly the
    /// fields the undone phase owns.
    pub fn apply_rewind(plan: &mut BreedingPlan, step: RewindStep) {
        plan.status = step.to;
        match step.reset {
            RewindReset::Nothing => {}
            RewindReset::CycleCommitment => Self::reset_cycle_commitment(plan),
            RewindReset::HormoneTesting => plan.hormone_testing_start_date = None,
            RewindReset::Birth => plan.birth_date_actual = None,
            RewindReset::Weaning => plan.weaned_date_actual = None,
            RewindReset::PlacementStart => plan.placement_start_date_actual = None,
            RewindReset::Completion => {
                plan.placement_completed_date_actual = None;
                plan.completed_date_actual = None;
            }
        }
    }

    /// Undo a cycle lock: clear the locked-date group, commit metadata,
    /// anchor observations, the hormone-testing date and the breeding date
    /// with its tolerance reference. A breeding date cannot outlive the
    /// cycle observation it follows. Expected dates stay as low-confidence
    /// estimates. The friendly code is kept.
    pub fn reset_cycle_commitment(plan: &mut BreedingPlan) {
        for field in DateField::LOCKED_GROUP {
            field.set(plan, None);
        }
        plan.committed_at = None;
        plan.committed_by = None;
        plan.cycle_start_observed = None;
        plan.ovulation_confirmed = None;
        plan.ovulation_confirmation_method = None;
        plan.ovulation_offset_variance_days = None;
        plan.hormone_testing_start_date = None;
        plan.breed_date_actual = None;
        plan.breed_date_reference = None;
        plan.repro_anchor_mode = ReproAnchorMode::CycleStart;
        plan.date_confidence_level = plan.expected_ovulation.map(|_| DateConfidence::Low);
    }
}
