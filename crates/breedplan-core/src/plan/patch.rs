//! Partial updates to a breeding plan.
//!
//! Every field is tri-state: absent leaves the stored value alone,
//! `Some(None)` clears it, `Some(Some(v))` sets it. Dates are keyed by
//! [`DateField`] so the validators can walk them as data.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use uuid::Uuid;

use breedplan_db::models::{BreedingPlan, OvulationMethod, PlanStatus, ReproAnchorMode};

use crate::fields::DateField;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlanPatch {
    pub name: Option<String>,
    pub code: Option<String>,
    pub status: Option<PlanStatus>,
    pub repro_anchor_mode: Option<ReproAnchorMode>,
    pub dam_id: Option<Option<Uuid>>,
    pub sire_id: Option<Option<Uuid>>,
    pub recipient_id: Option<Option<Uuid>>,
    pub embryo_transfer: Option<bool>,
    pub cycle_start_unknown: Option<bool>,
    pub ovulation_confirmation_method: Option<Option<OvulationMethod>>,
    pub dates: BTreeMap<DateField, Option<NaiveDate>>,
}

impl PlanPatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(mut self, status: PlanStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn set_date(mut self, field: DateField, date: NaiveDate) -> Self {
        self.dates.insert(field, Some(date));
        self
    }

    pub fn clear_date(mut self, field: DateField) -> Self {
        self.dates.insert(field, None);
        self
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// The value `field` will have after this patch is applied to `plan`.
    pub fn date_after(&self, plan: &BreedingPlan, field: DateField) -> Option<NaiveDate> {
        match self.dates.get(&field) {
            Some(value) => *value,
            None => field.get(plan),
        }
    }

    /// Date entries whose value differs from what `plan` stores.
    pub fn changed_dates<'a>(
        &'a self,
        plan: &'a BreedingPlan,
    ) -> impl Iterator<Item = (DateField, Option<NaiveDate>)> + 'a {
        self.dates
            .iter()
            .filter(move |(field, value)| field.get(plan) != **value)
            .map(|(field, value)| (*field, *value))
    }

    /// Copy `plan` with every present field of the patch written into it.
    /// No validation happens here.
    pub fn apply_to(&self, plan: &BreedingPlan) -> BreedingPlan {
        let mut next = plan.clone();
        if let Some(name) = &self.name {
            next.name.clone_from(name);
        }
        if let Some(code) = &self.code {
            next.code = Some(code.clone());
        }
        if let Some(status) = self.status {
            next.status = status;
        }
        if let Some(mode) = self.repro_anchor_mode {
            next.repro_anchor_mode = mode;
        }
        if let Some(dam) = self.dam_id {
            next.dam_id = dam;
        }
        if let Some(sire) = self.sire_id {
            next.sire_id = sire;
        }
        if let Some(recipient) = self.recipient_id {
            next.recipient_id = recipient;
        }
        if let Some(et) = self.embryo_transfer {
            next.embryo_transfer = et;
        }
        if let Some(unknown) = self.cycle_start_unknown {
            next.cycle_start_unknown = unknown;
        }
        if let Some(method) = self.ovulation_confirmation_method {
            next.ovulation_confirmation_method = method;
        }
        for (field, value) in &self.dates {
            field.set(&mut next, *value);
        }
        next
    }
}
