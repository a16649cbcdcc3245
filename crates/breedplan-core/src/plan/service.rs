//! Plan service layer.
//!
//! Creation, reads, archival and deletion of breeding plans, plus
//! registration of the dependent records (offspring, waitlist entries) whose
//! counts gate lifecycle transitions. Writes share the lifecycle's
//! transaction helpers, so each one locks the plan row, writes its event and
//! adjusts the tenant usage counter in a single transaction.

use anyhow::Context;
use chrono::NaiveDate;
use serde_json::json;
use uuid::Uuid;

use breedplan_db::models::{
    BreedingPlan, BreedingPlanEvent, DateConfidence, Offspring, ReproAnchorMode, Species,
    WaitlistEntry,
};
use breedplan_db::queries::plans::{self, NewBreedingPlan};
use breedplan_db::queries::{offspring, plan_events, usage};

use crate::error::LifecycleError;
use crate::lifecycle::events::{self, EventKind, Mutation, PlanEvent};
use crate::lifecycle::{ParentRole, PlanLifecycle, RequestContext, verify_parent};
use crate::species;
use crate::timeline;

/// Input for [`create_plan`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatePlan {
    pub name: String,
    pub species: Species,
    pub dam_id: Option<Uuid>,
    pub sire_id: Option<Uuid>,
    pub recipient_id: Option<Uuid>,
    pub embryo_transfer: bool,
    /// When given, the expected dates are projected from it at LOW
    /// confidence.
    pub expected_cycle_start: Option<NaiveDate>,
}

impl CreatePlan {
    pub fn new(name: impl Into<String>, species: Species) -> Self {
        Self {
            name: name.into(),
            species,
            dam_id: None,
            sire_id: None,
            recipient_id: None,
            embryo_transfer: false,
            expected_cycle_start: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteMode {
    /// Stamp `deleted_at`; the row and its events stay for audit.
    Soft,
    /// Remove the row. Its events cascade.
    Purge,
}

/// Create a plan in `PLANNING`.
///
/// Every parent given must exist in the tenant, match the plan's species and
/// have the sex its role needs.
pub async fn create_plan(
    lifecycle: &PlanLifecycle,
    ctx: &RequestContext,
    input: &CreatePlan,
) -> Result<BreedingPlan, LifecycleError> {
    if input.name.trim().is_empty() {
        return Err(LifecycleError::missing_fields(
            "a plan needs a name",
            vec!["name"],
        ));
    }
    let projected = match input.expected_cycle_start {
        Some(start) => Some(timeline::project(
            ReproAnchorMode::CycleStart,
            start,
            species::profile(input.species),
        )?),
        None => None,
    };

    let mut tx = lifecycle
        .pool()
        .begin()
        .await
        .context("failed to begin transaction")?;

    let parents = [
        (ParentRole::Dam, input.dam_id),
        (ParentRole::Sire, input.sire_id),
        (ParentRole::Recipient, input.recipient_id),
    ];
    for (role, animal_id) in parents {
        if let Some(animal_id) = animal_id {
            verify_parent(&mut tx, ctx.tenant_id, input.species, role, animal_id).await?;
        }
    }

    let plan = plans::insert_plan(
        &mut *tx,
        &NewBreedingPlan {
            tenant_id: ctx.tenant_id,
            name: input.name.trim().to_owned(),
            species: input.species,
            dam_id: input.dam_id,
            sire_id: input.sire_id,
            recipient_id: input.recipient_id,
            embryo_transfer: input.embryo_transfer,
            date_confidence_level: projected.map(|_| DateConfidence::Low),
            expected_cycle_start: projected.map(|t| t.cycle_start),
            expected_ovulation: projected.map(|t| t.ovulation),
            expected_due_date: projected.map(|t| t.due_date),
            expected_weaned_date: projected.map(|t| t.weaned_date),
            expected_placement_start: projected.map(|t| t.placement_start),
            expected_placement_completed: projected.map(|t| t.placement_completed),
        },
    )
    .await?;

    lifecycle
        .record_event(
            &mut tx,
            ctx,
            plan.id,
            EventKind::Created,
            "Plan created",
            json!({
                "name": plan.name,
                "species": plan.species,
                "expected_timeline": projected,
            }),
        )
        .await?;
    usage::adjust_usage(&mut *tx, ctx.tenant_id, usage::ACTIVE_PLANS, 1).await?;
    tx.commit()
        .await
        .context("failed to commit plan creation")?;

    tracing::info!(
        plan_id = %plan.id,
        tenant_id = %ctx.tenant_id,
        species = %plan.species,
        "breeding plan created"
    );
    lifecycle
        .announce(
            ctx,
            plan.id,
            EventKind::Created,
            format!("{} created plan {}", ctx.actor, plan.name),
        )
        .await;
    Ok(plan)
}

pub async fn get_plan(
    lifecycle: &PlanLifecycle,
    ctx: &RequestContext,
    plan_id: Uuid,
) -> Result<BreedingPlan, LifecycleError> {
    plans::get_plan(lifecycle.pool(), ctx.tenant_id, plan_id)
        .await?
        .ok_or_else(|| LifecycleError::plan_not_found(plan_id))
}

pub async fn list_plans(
    lifecycle: &PlanLifecycle,
    ctx: &RequestContext,
    include_archived: bool,
) -> Result<Vec<BreedingPlan>, LifecycleError> {
    Ok(plans::list_plans(lifecycle.pool(), ctx.tenant_id, include_archived).await?)
}

/// The plan's event log, oldest first. Events of a soft-deleted plan stay
/// readable.
pub async fn list_events(
    lifecycle: &PlanLifecycle,
    ctx: &RequestContext,
    plan_id: Uuid,
) -> Result<Vec<BreedingPlanEvent>, LifecycleError> {
    let events = plan_events::list_events_for_plan(lifecycle.pool(), ctx.tenant_id, plan_id).await?;
    if events.is_empty() {
        get_plan(lifecycle, ctx, plan_id).await?;
    }
    Ok(events)
}

pub async fn archive(
    lifecycle: &PlanLifecycle,
    ctx: &RequestContext,
    plan_id: Uuid,
) -> Result<BreedingPlan, LifecycleError> {
    set_archived(lifecycle, ctx, plan_id, true).await
}

pub async fn unarchive(
    lifecycle: &PlanLifecycle,
    ctx: &RequestContext,
    plan_id: Uuid,
) -> Result<BreedingPlan, LifecycleError> {
    set_archived(lifecycle, ctx, plan_id, false).await
}

async fn set_archived(
    lifecycle: &PlanLifecycle,
    ctx: &RequestContext,
    plan_id: Uuid,
    archived: bool,
) -> Result<BreedingPlan, LifecycleError> {
    let (mut tx, plan, _) = lifecycle.begin(ctx, plan_id).await?;
    if plan.archived == archived {
        return Ok(plan);
    }

    let (kind, label, delta) = if archived {
        (EventKind::Archived, "Plan archived", -1)
    } else {
        (EventKind::Unarchived, "Plan restored from archive", 1)
    };
    usage::adjust_usage(&mut *tx, ctx.tenant_id, usage::ACTIVE_PLANS, delta).await?;

    let mut next = plan.clone();
    next.archived = archived;
    let mutation = Mutation::new(next, PlanEvent::new(kind, label, json!({})));
    lifecycle.finish(tx, ctx, plan, mutation).await
}

/// Delete a plan.
///
/// A purge is refused while offspring or waitlist records reference the
/// plan. Either mode frees the plan's usage slot unless it was archived.
pub async fn delete_plan(
    lifecycle: &PlanLifecycle,
    ctx: &RequestContext,
    plan_id: Uuid,
    mode: DeleteMode,
) -> Result<(), LifecycleError> {
    let (mut tx, plan, counts) = lifecycle.begin(ctx, plan_id).await?;

    match mode {
        DeleteMode::Soft => {
            plans::soft_delete_plan(&mut *tx, ctx.tenant_id, plan_id, lifecycle.clock().now())
                .await?;
            lifecycle
                .record_event(
                    &mut tx,
                    ctx,
                    plan_id,
                    EventKind::Deleted,
                    "Plan deleted",
                    json!({ "status": plan.status }),
                )
                .await?;
        }
        DeleteMode::Purge => {
            if counts.offspring > 0 || counts.waitlist > 0 {
                return Err(LifecycleError::blocked(
                    format!(
                        "cannot delete plan {plan_id}: {} offspring and {} waitlist record(s) reference it",
                        counts.offspring, counts.waitlist
                    ),
                    counts.blocking(),
                ));
            }
            plans::delete_plan(&mut *tx, ctx.tenant_id, plan_id).await?;
        }
    }

    if !plan.archived {
        usage::adjust_usage(&mut *tx, ctx.tenant_id, usage::ACTIVE_PLANS, -1).await?;
    }
    events::sync_parents(&mut tx, ctx.tenant_id, &plan, &plan).await?;
    tx.commit()
        .await
        .context("failed to commit plan deletion")?;

    tracing::info!(
        plan_id = %plan_id,
        tenant_id = %ctx.tenant_id,
        mode = ?mode,
        "breeding plan deleted"
    );
    lifecycle
        .announce(
            ctx,
            plan_id,
            EventKind::Deleted,
            format!("{} deleted plan {}", ctx.actor, plan.name),
        )
        .await;
    Ok(())
}

/// Register an offspring on a plan. Takes the plan row lock, so it
/// serializes with any transition that counts offspring.
pub async fn add_offspring(
    lifecycle: &PlanLifecycle,
    ctx: &RequestContext,
    plan_id: Uuid,
    name: &str,
) -> Result<Offspring, LifecycleError> {
    let (mut tx, _, _) = lifecycle.begin(ctx, plan_id).await?;
    let row = offspring::insert_offspring(&mut *tx, ctx.tenant_id, plan_id, name).await?;
    tx.commit()
        .await
        .context("failed to commit offspring registration")?;
    Ok(row)
}

/// Record an offspring's death. An unknown offspring, or one already marked
/// deceased, is `NotFound`.
pub async fn mark_offspring_deceased(
    lifecycle: &PlanLifecycle,
    ctx: &RequestContext,
    offspring_id: Uuid,
) -> Result<(), LifecycleError> {
    let updated = offspring::mark_offspring_deceased(
        lifecycle.pool(),
        ctx.tenant_id,
        offspring_id,
        lifecycle.clock().now(),
    )
    .await?;
    if updated == 0 {
        return Err(LifecycleError::NotFound {
            entity: "offspring",
            id: offspring_id,
        });
    }
    Ok(())
}

/// Put a buyer on a plan's waitlist.
pub async fn add_waitlist_entry(
    lifecycle: &PlanLifecycle,
    ctx: &RequestContext,
    plan_id: Uuid,
    buyer_name: &str,
) -> Result<WaitlistEntry, LifecycleError> {
    let (mut tx, _, _) = lifecycle.begin(ctx, plan_id).await?;
    let entry =
        offspring::insert_waitlist_entry(&mut *tx, ctx.tenant_id, plan_id, buyer_name).await?;
    tx.commit()
        .await
        .context("failed to commit waitlist entry")?;
    Ok(entry)
}
