//! Database query functions for the `breeding_plans` table.
//!
//! Every function is scoped by `tenant_id`; a plan owned by another tenant
//! is indistinguishable from a missing one. Functions are generic over the
//! executor so the lifecycle layer can run them inside its transaction.

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::PgExecutor;
use uuid::Uuid;

use crate::models::{BreedingPlan, DateConfidence, Species};

/// Parameters for inserting a new plan in `PLANNING`.
#[derive(Debug, Clone)]
pub struct NewBreedingPlan {
    pub tenant_id: Uuid,
    pub name: String,
    pub species: Species,
    pub dam_id: Option<Uuid>,
    pub sire_id: Option<Uuid>,
    pub recipient_id: Option<Uuid>,
    pub embryo_transfer: bool,
    pub date_confidence_level: Option<DateConfidence>,
    pub expected_cycle_start: Option<NaiveDate>,
    pub expected_ovulation: Option<NaiveDate>,
    pub expected_due_date: Option<NaiveDate>,
    pub expected_weaned_date: Option<NaiveDate>,
    pub expected_placement_start: Option<NaiveDate>,
    pub expected_placement_completed: Option<NaiveDate>,
}

/// Insert a new plan row. Status, anchor mode and version take their
/// column defaults.
pub async fn insert_plan<'e, E: PgExecutor<'e>>(
    executor: E,
    new: &NewBreedingPlan,
) -> Result<BreedingPlan> {
    let plan = sqlx::query_as::<_, BreedingPlan>(
        "INSERT INTO breeding_plans \
         (tenant_id, name, species, dam_id, sire_id, recipient_id, embryo_transfer, \
          date_confidence_level, expected_cycle_start, expected_ovulation, expected_due_date, \
          expected_weaned_date, expected_placement_start, expected_placement_completed) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14) \
         RETURNING *",
    )
    .bind(new.tenant_id)
    .bind(&new.name)
    .bind(new.species)
    .bind(new.dam_id)
    .bind(new.sire_id)
    .bind(new.recipient_id)
    .bind(new.embryo_transfer)
    .bind(new.date_confidence_level)
    .bind(new.expected_cycle_start)
    .bind(new.expected_ovulation)
    .bind(new.expected_due_date)
    .bind(new.expected_weaned_date)
    .bind(new.expected_placement_start)
    .bind(new.expected_placement_completed)
    .fetch_one(executor)
    .await
    .with_context(|| format!("failed to insert breeding plan {:?}", new.name))?;

    Ok(plan)
}

/// Fetch a live (not deleted) plan by ID.
pub async fn get_plan<'e, E: PgExecutor<'e>>(
    executor: E,
    tenant_id: Uuid,
    id: Uuid,
) -> Result<Option<BreedingPlan>> {
    let plan = sqlx::query_as::<_, BreedingPlan>(
        "SELECT * FROM breeding_plans \
         WHERE id = $1 AND tenant_id = $2 AND deleted_at IS NULL",
    )
    .bind(id)
    .bind(tenant_id)
    .fetch_optional(executor)
    .await
    .with_context(|| format!("failed to fetch breeding plan {id}"))?;

    Ok(plan)
}

/// Fetch a live plan and take a row lock on it for the rest of the
/// surrounding transaction. Concurrent lifecycle operations on the same
/// plan queue behind this lock.
pub async fn get_plan_for_update<'e, E: PgExecutor<'e>>(
    executor: E,
    tenant_id: Uuid,
    id: Uuid,
) -> Result<Option<BreedingPlan>> {
    let plan = sqlx::query_as::<_, BreedingPlan>(
        "SELECT * FROM breeding_plans \
         WHERE id = $1 AND tenant_id = $2 AND deleted_at IS NULL \
         FOR UPDATE",
    )
    .bind(id)
    .bind(tenant_id)
    .fetch_optional(executor)
    .await
    .with_context(|| format!("failed to lock breeding plan {id}"))?;

    Ok(plan)
}

/// List a tenant's live plans, newest first.
pub async fn list_plans<'e, E: PgExecutor<'e>>(
    executor: E,
    tenant_id: Uuid,
    include_archived: bool,
) -> Result<Vec<BreedingPlan>> {
    let plans = sqlx::query_as::<_, BreedingPlan>(
        "SELECT * FROM breeding_plans \
         WHERE tenant_id = $1 AND deleted_at IS NULL AND (archived = FALSE OR $2) \
         ORDER BY created_at DESC",
    )
    .bind(tenant_id)
    .bind(include_archived)
    .fetch_all(executor)
    .await
    .context("failed to list breeding plans")?;

    Ok(plans)
}

/// Write every mutable column of `plan` back to its row.
///
/// Uses optimistic locking on `version`: the row is only updated when its
/// version still equals `plan.version`, and the stored version is bumped.
/// Returns `None` when no row matched (missing plan or a concurrent write).
pub async fn update_plan_state<'e, E: PgExecutor<'e>>(
    executor: E,
    plan: &BreedingPlan,
) -> Result<Option<BreedingPlan>> {
    let updated = sqlx::query_as::<_, BreedingPlan>(
        "UPDATE breeding_plans SET \
             code = $1, name = $2, dam_id = $3, sire_id = $4, recipient_id = $5, \
             embryo_transfer = $6, status = $7, status_before_hold = $8, \
             repro_anchor_mode = $9, date_confidence_level = $10, cycle_start_unknown = $11, \
             cycle_start_observed = $12, ovulation_confirmed = $13, \
             ovulation_confirmation_method = $14, hormone_testing_start_date = $15, \
             breed_date_actual = $16, breed_date_reference = $17, \
             locked_cycle_start = $18, locked_ovulation_date = $19, locked_due_date = $20, \
             locked_placement_start_date = $21, \
             expected_cycle_start = $22, expected_ovulation = $23, expected_due_date = $24, \
             expected_weaned_date = $25, expected_placement_start = $26, \
             expected_placement_completed = $27, \
             birth_date_actual = $28, weaned_date_actual = $29, \
             placement_start_date_actual = $30, placement_completed_date_actual = $31, \
             completed_date_actual = $32, ovulation_offset_variance_days = $33, \
             committed_at = $34, committed_by = $35, archived = $36, \
             version = version + 1, updated_at = now() \
         WHERE id = $37 AND tenant_id = $38 AND version = $39 AND deleted_at IS NULL \
         RETURNING *",
    )
    .bind(&plan.code)
    .bind(&plan.name)
    .bind(plan.dam_id)
    .bind(plan.sire_id)
    .bind(plan.recipient_id)
    .bind(plan.embryo_transfer)
    .bind(plan.status)
    .bind(plan.status_before_hold)
    .bind(plan.repro_anchor_mode)
    .bind(plan.date_confidence_level)
    .bind(plan.cycle_start_unknown)
    .bind(plan.cycle_start_observed)
    .bind(plan.ovulation_confirmed)
    .bind(plan.ovulation_confirmation_method)
    .bind(plan.hormone_testing_start_date)
    .bind(plan.breed_date_actual)
    .bind(plan.breed_date_reference)
    .bind(plan.locked_cycle_start)
    .bind(plan.locked_ovulation_date)
    .bind(plan.locked_due_date)
    .bind(plan.locked_placement_start_date)
    .bind(plan.expected_cycle_start)
    .bind(plan.expected_ovulation)
    .bind(plan.expected_due_date)
    .bind(plan.expected_weaned_date)
    .bind(plan.expected_placement_start)
    .bind(plan.expected_placement_completed)
    .bind(plan.birth_date_actual)
    .bind(plan.weaned_date_actual)
    .bind(plan.placement_start_date_actual)
    .bind(plan.placement_completed_date_actual)
    .bind(plan.completed_date_actual)
    .bind(plan.ovulation_offset_variance_days)
    .bind(plan.committed_at)
    .bind(&plan.committed_by)
    .bind(plan.archived)
    .bind(plan.id)
    .bind(plan.tenant_id)
    .bind(plan.version)
    .fetch_optional(executor)
    .await
    .with_context(|| format!("failed to update breeding plan {}", plan.id))?;

    Ok(updated)
}

/// Mark a live plan deleted. The row and its events stay for audit.
pub async fn soft_delete_plan<'e, E: PgExecutor<'e>>(
    executor: E,
    tenant_id: Uuid,
    id: Uuid,
    at: DateTime<Utc>,
) -> Result<u64> {
    let result = sqlx::query(
        "UPDATE breeding_plans SET deleted_at = $3, version = version + 1, updated_at = now() \
         WHERE id = $1 AND tenant_id = $2 AND deleted_at IS NULL",
    )
    .bind(id)
    .bind(tenant_id)
    .bind(at)
    .execute(executor)
    .await
    .with_context(|| format!("failed to soft-delete breeding plan {id}"))?;

    Ok(result.rows_affected())
}

/// Permanently remove a plan row. Its events cascade.
///
/// Returns the number of rows deleted.
pub async fn delete_plan<'e, E: PgExecutor<'e>>(
    executor: E,
    tenant_id: Uuid,
    id: Uuid,
) -> Result<u64> {
    let result = sqlx::query("DELETE FROM breeding_plans WHERE id = $1 AND tenant_id = $2")
        .bind(id)
        .bind(tenant_id)
        .execute(executor)
        .await
        .with_context(|| format!("failed to delete breeding plan {id}"))?;

    Ok(result.rows_affected())
}
