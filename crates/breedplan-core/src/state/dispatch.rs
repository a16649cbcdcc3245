//! Convenience dispatch helpers that wrap [`PlanLifecycle::change_status`]
//! with semantic names.

use uuid::Uuid;

use breedplan_db::models::BreedingPlan;

use crate::error::LifecycleError;
use crate::lifecycle::{PlanLifecycle, RequestContext, StatusChange};

/// Pause a plan: `* -> ON_HOLD`, remembering the status it was in.
pub async fn hold(
    lifecycle: &PlanLifecycle,
    ctx: &RequestContext,
    plan_id: Uuid,
) -> Result<BreedingPlan, LifecycleError> {
    lifecycle
        .change_status(ctx, plan_id, StatusChange::Hold)
        .await
}

/// Resume a held plan to the status it was in before the hold.
pub async fn resume(
    lifecycle: &PlanLifecycle,
    ctx: &RequestContext,
    plan_id: Uuid,
) -> Result<BreedingPlan, LifecycleError> {
    lifecycle
        .change_status(ctx, plan_id, StatusChange::Resume)
        .await
}

/// Cancel a plan. Terminal.
pub async fn cancel(
    lifecycle: &PlanLifecycle,
    ctx: &RequestContext,
    plan_id: Uuid,
) -> Result<BreedingPlan, LifecycleError> {
    lifecycle
        .change_status(ctx, plan_id, StatusChange::Cancel)
        .await
}

/// Record a failed breeding attempt. Terminal.
pub async fn mark_unsuccessful(
    lifecycle: &PlanLifecycle,
    ctx: &RequestContext,
    plan_id: Uuid,
) -> Result<BreedingPlan, LifecycleError> {
    lifecycle
        .change_status(ctx, plan_id, StatusChange::MarkUnsuccessful)
        .await
}
