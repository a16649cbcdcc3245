//! Database query functions for the append-only `breeding_plan_events` table.
//!
//! Rows are never updated or deleted through this module; they disappear
//! only when their plan is hard-deleted.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::PgExecutor;
use uuid::Uuid;

use crate::models::BreedingPlanEvent;

/// Parameters for inserting a new plan event row.
#[derive(Debug, Clone)]
pub struct NewPlanEvent {
    pub tenant_id: Uuid,
    pub plan_id: Uuid,
    pub event_type: String,
    pub occurred_at: DateTime<Utc>,
    pub label: String,
    pub data: Value,
    pub recorded_by: String,
}

/// Insert a plan event. Returns the stored row with its server-assigned
/// id and sequence number.
pub async fn insert_plan_event<'e, E: PgExecutor<'e>>(
    executor: E,
    new: &NewPlanEvent,
) -> Result<BreedingPlanEvent> {
    let event = sqlx::query_as::<_, BreedingPlanEvent>(
        "INSERT INTO breeding_plan_events \
         (tenant_id, plan_id, event_type, occurred_at, label, data, recorded_by) \
         VALUES ($1, $2, $3, $4, $5, $6, $7) \
         RETURNING *",
    )
    .bind(new.tenant_id)
    .bind(new.plan_id)
    .bind(&new.event_type)
    .bind(new.occurred_at)
    .bind(&new.label)
    .bind(&new.data)
    .bind(&new.recorded_by)
    .fetch_one(executor)
    .await
    .with_context(|| {
        format!(
            "failed to insert {} event for breeding plan {}",
            new.event_type, new.plan_id
        )
    })?;

    Ok(event)
}

/// All events for a plan in the order they were written.
pub async fn list_events_for_plan<'e, E: PgExecutor<'e>>(
    executor: E,
    tenant_id: Uuid,
    plan_id: Uuid,
) -> Result<Vec<BreedingPlanEvent>> {
    let events = sqlx::query_as::<_, BreedingPlanEvent>(
        "SELECT * FROM breeding_plan_events \
         WHERE plan_id = $1 AND tenant_id = $2 \
         ORDER BY seq ASC",
    )
    .bind(plan_id)
    .bind(tenant_id)
    .fetch_all(executor)
    .await
    .with_context(|| format!("failed to list events for breeding plan {plan_id}"))?;

    Ok(events)
}

/// Count events of one type for a plan.
pub async fn count_events_of_type<'e, E: PgExecutor<'e>>(
    executor: E,
    tenant_id: Uuid,
    plan_id: Uuid,
    event_type: &str,
) -> Result<i64> {
    let row: (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM breeding_plan_events \
         WHERE plan_id = $1 AND tenant_id = $2 AND event_type = $3",
    )
    .bind(plan_id)
    .bind(tenant_id)
    .bind(event_type)
    .fetch_one(executor)
    .await
    .with_context(|| format!("failed to count {event_type} events for plan {plan_id}"))?;

    Ok(row.0)
}
