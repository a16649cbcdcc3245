//! Database query functions for the dependent records of a plan: the
//! `offspring` and `waitlist_entries` tables.
//!
//! The lifecycle engine only needs counts from these; inserts exist so the
//! CLI and tests can create the records that block regressions.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::PgExecutor;
use uuid::Uuid;

use crate::models::{Offspring, WaitlistEntry};

pub async fn insert_offspring<'e, E: PgExecutor<'e>>(
    executor: E,
    tenant_id: Uuid,
    plan_id: Uuid,
    name: &str,
) -> Result<Offspring> {
    let offspring = sqlx::query_as::<_, Offspring>(
        "INSERT INTO offspring (tenant_id, plan_id, name) \
         VALUES ($1, $2, $3) \
         RETURNING *",
    )
    .bind(tenant_id)
    .bind(plan_id)
    .bind(name)
    .fetch_one(executor)
    .await
    .with_context(|| format!("failed to insert offspring {name:?} for plan {plan_id}"))?;

    Ok(offspring)
}

/// Record an offspring's death. Returns the number of rows updated.
pub async fn mark_offspring_deceased<'e, E: PgExecutor<'e>>(
    executor: E,
    tenant_id: Uuid,
    offspring_id: Uuid,
    deceased_at: DateTime<Utc>,
) -> Result<u64> {
    let result = sqlx::query(
        "UPDATE offspring SET deceased_at = $1 \
         WHERE id = $2 AND tenant_id = $3 AND deceased_at IS NULL",
    )
    .bind(deceased_at)
    .bind(offspring_id)
    .bind(tenant_id)
    .execute(executor)
    .await
    .with_context(|| format!("failed to mark offspring {offspring_id} deceased"))?;

    Ok(result.rows_affected())
}

pub async fn list_offspring_for_plan<'e, E: PgExecutor<'e>>(
    executor: E,
    tenant_id: Uuid,
    plan_id: Uuid,
) -> Result<Vec<Offspring>> {
    let rows = sqlx::query_as::<_, Offspring>(
        "SELECT * FROM offspring WHERE plan_id = $1 AND tenant_id = $2 ORDER BY created_at",
    )
    .bind(plan_id)
    .bind(tenant_id)
    .fetch_all(executor)
    .await
    .with_context(|| format!("failed to list offspring for plan {plan_id}"))?;

    Ok(rows)
}

/// Offspring counts for a plan: `(total, alive)`.
pub async fn count_offspring<'e, E: PgExecutor<'e>>(
    executor: E,
    tenant_id: Uuid,
    plan_id: Uuid,
) -> Result<(i64, i64)> {
    let row: (i64, i64) = sqlx::query_as(
        "SELECT COUNT(*), COUNT(*) FILTER (WHERE deceased_at IS NULL) \
         FROM offspring WHERE plan_id = $1 AND tenant_id = $2",
    )
    .bind(plan_id)
    .bind(tenant_id)
    .fetch_one(executor)
    .await
    .with_context(|| format!("failed to count offspring for plan {plan_id}"))?;

    Ok(row)
}

pub async fn insert_waitlist_entry<'e, E: PgExecutor<'e>>(
    executor: E,
    tenant_id: Uuid,
    plan_id: Uuid,
    buyer_name: &str,
) -> Result<WaitlistEntry> {
    let entry = sqlx::query_as::<_, WaitlistEntry>(
        "INSERT INTO waitlist_entries (tenant_id, plan_id, buyer_name) \
         VALUES ($1, $2, $3) \
         RETURNING *",
    )
    .bind(tenant_id)
    .bind(plan_id)
    .bind(buyer_name)
    .fetch_one(executor)
    .await
    .with_context(|| format!("failed to add waitlist entry for plan {plan_id}"))?;

    Ok(entry)
}

pub async fn count_waitlist_entries<'e, E: PgExecutor<'e>>(
    executor: E,
    tenant_id: Uuid,
    plan_id: Uuid,
) -> Result<i64> {
    let row: (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM waitlist_entries WHERE plan_id = $1 AND tenant_id = $2",
    )
    .bind(plan_id)
    .bind(tenant_id)
    .fetch_one(executor)
    .await
    .with_context(|| format!("failed to count waitlist entries for plan {plan_id}"))?;

    Ok(row.0)
}
