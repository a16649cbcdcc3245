//! Per-tenant usage counters (`tenant_usage`), used for plan quotas.

use anyhow::{Context, Result};
use sqlx::PgExecutor;
use uuid::Uuid;

/// Metric name for the number of active (not archived, not deleted) plans.
pub const ACTIVE_PLANS: &str = "active_breeding_plans";

/// Counter behind friendly plan codes. It is only ever incremented, so a
/// purged plan never frees its sequence number.
pub const CODE_SEQUENCE: &str = "plan_code_sequence";

/// Add `delta` to a tenant's counter, creating it at zero first if needed.
/// The counter never goes below zero. Returns the new value.
pub async fn adjust_usage<'e, E: PgExecutor<'e>>(
    executor: E,
    tenant_id: Uuid,
    metric: &str,
    delta: i64,
) -> Result<i64> {
    let row: (i64,) = sqlx::query_as(
        "INSERT INTO tenant_usage (tenant_id, metric, count) \
         VALUES ($1, $2, GREATEST($3, 0)) \
         ON CONFLICT (tenant_id, metric) \
         DO UPDATE SET count = GREATEST(tenant_usage.count + $3, 0) \
         RETURNING count",
    )
    .bind(tenant_id)
    .bind(metric)
    .bind(delta)
    .fetch_one(executor)
    .await
    .with_context(|| format!("failed to adjust usage {metric} for tenant {tenant_id}"))?;

    Ok(row.0)
}

/// Reserve the tenant's next friendly-code sequence number, starting at 1.
///
/// The upsert holds the counter row lock until the surrounding transaction
/// ends, which serializes concurrent commits in one tenant. A rolled-back
/// transaction returns its number.
pub async fn next_code_sequence<'e, E: PgExecutor<'e>>(
    executor: E,
    tenant_id: Uuid,
) -> Result<i64> {
    adjust_usage(executor, tenant_id, CODE_SEQUENCE, 1).await
}

/// Current value of a counter; zero when it was never touched.
pub async fn get_usage<'e, E: PgExecutor<'e>>(
    executor: E,
    tenant_id: Uuid,
    metric: &str,
) -> Result<i64> {
    let row: Option<(i64,)> =
        sqlx::query_as("SELECT count FROM tenant_usage WHERE tenant_id = $1 AND metric = $2")
            .bind(tenant_id)
            .bind(metric)
            .fetch_optional(executor)
            .await
            .with_context(|| format!("failed to read usage {metric} for tenant {tenant_id}"))?;

    Ok(row.map(|(c,)| c).unwrap_or(0))
}
