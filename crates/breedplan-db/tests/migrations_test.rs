//! Integration tests for the embedded migrations and the schema-level
//! guarantees they install.

use chrono::NaiveDate;
use sqlx::Row;
use uuid::Uuid;

use breedplan_db::config::DbConfig;
use breedplan_db::models::Species;
use breedplan_db::pool;
use breedplan_test_utils::{create_test_db, drop_test_db, insert_paired_plan, pg_url};

/// Tables created by the initial migration, sorted by name.
const EXPECTED_TABLES: &[&str] = &[
    "animals",
    "breeding_plan_events",
    "breeding_plans",
    "offspring",
    "tenant_usage",
    "waitlist_entries",
];

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

#[tokio::test]
async fn migrations_create_all_tables() {
    let (pool, db_name) = create_test_db().await;

    let rows: Vec<(String,)> = sqlx::query_as(
        "SELECT tablename::text FROM pg_tables \
         WHERE schemaname = 'public' AND tablename NOT LIKE '\\_sqlx%' \
         ORDER BY tablename",
    )
    .fetch_all(&pool)
    .await
    .expect("should list tables");

    let table_names: Vec<&str> = rows.iter().map(|(name,)| name.as_str()).collect();
    assert_eq!(table_names, EXPECTED_TABLES);

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn migrations_are_idempotent() {
    let (pool, db_name) = create_test_db().await;

    pool::run_migrations(&pool)
        .await
        .expect("second migration run should be a no-op");

    let counts = pool::table_counts(&pool).await.expect("table_counts");
    assert_eq!(counts.len(), EXPECTED_TABLES.len());
    for (name, count) in &counts {
        assert_eq!(*count, 0, "table {name} should be empty");
    }

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn schema_rejects_partial_locked_group() {
    let (pool, db_name) = create_test_db().await;
    let tenant = Uuid::new_v4();
    let plan = insert_paired_plan(&pool, tenant, Species::Dog).await;

    let result = sqlx::query(
        "UPDATE breeding_plans \
         SET locked_cycle_start = $1, locked_ovulation_date = $2, locked_due_date = $3 \
         WHERE id = $4",
    )
    .bind(date(2024, 1, 1))
    .bind(date(2024, 1, 13))
    .bind(date(2024, 3, 16))
    .bind(plan.id)
    .execute(&pool)
    .await;

    let err = result.expect_err("three of four locked dates must violate the check");
    let code = err
        .as_database_error()
        .and_then(|e| e.code())
        .map(|c| c.into_owned());
    assert_eq!(code.as_deref(), Some("23514"));

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn events_cascade_with_plan_delete() {
    let (pool, db_name) = create_test_db().await;
    let tenant = Uuid::new_v4();
    let plan = insert_paired_plan(&pool, tenant, Species::Cat).await;

    sqlx::query(
        "INSERT INTO breeding_plan_events (tenant_id, plan_id, event_type, occurred_at, label, recorded_by) \
         VALUES ($1, $2, 'created', now(), 'Plan created', 'tester')",
    )
    .bind(tenant)
    .bind(plan.id)
    .execute(&pool)
    .await
    .unwrap();

    sqlx::query("DELETE FROM breeding_plans WHERE id = $1")
        .bind(plan.id)
        .execute(&pool)
        .await
        .unwrap();

    let row = sqlx::query("SELECT COUNT(*) AS cnt FROM breeding_plan_events")
        .fetch_one(&pool)
        .await
        .unwrap();
    let remaining: i64 = row.get("cnt");
    assert_eq!(remaining, 0);

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn ensure_database_exists_is_idempotent() {
    let db_name = format!("breedplan_test_{}", Uuid::new_v4().simple());
    let config = DbConfig::new(format!("{}/{db_name}", pg_url().await));

    pool::ensure_database_exists(&config)
        .await
        .expect("first ensure should create the database");
    pool::ensure_database_exists(&config)
        .await
        .expect("second ensure should be a no-op");

    drop_test_db(&db_name).await;
}
