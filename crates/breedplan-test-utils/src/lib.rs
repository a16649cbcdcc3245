//! Shared test utilities for breedplan integration tests.
//!
//! Provides a PostgreSQL instance shared across tests. Each test gets its
//! own database within the instance, plus fixture helpers for the records
//! a breeding plan depends on.
//!
//! Two modes:
//! - **`BREEDPLAN_TEST_PG_URL`** set: use that server directly.
//! - **No env var**: spin up a container via testcontainers, shared per
//!   test binary through a `OnceCell`.

use std::time::Duration;

use sqlx::postgres::PgPoolOptions;
use sqlx::{Executor, PgPool};
use testcontainers::ContainerAsync;
use testcontainers::ImageExt;
use testcontainers::runners::AsyncRunner;
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;
use uuid::Uuid;

use breedplan_db::models::{Animal, AnimalSex, BreedingPlan, Species};
use breedplan_db::pool;
use breedplan_db::queries::animals::{self, NewAnimal};
use breedplan_db::queries::plans::{self, NewBreedingPlan};

/// Shared container state: base URL and optional container handle (kept alive).
struct SharedPg {
    base_url: String,
    /// Held to keep the container alive. `None` when using an external URL.
    _container: Option<ContainerAsync<Postgres>>,
}

static SHARED_PG: OnceCell<SharedPg> = OnceCell::const_new();

async fn init_shared_pg() -> SharedPg {
    if let Ok(url) = std::env::var("BREEDPLAN_TEST_PG_URL") {
        return SharedPg {
            base_url: url,
            _container: None,
        };
    }

    let container = Postgres::default()
        .with_tag("16")
        .start()
        .await
        .expect("failed to start PostgreSQL container");

    let host = container.get_host().await.expect("failed to get host");
    let port = container
        .get_host_port_ipv4(5432)
        .await
        .expect("failed to get mapped port");

    SharedPg {
        base_url: format!("postgresql://postgres:postgres@{host}:{port}"),
        _container: Some(container),
    }
}

/// Base URL (no database name) of the shared PostgreSQL server.
pub async fn pg_url() -> &'static str {
    let shared = SHARED_PG.get_or_init(init_shared_pg).await;
    &shared.base_url
}

async fn maintenance_pool() -> PgPool {
    let maint_url = format!("{}/postgres", pg_url().await);
    PgPoolOptions::new()
        .max_connections(1)
        .acquire_timeout(Duration::from_secs(30))
        .connect(&maint_url)
        .await
        .expect("failed to connect to maintenance database")
}

/// Create a temporary database with migrations applied.
///
/// Returns `(pool, db_name)`. Call [`drop_test_db`] with `db_name` when the
/// test is done.
pub async fn create_test_db() -> (PgPool, String) {
    let maint_pool = maintenance_pool().await;
    let db_name = format!("breedplan_test_{}", Uuid::new_v4().simple());
    let stmt = format!("CREATE DATABASE {db_name}");
    maint_pool
        .execute(stmt.as_str())
        .await
        .unwrap_or_else(|e| panic!("failed to create temp database {db_name}: {e}"));
    maint_pool.close().await;

    let temp_url = format!("{}/{db_name}", pg_url().await);
    let temp_pool = PgPoolOptions::new()
        .max_connections(5)
        .acquire_timeout(Duration::from_secs(30))
        .connect(&temp_url)
        .await
        .unwrap_or_else(|e| panic!("failed to connect to temp database {db_name}: {e}"));

    pool::run_migrations(&temp_pool)
        .await
        .expect("migrations should succeed");

    (temp_pool, db_name)
}

/// Drop a temporary database, terminating any connections still open.
pub async fn drop_test_db(db_name: &str) {
    let maint_pool = maintenance_pool().await;

    let terminate = format!(
        "SELECT pg_terminate_backend(pid) \
         FROM pg_stat_activity \
         WHERE datname = '{db_name}' AND pid <> pg_backend_pid()"
    );
    let _ = maint_pool.execute(terminate.as_str()).await;

    let stmt = format!("DROP DATABASE IF EXISTS {db_name}");
    let _ = maint_pool.execute(stmt.as_str()).await;
    maint_pool.close().await;
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

pub async fn insert_animal(
    pool: &PgPool,
    tenant_id: Uuid,
    name: &str,
    species: Species,
    sex: AnimalSex,
) -> Animal {
    animals::insert_animal(
        pool,
        &NewAnimal {
            tenant_id,
            name: name.to_owned(),
            species,
            sex,
        },
    )
    .await
    .expect("failed to insert test animal")
}

/// Insert a dam and a sire of `species`, then a `PLANNING` plan that pairs
/// them. No expected dates are set.
pub async fn insert_paired_plan(pool: &PgPool, tenant_id: Uuid, species: Species) -> BreedingPlan {
    let dam = insert_animal(pool, tenant_id, "test-dam", species, AnimalSex::Female).await;
    let sire = insert_animal(pool, tenant_id, "test-sire", species, AnimalSex::Male).await;

    plans::insert_plan(
        pool,
        &NewBreedingPlan {
            tenant_id,
            name: format!("{species} test plan"),
            species,
            dam_id: Some(dam.id),
            sire_id: Some(sire.id),
            recipient_id: None,
            embryo_transfer: false,
            date_confidence_level: None,
            expected_cycle_start: None,
            expected_ovulation: None,
            expected_due_date: None,
            expected_weaned_date: None,
            expected_placement_start: None,
            expected_placement_completed: None,
        },
    )
    .await
    .expect("failed to insert test plan")
}
