//! Integration tests for the tenant-scoped query functions.
//!
//! Each test creates a unique temporary database on the shared test server,
//! runs migrations, and drops it on completion so tests are fully isolated.

use chrono::{NaiveDate, Utc};
use serde_json::json;
use uuid::Uuid;

use breedplan_db::models::{AnimalSex, PlanStatus, Species};
use breedplan_db::queries::plan_events::{self, NewPlanEvent};
use breedplan_db::queries::{animals, offspring, plans, usage};
use breedplan_test_utils::{create_test_db, drop_test_db, insert_animal, insert_paired_plan};

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn event(tenant_id: Uuid, plan_id: Uuid, event_type: &str) -> NewPlanEvent {
    NewPlanEvent {
        tenant_id,
        plan_id,
        event_type: event_type.to_owned(),
        occurred_at: Utc::now(),
        label: format!("{event_type} label"),
        data: json!({}),
        recorded_by: "tester".to_owned(),
    }
}

// ---------------------------------------------------------------------------
// Plans
// ---------------------------------------------------------------------------

#[tokio::test]
async fn insert_plan_uses_column_defaults() {
    let (pool, db_name) = create_test_db().await;
    let tenant = Uuid::new_v4();

    let plan = insert_paired_plan(&pool, tenant, Species::Dog).await;
    assert_eq!(plan.status, PlanStatus::Planning);
    assert_eq!(plan.version, 0);
    assert!(plan.code.is_none());
    assert!(!plan.is_locked());
    assert!(!plan.archived);
    assert_eq!(plan.parent_ids().len(), 2);

    let fetched = plans::get_plan(&pool, tenant, plan.id)
        .await
        .unwrap()
        .expect("plan should exist");
    assert_eq!(fetched, plan);

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn plans_are_invisible_to_other_tenants() {
    let (pool, db_name) = create_test_db().await;
    let tenant = Uuid::new_v4();
    let other = Uuid::new_v4();

    let plan = insert_paired_plan(&pool, tenant, Species::Cat).await;

    assert!(plans::get_plan(&pool, other, plan.id).await.unwrap().is_none());
    assert!(plans::list_plans(&pool, other, true).await.unwrap().is_empty());
    assert_eq!(plans::delete_plan(&pool, other, plan.id).await.unwrap(), 0);

    let mut foreign = plan.clone();
    foreign.tenant_id = other;
    foreign.name = "hijacked".to_owned();
    assert!(plans::update_plan_state(&pool, &foreign).await.unwrap().is_none());

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn list_plans_filters_archived() {
    let (pool, db_name) = create_test_db().await;
    let tenant = Uuid::new_v4();

    let kept = insert_paired_plan(&pool, tenant, Species::Dog).await;
    let mut shelved = insert_paired_plan(&pool, tenant, Species::Horse).await;
    shelved.archived = true;
    plans::update_plan_state(&pool, &shelved)
        .await
        .unwrap()
        .expect("update should apply");

    let active = plans::list_plans(&pool, tenant, false).await.unwrap();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].id, kept.id);

    let all = plans::list_plans(&pool, tenant, true).await.unwrap();
    assert_eq!(all.len(), 2);

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn update_plan_state_bumps_version() {
    let (pool, db_name) = create_test_db().await;
    let tenant = Uuid::new_v4();

    let mut plan = insert_paired_plan(&pool, tenant, Species::Dog).await;
    plan.status = PlanStatus::Cycle;
    plan.locked_cycle_start = Some(date(2024, 1, 1));
    plan.locked_ovulation_date = Some(date(2024, 1, 13));
    plan.locked_due_date = Some(date(2024, 3, 16));
    plan.locked_placement_start_date = Some(date(2024, 5, 11));

    let updated = plans::update_plan_state(&pool, &plan)
        .await
        .unwrap()
        .expect("update should apply");
    assert_eq!(updated.version, plan.version + 1);
    assert_eq!(updated.status, PlanStatus::Cycle);
    assert!(updated.is_locked());
    assert!(updated.updated_at >= plan.updated_at);

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn update_plan_state_rejects_stale_version() {
    let (pool, db_name) = create_test_db().await;
    let tenant = Uuid::new_v4();

    let plan = insert_paired_plan(&pool, tenant, Species::Dog).await;

    let mut first = plan.clone();
    first.name = "first writer".to_owned();
    assert!(plans::update_plan_state(&pool, &first).await.unwrap().is_some());

    // Still carries version 0.
    let mut second = plan.clone();
    second.name = "second writer".to_owned();
    assert!(plans::update_plan_state(&pool, &second).await.unwrap().is_none());

    let stored = plans::get_plan(&pool, tenant, plan.id).await.unwrap().unwrap();
    assert_eq!(stored.name, "first writer");
    assert_eq!(stored.version, 1);

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn code_is_unique_per_tenant() {
    let (pool, db_name) = create_test_db().await;
    let tenant = Uuid::new_v4();
    let other = Uuid::new_v4();

    let mut a = insert_paired_plan(&pool, tenant, Species::Dog).await;
    let mut b = insert_paired_plan(&pool, tenant, Species::Dog).await;
    let mut c = insert_paired_plan(&pool, other, Species::Dog).await;

    a.code = Some("DOG-2024-0001".to_owned());
    plans::update_plan_state(&pool, &a).await.unwrap().unwrap();

    b.code = Some("DOG-2024-0001".to_owned());
    let err = plans::update_plan_state(&pool, &b)
        .await
        .expect_err("duplicate code in one tenant must fail");
    let sqlx_err = err.downcast_ref::<sqlx::Error>().expect("sqlx error");
    let code = sqlx_err
        .as_database_error()
        .and_then(|e| e.code())
        .map(|c| c.into_owned());
    assert_eq!(code.as_deref(), Some("23505"));

    c.code = Some("DOG-2024-0001".to_owned());
    assert!(plans::update_plan_state(&pool, &c).await.unwrap().is_some());

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn get_plan_for_update_returns_live_plan() {
    let (pool, db_name) = create_test_db().await;
    let tenant = Uuid::new_v4();
    let plan = insert_paired_plan(&pool, tenant, Species::Goat).await;

    let mut tx = pool.begin().await.unwrap();
    let locked = plans::get_plan_for_update(&mut *tx, tenant, plan.id)
        .await
        .unwrap()
        .expect("plan should exist");
    assert_eq!(locked.id, plan.id);
    assert!(
        plans::get_plan_for_update(&mut *tx, tenant, Uuid::new_v4())
            .await
            .unwrap()
            .is_none()
    );
    tx.commit().await.unwrap();

    pool.close().await;
    drop_test_db(&db_name).await;
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

#[tokio::test]
async fn events_list_in_insertion_order() {
    let (pool, db_name) = create_test_db().await;
    let tenant = Uuid::new_v4();
    let plan = insert_paired_plan(&pool, tenant, Species::Dog).await;

    let mut tx = pool.begin().await.unwrap();
    for kind in ["anchor_locked", "cycle_started", "committed"] {
        plan_events::insert_plan_event(&mut *tx, &event(tenant, plan.id, kind))
            .await
            .unwrap();
    }
    tx.commit().await.unwrap();

    let events = plan_events::list_events_for_plan(&pool, tenant, plan.id)
        .await
        .unwrap();
    let kinds: Vec<&str> = events.iter().map(|e| e.event_type.as_str()).collect();
    assert_eq!(kinds, ["anchor_locked", "cycle_started", "committed"]);
    assert!(events.windows(2).all(|w| w[0].seq < w[1].seq));

    assert_eq!(
        plan_events::count_events_of_type(&pool, tenant, plan.id, "committed")
            .await
            .unwrap(),
        1
    );
    assert!(
        plan_events::list_events_for_plan(&pool, Uuid::new_v4(), plan.id)
            .await
            .unwrap()
            .is_empty()
    );

    pool.close().await;
    drop_test_db(&db_name).await;
}

// ---------------------------------------------------------------------------
// Offspring and waitlist
// ---------------------------------------------------------------------------

#[tokio::test]
async fn offspring_counts_track_deceased() {
    let (pool, db_name) = create_test_db().await;
    let tenant = Uuid::new_v4();
    let plan = insert_paired_plan(&pool, tenant, Species::Dog).await;

    assert_eq!(
        offspring::count_offspring(&pool, tenant, plan.id).await.unwrap(),
        (0, 0)
    );

    let pup = offspring::insert_offspring(&pool, tenant, plan.id, "pup-1")
        .await
        .unwrap();
    offspring::insert_offspring(&pool, tenant, plan.id, "pup-2")
        .await
        .unwrap();

    let marked = offspring::mark_offspring_deceased(&pool, tenant, pup.id, Utc::now())
        .await
        .unwrap();
    assert_eq!(marked, 1);
    let again = offspring::mark_offspring_deceased(&pool, tenant, pup.id, Utc::now())
        .await
        .unwrap();
    assert_eq!(again, 0);

    assert_eq!(
        offspring::count_offspring(&pool, tenant, plan.id).await.unwrap(),
        (2, 1)
    );
    assert_eq!(
        offspring::list_offspring_for_plan(&pool, tenant, plan.id)
            .await
            .unwrap()
            .len(),
        2
    );

    offspring::insert_waitlist_entry(&pool, tenant, plan.id, "J. Buyer")
        .await
        .unwrap();
    assert_eq!(
        offspring::count_waitlist_entries(&pool, tenant, plan.id)
            .await
            .unwrap(),
        1
    );

    pool.close().await;
    drop_test_db(&db_name).await;
}

// ---------------------------------------------------------------------------
// Animals
// ---------------------------------------------------------------------------

#[tokio::test]
async fn sync_breeding_flag_follows_plan_status() {
    let (pool, db_name) = create_test_db().await;
    let tenant = Uuid::new_v4();
    let active = ["CYCLE", "BRED"];

    let mut plan = insert_paired_plan(&pool, tenant, Species::Dog).await;
    let dam_id = plan.dam_id.unwrap();

    let flag = animals::sync_breeding_flag(&pool, tenant, dam_id, &active)
        .await
        .unwrap();
    assert_eq!(flag, Some(false));

    plan.status = PlanStatus::Bred;
    let plan = plans::update_plan_state(&pool, &plan).await.unwrap().unwrap();
    let flag = animals::sync_breeding_flag(&pool, tenant, dam_id, &active)
        .await
        .unwrap();
    assert_eq!(flag, Some(true));

    let mut plan = plan;
    plan.archived = true;
    plans::update_plan_state(&pool, &plan).await.unwrap().unwrap();
    let flag = animals::sync_breeding_flag(&pool, tenant, dam_id, &active)
        .await
        .unwrap();
    assert_eq!(flag, Some(false));

    let missing = animals::sync_breeding_flag(&pool, tenant, Uuid::new_v4(), &active)
        .await
        .unwrap();
    assert_eq!(missing, None);

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn animals_are_tenant_scoped() {
    let (pool, db_name) = create_test_db().await;
    let tenant = Uuid::new_v4();

    let mare = insert_animal(&pool, tenant, "Bella", Species::Horse, AnimalSex::Female).await;
    insert_animal(&pool, tenant, "Atlas", Species::Horse, AnimalSex::Male).await;

    let names: Vec<String> = animals::list_animals(&pool, tenant)
        .await
        .unwrap()
        .into_iter()
        .map(|a| a.name)
        .collect();
    assert_eq!(names, ["Atlas", "Bella"]);

    assert!(
        animals::get_animal(&pool, Uuid::new_v4(), mare.id)
            .await
            .unwrap()
            .is_none()
    );

    pool.close().await;
    drop_test_db(&db_name).await;
}

// ---------------------------------------------------------------------------
// Usage
// ---------------------------------------------------------------------------

#[tokio::test]
async fn usage_counter_never_goes_negative() {
    let (pool, db_name) = create_test_db().await;
    let tenant = Uuid::new_v4();

    assert_eq!(usage::get_usage(&pool, tenant, usage::ACTIVE_PLANS).await.unwrap(), 0);
    assert_eq!(
        usage::adjust_usage(&pool, tenant, usage::ACTIVE_PLANS, 1).await.unwrap(),
        1
    );
    assert_eq!(
        usage::adjust_usage(&pool, tenant, usage::ACTIVE_PLANS, 1).await.unwrap(),
        2
    );
    assert_eq!(
        usage::adjust_usage(&pool, tenant, usage::ACTIVE_PLANS, -5).await.unwrap(),
        0
    );
    assert_eq!(usage::get_usage(&pool, tenant, usage::ACTIVE_PLANS).await.unwrap(), 0);

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn code_sequence_is_per_tenant_and_survives_purge() {
    let (pool, db_name) = create_test_db().await;
    let tenant = Uuid::new_v4();
    let other = Uuid::new_v4();

    let mut a = insert_paired_plan(&pool, tenant, Species::Dog).await;
    let seq = usage::next_code_sequence(&pool, tenant).await.unwrap();
    assert_eq!(seq, 1);
    a.code = Some(format!("DOG-2024-{seq:04}"));
    plans::update_plan_state(&pool, &a).await.unwrap().unwrap();

    assert_eq!(plans::delete_plan(&pool, tenant, a.id).await.unwrap(), 1);
    assert_eq!(usage::next_code_sequence(&pool, tenant).await.unwrap(), 2);
    assert_eq!(usage::next_code_sequence(&pool, other).await.unwrap(), 1);

    let mut tx = pool.begin().await.unwrap();
    assert_eq!(usage::next_code_sequence(&mut *tx, tenant).await.unwrap(), 3);
    tx.rollback().await.unwrap();
    assert_eq!(usage::next_code_sequence(&pool, tenant).await.unwrap(), 3);

    pool.close().await;
    drop_test_db(&db_name).await;
}
