//! Plan lifecycle engine: the transactional entry points for every
//! operation that moves a breeding plan through its phases.
//!
//! Each operation follows the same sequence:
//! 1. Begin a transaction and lock the plan row (`FOR UPDATE`)
//! 2. Read the dependent-record counts inside the same transaction
//! 3. Compute the mutation with the pure functions in [`transitions`]
//! 4. Write the plan (version-checked), its events and the parent flags
//! 5. Commit, then publish to the activity feed
//!
//! A rejected operation writes nothing: the transaction is dropped and
//! rolls back.

pub mod events;
pub mod transitions;

use std::sync::Arc;

use anyhow::Context;
use chrono::{Datelike, NaiveDate};
use serde_json::Value;
use sqlx::{PgConnection, PgPool, Postgres, Transaction};
use uuid::Uuid;

use breedplan_db::models::{AnimalSex, BreedingPlan, OvulationMethod, Species};
use breedplan_db::queries::{animals, offspring, plans, usage};

use crate::clock::{Clock, SystemClock};
use crate::error::LifecycleError;
use crate::feed::{ActivityEntry, ActivityFeed, TracingActivityFeed};
use crate::plan::patch::PlanPatch;
use crate::species;
use crate::state::DependentCounts;

use self::events::{EventKind, Mutation};
pub use self::transitions::{LockRequest, StatusChange};

/// Who is acting, and on behalf of which tenant. Every read and write is
/// scoped to `tenant_id`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    pub tenant_id: Uuid,
    pub actor: String,
}

impl RequestContext {
    pub fn new(tenant_id: Uuid, actor: impl Into<String>) -> Self {
        Self {
            tenant_id,
            actor: actor.into(),
        }
    }
}

/// The role an animal plays on a plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParentRole {
    Dam,
    Sire,
    Recipient,
}

impl ParentRole {
    fn field(self) -> &'static str {
        match self {
            Self::Dam => "dam_id",
            Self::Sire => "sire_id",
            Self::Recipient => "recipient_id",
        }
    }

    fn sex(self) -> AnimalSex {
        match self {
            Self::Sire => AnimalSex::Male,
            Self::Dam | Self::Recipient => AnimalSex::Female,
        }
    }
}

/// Entry point for lifecycle operations.
#[derive(Clone)]
pub struct PlanLifecycle {
    pool: PgPool,
    clock: Arc<dyn Clock>,
    feed: Arc<dyn ActivityFeed>,
}

impl PlanLifecycle {
    /// A lifecycle on the system clock that publishes activity to `tracing`.
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            clock: Arc::new(SystemClock),
            feed: Arc::new(TracingActivityFeed),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_feed(mut self, feed: Arc<dyn ActivityFeed>) -> Self {
        self.feed = feed;
        self
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    /// Lock the cycle on an anchor date: `PLANNING -> CYCLE`.
    pub async fn lock(
        &self,
        ctx: &RequestContext,
        plan_id: Uuid,
        request: &LockRequest,
    ) -> Result<BreedingPlan, LifecycleError> {
        let (tx, plan, _) = self.begin(ctx, plan_id).await?;
        let mutation = transitions::lock(&plan, request, species::profile(plan.species))?;
        self.finish(tx, ctx, plan, mutation).await
    }

    /// Refine a cycle-start lock with a confirmed ovulation date.
    pub async fn upgrade_to_ovulation(
        &self,
        ctx: &RequestContext,
        plan_id: Uuid,
        ovulation: NaiveDate,
        method: OvulationMethod,
    ) -> Result<BreedingPlan, LifecycleError> {
        let (tx, plan, _) = self.begin(ctx, plan_id).await?;
        let mutation = transitions::upgrade_to_ovulation(
            &plan,
            ovulation,
            method,
            species::profile(plan.species),
        )?;
        self.finish(tx, ctx, plan, mutation).await
    }

    pub async fn clear_ovulation(
        &self,
        ctx: &RequestContext,
        plan_id: Uuid,
    ) -> Result<BreedingPlan, LifecycleError> {
        let (tx, plan, _) = self.begin(ctx, plan_id).await?;
        let mutation = transitions::clear_ovulation(&plan)?;
        self.finish(tx, ctx, plan, mutation).await
    }

    /// Commit a locked plan, assigning its friendly code on first commit.
    pub async fn commit(
        &self,
        ctx: &RequestContext,
        plan_id: Uuid,
    ) -> Result<BreedingPlan, LifecycleError> {
        let (mut tx, plan, _) = self.begin(ctx, plan_id).await?;
        let code = match plan.code {
            Some(_) => None,
            None => {
                let sequence = usage::next_code_sequence(&mut *tx, ctx.tenant_id).await?;
                let year = self.clock.today().year();
                Some(transitions::friendly_code(&plan, year, sequence))
            }
        };
        let mutation = transitions::commit(&plan, code, &ctx.actor, self.clock.now())?;
        self.finish(tx, ctx, plan, mutation).await
    }

    pub async fn uncommit(
        &self,
        ctx: &RequestContext,
        plan_id: Uuid,
    ) -> Result<BreedingPlan, LifecycleError> {
        let (tx, plan, counts) = self.begin(ctx, plan_id).await?;
        let mutation = transitions::uncommit(&plan, &counts)?;
        self.finish(tx, ctx, plan, mutation).await
    }

    /// Step back exactly one phase.
    pub async fn rewind(
        &self,
        ctx: &RequestContext,
        plan_id: Uuid,
    ) -> Result<BreedingPlan, LifecycleError> {
        let (tx, plan, counts) = self.begin(ctx, plan_id).await?;
        let mutation = transitions::rewind(&plan, &counts)?;
        self.finish(tx, ctx, plan, mutation).await
    }

    /// Move a post-birth plan to its next care milestone. `milestone` is the
    /// actual date of the milestone being reached, where it has one.
    pub async fn advance(
        &self,
        ctx: &RequestContext,
        plan_id: Uuid,
        milestone: Option<NaiveDate>,
    ) -> Result<BreedingPlan, LifecycleError> {
        let (tx, plan, _) = self.begin(ctx, plan_id).await?;
        let mutation = transitions::advance(
            &plan,
            milestone,
            self.clock.today(),
            species::profile(plan.species),
        )?;
        self.finish(tx, ctx, plan, mutation).await
    }

    pub async fn dissolve(
        &self,
        ctx: &RequestContext,
        plan_id: Uuid,
    ) -> Result<BreedingPlan, LifecycleError> {
        let (tx, plan, counts) = self.begin(ctx, plan_id).await?;
        let mutation = transitions::dissolve(&plan, &counts)?;
        self.finish(tx, ctx, plan, mutation).await
    }

    /// Apply a partial update. A patch that changes nothing returns the
    /// stored plan and writes nothing.
    pub async fn update_plan(
        &self,
        ctx: &RequestContext,
        plan_id: Uuid,
        patch: &PlanPatch,
    ) -> Result<BreedingPlan, LifecycleError> {
        let (mut tx, plan, counts) = self.begin(ctx, plan_id).await?;

        let patched_parents = [
            (ParentRole::Dam, patch.dam_id),
            (ParentRole::Sire, patch.sire_id),
            (ParentRole::Recipient, patch.recipient_id),
        ];
        for (role, value) in patched_parents {
            if let Some(Some(animal_id)) = value {
                verify_parent(&mut tx, ctx.tenant_id, plan.species, role, animal_id).await?;
            }
        }

        let mutation = transitions::update(
            &plan,
            patch,
            &counts,
            species::profile(plan.species),
            self.clock.today(),
        )?;
        self.finish(tx, ctx, plan, mutation).await
    }

    /// Hold, resume, cancel or mark a plan unsuccessful.
    pub async fn change_status(
        &self,
        ctx: &RequestContext,
        plan_id: Uuid,
        change: StatusChange,
    ) -> Result<BreedingPlan, LifecycleError> {
        let (tx, plan, counts) = self.begin(ctx, plan_id).await?;
        let mutation =
            transitions::change_status(&plan, change, &counts, species::profile(plan.species))?;
        self.finish(tx, ctx, plan, mutation).await
    }

    /// Open a transaction, lock the plan row and read its dependent counts.
    pub(crate) async fn begin(
        &self,
        ctx: &RequestContext,
        plan_id: Uuid,
    ) -> Result<(Transaction<'static, Postgres>, BreedingPlan, DependentCounts), LifecycleError>
    {
        let mut tx = self
            .pool
            .begin()
            .await
            .context("failed to begin transaction")?;
        let plan = plans::get_plan_for_update(&mut *tx, ctx.tenant_id, plan_id)
            .await?
            .ok_or_else(|| LifecycleError::plan_not_found(plan_id))?;
        let counts = dependent_counts(&mut tx, ctx.tenant_id, plan_id).await?;
        Ok((tx, plan, counts))
    }

    /// Persist `mutation`, commit, and publish its first event.
    pub(crate) async fn finish(
        &self,
        mut tx: Transaction<'static, Postgres>,
        ctx: &RequestContext,
        before: BreedingPlan,
        mutation: Mutation,
    ) -> Result<BreedingPlan, LifecycleError> {
        if mutation.events.is_empty() && mutation.plan == before {
            tracing::debug!(plan_id = %before.id, "no-op update; nothing written");
            return Ok(before);
        }

        let at = self.clock.now();
        let saved = events::persist_transition(&mut tx, ctx, at, &before, &mutation).await?;
        tx.commit()
            .await
            .context("failed to commit plan transition")?;

        let (kind, label) = mutation
            .events
            .first()
            .map(|e| (e.kind, e.label.clone()))
            .unwrap_or_else(|| (EventKind::PlanUpdated, "Plan details updated".to_owned()));
        tracing::info!(
            plan_id = %saved.id,
            tenant_id = %ctx.tenant_id,
            from = %before.status,
            to = %saved.status,
            event = %kind,
            version = saved.version,
            "plan transition committed"
        );
        self.announce(ctx, saved.id, kind, label).await;
        Ok(saved)
    }

    /// Publish to the activity feed. Failures are logged, never returned.
    pub(crate) async fn announce(
        &self,
        ctx: &RequestContext,
        plan_id: Uuid,
        kind: EventKind,
        summary: String,
    ) {
        let entry = ActivityEntry {
            tenant_id: ctx.tenant_id,
            plan_id,
            actor: ctx.actor.clone(),
            event_type: kind.as_str(),
            summary,
        };
        if let Err(err) = self.feed.publish(&entry).await {
            tracing::warn!(
                plan_id = %plan_id,
                event = %kind,
                error = %err,
                "failed to publish activity entry"
            );
        }
    }

    /// Append an event outside a state mutation, on `conn`.
    pub(crate) async fn record_event(
        &self,
        conn: &mut PgConnection,
        ctx: &RequestContext,
        plan_id: Uuid,
        kind: EventKind,
        label: &str,
        data: Value,
    ) -> Result<(), LifecycleError> {
        events::record(conn, ctx, self.clock.now(), plan_id, kind, label, data).await
    }
}

async fn dependent_counts(
    conn: &mut PgConnection,
    tenant_id: Uuid,
    plan_id: Uuid,
) -> Result<DependentCounts, LifecycleError> {
    let (total, alive) = offspring::count_offspring(&mut *conn, tenant_id, plan_id).await?;
    let waitlist = offspring::count_waitlist_entries(&mut *conn, tenant_id, plan_id).await?;
    Ok(DependentCounts {
        offspring: total,
        offspring_alive: alive,
        waitlist,
    })
}

/// Check that `animal_id` exists in the tenant and can fill `role` on a
/// plan of `species`.
pub(crate) async fn verify_parent(
    conn: &mut PgConnection,
    tenant_id: Uuid,
    species: Species,
    role: ParentRole,
    animal_id: Uuid,
) -> Result<(), LifecycleError> {
    let animal = animals::get_animal(&mut *conn, tenant_id, animal_id)
        .await?
        .ok_or(LifecycleError::NotFound {
            entity: "animal",
            id: animal_id,
        })?;
    if animal.species != species {
        return Err(LifecycleError::validation(format!(
            "{} {} is a {}, not a {species}",
            role.field(),
            animal.name,
            animal.species
        )));
    }
    if animal.sex != role.sex() {
        return Err(LifecycleError::validation(format!(
            "{} {} must be {}",
            role.field(),
            animal.name,
            role.sex()
        )));
    }
    Ok(())
}
