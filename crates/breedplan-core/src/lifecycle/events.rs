//! The single write path for lifecycle mutations: plan row, event rows and
//! parent-flag sync, all on the caller's transaction.

use std::collections::BTreeSet;
use std::fmt;

use anyhow::Context;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value, json};
use sqlx::PgConnection;
use uuid::Uuid;

use breedplan_db::models::BreedingPlan;
use breedplan_db::queries::animals;
use breedplan_db::queries::plan_events::{self, NewPlanEvent};
use breedplan_db::queries::plans;

use crate::error::LifecycleError;
use crate::state::active_breeding_status_names;

use super::RequestContext;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Created,
    AnchorLocked,
    CycleStarted,
    OvulationUpgraded,
    OvulationCleared,
    Committed,
    Uncommitted,
    Rewound,
    Advanced,
    Dissolved,
    StatusChanged,
    DatesUpdated,
    PlanUpdated,
    Held,
    Resumed,
    Canceled,
    MarkedUnsuccessful,
    Archived,
    Unarchived,
    Deleted,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::AnchorLocked => "anchor_locked",
            Self::CycleStarted => "cycle_started",
            Self::OvulationUpgraded => "ovulation_upgraded",
            Self::OvulationCleared => "ovulation_cleared",
            Self::Committed => "committed",
            Self::Uncommitted => "uncommitted",
            Self::Rewound => "rewound",
            Self::Advanced => "advanced",
            Self::Dissolved => "dissolved",
            Self::StatusChanged => "status_changed",
            Self::DatesUpdated => "dates_updated",
            Self::PlanUpdated => "plan_updated",
            Self::Held => "held",
            Self::Resumed => "resumed",
            Self::Canceled => "canceled",
            Self::MarkedUnsuccessful => "marked_unsuccessful",
            Self::Archived => "archived",
            Self::Unarchived => "unarchived",
            Self::Deleted => "deleted",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An event to be written alongside a plan mutation.
#[derive(Debug, Clone, PartialEq)]
pub struct PlanEvent {
    pub kind: EventKind,
    pub label: String,
    /// Operation-specific data; must be a JSON object.
    pub payload: Value,
}

impl PlanEvent {
    pub fn new(kind: EventKind, label: impl Into<String>, payload: Value) -> Self {
        Self {
            kind,
            label: label.into(),
            payload,
        }
    }
}

/// A computed change: the plan as it should be stored, plus its events.
#[derive(Debug, Clone)]
pub struct Mutation {
    pub plan: BreedingPlan,
    pub events: Vec<PlanEvent>,
}

impl Mutation {
    pub fn new(plan: BreedingPlan, event: PlanEvent) -> Self {
        Self {
            plan,
            events: vec![event],
        }
    }
}

/// Bookkeeping columns left out of event diffs.
const UNDIFFED: [&str; 3] = ["version", "created_at", "updated_at"];

/// `{field: {from, to}}` for every column that differs.
pub fn diff(before: &BreedingPlan, after: &BreedingPlan) -> anyhow::Result<Value> {
    let before = serde_json::to_value(before).context("failed to serialize plan snapshot")?;
    let after = serde_json::to_value(after).context("failed to serialize plan snapshot")?;

    let mut changes = Map::new();
    if let (Value::Object(old), Value::Object(new)) = (before, after) {
        for (key, to) in new {
            if UNDIFFED.contains(&key.as_str()) {
                continue;
            }
            let from = old.get(&key).cloned().unwrap_or(Value::Null);
            if from != to {
                changes.insert(key, json!({ "from": from, "to": to }));
            }
        }
    }
    Ok(Value::Object(changes))
}

/// Write `mutation` on `conn`.
///
/// The plan row is written with its optimistic version check; zero rows
/// means another writer got there first and surfaces as `Conflict`. The
/// first event carries the column diff under `changes`. Every parent the
/// plan references before or after is re-synced.
pub async fn persist_transition(
    conn: &mut PgConnection,
    ctx: &RequestContext,
    at: DateTime<Utc>,
    before: &BreedingPlan,
    mutation: &Mutation,
) -> Result<BreedingPlan, LifecycleError> {
    let saved = plans::update_plan_state(&mut *conn, &mutation.plan)
        .await?
        .ok_or_else(|| {
            LifecycleError::conflict(format!(
                "breeding plan {} was modified concurrently",
                before.id
            ))
        })?;

    let changes = diff(before, &saved)?;
    for (idx, event) in mutation.events.iter().enumerate() {
        let mut data = match &event.payload {
            Value::Object(map) => map.clone(),
            Value::Null => Map::new(),
            other => {
                let mut map = Map::new();
                map.insert("detail".to_owned(), other.clone());
                map
            }
        };
        if idx == 0 {
            data.insert("changes".to_owned(), changes.clone());
        }
        record(
            &mut *conn,
            ctx,
            at,
            saved.id,
            event.kind,
            &event.label,
            Value::Object(data),
        )
        .await?;
    }

    sync_parents(&mut *conn, ctx.tenant_id, before, &saved).await?;
    Ok(saved)
}

/// Append one event row.
pub async fn record(
    conn: &mut PgConnection,
    ctx: &RequestContext,
    at: DateTime<Utc>,
    plan_id: Uuid,
    kind: EventKind,
    label: &str,
    data: Value,
) -> Result<(), LifecycleError> {
    plan_events::insert_plan_event(
        &mut *conn,
        &NewPlanEvent {
            tenant_id: ctx.tenant_id,
            plan_id,
            event_type: kind.as_str().to_owned(),
            occurred_at: at,
            label: label.to_owned(),
            data,
            recorded_by: ctx.actor.clone(),
        },
    )
    .await?;
    Ok(())
}

/// Recompute the breeding flag of every animal either snapshot references.
pub async fn sync_parents(
    conn: &mut PgConnection,
    tenant_id: Uuid,
    before: &BreedingPlan,
    after: &BreedingPlan,
) -> Result<(), LifecycleError> {
    let parents: BTreeSet<Uuid> = before
        .parent_ids()
        .into_iter()
        .chain(after.parent_ids())
        .collect();
    for animal_id in parents {
        animals::sync_breeding_flag(
            &mut *conn,
            tenant_id,
            animal_id,
            &active_breeding_status_names(),
        )
        .await?;
    }
    Ok(())
}
