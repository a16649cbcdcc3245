//! Activity feed: a human-readable line per committed transition.
//!
//! Publishing happens after the transaction commits. A failing feed is
//! logged and otherwise ignored; it never undoes the transition.

use anyhow::Result;
use async_trait::async_trait;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivityEntry {
    pub tenant_id: Uuid,
    pub plan_id: Uuid,
    pub actor: String,
    pub event_type: &'static str,
    pub summary: String,
}

#[async_trait]
pub trait ActivityFeed: Send + Sync {
    async fn publish(&self, entry: &ActivityEntry) -> Result<()>;
}

/// Writes each entry as a `tracing` event.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingActivityFeed;

#[async_trait]
impl ActivityFeed for TracingActivityFeed {
    async fn publish(&self, entry: &ActivityEntry) -> Result<()> {
        tracing::info!(
            target: "breedplan::activity",
            tenant_id = %entry.tenant_id,
            plan_id = %entry.plan_id,
            actor = %entry.actor,
            event = entry.event_type,
            "{}",
            entry.summary
        );
        Ok(())
    }
}
