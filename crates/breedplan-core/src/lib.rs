//! Breeding-plan lifecycle engine.
//!
//! The pure engines ([`species`], [`timeline`], [`state`], [`immutability`])
//! decide what a transition does; [`lifecycle`] runs them inside one
//! PostgreSQL transaction per operation and writes the event log.

pub mod clock;
pub mod error;
pub mod feed;
pub mod fields;
pub mod immutability;
pub mod lifecycle;
pub mod plan;
pub mod species;
pub mod state;
pub mod timeline;

#[cfg(test)]
mod testing;

pub use error::LifecycleError;
pub use lifecycle::{PlanLifecycle, RequestContext};
