//! Tenant-scoped query functions, one module per table family.

pub mod animals;
pub mod offspring;
pub mod plan_events;
pub mod plans;
pub mod usage;
