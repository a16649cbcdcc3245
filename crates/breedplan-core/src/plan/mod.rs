//! Plan management: partial-update patches and the CRUD service layer.

pub mod patch;
pub mod service;

pub use patch::PlanPatch;
pub use service::{
    CreatePlan, DeleteMode, add_offspring, add_waitlist_entry, archive, create_plan, delete_plan,
    get_plan, list_events, list_plans, mark_offspring_deceased, unarchive,
};
