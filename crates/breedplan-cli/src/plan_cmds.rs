//! CLI handlers for `breedplan plan` subcommands.
//!
//! Every mutating subcommand goes through [`PlanLifecycle`] or the
//! `breedplan_core::plan` service, prints the resulting plan, and renders
//! lifecycle failures with their error kind.

use anyhow::Result;
use uuid::Uuid;

use breedplan_core::lifecycle::LockRequest;
use breedplan_core::plan::{self, CreatePlan, DeleteMode, PlanPatch};
use breedplan_core::state::dispatch;
use breedplan_core::{PlanLifecycle, RequestContext};
use breedplan_db::models::BreedingPlan;
use breedplan_db::queries::offspring as offspring_db;

use crate::PlanCommands;
use crate::output::{self, lifecycle_error, parse_id, parse_optional_id};

// -----------------------------------------------------------------------
// Public entry point
// -----------------------------------------------------------------------

/// Dispatch a `PlanCommands` variant to the appropriate handler.
pub async fn run_plan_command(
    command: &PlanCommands,
    lifecycle: &PlanLifecycle,
    ctx: &RequestContext,
) -> Result<()> {
    match command {
        PlanCommands::Create {
            name,
            species,
            dam,
            sire,
            recipient,
            embryo_transfer,
            cycle_start,
        } => {
            let input = CreatePlan {
                name: name.clone(),
                species: *species,
                dam_id: parse_optional_id(dam.as_deref(), "dam")?,
                sire_id: parse_optional_id(sire.as_deref(), "sire")?,
                recipient_id: parse_optional_id(recipient.as_deref(), "recipient")?,
                embryo_transfer: *embryo_transfer,
                expected_cycle_start: *cycle_start,
            };
            cmd_create(lifecycle, ctx, &input).await
        }
        PlanCommands::Show { plan_id } => cmd_show(lifecycle, ctx, plan_id).await,
        PlanCommands::List { all } => cmd_list(lifecycle, ctx, *all).await,
        PlanCommands::Lock {
            plan_id,
            mode,
            date,
            method,
        } => {
            let id = parse_id(plan_id, "plan")?;
            let request = LockRequest {
                anchor_mode: *mode,
                anchor_date: *date,
                confirmation_method: *method,
            };
            let plan = lifecycle
                .lock(ctx, id, &request)
                .await
                .map_err(lifecycle_error)?;
            report("Cycle locked.", &plan);
            Ok(())
        }
        PlanCommands::UpgradeOvulation {
            plan_id,
            date,
            method,
        } => {
            let id = parse_id(plan_id, "plan")?;
            let plan = lifecycle
                .upgrade_to_ovulation(ctx, id, *date, *method)
                .await
                .map_err(lifecycle_error)?;
            report("Ovulation anchor recorded.", &plan);
            Ok(())
        }
        PlanCommands::ClearOvulation { plan_id } => {
            let id = parse_id(plan_id, "plan")?;
            let plan = lifecycle
                .clear_ovulation(ctx, id)
                .await
                .map_err(lifecycle_error)?;
            report("Ovulation anchor cleared.", &plan);
            Ok(())
        }
        PlanCommands::Commit { plan_id } => {
            let id = parse_id(plan_id, "plan")?;
            let plan = lifecycle.commit(ctx, id).await.map_err(lifecycle_error)?;
            report("Plan committed.", &plan);
            Ok(())
        }
        PlanCommands::Uncommit { plan_id } => {
            let id = parse_id(plan_id, "plan")?;
            let plan = lifecycle.uncommit(ctx, id).await.map_err(lifecycle_error)?;
            report("Plan returned to planning.", &plan);
            Ok(())
        }
        PlanCommands::Rewind { plan_id } => {
            let id = parse_id(plan_id, "plan")?;
            let plan = lifecycle.rewind(ctx, id).await.map_err(lifecycle_error)?;
            report("Plan rewound.", &plan);
            Ok(())
        }
        PlanCommands::Advance { plan_id, date } => {
            let id = parse_id(plan_id, "plan")?;
            let plan = lifecycle
                .advance(ctx, id, *date)
                .await
                .map_err(lifecycle_error)?;
            report("Plan advanced.", &plan);
            Ok(())
        }
        PlanCommands::Dissolve { plan_id } => {
            let id = parse_id(plan_id, "plan")?;
            let plan = lifecycle.dissolve(ctx, id).await.map_err(lifecycle_error)?;
            report("Plan dissolved.", &plan);
            Ok(())
        }
        PlanCommands::Update {
            plan_id,
            name,
            status,
            mode,
            method,
            dam,
            sire,
            recipient,
            embryo_transfer,
            cycle_start_unknown,
            set_dates,
            clear_dates,
        } => {
            let id = parse_id(plan_id, "plan")?;
            let mut patch = PlanPatch {
                name: name.clone(),
                status: *status,
                repro_anchor_mode: *mode,
                ovulation_confirmation_method: method.map(Some),
                dam_id: parse_parent(dam.as_deref(), "dam")?,
                sire_id: parse_parent(sire.as_deref(), "sire")?,
                recipient_id: parse_parent(recipient.as_deref(), "recipient")?,
                embryo_transfer: *embryo_transfer,
                cycle_start_unknown: *cycle_start_unknown,
                ..PlanPatch::default()
            };
            for raw in set_dates {
                let (field, date) = output::parse_date_assignment(raw)?;
                patch = patch.set_date(field, date);
            }
            for field in clear_dates {
                patch = patch.clear_date(*field);
            }
            cmd_update(lifecycle, ctx, id, &patch).await
        }
        PlanCommands::Hold { plan_id } => {
            let id = parse_id(plan_id, "plan")?;
            let plan = dispatch::hold(lifecycle, ctx, id)
                .await
                .map_err(lifecycle_error)?;
            report("Plan on hold.", &plan);
            Ok(())
        }
        PlanCommands::Resume { plan_id } => {
            let id = parse_id(plan_id, "plan")?;
            let plan = dispatch::resume(lifecycle, ctx, id)
                .await
                .map_err(lifecycle_error)?;
            report("Plan resumed.", &plan);
            Ok(())
        }
        PlanCommands::Cancel { plan_id } => {
            let id = parse_id(plan_id, "plan")?;
            let plan = dispatch::cancel(lifecycle, ctx, id)
                .await
                .map_err(lifecycle_error)?;
            report("Plan canceled.", &plan);
            Ok(())
        }
        PlanCommands::Unsuccessful { plan_id } => {
            let id = parse_id(plan_id, "plan")?;
            let plan = dispatch::mark_unsuccessful(lifecycle, ctx, id)
                .await
                .map_err(lifecycle_error)?;
            report("Plan marked unsuccessful.", &plan);
            Ok(())
        }
        PlanCommands::Archive { plan_id } => {
            let id = parse_id(plan_id, "plan")?;
            let plan = plan::archive(lifecycle, ctx, id)
                .await
                .map_err(lifecycle_error)?;
            report("Plan archived.", &plan);
            Ok(())
        }
        PlanCommands::Unarchive { plan_id } => {
            let id = parse_id(plan_id, "plan")?;
            let plan = plan::unarchive(lifecycle, ctx, id)
                .await
                .map_err(lifecycle_error)?;
            report("Plan restored.", &plan);
            Ok(())
        }
        PlanCommands::Delete { plan_id, purge } => {
            let id = parse_id(plan_id, "plan")?;
            let mode = if *purge {
                DeleteMode::Purge
            } else {
                DeleteMode::Soft
            };
            plan::delete_plan(lifecycle, ctx, id, mode)
                .await
                .map_err(lifecycle_error)?;
            match mode {
                DeleteMode::Soft => println!("Plan {id} deleted. Its event log is kept."),
                DeleteMode::Purge => println!("Plan {id} purged."),
            }
            Ok(())
        }
        PlanCommands::Events { plan_id } => cmd_events(lifecycle, ctx, plan_id).await,
    }
}

/// `none` clears a parent; anything else must be an animal ID.
fn parse_parent(raw: Option<&str>, role: &str) -> Result<Option<Option<Uuid>>> {
    match raw {
        None => Ok(None),
        Some(r) if r.trim().eq_ignore_ascii_case("none") => Ok(Some(None)),
        Some(r) => Ok(Some(Some(parse_id(r, role)?))),
    }
}

fn report(headline: &str, plan: &BreedingPlan) {
    println!("{headline}");
    println!();
    output::print_plan(plan);
}

// -----------------------------------------------------------------------
// breedplan plan create
// -----------------------------------------------------------------------

async fn cmd_create(
    lifecycle: &PlanLifecycle,
    ctx: &RequestContext,
    input: &CreatePlan,
) -> Result<()> {
    let plan = plan::create_plan(lifecycle, ctx, input)
        .await
        .map_err(lifecycle_error)?;

    println!("Plan created successfully.");
    println!();
    println!("  Plan ID:          {}", plan.id);
    println!("  Name:             {}", plan.name);
    println!("  Species:          {}", plan.species);
    println!("  Status:           {}", plan.status);
    if let Some(due) = plan.expected_due_date {
        println!("  Expected due:     {due} (LOW confidence)");
    }

    Ok(())
}

// -----------------------------------------------------------------------
// breedplan plan show
// -----------------------------------------------------------------------

async fn cmd_show(lifecycle: &PlanLifecycle, ctx: &RequestContext, raw_id: &str) -> Result<()> {
    let id = parse_id(raw_id, "plan")?;
    let plan = plan::get_plan(lifecycle, ctx, id)
        .await
        .map_err(lifecycle_error)?;
    output::print_plan(&plan);

    let pool = lifecycle.pool();
    let offspring = offspring_db::list_offspring_for_plan(pool, ctx.tenant_id, id).await?;
    let waitlist = offspring_db::count_waitlist_entries(pool, ctx.tenant_id, id).await?;

    if !offspring.is_empty() {
        println!();
        println!("  Offspring ({}):", offspring.len());
        for o in &offspring {
            match o.deceased_at {
                Some(at) => println!("    {}  {}  deceased {}", o.id, o.name, at.date_naive()),
                None => println!("    {}  {}", o.id, o.name),
            }
        }
    }
    if waitlist > 0 {
        println!();
        println!("  Waitlist entries: {waitlist}");
    }

    Ok(())
}

// -----------------------------------------------------------------------
// breedplan plan list
// -----------------------------------------------------------------------

async fn cmd_list(
    lifecycle: &PlanLifecycle,
    ctx: &RequestContext,
    include_archived: bool,
) -> Result<()> {
    let plans = plan::list_plans(lifecycle, ctx, include_archived)
        .await
        .map_err(lifecycle_error)?;

    if plans.is_empty() {
        println!(
            "No plans found. Use `breedplan plan create <name> --species <SPECIES>` to create one."
        );
        return Ok(());
    }

    let id_w = 36;
    let code_w = plans
        .iter()
        .map(|p| p.code.as_deref().map_or(1, str::len))
        .max()
        .unwrap_or(4)
        .max(4);
    let name_w = plans.iter().map(|p| p.name.len()).max().unwrap_or(4).max(4);
    let status_w = plans
        .iter()
        .map(|p| p.status.as_str().len())
        .max()
        .unwrap_or(6)
        .max(6);

    println!(
        "{:<id_w$}  {:<code_w$}  {:<name_w$}  {:<status_w$}  SPECIES",
        "ID", "CODE", "NAME", "STATUS"
    );
    println!(
        "{:-<id_w$}  {:-<code_w$}  {:-<name_w$}  {:-<status_w$}  -------",
        "", "", "", ""
    );
    for p in &plans {
        let marker = if p.archived { " (archived)" } else { "" };
        println!(
            "{:<id_w$}  {:<code_w$}  {:<name_w$}  {:<status_w$}  {}{marker}",
            p.id,
            p.code.as_deref().unwrap_or("-"),
            p.name,
            p.status.as_str(),
            p.species,
        );
    }

    Ok(())
}

// -----------------------------------------------------------------------
// breedplan plan update
// -----------------------------------------------------------------------

async fn cmd_update(
    lifecycle: &PlanLifecycle,
    ctx: &RequestContext,
    plan_id: Uuid,
    patch: &PlanPatch,
) -> Result<()> {
    if patch.is_empty() {
        println!("Nothing to update.");
        return Ok(());
    }
    let before = plan::get_plan(lifecycle, ctx, plan_id)
        .await
        .map_err(lifecycle_error)?;
    let after = lifecycle
        .update_plan(ctx, plan_id, patch)
        .await
        .map_err(lifecycle_error)?;

    if after.version == before.version {
        report("No changes.", &after);
    } else {
        report("Plan updated.", &after);
    }
    Ok(())
}

// -----------------------------------------------------------------------
// breedplan plan events
// -----------------------------------------------------------------------

async fn cmd_events(lifecycle: &PlanLifecycle, ctx: &RequestContext, raw_id: &str) -> Result<()> {
    let id = parse_id(raw_id, "plan")?;
    let events = plan::list_events(lifecycle, ctx, id)
        .await
        .map_err(lifecycle_error)?;

    if events.is_empty() {
        println!("No events recorded.");
        return Ok(());
    }

    println!("Events ({}):", events.len());
    for event in &events {
        let time = event.occurred_at.format("%Y-%m-%d %H:%M:%S");
        println!(
            "  [{time}] {:<20} {}  ({})",
            event.event_type, event.label, event.recorded_by
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parent_flag_accepts_none_to_clear() {
        assert_eq!(parse_parent(None, "dam").unwrap(), None);
        assert_eq!(parse_parent(Some("NONE"), "dam").unwrap(), Some(None));

        let id = Uuid::new_v4();
        assert_eq!(
            parse_parent(Some(&id.to_string()), "dam").unwrap(),
            Some(Some(id))
        );
        assert!(parse_parent(Some("rex"), "sire").is_err());
    }
}
