//! CLI handlers for the records that surround a plan: animals, offspring
//! and waitlist entries.

use anyhow::{Result, bail};
use sqlx::PgPool;

use breedplan_core::{PlanLifecycle, RequestContext, plan};
use breedplan_db::queries::animals::{self, NewAnimal};

use crate::output::{lifecycle_error, parse_id};
use crate::{AnimalCommands, OffspringCommands, WaitlistCommands};

pub async fn run_animal_command(
    command: &AnimalCommands,
    pool: &PgPool,
    ctx: &RequestContext,
) -> Result<()> {
    match command {
        AnimalCommands::Add { name, species, sex } => {
            if name.trim().is_empty() {
                bail!("animal name must not be empty");
            }
            let animal = animals::insert_animal(
                pool,
                &NewAnimal {
                    tenant_id: ctx.tenant_id,
                    name: name.trim().to_owned(),
                    species: *species,
                    sex: *sex,
                },
            )
            .await?;
            println!("Animal registered.");
            println!();
            println!("  Animal ID:        {}", animal.id);
            println!("  Name:             {}", animal.name);
            println!("  Species:          {}", animal.species);
            println!("  Sex:              {}", animal.sex);
            Ok(())
        }
        AnimalCommands::List => {
            let all = animals::list_animals(pool, ctx.tenant_id).await?;
            if all.is_empty() {
                println!("No animals found. Use `breedplan animal add` to register one.");
                return Ok(());
            }
            let name_w = all.iter().map(|a| a.name.len()).max().unwrap_or(4).max(4);
            println!(
                "{:<36}  {:<name_w$}  {:<7}  {:<6}  BREEDING",
                "ID", "NAME", "SPECIES", "SEX"
            );
            for a in &all {
                println!(
                    "{:<36}  {:<name_w$}  {:<7}  {:<6}  {}",
                    a.id,
                    a.name,
                    a.species.as_str(),
                    a.sex.to_string(),
                    if a.in_active_breeding_plan { "yes" } else { "no" },
                );
            }
            Ok(())
        }
    }
}

pub async fn run_offspring_command(
    command: &OffspringCommands,
    lifecycle: &PlanLifecycle,
    ctx: &RequestContext,
) -> Result<()> {
    match command {
        OffspringCommands::Add { plan_id, name } => {
            let id = parse_id(plan_id, "plan")?;
            let row = plan::add_offspring(lifecycle, ctx, id, name)
                .await
                .map_err(lifecycle_error)?;
            println!("Offspring registered.");
            println!();
            println!("  Offspring ID:     {}", row.id);
            println!("  Plan ID:          {}", row.plan_id);
            Ok(())
        }
        OffspringCommands::Deceased { offspring_id } => {
            let id = parse_id(offspring_id, "offspring")?;
            plan::mark_offspring_deceased(lifecycle, ctx, id)
                .await
                .map_err(lifecycle_error)?;
            println!("Offspring {id} marked deceased.");
            Ok(())
        }
    }
}

pub async fn run_waitlist_command(
    command: &WaitlistCommands,
    lifecycle: &PlanLifecycle,
    ctx: &RequestContext,
) -> Result<()> {
    match command {
        WaitlistCommands::Add { plan_id, buyer } => {
            let id = parse_id(plan_id, "plan")?;
            let entry = plan::add_waitlist_entry(lifecycle, ctx, id, buyer)
                .await
                .map_err(lifecycle_error)?;
            println!("Waitlist entry added.");
            println!();
            println!("  Entry ID:         {}", entry.id);
            println!("  Buyer:            {}", entry.buyer_name);
            Ok(())
        }
    }
}
