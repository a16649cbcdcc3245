//! Shared argument parsing and terminal rendering for the command handlers.

use anyhow::{Context, Result, anyhow, bail};
use chrono::NaiveDate;
use uuid::Uuid;

use breedplan_core::LifecycleError;
use breedplan_core::fields::DateField;
use breedplan_db::models::BreedingPlan;

/// Parse a UUID argument, naming the entity in the error.
pub fn parse_id(raw: &str, entity: &str) -> Result<Uuid> {
    Uuid::parse_str(raw.trim()).with_context(|| format!("invalid {entity} ID: {raw}"))
}

pub fn parse_optional_id(raw: Option<&str>, entity: &str) -> Result<Option<Uuid>> {
    raw.map(|r| parse_id(r, entity)).transpose()
}

/// Parse a `FIELD=YYYY-MM-DD` assignment.
pub fn parse_date_assignment(raw: &str) -> Result<(DateField, NaiveDate)> {
    let Some((field, date)) = raw.split_once('=') else {
        bail!("expected FIELD=YYYY-MM-DD, got {raw:?}");
    };
    let field: DateField = field.parse()?;
    let date = date
        .trim()
        .parse::<NaiveDate>()
        .with_context(|| format!("invalid date for {}: {date:?}", field.name()))?;
    Ok((field, date))
}

/// Render a lifecycle failure with its kind and any structured detail.
pub fn lifecycle_error(err: LifecycleError) -> anyhow::Error {
    let mut message = format!("[{}] {err}", err.kind());
    match &err {
        LifecycleError::ValidationFailed { missing, .. } if !missing.is_empty() => {
            message.push_str(&format!("\n  missing: {}", missing.join(", ")));
        }
        LifecycleError::Conflict {
            blocking: Some(counts),
            ..
        } => {
            message.push_str(&format!(
                "\n  blocking: {} offspring, {} waitlist entries",
                counts.offspring, counts.waitlist
            ));
        }
        _ => {}
    }
    anyhow!(message)
}

pub fn print_plan(plan: &BreedingPlan) {
    println!("Plan: {} ({})", plan.name, plan.id);
    println!("  Code:             {}", plan.code.as_deref().unwrap_or("-"));
    println!("  Species:          {}", plan.species);
    match plan.status_before_hold {
        Some(before) => println!("  Status:           {} (was {before})", plan.status),
        None => println!("  Status:           {}", plan.status),
    }
    println!("  Anchor mode:      {}", plan.repro_anchor_mode);
    println!(
        "  Confidence:       {}",
        plan.date_confidence_level
            .map(|c| c.to_string())
            .unwrap_or_else(|| "-".to_string())
    );
    if let Some(variance) = plan.ovulation_offset_variance_days {
        println!("  Offset variance:  {variance:+} days");
    }
    println!("  Dam:              {}", display_id(plan.dam_id));
    println!("  Sire:             {}", display_id(plan.sire_id));
    if plan.embryo_transfer || plan.recipient_id.is_some() {
        println!("  Recipient:        {}", display_id(plan.recipient_id));
    }
    if let Some(ref by) = plan.committed_by {
        println!("  Committed by:     {by}");
    }
    if plan.archived {
        println!("  Archived:         yes");
    }
    println!("  Version:          {}", plan.version);

    let dates: Vec<(DateField, NaiveDate)> = DateField::ALL
        .into_iter()
        .filter_map(|f| f.get(plan).map(|d| (f, d)))
        .collect();
    if !dates.is_empty() {
        println!();
        println!("  Dates:");
        let width = dates.iter().map(|(f, _)| f.name().len()).max().unwrap_or(0);
        for (field, date) in dates {
            println!("    {:<width$}  {date}", field.name());
        }
    }
}

fn display_id(id: Option<Uuid>) -> String {
    id.map(|i| i.to_string()).unwrap_or_else(|| "-".to_string())
}
