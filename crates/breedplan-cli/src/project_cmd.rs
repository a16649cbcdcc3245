//! `breedplan project`: print the timeline an anchor would lock, without
//! touching the database.

use anyhow::Result;
use chrono::NaiveDate;

use breedplan_core::{species, timeline};
use breedplan_db::models::{ReproAnchorMode, Species};

use crate::output;

pub fn run_project(species: Species, mode: ReproAnchorMode, anchor: NaiveDate) -> Result<()> {
    let profile = species::profile(species);
    let projected = timeline::project(mode, anchor, profile).map_err(output::lifecycle_error)?;

    println!("{species} timeline from {mode} {anchor}");
    println!(
        "  Confidence:          {}",
        timeline::confidence_for(mode)
    );
    println!();
    for (label, date) in rows(&projected) {
        println!("  {label:<20} {date}");
    }
    Ok(())
}

fn rows(t: &timeline::Timeline) -> [(&'static str, NaiveDate); 6] {
    [
        ("Cycle start", t.cycle_start),
        ("Ovulation", t.ovulation),
        ("Due", t.due_date),
        ("Weaned", t.weaned_date),
        ("Placement start", t.placement_start),
        ("Placement complete", t.placement_completed),
    ]
}
