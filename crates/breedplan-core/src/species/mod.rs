//! Static per-species reproduction constants and anchor capabilities.
//!
//! The table is the single source for both the timeline arithmetic and the
//! capability gates; nothing else in the crate hardcodes species lists.

use breedplan_db::models::Species;

/// Reproduction constants and capability flags for one species.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpeciesProfile {
    pub species: Species,
    /// Days from cycle start to ovulation.
    pub ovulation_offset_days: i64,
    pub gestation_days: i64,
    /// Days from birth until offspring are weaned.
    pub care_days: i64,
    /// Weeks from birth until placement may start.
    pub placement_start_weeks: i64,
    /// Weeks the placement window stays open after it starts.
    pub placement_extension_weeks: i64,
    /// Ovulation is triggered by breeding; there is no independent signal.
    pub induced_ovulator: bool,
    /// A commercial ovulation test exists for the species.
    pub supports_ovulation_testing: bool,
    /// A cycle-start lock may later be refined to a confirmed ovulation.
    pub supports_ovulation_upgrade: bool,
}

const fn spontaneous(
    species: Species,
    ovulation_offset_days: i64,
    gestation_days: i64,
    care_days: i64,
    placement_start_weeks: i64,
    placement_extension_weeks: i64,
    testable: bool,
) -> SpeciesProfile {
    SpeciesProfile {
        species,
        ovulation_offset_days,
        gestation_days,
        care_days,
        placement_start_weeks,
        placement_extension_weeks,
        induced_ovulator: false,
        supports_ovulation_testing: testable,
        supports_ovulation_upgrade: testable,
    }
}

const fn induced(
    species: Species,
    ovulation_offset_days: i64,
    gestation_days: i64,
    care_days: i64,
    placement_start_weeks: i64,
    placement_extension_weeks: i64,
) -> SpeciesProfile {
    SpeciesProfile {
        species,
        ovulation_offset_days,
        gestation_days,
        care_days,
        placement_start_weeks,
        placement_extension_weeks,
        induced_ovulator: true,
        supports_ovulation_testing: false,
        supports_ovulation_upgrade: false,
    }
}

pub const PROFILES: [SpeciesProfile; 9] = [
    spontaneous(Species::Dog, 12, 63, 42, 8, 4, true),
    induced(Species::Cat, 3, 63, 56, 12, 4),
    spontaneous(Species::Horse, 5, 340, 180, 28, 8, true),
    spontaneous(Species::Goat, 2, 150, 60, 9, 4, false),
    spontaneous(Species::Sheep, 1, 147, 60, 9, 4, false),
    induced(Species::Rabbit, 0, 31, 42, 8, 2),
    spontaneous(Species::Pig, 2, 114, 28, 6, 2, false),
    spontaneous(Species::Cattle, 1, 283, 180, 30, 8, false),
    induced(Species::Alpaca, 0, 345, 180, 30, 8),
];

/// Look up the profile for a species.
pub fn profile(species: Species) -> &'static SpeciesProfile {
    let idx = match species {
        Species::Dog => 0,
        Species::Cat => 1,
        Species::Horse => 2,
        Species::Goat => 3,
        Species::Sheep => 4,
        Species::Rabbit => 5,
        Species::Pig => 6,
        Species::Cattle => 7,
        Species::Alpaca => 8,
    };
    &PROFILES[idx]
}
