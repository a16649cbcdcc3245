mod animal_cmds;
mod config;
mod output;
mod plan_cmds;
mod project_cmd;

use chrono::NaiveDate;
use clap::{CommandFactory, Parser, Subcommand};
use sqlx::PgPool;
use uuid::Uuid;

use breedplan_core::PlanLifecycle;
use breedplan_core::fields::DateField;
use breedplan_db::models::{AnimalSex, OvulationMethod, PlanStatus, ReproAnchorMode, Species};
use breedplan_db::pool;

use config::{BreedplanConfig, Overrides};

#[derive(Parser)]
#[command(name = "breedplan", about = "Breeding-plan lifecycle manager")]
struct Cli {
    /// Database URL (overrides BREEDPLAN_DATABASE_URL env var)
    #[arg(long, global = true)]
    database_url: Option<String>,

    /// Tenant ID to act within (overrides BREEDPLAN_TENANT_ID env var)
    #[arg(long, global = true)]
    tenant: Option<String>,

    /// Name recorded on plan events (overrides BREEDPLAN_ACTOR env var)
    #[arg(long, global = true)]
    actor: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

impl Cli {
    fn overrides(&self) -> Overrides<'_> {
        Overrides {
            database_url: self.database_url.as_deref(),
            tenant: self.tenant.as_deref(),
            actor: self.actor.as_deref(),
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Write a breedplan config file (no database required)
    Init {
        /// PostgreSQL connection URL
        #[arg(long, default_value = "postgresql://localhost:5432/breedplan")]
        db_url: String,
        /// Overwrite existing config file
        #[arg(long)]
        force: bool,
    },
    /// Create the breedplan database and run migrations
    DbInit,
    /// Print the projected timeline for an anchor date (no database required)
    Project {
        /// Species to project for (e.g. DOG, CAT, HORSE)
        #[arg(long)]
        species: Species,
        /// How to interpret the anchor date
        #[arg(long, default_value = "CYCLE_START")]
        mode: ReproAnchorMode,
        /// Anchor date (YYYY-MM-DD)
        #[arg(long)]
        date: NaiveDate,
    },
    /// Generate shell completions
    Completions {
        /// Target shell
        shell: clap_complete::Shell,
    },
    /// Breeding plan management
    Plan {
        #[command(subcommand)]
        command: PlanCommands,
    },
    /// Animal registry
    Animal {
        #[command(subcommand)]
        command: AnimalCommands,
    },
    /// Offspring records attached to a plan
    Offspring {
        #[command(subcommand)]
        command: OffspringCommands,
    },
    /// Buyer waitlist attached to a plan
    Waitlist {
        #[command(subcommand)]
        command: WaitlistCommands,
    },
}

#[derive(Subcommand)]
pub enum PlanCommands {
    /// Create a plan in PLANNING
    Create {
        /// Plan name
        name: String,
        #[arg(long)]
        species: Species,
        /// Dam (female parent) animal ID
        #[arg(long)]
        dam: Option<String>,
        /// Sire (male parent) animal ID
        #[arg(long)]
        sire: Option<String>,
        /// Recipient female for embryo transfer
        #[arg(long)]
        recipient: Option<String>,
        #[arg(long)]
        embryo_transfer: bool,
        /// Expected cycle start; projects the expected dates at LOW confidence
        #[arg(long)]
        cycle_start: Option<NaiveDate>,
    },
    /// Show one plan
    Show {
        plan_id: String,
    },
    /// List plans
    List {
        /// Include archived plans
        #[arg(long)]
        all: bool,
    },
    /// Lock the cycle on an anchor date (PLANNING -> CYCLE)
    Lock {
        plan_id: String,
        /// Anchor mode: CYCLE_START, OVULATION or BREEDING_DATE
        #[arg(long, default_value = "CYCLE_START")]
        mode: ReproAnchorMode,
        /// Anchor date (YYYY-MM-DD)
        #[arg(long)]
        date: NaiveDate,
        /// How ovulation was confirmed (required for OVULATION anchors)
        #[arg(long)]
        method: Option<OvulationMethod>,
    },
    /// Refine a cycle-start lock with a confirmed ovulation date
    UpgradeOvulation {
        plan_id: String,
        #[arg(long)]
        date: NaiveDate,
        #[arg(long)]
        method: OvulationMethod,
    },
    /// Drop a confirmed ovulation and fall back to the cycle-start anchor
    ClearOvulation {
        plan_id: String,
    },
    /// Commit a locked plan and assign its code
    Commit {
        plan_id: String,
    },
    /// Return a committed plan to PLANNING
    Uncommit {
        plan_id: String,
    },
    /// Step the plan back one phase
    Rewind {
        plan_id: String,
    },
    /// Move a post-birth plan to its next care milestone
    Advance {
        plan_id: String,
        /// Actual date the milestone was reached
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    /// Dissolve a plan whose offspring are all deceased
    Dissolve {
        plan_id: String,
    },
    /// Partially update a plan
    Update {
        plan_id: String,
        #[arg(long)]
        name: Option<String>,
        /// Move to this status (requirements are checked)
        #[arg(long)]
        status: Option<PlanStatus>,
        /// Change the anchor mode (PLANNING only)
        #[arg(long)]
        mode: Option<ReproAnchorMode>,
        /// Ovulation confirmation method
        #[arg(long)]
        method: Option<OvulationMethod>,
        #[arg(long)]
        dam: Option<String>,
        #[arg(long)]
        sire: Option<String>,
        #[arg(long)]
        recipient: Option<String>,
        #[arg(long)]
        embryo_transfer: Option<bool>,
        #[arg(long)]
        cycle_start_unknown: Option<bool>,
        /// Set a date field, e.g. --set birth_date_actual=2024-05-02 (repeatable)
        #[arg(long = "set", value_name = "FIELD=DATE")]
        set_dates: Vec<String>,
        /// Clear a date field (repeatable)
        #[arg(long = "clear", value_name = "FIELD")]
        clear_dates: Vec<DateField>,
    },
    /// Put a plan on hold
    Hold {
        plan_id: String,
    },
    /// Resume a held plan
    Resume {
        plan_id: String,
    },
    /// Cancel a plan
    Cancel {
        plan_id: String,
    },
    /// Mark a plan unsuccessful
    Unsuccessful {
        plan_id: String,
    },
    /// Archive a plan (frees its usage slot)
    Archive {
        plan_id: String,
    },
    /// Restore an archived plan
    Unarchive {
        plan_id: String,
    },
    /// Delete a plan (soft by default)
    Delete {
        plan_id: String,
        /// Remove the row and its event log instead of stamping deleted_at
        #[arg(long)]
        purge: bool,
    },
    /// Show a plan's event log
    Events {
        plan_id: String,
    },
}

#[derive(Subcommand)]
pub enum AnimalCommands {
    /// Register an animal
    Add {
        name: String,
        #[arg(long)]
        species: Species,
        /// FEMALE or MALE
        #[arg(long)]
        sex: AnimalSex,
    },
    /// List the tenant's animals
    List,
}

#[derive(Subcommand)]
pub enum OffspringCommands {
    /// Register an offspring on a plan
    Add {
        plan_id: String,
        name: String,
    },
    /// Record an offspring's death
    Deceased {
        offspring_id: String,
    },
}

#[derive(Subcommand)]
pub enum WaitlistCommands {
    /// Put a buyer on a plan's waitlist
    Add {
        plan_id: String,
        buyer: String,
    },
}

/// Execute `breedplan init`: write the config file, generating a tenant ID
/// unless `--tenant` names one.
fn cmd_init(
    db_url: &str,
    tenant: Option<&str>,
    actor: Option<&str>,
    force: bool,
) -> anyhow::Result<()> {
    let path = config::config_path();

    if path.exists() && !force {
        anyhow::bail!(
            "config file already exists at {}\nUse --force to overwrite.",
            path.display()
        );
    }

    let tenant_id = match tenant {
        Some(raw) => output::parse_id(raw, "tenant")?,
        None => Uuid::new_v4(),
    };

    let cfg = config::ConfigFile {
        database: config::DatabaseSection {
            url: db_url.to_string(),
        },
        tenant: config::TenantSection {
            id: tenant_id,
            actor: actor.map(str::to_owned),
        },
    };

    config::save_config(&cfg)?;

    println!("Config written to {}", path.display());
    println!("  database.url = {db_url}");
    println!("  tenant.id = {tenant_id}");
    if let Some(actor) = actor {
        println!("  tenant.actor = {actor}");
    }
    println!();
    println!("Next: run `breedplan db-init` to create and migrate the database.");

    Ok(())
}

/// Execute `breedplan db-init`: create database and run migrations.
async fn cmd_db_init(cli_db_url: Option<&str>) -> anyhow::Result<()> {
    let db_config = BreedplanConfig::resolve_db(cli_db_url);

    println!("Initializing breedplan database...");

    pool::ensure_database_exists(&db_config).await?;
    let db_pool = pool::create_pool(&db_config).await?;
    pool::run_migrations(&db_pool).await?;

    let counts = pool::table_counts(&db_pool).await?;
    println!("Database ready. Tables:");
    for (table, count) in &counts {
        println!("  {table}: {count} rows");
    }

    db_pool.close().await;

    println!("breedplan db-init complete.");
    Ok(())
}

async fn connect(resolved: &BreedplanConfig) -> anyhow::Result<PgPool> {
    tracing::debug!(
        tenant_id = %resolved.tenant_id,
        actor = %resolved.actor,
        "connecting to {}",
        resolved.db_config.database_name().unwrap_or("?")
    );
    pool::create_pool(&resolved.db_config).await
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let overrides = cli.overrides();

    match &cli.command {
        Commands::Init { db_url, force } => {
            cmd_init(db_url, cli.tenant.as_deref(), cli.actor.as_deref(), *force)?;
        }
        Commands::DbInit => {
            cmd_db_init(cli.database_url.as_deref()).await?;
        }
        Commands::Project {
            species,
            mode,
            date,
        } => {
            project_cmd::run_project(*species, *mode, *date)?;
        }
        Commands::Completions { shell } => {
            clap_complete::generate(
                *shell,
                &mut Cli::command(),
                "breedplan",
                &mut std::io::stdout(),
            );
        }
        Commands::Plan { command } => {
            let resolved = BreedplanConfig::resolve(overrides)?;
            let db_pool = connect(&resolved).await?;
            let lifecycle = PlanLifecycle::new(db_pool.clone());
            let result =
                plan_cmds::run_plan_command(command, &lifecycle, &resolved.request_context())
                    .await;
            db_pool.close().await;
            result?;
        }
        Commands::Animal { command } => {
            let resolved = BreedplanConfig::resolve(overrides)?;
            let db_pool = connect(&resolved).await?;
            let result =
                animal_cmds::run_animal_command(command, &db_pool, &resolved.request_context())
                    .await;
            db_pool.close().await;
            result?;
        }
        Commands::Offspring { command } => {
            let resolved = BreedplanConfig::resolve(overrides)?;
            let db_pool = connect(&resolved).await?;
            let lifecycle = PlanLifecycle::new(db_pool.clone());
            let result = animal_cmds::run_offspring_command(
                command,
                &lifecycle,
                &resolved.request_context(),
            )
            .await;
            db_pool.close().await;
            result?;
        }
        Commands::Waitlist { command } => {
            let resolved = BreedplanConfig::resolve(overrides)?;
            let db_pool = connect(&resolved).await?;
            let lifecycle = PlanLifecycle::new(db_pool.clone());
            let result = animal_cmds::run_waitlist_command(
                command,
                &lifecycle,
                &resolved.request_context(),
            )
            .await;
            db_pool.close().await;
            result?;
        }
    }

    Ok(())
}

#[cfg(test)]
pub(crate) mod test_util {
    use std::sync::{Mutex, MutexGuard};

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    /// Serialize tests that mutate process environment variables.
    pub fn lock_env() -> MutexGuard<'static, ()> {
        ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_lock_with_anchor_mode_and_method() {
        let cli = Cli::try_parse_from([
            "breedplan",
            "--tenant",
            "00000000-0000-0000-0000-000000000001",
            "plan",
            "lock",
            "3c1d4a70-0000-4000-8000-000000000000",
            "--mode",
            "ovulation",
            "--date",
            "2024-03-14",
            "--method",
            "PROGESTERONE_TEST",
        ])
        .unwrap();

        assert_eq!(
            cli.tenant.as_deref(),
            Some("00000000-0000-0000-0000-000000000001")
        );
        match cli.command {
            Commands::Plan {
                command:
                    PlanCommands::Lock {
                        mode, date, method, ..
                    },
            } => {
                assert_eq!(mode, ReproAnchorMode::Ovulation);
                assert_eq!(date, NaiveDate::from_ymd_opt(2024, 3, 14).unwrap());
                assert_eq!(method, Some(OvulationMethod::ProgesteroneTest));
            }
            _ => panic!("expected plan lock"),
        }
    }

    #[test]
    fn global_flags_accepted_after_subcommand() {
        let cli = Cli::try_parse_from([
            "breedplan",
            "plan",
            "list",
            "--all",
            "--actor",
            "kennel-ops",
        ])
        .unwrap();
        assert_eq!(cli.actor.as_deref(), Some("kennel-ops"));
        assert!(matches!(
            cli.command,
            Commands::Plan {
                command: PlanCommands::List { all: true }
            }
        ));
    }

    #[test]
    fn update_collects_repeated_date_flags() {
        let cli = Cli::try_parse_from([
            "breedplan",
            "plan",
            "update",
            "3c1d4a70-0000-4000-8000-000000000000",
            "--set",
            "birth_date_actual=2024-05-02",
            "--set",
            "weaned_date_actual=2024-06-27",
            "--clear",
            "expected_weaned_date",
        ])
        .unwrap();
        match cli.command {
            Commands::Plan {
                command:
                    PlanCommands::Update {
                        set_dates,
                        clear_dates,
                        ..
                    },
            } => {
                assert_eq!(set_dates.len(), 2);
                assert_eq!(clear_dates, vec![DateField::ExpectedWeanedDate]);
            }
            _ => panic!("expected plan update"),
        }
    }

    #[test]
    fn rejects_unknown_species() {
        let result = Cli::try_parse_from([
            "breedplan",
            "project",
            "--species",
            "DRAGON",
            "--date",
            "2024-01-01",
        ]);
        assert!(result.is_err());
    }
}
