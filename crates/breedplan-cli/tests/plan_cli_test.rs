//! End-to-end tests for the `breedplan` binary.
//!
//! Each test runs the compiled CLI against its own temporary database, with
//! config discovery pointed at an empty directory so only flags apply.

use std::process::Output;

use tokio::process::Command;
use uuid::Uuid;

use breedplan_test_utils::{create_test_db, drop_test_db, pg_url};

struct Cli {
    db_url: String,
    tenant: Uuid,
    config_home: tempfile::TempDir,
}

impl Cli {
    async fn new(db_name: &str) -> Self {
        Self {
            db_url: format!("{}/{db_name}", pg_url().await),
            tenant: Uuid::new_v4(),
            config_home: tempfile::TempDir::new().expect("failed to create temp dir"),
        }
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(env!("CARGO_BIN_EXE_breedplan"));
        cmd.env("XDG_CONFIG_HOME", self.config_home.path())
            .env_remove("BREEDPLAN_DATABASE_URL")
            .env_remove("BREEDPLAN_TENANT_ID")
            .env_remove("BREEDPLAN_ACTOR")
            .env_remove("RUST_LOG");
        cmd
    }

    /// Run with the test database, tenant and a fixed actor.
    async fn run(&self, args: &[&str]) -> Output {
        self.command()
            .args(args)
            .args(["--database-url", &self.db_url])
            .args(["--tenant", &self.tenant.to_string()])
            .args(["--actor", "cli-test"])
            .output()
            .await
            .expect("failed to run breedplan binary")
    }

    async fn run_ok(&self, args: &[&str]) -> String {
        let out = self.run(args).await;
        assert!(
            out.status.success(),
            "breedplan {args:?} failed:\n{}",
            String::from_utf8_lossy(&out.stderr)
        );
        String::from_utf8_lossy(&out.stdout).into_owned()
    }

    async fn run_err(&self, args: &[&str]) -> String {
        let out = self.run(args).await;
        assert!(
            !out.status.success(),
            "breedplan {args:?} unexpectedly succeeded:\n{}",
            String::from_utf8_lossy(&out.stdout)
        );
        String::from_utf8_lossy(&out.stderr).into_owned()
    }
}

/// Pull the value printed after `label` (e.g. `Plan ID:`).
fn field(stdout: &str, label: &str) -> String {
    stdout
        .lines()
        .find_map(|line| line.trim().strip_prefix(label))
        .map(|rest| rest.trim().to_owned())
        .unwrap_or_else(|| panic!("no {label:?} in output:\n{stdout}"))
}

async fn register_pair(cli: &Cli) -> (String, String) {
    let dam = cli
        .run_ok(&["animal", "add", "Bella", "--species", "dog", "--sex", "F"])
        .await;
    let sire = cli
        .run_ok(&["animal", "add", "Duke", "--species", "dog", "--sex", "M"])
        .await;
    (field(&dam, "Animal ID:"), field(&sire, "Animal ID:"))
}

#[tokio::test]
async fn plan_lifecycle_through_the_binary() {
    let (pool, db_name) = create_test_db().await;
    let cli = Cli::new(&db_name).await;

    let (dam, sire) = register_pair(&cli).await;
    let created = cli
        .run_ok(&[
            "plan", "create", "Bella x Duke", "--species", "DOG", "--dam", &dam, "--sire", &sire,
        ])
        .await;
    let plan_id = field(&created, "Plan ID:");
    assert_eq!(field(&created, "Status:"), "PLANNING");

    let locked = cli
        .run_ok(&["plan", "lock", &plan_id, "--date", "2024-01-01"])
        .await;
    assert_eq!(field(&locked, "Status:"), "CYCLE");
    assert!(locked.contains("locked_due_date"), "{locked}");
    assert!(locked.contains("2024-03-16"), "{locked}");

    let committed = cli.run_ok(&["plan", "commit", &plan_id]).await;
    assert!(
        field(&committed, "Code:").starts_with("DOG-"),
        "{committed}"
    );
    assert_eq!(field(&committed, "Committed by:"), "cli-test");

    let listed = cli.run_ok(&["plan", "list"]).await;
    assert!(listed.contains(&plan_id), "{listed}");

    let events = cli.run_ok(&["plan", "events", &plan_id]).await;
    for kind in ["created", "anchor_locked", "committed"] {
        assert!(events.contains(kind), "missing {kind}:\n{events}");
    }
    assert!(events.contains("(cli-test)"), "{events}");

    let animals = cli.run_ok(&["animal", "list"]).await;
    assert!(animals.contains("yes"), "{animals}");

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn lifecycle_errors_are_reported_with_their_kind() {
    let (pool, db_name) = create_test_db().await;
    let cli = Cli::new(&db_name).await;

    let (dam, sire) = register_pair(&cli).await;
    let created = cli
        .run_ok(&[
            "plan", "create", "Bella x Duke", "--species", "DOG", "--dam", &dam, "--sire", &sire,
        ])
        .await;
    let plan_id = field(&created, "Plan ID:");

    let stderr = cli
        .run_err(&[
            "plan",
            "lock",
            &plan_id,
            "--mode",
            "BREEDING_DATE",
            "--date",
            "2024-01-01",
        ])
        .await;
    assert!(
        stderr.contains("[SPECIES_CAPABILITY_VIOLATION]"),
        "{stderr}"
    );

    cli.run_ok(&["plan", "lock", &plan_id, "--date", "2024-01-01"])
        .await;
    cli.run_ok(&["plan", "commit", &plan_id]).await;
    cli.run_ok(&["waitlist", "add", &plan_id, "Alice"]).await;

    let stderr = cli.run_err(&["plan", "uncommit", &plan_id]).await;
    assert!(stderr.contains("[CONFLICT]"), "{stderr}");
    assert!(
        stderr.contains("blocking: 0 offspring, 1 waitlist entries"),
        "{stderr}"
    );

    let stderr = cli.run_err(&["plan", "show", &Uuid::new_v4().to_string()]).await;
    assert!(stderr.contains("[NOT_FOUND]"), "{stderr}");

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn plans_are_invisible_to_other_tenants() {
    let (pool, db_name) = create_test_db().await;
    let owner = Cli::new(&db_name).await;
    let stranger = Cli::new(&db_name).await;

    let created = owner
        .run_ok(&["plan", "create", "Solo", "--species", "HORSE"])
        .await;
    let plan_id = field(&created, "Plan ID:");

    let stderr = stranger.run_err(&["plan", "show", &plan_id]).await;
    assert!(stderr.contains("[NOT_FOUND]"), "{stderr}");

    let listed = stranger.run_ok(&["plan", "list"]).await;
    assert!(listed.contains("No plans found"), "{listed}");

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn plan_commands_require_a_tenant() {
    let config_home = tempfile::TempDir::new().unwrap();
    let out = Command::new(env!("CARGO_BIN_EXE_breedplan"))
        .env("XDG_CONFIG_HOME", config_home.path())
        .env_remove("BREEDPLAN_TENANT_ID")
        .args(["plan", "list"])
        .output()
        .await
        .unwrap();

    assert!(!out.status.success());
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("tenant id not found"), "{stderr}");
}

#[tokio::test]
async fn project_needs_no_database() {
    let config_home = tempfile::TempDir::new().unwrap();
    let out = Command::new(env!("CARGO_BIN_EXE_breedplan"))
        .env("XDG_CONFIG_HOME", config_home.path())
        .args(["project", "--species", "dog", "--date", "2024-01-01"])
        .output()
        .await
        .unwrap();

    assert!(out.status.success());
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.contains("Ovulation"), "{stdout}");
    assert!(stdout.contains("2024-01-13"), "{stdout}");
    assert!(stdout.contains("2024-03-16"), "{stdout}");
    assert!(stdout.contains("MEDIUM"), "{stdout}");
}
