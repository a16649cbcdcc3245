//! Configuration file management for breedplan.
//!
//! Provides a TOML-based config file at `~/.config/breedplan/config.toml` and
//! a resolution chain: CLI flag > env var > config file > default.

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use breedplan_core::RequestContext;
use breedplan_db::config::DbConfig;

/// Actor recorded on events when nothing else names one.
pub const DEFAULT_ACTOR: &str = "breedplan";

// -----------------------------------------------------------------------
// Config file types
// -----------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize)]
pub struct ConfigFile {
    pub database: DatabaseSection,
    pub tenant: TenantSection,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DatabaseSection {
    pub url: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TenantSection {
    /// Tenant every command acts within.
    pub id: Uuid,
    /// Name written to `recorded_by` on plan events.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor: Option<String>,
}

// -----------------------------------------------------------------------
// Paths
// -----------------------------------------------------------------------

/// Return the breedplan config directory.
///
/// Always uses XDG layout: `$XDG_CONFIG_HOME/breedplan` or
/// `~/.config/breedplan`, including on macOS.
pub fn config_dir() -> PathBuf {
    if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
        return PathBuf::from(xdg).join("breedplan");
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
        .join("breedplan")
}

pub fn config_path() -> PathBuf {
    config_dir().join("config.toml")
}

// -----------------------------------------------------------------------
// Read / write
// -----------------------------------------------------------------------

/// Load and parse the config file. Returns an error if it does not exist.
pub fn load_config() -> Result<ConfigFile> {
    let path = config_path();
    let contents = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read config file at {}", path.display()))?;
    parse_config(&contents)
}

fn parse_config(contents: &str) -> Result<ConfigFile> {
    toml::from_str(contents).context("failed to parse config file")
}

/// Serialize and write the config file, creating parent dirs as needed.
/// Sets file permissions to 0600 on Unix.
pub fn save_config(config: &ConfigFile) -> Result<()> {
    let path = config_path();
    let dir = config_dir();
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("failed to create config directory {}", dir.display()))?;

    let contents = toml::to_string_pretty(config).context("failed to serialize config")?;
    std::fs::write(&path, &contents)
        .with_context(|| format!("failed to write config file at {}", path.display()))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        std::fs::set_permissions(&path, perms)
            .with_context(|| format!("failed to set permissions on {}", path.display()))?;
    }

    Ok(())
}

// -----------------------------------------------------------------------
// Resolved config
// -----------------------------------------------------------------------

/// Flag values that take precedence over the environment and config file.
#[derive(Debug, Default, Clone, Copy)]
pub struct Overrides<'a> {
    pub database_url: Option<&'a str>,
    pub tenant: Option<&'a str>,
    pub actor: Option<&'a str>,
}

/// Fully resolved configuration, ready for use.
#[derive(Debug)]
pub struct BreedplanConfig {
    pub db_config: DbConfig,
    pub tenant_id: Uuid,
    pub actor: String,
}

impl BreedplanConfig {
    /// Resolve configuration using the chain: CLI flag > env var > config file > default.
    ///
    /// - DB URL: `--database-url` > `BREEDPLAN_DATABASE_URL` > `database.url` > `DbConfig::DEFAULT_URL`
    /// - Tenant: `--tenant` > `BREEDPLAN_TENANT_ID` > `tenant.id` > error
    /// - Actor: `--actor` > `BREEDPLAN_ACTOR` > `tenant.actor` > `$USER` > `breedplan`
    pub fn resolve(overrides: Overrides<'_>) -> Result<Self> {
        let file_config = load_config().ok();
        let db_config = resolve_db(overrides.database_url, file_config.as_ref());

        let tenant_id = if let Some(raw) = overrides.tenant {
            parse_tenant(raw, "--tenant")?
        } else if let Ok(raw) = std::env::var("BREEDPLAN_TENANT_ID") {
            parse_tenant(&raw, "BREEDPLAN_TENANT_ID")?
        } else if let Some(ref cfg) = file_config {
            cfg.tenant.id
        } else {
            bail!(
                "tenant id not found; pass --tenant, set BREEDPLAN_TENANT_ID or run `breedplan init`"
            );
        };

        let actor = overrides
            .actor
            .map(str::to_owned)
            .or_else(|| std::env::var("BREEDPLAN_ACTOR").ok())
            .or_else(|| file_config.as_ref().and_then(|c| c.tenant.actor.clone()))
            .or_else(|| std::env::var("USER").ok())
            .filter(|a| !a.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_ACTOR.to_owned());

        Ok(Self {
            db_config,
            tenant_id,
            actor,
        })
    }

    /// Resolve only the database settings. `db-init` runs before any tenant
    /// exists, so it must not require one.
    pub fn resolve_db(cli_db_url: Option<&str>) -> DbConfig {
        resolve_db(cli_db_url, load_config().ok().as_ref())
    }

    pub fn request_context(&self) -> RequestContext {
        RequestContext::new(self.tenant_id, self.actor.clone())
    }
}

fn resolve_db(cli_db_url: Option<&str>, file_config: Option<&ConfigFile>) -> DbConfig {
    let db_url = if let Some(url) = cli_db_url {
        url.to_string()
    } else if let Ok(url) = std::env::var("BREEDPLAN_DATABASE_URL") {
        url
    } else if let Some(cfg) = file_config {
        cfg.database.url.clone()
    } else {
        DbConfig::DEFAULT_URL.to_string()
    };
    DbConfig::new(db_url)
}

fn parse_tenant(raw: &str, source: &str) -> Result<Uuid> {
    Uuid::parse_str(raw.trim()).with_context(|| format!("{source} is not a valid UUID: {raw:?}"))
}

// -----------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn lock_env() -> std::sync::MutexGuard<'static, ()> {
        crate::test_util::lock_env()
    }

    const TENANT: &str = "8f1c2a34-5b6d-4e7f-8091-a2b3c4d5e6f7";

    /// Point config discovery at an empty temp dir and clear every
    /// BREEDPLAN_* variable. The returned dir must outlive the test.
    fn isolate_env() -> tempfile::TempDir {
        let tmp = tempfile::TempDir::new().unwrap();
        unsafe { std::env::set_var("XDG_CONFIG_HOME", tmp.path()) };
        for var in [
            "BREEDPLAN_DATABASE_URL",
            "BREEDPLAN_TENANT_ID",
            "BREEDPLAN_ACTOR",
        ] {
            unsafe { std::env::remove_var(var) };
        }
        tmp
    }

    #[test]
    fn config_file_parses_with_and_without_actor() {
        let with_actor = parse_config(&format!(
            "[database]\nurl = \"postgresql://db:5432/x\"\n\n[tenant]\nid = \"{TENANT}\"\nactor = \"kennel-ops\"\n"
        ))
        .unwrap();
        assert_eq!(with_actor.database.url, "postgresql://db:5432/x");
        assert_eq!(with_actor.tenant.id.to_string(), TENANT);
        assert_eq!(with_actor.tenant.actor.as_deref(), Some("kennel-ops"));

        let without = parse_config(&format!(
            "[database]\nurl = \"postgresql://db:5432/x\"\n\n[tenant]\nid = \"{TENANT}\"\n"
        ))
        .unwrap();
        assert!(without.tenant.actor.is_none());
    }

    #[test]
    fn config_file_rejects_malformed_tenant_id() {
        let err = parse_config("[database]\nurl = \"x\"\n\n[tenant]\nid = \"not-a-uuid\"\n")
            .unwrap_err();
        assert!(err.to_string().contains("failed to parse config file"));
    }

    #[cfg(unix)]
    #[test]
    fn save_config_writes_owner_only_file() {
        use std::os::unix::fs::PermissionsExt;

        let _lock = lock_env();
        let tmp = isolate_env();

        let cfg = ConfigFile {
            database: DatabaseSection {
                url: "postgresql://testhost:5432/testdb".to_string(),
            },
            tenant: TenantSection {
                id: Uuid::parse_str(TENANT).unwrap(),
                actor: None,
            },
        };
        save_config(&cfg).unwrap();

        let path = tmp.path().join("breedplan").join("config.toml");
        let meta = std::fs::metadata(&path).unwrap();
        assert_eq!(meta.permissions().mode() & 0o777, 0o600);

        let loaded = load_config().unwrap();
        assert_eq!(loaded.database.url, cfg.database.url);
        assert_eq!(loaded.tenant.id, cfg.tenant.id);

        unsafe { std::env::remove_var("XDG_CONFIG_HOME") };
    }

    #[test]
    fn resolve_with_cli_flags_overrides_all() {
        let _lock = lock_env();
        let _tmp = isolate_env();

        unsafe { std::env::set_var("BREEDPLAN_DATABASE_URL", "postgresql://env:5432/envdb") };
        unsafe {
            std::env::set_var("BREEDPLAN_TENANT_ID", "00000000-0000-0000-0000-000000000001")
        };
        unsafe { std::env::set_var("BREEDPLAN_ACTOR", "env-actor") };

        let config = BreedplanConfig::resolve(Overrides {
            database_url: Some("postgresql://cli:5432/clidb"),
            tenant: Some(TENANT),
            actor: Some("cli-actor"),
        })
        .unwrap();
        assert_eq!(config.db_config.database_url, "postgresql://cli:5432/clidb");
        assert_eq!(config.tenant_id.to_string(), TENANT);
        assert_eq!(config.actor, "cli-actor");

        unsafe { std::env::remove_var("BREEDPLAN_DATABASE_URL") };
        unsafe { std::env::remove_var("BREEDPLAN_TENANT_ID") };
        unsafe { std::env::remove_var("BREEDPLAN_ACTOR") };
        unsafe { std::env::remove_var("XDG_CONFIG_HOME") };
    }

    #[test]
    fn resolve_with_env_vars_overrides_config_file() {
        let _lock = lock_env();
        let tmp = isolate_env();

        let dir = tmp.path().join("breedplan");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(
            dir.join("config.toml"),
            "[database]\nurl = \"postgresql://file:5432/filedb\"\n\n[tenant]\nid = \"00000000-0000-0000-0000-000000000002\"\nactor = \"file-actor\"\n",
        )
        .unwrap();

        unsafe { std::env::set_var("BREEDPLAN_DATABASE_URL", "postgresql://env:5432/envdb") };
        unsafe { std::env::set_var("BREEDPLAN_TENANT_ID", TENANT) };

        let config = BreedplanConfig::resolve(Overrides::default()).unwrap();
        assert_eq!(config.db_config.database_url, "postgresql://env:5432/envdb");
        assert_eq!(config.tenant_id.to_string(), TENANT);
        assert_eq!(config.actor, "file-actor");

        unsafe { std::env::remove_var("BREEDPLAN_DATABASE_URL") };
        unsafe { std::env::remove_var("BREEDPLAN_TENANT_ID") };
        unsafe { std::env::remove_var("XDG_CONFIG_HOME") };
    }

    #[test]
    fn resolve_errors_when_no_tenant() {
        let _lock = lock_env();
        let _tmp = isolate_env();

        let result = BreedplanConfig::resolve(Overrides {
            database_url: Some("postgresql://localhost:5432/breedplan"),
            ..Overrides::default()
        });
        unsafe { std::env::remove_var("XDG_CONFIG_HOME") };

        let msg = result.unwrap_err().to_string();
        assert!(msg.contains("tenant id not found"), "unexpected error: {msg}");
    }

    #[test]
    fn resolve_rejects_malformed_tenant_flag() {
        let _lock = lock_env();
        let _tmp = isolate_env();

        let result = BreedplanConfig::resolve(Overrides {
            tenant: Some("kennel-7"),
            ..Overrides::default()
        });
        unsafe { std::env::remove_var("XDG_CONFIG_HOME") };

        let msg = result.unwrap_err().to_string();
        assert!(msg.contains("--tenant is not a valid UUID"), "unexpected error: {msg}");
    }

    #[test]
    fn resolve_db_defaults_when_nothing_set() {
        let _lock = lock_env();
        let _tmp = isolate_env();

        let db = BreedplanConfig::resolve_db(None);
        unsafe { std::env::remove_var("XDG_CONFIG_HOME") };

        assert_eq!(db.database_url, DbConfig::DEFAULT_URL);
    }

    #[test]
    fn config_path_ends_with_expected_filename() {
        let path = config_path();
        assert!(
            path.ends_with("breedplan/config.toml"),
            "unexpected config path: {}",
            path.display()
        );
    }
}
