use std::env;
use std::time::Duration;

/// Database configuration.
///
/// Reads `BREEDPLAN_DATABASE_URL` and `BREEDPLAN_DB_MAX_CONNECTIONS` from the
/// environment, falling back to `postgresql://localhost:5432/breedplan` and a
/// pool of five connections.
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// Full PostgreSQL connection URL.
    pub database_url: String,
    /// Upper bound on pooled connections.
    pub max_connections: u32,
    /// How long to wait for a free connection before failing.
    pub acquire_timeout: Duration,
}

impl DbConfig {
    /// The default connection URL used when no environment variable is set.
    pub const DEFAULT_URL: &str = "postgresql://localhost:5432/breedplan";

    pub const DEFAULT_MAX_CONNECTIONS: u32 = 5;

    /// Build a config from the environment.
    ///
    /// An unparsable `BREEDPLAN_DB_MAX_CONNECTIONS` falls back to the default.
    pub fn from_env() -> Self {
        let database_url = env::var("BREEDPLAN_DATABASE_URL")
            .unwrap_or_else(|_| Self::DEFAULT_URL.to_owned());
        let max_connections = env::var("BREEDPLAN_DB_MAX_CONNECTIONS")
            .ok()
            .and_then(|v| v.parse().ok())
            .filter(|n: &u32| *n > 0)
            .unwrap_or(Self::DEFAULT_MAX_CONNECTIONS);
        Self {
            max_connections,
            ..Self::new(database_url)
        }
    }

    /// Build a config from an explicit URL (useful for tests and CLI flags).
    pub fn new(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            max_connections: Self::DEFAULT_MAX_CONNECTIONS,
            acquire_timeout: Duration::from_secs(10),
        }
    }

    /// Extract the database name from the URL, ignoring any query string.
    pub fn database_name(&self) -> Option<&str> {
        let without_query = self.database_url.split('?').next()?;
        without_query.rsplit('/').next().filter(|s| !s.is_empty())
    }

    /// URL of the `postgres` maintenance database on the same server, used
    /// to issue `CREATE DATABASE` for a fresh install.
    pub fn maintenance_url(&self) -> String {
        match self.database_url.rfind('/') {
            Some(pos) => format!("{}/postgres", &self.database_url[..pos]),
            None => self.database_url.clone(),
        }
    }
}

impl Default for DbConfig {
    fn default() -> Self {
        Self::from_env()
    }
}
