//! Configuration from environment variables.
//!
//! Environment variables (all optional):
//!
//! | Variable | Default |
//! |----------|---------|
//! | `DATABASE_URL` | built from the variables below |
//! | `COMMONPLACE_DB_HOST` | `localhost` |
//! | `COMMONPLACE_DB_PORT` | `5432` |
//! | `COMMONPLACE_DB_USER` | `commonplace` |
//! | `COMMONPLACE_DB_PASSWORD` | `commonplace` |
//! | `COMMONPLACE_DB_NAME` | `commonplace` |
//! | `COMMONPLACE_BOOTSTRAP_USER` | `postgres` |
//! | `COMMONPLACE_SCHEMA_FILE` | `schema/commonplace.sql` |
//! | `COMMONPLACE_POOL_MAX` | `16` |
//! | `COMMONPLACE_POOL_ACQUIRE_TIMEOUT_SECS` | `10` |
//! | `COMMONPLACE_DEBUG` | `false` |

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use sqlx::postgres::PgConnectOptions;
use tracing::debug;

use commonplace_core::{Error, Result};

use crate::pool::{PoolConfig, DEFAULT_ACQUIRE_TIMEOUT_SECS, DEFAULT_MAX_CONNECTIONS};

/// Maintenance database every PostgreSQL cluster has.
pub const MAINTENANCE_DATABASE: &str = "postgres";

/// Passwordless superuser present on a fresh cluster.
pub const DEFAULT_BOOTSTRAP_USER: &str = "postgres";

/// Which credentials a connection attempt uses, from widest to narrowest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DsnKind {
    /// Application role on the application database.
    Full,
    /// Application role on the maintenance database.
    NoDatabase,
    /// Passwordless bootstrap superuser on the maintenance database.
    Bootstrap,
}

impl DsnKind {
    pub const PROBE_ORDER: [DsnKind; 3] = [DsnKind::Full, DsnKind::NoDatabase, DsnKind::Bootstrap];

    pub fn as_str(&self) -> &'static str {
        match self {
            DsnKind::Full => "full",
            DsnKind::NoDatabase => "no_db",
            DsnKind::Bootstrap => "bootstrap",
        }
    }
}

/// Database settings shared by the pool, the bootstrap and the admin tool.
#[derive(Debug, Clone)]
pub struct DbConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
    pub bootstrap_user: String,
    pub schema_file: PathBuf,
    pub database_url: Option<String>,
    pub pool: PoolConfig,
    pub debug: bool,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            user: "commonplace".to_string(),
            password: "commonplace".to_string(),
            database: "commonplace".to_string(),
            bootstrap_user: DEFAULT_BOOTSTRAP_USER.to_string(),
            schema_file: PathBuf::from("schema/commonplace.sql"),
            database_url: None,
            pool: PoolConfig::default(),
            debug: false,
        }
    }
}

impl DbConfig {
    /// Read configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Whether `COMMONPLACE_DEBUG` is set, readable before logging is up.
    pub fn debug_from_env() -> bool {
        Self::debug_from_lookup(|key| std::env::var(key).ok())
    }

    pub fn debug_from_lookup<F>(lookup: F) -> bool
    where
        F: Fn(&str) -> Option<String>,
    {
        lookup("COMMONPLACE_DEBUG").is_some_and(|v| v == "true" || v == "1")
    }

    /// Read configuration through an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let string = |key: &str, default: String| lookup(key).unwrap_or(default);

        let port = parse_var(&lookup, "COMMONPLACE_DB_PORT", defaults.port)?;
        let max_connections =
            parse_var(&lookup, "COMMONPLACE_POOL_MAX", DEFAULT_MAX_CONNECTIONS)?;
        let acquire_timeout_secs = parse_var(
            &lookup,
            "COMMONPLACE_POOL_ACQUIRE_TIMEOUT_SECS",
            DEFAULT_ACQUIRE_TIMEOUT_SECS,
        )?;
        if max_connections == 0 {
            return Err(Error::Config(
                "COMMONPLACE_POOL_MAX must be at least 1".to_string(),
            ));
        }

        let config = Self {
            host: string("COMMONPLACE_DB_HOST", defaults.host),
            port,
            user: string("COMMONPLACE_DB_USER", defaults.user),
            password: string("COMMONPLACE_DB_PASSWORD", defaults.password),
            database: string("COMMONPLACE_DB_NAME", defaults.database),
            bootstrap_user: string("COMMONPLACE_BOOTSTRAP_USER", defaults.bootstrap_user),
            schema_file: lookup("COMMONPLACE_SCHEMA_FILE")
                .map(PathBuf::from)
                .unwrap_or(defaults.schema_file),
            database_url: lookup("DATABASE_URL"),
            pool: PoolConfig::default()
                .max_connections(max_connections)
                .acquire_timeout(Duration::from_secs(acquire_timeout_secs)),
            debug: Self::debug_from_lookup(&lookup),
        };

        debug!(
            subsystem = "admin",
            component = "config",
            host = %config.host,
            port = config.port,
            user = %config.user,
            database = %config.database,
            "Configuration loaded"
        );
        Ok(config)
    }

    /// Connection options for one of the probe credentials.
    pub fn connect_options(&self, kind: DsnKind) -> PgConnectOptions {
        let base = PgConnectOptions::new_without_pgpass()
            .host(&self.host)
            .port(self.port);
        match kind {
            DsnKind::Full => base
                .username(&self.user)
                .password(&self.password)
                .database(&self.database),
            DsnKind::NoDatabase => base
                .username(&self.user)
                .password(&self.password)
                .database(MAINTENANCE_DATABASE),
            DsnKind::Bootstrap => base
                .username(&self.bootstrap_user)
                .database(MAINTENANCE_DATABASE),
        }
    }

    /// Options for the application pool: `DATABASE_URL` if set, else the
    /// full credentials.
    pub fn pool_options(&self) -> Result<PgConnectOptions> {
        match &self.database_url {
            Some(url) => PgConnectOptions::from_str(url)
                .map_err(|e| Error::Config(format!("invalid DATABASE_URL: {e}"))),
            None => Ok(self.connect_options(DsnKind::Full)),
        }
    }

    /// Human-readable DSN without the password, for logs and progress.
    pub fn display_dsn(&self, kind: DsnKind) -> String {
        match kind {
            DsnKind::Full => format!(
                "postgres://{}@{}:{}/{}",
                self.user, self.host, self.port, self.database
            ),
            DsnKind::NoDatabase => format!(
                "postgres://{}@{}:{}/{}",
                self.user, self.host, self.port, MAINTENANCE_DATABASE
            ),
            DsnKind::Bootstrap => format!(
                "postgres://{}@{}:{}/{}",
                self.bootstrap_user, self.host, self.port, MAINTENANCE_DATABASE
            ),
        }
    }
}

fn parse_var<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| Error::Config(format!("{key}={raw:?}: {e}"))),
        None => Ok(default),
    }
}

/// Find the nearest `.env` file in `directory` or any of its ancestors.
pub fn find_dot_env(directory: &Path) -> Option<PathBuf> {
    if !directory.is_dir() {
        return None;
    }
    directory
        .ancestors()
        .map(|dir| dir.join(".env"))
        .find(|candidate| candidate.is_file())
}

/// Load the nearest `.env` above the working directory, if any.
///
/// Variables already set in the environment take precedence.
pub fn load_dot_env() -> Option<PathBuf> {
    let cwd = std::env::current_dir().ok()?;
    let path = find_dot_env(&cwd)?;
    dotenvy::from_path(&path).ok()?;
    Some(path)
}
