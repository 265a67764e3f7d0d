//! Database bootstrap state machine.
//!
//! Bootstrap brings a PostgreSQL cluster from nothing to a ready,
//! migrated application database:
//!
//! ```text
//! NoRole ──create role──▶ NoDatabase ──create database──▶ Ready ──▶ migrate
//! ```
//!
//! The current state is never asked for directly. It is inferred by trying
//! to connect with progressively narrower credentials: the application role
//! on the application database, the application role on the maintenance
//! database, and finally the passwordless bootstrap superuser. Whichever
//! probe succeeds first names the state. Each run starts from the top, so an
//! interrupted bootstrap is simply run again.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use sqlx::postgres::PgConnection;
use sqlx::{Connection, Executor};
use tracing::{debug, error, info, warn};

use commonplace_core::{Error, Progress, Result};

use crate::config::{DbConfig, DsnKind};
use crate::schema::SchemaDocument;

/// SQLSTATE codes meaning "these credentials cannot open this database".
const REFUSED_SQLSTATES: &[&str] = &[
    "28000", // invalid_authorization_specification (unknown role)
    "28P01", // invalid_password
    "3D000", // invalid_catalog_name (database does not exist)
];

/// Bootstrap progress, each state a prerequisite for the next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootstrapState {
    /// The application role does not exist yet.
    NoRole,
    /// The role exists, the application database does not.
    NoDatabase,
    /// Role and database exist; the schema can be migrated.
    Ready,
}

impl BootstrapState {
    /// State implied by the first probe that connected.
    pub fn from_probe(kind: DsnKind) -> Self {
        match kind {
            DsnKind::Full => BootstrapState::Ready,
            DsnKind::NoDatabase => BootstrapState::NoDatabase,
            DsnKind::Bootstrap => BootstrapState::NoRole,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BootstrapState::NoRole => "no_role",
            BootstrapState::NoDatabase => "no_database",
            BootstrapState::Ready => "ready",
        }
    }
}

/// Cluster operations the bootstrap needs.
#[async_trait]
pub trait BootstrapBackend: Send + Sync {
    /// Whether a connection with these credentials succeeds.
    ///
    /// Returns `Ok(false)` when the server refuses the credentials or the
    /// database; other failures (server unreachable) are errors.
    async fn can_connect(&self, kind: DsnKind) -> Result<bool>;

    /// Create the application role as the bootstrap superuser.
    async fn create_role(&self) -> Result<()>;

    /// Create the application database as the application role.
    async fn create_database(&self) -> Result<()>;

    /// Apply the schema document on the application database.
    async fn migrate(&self, schema: &SchemaDocument, progress: &Progress) -> Result<bool>;

    fn role_name(&self) -> &str;

    fn database_name(&self) -> &str;
}

/// Infer the bootstrap state from connection probes.
///
/// Fails with `Error::BootstrapFailed` when no credentials connect at all.
pub async fn determine_state<B>(backend: &B) -> Result<BootstrapState>
where
    B: BootstrapBackend + ?Sized,
{
    for kind in DsnKind::PROBE_ORDER {
        if backend.can_connect(kind).await? {
            let state = BootstrapState::from_probe(kind);
            debug!(
                subsystem = "maintenance",
                component = "bootstrap",
                op = "probe",
                dsn = kind.as_str(),
                bootstrap_state = state.as_str(),
                "Probe connected"
            );
            return Ok(state);
        }
        warn!(
            subsystem = "maintenance",
            component = "bootstrap",
            op = "probe",
            dsn = kind.as_str(),
            "Probe refused"
        );
    }
    Err(Error::BootstrapFailed(
        "No way to connect to the given database found".to_string(),
    ))
}

/// `NoRole` transition: create the role, then re-probe.
pub async fn create_role_step<B>(backend: &B, progress: &Progress) -> Result<BootstrapState>
where
    B: BootstrapBackend + ?Sized,
{
    progress.emit(format!(
        "User {} does not exist, creating",
        backend.role_name()
    ));
    backend.create_role().await?;
    let state = determine_state(backend).await?;
    if state == BootstrapState::NoRole {
        return Err(Error::BootstrapFailed(format!(
            "Logging in with created role {} does not work",
            backend.role_name()
        )));
    }
    Ok(state)
}

/// `NoDatabase` transition: create the database, then re-probe.
pub async fn create_database_step<B>(backend: &B, progress: &Progress) -> Result<BootstrapState>
where
    B: BootstrapBackend + ?Sized,
{
    progress.emit(format!(
        "Connected as {}, creating database {}",
        backend.role_name(),
        backend.database_name()
    ));
    backend.create_database().await?;
    let state = determine_state(backend).await?;
    if state != BootstrapState::Ready {
        return Err(Error::BootstrapFailed(format!(
            "Opening database {} does not work",
            backend.database_name()
        )));
    }
    Ok(state)
}

/// `Ready` transition: load the schema document and migrate to it.
pub async fn migrate_step<B>(backend: &B, schema_path: &Path, progress: &Progress) -> Result<bool>
where
    B: BootstrapBackend + ?Sized,
{
    progress.emit(format!(
        "Connected to database {} as {}, migrating schema to latest version",
        backend.database_name(),
        backend.role_name()
    ));
    let schema = SchemaDocument::load(schema_path).await?;
    backend.migrate(&schema, progress).await
}

/// Run the whole bootstrap from the top.
pub async fn bootstrap<B>(backend: &B, schema_path: &Path, progress: &Progress) -> Result<()>
where
    B: BootstrapBackend + ?Sized,
{
    let mut state = determine_state(backend).await?;
    info!(
        subsystem = "maintenance",
        component = "bootstrap",
        bootstrap_state = state.as_str(),
        "Starting bootstrap"
    );

    if state == BootstrapState::NoRole {
        state = create_role_step(backend, progress).await?;
    }
    if state == BootstrapState::NoDatabase {
        state = create_database_step(backend, progress).await?;
    }
    if state != BootstrapState::Ready {
        error!(
            subsystem = "maintenance",
            component = "bootstrap",
            bootstrap_state = state.as_str(),
            "Bootstrap did not reach ready state"
        );
        return Err(Error::BootstrapFailed(format!(
            "Opening database {} does not work",
            backend.database_name()
        )));
    }

    migrate_step(backend, schema_path, progress).await?;
    progress.emit("Done bootstrapping");
    Ok(())
}

// =============================================================================
// POSTGRESQL BACKEND
// =============================================================================

/// Bootstrap backend talking to a real PostgreSQL cluster.
pub struct PgBootstrap {
    config: DbConfig,
}

impl PgBootstrap {
    /// Validates role and database names up front; DDL cannot bind them.
    pub fn new(config: DbConfig) -> Result<Self> {
        validate_identifier(&config.user)?;
        validate_identifier(&config.database)?;
        Ok(Self { config })
    }

    pub fn schema_path(&self) -> PathBuf {
        self.config.schema_file.clone()
    }

    async fn open(&self, kind: DsnKind) -> Result<Option<PgConnection>> {
        match PgConnection::connect_with(&self.config.connect_options(kind)).await {
            Ok(conn) => Ok(Some(conn)),
            Err(sqlx::Error::Database(db_err))
                if db_err
                    .code()
                    .is_some_and(|code| REFUSED_SQLSTATES.contains(&code.as_ref())) =>
            {
                debug!(
                    subsystem = "maintenance",
                    component = "bootstrap",
                    dsn = %self.config.display_dsn(kind),
                    error = %db_err,
                    "Connection refused"
                );
                Ok(None)
            }
            Err(e) => Err(Error::from(e)),
        }
    }

    async fn open_required(&self, kind: DsnKind) -> Result<PgConnection> {
        self.open(kind).await?.ok_or_else(|| {
            Error::BootstrapFailed(format!(
                "Cannot connect as {}",
                self.config.display_dsn(kind)
            ))
        })
    }
}

#[async_trait]
impl BootstrapBackend for PgBootstrap {
    async fn can_connect(&self, kind: DsnKind) -> Result<bool> {
        match self.open(kind).await? {
            Some(conn) => {
                conn.close().await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn create_role(&self) -> Result<()> {
        let mut conn = self.open_required(DsnKind::Bootstrap).await?;
        let sql = create_role_sql(&self.config.user, &self.config.password)?;
        conn.execute(sql.as_str()).await?;
        conn.close().await?;
        Ok(())
    }

    async fn create_database(&self) -> Result<()> {
        let mut conn = self.open_required(DsnKind::NoDatabase).await?;
        let sql = create_database_sql(&self.config.database, &self.config.user)?;
        conn.execute(sql.as_str()).await?;
        conn.close().await?;
        Ok(())
    }

    async fn migrate(&self, schema: &SchemaDocument, progress: &Progress) -> Result<bool> {
        let mut conn = self.open_required(DsnKind::Full).await?;
        let applied = schema.apply(&mut conn, progress).await?;
        conn.close().await?;
        Ok(applied)
    }

    fn role_name(&self) -> &str {
        &self.config.user
    }

    fn database_name(&self) -> &str {
        &self.config.database
    }
}

// =============================================================================
// DDL HELPERS
// =============================================================================

/// Validate a role or database name.
///
/// Names must be 1-63 characters, start with a letter or underscore, and
/// contain only ASCII alphanumerics and underscores.
pub fn validate_identifier(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::InvalidInput(
            "Identifier cannot be empty".to_string(),
        ));
    }
    if name.len() > 63 {
        return Err(Error::InvalidInput(format!(
            "Identifier exceeds 63 character limit: {} characters",
            name.len()
        )));
    }
    if let Some(first) = name.chars().next() {
        if !first.is_ascii_alphabetic() && first != '_' {
            return Err(Error::InvalidInput(format!(
                "Identifier must start with a letter or underscore, found: '{}'",
                first
            )));
        }
    }
    if let Some(ch) = name
        .chars()
        .find(|ch| !ch.is_ascii_alphanumeric() && *ch != '_')
    {
        return Err(Error::InvalidInput(format!(
            "Identifier contains invalid character: '{}'",
            ch
        )));
    }
    Ok(())
}

/// Double-quote an SQL identifier.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Single-quote an SQL string literal.
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

fn create_role_sql(role: &str, password: &str) -> Result<String> {
    validate_identifier(role)?;
    Ok(format!(
        "CREATE ROLE {} WITH SUPERUSER LOGIN PASSWORD {}",
        quote_ident(role),
        quote_literal(password)
    ))
}

fn create_database_sql(database: &str, owner: &str) -> Result<String> {
    validate_identifier(database)?;
    validate_identifier(owner)?;
    Ok(format!(
        "CREATE DATABASE {} OWNER {}",
        quote_ident(database),
        quote_ident(owner)
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::Mutex;

    use commonplace_core::progress::drain;

    #[derive(Default)]
    struct Cluster {
        role: bool,
        database: bool,
        superuser: bool,
        migrations: usize,
        calls: Vec<&'static str>,
    }

    /// In-memory cluster. `role_sticks` / `database_sticks` simulate DDL that
    /// reports success but does not take effect.
    struct FakeBackend {
        cluster: Mutex<Cluster>,
        role_sticks: bool,
        database_sticks: bool,
    }

    impl FakeBackend {
        fn new(role: bool, database: bool) -> Self {
            Self {
                cluster: Mutex::new(Cluster {
                    role,
                    database,
                    superuser: true,
                    ..Default::default()
                }),
                role_sticks: true,
                database_sticks: true,
            }
        }

        fn calls(&self) -> Vec<&'static str> {
            self.cluster.lock().unwrap().calls.clone()
        }
    }

    #[async_trait]
    impl BootstrapBackend for FakeBackend {
        async fn can_connect(&self, kind: DsnKind) -> Result<bool> {
            let cluster = self.cluster.lock().unwrap();
            Ok(match kind {
                DsnKind::Full => cluster.role && cluster.database,
                DsnKind::NoDatabase => cluster.role,
                DsnKind::Bootstrap => cluster.superuser,
            })
        }

        async fn create_role(&self) -> Result<()> {
            let mut cluster = self.cluster.lock().unwrap();
            cluster.calls.push("create_role");
            cluster.role = self.role_sticks;
            Ok(())
        }

        async fn create_database(&self) -> Result<()> {
            let mut cluster = self.cluster.lock().unwrap();
            cluster.calls.push("create_database");
            cluster.database = self.database_sticks;
            Ok(())
        }

        async fn migrate(&self, _schema: &SchemaDocument, progress: &Progress) -> Result<bool> {
            progress.emit("Creating migration");
            let mut cluster = self.cluster.lock().unwrap();
            cluster.calls.push("migrate");
            cluster.migrations += 1;
            Ok(true)
        }

        fn role_name(&self) -> &str {
            "commonplace"
        }

        fn database_name(&self) -> &str {
            "commonplace"
        }
    }

    fn schema_file() -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "CREATE SCHEMA IF NOT EXISTS commonplace;").unwrap();
        file
    }

    #[tokio::test]
    async fn test_determine_state_from_probes() {
        assert_eq!(
            determine_state(&FakeBackend::new(true, true)).await.unwrap(),
            BootstrapState::Ready
        );
        assert_eq!(
            determine_state(&FakeBackend::new(true, false)).await.unwrap(),
            BootstrapState::NoDatabase
        );
        assert_eq!(
            determine_state(&FakeBackend::new(false, false)).await.unwrap(),
            BootstrapState::NoRole
        );
    }

    #[tokio::test]
    async fn test_determine_state_nothing_connects() {
        let backend = FakeBackend::new(false, false);
        backend.cluster.lock().unwrap().superuser = false;
        let err = determine_state(&backend).await.unwrap_err();
        assert!(matches!(err, Error::BootstrapFailed(_)));
    }

    #[tokio::test]
    async fn test_full_bootstrap_from_empty_cluster() {
        let backend = FakeBackend::new(false, false);
        let schema = schema_file();
        let (progress, mut rx) = Progress::channel();

        bootstrap(&backend, schema.path(), &progress).await.unwrap();

        assert_eq!(
            backend.calls(),
            vec!["create_role", "create_database", "migrate"]
        );
        let messages = drain(&mut rx);
        assert!(messages[0].starts_with("User commonplace does not exist"));
        assert_eq!(messages.last().unwrap(), "Done bootstrapping\n");
        assert!(messages.iter().all(|m| m.ends_with('\n')));
    }

    #[tokio::test]
    async fn test_bootstrap_ready_only_migrates() {
        let backend = FakeBackend::new(true, true);
        let schema = schema_file();

        bootstrap(&backend, schema.path(), &Progress::log_only())
            .await
            .unwrap();

        assert_eq!(backend.calls(), vec!["migrate"]);
    }

    #[tokio::test]
    async fn test_bootstrap_is_rerunnable() {
        let backend = FakeBackend::new(false, false);
        let schema = schema_file();

        bootstrap(&backend, schema.path(), &Progress::log_only())
            .await
            .unwrap();
        bootstrap(&backend, schema.path(), &Progress::log_only())
            .await
            .unwrap();

        assert_eq!(
            backend.calls(),
            vec!["create_role", "create_database", "migrate", "migrate"]
        );
    }

    #[tokio::test]
    async fn test_role_that_does_not_stick_is_fatal() {
        let mut backend = FakeBackend::new(false, false);
        backend.role_sticks = false;
        let schema = schema_file();

        let err = bootstrap(&backend, schema.path(), &Progress::log_only())
            .await
            .unwrap_err();

        assert!(matches!(err, Error::BootstrapFailed(_)));
        assert_eq!(backend.calls(), vec!["create_role"]);
    }

    #[tokio::test]
    async fn test_database_that_does_not_stick_is_fatal() {
        let mut backend = FakeBackend::new(true, false);
        backend.database_sticks = false;

        let err = create_database_step(&backend, &Progress::log_only())
            .await
            .unwrap_err();

        assert!(matches!(err, Error::BootstrapFailed(_)));
    }

    #[tokio::test]
    async fn test_missing_schema_file_after_database_created() {
        let backend = FakeBackend::new(true, false);
        let (progress, mut rx) = Progress::channel();

        let err = bootstrap(&backend, Path::new("/nonexistent/schema.sql"), &progress)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::SchemaFileMissing(_)));
        // Partial progress is still visible to the operator.
        assert_eq!(backend.calls(), vec!["create_database"]);
        assert!(drain(&mut rx)
            .iter()
            .any(|m| m.contains("creating database commonplace")));
    }

    #[test]
    fn test_state_from_probe() {
        assert_eq!(
            BootstrapState::from_probe(DsnKind::Full),
            BootstrapState::Ready
        );
        assert_eq!(
            BootstrapState::from_probe(DsnKind::NoDatabase),
            BootstrapState::NoDatabase
        );
        assert_eq!(
            BootstrapState::from_probe(DsnKind::Bootstrap),
            BootstrapState::NoRole
        );
    }

    #[test]
    fn test_validate_identifier() {
        assert!(validate_identifier("commonplace").is_ok());
        assert!(validate_identifier("_cp_2").is_ok());
        assert!(validate_identifier("").is_err());
        assert!(validate_identifier("1st").is_err());
        assert!(validate_identifier("drop table").is_err());
        assert!(validate_identifier(&"a".repeat(64)).is_err());
    }

    #[test]
    fn test_quoting() {
        assert_eq!(quote_ident("commonplace"), "\"commonplace\"");
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
        assert_eq!(quote_literal("it's"), "'it''s'");
    }

    #[test]
    fn test_ddl_statements() {
        assert_eq!(
            create_role_sql("commonplace", "s3cr'et").unwrap(),
            "CREATE ROLE \"commonplace\" WITH SUPERUSER LOGIN PASSWORD 's3cr''et'"
        );
        assert_eq!(
            create_database_sql("commonplace", "commonplace").unwrap(),
            "CREATE DATABASE \"commonplace\" OWNER \"commonplace\""
        );
        assert!(create_database_sql("bad-name", "commonplace").is_err());
    }

    #[test]
    fn test_pg_bootstrap_rejects_bad_names() {
        let config = DbConfig {
            database: "no spaces".to_string(),
            ..DbConfig::default()
        };
        assert!(PgBootstrap::new(config).is_err());
    }

    fn assert_send<T: Send>(_: T) {}

    #[tokio::test]
    async fn test_pg_bootstrap_runs_on_spawned_tasks() {
        fn migrate_future(doc: &SchemaDocument, conn: &mut PgConnection, progress: &Progress) {
            assert_send(doc.apply(conn, progress));
        }
        let _ = migrate_future;

        let backend = PgBootstrap::new(DbConfig::default()).unwrap();
        let path = backend.schema_path();
        let progress = Progress::log_only();
        assert_send(bootstrap(&backend, &path, &progress));
        assert_send(backend.create_role());
        assert_send(backend.create_database());
    }
}
