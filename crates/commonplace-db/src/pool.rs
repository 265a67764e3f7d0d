//! Database connection pool management.
//!
//! One [`ContentPool`] is created at process startup and passed to every
//! component that talks to the store. Connections are borrowed for one
//! logical operation through [`ContentPool::with_connection`] or
//! [`ContentPool::with_transaction`] and are returned to the pool on every
//! exit path, including cancellation of the calling future.

use std::time::{Duration, Instant};

use futures::future::BoxFuture;
use sqlx::postgres::{PgConnectOptions, PgConnection, PgPool, PgPoolOptions};
use tracing::{debug, info, warn};

use commonplace_core::{Error, Result};

/// Default maximum number of connections in the pool.
pub const DEFAULT_MAX_CONNECTIONS: u32 = 16;

/// Default time to wait for a free connection, in seconds.
pub const DEFAULT_ACQUIRE_TIMEOUT_SECS: u64 = 10;

/// Default idle timeout in seconds.
pub const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 600;

/// Pool configuration options.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Maximum number of connections in the pool.
    pub max_connections: u32,
    /// Minimum number of connections to maintain.
    pub min_connections: u32,
    /// How long `acquire` waits before failing with `PoolExhausted`.
    pub acquire_timeout: Duration,
    /// Idle connection timeout duration.
    pub idle_timeout: Duration,
    /// Maximum connection lifetime.
    pub max_lifetime: Option<Duration>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: DEFAULT_MAX_CONNECTIONS,
            min_connections: 0,
            acquire_timeout: Duration::from_secs(DEFAULT_ACQUIRE_TIMEOUT_SECS),
            idle_timeout: Duration::from_secs(DEFAULT_IDLE_TIMEOUT_SECS),
            max_lifetime: Some(Duration::from_secs(1800)), // 30 minutes
        }
    }
}

impl PoolConfig {
    /// Create a new pool configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum number of connections.
    pub fn max_connections(mut self, n: u32) -> Self {
        self.max_connections = n;
        self
    }

    /// Set the minimum number of connections.
    pub fn min_connections(mut self, n: u32) -> Self {
        self.min_connections = n;
        self
    }

    /// Set the acquire timeout.
    pub fn acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }

    /// Set the idle connection timeout.
    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Set the maximum connection lifetime.
    pub fn max_lifetime(mut self, lifetime: Option<Duration>) -> Self {
        self.max_lifetime = lifetime;
        self
    }

    fn pool_options(&self) -> PgPoolOptions {
        let mut options = PgPoolOptions::new()
            .max_connections(self.max_connections)
            .min_connections(self.min_connections)
            .acquire_timeout(self.acquire_timeout)
            .idle_timeout(self.idle_timeout);

        if let Some(max_lifetime) = self.max_lifetime {
            options = options.max_lifetime(max_lifetime);
        }
        options
    }
}

/// Bounded, process-wide pool of PostgreSQL connections.
///
/// Cloning is cheap and shares the same underlying pool.
#[derive(Debug, Clone)]
pub struct ContentPool {
    pool: PgPool,
}

impl ContentPool {
    /// Open a pool and establish its first connection.
    pub async fn connect(database_url: &str, config: PoolConfig) -> Result<Self> {
        let start = Instant::now();

        info!(
            subsystem = "database",
            component = "pool",
            op = "create",
            max_connections = config.max_connections,
            min_connections = config.min_connections,
            acquire_timeout_secs = config.acquire_timeout.as_secs(),
            idle_timeout_secs = config.idle_timeout.as_secs(),
            "Creating database connection pool"
        );

        let pool = config
            .pool_options()
            .connect(database_url)
            .await
            .map_err(Error::from)?;

        info!(
            subsystem = "database",
            component = "pool",
            op = "established",
            pool_size = pool.size(),
            pool_idle = pool.num_idle(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Database connection pool established"
        );
        Ok(Self { pool })
    }

    /// Open a pool from already parsed connect options.
    pub async fn connect_with(options: PgConnectOptions, config: PoolConfig) -> Result<Self> {
        let pool = config
            .pool_options()
            .connect_with(options)
            .await
            .map_err(Error::from)?;
        debug!(
            subsystem = "database",
            component = "pool",
            op = "established",
            pool_size = pool.size(),
            "Database connection pool established"
        );
        Ok(Self { pool })
    }

    /// Build a pool without connecting; connections open on first use.
    pub fn connect_lazy(database_url: &str, config: PoolConfig) -> Result<Self> {
        let options: PgConnectOptions = database_url
            .parse()
            .map_err(|e: sqlx::Error| Error::Config(format!("invalid database URL: {e}")))?;
        Ok(Self {
            pool: config.pool_options().connect_lazy_with(options),
        })
    }

    /// Wrap an existing sqlx pool.
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Get the underlying sqlx pool.
    pub fn inner(&self) -> &PgPool {
        &self.pool
    }

    /// Run `f` with one pooled connection.
    ///
    /// Waits for a free connection up to the configured acquire timeout and
    /// fails with `Error::PoolExhausted` after that. The connection goes back
    /// to the pool when this future completes or is dropped.
    ///
    /// ```rust,ignore
    /// let count = pool
    ///     .with_connection(|conn| {
    ///         Box::pin(async move {
    ///             let n: i64 = sqlx::query_scalar("SELECT count(*) FROM commonplace.note")
    ///                 .fetch_one(&mut *conn)
    ///                 .await?;
    ///             Ok(n)
    ///         })
    ///     })
    ///     .await?;
    /// ```
    pub async fn with_connection<T, F>(&self, f: F) -> Result<T>
    where
        F: for<'c> FnOnce(&'c mut PgConnection) -> BoxFuture<'c, Result<T>>,
    {
        let mut conn = self.pool.acquire().await.map_err(Error::from)?;
        f(&mut *conn).await
    }

    /// Run `f` inside a transaction on one pooled connection.
    ///
    /// Commits when `f` succeeds and rolls back when it fails, so a failing
    /// multi-row write never partially applies.
    pub async fn with_transaction<T, F>(&self, f: F) -> Result<T>
    where
        F: for<'c> FnOnce(&'c mut PgConnection) -> BoxFuture<'c, Result<T>>,
    {
        let mut tx = self.pool.begin().await.map_err(Error::from)?;
        match f(&mut *tx).await {
            Ok(value) => {
                tx.commit().await.map_err(Error::from)?;
                Ok(value)
            }
            Err(e) => {
                if let Err(rollback_err) = tx.rollback().await {
                    warn!(
                        subsystem = "database",
                        component = "pool",
                        op = "rollback",
                        error = %rollback_err,
                        "Rollback failed after error"
                    );
                }
                Err(e)
            }
        }
    }

    /// Drain and close the pool. Call once at shutdown.
    pub async fn close(&self) {
        self.pool.close().await;
        info!(
            subsystem = "database",
            component = "pool",
            op = "closed",
            "Database connection pool closed"
        );
    }

    pub fn is_closed(&self) -> bool {
        self.pool.is_closed()
    }

    /// Log current pool health metrics.
    ///
    /// Emits structured debug-level log with pool size, idle count,
    /// and warns if idle connections drop to zero (potential exhaustion).
    pub fn log_pool_metrics(&self) {
        let size = self.pool.size();
        let idle = self.pool.num_idle();

        debug!(
            subsystem = "database",
            component = "pool",
            op = "metrics",
            pool_size = size,
            pool_idle = idle,
            "Pool health check"
        );

        if idle == 0 && size > 0 && size >= self.pool.options().get_max_connections() {
            warn!(
                subsystem = "database",
                component = "pool",
                pool_size = size,
                "Connection pool has no idle connections, acquisitions will queue"
            );
        }
    }
}
