//! # commonplace-db
//!
//! PostgreSQL database layer for commonplace.
//!
//! This crate provides:
//! - Connection pool management with scoped connection access
//! - The tiered tag-filter query builder behind `list_content`
//! - The content repository (users, note revisions, content items)
//! - The declarative schema document and its migration ledger
//! - Bootstrap of role, database and schema from a bare cluster
//! - Mass delete with retry around referential integrity
//! - A synthetic test data generator
//!
//! ## Example
//!
//! ```rust,ignore
//! use commonplace_db::{ContentQuery, Database, DbConfig, TagSet};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let db = Database::connect(&DbConfig::from_env()?).await?;
//!
//!     let guitar = TagSet::normalize(["music", "guitar"]);
//!     for item in db.content.list_content(&guitar).await? {
//!         println!("{} ({})", item.name, item.ts);
//!     }
//!     Ok(())
//! }
//! ```

pub mod bootstrap;
pub mod config;
pub mod content;
pub mod generator;
pub mod maintenance;
pub mod pool;
pub mod schema;
pub mod tag_filter;

// Always compiled so integration tests (in tests/) can use it
pub mod test_fixtures;

// Re-export core types
pub use commonplace_core::*;

pub use bootstrap::{bootstrap, determine_state, BootstrapBackend, BootstrapState, PgBootstrap};
pub use config::{find_dot_env, load_dot_env, DbConfig, DsnKind};
pub use content::PgContentRepository;
pub use generator::{
    generate_test_data, GenerationReport, GeneratorConfig, ItemOutcome, SEED_USERS,
    TAG_VOCABULARY,
};
pub use maintenance::{drop_all_content_types, DropReport, PgMaintenance};
pub use pool::{ContentPool, PoolConfig};
pub use schema::SchemaDocument;
pub use tag_filter::{QueryParam, TagFilterQueryBuilder, TagFilterTier};

/// Combined database context with all repositories.
#[derive(Debug, Clone)]
pub struct Database {
    /// The shared connection pool.
    pub pool: ContentPool,
    /// Content repository for publishing and querying.
    pub content: PgContentRepository,
    /// Mass-delete target over the application tables.
    pub maintenance: PgMaintenance,
}

impl Database {
    /// Create a new Database instance from a connection pool.
    pub fn new(pool: ContentPool) -> Self {
        Self {
            content: PgContentRepository::new(pool.clone()),
            maintenance: PgMaintenance::new(pool.clone()),
            pool,
        }
    }

    /// Connect using the pool settings and credentials in `config`.
    pub async fn connect(config: &DbConfig) -> Result<Self> {
        let pool = ContentPool::connect_with(config.pool_options()?, config.pool.clone()).await?;
        Ok(Self::new(pool))
    }

    /// Drain and close the pool.
    pub async fn close(&self) {
        self.pool.log_pool_metrics();
        self.pool.close().await;
    }
}
