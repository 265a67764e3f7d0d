//! Declarative schema document and migration ledger.
//!
//! The schema is described by one SQL document kept outside the binary
//! (`schema/commonplace.sql` by default). Its version is the SHA-256 of its
//! text. Applying it runs the whole document and records the version in
//! `public.commonplace_schema_migrations`, inside one transaction; a version
//! already recorded is skipped.

use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use sqlx::postgres::PgConnection;
use sqlx::{Connection, Executor};
use tracing::debug;

use commonplace_core::{Error, Progress, Result};

/// Ledger table recording applied schema versions. Lives outside the
/// application namespace so mass delete never touches it.
pub const MIGRATIONS_TABLE: &str = "public.commonplace_schema_migrations";

/// PostgreSQL schema holding every application table.
pub const APP_NAMESPACE: &str = "commonplace";

/// The declarative schema document read from disk.
#[derive(Debug, Clone)]
pub struct SchemaDocument {
    path: PathBuf,
    text: String,
    version: String,
}

impl SchemaDocument {
    /// Read the schema document at `path`.
    ///
    /// Fails with `Error::SchemaFileMissing` when the file does not exist.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let is_file = tokio::fs::metadata(&path)
            .await
            .map(|meta| meta.is_file())
            .unwrap_or(false);
        if !is_file {
            return Err(Error::SchemaFileMissing(path));
        }
        let text = tokio::fs::read_to_string(&path).await?;
        Ok(Self::from_text(path, text))
    }

    /// Build a document from already loaded text.
    pub fn from_text(path: impl Into<PathBuf>, text: impl Into<String>) -> Self {
        let text = text.into();
        let version = schema_version(&text);
        Self {
            path: path.into(),
            text,
            version,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Hex SHA-256 of the document text.
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Bring the connected database up to this document's version.
    ///
    /// Returns `true` when the document was applied, `false` when this
    /// version was already recorded.
    pub async fn apply(&self, conn: &mut PgConnection, progress: &Progress) -> Result<bool> {
        progress.emit("Updating DB schema");
        let mut tx = conn.begin().await?;

        sqlx::query(&format!(
            "CREATE TABLE IF NOT EXISTS {} (
                version    TEXT PRIMARY KEY,
                applied_at TIMESTAMPTZ NOT NULL DEFAULT now()
            )",
            MIGRATIONS_TABLE
        ))
        .execute(&mut *tx)
        .await?;

        let applied: Option<String> = sqlx::query_scalar(&format!(
            "SELECT version FROM {} WHERE version = $1",
            MIGRATIONS_TABLE
        ))
        .bind(&self.version)
        .fetch_optional(&mut *tx)
        .await?;

        if applied.is_some() {
            tx.commit().await?;
            debug!(
                subsystem = "maintenance",
                component = "schema",
                version = %self.version,
                "Schema version already recorded"
            );
            progress.emit("Schema already at latest version");
            return Ok(false);
        }

        progress.emit(format!("Creating migration {}", short_version(&self.version)));
        (&mut *tx).execute(self.text.as_str()).await?;
        sqlx::query(&format!(
            "INSERT INTO {} (version) VALUES ($1)",
            MIGRATIONS_TABLE
        ))
        .bind(&self.version)
        .execute(&mut *tx)
        .await?;

        progress.emit("Committing migration");
        tx.commit().await?;
        progress.emit("Done updating schema");
        Ok(true)
    }
}

/// Hex SHA-256 of a schema text.
pub fn schema_version(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    hex::encode(hasher.finalize())
}

fn short_version(version: &str) -> &str {
    &version[..version.len().min(12)]
}
