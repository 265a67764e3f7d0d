//! Error types for commonplace.

use std::path::PathBuf;

use sqlx::error::ErrorKind;
use thiserror::Error;

/// Result type alias using commonplace's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for commonplace operations.
#[derive(Error, Debug)]
pub enum Error {
    /// A uniqueness, reference, or validity constraint was broken.
    ///
    /// Retried by the mass-delete sweep, surfaced everywhere else.
    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    /// Timed out waiting for a pooled connection. Transient, safe to retry.
    #[error("Connection pool exhausted: {0}")]
    PoolExhausted(String),

    /// Role, database, or schema could not reach the ready state.
    #[error("Bootstrap failed: {0}")]
    BootstrapFailed(String),

    /// Mass delete did not converge within its pass budget.
    #[error("Maintenance stuck: no clean sweep after {passes} passes")]
    MaintenanceStuck { passes: usize },

    /// The declarative schema document is absent.
    #[error("Schema file missing: {}", .0.display())]
    SchemaFileMissing(PathBuf),

    /// A single synthetic record could not be inserted.
    #[error("Insert failed for {item}: {reason}")]
    InsertFailed { item: String, reason: String },

    /// Database operation failed (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(sqlx::Error),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// File I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether this error is a broken constraint.
    pub fn is_constraint_violation(&self) -> bool {
        matches!(self, Error::ConstraintViolation(_))
    }

    /// Whether the failed operation may succeed if simply retried.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::PoolExhausted(_))
    }
}

impl From<sqlx::Error> for Error {
    fn from(e: sqlx::Error) -> Self {
        let violation = match &e {
            sqlx::Error::Database(db_err) => match db_err.kind() {
                ErrorKind::UniqueViolation
                | ErrorKind::ForeignKeyViolation
                | ErrorKind::NotNullViolation
                | ErrorKind::CheckViolation => Some(match db_err.constraint() {
                    Some(constraint) => format!("{} ({})", db_err.message(), constraint),
                    None => db_err.message().to_string(),
                }),
                _ => None,
            },
            _ => None,
        };
        if let Some(detail) = violation {
            return Error::ConstraintViolation(detail);
        }

        match e {
            sqlx::Error::PoolTimedOut => {
                Error::PoolExhausted("timed out acquiring a connection".to_string())
            }
            other => Error::Database(other),
        }
    }
}
