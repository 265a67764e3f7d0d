//! Mass delete of every application table.
//!
//! Tables are emptied one after another in name order. A table that is
//! still referenced by rows in another table fails with a constraint
//! violation; it is skipped for this pass and retried on the next. Passes
//! repeat until one runs without violations. The number of passes is capped
//! at the number of tables, which is enough for any acyclic reference graph;
//! a cycle of non-deferrable references trips the cap.

use std::time::Instant;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use commonplace_core::{Error, MaintenanceTarget, Progress, Result};

use crate::bootstrap::quote_ident;
use crate::pool::ContentPool;
use crate::schema::APP_NAMESPACE;

/// What a completed mass delete did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DropReport {
    /// Passes run, including the final clean one.
    pub passes: usize,
    /// Rows deleted per table, one entry per table, in the order each table
    /// was first emptied.
    pub deleted: Vec<(String, u64)>,
}

impl DropReport {
    pub fn total_deleted(&self) -> u64 {
        self.deleted.iter().map(|(_, rows)| rows).sum()
    }

    /// Add rows deleted from `type_name` on some pass.
    fn record(&mut self, type_name: &str, rows: u64) {
        match self.deleted.iter_mut().find(|(name, _)| name == type_name) {
            Some((_, total)) => *total += rows,
            None => self.deleted.push((type_name.to_string(), rows)),
        }
    }
}

/// Delete every instance of every concrete type, retrying around
/// referential-integrity failures.
///
/// Fails with `Error::MaintenanceStuck` when no pass within the cap runs
/// clean. Errors other than constraint violations abort immediately.
pub async fn drop_all_content_types<T>(target: &T, progress: &Progress) -> Result<DropReport>
where
    T: MaintenanceTarget + ?Sized,
{
    let start = Instant::now();
    progress.emit("Dropping all data");

    let types = target.concrete_types().await?;
    let max_passes = types.len().max(1);
    let mut report = DropReport::default();

    loop {
        report.passes += 1;
        let mut retry = false;

        for type_name in &types {
            progress.emit(format!("Deleting {} objects", type_name));
            match target.delete_all(type_name).await {
                Ok(rows) => {
                    debug!(
                        subsystem = "maintenance",
                        component = "mass_delete",
                        db_table = %type_name,
                        pass = report.passes,
                        rows_affected = rows,
                        "Deleted rows"
                    );
                    report.record(type_name, rows);
                }
                Err(Error::ConstraintViolation(reason)) => {
                    warn!(
                        subsystem = "maintenance",
                        component = "mass_delete",
                        db_table = %type_name,
                        pass = report.passes,
                        error = %reason,
                        "Delete blocked by references, retrying next pass"
                    );
                    retry = true;
                }
                Err(e) => return Err(e),
            }
        }

        if !retry {
            break;
        }
        if report.passes >= max_passes {
            return Err(Error::MaintenanceStuck {
                passes: report.passes,
            });
        }
    }

    info!(
        subsystem = "maintenance",
        component = "mass_delete",
        pass = report.passes,
        rows_affected = report.total_deleted(),
        duration_ms = start.elapsed().as_millis() as u64,
        "Mass delete complete"
    );
    progress.emit("Done dropping test data");
    Ok(report)
}

/// `MaintenanceTarget` over the tables of the application namespace.
#[derive(Debug, Clone)]
pub struct PgMaintenance {
    pool: ContentPool,
}

impl PgMaintenance {
    pub fn new(pool: ContentPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MaintenanceTarget for PgMaintenance {
    async fn concrete_types(&self) -> Result<Vec<String>> {
        self.pool
            .with_connection(|conn| {
                Box::pin(async move {
                    let tables: Vec<String> = sqlx::query_scalar(
                        r#"
                        SELECT table_name::text
                        FROM information_schema.tables
                        WHERE table_schema = $1 AND table_type = 'BASE TABLE'
                        ORDER BY table_name
                        "#,
                    )
                    .bind(APP_NAMESPACE)
                    .fetch_all(&mut *conn)
                    .await?;
                    Ok::<_, Error>(tables)
                })
            })
            .await
    }

    async fn delete_all(&self, type_name: &str) -> Result<u64> {
        let sql = format!(
            "DELETE FROM {}.{}",
            quote_ident(APP_NAMESPACE),
            quote_ident(type_name)
        );
        self.pool
            .with_connection(move |conn| {
                Box::pin(async move {
                    let result = sqlx::query(&sql).execute(&mut *conn).await?;
                    Ok::<_, Error>(result.rows_affected())
                })
            })
            .await
    }
}
