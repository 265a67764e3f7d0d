//! Structured logging field name constants for commonplace.
//!
//! All crates use these constants for consistent structured logging fields.
//!
//! ## Log Level Contract
//!
//! | Level | Usage |
//! |-------|-------|
//! | ERROR | Fatal maintenance failure, requires operator attention |
//! | WARN  | Recoverable issue (probe refused, item insert failed) |
//! | INFO  | Lifecycle events (pool open/close), progress messages |
//! | DEBUG | Query tier decisions, pool metrics |
//! | TRACE | Per-row data |

// ─── Identity fields ───────────────────────────────────────────────────────

/// Subsystem originating the log event.
/// Values: "database", "maintenance", "admin"
pub const SUBSYSTEM: &str = "subsystem";

/// Component within a subsystem.
/// Examples: "pool", "tag_filter", "bootstrap", "mass_delete", "generator"
pub const COMPONENT: &str = "component";

/// Logical operation name.
/// Examples: "list_content", "available_tags", "sweep", "probe"
pub const OPERATION: &str = "op";

// ─── Entity fields ─────────────────────────────────────────────────────────

/// Content slug being operated on.
pub const CONTENT_NAME: &str = "content_name";

/// Database table or entity type affected.
pub const DB_TABLE: &str = "db_table";

/// Number of requested filter tags.
pub const TAG_COUNT: &str = "tag_count";

// ─── Measurement fields ────────────────────────────────────────────────────

/// Wall-clock duration in milliseconds.
pub const DURATION_MS: &str = "duration_ms";

/// Number of results returned by a query.
pub const RESULT_COUNT: &str = "result_count";

/// Number of rows affected by a statement.
pub const ROWS_AFFECTED: &str = "rows_affected";

/// Sweep pass number during mass delete.
pub const PASS: &str = "pass";

// ─── Database fields ───────────────────────────────────────────────────────

/// Number of active connections in the pool.
pub const POOL_SIZE: &str = "pool_size";

/// Number of idle connections in the pool.
pub const POOL_IDLE: &str = "pool_idle";

/// Bootstrap state inferred from connection probes.
pub const BOOTSTRAP_STATE: &str = "bootstrap_state";

// ─── Outcome fields ────────────────────────────────────────────────────────

/// Boolean success/failure indicator.
pub const SUCCESS: &str = "success";

/// Error message when an operation fails.
pub const ERROR_MSG: &str = "error";
