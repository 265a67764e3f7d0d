//! # commonplace-core
//!
//! Core types, traits, and error taxonomy for the commonplace publishing
//! backend.
//!
//! This crate holds the content data model (users, immutable note revisions,
//! versioned content items), the tag and slug value types that guard its
//! invariants, and the trait seams that the PostgreSQL layer implements.
//! It performs no I/O of its own.

pub mod error;
pub mod logging;
pub mod models;
pub mod progress;
pub mod tags;
pub mod traits;

// Re-export commonly used types at crate root
pub use error::{Error, Result};
pub use models::*;
pub use progress::Progress;
pub use tags::{normalize_tag, validate_tag, Slug, TagSet};
pub use traits::*;
