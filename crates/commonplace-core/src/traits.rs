//! Core traits for commonplace abstractions.
//!
//! These traits define the interfaces that the PostgreSQL layer implements,
//! so the query surface, the mass-delete sweep and the synthetic data
//! generator can be exercised against in-memory fakes.

use async_trait::async_trait;

use crate::error::Result;
use crate::models::*;
use crate::tags::{Slug, TagSet};

// =============================================================================
// CONTENT QUERY TRAITS
// =============================================================================

/// Read side consumed by the presentation layer.
#[async_trait]
pub trait ContentQuery: Send + Sync {
    /// Non-deleted content whose tags are a superset of `requested`,
    /// newest revision first, ties broken by name ascending.
    async fn list_content(&self, requested: &TagSet) -> Result<Vec<ContentView>>;

    /// Every known tag paired with whether it appears on
    /// `list_content(requested)`, sorted by tag ascending.
    async fn available_tags(&self, requested: &TagSet) -> Result<Vec<TagAvailability>>;
}

// =============================================================================
// CONTENT WRITE TRAITS
// =============================================================================

/// Write side used by editors and by the synthetic data generator.
#[async_trait]
pub trait ContentSink: Send + Sync {
    /// Create an editor identity.
    async fn create_user(&self, name: &Slug) -> Result<User>;

    /// Insert a note and the content pointing at it as one unit.
    async fn publish(&self, req: NewContent) -> Result<Content>;
}

// =============================================================================
// MAINTENANCE TRAITS
// =============================================================================

/// Storage that the mass-delete sweep operates on.
#[async_trait]
pub trait MaintenanceTarget: Send + Sync {
    /// Every concrete entity type in the application's namespace.
    async fn concrete_types(&self) -> Result<Vec<String>>;

    /// Delete every instance of `type_name`, returning the number deleted.
    ///
    /// Fails with `Error::ConstraintViolation` while other types still
    /// reference instances of this one.
    async fn delete_all(&self, type_name: &str) -> Result<u64>;
}
