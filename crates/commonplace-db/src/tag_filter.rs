//! Tag filter query builder.
//!
//! Translates a requested tag set into a SQL predicate over
//! `commonplace.content c`. Every tier has intersection semantics: an item
//! matches when its tag array contains *all* requested tags. The tier only
//! decides the shape of the predicate:
//!
//! | Requested | Predicate |
//! |-----------|-----------|
//! | 0 tags | `TRUE` |
//! | 1 tag | `$1 = ANY(c.tags)` |
//! | 2 tags | `$1 = ANY(c.tags) AND $2 = ANY(c.tags)` |
//! | 3+ tags | `c.tags @> $1::text[]` |
//!
//! The one- and two-tag forms bind plain text parameters; wider filters bind
//! a single array and use array containment, which the GIN index on
//! `content.tags` serves for every tier.

use commonplace_core::TagSet;

/// Type-safe parameter binding for SQL queries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryParam {
    /// String parameter.
    String(String),
    /// Array of strings (for array containment).
    StringArray(Vec<String>),
}

/// Predicate shape chosen for a requested tag count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagFilterTier {
    /// No tags requested, no filtering.
    Unfiltered,
    /// Exactly one tag.
    Single,
    /// Exactly two tags, both required.
    Pair,
    /// Three or more tags, all required.
    ContainsAll,
}

impl TagFilterTier {
    pub fn for_count(count: usize) -> Self {
        match count {
            0 => TagFilterTier::Unfiltered,
            1 => TagFilterTier::Single,
            2 => TagFilterTier::Pair,
            _ => TagFilterTier::ContainsAll,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TagFilterTier::Unfiltered => "unfiltered",
            TagFilterTier::Single => "single",
            TagFilterTier::Pair => "pair",
            TagFilterTier::ContainsAll => "contains_all",
        }
    }
}

/// Generates the WHERE clause fragment for a tag filter.
///
/// # Example
///
/// ```
/// use commonplace_core::TagSet;
/// use commonplace_db::tag_filter::{QueryParam, TagFilterQueryBuilder};
///
/// let tags = TagSet::normalize(["music", "guitar"]);
/// let (sql, params) = TagFilterQueryBuilder::new(&tags, 0).build();
/// assert_eq!(sql, "$1 = ANY(c.tags) AND $2 = ANY(c.tags)");
/// assert_eq!(
///     params,
///     vec![
///         QueryParam::String("guitar".to_string()),
///         QueryParam::String("music".to_string()),
///     ]
/// );
/// ```
pub struct TagFilterQueryBuilder {
    tags: Vec<String>,
    param_offset: usize,
}

impl TagFilterQueryBuilder {
    /// Create a new builder.
    ///
    /// # Parameters
    ///
    /// * `tags` - The requested (normalized) tags
    /// * `param_offset` - Number of parameters already bound in the enclosing query
    pub fn new(tags: &TagSet, param_offset: usize) -> Self {
        Self {
            tags: tags.to_vec(),
            param_offset,
        }
    }

    pub fn tier(&self) -> TagFilterTier {
        TagFilterTier::for_count(self.tags.len())
    }

    /// Build the WHERE clause fragment and its parameters, in bind order.
    pub fn build(&self) -> (String, Vec<QueryParam>) {
        let first = self.param_offset + 1;
        match self.tier() {
            TagFilterTier::Unfiltered => ("TRUE".to_string(), vec![]),
            TagFilterTier::Single => (
                format!("${} = ANY(c.tags)", first),
                vec![QueryParam::String(self.tags[0].clone())],
            ),
            TagFilterTier::Pair => (
                format!("${} = ANY(c.tags) AND ${} = ANY(c.tags)", first, first + 1),
                vec![
                    QueryParam::String(self.tags[0].clone()),
                    QueryParam::String(self.tags[1].clone()),
                ],
            ),
            TagFilterTier::ContainsAll => (
                format!("c.tags @> ${}::text[]", first),
                vec![QueryParam::StringArray(self.tags.clone())],
            ),
        }
    }

    /// Full listing query: non-deleted content matching the filter,
    /// newest revision first, ties broken by name.
    pub fn list_sql(&self) -> (String, Vec<QueryParam>) {
        let (clause, params) = self.build();
        let sql = format!(
            r#"
            SELECT c.name, c.title, n.text, c.tags, n.ts
            FROM commonplace.content c
            JOIN commonplace.note n ON n.id = c.latest_id
            WHERE c.deleted = false AND {}
            ORDER BY n.ts DESC, c.name ASC
            "#,
            clause
        );
        (sql, params)
    }
}
