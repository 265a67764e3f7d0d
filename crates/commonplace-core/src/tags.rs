//! Slug and tag value types.
//!
//! Both are validated at construction so that an invalid name or tag can
//! never reach the store. Validation failures are reported as
//! [`Error::ConstraintViolation`], the same error the database raises for a
//! broken uniqueness or reference constraint.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Maximum length of a slug (content or user name).
pub const MAX_SLUG_LEN: usize = 64;

/// Maximum length of a single tag.
pub const MAX_TAG_LEN: usize = 32;

// =============================================================================
// SLUG
// =============================================================================

/// A URL-safe unique name for a user or content item.
///
/// Rules:
/// - Length between 1-64 characters
/// - Lowercase ASCII alphanumerics and hyphens only
/// - Must not start or end with a hyphen
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Slug(String);

impl Slug {
    /// Validate and wrap a slug.
    pub fn parse(value: impl Into<String>) -> Result<Self> {
        let value = value.into();
        if value.is_empty() {
            return Err(Error::ConstraintViolation(
                "Slug cannot be empty".to_string(),
            ));
        }
        if value.len() > MAX_SLUG_LEN {
            return Err(Error::ConstraintViolation(format!(
                "Slug must be {} characters or less: {}",
                MAX_SLUG_LEN, value
            )));
        }
        if let Some(c) = value
            .chars()
            .find(|c| !(c.is_ascii_lowercase() || c.is_ascii_digit() || *c == '-'))
        {
            return Err(Error::ConstraintViolation(format!(
                "Slug contains invalid character '{}': {}",
                c, value
            )));
        }
        if value.starts_with('-') || value.ends_with('-') {
            return Err(Error::ConstraintViolation(format!(
                "Slug must not start or end with a hyphen: {}",
                value
            )));
        }
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Slug {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Slug::parse(value)
    }
}

impl From<Slug> for String {
    fn from(slug: Slug) -> Self {
        slug.0
    }
}

impl fmt::Display for Slug {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Slug {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

// =============================================================================
// TAGS
// =============================================================================

/// Case-fold a tag to its stored identity.
pub fn normalize_tag(tag: &str) -> String {
    tag.trim().to_lowercase()
}

/// Validate a (normalized) tag.
///
/// Rules:
/// - Length between 1-32 characters
/// - Allowed characters: ASCII alphanumerics, hyphens (-), underscores (_)
pub fn validate_tag(tag: &str) -> Result<()> {
    if tag.is_empty() {
        return Err(Error::ConstraintViolation(
            "Tag cannot be empty".to_string(),
        ));
    }
    if tag.len() > MAX_TAG_LEN {
        return Err(Error::ConstraintViolation(format!(
            "Tag must be {} characters or less: {}",
            MAX_TAG_LEN, tag
        )));
    }

    let invalid_chars: Vec<char> = tag
        .chars()
        .filter(|c| !c.is_ascii_alphanumeric() && *c != '-' && *c != '_')
        .collect();
    if !invalid_chars.is_empty() {
        let chars_display: String = invalid_chars
            .iter()
            .take(5)
            .map(|c| format!("'{}'", c))
            .collect::<Vec<_>>()
            .join(", ");
        return Err(Error::ConstraintViolation(format!(
            "Tag contains invalid characters: {}",
            chars_display
        )));
    }

    Ok(())
}

/// An unordered set of tags with case-insensitive identity.
///
/// Iteration order is ascending, which keeps stored arrays and rendered
/// output deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct TagSet(BTreeSet<String>);

impl TagSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a tag set for storage.
    ///
    /// Fails on an invalid tag or a duplicate (after case folding) rather
    /// than silently merging it.
    pub fn try_from_tags<I, S>(tags: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut set = BTreeSet::new();
        for tag in tags {
            let tag = normalize_tag(tag.as_ref());
            validate_tag(&tag)?;
            if !set.insert(tag.clone()) {
                return Err(Error::ConstraintViolation(format!(
                    "Duplicate tag: {}",
                    tag
                )));
            }
        }
        Ok(Self(set))
    }

    /// Build a tag set from a filter request.
    ///
    /// Folds case and drops duplicates and blanks, but keeps tags that would
    /// fail validation: those can never be stored, so they match nothing.
    pub fn normalize<I, S>(tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self(
            tags.into_iter()
                .map(|t| normalize_tag(t.as_ref()))
                .filter(|t| !t.is_empty())
                .collect(),
        )
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.0.contains(&normalize_tag(tag))
    }

    /// Whether every tag of `other` is also in `self`.
    pub fn is_superset(&self, other: &TagSet) -> bool {
        self.0.is_superset(&other.0)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    /// Tags as an owned, sorted vector (the stored `TEXT[]` shape).
    pub fn to_vec(&self) -> Vec<String> {
        self.0.iter().cloned().collect()
    }
}

impl TryFrom<Vec<String>> for TagSet {
    type Error = Error;

    fn try_from(tags: Vec<String>) -> Result<Self> {
        TagSet::try_from_tags(tags)
    }
}

impl From<TagSet> for Vec<String> {
    fn from(tags: TagSet) -> Self {
        tags.0.into_iter().collect()
    }
}

impl<'a> IntoIterator for &'a TagSet {
    type Item = &'a String;
    type IntoIter = std::collections::btree_set::Iter<'a, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slug_accepts_generated_shape() {
        let slug = Slug::parse("a1b2c3d4-e5f6g7h8-i9j0k1l2").unwrap();
        assert_eq!(slug.as_str(), "a1b2c3d4-e5f6g7h8-i9j0k1l2");
    }

    #[test]
    fn test_slug_rejects_invalid() {
        for bad in ["", "Upper", "has space", "-leading", "trailing-", "émoji"] {
            let err = Slug::parse(bad).unwrap_err();
            assert!(err.is_constraint_violation(), "{bad:?} should be rejected");
        }
        assert!(Slug::parse("a".repeat(MAX_SLUG_LEN + 1)).is_err());
    }

    #[test]
    fn test_slug_deserialize_validates() {
        let ok: Slug = serde_json::from_str("\"guitar-notes\"").unwrap();
        assert_eq!(ok.to_string(), "guitar-notes");
        assert!(serde_json::from_str::<Slug>("\"Not A Slug\"").is_err());
    }

    #[test]
    fn test_tag_set_deserialize_validates() {
        let tags: TagSet = serde_json::from_str(r#"["Guitar","journal"]"#).unwrap();
        assert_eq!(tags.to_vec(), vec!["guitar", "journal"]);
        assert_eq!(serde_json::to_string(&tags).unwrap(), r#"["guitar","journal"]"#);

        assert!(serde_json::from_str::<TagSet>(r#"["Guitar","guitar"]"#).is_err());
        assert!(serde_json::from_str::<TagSet>(r#"["not a tag!"]"#).is_err());
        assert!(serde_json::from_str::<TagSet>(r#"["Guitar","guitar","not a tag!"]"#).is_err());
    }

    #[test]
    fn test_validate_tag() {
        assert!(validate_tag("guitar").is_ok());
        assert!(validate_tag("machine_learning").is_ok());
        assert!(validate_tag("sci-fi").is_ok());
        assert!(validate_tag("").is_err());
        assert!(validate_tag("two words").is_err());
        assert!(validate_tag(&"x".repeat(MAX_TAG_LEN + 1)).is_err());
    }

    #[test]
    fn test_tag_set_case_insensitive_identity() {
        let tags = TagSet::try_from_tags(["Guitar", "music"]).unwrap();
        assert!(tags.contains("GUITAR"));
        assert_eq!(tags.to_vec(), vec!["guitar", "music"]);
    }

    #[test]
    fn test_tag_set_rejects_duplicates() {
        let err = TagSet::try_from_tags(["guitar", "Guitar"]).unwrap_err();
        assert!(err.is_constraint_violation());
    }

    #[test]
    fn test_tag_set_rejects_invalid_tag() {
        let err = TagSet::try_from_tags(["ok", "not ok"]).unwrap_err();
        assert!(err.is_constraint_violation());
    }

    #[test]
    fn test_normalize_is_lenient() {
        let requested = TagSet::normalize(["Music", "music", " ", "no such tag!"]);
        assert_eq!(requested.to_vec(), vec!["music", "no such tag!"]);
    }

    #[test]
    fn test_superset() {
        let have = TagSet::try_from_tags(["guitar", "music", "learning"]).unwrap();
        let want = TagSet::normalize(["music", "guitar"]);
        assert!(have.is_superset(&want));
        assert!(!want.is_superset(&have));
        assert!(have.is_superset(&TagSet::new()));
    }
}
