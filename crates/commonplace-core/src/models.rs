//! Data models for commonplace.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::tags::{Slug, TagSet};

/// Compute the content hash stored alongside a note's text.
pub fn content_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("sha256:{}", hex::encode(hasher.finalize()))
}

/// Public visibility at instant `at` for the given window and soft-delete flag.
///
/// Both window bounds are inclusive; a missing bound is open.
pub fn is_publicly_visible(
    deleted: bool,
    public_since: Option<DateTime<Utc>>,
    public_until: Option<DateTime<Utc>>,
    at: DateTime<Utc>,
) -> bool {
    !deleted
        && public_since.map_or(true, |since| since <= at)
        && public_until.map_or(true, |until| at <= until)
}

// =============================================================================
// USER
// =============================================================================

/// Editor identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub name: Slug,
}

// =============================================================================
// NOTE
// =============================================================================

/// One immutable revision of written text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
    pub id: Uuid,
    pub text: String,
    /// `sha256:<hex>` digest of `text`.
    pub hash: String,
    pub ts: DateTime<Utc>,
    /// The editing user's id.
    pub editor: Uuid,
}

impl Note {
    /// Whether `hash` still matches `text`.
    pub fn verify_hash(&self) -> bool {
        self.hash == content_hash(&self.text)
    }
}

/// Request for creating a new note revision.
#[derive(Debug, Clone)]
pub struct NewNote {
    pub text: String,
    pub ts: DateTime<Utc>,
    pub editor: Slug,
}

impl NewNote {
    /// A revision written now by `editor`.
    pub fn new(text: impl Into<String>, editor: Slug) -> Self {
        Self {
            text: text.into(),
            ts: Utc::now(),
            editor,
        }
    }

    /// Override the revision timestamp.
    pub fn at(mut self, ts: DateTime<Utc>) -> Self {
        self.ts = ts;
        self
    }

    pub fn hash(&self) -> String {
        content_hash(&self.text)
    }
}

// =============================================================================
// CONTENT
// =============================================================================

/// The addressable publication unit. Always owns its current revision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Content {
    pub id: Uuid,
    pub name: Slug,
    pub title: Option<String>,
    pub tags: TagSet,
    pub latest: Note,
    pub public_since: Option<DateTime<Utc>>,
    pub public_until: Option<DateTime<Utc>>,
    pub deleted: bool,
}

impl Content {
    /// Timestamp of the latest revision.
    pub fn ts(&self) -> DateTime<Utc> {
        self.latest.ts
    }

    /// Text of the latest revision.
    pub fn text(&self) -> &str {
        &self.latest.text
    }

    pub fn is_visible_at(&self, at: DateTime<Utc>) -> bool {
        is_publicly_visible(self.deleted, self.public_since, self.public_until, at)
    }

    pub fn view(&self) -> ContentView {
        ContentView {
            name: self.name.to_string(),
            title: self.title.clone(),
            text: self.latest.text.clone(),
            tags: self.tags.to_vec(),
            ts: self.latest.ts,
        }
    }
}

/// Request for publishing a new content item together with its first revision.
#[derive(Debug, Clone)]
pub struct NewContent {
    pub name: Slug,
    pub title: Option<String>,
    pub tags: TagSet,
    pub note: NewNote,
    pub public_since: Option<DateTime<Utc>>,
    pub public_until: Option<DateTime<Utc>>,
    pub deleted: bool,
}

impl NewContent {
    /// A private, untitled, untagged item with the given first revision.
    pub fn new(name: Slug, note: NewNote) -> Self {
        Self {
            name,
            title: None,
            tags: TagSet::new(),
            note,
            public_since: None,
            public_until: None,
            deleted: false,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_tags(mut self, tags: TagSet) -> Self {
        self.tags = tags;
        self
    }

    pub fn public_between(
        mut self,
        since: Option<DateTime<Utc>>,
        until: Option<DateTime<Utc>>,
    ) -> Self {
        self.public_since = since;
        self.public_until = until;
        self
    }

    pub fn deleted(mut self, deleted: bool) -> Self {
        self.deleted = deleted;
        self
    }
}

/// Flattened read model handed to the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentView {
    pub name: String,
    pub title: Option<String>,
    pub text: String,
    pub tags: Vec<String>,
    pub ts: DateTime<Utc>,
}

/// A known tag paired with whether it still yields results under the
/// current filter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagAvailability {
    pub tag: String,
    pub available: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn note(text: &str, ts: DateTime<Utc>) -> Note {
        Note {
            id: Uuid::new_v4(),
            text: text.to_string(),
            hash: content_hash(text),
            ts,
            editor: Uuid::new_v4(),
        }
    }

    #[test]
    fn test_content_hash_format() {
        let hash = content_hash("hello");
        assert_eq!(
            hash,
            "sha256:2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
    }

    #[test]
    fn test_note_verify_hash() {
        let mut n = note("original", Utc::now());
        assert!(n.verify_hash());
        n.text.push_str(" tampered");
        assert!(!n.verify_hash());
    }

    #[test]
    fn test_visibility_open_window() {
        let now = Utc::now();
        assert!(is_publicly_visible(false, None, None, now));
        assert!(!is_publicly_visible(true, None, None, now));
    }

    #[test]
    fn test_visibility_bounds_inclusive() {
        let now = Utc::now();
        assert!(is_publicly_visible(false, Some(now), Some(now), now));
        assert!(!is_publicly_visible(
            false,
            Some(now + Duration::seconds(1)),
            None,
            now
        ));
        assert!(!is_publicly_visible(
            false,
            None,
            Some(now - Duration::seconds(1)),
            now
        ));
    }

    #[test]
    fn test_content_view_derives_from_latest() {
        let ts = Utc::now();
        let content = Content {
            id: Uuid::new_v4(),
            name: Slug::parse("first-post").unwrap(),
            title: Some("First".to_string()),
            tags: TagSet::try_from_tags(["music", "guitar"]).unwrap(),
            latest: note("body", ts),
            public_since: None,
            public_until: None,
            deleted: false,
        };

        let view = content.view();
        assert_eq!(view.name, "first-post");
        assert_eq!(view.text, "body");
        assert_eq!(view.ts, ts);
        assert_eq!(view.tags, vec!["guitar", "music"]);
        assert_eq!(content.ts(), ts);
        assert_eq!(content.text(), "body");
    }

    #[test]
    fn test_new_content_builder() {
        let editor = Slug::parse("ambv").unwrap();
        let since = Utc::now();
        let req = NewContent::new(
            Slug::parse("draft").unwrap(),
            NewNote::new("text", editor.clone()),
        )
        .with_title("Draft")
        .public_between(Some(since), None)
        .deleted(true);

        assert_eq!(req.title.as_deref(), Some("Draft"));
        assert_eq!(req.public_since, Some(since));
        assert!(req.deleted);
        assert_eq!(req.note.editor, editor);
        assert_eq!(req.note.hash(), content_hash("text"));
    }
}
