//! Content repository implementation.

use std::collections::HashSet;
use std::time::Instant;

use async_trait::async_trait;
use sqlx::postgres::{PgConnection, PgRow};
use sqlx::Row;
use tracing::debug;
use uuid::Uuid;

use commonplace_core::{
    Content, ContentQuery, ContentSink, ContentView, Error, NewContent, Note, Result, Slug,
    TagAvailability, TagSet, User,
};

use crate::pool::ContentPool;
use crate::tag_filter::{QueryParam, TagFilterQueryBuilder};

const SELECT_CONTENT: &str = r#"
    SELECT c.id, c.name, c.title, c.tags, c.public_since, c.public_until, c.deleted,
           n.id AS note_id, n.text, n.hash, n.ts, n.editor_id
    FROM commonplace.content c
    JOIN commonplace.note n ON n.id = c.latest_id
"#;

/// PostgreSQL implementation of the content store.
#[derive(Debug, Clone)]
pub struct PgContentRepository {
    pool: ContentPool,
}

impl PgContentRepository {
    /// Create a new PgContentRepository with the given connection pool.
    pub fn new(pool: ContentPool) -> Self {
        Self { pool }
    }

    /// Look up an editor by name.
    pub async fn get_user(&self, name: &Slug) -> Result<Option<User>> {
        let name = name.to_string();
        self.pool
            .with_connection(move |conn| {
                Box::pin(async move {
                    let row = sqlx::query(r#"SELECT id, name FROM commonplace."user" WHERE name = $1"#)
                        .bind(&name)
                        .fetch_optional(&mut *conn)
                        .await?;
                    row.map(|row| -> Result<User> {
                        Ok(User {
                            id: row.get("id"),
                            name: Slug::parse(row.get::<String, _>("name"))?,
                        })
                    })
                    .transpose()
                })
            })
            .await
    }

    /// Fetch a content item with its latest revision.
    pub async fn get(&self, name: &Slug) -> Result<Option<Content>> {
        let name = name.to_string();
        self.pool
            .with_connection(move |conn| {
                Box::pin(async move { fetch_content(conn, &name).await })
            })
            .await
    }

    /// Publish a new revision of an existing content item.
    ///
    /// Inserts a new note and points `latest` at it in one transaction. The
    /// previous note is kept as history.
    pub async fn revise(&self, name: &Slug, text: &str, editor: &Slug) -> Result<Content> {
        let name = name.to_string();
        let editor = editor.to_string();
        let text = text.to_string();
        self.pool
            .with_transaction(move |conn| {
                Box::pin(async move {
                    let editor_id = editor_id(conn, &editor).await?;
                    let content_id: Option<Uuid> = sqlx::query_scalar(
                        "SELECT id FROM commonplace.content WHERE name = $1 FOR UPDATE",
                    )
                    .bind(&name)
                    .fetch_optional(&mut *conn)
                    .await?;
                    let content_id =
                        content_id.ok_or_else(|| Error::NotFound(format!("content {}", name)))?;

                    let note_id = insert_note(
                        conn,
                        &text,
                        chrono::Utc::now(),
                        editor_id,
                    )
                    .await?;
                    sqlx::query("UPDATE commonplace.content SET latest_id = $1 WHERE id = $2")
                        .bind(note_id)
                        .bind(content_id)
                        .execute(&mut *conn)
                        .await?;

                    fetch_content(conn, &name)
                        .await?
                        .ok_or_else(|| Error::NotFound(format!("content {}", name)))
                })
            })
            .await
    }

    /// Soft-delete or restore a content item.
    pub async fn set_deleted(&self, name: &Slug, deleted: bool) -> Result<()> {
        let name = name.to_string();
        self.pool
            .with_connection(move |conn| {
                Box::pin(async move {
                    let result =
                        sqlx::query("UPDATE commonplace.content SET deleted = $1 WHERE name = $2")
                            .bind(deleted)
                            .bind(&name)
                            .execute(&mut *conn)
                            .await?;
                    if result.rows_affected() == 0 {
                        return Err(Error::NotFound(format!("content {}", name)));
                    }
                    Ok(())
                })
            })
            .await
    }

    /// The tag universe: distinct tags on non-deleted content, ascending.
    pub async fn all_tags(&self) -> Result<Vec<String>> {
        self.pool
            .with_connection(|conn| {
                Box::pin(async move {
                    let tags: Vec<String> = sqlx::query_scalar(
                        r#"
                        SELECT DISTINCT t.tag
                        FROM commonplace.content c, unnest(c.tags) AS t(tag)
                        WHERE c.deleted = false
                        ORDER BY t.tag
                        "#,
                    )
                    .fetch_all(&mut *conn)
                    .await?;
                    Ok::<_, Error>(tags)
                })
            })
            .await
    }
}

#[async_trait]
impl ContentQuery for PgContentRepository {
    async fn list_content(&self, requested: &TagSet) -> Result<Vec<ContentView>> {
        let start = Instant::now();
        let builder = TagFilterQueryBuilder::new(requested, 0);
        let tier = builder.tier();
        let (sql, params) = builder.list_sql();

        let views = self
            .pool
            .with_connection(move |conn| {
                Box::pin(async move {
                    let mut q = sqlx::query(&sql);
                    for param in &params {
                        q = match param {
                            QueryParam::String(s) => q.bind(s),
                            QueryParam::StringArray(arr) => q.bind(arr),
                        };
                    }
                    let rows = q.fetch_all(&mut *conn).await?;
                    Ok::<_, Error>(rows.iter().map(view_from_row).collect::<Vec<_>>())
                })
            })
            .await?;

        debug!(
            subsystem = "database",
            component = "tag_filter",
            op = "list_content",
            tier = tier.as_str(),
            tag_count = requested.len(),
            result_count = views.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Listed content"
        );
        Ok(views)
    }

    async fn available_tags(&self, requested: &TagSet) -> Result<Vec<TagAvailability>> {
        // Two reads on separate connections; they do not share a snapshot.
        let (listed, universe) = tokio::try_join!(self.list_content(requested), self.all_tags())?;

        let present: HashSet<&str> = listed
            .iter()
            .flat_map(|view| view.tags.iter().map(String::as_str))
            .collect();

        Ok(universe
            .iter()
            .map(|tag| TagAvailability {
                tag: tag.clone(),
                available: present.contains(tag.as_str()),
            })
            .collect())
    }
}

#[async_trait]
impl ContentSink for PgContentRepository {
    async fn create_user(&self, name: &Slug) -> Result<User> {
        let user = User {
            id: Uuid::new_v4(),
            name: name.clone(),
        };
        let (id, name) = (user.id, user.name.to_string());
        self.pool
            .with_connection(move |conn| {
                Box::pin(async move {
                    sqlx::query(r#"INSERT INTO commonplace."user" (id, name) VALUES ($1, $2)"#)
                        .bind(id)
                        .bind(&name)
                        .execute(&mut *conn)
                        .await?;
                    Ok::<_, Error>(())
                })
            })
            .await?;
        Ok(user)
    }

    async fn publish(&self, req: NewContent) -> Result<Content> {
        self.pool
            .with_transaction(move |conn| {
                Box::pin(async move {
                    let editor_id = editor_id(conn, req.note.editor.as_str()).await?;
                    let note_id = insert_note(conn, &req.note.text, req.note.ts, editor_id).await?;

                    sqlx::query(
                        r#"
                        INSERT INTO commonplace.content
                            (id, name, title, tags, latest_id, public_since, public_until, deleted)
                        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                        "#,
                    )
                    .bind(Uuid::new_v4())
                    .bind(req.name.as_str())
                    .bind(&req.title)
                    .bind(req.tags.to_vec())
                    .bind(note_id)
                    .bind(req.public_since)
                    .bind(req.public_until)
                    .bind(req.deleted)
                    .execute(&mut *conn)
                    .await?;

                    fetch_content(conn, req.name.as_str())
                        .await?
                        .ok_or_else(|| Error::NotFound(format!("content {}", req.name)))
                })
            })
            .await
    }
}

// =============================================================================
// CONNECTION-LEVEL HELPERS
// =============================================================================

async fn editor_id(conn: &mut PgConnection, name: &str) -> Result<Uuid> {
    let id: Option<Uuid> = sqlx::query_scalar(r#"SELECT id FROM commonplace."user" WHERE name = $1"#)
        .bind(name)
        .fetch_optional(&mut *conn)
        .await?;
    id.ok_or_else(|| Error::ConstraintViolation(format!("Unknown editor: {}", name)))
}

async fn insert_note(
    conn: &mut PgConnection,
    text: &str,
    ts: chrono::DateTime<chrono::Utc>,
    editor_id: Uuid,
) -> Result<Uuid> {
    let note_id = Uuid::new_v4();
    sqlx::query(
        "INSERT INTO commonplace.note (id, text, hash, ts, editor_id) VALUES ($1, $2, $3, $4, $5)",
    )
    .bind(note_id)
    .bind(text)
    .bind(commonplace_core::content_hash(text))
    .bind(ts)
    .bind(editor_id)
    .execute(&mut *conn)
    .await?;
    Ok(note_id)
}

async fn fetch_content(conn: &mut PgConnection, name: &str) -> Result<Option<Content>> {
    let sql = format!("{} WHERE c.name = $1", SELECT_CONTENT);
    let row = sqlx::query(&sql)
        .bind(name)
        .fetch_optional(&mut *conn)
        .await?;
    row.as_ref().map(content_from_row).transpose()
}

fn content_from_row(row: &PgRow) -> Result<Content> {
    let tags: Vec<String> = row.get("tags");
    Ok(Content {
        id: row.get("id"),
        name: Slug::parse(row.get::<String, _>("name"))?,
        title: row.get("title"),
        tags: TagSet::normalize(tags),
        latest: Note {
            id: row.get("note_id"),
            text: row.get("text"),
            hash: row.get("hash"),
            ts: row.get("ts"),
            editor: row.get("editor_id"),
        },
        public_since: row.get("public_since"),
        public_until: row.get("public_until"),
        deleted: row.get("deleted"),
    })
}

fn view_from_row(row: &PgRow) -> ContentView {
    ContentView {
        name: row.get("name"),
        title: row.get("title"),
        text: row.get("text"),
        tags: row.get("tags"),
        ts: row.get("ts"),
    }
}
