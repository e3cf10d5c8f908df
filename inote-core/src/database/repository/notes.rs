//! Note repository
//!
//! Notes are indexed for full-text search by triggers on the `Notes` table,
//! so every write path here keeps the index current without touching it.
//!
//! A locked note never stores a readable preview: create and update both
//! force `plainTextPreview` to the empty string while `isLocked` is set.

use crate::config::PREVIEW_MAX_CHARS;
use crate::database::executor::{Database, Value};
use crate::database::models::{next_timestamp, CreateNoteRequest, Note, UpdateNoteRequest};
use crate::error::{AppError, Result};
use crate::storage::FileStore;
use uuid::Uuid;

/// Characters with special meaning in FTS5 query syntax
const SEARCH_SPECIAL_CHARS: &[char] = &['\'', '"', '*', '(', ')'];

const ORDER_BY_PINNED_RECENT: &str = "ORDER BY pinned DESC, updatedAt DESC";

#[derive(Clone)]
pub struct NoteRepository {
    db: Database,
    files: FileStore,
}

impl NoteRepository {
    pub fn new(db: Database, files: FileStore) -> Self {
        Self { db, files }
    }

    /// All notes, pinned first, then most recently updated
    pub async fn get_all(&self) -> Result<Vec<Note>> {
        self.db
            .query(&format!("SELECT * FROM Notes {}", ORDER_BY_PINNED_RECENT), &[])
            .await
    }

    /// Get a note by ID
    pub async fn get(&self, id: &str) -> Result<Note> {
        self.db
            .query_optional("SELECT * FROM Notes WHERE id = ?", &[id.into()])
            .await?
            .ok_or_else(|| AppError::NoteNotFound(id.to_string()))
    }

    /// Notes filed under `folder_id`, or unfiled notes for `None`
    pub async fn get_by_folder(&self, folder_id: Option<&str>) -> Result<Vec<Note>> {
        match folder_id {
            Some(folder_id) => {
                self.db
                    .query(
                        &format!("SELECT * FROM Notes WHERE folderId = ? {}", ORDER_BY_PINNED_RECENT),
                        &[folder_id.into()],
                    )
                    .await
            }
            None => {
                self.db
                    .query(
                        &format!("SELECT * FROM Notes WHERE folderId IS NULL {}", ORDER_BY_PINNED_RECENT),
                        &[],
                    )
                    .await
            }
        }
    }

    /// Create a new note
    pub async fn create(&self, req: CreateNoteRequest) -> Result<Note> {
        let now = next_timestamp();

        let preview = if req.is_locked {
            String::new()
        } else {
            match (&req.plain_text_preview, &req.body_rich_html) {
                (Some(preview), _) => bounded_preview(preview),
                (None, Some(html)) => preview_from_html(html),
                (None, None) => String::new(),
            }
        };

        let note = Note {
            id: req.id.unwrap_or_else(|| Uuid::new_v4().to_string()),
            folder_id: req.folder_id,
            title: Some(req.title.unwrap_or_default()),
            body_rich_html: Some(req.body_rich_html.unwrap_or_default()),
            plain_text_preview: Some(preview),
            pinned: req.pinned,
            archived: req.archived,
            is_locked: req.is_locked,
            font_family: req.font_family,
            created_at: now,
            updated_at: now,
        };

        self.db
            .execute(
                r#"
                INSERT INTO Notes (
                    id, folderId, title, bodyRichHtml, plainTextPreview,
                    pinned, archived, isLocked, fontFamily, createdAt, updatedAt
                )
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
                &[
                    note.id.as_str().into(),
                    note.folder_id.clone().into(),
                    note.title.clone().into(),
                    note.body_rich_html.clone().into(),
                    note.plain_text_preview.clone().into(),
                    note.pinned.into(),
                    note.archived.into(),
                    note.is_locked.into(),
                    note.font_family.clone().into(),
                    note.created_at.into(),
                    note.updated_at.into(),
                ],
            )
            .await?;

        tracing::debug!("Created note: {}", note.id);
        Ok(note)
    }

    /// Update the supplied fields of a note and bump `updatedAt`.
    ///
    /// A request with no fields is a no-op and returns the stored note.
    pub async fn update(&self, req: UpdateNoteRequest) -> Result<Note> {
        let mut sets: Vec<String> = Vec::new();
        let mut params: Vec<Value> = Vec::new();

        if let Some(title) = &req.title {
            sets.push("title = ?".to_string());
            params.push(title.into());
        }

        if let Some(body) = &req.body_rich_html {
            sets.push("bodyRichHtml = ?".to_string());
            params.push(body.into());
        }

        if let Some(pinned) = req.pinned {
            sets.push("pinned = ?".to_string());
            params.push(pinned.into());
        }

        if let Some(archived) = req.archived {
            sets.push("archived = ?".to_string());
            params.push(archived.into());
        }

        if let Some(is_locked) = req.is_locked {
            sets.push("isLocked = ?".to_string());
            params.push(is_locked.into());
        }

        if let Some(folder_id) = &req.folder_id {
            sets.push("folderId = ?".to_string());
            params.push(folder_id.clone().into());
        }

        if let Some(font_family) = &req.font_family {
            sets.push("fontFamily = ?".to_string());
            params.push(font_family.clone().into());
        }

        if sets.is_empty() && req.plain_text_preview.is_none() {
            return self.get(&req.id).await;
        }

        // SET expressions see the old row, so the lock test uses the
        // incoming value when one was supplied
        let locked_expr = match req.is_locked {
            Some(is_locked) => {
                params.push(is_locked.into());
                "?"
            }
            None => "isLocked",
        };
        let preview_expr = match &req.plain_text_preview {
            Some(preview) => {
                params.push(bounded_preview(preview).into());
                "?"
            }
            None => "plainTextPreview",
        };
        sets.push(format!(
            "plainTextPreview = CASE WHEN {} THEN '' ELSE {} END",
            locked_expr, preview_expr
        ));

        sets.push("updatedAt = ?".to_string());
        params.push(next_timestamp().into());
        params.push(req.id.as_str().into());

        let sql = format!("UPDATE Notes SET {} WHERE id = ?", sets.join(", "));
        let result = self.db.execute(&sql, &params).await?;

        if result.changes == 0 {
            return Err(AppError::NoteNotFound(req.id));
        }

        tracing::debug!("Updated note: {}", req.id);
        self.get(&req.id).await
    }

    /// Delete a note. Attachment rows cascade in the store; their backing
    /// files are removed first, and failures there never block the delete.
    pub async fn delete(&self, id: &str) -> Result<()> {
        // Stored files are content-addressed, so another note may share one
        let unshared = self
            .db
            .query::<(String,)>(
                r#"
                SELECT DISTINCT a.uri FROM Attachments a
                WHERE a.noteId = ?
                AND NOT EXISTS (
                    SELECT 1 FROM Attachments b WHERE b.uri = a.uri AND b.noteId != a.noteId
                )
                "#,
                &[id.into()],
            )
            .await;

        match unshared {
            Ok(uris) => {
                for (uri,) in uris {
                    if let Err(e) = self.files.delete_file(&uri).await {
                        tracing::warn!("Failed to delete attachment file {}: {}", uri, e);
                    }
                }
            }
            Err(e) => tracing::warn!("Failed to list attachments of note {}: {}", id, e),
        }

        let result = self
            .db
            .execute("DELETE FROM Notes WHERE id = ?", &[id.into()])
            .await?;

        if result.changes == 0 {
            return Err(AppError::NoteNotFound(id.to_string()));
        }

        tracing::debug!("Deleted note: {}", id);
        Ok(())
    }

    /// Full-text search over title and preview with prefix matching on the
    /// last term. Falls back to a substring match if the index query fails.
    pub async fn search(&self, query: &str) -> Result<Vec<Note>> {
        let sanitized = sanitize_search_query(query);

        if sanitized.is_empty() {
            return self.get_all().await;
        }

        let fts = self
            .db
            .query(
                r#"
                SELECT n.* FROM Notes n
                JOIN NotesSearch ON n.rowid = NotesSearch.rowid
                WHERE NotesSearch MATCH ?
                ORDER BY n.pinned DESC, n.updatedAt DESC
                "#,
                &[format!("{}*", sanitized).into()],
            )
            .await;

        match fts {
            Ok(notes) => Ok(notes),
            Err(e) => {
                tracing::warn!("FTS search failed, falling back to LIKE search: {}", e);
                let pattern = format!("%{}%", sanitized);
                self.db
                    .query(
                        &format!(
                            "SELECT * FROM Notes WHERE title LIKE ? OR plainTextPreview LIKE ? {}",
                            ORDER_BY_PINNED_RECENT
                        ),
                        &[pattern.as_str().into(), pattern.as_str().into()],
                    )
                    .await
            }
        }
    }
}

/// Remove FTS syntax characters and surrounding whitespace
pub fn sanitize_search_query(query: &str) -> String {
    query
        .chars()
        .filter(|c| !SEARCH_SPECIAL_CHARS.contains(c))
        .collect::<String>()
        .trim()
        .to_string()
}

fn bounded_preview(text: &str) -> String {
    text.trim().chars().take(PREVIEW_MAX_CHARS).collect()
}

/// Plain-text excerpt of editor HTML: tags dropped, common entities
/// decoded, whitespace collapsed
pub fn preview_from_html(html: &str) -> String {
    let mut text = String::with_capacity(html.len());
    let mut in_tag = false;

    for c in html.chars() {
        match c {
            '<' => in_tag = true,
            '>' if in_tag => {
                in_tag = false;
                text.push(' ');
            }
            _ if !in_tag => text.push(c),
            _ => {}
        }
    }

    let decoded = text
        .replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&");

    bounded_preview(&decoded.split_whitespace().collect::<Vec<_>>().join(" "))
}
