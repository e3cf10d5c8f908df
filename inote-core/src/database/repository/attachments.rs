//! Attachment repository
//!
//! Rows only; the files they point at belong to the
//! [`FileStore`](crate::storage::FileStore). Deleting a note cascades to
//! its attachment rows in the store itself.

use crate::database::executor::Database;
use crate::database::models::{next_timestamp, Attachment, CreateAttachmentRequest};
use crate::error::{AppError, Result};
use uuid::Uuid;

#[derive(Clone)]
pub struct AttachmentRepository {
    db: Database,
}

impl AttachmentRepository {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Create an attachment
    pub async fn create(&self, req: CreateAttachmentRequest) -> Result<Attachment> {
        let attachment = Attachment {
            id: Uuid::new_v4().to_string(),
            note_id: req.note_id,
            kind: req.kind,
            uri: req.uri,
            name: req.name,
            mime_type: req.mime_type,
            file_size: req.file_size,
            thumbnail_uri: req.thumbnail_uri,
            created_at: next_timestamp(),
        };

        self.db
            .with_retry(|pool| {
                let attachment = &attachment;
                async move {
                    sqlx::query(
                        r#"
                        INSERT INTO Attachments (
                            id, noteId, type, uri, name, mimeType, fileSize, thumbnailUri, createdAt
                        )
                        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                        "#,
                    )
                    .bind(&attachment.id)
                    .bind(&attachment.note_id)
                    .bind(attachment.kind)
                    .bind(&attachment.uri)
                    .bind(&attachment.name)
                    .bind(&attachment.mime_type)
                    .bind(attachment.file_size)
                    .bind(&attachment.thumbnail_uri)
                    .bind(attachment.created_at)
                    .execute(&pool)
                    .await?;
                    Ok(())
                }
            })
            .await?;

        tracing::debug!(
            "Created attachment: {} for note: {}",
            attachment.id,
            attachment.note_id
        );
        Ok(attachment)
    }

    /// Get an attachment by ID
    pub async fn get(&self, id: &str) -> Result<Attachment> {
        self.db
            .query_optional("SELECT * FROM Attachments WHERE id = ?", &[id.into()])
            .await?
            .ok_or_else(|| AppError::AttachmentNotFound(id.to_string()))
    }

    /// Attachments of a note, oldest first
    pub async fn get_by_note_id(&self, note_id: &str) -> Result<Vec<Attachment>> {
        self.db
            .query(
                "SELECT * FROM Attachments WHERE noteId = ? ORDER BY createdAt ASC",
                &[note_id.into()],
            )
            .await
    }

    /// Number of attachment rows pointing at a stored file
    pub async fn count_by_uri(&self, uri: &str) -> Result<i64> {
        self.db
            .query_scalar("SELECT COUNT(*) FROM Attachments WHERE uri = ?", &[uri.into()])
            .await
    }

    /// Delete an attachment row, returning it so the caller can drop the file
    pub async fn delete(&self, id: &str) -> Result<Attachment> {
        let attachment = self.get(id).await?;

        let result = self
            .db
            .execute("DELETE FROM Attachments WHERE id = ?", &[id.into()])
            .await?;

        if result.changes == 0 {
            return Err(AppError::AttachmentNotFound(id.to_string()));
        }

        tracing::debug!("Deleted attachment: {}", id);
        Ok(attachment)
    }
}
