//! Attachments service
//!
//! Handles file attachments for notes.
//! Integrates AttachmentRepository and FileStore.

use crate::config::MAX_ATTACHMENT_NAME_LENGTH;
use crate::database::{Attachment, AttachmentKind, AttachmentRepository, CreateAttachmentRequest};
use crate::error::{AppError, Result};
use crate::storage::FileStore;
use std::path::Path;

/// Service for managing attachments
#[derive(Clone)]
pub struct AttachmentsService {
    repo: AttachmentRepository,
    files: FileStore,
}

impl AttachmentsService {
    pub fn new(repo: AttachmentRepository, files: FileStore) -> Self {
        Self { repo, files }
    }

    /// Copy `source` into the file store and attach it to a note.
    /// `name` overrides the display name taken from the source file.
    pub async fn add_attachment(
        &self,
        note_id: &str,
        source: &Path,
        name: Option<&str>,
    ) -> Result<Attachment> {
        let display_name = match name {
            Some(name) => name.to_string(),
            None => source
                .file_name()
                .and_then(|n| n.to_str())
                .map(str::to_string)
                .ok_or_else(|| {
                    AppError::InvalidInput(format!("Not a file path: {}", source.display()))
                })?,
        };
        let safe_name = sanitize_filename(&display_name);

        tracing::info!("Adding attachment: {} to note: {}", safe_name, note_id);

        let mime_type = mime_type_for(source);
        let kind = if mime_type.is_some_and(|m| m.starts_with("image/")) {
            AttachmentKind::Image
        } else {
            AttachmentKind::File
        };

        let file_size = tokio::fs::metadata(source)
            .await
            .ok()
            .and_then(|m| i64::try_from(m.len()).ok());
        let uri = self.files.save_file(source).await?;

        let created = self
            .repo
            .create(CreateAttachmentRequest {
                note_id: note_id.to_string(),
                kind,
                uri: uri.clone(),
                name: Some(safe_name),
                mime_type: mime_type.map(str::to_string),
                file_size,
                thumbnail_uri: None,
            })
            .await;

        match created {
            Ok(attachment) => {
                tracing::info!("Attachment created: {}", attachment.id);
                Ok(attachment)
            }
            Err(e) => {
                self.release_file(&uri).await;
                Err(e)
            }
        }
    }

    /// List attachments for a note
    pub async fn list_attachments(&self, note_id: &str) -> Result<Vec<Attachment>> {
        self.repo.get_by_note_id(note_id).await
    }

    /// Read the stored bytes of an attachment
    pub async fn read_attachment(&self, attachment_id: &str) -> Result<Vec<u8>> {
        let attachment = self.repo.get(attachment_id).await?;
        self.files.read(&attachment.uri).await
    }

    /// Delete an attachment and, once nothing else refers to it, its file
    pub async fn delete_attachment(&self, attachment_id: &str) -> Result<()> {
        tracing::info!("Deleting attachment: {}", attachment_id);

        let attachment = self.repo.delete(attachment_id).await?;
        self.release_file(&attachment.uri).await;

        Ok(())
    }

    /// Remove a stored file that no attachment row points at any more.
    /// Failures are logged; the rows are the source of truth.
    async fn release_file(&self, uri: &str) {
        match self.repo.count_by_uri(uri).await {
            Ok(0) => {
                if let Err(e) = self.files.delete_file(uri).await {
                    tracing::warn!("Failed to delete attachment file {}: {}", uri, e);
                }
            }
            Ok(_) => tracing::debug!("Attachment file still referenced: {}", uri),
            Err(e) => tracing::warn!("Could not check references to {}: {}", uri, e),
        }
    }
}

/// Sanitize filename to prevent path traversal attacks
fn sanitize_filename(filename: &str) -> String {
    let mut name: String = filename
        .chars()
        .filter(|c| *c != '/' && *c != '\\' && *c != '\0')
        .collect();

    // Removing one ".." can join two dots into another
    while name.contains("..") {
        name = name.replace("..", "");
    }

    let name: String = name.chars().take(MAX_ATTACHMENT_NAME_LENGTH).collect();
    if name.is_empty() {
        "attachment".to_string()
    } else {
        name
    }
}

fn mime_type_for(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    let mime = match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "bmp" => "image/bmp",
        "svg" => "image/svg+xml",
        "heic" => "image/heic",
        "pdf" => "application/pdf",
        "txt" => "text/plain",
        "md" => "text/markdown",
        "html" | "htm" => "text/html",
        "json" => "application/json",
        "zip" => "application/zip",
        "mp3" => "audio/mpeg",
        "m4a" => "audio/mp4",
        "mp4" => "video/mp4",
        _ => return None,
    };
    Some(mime)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::repository::test_support::create_test_db;
    use crate::database::{CreateNoteRequest, NoteRepository};
    use crate::storage::file_store::calculate_hash;
    use tempfile::TempDir;

    async fn create_test_service() -> (AttachmentsService, NoteRepository, TempDir) {
        let (db, temp) = create_test_db();
        let files = FileStore::new(temp.path().join("attachments"));
        files.initialize().await.unwrap();

        let notes = NoteRepository::new(db.clone(), files.clone());
        let service = AttachmentsService::new(AttachmentRepository::new(db), files);
        (service, notes, temp)
    }

    #[tokio::test]
    async fn test_add_and_read_attachment() {
        let (service, notes, temp) = create_test_service().await;
        let note = notes.create(CreateNoteRequest::default()).await.unwrap();

        let source = temp.path().join("scan.png");
        std::fs::write(&source, b"png bytes").unwrap();

        let attachment = service.add_attachment(&note.id, &source, None).await.unwrap();

        assert_eq!(attachment.kind, AttachmentKind::Image);
        assert_eq!(attachment.name.as_deref(), Some("scan.png"));
        assert_eq!(attachment.mime_type.as_deref(), Some("image/png"));
        assert_eq!(attachment.file_size, Some(9));
        assert_ne!(Path::new(&attachment.uri), source.as_path());

        let data = service.read_attachment(&attachment.id).await.unwrap();
        assert_eq!(data, b"png bytes");
    }

    #[tokio::test]
    async fn test_generic_file_kind() {
        let (service, notes, temp) = create_test_service().await;
        let note = notes.create(CreateNoteRequest::default()).await.unwrap();

        let source = temp.path().join("data.bin");
        std::fs::write(&source, b"\x00\x01").unwrap();

        let attachment = service
            .add_attachment(&note.id, &source, Some("../report.bin"))
            .await
            .unwrap();

        assert_eq!(attachment.kind, AttachmentKind::File);
        assert!(attachment.mime_type.is_none());
        assert_eq!(attachment.name.as_deref(), Some("report.bin"));
    }

    #[tokio::test]
    async fn test_delete_keeps_shared_file() {
        let (service, notes, temp) = create_test_service().await;
        let first_note = notes.create(CreateNoteRequest::default()).await.unwrap();
        let second_note = notes.create(CreateNoteRequest::default()).await.unwrap();

        let source = temp.path().join("same.txt");
        std::fs::write(&source, b"shared").unwrap();

        let first = service.add_attachment(&first_note.id, &source, None).await.unwrap();
        let second = service.add_attachment(&second_note.id, &source, None).await.unwrap();
        assert_eq!(first.uri, second.uri);

        service.delete_attachment(&first.id).await.unwrap();
        assert!(service.files.exists(&second.uri).await);

        // Deleting the last owning note removes the file
        notes.delete(&second_note.id).await.unwrap();
        assert!(!service.files.exists(&second.uri).await);
    }

    #[tokio::test]
    async fn test_failed_insert_releases_file() {
        let (service, _notes, temp) = create_test_service().await;

        let source = temp.path().join("orphan.txt");
        std::fs::write(&source, b"orphan").unwrap();

        let result = service.add_attachment("missing-note", &source, None).await;
        assert!(result.is_err());

        let hash = calculate_hash(b"orphan");
        let expected = service
            .files
            .root()
            .join(&hash[0..2])
            .join(&hash[2..4])
            .join(format!("{}.txt", hash));
        assert!(!expected.exists());
    }

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("normal.txt"), "normal.txt");
        assert_eq!(sanitize_filename("../../../etc/passwd"), "etcpasswd");
        assert_eq!(sanitize_filename("a...b"), "a.b");
        assert_eq!(sanitize_filename("../.."), "attachment");
        assert_eq!(sanitize_filename("file\\name.txt"), "filename.txt");
        assert_eq!(sanitize_filename(&"x".repeat(400)).len(), MAX_ATTACHMENT_NAME_LENGTH);
    }
}
