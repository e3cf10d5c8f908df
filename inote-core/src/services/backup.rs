//! Backup service
//!
//! Exports the Folders, Notes and Attachments tables wholesale into a ZIP
//! archive holding `backup.json` and a `manifest.json` with checksums.
//!
//! Import is a bulk write that bypasses the repositories. Rows are upserted
//! by identity, folders before notes before attachments, and a row that
//! fails is logged and skipped without aborting the rest of the import.

use crate::config::{BACKUPS_DIR_NAME, BACKUP_FILE_PREFIX, BACKUP_FORMAT_VERSION};
use crate::database::{next_timestamp, Attachment, Database, Folder, Note, Value};
use crate::error::{AppError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tokio::fs;
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

const BACKUP_DATA_FILE: &str = "backup.json";
const MANIFEST_FILE: &str = "manifest.json";

/// Contents of `backup.json`
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupData {
    pub version: u32,
    pub exported_at: DateTime<Utc>,
    pub folders: Vec<Folder>,
    pub notes: Vec<Note>,
    pub attachments: Vec<Attachment>,
}

/// Backup manifest structure
#[derive(Debug, Serialize, Deserialize)]
pub struct BackupManifest {
    pub version: u32,
    pub app_version: String,
    pub timestamp: String,
    pub files: Vec<FileEntry>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct FileEntry {
    pub path: String,
    pub size: u64,
    pub checksum: String,
}

/// Per-table outcome of an import
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TableSummary {
    pub imported: usize,
    pub failed: usize,
}

impl TableSummary {
    fn record(&mut self, ok: bool) {
        if ok {
            self.imported += 1;
        } else {
            self.failed += 1;
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ImportSummary {
    pub folders: TableSummary,
    pub notes: TableSummary,
    pub attachments: TableSummary,
}

/// A backup archive on disk
#[derive(Debug, Clone, Serialize)]
pub struct BackupInfo {
    pub path: PathBuf,
    pub size: u64,
}

/// Backup service
#[derive(Clone)]
pub struct BackupService {
    db: Database,
    backups_dir: PathBuf,
}

impl BackupService {
    pub fn new(db: Database, app_data_dir: &Path) -> Self {
        Self {
            db,
            backups_dir: app_data_dir.join(BACKUPS_DIR_NAME),
        }
    }

    pub fn backups_dir(&self) -> &Path {
        &self.backups_dir
    }

    /// Write a backup archive of all folders, notes and attachments
    pub async fn export_backup(&self) -> Result<PathBuf> {
        tracing::info!("Exporting backup");

        fs::create_dir_all(&self.backups_dir).await?;

        let data = BackupData {
            version: BACKUP_FORMAT_VERSION,
            exported_at: next_timestamp(),
            folders: self.db.query("SELECT * FROM Folders", &[]).await?,
            notes: self.db.query("SELECT * FROM Notes", &[]).await?,
            attachments: self.db.query("SELECT * FROM Attachments", &[]).await?,
        };

        let timestamp = data.exported_at.format("%Y%m%d-%H%M%S%6f").to_string();
        let backup_path = self
            .backups_dir
            .join(format!("{}{}.zip", BACKUP_FILE_PREFIX, timestamp));
        let temp_path = backup_path.with_extension("zip.tmp");

        let data_json = serde_json::to_vec_pretty(&data)?;
        let manifest = BackupManifest {
            version: BACKUP_FORMAT_VERSION,
            app_version: env!("CARGO_PKG_VERSION").to_string(),
            timestamp: data.exported_at.to_rfc3339(),
            files: vec![FileEntry {
                path: BACKUP_DATA_FILE.to_string(),
                size: data_json.len() as u64,
                checksum: calculate_checksum(&data_json),
            }],
        };
        let manifest_json = serde_json::to_vec_pretty(&manifest)?;

        {
            let file = std::fs::File::create(&temp_path)?;
            let mut zip = ZipWriter::new(file);
            let options =
                SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);

            zip.start_file(BACKUP_DATA_FILE, options)?;
            zip.write_all(&data_json)?;

            zip.start_file(MANIFEST_FILE, options)?;
            zip.write_all(&manifest_json)?;

            zip.finish()?;
        }

        fs::rename(&temp_path, &backup_path).await?;

        tracing::info!(
            "Backup exported: {:?} ({} folders, {} notes, {} attachments)",
            backup_path,
            data.folders.len(),
            data.notes.len(),
            data.attachments.len()
        );

        Ok(backup_path)
    }

    /// Upsert the contents of a backup archive into the store
    pub async fn import_backup(&self, backup_path: &Path) -> Result<ImportSummary> {
        tracing::info!("Importing backup: {:?}", backup_path);

        let archive_bytes = fs::read(backup_path).await?;
        let data = read_backup_data(&archive_bytes)?;

        tracing::info!(
            "Backup version: {}, exported at: {}",
            data.version,
            data.exported_at
        );

        let mut summary = ImportSummary::default();

        for folder in &data.folders {
            let result = self.upsert_folder(folder).await;
            if let Err(e) = &result {
                tracing::warn!("Skipping folder {} during import: {}", folder.id, e);
            }
            summary.folders.record(result.is_ok());
        }

        for note in &data.notes {
            let result = self.upsert_note(note).await;
            if let Err(e) = &result {
                tracing::warn!("Skipping note {} during import: {}", note.id, e);
            }
            summary.notes.record(result.is_ok());
        }

        for attachment in &data.attachments {
            let result = self.upsert_attachment(attachment).await;
            if let Err(e) = &result {
                tracing::warn!("Skipping attachment {} during import: {}", attachment.id, e);
            }
            summary.attachments.record(result.is_ok());
        }

        tracing::info!("Import completed: {:?}", summary);
        Ok(summary)
    }

    /// List backup archives, newest first
    pub async fn list_backups(&self) -> Result<Vec<BackupInfo>> {
        let mut backups = Vec::new();

        if !self.backups_dir.exists() {
            return Ok(backups);
        }

        let mut entries = fs::read_dir(&self.backups_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let is_backup = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with(BACKUP_FILE_PREFIX) && n.ends_with(".zip"));

            if is_backup {
                let size = entry.metadata().await?.len();
                backups.push(BackupInfo { path, size });
            }
        }

        // Names embed a sortable timestamp
        backups.sort_by(|a, b| b.path.cmp(&a.path));
        Ok(backups)
    }

    // Upserts use ON CONFLICT DO UPDATE rather than INSERT OR REPLACE: a
    // REPLACE deletes the old row without firing the delete trigger, which
    // would leave a stale entry in the search index.

    async fn upsert_folder(&self, folder: &Folder) -> Result<()> {
        self.db
            .execute(
                r#"
                INSERT INTO Folders (id, name, color, parentId, orderIndex, createdAt, updatedAt)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(id) DO UPDATE SET
                    name = excluded.name,
                    color = excluded.color,
                    parentId = excluded.parentId,
                    orderIndex = excluded.orderIndex,
                    createdAt = excluded.createdAt,
                    updatedAt = excluded.updatedAt
                "#,
                &[
                    folder.id.as_str().into(),
                    folder.name.as_str().into(),
                    folder.color.clone().into(),
                    folder.parent_id.clone().into(),
                    folder.order_index.into(),
                    folder.created_at.into(),
                    folder.updated_at.into(),
                ],
            )
            .await?;
        Ok(())
    }

    async fn upsert_note(&self, note: &Note) -> Result<()> {
        let preview: Value = if note.is_locked {
            "".into()
        } else {
            note.plain_text_preview.clone().into()
        };

        self.db
            .execute(
                r#"
                INSERT INTO Notes (
                    id, folderId, title, bodyRichHtml, plainTextPreview,
                    pinned, archived, isLocked, fontFamily, createdAt, updatedAt
                )
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(id) DO UPDATE SET
                    folderId = excluded.folderId,
                    title = excluded.title,
                    bodyRichHtml = excluded.bodyRichHtml,
                    plainTextPreview = excluded.plainTextPreview,
                    pinned = excluded.pinned,
                    archived = excluded.archived,
                    isLocked = excluded.isLocked,
                    fontFamily = excluded.fontFamily,
                    createdAt = excluded.createdAt,
                    updatedAt = excluded.updatedAt
                "#,
                &[
                    note.id.as_str().into(),
                    note.folder_id.clone().into(),
                    note.title.clone().into(),
                    note.body_rich_html.clone().into(),
                    preview,
                    note.pinned.into(),
                    note.archived.into(),
                    note.is_locked.into(),
                    note.font_family.clone().into(),
                    note.created_at.into(),
                    note.updated_at.into(),
                ],
            )
            .await?;
        Ok(())
    }

    async fn upsert_attachment(&self, attachment: &Attachment) -> Result<()> {
        self.db
            .execute(
                r#"
                INSERT INTO Attachments (
                    id, noteId, type, uri, name, mimeType, fileSize, thumbnailUri, createdAt
                )
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(id) DO UPDATE SET
                    noteId = excluded.noteId,
                    type = excluded.type,
                    uri = excluded.uri,
                    name = excluded.name,
                    mimeType = excluded.mimeType,
                    fileSize = excluded.fileSize,
                    thumbnailUri = excluded.thumbnailUri,
                    createdAt = excluded.createdAt
                "#,
                &[
                    attachment.id.as_str().into(),
                    attachment.note_id.as_str().into(),
                    attachment.kind.as_str().into(),
                    attachment.uri.as_str().into(),
                    attachment.name.clone().into(),
                    attachment.mime_type.clone().into(),
                    attachment.file_size.into(),
                    attachment.thumbnail_uri.clone().into(),
                    attachment.created_at.into(),
                ],
            )
            .await?;
        Ok(())
    }
}

/// Open an archive, verify it against its manifest and decode the data
fn read_backup_data(archive_bytes: &[u8]) -> Result<BackupData> {
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(archive_bytes))?;

    let manifest: BackupManifest = {
        let mut file = archive.by_name(MANIFEST_FILE)?;
        let mut contents = Vec::new();
        file.read_to_end(&mut contents)?;
        serde_json::from_slice(&contents)?
    };

    if manifest.version > BACKUP_FORMAT_VERSION {
        return Err(AppError::Backup(format!(
            "Unsupported backup version {} (newest supported is {})",
            manifest.version, BACKUP_FORMAT_VERSION
        )));
    }

    let entry = manifest
        .files
        .iter()
        .find(|f| f.path == BACKUP_DATA_FILE)
        .ok_or_else(|| AppError::Backup(format!("Manifest does not list {}", BACKUP_DATA_FILE)))?;

    let contents = {
        let mut file = archive.by_name(BACKUP_DATA_FILE)?;
        let mut contents = Vec::new();
        file.read_to_end(&mut contents)?;
        contents
    };

    let actual_checksum = calculate_checksum(&contents);
    if actual_checksum != entry.checksum {
        return Err(AppError::Backup(format!(
            "Checksum mismatch for {}: expected {}, got {}",
            entry.path, entry.checksum, actual_checksum
        )));
    }

    let data: BackupData = serde_json::from_slice(&contents)?;
    if data.version > BACKUP_FORMAT_VERSION {
        return Err(AppError::Backup(format!(
            "Unsupported backup version {}",
            data.version
        )));
    }

    Ok(data)
}

fn calculate_checksum(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}
