//! Application context and initialization
//!
//! Builds the one connection manager for a data directory and hands the
//! executor to every repository and service. Nothing here is global: two
//! contexts over two directories are fully independent.

use crate::config::{StoreConfig, ATTACHMENTS_DIR_NAME, BACKUPS_DIR_NAME};
use crate::database::{
    AttachmentRepository, ConnectionManager, Database, FolderRepository, NoteRepository,
};
use crate::error::Result;
use crate::services::{AttachmentsService, BackupService};
use crate::storage::FileStore;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Central application context holding all repositories and services
#[derive(Clone)]
pub struct AppContext {
    pub data_dir: PathBuf,
    pub database: Database,
    pub folders: FolderRepository,
    pub notes: NoteRepository,
    pub attachments: AttachmentRepository,
    pub attachments_service: AttachmentsService,
    pub backup: BackupService,
}

impl AppContext {
    /// Set up a context over `data_dir` with default store settings
    pub async fn open(data_dir: impl AsRef<Path>) -> Result<Self> {
        let data_dir = data_dir.as_ref();
        Self::with_config(data_dir, StoreConfig::in_data_dir(data_dir)).await
    }

    /// Set up a context with explicit store settings. The store itself is
    /// opened lazily by the first statement.
    pub async fn with_config(data_dir: &Path, config: StoreConfig) -> Result<Self> {
        tracing::info!("Initializing application context at: {:?}", data_dir);

        tokio::fs::create_dir_all(data_dir).await?;
        tokio::fs::create_dir_all(data_dir.join(BACKUPS_DIR_NAME)).await?;

        let files = FileStore::new(data_dir.join(ATTACHMENTS_DIR_NAME));
        files.initialize().await?;

        let database = Database::new(Arc::new(ConnectionManager::new(config)));
        let attachments = AttachmentRepository::new(database.clone());

        Ok(Self {
            data_dir: data_dir.to_path_buf(),
            folders: FolderRepository::new(database.clone()),
            notes: NoteRepository::new(database.clone(), files.clone()),
            attachments_service: AttachmentsService::new(attachments.clone(), files),
            attachments,
            backup: BackupService::new(database.clone(), data_dir),
            database,
        })
    }

    pub fn manager(&self) -> &Arc<ConnectionManager> {
        self.database.manager()
    }

    /// Close the store handle
    pub async fn shutdown(&self) {
        self.manager().close().await;
        tracing::info!("Application context shut down");
    }
}
