//! Content-addressed attachment file storage
//!
//! Copies attachment files into the data directory, keyed by the SHA-256
//! of their contents. The original extension is kept so the stored file
//! still opens with the right application.
//!
//! Example: a PNG hashing to "abcd1234..." is stored at
//! "attachments/ab/cd/abcd1234....png"

use crate::error::{AppError, Result};
use sha2::{Digest, Sha256};
use std::path::{Component, Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;

/// Content-addressed file store
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    /// Create a file store at the given root directory
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    /// Initialize the file store (create directory if needed)
    pub async fn initialize(&self) -> Result<()> {
        fs::create_dir_all(&self.root).await?;
        tracing::info!("File store initialized at: {:?}", self.root);
        Ok(())
    }

    /// Copy a file into the store and return the path of the stored copy
    pub async fn save_file(&self, source: &Path) -> Result<String> {
        let data = fs::read(source).await.map_err(|e| {
            AppError::FileStore(format!("Cannot read {}: {}", source.display(), e))
        })?;

        let extension = source.extension().and_then(|ext| ext.to_str());
        self.write(&data, extension).await
    }

    /// Store raw bytes and return the path of the stored file
    pub async fn write(&self, data: &[u8], extension: Option<&str>) -> Result<String> {
        let hash = calculate_hash(data);
        let path = self.path_for(&hash, extension);

        if path.exists() {
            tracing::debug!("File already stored: {}", hash);
            return Ok(path.to_string_lossy().into_owned());
        }

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        // Write to temp file first so a crash never leaves a partial file
        // under the final name
        let temp_path = path.with_extension("tmp");
        let mut file = fs::File::create(&temp_path).await?;
        file.write_all(data).await?;
        file.sync_all().await?;

        fs::rename(&temp_path, &path).await?;

        tracing::debug!("Stored file: {} ({} bytes)", hash, data.len());

        Ok(path.to_string_lossy().into_owned())
    }

    /// Read a stored file
    pub async fn read(&self, uri: &str) -> Result<Vec<u8>> {
        let path = self.resolve(uri)?;

        if !path.exists() {
            return Err(AppError::FileStore(format!("File not found: {}", uri)));
        }

        Ok(fs::read(&path).await?)
    }

    /// Check if a stored file exists
    pub async fn exists(&self, uri: &str) -> bool {
        match self.resolve(uri) {
            Ok(path) => fs::try_exists(path).await.unwrap_or(false),
            Err(_) => false,
        }
    }

    /// Delete a stored file; a file that is already gone is not an error.
    /// References outside the store root are refused.
    pub async fn delete_file(&self, uri: &str) -> Result<()> {
        let path = self.resolve(uri)?;

        match fs::remove_file(&path).await {
            Ok(()) => {
                tracing::debug!("Deleted file: {}", uri);
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Get file store root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map a reference onto a path inside the store. References returned by
    /// `write` are used as-is, other relative references are taken relative
    /// to the root, and anything that would land outside it is rejected.
    fn resolve(&self, uri: &str) -> Result<PathBuf> {
        let path = Path::new(uri);

        let escapes = path.components().any(|c| {
            !matches!(
                c,
                Component::Normal(_) | Component::RootDir | Component::Prefix(_)
            )
        });
        let resolved = if path.is_absolute() || path.starts_with(&self.root) {
            path.to_path_buf()
        } else {
            self.root.join(path)
        };

        if escapes || !resolved.starts_with(&self.root) {
            return Err(AppError::FileStore(format!(
                "Reference outside the file store: {}",
                uri
            )));
        }

        Ok(resolved)
    }

    fn path_for(&self, hash: &str, extension: Option<&str>) -> PathBuf {
        let file_name = match extension.filter(|ext| !ext.is_empty()) {
            Some(ext) => format!("{}.{}", hash, ext.to_ascii_lowercase()),
            None => hash.to_string(),
        };
        self.root.join(&hash[0..2]).join(&hash[2..4]).join(file_name)
    }
}

/// Calculate SHA-256 hash of data
pub fn calculate_hash(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}
