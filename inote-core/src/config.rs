//! Application configuration constants
//!
//! Central location for file names, recovery timings and validation
//! boundaries used throughout the persistence layer.

use std::path::{Path, PathBuf};
use std::time::Duration;

// ===== Data Directory Layout =====

/// File name of the embedded database inside the data directory
pub const DATABASE_FILE_NAME: &str = "inote.db";

/// Directory (under the data directory) holding attachment copies
pub const ATTACHMENTS_DIR_NAME: &str = "attachments";

/// Directory (under the data directory) holding exported backups
pub const BACKUPS_DIR_NAME: &str = "backups";

// ===== Connection Settings =====

/// How long SQLite waits on a locked database before failing a statement
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// The manager owns exactly one live connection.
pub const DEFAULT_MAX_CONNECTIONS: u32 = 1;

// ===== Recovery Timings =====

/// Pause after closing a broken handle, before the store file is deleted.
/// Gives the OS time to release file handles.
pub const RECOVERY_CLOSE_DELAY: Duration = Duration::from_millis(200);

/// Pause after deleting the store file, before it is reopened.
pub const RECOVERY_REOPEN_DELAY: Duration = Duration::from_millis(100);

// ===== Content Limits =====

/// Maximum length of a note's plain-text preview, in characters
pub const PREVIEW_MAX_CHARS: usize = 100;

/// Maximum length of a stored attachment display name
pub const MAX_ATTACHMENT_NAME_LENGTH: usize = 255;

// ===== Backup Format =====

/// Version written into every exported backup
pub const BACKUP_FORMAT_VERSION: u32 = 1;

/// File name prefix for exported backup archives
pub const BACKUP_FILE_PREFIX: &str = "notes-backup-";

/// Settings for the embedded store and its connection manager
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub path: PathBuf,
    pub busy_timeout: Duration,
    pub max_connections: u32,
    pub recovery_close_delay: Duration,
    pub recovery_reopen_delay: Duration,
}

impl StoreConfig {
    /// Configuration for a store at `path` with default timings
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            busy_timeout: DEFAULT_BUSY_TIMEOUT,
            max_connections: DEFAULT_MAX_CONNECTIONS,
            recovery_close_delay: RECOVERY_CLOSE_DELAY,
            recovery_reopen_delay: RECOVERY_REOPEN_DELAY,
        }
    }

    /// Configuration for the default database file inside a data directory
    pub fn in_data_dir(data_dir: &Path) -> Self {
        Self::new(data_dir.join(DATABASE_FILE_NAME))
    }

    pub fn with_busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }

    /// Override both recovery pauses
    pub fn with_recovery_delays(mut self, close_delay: Duration, reopen_delay: Duration) -> Self {
        self.recovery_close_delay = close_delay;
        self.recovery_reopen_delay = reopen_delay;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_use_constants() {
        let config = StoreConfig::in_data_dir(Path::new("/tmp/inote"));

        assert_eq!(config.path, Path::new("/tmp/inote").join(DATABASE_FILE_NAME));
        assert_eq!(config.max_connections, 1);
        assert_eq!(config.recovery_close_delay, RECOVERY_CLOSE_DELAY);
        assert_eq!(config.recovery_reopen_delay, RECOVERY_REOPEN_DELAY);
    }

    #[test]
    fn test_recovery_delays_override() {
        let config = StoreConfig::new("db.sqlite")
            .with_recovery_delays(Duration::from_millis(1), Duration::from_millis(2));

        assert_eq!(config.recovery_close_delay, Duration::from_millis(1));
        assert_eq!(config.recovery_reopen_delay, Duration::from_millis(2));
    }
}
