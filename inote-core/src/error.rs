//! Error types for the Inote persistence core
//!
//! All errors use thiserror for structured error handling.
//! Storage-engine failures are classified once, when they cross into
//! [`AppError`], so the connection manager and the retrying executor can
//! branch on a [`StoreErrorKind`] instead of matching message text.

use thiserror::Error;

// SQLite primary result codes (the low byte of an extended code)
const SQLITE_CORRUPT: i32 = 11;
const SQLITE_MISUSE: i32 = 21;
const SQLITE_NOTADB: i32 = 26;

/// Message fragments SQLite uses when the file itself is damaged
const CORRUPTION_SIGNATURES: &[&str] = &[
    "malformed",
    "corrupt",
    "file is not a database",
];

/// Message fragments for a handle that is gone but whose file is fine.
/// "prepare" covers statement preparation failing on a dead handle; SQLite
/// syntax errors read "near ...: syntax error" and stay fatal.
const STALE_HANDLE_SIGNATURES: &[&str] = &[
    "prepare",
    "closed",
    "null pointer",
    "bad parameter or other api misuse",
];

/// How the store should react to a failed statement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreErrorKind {
    /// Handle is stale: invalidate it and retry once on a fresh one
    Transient,
    /// Backing file is damaged: delete and recreate the store, then retry once
    Corruption,
    /// Anything else; propagated untouched
    Fatal,
}

impl StoreErrorKind {
    /// Map an sqlx error onto the recovery taxonomy
    pub fn classify(err: &sqlx::Error) -> Self {
        match err {
            sqlx::Error::PoolClosed | sqlx::Error::PoolTimedOut | sqlx::Error::WorkerCrashed => {
                StoreErrorKind::Transient
            }
            sqlx::Error::Io(_) => StoreErrorKind::Transient,
            sqlx::Error::Database(db) => db
                .code()
                .and_then(|code| code.parse::<i32>().ok())
                .and_then(Self::from_sqlite_code)
                .unwrap_or_else(|| Self::from_message(db.message())),
            other => Self::from_message(&other.to_string()),
        }
    }

    fn from_sqlite_code(code: i32) -> Option<Self> {
        match code & 0xff {
            SQLITE_CORRUPT | SQLITE_NOTADB => Some(StoreErrorKind::Corruption),
            SQLITE_MISUSE => Some(StoreErrorKind::Transient),
            _ => None,
        }
    }

    fn from_message(message: &str) -> Self {
        let lower = message.to_ascii_lowercase();
        if CORRUPTION_SIGNATURES.iter().any(|sig| lower.contains(sig)) {
            StoreErrorKind::Corruption
        } else if STALE_HANDLE_SIGNATURES.iter().any(|sig| lower.contains(sig)) {
            StoreErrorKind::Transient
        } else {
            StoreErrorKind::Fatal
        }
    }

    /// Whether a retry on a fresh handle may succeed
    pub fn is_recoverable(self) -> bool {
        !matches!(self, StoreErrorKind::Fatal)
    }
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {source}")]
    Database {
        kind: StoreErrorKind,
        #[source]
        source: sqlx::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("ZIP error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("Note not found: {0}")]
    NoteNotFound(String),

    #[error("Folder not found: {0}")]
    FolderNotFound(String),

    #[error("Attachment not found: {0}")]
    AttachmentNotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Backup error: {0}")]
    Backup(String),

    #[error("File store error: {0}")]
    FileStore(String),
}

impl AppError {
    /// Recovery classification; non-database errors are never retried
    pub fn store_kind(&self) -> StoreErrorKind {
        match self {
            AppError::Database { kind, .. } => *kind,
            _ => StoreErrorKind::Fatal,
        }
    }
}

impl From<sqlx::Error> for AppError {
    fn from(source: sqlx::Error) -> Self {
        AppError::Database {
            kind: StoreErrorKind::classify(&source),
            source,
        }
    }
}

impl serde::Serialize for AppError {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_errors_are_transient() {
        assert_eq!(
            StoreErrorKind::classify(&sqlx::Error::PoolClosed),
            StoreErrorKind::Transient
        );
        assert_eq!(
            StoreErrorKind::classify(&sqlx::Error::WorkerCrashed),
            StoreErrorKind::Transient
        );
    }

    #[test]
    fn test_corruption_messages() {
        let err = sqlx::Error::Protocol("database disk image is malformed".to_string());
        assert_eq!(StoreErrorKind::classify(&err), StoreErrorKind::Corruption);

        let err = sqlx::Error::Protocol("file is not a database".to_string());
        assert_eq!(StoreErrorKind::classify(&err), StoreErrorKind::Corruption);
    }

    #[test]
    fn test_prepare_failures_are_transient() {
        let err = sqlx::Error::Protocol("failed to prepare statement".to_string());
        assert_eq!(StoreErrorKind::classify(&err), StoreErrorKind::Transient);

        let err = sqlx::Error::Protocol("near \"SELEC\": syntax error".to_string());
        assert_eq!(StoreErrorKind::classify(&err), StoreErrorKind::Fatal);
    }

    #[test]
    fn test_unrecognized_errors_are_fatal() {
        let err = sqlx::Error::RowNotFound;
        assert_eq!(StoreErrorKind::classify(&err), StoreErrorKind::Fatal);
        assert!(!StoreErrorKind::Fatal.is_recoverable());
    }

    #[test]
    fn test_extended_codes_use_primary_byte() {
        // SQLITE_CORRUPT_VTAB = 11 | (1 << 8)
        assert_eq!(
            StoreErrorKind::from_sqlite_code(267),
            Some(StoreErrorKind::Corruption)
        );
        assert_eq!(StoreErrorKind::from_sqlite_code(19), None);
    }

    #[test]
    fn test_conversion_tags_kind() {
        let err: AppError = sqlx::Error::PoolClosed.into();
        assert_eq!(err.store_kind(), StoreErrorKind::Transient);

        let err = AppError::NoteNotFound("n1".to_string());
        assert_eq!(err.store_kind(), StoreErrorKind::Fatal);
    }
}
