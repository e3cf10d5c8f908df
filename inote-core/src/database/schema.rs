//! Database schema and migrations
//!
//! The schema is an ordered list of idempotent statements applied every
//! time a handle is opened. Redefinition errors ("already exists",
//! "duplicate column") are expected on an existing store and skipped;
//! anything else aborts initialization.
//!
//! The `NotesSearch` FTS5 table is an external-content index over `Notes`.
//! Three triggers keep it in step with every insert, update and delete,
//! inside the same statement that changed the note.

use crate::error::Result;
use sqlx::sqlite::SqlitePool;

pub const TABLE_FOLDERS: &str = "Folders";
pub const TABLE_NOTES: &str = "Notes";
pub const TABLE_ATTACHMENTS: &str = "Attachments";
pub const TABLE_SYNC_METADATA: &str = "SyncMetadata";
pub const TABLE_NOTES_SEARCH: &str = "NotesSearch";

/// A single named schema statement
#[derive(Debug, Clone, Copy)]
pub struct Migration {
    pub name: &'static str,
    pub sql: &'static str,
}

pub const SCHEMA_V1: &[Migration] = &[
    Migration {
        name: "create_folders",
        sql: r#"
        CREATE TABLE IF NOT EXISTS Folders (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            color TEXT,
            parentId TEXT,
            orderIndex INTEGER NOT NULL DEFAULT 0,
            createdAt TEXT NOT NULL,
            updatedAt TEXT NOT NULL
        )
        "#,
    },
    Migration {
        name: "create_notes",
        sql: r#"
        CREATE TABLE IF NOT EXISTS Notes (
            id TEXT PRIMARY KEY,
            folderId TEXT,
            title TEXT,
            bodyRichHtml TEXT,
            plainTextPreview TEXT,
            pinned INTEGER NOT NULL DEFAULT 0,
            archived INTEGER NOT NULL DEFAULT 0,
            isLocked INTEGER NOT NULL DEFAULT 0,
            fontFamily TEXT,
            createdAt TEXT NOT NULL,
            updatedAt TEXT NOT NULL,
            FOREIGN KEY(folderId) REFERENCES Folders(id) ON DELETE SET NULL
        )
        "#,
    },
    // Stores created before font support lack this column
    Migration {
        name: "add_notes_font_family",
        sql: "ALTER TABLE Notes ADD COLUMN fontFamily TEXT",
    },
    Migration {
        name: "add_folders_parent_id",
        sql: "ALTER TABLE Folders ADD COLUMN parentId TEXT",
    },
    Migration {
        name: "create_attachments",
        sql: r#"
        CREATE TABLE IF NOT EXISTS Attachments (
            id TEXT PRIMARY KEY,
            noteId TEXT NOT NULL,
            type TEXT NOT NULL,
            uri TEXT NOT NULL,
            name TEXT,
            mimeType TEXT,
            fileSize INTEGER,
            thumbnailUri TEXT,
            createdAt TEXT NOT NULL,
            FOREIGN KEY(noteId) REFERENCES Notes(id) ON DELETE CASCADE
        )
        "#,
    },
    Migration {
        name: "create_attachments_note_index",
        sql: "CREATE INDEX IF NOT EXISTS idx_attachments_note_id ON Attachments(noteId)",
    },
    Migration {
        name: "create_notes_folder_index",
        sql: "CREATE INDEX IF NOT EXISTS idx_notes_folder_id ON Notes(folderId)",
    },
    // Reserved for remote sync; nothing writes to it yet
    Migration {
        name: "create_sync_metadata",
        sql: r#"
        CREATE TABLE IF NOT EXISTS SyncMetadata (
            entityId TEXT PRIMARY KEY,
            entityType TEXT NOT NULL,
            lastSyncedAt TEXT,
            remoteId TEXT,
            syncStatus TEXT DEFAULT 'DIRTY'
        )
        "#,
    },
    Migration {
        name: "create_notes_search",
        sql: r#"
        CREATE VIRTUAL TABLE IF NOT EXISTS NotesSearch USING fts5(
            title,
            plainTextPreview,
            content=Notes,
            content_rowid=rowid
        )
        "#,
    },
    Migration {
        name: "create_notes_insert_trigger",
        sql: r#"
        CREATE TRIGGER IF NOT EXISTS Notes_ai AFTER INSERT ON Notes BEGIN
            INSERT INTO NotesSearch(rowid, title, plainTextPreview)
            VALUES (new.rowid, new.title, new.plainTextPreview);
        END
        "#,
    },
    Migration {
        name: "create_notes_delete_trigger",
        sql: r#"
        CREATE TRIGGER IF NOT EXISTS Notes_ad AFTER DELETE ON Notes BEGIN
            INSERT INTO NotesSearch(NotesSearch, rowid, title, plainTextPreview)
            VALUES ('delete', old.rowid, old.title, old.plainTextPreview);
        END
        "#,
    },
    // FTS5 rows are never edited in place: drop the old entry, add the new one
    Migration {
        name: "create_notes_update_trigger",
        sql: r#"
        CREATE TRIGGER IF NOT EXISTS Notes_au AFTER UPDATE ON Notes BEGIN
            INSERT INTO NotesSearch(NotesSearch, rowid, title, plainTextPreview)
            VALUES ('delete', old.rowid, old.title, old.plainTextPreview);
            INSERT INTO NotesSearch(rowid, title, plainTextPreview)
            VALUES (new.rowid, new.title, new.plainTextPreview);
        END
        "#,
    },
];

/// Initialize database with schema
pub async fn initialize_database(pool: &SqlitePool) -> Result<()> {
    tracing::info!("Initializing database schema");

    sqlx::query("PRAGMA foreign_keys = ON").execute(pool).await?;

    apply_migrations(pool, SCHEMA_V1).await?;

    tracing::info!("Database initialization complete");
    Ok(())
}

/// Apply each statement in order, skipping benign redefinitions
pub async fn apply_migrations(pool: &SqlitePool, migrations: &[Migration]) -> Result<()> {
    for migration in migrations {
        match sqlx::query(migration.sql).execute(pool).await {
            Ok(_) => tracing::debug!("Applied migration {}", migration.name),
            Err(e) if is_benign_redefinition(&e) => {
                tracing::debug!("Migration {} already applied: {}", migration.name, e);
            }
            Err(e) => {
                tracing::warn!("Migration {} failed: {}", migration.name, e);
                return Err(e.into());
            }
        }
    }

    Ok(())
}

/// Error raised when a statement recreates an object that already exists
pub fn is_benign_redefinition(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db) => {
            let message = db.message().to_ascii_lowercase();
            message.contains("already exists") || message.contains("duplicate column")
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn memory_pool() -> SqlitePool {
        SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_initialize_database() {
        let pool = memory_pool().await;

        initialize_database(&pool).await.unwrap();

        let tables: Vec<String> = sqlx::query_scalar(
            "SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name",
        )
        .fetch_all(&pool)
        .await
        .unwrap();

        for table in [
            TABLE_FOLDERS,
            TABLE_NOTES,
            TABLE_ATTACHMENTS,
            TABLE_SYNC_METADATA,
            TABLE_NOTES_SEARCH,
        ] {
            assert!(tables.iter().any(|t| t == table), "missing table {}", table);
        }
    }

    #[tokio::test]
    async fn test_migrations_are_idempotent() {
        let pool = memory_pool().await;

        initialize_database(&pool).await.unwrap();
        initialize_database(&pool).await.unwrap();

        let triggers: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'trigger' AND tbl_name = 'Notes'",
        )
        .fetch_one(&pool)
        .await
        .unwrap();

        assert_eq!(triggers, 3);
    }

    #[tokio::test]
    async fn test_unexpected_migration_error_propagates() {
        let pool = memory_pool().await;

        let broken = [Migration {
            name: "broken",
            sql: "CREATE TABLE Broken (id TEXT PRIMARY KEY,",
        }];

        assert!(apply_migrations(&pool, &broken).await.is_err());
    }

    #[tokio::test]
    async fn test_foreign_keys_enabled() {
        let pool = memory_pool().await;

        initialize_database(&pool).await.unwrap();

        let foreign_keys: i32 = sqlx::query_scalar("PRAGMA foreign_keys")
            .fetch_one(&pool)
            .await
            .unwrap();

        assert_eq!(foreign_keys, 1);
    }
}
