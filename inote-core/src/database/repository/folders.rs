//! Folder repository
//!
//! Folders form a tree through `parentId`. The store has no foreign key on
//! that column, so parent links are checked here: a parent must exist and
//! must not be the folder itself or one of its descendants.

use crate::database::executor::{Database, Value};
use crate::database::models::{next_timestamp, CreateFolderRequest, Folder, UpdateFolderRequest};
use crate::error::{AppError, Result};
use std::collections::HashSet;
use uuid::Uuid;

#[derive(Clone)]
pub struct FolderRepository {
    db: Database,
}

impl FolderRepository {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// List all folders
    pub async fn get_all(&self) -> Result<Vec<Folder>> {
        self.db
            .query(
                "SELECT * FROM Folders ORDER BY orderIndex ASC, createdAt DESC",
                &[],
            )
            .await
    }

    /// Get a folder by ID
    pub async fn get(&self, id: &str) -> Result<Folder> {
        self.db
            .query_optional("SELECT * FROM Folders WHERE id = ?", &[id.into()])
            .await?
            .ok_or_else(|| AppError::FolderNotFound(id.to_string()))
    }

    /// Create a new folder
    pub async fn create(&self, req: CreateFolderRequest) -> Result<Folder> {
        let name = validate_name(&req.name)?;

        if let Some(parent_id) = &req.parent_id {
            self.get(parent_id).await?;
        }

        let now = next_timestamp();
        let folder = Folder {
            id: Uuid::new_v4().to_string(),
            name,
            color: req.color,
            parent_id: req.parent_id,
            order_index: 0,
            created_at: now,
            updated_at: now,
        };

        self.db
            .execute(
                r#"
                INSERT INTO Folders (id, name, color, parentId, orderIndex, createdAt, updatedAt)
                VALUES (?, ?, ?, ?, ?, ?, ?)
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

        tracing::debug!("Created folder: {}", folder.id);
        Ok(folder)
    }

    /// Update the supplied fields of a folder; a request with no fields is a no-op
    pub async fn update(&self, req: UpdateFolderRequest) -> Result<Folder> {
        let mut sets: Vec<&str> = Vec::new();
        let mut params: Vec<Value> = Vec::new();

        if let Some(name) = &req.name {
            sets.push("name = ?");
            params.push(validate_name(name)?.into());
        }

        if let Some(color) = &req.color {
            sets.push("color = ?");
            params.push(color.clone().into());
        }

        if let Some(parent_id) = &req.parent_id {
            if let Some(parent_id) = parent_id {
                self.ensure_valid_parent(&req.id, parent_id).await?;
            }
            sets.push("parentId = ?");
            params.push(parent_id.clone().into());
        }

        if let Some(order_index) = req.order_index {
            sets.push("orderIndex = ?");
            params.push(order_index.into());
        }

        if sets.is_empty() {
            return self.get(&req.id).await;
        }

        sets.push("updatedAt = ?");
        params.push(next_timestamp().into());
        params.push(req.id.as_str().into());

        let sql = format!("UPDATE Folders SET {} WHERE id = ?", sets.join(", "));
        let result = self.db.execute(&sql, &params).await?;

        if result.changes == 0 {
            return Err(AppError::FolderNotFound(req.id));
        }

        self.get(&req.id).await
    }

    /// Delete a folder. Its notes become unfiled and its child folders become roots.
    pub async fn delete(&self, id: &str) -> Result<()> {
        self.db
            .execute(
                "UPDATE Folders SET parentId = NULL, updatedAt = ? WHERE parentId = ?",
                &[next_timestamp().into(), id.into()],
            )
            .await?;

        let result = self
            .db
            .execute("DELETE FROM Folders WHERE id = ?", &[id.into()])
            .await?;

        if result.changes == 0 {
            return Err(AppError::FolderNotFound(id.to_string()));
        }

        tracing::debug!("Deleted folder: {}", id);
        Ok(())
    }

    /// Folders whose name contains `text`
    pub async fn search(&self, text: &str) -> Result<Vec<Folder>> {
        let text = text.trim();
        if text.is_empty() {
            return self.get_all().await;
        }

        self.db
            .query(
                "SELECT * FROM Folders WHERE name LIKE ? ORDER BY orderIndex ASC, createdAt DESC",
                &[format!("%{}%", text).into()],
            )
            .await
    }

    async fn ensure_valid_parent(&self, id: &str, parent_id: &str) -> Result<()> {
        if parent_id == id {
            return Err(AppError::InvalidInput(
                "A folder cannot be its own parent".to_string(),
            ));
        }

        // Walk up from the proposed parent; meeting `id` means a cycle.
        // Imported rows may already link into a cycle that excludes `id`
        let mut visited = HashSet::new();
        let mut cursor = Some(self.get(parent_id).await?);
        while let Some(folder) = cursor {
            if !visited.insert(folder.id) {
                return Err(AppError::InvalidInput(format!(
                    "Folder {} has a cyclic ancestry",
                    parent_id
                )));
            }
            match folder.parent_id {
                Some(ancestor) if ancestor == id => {
                    return Err(AppError::InvalidInput(
                        "A folder cannot be moved into its own subtree".to_string(),
                    ));
                }
                Some(ancestor) => {
                    cursor = self
                        .db
                        .query_optional("SELECT * FROM Folders WHERE id = ?", &[ancestor.into()])
                        .await?;
                }
                None => cursor = None,
            }
        }

        Ok(())
    }
}

fn validate_name(name: &str) -> Result<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(AppError::InvalidInput("Folder name cannot be empty".to_string()));
    }
    Ok(name.to_string())
}
