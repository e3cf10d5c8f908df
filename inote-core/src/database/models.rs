//! Database models
//!
//! Rust structs representing database entities.
//! Field names map onto the camelCase column names of the persisted
//! schema, both for row decoding and for serde.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::sync::atomic::{AtomicI64, Ordering};

/// A folder; folders form a tree through `parent_id`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
#[sqlx(rename_all = "camelCase")]
pub struct Folder {
    pub id: String,
    pub name: String,
    pub color: Option<String>,
    pub parent_id: Option<String>,
    pub order_index: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Create folder request
#[derive(Debug, Clone, Default)]
pub struct CreateFolderRequest {
    pub name: String,
    pub color: Option<String>,
    pub parent_id: Option<String>,
}

/// Update folder request. `None` leaves a field untouched; for the
/// nullable fields `Some(None)` clears the value.
#[derive(Debug, Clone, Default)]
pub struct UpdateFolderRequest {
    pub id: String,
    pub name: Option<String>,
    pub color: Option<Option<String>>,
    pub parent_id: Option<Option<String>>,
    pub order_index: Option<i64>,
}

/// A note with rich text content
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
#[sqlx(rename_all = "camelCase")]
pub struct Note {
    pub id: String,
    pub folder_id: Option<String>,
    pub title: Option<String>,
    /// HTML produced by the rich-text editor
    pub body_rich_html: Option<String>,
    /// Plain-text excerpt used by list rows and search; always empty when locked
    pub plain_text_preview: Option<String>,
    pub pinned: bool,
    pub archived: bool,
    pub is_locked: bool,
    pub font_family: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Create note request
#[derive(Debug, Clone, Default)]
pub struct CreateNoteRequest {
    /// Caller-chosen identity; a UUID is generated when absent
    pub id: Option<String>,
    pub folder_id: Option<String>,
    pub title: Option<String>,
    pub body_rich_html: Option<String>,
    pub plain_text_preview: Option<String>,
    pub pinned: bool,
    pub archived: bool,
    pub is_locked: bool,
    pub font_family: Option<String>,
}

/// Partial note update; only supplied fields are written
#[derive(Debug, Clone, Default)]
pub struct UpdateNoteRequest {
    pub id: String,
    pub title: Option<String>,
    pub body_rich_html: Option<String>,
    pub plain_text_preview: Option<String>,
    pub pinned: Option<bool>,
    pub archived: Option<bool>,
    pub is_locked: Option<bool>,
    pub folder_id: Option<Option<String>>,
    pub font_family: Option<Option<String>>,
}

impl UpdateNoteRequest {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }
}

/// What an attachment holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum AttachmentKind {
    Image,
    File,
}

impl AttachmentKind {
    /// Value stored in the `type` column
    pub fn as_str(self) -> &'static str {
        match self {
            AttachmentKind::Image => "image",
            AttachmentKind::File => "file",
        }
    }
}

/// File attachment linked to a note. The bytes live in the file store;
/// `uri` is the reference returned by it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
#[sqlx(rename_all = "camelCase")]
pub struct Attachment {
    pub id: String,
    pub note_id: String,
    #[serde(rename = "type")]
    #[sqlx(rename = "type")]
    pub kind: AttachmentKind,
    pub uri: String,
    pub name: Option<String>,
    pub mime_type: Option<String>,
    pub file_size: Option<i64>,
    pub thumbnail_uri: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Create attachment request
#[derive(Debug, Clone)]
pub struct CreateAttachmentRequest {
    pub note_id: String,
    pub kind: AttachmentKind,
    pub uri: String,
    pub name: Option<String>,
    pub mime_type: Option<String>,
    pub file_size: Option<i64>,
    pub thumbnail_uri: Option<String>,
}

static LAST_TIMESTAMP_MICROS: AtomicI64 = AtomicI64::new(0);

/// Current time, strictly later than any timestamp previously returned in
/// this process. Writes that follow each other always get ordered
/// `updatedAt` values even when the wall clock has not advanced.
pub fn next_timestamp() -> DateTime<Utc> {
    let now = Utc::now().timestamp_micros();
    let mut last = LAST_TIMESTAMP_MICROS.load(Ordering::Relaxed);

    loop {
        let candidate = now.max(last + 1);
        match LAST_TIMESTAMP_MICROS.compare_exchange_weak(
            last,
            candidate,
            Ordering::AcqRel,
            Ordering::Relaxed,
        ) {
            Ok(_) => return DateTime::<Utc>::from_timestamp_micros(candidate).unwrap_or_else(Utc::now),
            Err(observed) => last = observed,
        }
    }
}
