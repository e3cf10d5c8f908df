//! Services module
//!
//! Coordinates repositories with the file store and backup archives.

pub mod attachments;
pub mod backup;

pub use attachments::AttachmentsService;
pub use backup::{BackupService, ImportSummary};
