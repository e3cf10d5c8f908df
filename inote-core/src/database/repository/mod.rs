//! Repository layer for database operations
//!
//! One stateless repository per entity. Each composes SQL over the
//! retrying [`Database`](crate::database::Database) executor and holds no
//! state of its own beyond cheap handles.

pub mod attachments;
pub mod folders;
pub mod notes;

pub use attachments::AttachmentRepository;
pub use folders::FolderRepository;
pub use notes::NoteRepository;
