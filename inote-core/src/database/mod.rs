//! Database module
//!
//! This module provides all database functionality including:
//! - Connection management and corruption recovery
//! - The retrying executor every statement goes through
//! - Schema, full-text index and triggers
//! - Model definitions
//! - Repository layer for CRUD operations

pub mod connection;
pub mod executor;
pub mod models;
pub mod repository;
pub mod schema;

pub use connection::{ConnectionManager, ConnectionState, Handle};
pub use executor::{Database, ExecResult, Value};
pub use models::*;
pub use repository::{AttachmentRepository, FolderRepository, NoteRepository};
pub use schema::initialize_database;
