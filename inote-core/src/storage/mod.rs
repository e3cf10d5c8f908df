//! Storage module
//!
//! Provides file storage for attachment contents.

pub mod file_store;

pub use file_store::FileStore;
