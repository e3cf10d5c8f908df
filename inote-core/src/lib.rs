//! Inote core library
//!
//! Local persistence for a notes application: a self-healing SQLite store,
//! a full-text index kept in sync by triggers, and repositories for
//! folders, notes and attachments.

pub mod app;
pub mod config;
pub mod database;
pub mod error;
pub mod services;
pub mod storage;

pub use app::AppContext;
pub use error::{AppError, Result};
