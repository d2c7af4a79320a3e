//! Likeness Core Library
//!
//! This crate provides the domain models, error types, configuration, prompt catalogs and
//! input validation shared by every Likeness component.

pub mod config;
pub mod constants;
pub mod error;
pub mod models;
pub mod prompts;
pub mod storage_types;
pub mod validation;

// Re-export commonly used types
pub use config::{Config, ServiceConfig};
pub use error::{AppError, ErrorMetadata, LogLevel};
pub use storage_types::StorageBackend;
