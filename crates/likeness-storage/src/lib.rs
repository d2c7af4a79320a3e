//! Likeness Storage Library
//!
//! Object storage for generated images, uploads and extracted frames. It includes the
//! `Storage` trait and implementations for S3-compatible stores (Cloudflare R2) and the
//! local filesystem.
//!
//! # Storage key format
//!
//! Keys are flat file names chosen by the caller, e.g. `anc_{identity_id}_{mutation_id}_{n}.jpg`
//! or `frame_{uuid}.png`. Every backend exposes an object at `{public_url}/{key}`, and
//! only URLs under that prefix are treated as owned by the store.
//!
//! Keys must not contain `..` or a leading `/`.

pub mod factory;
pub mod keys;
#[cfg(feature = "storage-local")]
pub mod local;
#[cfg(feature = "storage-s3")]
pub mod s3;
pub mod traits;

// Re-export commonly used types
pub use factory::create_storage;
pub use likeness_core::StorageBackend;
#[cfg(feature = "storage-local")]
pub use local::LocalStorage;
#[cfg(feature = "storage-s3")]
pub use s3::{S3Settings, S3Storage};
pub use traits::{Storage, StorageError, StorageResult};
