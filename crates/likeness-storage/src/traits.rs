//! Storage abstraction trait

use crate::keys;
use crate::StorageBackend;
use async_trait::async_trait;
use thiserror::Error;

/// Storage operation errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Upload failed: {0}")]
    UploadFailed(String),

    #[error("Download failed: {0}")]
    DownloadFailed(String),

    #[error("Delete failed: {0}")]
    DeleteFailed(String),

    #[error("File not found: {0}")]
    NotFound(String),

    #[error("Invalid storage key: {0}")]
    InvalidKey(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Storage abstraction trait
///
/// Objects are addressed by key and published at `{public_base_url}/{key}`.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Store `data` under `key` and return its public URL
    async fn put(&self, key: &str, data: Vec<u8>, content_type: &str) -> StorageResult<String>;

    /// Read an object by key
    async fn get(&self, key: &str) -> StorageResult<Vec<u8>>;

    /// Delete an object by key. Deleting a missing object is not an error.
    async fn delete(&self, key: &str) -> StorageResult<()>;

    async fn exists(&self, key: &str) -> StorageResult<bool>;

    /// Prefix every public URL of this store starts with
    fn public_base_url(&self) -> &str;

    fn backend_type(&self) -> StorageBackend;

    /// Key of an owned public URL, `None` for anything else
    fn key_for_url(&self, url: &str) -> Option<String> {
        keys::key_for_url(self.public_base_url(), url)
    }

    /// Delete the object behind a public URL.
    ///
    /// URLs outside this store are skipped and reported as `false`.
    async fn delete_by_url(&self, url: &str) -> StorageResult<bool> {
        match self.key_for_url(url) {
            Some(key) => {
                self.delete(&key).await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
