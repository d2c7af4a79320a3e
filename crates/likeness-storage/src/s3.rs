use crate::keys;
use crate::traits::{Storage, StorageError, StorageResult};
use crate::StorageBackend;
use async_trait::async_trait;
use bytes::Bytes;
use object_store::aws::{AmazonS3, AmazonS3Builder};
use object_store::path::Path;
use object_store::Error as ObjectStoreError;
use object_store::{
    Attribute, Attributes, ObjectStore, ObjectStoreExt, PutOptions, PutPayload,
    Result as ObjectResult,
};

/// Connection settings for an S3-compatible bucket (AWS S3, Cloudflare R2, MinIO)
#[derive(Debug, Clone)]
pub struct S3Settings {
    pub bucket: String,
    pub region: String,
    /// Custom endpoint for S3-compatible providers
    pub endpoint_url: Option<String>,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    /// Public prefix objects are served from, e.g. an R2 public bucket domain
    pub public_url: String,
}

/// S3 storage implementation
#[derive(Clone)]
pub struct S3Storage {
    store: AmazonS3,
    bucket: String,
    public_url: String,
}

impl S3Storage {
    pub fn new(settings: S3Settings) -> StorageResult<Self> {
        let mut builder = AmazonS3Builder::from_env()
            .with_region(settings.region.clone())
            .with_bucket_name(settings.bucket.clone());

        if let Some(ref endpoint) = settings.endpoint_url {
            let allow_http = endpoint.starts_with("http://");
            builder = builder
                .with_endpoint(endpoint.clone())
                .with_allow_http(allow_http);
        }
        if let Some(key_id) = settings.access_key_id {
            builder = builder.with_access_key_id(key_id);
        }
        if let Some(secret) = settings.secret_access_key {
            builder = builder.with_secret_access_key(secret);
        }

        let store = builder
            .build()
            .map_err(|e| StorageError::ConfigError(e.to_string()))?;

        if settings.public_url.trim().is_empty() {
            return Err(StorageError::ConfigError(
                "Public storage URL is not configured".to_string(),
            ));
        }

        Ok(S3Storage {
            store,
            bucket: settings.bucket,
            public_url: settings.public_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl Storage for S3Storage {
    async fn put(&self, key: &str, data: Vec<u8>, content_type: &str) -> StorageResult<String> {
        keys::validate_key(key)?;
        let size = data.len() as u64;
        let location = Path::from(key.to_string());

        let mut attributes = Attributes::new();
        attributes.insert(Attribute::ContentType, content_type.to_string().into());
        let options = PutOptions::from(attributes);

        let start = std::time::Instant::now();

        let result: ObjectResult<_> = self
            .store
            .put_opts(&location, PutPayload::from(Bytes::from(data)), options)
            .await;

        result.map_err(|e| {
            tracing::error!(
                error = %e,
                bucket = %self.bucket,
                key = %key,
                size_bytes = size,
                duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                "S3 upload failed"
            );
            StorageError::UploadFailed(e.to_string())
        })?;

        tracing::info!(
            bucket = %self.bucket,
            key = %key,
            content_type = %content_type,
            size_bytes = size,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "S3 upload successful"
        );

        Ok(keys::public_url(&self.public_url, key))
    }

    async fn get(&self, key: &str) -> StorageResult<Vec<u8>> {
        keys::validate_key(key)?;
        let location = Path::from(key.to_string());
        let start = std::time::Instant::now();

        let result: ObjectResult<_> = self.store.get(&location).await;

        let response = result.map_err(|e| match e {
            ObjectStoreError::NotFound { .. } => StorageError::NotFound(key.to_string()),
            other => {
                tracing::error!(
                    error = %other,
                    bucket = %self.bucket,
                    key = %key,
                    duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                    "S3 download failed"
                );
                StorageError::DownloadFailed(other.to_string())
            }
        })?;

        let data = response
            .bytes()
            .await
            .map_err(|e| StorageError::DownloadFailed(e.to_string()))?;

        tracing::debug!(
            bucket = %self.bucket,
            key = %key,
            size_bytes = data.len(),
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "S3 download successful"
        );

        Ok(data.to_vec())
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        keys::validate_key(key)?;
        let location = Path::from(key.to_string());
        let start = std::time::Instant::now();

        let result: ObjectResult<_> = self.store.delete(&location).await;

        match result {
            Ok(()) | Err(ObjectStoreError::NotFound { .. }) => {
                tracing::info!(
                    bucket = %self.bucket,
                    key = %key,
                    duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                    "S3 delete successful"
                );
                Ok(())
            }
            Err(e) => {
                tracing::error!(
                    error = %e,
                    bucket = %self.bucket,
                    key = %key,
                    "S3 delete failed"
                );
                Err(StorageError::DeleteFailed(e.to_string()))
            }
        }
    }

    async fn exists(&self, key: &str) -> StorageResult<bool> {
        keys::validate_key(key)?;
        let location = Path::from(key.to_string());
        match self.store.head(&location).await {
            Ok(_) => Ok(true),
            Err(ObjectStoreError::NotFound { .. }) => Ok(false),
            Err(e) => Err(StorageError::DownloadFailed(e.to_string())),
        }
    }

    fn public_base_url(&self) -> &str {
        &self.public_url
    }

    fn backend_type(&self) -> StorageBackend {
        StorageBackend::S3
    }
}

#[cfg(all(test, feature = "storage-s3"))]
mod tests {
    use super::*;

    fn settings() -> S3Settings {
        S3Settings {
            bucket: "likeness".to_string(),
            region: "auto".to_string(),
            endpoint_url: Some("https://acct.r2.cloudflarestorage.com".to_string()),
            access_key_id: Some("key".to_string()),
            secret_access_key: Some("secret".to_string()),
            public_url: "https://pub-123.r2.dev/".to_string(),
        }
    }

    #[test]
    fn test_public_url_is_normalized() {
        let storage = S3Storage::new(settings()).unwrap();
        assert_eq!(storage.public_base_url(), "https://pub-123.r2.dev");
        assert_eq!(
            storage.key_for_url("https://pub-123.r2.dev/var_1_light.jpg"),
            Some("var_1_light.jpg".to_string())
        );
    }

    #[test]
    fn test_missing_public_url_rejected() {
        let mut s = settings();
        s.public_url = String::new();
        assert!(matches!(S3Storage::new(s), Err(StorageError::ConfigError(_))));
    }
}
