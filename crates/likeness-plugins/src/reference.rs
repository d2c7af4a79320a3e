//! Resolves image references (data URLs, stored objects, remote URLs) to bytes or base64.

use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::Engine;
use std::time::Duration;
use thiserror::Error;

use likeness_core::constants::{BROWSER_USER_AGENT, INSTAGRAM_REFERER};

const FETCH_TIMEOUT_SECS: u64 = 60;
/// Host suffix of private R2 bucket endpoints; objects there are only readable through the proxy.
const PRIVATE_R2_HOST: &str = "r2.cloudflarestorage.com";

#[derive(Debug, Error)]
pub enum ReferenceError {
    #[error("Failed to fetch image: {0}")]
    Fetch(String),

    #[error("Invalid base64 image data: {0}")]
    Decode(String),

    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

/// Source of reference image content for the generation clients.
#[async_trait]
pub trait ReferenceSource: Send + Sync {
    /// Raw bytes of the referenced image.
    async fn fetch_bytes(&self, reference: &str) -> Result<Vec<u8>, ReferenceError>;

    /// Bare base64 (no `data:` prefix) of the referenced image.
    async fn to_base64(&self, reference: &str) -> Result<String, ReferenceError>;
}

/// A decoded `data:` URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataUrl {
    pub mime_type: String,
    pub data: Vec<u8>,
}

/// Decodes `data:<mime>;base64,<payload>`. Returns `None` if `input` is not a data URL.
pub fn decode_data_url(input: &str) -> Option<Result<DataUrl, ReferenceError>> {
    let rest = input.strip_prefix("data:")?;
    let Some((header, payload)) = rest.split_once(',') else {
        return Some(Err(ReferenceError::Decode("missing data URL payload".to_string())));
    };
    let mime_type = header
        .split(';')
        .next()
        .filter(|m| !m.is_empty())
        .unwrap_or("application/octet-stream")
        .to_string();

    Some(
        base64::engine::general_purpose::STANDARD
            .decode(payload.trim())
            .map(|data| DataUrl { mime_type, data })
            .map_err(|e| ReferenceError::Decode(e.to_string())),
    )
}

fn is_remote(reference: &str) -> bool {
    reference.starts_with("http://") || reference.starts_with("https://")
}

/// HTTP-backed [`ReferenceSource`].
///
/// Stored objects are read through the service's own media proxy so private buckets work.
pub struct ReferenceResolver {
    http_client: reqwest::Client,
    storage_public_url: Option<String>,
    proxy_base: String,
}

impl ReferenceResolver {
    /// `public_base_url` is where this service is reachable; `storage_public_url` is the
    /// prefix of URLs the object store hands out.
    pub fn new(public_base_url: &str, storage_public_url: Option<&str>) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(FETCH_TIMEOUT_SECS))
            .build()
            .context("Failed to create HTTP client for reference images")?;

        Ok(Self {
            http_client,
            storage_public_url: storage_public_url
                .map(|u| u.trim_end_matches('/').to_string())
                .filter(|u| !u.is_empty()),
            proxy_base: format!("{}/api/media/proxy", public_base_url.trim_end_matches('/')),
        })
    }

    fn is_private_store_url(&self, url: &str) -> bool {
        url.contains(PRIVATE_R2_HOST)
            || self
                .storage_public_url
                .as_deref()
                .is_some_and(|base| url.starts_with(base))
    }

    /// The URL actually requested for `url`.
    pub fn fetch_url(&self, url: &str) -> String {
        if self.is_private_store_url(url) {
            format!("{}?url={}", self.proxy_base, urlencoding::encode(url))
        } else {
            url.to_string()
        }
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>, ReferenceError> {
        let target = self.fetch_url(url);
        let response = self
            .http_client
            .get(&target)
            .header(reqwest::header::USER_AGENT, BROWSER_USER_AGENT)
            .header(reqwest::header::REFERER, INSTAGRAM_REFERER)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            tracing::warn!(url = %url, status = %status, "Reference image fetch failed");
            return Err(ReferenceError::Fetch(
                status.canonical_reason().unwrap_or("unknown status").to_string(),
            ));
        }

        Ok(response.bytes().await?.to_vec())
    }
}

#[async_trait]
impl ReferenceSource for ReferenceResolver {
    async fn fetch_bytes(&self, reference: &str) -> Result<Vec<u8>, ReferenceError> {
        if let Some(decoded) = decode_data_url(reference) {
            return decoded.map(|d| d.data);
        }
        if is_remote(reference) {
            return self.download(reference).await;
        }
        base64::engine::general_purpose::STANDARD
            .decode(reference.trim())
            .map_err(|e| ReferenceError::Decode(e.to_string()))
    }

    async fn to_base64(&self, reference: &str) -> Result<String, ReferenceError> {
        if let Some(rest) = reference.strip_prefix("data:") {
            // A data URL without a payload separator is forwarded untouched.
            return Ok(match rest.split_once(',') {
                Some((_, payload)) if !payload.is_empty() => payload.to_string(),
                _ => reference.to_string(),
            });
        }
        if is_remote(reference) {
            let bytes = self.download(reference).await?;
            return Ok(base64::engine::general_purpose::STANDARD.encode(bytes));
        }
        Ok(reference.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_data_url_png() {
        let decoded = decode_data_url("data:image/png;base64,aGVsbG8=").unwrap().unwrap();
        assert_eq!(decoded.mime_type, "image/png");
        assert_eq!(decoded.data, b"hello");
    }

    #[test]
    fn decode_data_url_rejects_garbage() {
        assert!(decode_data_url("https://example.com/a.png").is_none());
        assert!(decode_data_url("data:image/png;base64").unwrap().is_err());
        assert!(decode_data_url("data:image/png;base64,@@@").unwrap().is_err());
    }

    #[test]
    fn private_store_urls_go_through_proxy() {
        let resolver =
            ReferenceResolver::new("http://localhost:4000/", Some("https://pub-1.r2.dev/")).unwrap();

        assert_eq!(
            resolver.fetch_url("https://pub-1.r2.dev/var_1.jpg"),
            "http://localhost:4000/api/media/proxy?url=https%3A%2F%2Fpub-1.r2.dev%2Fvar_1.jpg"
        );
        assert!(resolver
            .fetch_url("https://bucket.acct.r2.cloudflarestorage.com/a.jpg")
            .starts_with("http://localhost:4000/api/media/proxy?url="));
        assert_eq!(
            resolver.fetch_url("https://scontent.cdninstagram.com/a.jpg"),
            "https://scontent.cdninstagram.com/a.jpg"
        );
    }

    #[tokio::test]
    async fn to_base64_passes_data_urls_through() {
        let resolver = ReferenceResolver::new("http://localhost:4000", None).unwrap();

        assert_eq!(
            resolver.to_base64("data:image/jpeg;base64,QUJD").await.unwrap(),
            "QUJD"
        );
        assert_eq!(
            resolver.to_base64("data:image/jpeg;base64").await.unwrap(),
            "data:image/jpeg;base64"
        );
    }

    #[tokio::test]
    async fn to_base64_fetches_remote_with_browser_headers() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/photo.jpg")
            .match_header("user-agent", BROWSER_USER_AGENT)
            .match_header("referer", INSTAGRAM_REFERER)
            .with_status(200)
            .with_body("ABC")
            .create_async()
            .await;

        let resolver = ReferenceResolver::new("http://localhost:4000", None).unwrap();
        let encoded = resolver
            .to_base64(&format!("{}/photo.jpg", server.url()))
            .await
            .unwrap();

        assert_eq!(encoded, "QUJD");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn fetch_bytes_reports_http_failure() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/gone.jpg")
            .with_status(404)
            .create_async()
            .await;

        let resolver = ReferenceResolver::new("http://localhost:4000", None).unwrap();
        let err = resolver
            .fetch_bytes(&format!("{}/gone.jpg", server.url()))
            .await
            .unwrap_err();

        assert!(matches!(err, ReferenceError::Fetch(_)));
    }
}
