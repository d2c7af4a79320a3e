//! EnsembleData Instagram broker client
//!
//! Responses are returned as raw JSON; the intake pipeline normalizes their shapes.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::fmt::{Debug, Formatter, Result as FmtResult};
use std::time::Duration;
use thiserror::Error;

use likeness_core::constants::{BROKER_CHUNK_SIZE, BROKER_DEPTH};

use crate::json::first_scalar;

/// Broker units billed per user-info lookup.
pub const USER_INFO_UNITS: i32 = 3;
/// Overage price of one broker unit, in thousandths of a USD.
pub const UNIT_COST_MILLI_USD: i64 = 1;

#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("Broker request failed: {status} - {body}")]
    Api { status: u16, body: String },

    #[error("Failed to get user ID for username: {username}. Response: {body}")]
    MissingUserId { username: String, body: String },

    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

/// Which paginated user feed to read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedKind {
    Posts,
    Reels,
}

impl FeedKind {
    pub fn path(&self) -> &'static str {
        match self {
            FeedKind::Posts => "/user/posts",
            FeedKind::Reels => "/user/reels",
        }
    }
}

#[async_trait]
pub trait ProfileBroker: Send + Sync {
    /// Numeric Instagram user id (`pk`) rendered as a string.
    async fn user_id(&self, username: &str) -> Result<String, BrokerError>;

    /// One raw feed page. `cursor` is the previous page's `last_cursor`.
    async fn feed_page(
        &self,
        kind: FeedKind,
        user_id: &str,
        cursor: Option<&str>,
    ) -> Result<Value, BrokerError>;
}

pub struct EnsembleDataClient {
    http_client: reqwest::Client,
    token: String,
    base_url: String,
}

impl Debug for EnsembleDataClient {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("EnsembleDataClient")
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl EnsembleDataClient {
    pub fn new(token: impl Into<String>, base_url: impl Into<String>) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .context("Failed to create HTTP client for EnsembleData")?;

        Ok(Self {
            http_client,
            token: token.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    async fn get_json(&self, path: &str, query: &[(&str, String)]) -> Result<Value, BrokerError> {
        let start = std::time::Instant::now();
        let response = self
            .http_client
            .get(format!("{}{}", self.base_url, path))
            .query(query)
            .query(&[("token", self.token.as_str())])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(BrokerError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let body: Value = response.json().await?;
        tracing::debug!(
            path = %path,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Broker request complete"
        );
        Ok(body)
    }
}

#[async_trait]
impl ProfileBroker for EnsembleDataClient {
    async fn user_id(&self, username: &str) -> Result<String, BrokerError> {
        let body = self
            .get_json("/user/info", &[("username", username.to_string())])
            .await?;

        first_scalar(&body, &["/data/pk"]).ok_or_else(|| BrokerError::MissingUserId {
            username: username.to_string(),
            body: body.to_string(),
        })
    }

    async fn feed_page(
        &self,
        kind: FeedKind,
        user_id: &str,
        cursor: Option<&str>,
    ) -> Result<Value, BrokerError> {
        let mut query = vec![
            ("user_id", user_id.to_string()),
            ("depth", BROKER_DEPTH.to_string()),
            ("chunk_size", BROKER_CHUNK_SIZE.to_string()),
        ];
        if let Some(cursor) = cursor {
            query.push(("start_cursor", cursor.to_string()));
        }
        self.get_json(kind.path(), &query).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    #[tokio::test]
    async fn test_user_id_reads_numeric_pk() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/user/info")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("username".into(), "natgeo".into()),
                Matcher::UrlEncoded("token".into(), "tok".into()),
            ]))
            .with_status(200)
            .with_body(r#"{"data":{"pk":787132,"username":"natgeo"}}"#)
            .create_async()
            .await;

        let client = EnsembleDataClient::new("tok", server.url()).unwrap();
        assert_eq!(client.user_id("natgeo").await.unwrap(), "787132");
    }

    #[tokio::test]
    async fn test_user_id_missing_pk() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/user/info")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(r#"{"data":{}}"#)
            .create_async()
            .await;

        let client = EnsembleDataClient::new("tok", server.url()).unwrap();
        let err = client.user_id("ghost").await.unwrap_err();
        assert!(err
            .to_string()
            .starts_with("Failed to get user ID for username: ghost"));
    }

    #[tokio::test]
    async fn test_feed_page_sends_cursor_and_chunking() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/user/reels")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("user_id".into(), "42".into()),
                Matcher::UrlEncoded("depth".into(), "1".into()),
                Matcher::UrlEncoded("chunk_size".into(), "12".into()),
                Matcher::UrlEncoded("start_cursor".into(), "abc".into()),
            ]))
            .with_status(200)
            .with_body(r#"{"data":{"reels":[],"last_cursor":null}}"#)
            .create_async()
            .await;

        let client = EnsembleDataClient::new("tok", server.url()).unwrap();
        let page = client
            .feed_page(FeedKind::Reels, "42", Some("abc"))
            .await
            .unwrap();

        assert!(page.pointer("/data/reels").is_some());
        mock.assert_async().await;
    }
}
