//! WaveSpeed Seedream enhancement client
//!
//! Submits an edit request and, when the API answers with a request id, polls the
//! prediction result endpoint until it reaches a terminal status.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::fmt::{Debug, Formatter, Result as FmtResult};
use std::time::Duration;
use thiserror::Error;
use tokio::time::sleep;

use likeness_core::constants::{
    ENHANCER_MAX_POLL_ATTEMPTS, ENHANCER_POLL_INTERVAL_SECS, ENHANCER_TIMEOUT_SECS,
};

use crate::json::{first_str, unwrap_data};

const EDIT_ENDPOINT: &str = "/api/v3/bytedance/seedream-v4.5/edit";

#[derive(Debug, Error)]
pub enum EnhanceError {
    #[error("API Error: {status} - {body}")]
    Api { status: u16, body: String },

    #[error("Invalid API response format: {0}")]
    InvalidResponse(String),

    #[error("Image processing failed: {0}")]
    ProcessingFailed(String),

    #[error("Timeout waiting for image processing result")]
    Timeout,

    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

/// Enhances one image and returns the URL of the result.
#[async_trait]
pub trait Enhancer: Send + Sync {
    /// `size` is `"{width}*{height}"`.
    async fn enhance(&self, image_base64: &str, prompt: &str, size: &str)
        -> Result<String, EnhanceError>;
}

pub struct WaveSpeedClient {
    http_client: reqwest::Client,
    api_key: String,
    base_url: String,
    poll_interval: Duration,
    max_poll_attempts: u32,
}

impl Debug for WaveSpeedClient {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("WaveSpeedClient")
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl WaveSpeedClient {
    pub fn new(api_key: impl Into<String>, base_url: impl Into<String>) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(ENHANCER_TIMEOUT_SECS))
            .build()
            .context("Failed to create HTTP client for WaveSpeed")?;

        Ok(Self {
            http_client,
            api_key: api_key.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            poll_interval: Duration::from_secs(ENHANCER_POLL_INTERVAL_SECS),
            max_poll_attempts: ENHANCER_MAX_POLL_ATTEMPTS,
        })
    }

    pub fn with_polling(mut self, interval: Duration, max_attempts: u32) -> Self {
        self.poll_interval = interval;
        self.max_poll_attempts = max_attempts;
        self
    }

    async fn poll_for_result(&self, request_id: &str) -> Result<String, EnhanceError> {
        let url = format!(
            "{}/api/v3/predictions/{}/result",
            self.base_url, request_id
        );

        for attempt in 1..=self.max_poll_attempts {
            sleep(self.poll_interval).await;

            let response = self
                .http_client
                .get(&url)
                .bearer_auth(&self.api_key)
                .send()
                .await?;

            let status = response.status();
            if status == reqwest::StatusCode::NOT_FOUND {
                tracing::debug!(request_id = %request_id, attempt, "Prediction not ready yet");
                continue;
            }
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(EnhanceError::Api {
                    status: status.as_u16(),
                    body,
                });
            }

            let body: Value = response.json().await?;
            let data = unwrap_data(&body);
            let state = first_str(data, &["/status"]).or_else(|| first_str(&body, &["/status"]));

            match state.as_deref() {
                Some("completed") | Some("succeeded") => {
                    if let Some(output) = first_str(data, &["/outputs/0", "/output"])
                        .or_else(|| first_str(&body, &["/output"]))
                    {
                        tracing::info!(request_id = %request_id, attempts = attempt, "Enhancement completed");
                        return Ok(output);
                    }
                }
                Some("failed") | Some("error") => {
                    return Err(EnhanceError::ProcessingFailed(data.to_string()));
                }
                _ => {}
            }
        }

        Err(EnhanceError::Timeout)
    }
}

#[async_trait]
impl Enhancer for WaveSpeedClient {
    async fn enhance(
        &self,
        image_base64: &str,
        prompt: &str,
        size: &str,
    ) -> Result<String, EnhanceError> {
        let start = std::time::Instant::now();
        let response = self
            .http_client
            .post(format!("{}{}", self.base_url, EDIT_ENDPOINT))
            .bearer_auth(&self.api_key)
            .json(&json!({
                "images": [image_base64],
                "prompt": prompt,
                "size": size,
            }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(EnhanceError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let body: Value = response.json().await?;
        let data = unwrap_data(&body);

        if let Some(request_id) = first_str(data, &["/id", "/requestId"]) {
            tracing::info!(request_id = %request_id, size = %size, "Enhancement submitted, polling");
            return self.poll_for_result(&request_id).await;
        }

        let direct = first_str(&body, &["/output"])
            .or_else(|| first_str(data, &["/output", "/outputs/0"]))
            .or_else(|| first_str(&body, &["/url"]))
            .or_else(|| first_str(data, &["/url"]));

        match direct {
            Some(url) => {
                tracing::info!(
                    duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                    "Enhancement returned inline result"
                );
                Ok(url)
            }
            None => Err(EnhanceError::InvalidResponse(body.to_string())),
        }
    }
}
