//! Gemini image generation client

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::fmt::{Debug, Formatter, Result as FmtResult};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use likeness_core::prompts::render_anchor_prompt;

use crate::reference::{ReferenceError, ReferenceSource};

const GENERATION_TIMEOUT_SECS: u64 = 300;
const OUTPUT_ASPECT_RATIO: &str = "9:16";
const OUTPUT_IMAGE_SIZE: &str = "4K";

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("Gemini API did not return image data")]
    NoImageReturned,

    #[error("Gemini API request failed: {status} - {body}")]
    Api { status: u16, body: String },

    #[error(transparent)]
    Reference(#[from] ReferenceError),

    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

/// Produces one image from a prompt and reference images.
#[async_trait]
pub trait ImageGenerator: Send + Sync {
    /// Returns the generated image as bare base64.
    ///
    /// `mutation` replaces the placeholder in `prompt`; pass an empty string for literal prompts.
    async fn generate(
        &self,
        prompt: &str,
        reference_images: &[String],
        mutation: &str,
    ) -> Result<String, GenerationError>;
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Part {
    inline_data: Option<InlineData>,
}

#[derive(Debug, Deserialize)]
struct InlineData {
    data: Option<String>,
}

impl GenerateContentResponse {
    fn first_image(self) -> Option<String> {
        self.candidates
            .into_iter()
            .next()?
            .content?
            .parts
            .into_iter()
            .find_map(|p| p.inline_data.and_then(|d| d.data).filter(|d| !d.is_empty()))
    }
}

/// Gemini `generateContent` client configured for image output
pub struct GeminiImageClient {
    http_client: reqwest::Client,
    api_key: String,
    model_id: String,
    base_url: String,
    references: Arc<dyn ReferenceSource>,
}

impl Debug for GeminiImageClient {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("GeminiImageClient")
            .field("model_id", &self.model_id)
            .finish()
    }
}

impl GeminiImageClient {
    pub fn new(
        api_key: impl Into<String>,
        model_id: impl Into<String>,
        base_url: impl Into<String>,
        references: Arc<dyn ReferenceSource>,
    ) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(GENERATION_TIMEOUT_SECS))
            .build()
            .context("Failed to create HTTP client for Gemini image generation")?;

        Ok(Self {
            http_client,
            api_key: api_key.into(),
            model_id: model_id.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            references,
        })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url, self.model_id
        )
    }
}

#[async_trait]
impl ImageGenerator for GeminiImageClient {
    async fn generate(
        &self,
        prompt: &str,
        reference_images: &[String],
        mutation: &str,
    ) -> Result<String, GenerationError> {
        let final_prompt = render_anchor_prompt(prompt, mutation);

        let mut encoded = Vec::with_capacity(reference_images.len());
        for reference in reference_images {
            encoded.push(self.references.to_base64(reference).await?);
        }

        tracing::info!(
            model = %self.model_id,
            prompt_chars = final_prompt.len(),
            reference_count = encoded.len(),
            mutation = %mutation,
            "Generating image"
        );

        let mut parts = vec![json!({ "text": final_prompt })];
        parts.extend(encoded.into_iter().map(|data| {
            json!({ "inlineData": { "mimeType": "image/jpeg", "data": data } })
        }));

        let body = json!({
            "contents": [{ "role": "user", "parts": parts }],
            "generationConfig": {
                "imageConfig": {
                    "aspectRatio": OUTPUT_ASPECT_RATIO,
                    "imageSize": OUTPUT_IMAGE_SIZE,
                }
            }
        });

        let start = std::time::Instant::now();
        let response = self
            .http_client
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(GenerationError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: GenerateContentResponse = response.json().await?;
        let image = parsed.first_image().ok_or(GenerationError::NoImageReturned)?;

        tracing::info!(
            model = %self.model_id,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Gemini returned image"
        );

        Ok(image)
    }
}
