//! Gemini face-suitability classifier for intake photos.
//!
//! Photos are scored in batches. Failures never propagate: an image that cannot be fetched,
//! a blocked batch and an API error all turn into `decision = no` results with an explanation.

use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::Engine;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;

use likeness_core::constants::{
    CLASSIFIER_BATCH_SIZE, CLASSIFIER_FETCH_TIMEOUT_SECS, CLASSIFIER_TOP_SELECTIONS,
};
use likeness_core::prompts::classifier_prompt;

use crate::json::strip_code_fences;

const FETCH_FAILED: &str = "Failed to fetch image";
const BLOCKED: &str = "Content blocked by safety filters";
const API_ERROR: &str = "API error";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Yes,
    No,
}

/// Classifier verdict for one photo.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaceAnalysis {
    pub url: String,
    pub zoom_score: f64,
    pub visibility_score: f64,
    pub total: f64,
    pub decision: Decision,
    pub explanation: String,
}

impl FaceAnalysis {
    fn rejected(url: &str, explanation: &str) -> Self {
        Self {
            url: url.to_string(),
            zoom_score: 0.0,
            visibility_score: 0.0,
            total: 0.0,
            decision: Decision::No,
            explanation: explanation.to_string(),
        }
    }

    pub fn passed(&self) -> bool {
        self.decision == Decision::Yes
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassificationOutcome {
    pub all_results: Vec<FaceAnalysis>,
    /// Best passing photos by total score, descending.
    pub top_selections: Vec<FaceAnalysis>,
}

/// Reported after each classified batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchProgress {
    pub batch: usize,
    pub total_batches: usize,
    pub analyzed: usize,
    pub passed: usize,
}

pub type ProgressCallback<'a> = &'a (dyn Fn(BatchProgress) + Send + Sync);

#[async_trait]
pub trait FaceClassifier: Send + Sync {
    async fn classify(&self, urls: &[String], on_progress: ProgressCallback<'_>)
        -> ClassificationOutcome;
}

struct FetchedImage {
    url: String,
    mime_type: String,
    data: String,
}

/// Raw per-image verdict as emitted by the model
#[derive(Debug, Deserialize)]
struct RawVerdict {
    index: Option<usize>,
    #[serde(default)]
    zoom_score: Option<f64>,
    #[serde(default)]
    visibility_score: Option<f64>,
    #[serde(default)]
    total: Option<f64>,
    #[serde(default)]
    decision: Option<String>,
    #[serde(default)]
    explanation: Option<String>,
}

enum BatchReply {
    Text(String),
    Blocked,
}

pub struct GeminiFaceClassifier {
    http_client: reqwest::Client,
    fetch_client: reqwest::Client,
    api_key: String,
    model_id: String,
    base_url: String,
    batch_size: usize,
}

impl GeminiFaceClassifier {
    pub fn new(
        api_key: impl Into<String>,
        model_id: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .context("Failed to create HTTP client for Gemini classifier")?;
        let fetch_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(CLASSIFIER_FETCH_TIMEOUT_SECS))
            .build()
            .context("Failed to create HTTP client for classifier image fetches")?;

        Ok(Self {
            http_client,
            fetch_client,
            api_key: api_key.into(),
            model_id: model_id.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            batch_size: CLASSIFIER_BATCH_SIZE,
        })
    }

    async fn fetch_image(&self, url: &str) -> Option<FetchedImage> {
        let response = match self.fetch_client.get(url).send().await {
            Ok(r) if r.status().is_success() => r,
            Ok(r) => {
                tracing::warn!(url = %url, status = %r.status(), "Classifier image fetch failed");
                return None;
            }
            Err(e) => {
                if e.is_timeout() {
                    tracing::warn!(url = %url, "Timeout fetching image for classification");
                } else {
                    tracing::warn!(url = %url, error = %e, "Classifier image fetch failed");
                }
                return None;
            }
        };

        let mime_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("image/jpeg")
            .to_string();
        let bytes = response.bytes().await.ok()?;

        Some(FetchedImage {
            url: url.to_string(),
            mime_type,
            data: base64::engine::general_purpose::STANDARD.encode(bytes),
        })
    }

    async fn request_batch(&self, images: &[FetchedImage]) -> Result<BatchReply> {
        let mut parts = vec![json!({ "text": classifier_prompt(images.len()) })];
        parts.extend(images.iter().map(|img| {
            json!({ "inlineData": { "mimeType": img.mime_type, "data": img.data } })
        }));

        let response = self
            .http_client
            .post(format!(
                "{}/v1beta/models/{}:generateContent",
                self.base_url, self.model_id
            ))
            .header("x-goog-api-key", &self.api_key)
            .json(&json!({ "contents": [{ "role": "user", "parts": parts }] }))
            .send()
            .await
            .context("Failed to send request to Gemini classifier")?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(anyhow::anyhow!(
                "Gemini classifier request failed: {} - {}",
                status,
                error_text
            ));
        }

        let body: Value = response
            .json()
            .await
            .context("Failed to parse Gemini classifier response")?;

        if body.pointer("/promptFeedback/blockReason").is_some() {
            return Ok(BatchReply::Blocked);
        }

        let text: String = body
            .pointer("/candidates/0/content/parts")
            .and_then(Value::as_array)
            .map(|parts| {
                parts
                    .iter()
                    .filter_map(|p| p.get("text").and_then(Value::as_str))
                    .collect()
            })
            .unwrap_or_default();

        if text.trim().is_empty() {
            return Ok(BatchReply::Blocked);
        }
        Ok(BatchReply::Text(text))
    }
}

/// Maps model verdicts back to the fetched URLs, by `index` or by position.
fn map_verdicts(text: &str, urls: &[&str]) -> Result<Vec<FaceAnalysis>> {
    let parsed: Value =
        serde_json::from_str(&strip_code_fences(text)).context("Classifier output is not JSON")?;
    let items = match parsed {
        Value::Array(items) => items,
        other => vec![other],
    };

    let mut results = Vec::with_capacity(items.len());
    for (position, item) in items.into_iter().enumerate() {
        let verdict: RawVerdict =
            serde_json::from_value(item).context("Unexpected classifier verdict shape")?;
        let index = verdict.index.unwrap_or(position);
        let Some(url) = urls.get(index) else {
            continue;
        };

        let zoom = verdict.zoom_score.unwrap_or(0.0);
        let visibility = verdict.visibility_score.unwrap_or(0.0);
        let total = verdict
            .total
            .filter(|t| *t != 0.0)
            .unwrap_or(zoom + visibility);

        results.push(FaceAnalysis {
            url: url.to_string(),
            zoom_score: zoom,
            visibility_score: visibility,
            total,
            decision: if verdict.decision.as_deref() == Some("yes") {
                Decision::Yes
            } else {
                Decision::No
            },
            explanation: verdict.explanation.unwrap_or_default(),
        });
    }
    Ok(results)
}

/// Top passing results, highest total first.
pub fn top_selections(results: &[FaceAnalysis], limit: usize) -> Vec<FaceAnalysis> {
    let mut passed: Vec<FaceAnalysis> = results.iter().filter(|r| r.passed()).cloned().collect();
    passed.sort_by(|a, b| b.total.total_cmp(&a.total));
    passed.truncate(limit);
    passed
}

#[async_trait]
impl FaceClassifier for GeminiFaceClassifier {
    async fn classify(
        &self,
        urls: &[String],
        on_progress: ProgressCallback<'_>,
    ) -> ClassificationOutcome {
        let mut results: Vec<FaceAnalysis> = Vec::with_capacity(urls.len());
        let total_batches = urls.len().div_ceil(self.batch_size);

        for (batch_index, batch) in urls.chunks(self.batch_size).enumerate() {
            let batch_number = batch_index + 1;
            tracing::info!(
                batch = batch_number,
                total_batches,
                photos = batch.len(),
                "Classifying photo batch"
            );

            let fetched = join_all(batch.iter().map(|url| self.fetch_image(url))).await;
            let mut images = Vec::with_capacity(batch.len());
            for (url, image) in batch.iter().zip(fetched) {
                match image {
                    Some(image) => images.push(image),
                    None => results.push(FaceAnalysis::rejected(url, FETCH_FAILED)),
                }
            }

            if images.is_empty() {
                tracing::warn!(batch = batch_number, "No valid images in batch");
                continue;
            }

            let fetched_urls: Vec<&str> = images.iter().map(|i| i.url.as_str()).collect();
            let outcome = match self.request_batch(&images).await {
                Ok(BatchReply::Text(text)) => map_verdicts(&text, &fetched_urls),
                Ok(BatchReply::Blocked) => {
                    tracing::warn!(batch = batch_number, "Content blocked by safety filters");
                    results.extend(fetched_urls.iter().map(|u| FaceAnalysis::rejected(u, BLOCKED)));
                    continue;
                }
                Err(e) => Err(e),
            };

            match outcome {
                Ok(verdicts) => {
                    results.extend(verdicts);
                    let passed = results.iter().filter(|r| r.passed()).count();
                    tracing::info!(
                        batch = batch_number,
                        total_batches,
                        analyzed = results.len(),
                        passed,
                        "Photo batch classified"
                    );
                    on_progress(BatchProgress {
                        batch: batch_number,
                        total_batches,
                        analyzed: results.len(),
                        passed,
                    });
                }
                Err(e) => {
                    tracing::error!(batch = batch_number, error = %e, "Photo batch classification failed");
                    results.extend(fetched_urls.iter().map(|u| FaceAnalysis::rejected(u, API_ERROR)));
                }
            }
        }

        let top = top_selections(&results, CLASSIFIER_TOP_SELECTIONS);
        ClassificationOutcome {
            all_results: results,
            top_selections: top,
        }
    }
}
