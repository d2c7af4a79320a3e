//! Media and video proxies.
//!
//! Stored objects are served from the object store by key so private buckets stay readable.
//! Everything else is fetched on the caller's behalf.

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use likeness_core::constants::{BROWSER_USER_AGENT, INSTAGRAM_REFERER};
use likeness_core::AppError;
use serde::Deserialize;
use utoipa::IntoParams;
use validator::Validate;

use crate::error::{error_body, ErrorResponse, HttpAppError};
use crate::state::AppState;

const IMMUTABLE_CACHE: &str = "public, max-age=31536000, immutable";

#[derive(Debug, Deserialize, Validate, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ProxyQuery {
    /// Absolute URL of the resource to proxy
    #[validate(url(message = "Must be a valid URL"))]
    pub url: Option<String>,
}

impl ProxyQuery {
    fn required_url(&self, missing: &str) -> Result<&str, AppError> {
        let url = self
            .url
            .as_deref()
            .map(str::trim)
            .filter(|u| !u.is_empty())
            .ok_or_else(|| AppError::InvalidInput(missing.to_string()))?;
        self.validate()?;
        Ok(url)
    }
}

/// Content type of stored bytes: sniffed image format, else derived from the key.
pub fn sniff_content_type(key: &str, bytes: &[u8]) -> &'static str {
    if let Ok(format) = image::guess_format(bytes) {
        return format.to_mime_type();
    }
    let extension = key.rsplit('.').next().unwrap_or_default().to_lowercase();
    match extension.as_str() {
        "mp4" => "video/mp4",
        "mov" | "quicktime" => "video/quicktime",
        "webm" => "video/webm",
        _ => "application/octet-stream",
    }
}

/// Error response that keeps the upstream status code.
fn upstream_failure(status: StatusCode, message: String) -> Response {
    let status = if status.is_client_error() || status.is_server_error() {
        status
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };
    tracing::warn!(status = %status, message = %message, "Proxied fetch failed");
    (status, Json(error_body(&AppError::Upstream(message)))).into_response()
}

/// Proxy an image
#[utoipa::path(
    get,
    path = "/api/media/proxy",
    tag = "proxy",
    params(ProxyQuery),
    responses(
        (status = 200, description = "Image bytes", content_type = "application/octet-stream"),
        (status = 400, description = "Missing or invalid URL", body = ErrorResponse),
        (status = 404, description = "Object not found", body = ErrorResponse),
        (status = 500, description = "Fetch failed", body = ErrorResponse)
    )
)]
#[tracing::instrument(skip(state, query), fields(operation = "media_proxy"))]
pub async fn media_proxy(
    Query(query): Query<ProxyQuery>,
    State(state): State<Arc<AppState>>,
) -> Result<Response, HttpAppError> {
    let url = query.required_url("URL parameter is required")?;

    if let Some(key) = state.media.storage.key_for_url(url) {
        let bytes = state.media.storage.get(&key).await?;
        let content_type = sniff_content_type(&key, &bytes);
        return Ok((
            [
                (header::CONTENT_TYPE, content_type),
                (header::CACHE_CONTROL, IMMUTABLE_CACHE),
            ],
            bytes,
        )
            .into_response());
    }

    let response = state
        .http_client
        .get(url)
        .send()
        .await
        .map_err(|e| AppError::Upstream(format!("Failed to fetch image: {}", e)))?;
    if !response.status().is_success() {
        let status = StatusCode::from_u16(response.status().as_u16())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        return Ok(upstream_failure(status, "Failed to fetch image".to_string()));
    }

    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("image/jpeg")
        .to_string();
    let bytes = response
        .bytes()
        .await
        .map_err(|e| AppError::Upstream(format!("Failed to fetch image: {}", e)))?;

    Ok((
        [
            (header::CONTENT_TYPE, content_type),
            (header::CACHE_CONTROL, IMMUTABLE_CACHE.to_string()),
        ],
        bytes,
    )
        .into_response())
}

/// Proxy a video with browser headers
#[utoipa::path(
    get,
    path = "/api/video/proxy",
    tag = "proxy",
    params(ProxyQuery),
    responses(
        (status = 200, description = "Video bytes", content_type = "video/mp4"),
        (status = 400, description = "Missing or invalid URL", body = ErrorResponse),
        (status = 500, description = "Fetch failed", body = ErrorResponse)
    )
)]
#[tracing::instrument(skip(state, query), fields(operation = "video_proxy"))]
pub async fn video_proxy(
    Query(query): Query<ProxyQuery>,
    State(state): State<Arc<AppState>>,
) -> Result<Response, HttpAppError> {
    let url = query.required_url("Missing video URL")?;

    let response = state
        .http_client
        .get(url)
        .header(reqwest::header::USER_AGENT, BROWSER_USER_AGENT)
        .header(reqwest::header::REFERER, INSTAGRAM_REFERER)
        .send()
        .await
        .map_err(|e| AppError::Upstream(format!("Failed to fetch video: {}", e)))?;
    if !response.status().is_success() {
        return Err(AppError::Upstream(format!(
            "Failed to fetch video: {}",
            response.status().as_u16()
        ))
        .into());
    }

    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("video/mp4")
        .to_string();
    let bytes = response
        .bytes()
        .await
        .map_err(|e| AppError::Upstream(format!("Failed to fetch video: {}", e)))?;

    Ok((
        [
            (header::CONTENT_TYPE, content_type),
            (header::ACCESS_CONTROL_ALLOW_ORIGIN, "*".to_string()),
            (header::ACCESS_CONTROL_ALLOW_METHODS, "GET".to_string()),
        ],
        bytes,
    )
        .into_response())
}
