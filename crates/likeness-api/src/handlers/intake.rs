//! Profile intake routes. Both stream NDJSON events while the broker is paged.

use std::sync::Arc;

use axum::{
    extract::State,
    http::HeaderMap,
    response::Response,
};
use futures::StreamExt;
use likeness_core::validation::extract_instagram_username;
use likeness_core::AppError;
use serde::Deserialize;
use utoipa::ToSchema;

use crate::error::{ErrorResponse, HttpAppError, ValidatedJson};
use crate::ndjson::ndjson_response;
use crate::state::AppState;

/// Optional header tying broker usage to a dashboard session.
pub const SESSION_ID_HEADER: &str = "x-session-id";

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProfileRequest {
    #[serde(default)]
    pub profile_url: Option<String>,
}

fn session_id(headers: &HeaderMap) -> Option<String> {
    headers
        .get(SESSION_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn username(request: &ProfileRequest) -> Result<String, AppError> {
    extract_instagram_username(request.profile_url.as_deref().unwrap_or_default())
}

/// Collect, classify and save a profile's photos
#[utoipa::path(
    post,
    path = "/api/instagram/analyze",
    tag = "intake",
    request_body = ProfileRequest,
    params(
        ("X-Session-Id" = Option<String>, Header, description = "Session charged in the usage log")
    ),
    responses(
        (status = 200, description = "NDJSON event stream", content_type = "application/x-ndjson"),
        (status = 400, description = "Invalid profile URL", body = ErrorResponse),
        (status = 500, description = "Broker or classifier not configured", body = ErrorResponse)
    )
)]
#[tracing::instrument(skip(state, headers, request), fields(operation = "analyze_profile"))]
pub async fn analyze_profile(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    ValidatedJson(request): ValidatedJson<ProfileRequest>,
) -> Result<Response, HttpAppError> {
    let username = username(&request)?;
    let pipeline = state.intake()?;
    if state.config.gemini_api_key().is_none() {
        return Err(AppError::NotConfigured("GEMINI_API_KEY").into());
    }

    tracing::info!(username = %username, "Starting photo intake");
    let events = pipeline.analyze_photos(username, session_id(&headers));
    Ok(ndjson_response(events.map(|event| event.to_ndjson())))
}

/// Collect and save a profile's reels
#[utoipa::path(
    post,
    path = "/api/instagram/reels",
    tag = "intake",
    request_body = ProfileRequest,
    params(
        ("X-Session-Id" = Option<String>, Header, description = "Session charged in the usage log")
    ),
    responses(
        (status = 200, description = "NDJSON event stream", content_type = "application/x-ndjson"),
        (status = 400, description = "Invalid profile URL", body = ErrorResponse),
        (status = 500, description = "Broker not configured", body = ErrorResponse)
    )
)]
#[tracing::instrument(skip(state, headers, request), fields(operation = "collect_reels"))]
pub async fn collect_reels(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    ValidatedJson(request): ValidatedJson<ProfileRequest>,
) -> Result<Response, HttpAppError> {
    let username = username(&request)?;
    let pipeline = state.intake()?;

    tracing::info!(username = %username, "Starting reel intake");
    let events = pipeline.collect_reels(username, session_id(&headers));
    Ok(ndjson_response(events.map(|event| event.to_ndjson())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn session_id_ignores_blank_header() {
        let mut headers = HeaderMap::new();
        assert_eq!(session_id(&headers), None);
        headers.insert(SESSION_ID_HEADER, HeaderValue::from_static("  "));
        assert_eq!(session_id(&headers), None);
        headers.insert(SESSION_ID_HEADER, HeaderValue::from_static("sess-1"));
        assert_eq!(session_id(&headers).as_deref(), Some("sess-1"));
    }

    #[test]
    fn missing_profile_url_is_invalid_input() {
        let err = username(&ProfileRequest { profile_url: None }).unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(_)));
    }
}
