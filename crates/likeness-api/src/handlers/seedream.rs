use std::sync::Arc;

use axum::{extract::State, Json};
use likeness_core::models::{SeedreamRequest, SeedreamResponse};

use crate::error::{ErrorResponse, HttpAppError, ValidatedJson};
use crate::state::AppState;

/// Enhance source photos into seedream identities
#[utoipa::path(
    post,
    path = "/api/seedream",
    tag = "generation",
    request_body = SeedreamRequest,
    responses(
        (status = 200, description = "Photos processed", body = SeedreamResponse),
        (status = 400, description = "No photos provided", body = ErrorResponse),
        (status = 409, description = "Profile already has an active identity", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
#[tracing::instrument(skip(state, request), fields(operation = "seedream", photos = request.photos.len()))]
pub async fn create_seedream(
    State(state): State<Arc<AppState>>,
    ValidatedJson(request): ValidatedJson<SeedreamRequest>,
) -> Result<Json<SeedreamResponse>, HttpAppError> {
    let response = state.seedream()?.run(request).await?;
    Ok(Json(response))
}
