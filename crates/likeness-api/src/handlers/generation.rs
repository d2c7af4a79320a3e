use std::sync::Arc;

use axum::{extract::State, Json};
use likeness_core::models::{AnchorGenerateRequest, BatchSummary, VariantGenerateRequest};

use crate::error::{ErrorResponse, HttpAppError, ValidatedJson};
use crate::state::AppState;

/// Generate anchor portraits
///
/// Creates ten `anc` records from the profile's seedream outputs and generates them one by
/// one. The request blocks until the batch settles.
#[utoipa::path(
    post,
    path = "/api/anchor/generate",
    tag = "generation",
    request_body = AnchorGenerateRequest,
    responses(
        (status = 200, description = "Batch finished", body = BatchSummary),
        (status = 400, description = "Missing username or references", body = ErrorResponse),
        (status = 404, description = "No seedream images for this profile", body = ErrorResponse),
        (status = 409, description = "A generation is already running", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
#[tracing::instrument(skip(state, request), fields(operation = "generate_anchors"))]
pub async fn generate_anchors(
    State(state): State<Arc<AppState>>,
    ValidatedJson(request): ValidatedJson<AnchorGenerateRequest>,
) -> Result<Json<BatchSummary>, HttpAppError> {
    let summary = state.generation()?.generate_anchors(request).await?;
    Ok(Json(summary))
}

/// Generate variants of the primary anchor
#[utoipa::path(
    post,
    path = "/api/anchor/variants",
    tag = "generation",
    request_body = VariantGenerateRequest,
    responses(
        (status = 200, description = "Batch finished", body = BatchSummary),
        (status = 400, description = "Missing username or primary image", body = ErrorResponse),
        (status = 409, description = "A variant generation is already running", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
#[tracing::instrument(skip(state, request), fields(operation = "generate_variants"))]
pub async fn generate_variants(
    State(state): State<Arc<AppState>>,
    ValidatedJson(request): ValidatedJson<VariantGenerateRequest>,
) -> Result<Json<BatchSummary>, HttpAppError> {
    let summary = state.generation()?.generate_variants(request).await?;
    Ok(Json(summary))
}
