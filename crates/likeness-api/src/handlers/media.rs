//! Media library routes: listing, deletion, uploads, saved reels and extracted frames.

use std::sync::Arc;

use axum::{
    extract::{Multipart, Path, State},
    http::StatusCode,
    Json,
};
use likeness_core::models::{
    MediaItem, MediaSource, MediaType, NewMediaItem, SaveFramesRequest, SaveFramesResponse,
    SaveReelRequest,
};
use likeness_core::AppError;
use likeness_plugins::decode_data_url;
use likeness_storage::keys::extension_for_content_type;
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::{ErrorResponse, HttpAppError, ValidatedJson};
use crate::state::{AppState, MediaState};

#[derive(Debug, Serialize, ToSchema)]
pub struct UploadResponse {
    pub url: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SaveReelResponse {
    pub id: Uuid,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct DeleteAllResponse {
    pub deleted: u64,
}

/// Removes the blob behind an owned item. Failures are logged, never returned.
async fn delete_blob(media: &MediaState, item: &MediaItem) {
    if !item.source.owns_blob() {
        return;
    }
    if let Err(e) = media.storage.delete_by_url(&item.url).await {
        tracing::warn!(media_id = %item.id, url = %item.url, error = %e, "Failed to delete media blob");
    }
}

/// List the media library
#[utoipa::path(
    get,
    path = "/api/media",
    tag = "media",
    responses(
        (status = 200, description = "Items ordered by display order", body = [MediaItem]),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
pub async fn list_media(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<MediaItem>>, HttpAppError> {
    let items = state.media.items.list().await?;
    Ok(Json(items))
}

/// Delete every media item
///
/// Blobs of uploaded and extracted items are removed first, best-effort.
#[utoipa::path(
    delete,
    path = "/api/media",
    tag = "media",
    responses(
        (status = 200, description = "Library cleared", body = DeleteAllResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
#[tracing::instrument(skip(state), fields(operation = "delete_all_media"))]
pub async fn delete_all_media(
    State(state): State<Arc<AppState>>,
) -> Result<Json<DeleteAllResponse>, HttpAppError> {
    let items = state.media.items.list().await?;
    for item in &items {
        delete_blob(&state.media, item).await;
    }
    let deleted = state.media.items.delete_all().await?;
    tracing::info!(deleted, "Media library cleared");
    Ok(Json(DeleteAllResponse { deleted }))
}

/// Delete one media item
#[utoipa::path(
    delete,
    path = "/api/media/{id}",
    tag = "media",
    params(
        ("id" = Uuid, Path, description = "Media item ID")
    ),
    responses(
        (status = 204, description = "Media item deleted"),
        (status = 404, description = "Media item not found", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
#[tracing::instrument(skip(state), fields(media_id = %id, operation = "delete_media"))]
pub async fn delete_media(
    Path(id): Path<Uuid>,
    State(state): State<Arc<AppState>>,
) -> Result<StatusCode, HttpAppError> {
    let item = state
        .media
        .items
        .get(id)
        .await?
        .ok_or_else(|| AppError::NotFound("Media item not found".to_string()))?;

    delete_blob(&state.media, &item).await;

    if !state.media.items.delete(id).await? {
        return Err(AppError::NotFound("Media item not found".to_string()).into());
    }
    Ok(StatusCode::NO_CONTENT)
}

/// Upload a file into the media library
#[utoipa::path(
    post,
    path = "/api/media/upload",
    tag = "media",
    request_body(content = inline(Object), content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "File stored", body = UploadResponse),
        (status = 400, description = "No file provided", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
#[tracing::instrument(skip(state, multipart), fields(operation = "upload_media"))]
pub async fn upload_media(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, HttpAppError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::InvalidInput(format!("Invalid multipart body: {}", e)))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let content_type = field
            .content_type()
            .unwrap_or("application/octet-stream")
            .to_string();
        let data = field
            .bytes()
            .await
            .map_err(|e| AppError::InvalidInput(format!("Failed to read file: {}", e)))?;
        if data.is_empty() {
            return Err(AppError::InvalidInput("File is empty".to_string()).into());
        }

        let key = format!(
            "{}.{}",
            Uuid::new_v4(),
            extension_for_content_type(&content_type)
        );
        let url = state
            .media
            .storage
            .put(&key, data.to_vec(), &content_type)
            .await?;

        let media_type = MediaType::from_content_type(&content_type);
        state
            .media
            .items
            .append(vec![NewMediaItem::new(media_type, MediaSource::Upload, url.clone())])
            .await?;

        tracing::info!(key = %key, media_type = %media_type, size = data.len(), "Media uploaded");
        return Ok(Json(UploadResponse { url }));
    }

    Err(AppError::InvalidInput("No file provided".to_string()).into())
}

/// Save a reel to the library
///
/// Idempotent by URL: an already saved video returns its existing id.
#[utoipa::path(
    post,
    path = "/api/media/reels",
    tag = "media",
    request_body = SaveReelRequest,
    responses(
        (status = 200, description = "Reel saved or already present", body = SaveReelResponse),
        (status = 400, description = "Missing URL", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
#[tracing::instrument(skip(state, request), fields(operation = "save_reel"))]
pub async fn save_reel(
    State(state): State<Arc<AppState>>,
    ValidatedJson(request): ValidatedJson<SaveReelRequest>,
) -> Result<Json<SaveReelResponse>, HttpAppError> {
    let url = request
        .url
        .map(|u| u.trim().to_string())
        .filter(|u| !u.is_empty())
        .ok_or_else(|| AppError::InvalidInput("URL is required".to_string()))?;

    if let Some(id) = state.media.items.find_video_by_url(&url).await? {
        tracing::debug!(media_id = %id, "Reel already saved");
        return Ok(Json(SaveReelResponse { id }));
    }

    let mut item = NewMediaItem::new(
        MediaType::Video,
        request.source.unwrap_or(MediaSource::Instagram),
        url,
    );
    item.thumbnail_url = request.thumbnail_url;
    item.caption = request.caption;
    item.instagram_id = request.instagram_id;

    let saved = state.media.items.append(vec![item]).await?;
    let id = saved
        .first()
        .map(|m| m.id)
        .ok_or_else(|| AppError::Persistence("Reel insert returned no row".to_string()))?;
    Ok(Json(SaveReelResponse { id }))
}

/// Upload extracted video frames
///
/// Each frame is a data URL. Frames that fail to decode, upload or save are reported in
/// `errors` and do not fail the request.
#[utoipa::path(
    post,
    path = "/api/media/frames",
    tag = "media",
    request_body = SaveFramesRequest,
    responses(
        (status = 200, description = "Frames processed", body = SaveFramesResponse),
        (status = 400, description = "No frames provided", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
#[tracing::instrument(skip(state, request), fields(operation = "save_frames", frames = request.frames.len()))]
pub async fn save_frames(
    State(state): State<Arc<AppState>>,
    ValidatedJson(request): ValidatedJson<SaveFramesRequest>,
) -> Result<Json<SaveFramesResponse>, HttpAppError> {
    if request.frames.is_empty() {
        return Err(AppError::InvalidInput("No frames provided".to_string()).into());
    }

    let total_count = request.frames.len();
    let mut urls = Vec::with_capacity(total_count);
    let mut errors = Vec::new();

    for (index, frame) in request.frames.iter().enumerate() {
        match save_frame(&state.media, frame, request.parent_video_id).await {
            Ok(url) => urls.push(url),
            Err(e) => {
                tracing::warn!(frame = index + 1, error = %e, "Failed to save frame");
                errors.push(format!("Frame {}: {}", index + 1, e));
            }
        }
    }

    tracing::info!(saved = urls.len(), total = total_count, "Frames processed");
    Ok(Json(SaveFramesResponse {
        success_count: urls.len(),
        total_count,
        urls,
        errors: if errors.is_empty() { None } else { Some(errors) },
    }))
}

async fn save_frame(
    media: &MediaState,
    frame: &str,
    parent_video_id: Option<Uuid>,
) -> anyhow::Result<String> {
    let decoded = decode_data_url(frame)
        .ok_or_else(|| anyhow::anyhow!("not a data URL"))??;

    let key = format!("frame_{}.png", Uuid::new_v4());
    let url = media.storage.put(&key, decoded.data, "image/png").await?;

    let mut item = NewMediaItem::new(MediaType::Frame, MediaSource::Extracted, url.clone());
    item.parent_video_id = parent_video_id;
    media.items.append(vec![item]).await?;
    Ok(url)
}
