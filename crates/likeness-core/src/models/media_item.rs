use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, ToSchema)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(type_name = "text", rename_all = "lowercase"))]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Photo,
    Video,
    Frame,
}

impl MediaType {
    /// `video/*` uploads become videos, everything else is a photo.
    pub fn from_content_type(content_type: &str) -> Self {
        if content_type.starts_with("video") {
            MediaType::Video
        } else {
            MediaType::Photo
        }
    }
}

impl Display for MediaType {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            MediaType::Photo => write!(f, "photo"),
            MediaType::Video => write!(f, "video"),
            MediaType::Frame => write!(f, "frame"),
        }
    }
}

/// Where a media item came from. Only non-instagram items own a storage blob.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, ToSchema)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(type_name = "text", rename_all = "lowercase"))]
#[serde(rename_all = "lowercase")]
pub enum MediaSource {
    Instagram,
    Upload,
    Extracted,
}

impl MediaSource {
    pub fn owns_blob(&self) -> bool {
        !matches!(self, MediaSource::Instagram)
    }
}

impl Display for MediaSource {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            MediaSource::Instagram => write!(f, "instagram"),
            MediaSource::Upload => write!(f, "upload"),
            MediaSource::Extracted => write!(f, "extracted"),
        }
    }
}

/// Media library row
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct MediaItem {
    pub id: Uuid,
    #[serde(rename = "type")]
    #[cfg_attr(feature = "sqlx", sqlx(rename = "type"))]
    pub media_type: MediaType,
    pub source: MediaSource,
    pub url: String,
    pub thumbnail_url: Option<String>,
    pub caption: Option<String>,
    pub instagram_id: Option<String>,
    pub instagram_username: Option<String>,
    pub parent_video_id: Option<Uuid>,
    pub display_order: i32,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMediaItem {
    pub media_type: MediaType,
    pub source: MediaSource,
    pub url: String,
    pub thumbnail_url: Option<String>,
    pub caption: Option<String>,
    pub instagram_id: Option<String>,
    pub instagram_username: Option<String>,
    pub parent_video_id: Option<Uuid>,
}

impl NewMediaItem {
    pub fn new(media_type: MediaType, source: MediaSource, url: impl Into<String>) -> Self {
        Self {
            media_type,
            source,
            url: url.into(),
            thumbnail_url: None,
            caption: None,
            instagram_id: None,
            instagram_username: None,
            parent_video_id: None,
        }
    }
}

/// Request for `POST /api/media/reels`
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct SaveReelRequest {
    #[serde(default)]
    pub url: Option<String>,
    pub thumbnail_url: Option<String>,
    pub caption: Option<String>,
    pub instagram_id: Option<String>,
    pub source: Option<MediaSource>,
}

/// Request for `POST /api/media/frames`
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct SaveFramesRequest {
    #[serde(default)]
    pub frames: Vec<String>,
    #[serde(rename = "parentVideoId")]
    pub parent_video_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SaveFramesResponse {
    pub urls: Vec<String>,
    pub success_count: usize,
    pub total_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<String>>,
}
