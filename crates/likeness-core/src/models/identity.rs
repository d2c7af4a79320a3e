use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;
use utoipa::ToSchema;
use uuid::Uuid;

/// Lifecycle of a single identity image.
///
/// `Completed` implies a generated URL; `Failed` is terminal.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, ToSchema)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(type_name = "text", rename_all = "lowercase"))]
#[serde(rename_all = "lowercase")]
pub enum IdentityStatus {
    Processing,
    Completed,
    Failed,
}

impl Display for IdentityStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            IdentityStatus::Processing => write!(f, "processing"),
            IdentityStatus::Completed => write!(f, "completed"),
            IdentityStatus::Failed => write!(f, "failed"),
        }
    }
}

impl FromStr for IdentityStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "processing" => Ok(IdentityStatus::Processing),
            "completed" => Ok(IdentityStatus::Completed),
            "failed" => Ok(IdentityStatus::Failed),
            _ => Err(anyhow::anyhow!("Invalid identity status: {}", s)),
        }
    }
}

/// Pipeline stage that produced an identity.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, ToSchema)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(type_name = "text", rename_all = "lowercase"))]
#[serde(rename_all = "lowercase")]
pub enum IdentitySource {
    /// Seedream enhancement of a curated source photo
    Sd,
    /// Anchor portrait blended from seedream outputs
    Anc,
    /// Variant derived from the primary anchor
    Var,
}

impl IdentitySource {
    pub fn as_str(&self) -> &'static str {
        match self {
            IdentitySource::Sd => "sd",
            IdentitySource::Anc => "anc",
            IdentitySource::Var => "var",
        }
    }

    /// Number of records a batch of this kind is expected to produce.
    ///
    /// Seedream batches are sized by the submitted photo count, so they have no fixed total.
    pub fn expected_batch_size(&self) -> Option<usize> {
        match self {
            IdentitySource::Sd => None,
            IdentitySource::Anc => Some(crate::constants::ANCHOR_BATCH_SIZE),
            IdentitySource::Var => Some(crate::constants::VARIANT_BATCH_SIZE),
        }
    }
}

impl Display for IdentitySource {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.as_str())
    }
}

impl FromStr for IdentitySource {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sd" => Ok(IdentitySource::Sd),
            "anc" => Ok(IdentitySource::Anc),
            "var" => Ok(IdentitySource::Var),
            _ => Err(anyhow::anyhow!("Invalid identity source: {}", s)),
        }
    }
}

/// Batch-level generation flag. Moves `gen -> done` once and never back.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, ToSchema)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(type_name = "text", rename_all = "lowercase"))]
#[serde(rename_all = "lowercase")]
pub enum GenerationState {
    Gen,
    Done,
}

impl Display for GenerationState {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            GenerationState::Gen => write!(f, "gen"),
            GenerationState::Done => write!(f, "done"),
        }
    }
}

/// Identity row
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Identity {
    pub id: Uuid,
    pub name: String,
    pub source_photos: Vec<String>,
    pub generated_image_url: Option<String>,
    pub status: IdentityStatus,
    pub src: IdentitySource,
    pub gen_id: Option<Uuid>,
    pub gen_st: Option<GenerationState>,
    pub instagram_username: Option<String>,
    pub is_primary: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Identity {
    /// Completed with an output the UI can actually show.
    pub fn is_visible_complete(&self) -> bool {
        self.status == IdentityStatus::Completed
            && self
                .generated_image_url
                .as_deref()
                .is_some_and(|url| !url.is_empty())
    }

    pub fn is_in_flight(&self) -> bool {
        self.gen_st == Some(GenerationState::Gen)
    }
}

/// Placeholder row inserted at the start of a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewIdentity {
    pub name: String,
    pub source_photos: Vec<String>,
    pub src: IdentitySource,
    pub gen_id: Option<Uuid>,
    pub gen_st: Option<GenerationState>,
    pub instagram_username: Option<String>,
}

/// Builds the human label used for batch records, e.g. `Anchor 3 - Oct 18, 2026`.
pub fn batch_record_name(prefix: &str, index: usize, at: DateTime<Utc>) -> String {
    format!("{} {} - {}", prefix, index + 1, at.format("%b %-d, %Y"))
}

/// Batch outcome returned by the anchor and variant routes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BatchSummary {
    pub success: bool,
    pub generation_id: Uuid,
    pub total: usize,
    pub completed: usize,
    pub failed: usize,
}

/// Request for `POST /api/anchor/generate`
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct AnchorGenerateRequest {
    #[serde(default)]
    pub instagram_username: Option<String>,
    #[serde(default, rename = "referenceImageUrls")]
    pub reference_image_urls: Vec<String>,
}

/// Request for `POST /api/anchor/variants`
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct VariantGenerateRequest {
    #[serde(default)]
    pub instagram_username: Option<String>,
    #[serde(default, rename = "primaryImageUrl")]
    pub primary_image_url: Option<String>,
}

/// Request for `POST /api/seedream`
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct SeedreamRequest {
    #[serde(default)]
    pub photos: Vec<String>,
    #[serde(default)]
    pub instagram_username: Option<String>,
}

/// One seedream record as reported back to the caller.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub struct SeedreamIdentity {
    pub id: Uuid,
    pub name: String,
    pub generated_image_url: Option<String>,
    pub status: IdentityStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub struct SeedreamResponse {
    pub success: bool,
    pub identities: Vec<SeedreamIdentity>,
    pub total: usize,
    pub completed: usize,
}

/// Request for `PUT /api/identities/{id}/primary`
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct SetPrimaryRequest {
    pub instagram_username: String,
}
