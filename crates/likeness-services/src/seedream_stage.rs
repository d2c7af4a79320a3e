//! Seedream stage: one enhanced image per curated source photo.

use base64::Engine;
use chrono::Utc;
use std::io::Cursor;
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

use likeness_core::constants::{SEEDREAM_FALLBACK_WIDTH, SEEDREAM_TARGET_HEIGHT};
use likeness_core::models::{
    batch_record_name, GenerationState, Identity, IdentitySource, IdentityStatus, NewIdentity,
    SeedreamIdentity, SeedreamRequest, SeedreamResponse,
};
use likeness_core::prompts::SEEDREAM_PROMPT;
use likeness_core::AppError;
use likeness_db::{ClaimOutcome, ConflictRule, IdentityStore};
use likeness_plugins::{Enhancer, ReferenceSource};

use crate::retry::{self, RetryPolicy};

/// Output size `"{width}*{height}"` keeping the source aspect ratio at the target height.
pub fn output_size(width: u32, height: u32) -> String {
    if width == 0 || height == 0 {
        return format!("{}*{}", SEEDREAM_FALLBACK_WIDTH, SEEDREAM_TARGET_HEIGHT);
    }
    let target_width = (SEEDREAM_TARGET_HEIGHT as f64 * width as f64 / height as f64).round();
    let width = ((target_width / 8.0).round() * 8.0) as u32;
    format!("{}*{}", width, SEEDREAM_TARGET_HEIGHT)
}

/// Image dimensions, or the fallback size when the bytes cannot be decoded.
fn dimensions(bytes: &[u8]) -> (u32, u32) {
    let detected = image::ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(image::ImageError::from)
        .and_then(|reader| reader.into_dimensions());
    match detected {
        Ok(dims) => dims,
        Err(e) => {
            tracing::warn!(error = %e, "Could not detect image dimensions, using fallback");
            (SEEDREAM_FALLBACK_WIDTH, SEEDREAM_TARGET_HEIGHT)
        }
    }
}

#[derive(Clone)]
pub struct SeedreamStage {
    identities: Arc<dyn IdentityStore>,
    references: Arc<dyn ReferenceSource>,
    enhancer: Arc<dyn Enhancer>,
}

impl SeedreamStage {
    pub fn new(
        identities: Arc<dyn IdentityStore>,
        references: Arc<dyn ReferenceSource>,
        enhancer: Arc<dyn Enhancer>,
    ) -> Self {
        Self {
            identities,
            references,
            enhancer,
        }
    }

    #[tracing::instrument(skip(self, request), fields(photos = request.photos.len()))]
    pub async fn run(&self, request: SeedreamRequest) -> Result<SeedreamResponse, AppError> {
        if request.photos.is_empty() {
            return Err(AppError::InvalidInput("No photos provided".to_string()));
        }
        let username = request
            .instagram_username
            .as_deref()
            .map(str::trim)
            .filter(|u| !u.is_empty())
            .map(str::to_string);

        let generation_id = Uuid::new_v4();
        let now = Utc::now();
        let new_records: Vec<NewIdentity> = request
            .photos
            .iter()
            .enumerate()
            .map(|(i, photo)| NewIdentity {
                name: batch_record_name("Identity", i, now),
                source_photos: vec![photo.clone()],
                src: IdentitySource::Sd,
                gen_id: Some(generation_id),
                gen_st: Some(GenerationState::Gen),
                instagram_username: username.clone(),
            })
            .collect();

        let records = match username.as_deref() {
            Some(username) => match self
                .identities
                .claim_batch(username, ConflictRule::ActiveIdentity, new_records)
                .await
                .map_err(|e| AppError::Persistence(format!("Failed to create identity records: {}", e)))?
            {
                ClaimOutcome::Created(records) => records,
                ClaimOutcome::Conflict => {
                    return Err(AppError::Conflict(format!(
                        "DUPLICATE_IDENTITY: an identity for @{} is already being processed or completed",
                        username
                    )))
                }
            },
            None => self
                .identities
                .create_batch(new_records)
                .await
                .map_err(|e| AppError::Persistence(format!("Failed to create identity records: {}", e)))?,
        };

        tracing::info!(gen_id = %generation_id, count = records.len(), "Created seedream records");

        // Runs detached from the request so a dropped caller cannot strand rows in `gen`.
        let stage = self.clone();
        let identities =
            tokio::spawn(async move { stage.process_batch(records, generation_id).await })
                .await
                .map_err(|e| {
                    tracing::error!(gen_id = %generation_id, error = %e, "Seedream task aborted");
                    AppError::Internal(format!("Seedream task failed: {}", e))
                })?;

        let completed = identities
            .iter()
            .filter(|i| i.status == IdentityStatus::Completed)
            .count();
        Ok(SeedreamResponse {
            success: true,
            total: identities.len(),
            completed,
            identities,
        })
    }

    async fn process_batch(
        self,
        records: Vec<Identity>,
        generation_id: Uuid,
    ) -> Vec<SeedreamIdentity> {
        let start = Instant::now();
        let mut identities = Vec::with_capacity(records.len());
        for (index, record) in records.iter().enumerate() {
            let (status, url) = self.process_photo(index, record).await;
            identities.push(SeedreamIdentity {
                id: record.id,
                name: record.name.clone(),
                generated_image_url: url,
                status,
            });
        }

        if let Err(e) = retry::execute_linear(&RetryPolicy::record_update(), "finish_batch", || {
            self.identities.finish_batch(generation_id)
        })
        .await
        {
            tracing::error!(gen_id = %generation_id, error = %e, "Failed to mark batch done");
        }

        let completed = identities
            .iter()
            .filter(|i| i.status == IdentityStatus::Completed)
            .count();
        tracing::info!(
            gen_id = %generation_id,
            total = identities.len(),
            completed,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Seedream batch finished"
        );
        identities
    }

    /// Enhances one photo and returns the record's resulting status and URL.
    async fn process_photo(
        &self,
        index: usize,
        record: &Identity,
    ) -> (IdentityStatus, Option<String>) {
        let Some(photo) = record.source_photos.first() else {
            self.mark_failed(record.id).await;
            return (IdentityStatus::Failed, None);
        };
        tracing::info!(identity_id = %record.id, index, "Processing photo");

        let bytes = match retry::execute(&RetryPolicy::base64(), "resolve_photo", || {
            self.references.fetch_bytes(photo)
        })
        .await
        {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::error!(identity_id = %record.id, error = %e, "Failed to load source photo");
                self.mark_failed(record.id).await;
                return (IdentityStatus::Failed, None);
            }
        };

        let (width, height) = dimensions(&bytes);
        let size = output_size(width, height);
        tracing::debug!(width, height, size = %size, "Computed output size");
        let image_base64 = base64::engine::general_purpose::STANDARD.encode(&bytes);

        let url = match retry::execute(&RetryPolicy::generation(), "seedream_enhance", || {
            self.enhancer.enhance(&image_base64, SEEDREAM_PROMPT, &size)
        })
        .await
        {
            Ok(url) => url,
            Err(e) => {
                tracing::error!(identity_id = %record.id, error = %e, "Enhancement failed");
                self.mark_failed(record.id).await;
                return (IdentityStatus::Failed, None);
            }
        };

        match retry::execute_linear(&RetryPolicy::record_update(), "mark_completed", || {
            self.identities.mark_completed(record.id, &url)
        })
        .await
        {
            Ok(true) => (IdentityStatus::Completed, Some(url)),
            Ok(false) => (IdentityStatus::Failed, None),
            Err(e) => {
                tracing::error!(identity_id = %record.id, url = %url, error = %e, "Failed to store enhanced URL");
                (IdentityStatus::Processing, None)
            }
        }
    }

    async fn mark_failed(&self, id: Uuid) {
        if let Err(e) = self.identities.mark_failed(id).await {
            tracing::error!(identity_id = %id, error = %e, "Failed to mark record failed");
        }
    }
}
