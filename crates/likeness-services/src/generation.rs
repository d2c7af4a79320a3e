//! Anchor and variant batch entry points.
//!
//! Requests are validated, then records are inserted through an atomic claim so two
//! concurrent submissions for the same username cannot both start a batch.

use chrono::Utc;
use std::collections::HashSet;
use std::sync::Arc;
use uuid::Uuid;

use likeness_core::constants::{ANCHOR_BATCH_SIZE, VARIANT_BATCH_SIZE};
use likeness_core::models::{
    batch_record_name, AnchorGenerateRequest, BatchSummary, GenerationState, IdentitySource,
    NewIdentity, VariantGenerateRequest,
};
use likeness_core::prompts::{anchor_mutations, variant_mutations, ANCHOR_BASE_PROMPT};
use likeness_core::AppError;
use likeness_db::{ClaimOutcome, ConflictRule, IdentityStore};

use crate::orchestrator::{BatchJob, BatchOrchestrator};

const ANCHOR_IN_PROGRESS: &str = "Anchor generation already in progress for this profile";
const VARIANT_IN_PROGRESS: &str = "Variant generation already in progress for this profile";

fn required_username(raw: Option<&str>) -> Result<String, AppError> {
    raw.map(str::trim)
        .filter(|u| !u.is_empty())
        .map(str::to_string)
        .ok_or_else(|| AppError::InvalidInput("Instagram username is required".to_string()))
}

fn persistence(context: &str, e: anyhow::Error) -> AppError {
    AppError::Persistence(format!("{}: {}", context, e))
}

/// Placeholder rows for one batch, all sharing `generation_id`.
fn batch_records(
    source: IdentitySource,
    prefix: &str,
    count: usize,
    username: &str,
    source_photos: &[String],
    generation_id: Uuid,
) -> Vec<NewIdentity> {
    let now = Utc::now();
    (0..count)
        .map(|i| NewIdentity {
            name: batch_record_name(prefix, i, now),
            source_photos: source_photos.to_vec(),
            src: source,
            gen_id: Some(generation_id),
            gen_st: Some(GenerationState::Gen),
            instagram_username: Some(username.to_string()),
        })
        .collect()
}

#[derive(Clone)]
pub struct GenerationService {
    identities: Arc<dyn IdentityStore>,
    orchestrator: BatchOrchestrator,
}

impl GenerationService {
    pub fn new(identities: Arc<dyn IdentityStore>, orchestrator: BatchOrchestrator) -> Self {
        Self {
            identities,
            orchestrator,
        }
    }

    /// Generates ten anchor portraits from the username's seedream outputs.
    #[tracing::instrument(skip(self, request), fields(username = ?request.instagram_username))]
    pub async fn generate_anchors(
        &self,
        request: AnchorGenerateRequest,
    ) -> Result<BatchSummary, AppError> {
        let username = required_username(request.instagram_username.as_deref())?;
        if request.reference_image_urls.is_empty() {
            return Err(AppError::InvalidInput(
                "At least one reference image URL is required".to_string(),
            ));
        }

        let in_flight = self
            .identities
            .has_in_flight_batch(&username, ConflictRule::AnyInFlight)
            .await
            .map_err(|e| persistence("Failed to check generation status", e))?;
        if in_flight {
            return Err(AppError::Conflict(ANCHOR_IN_PROGRESS.to_string()));
        }

        let seedream_urls: HashSet<String> = self
            .identities
            .seedream_urls(&username)
            .await
            .map_err(|e| persistence("Failed to fetch seedream images", e))?
            .into_iter()
            .collect();
        if seedream_urls.is_empty() {
            return Err(AppError::NotFound(
                "No seedream images found for this profile".to_string(),
            ));
        }
        if !request
            .reference_image_urls
            .iter()
            .all(|url| seedream_urls.contains(url))
        {
            return Err(AppError::InvalidInput(
                "Some reference images are not seedream images for this profile".to_string(),
            ));
        }

        let generation_id = Uuid::new_v4();
        let records = batch_records(
            IdentitySource::Anc,
            "Anchor",
            ANCHOR_BATCH_SIZE,
            &username,
            &request.reference_image_urls,
            generation_id,
        );

        self.claim_and_run(
            &username,
            ConflictRule::AnyInFlight,
            ANCHOR_IN_PROGRESS,
            records,
            BatchJob {
                records: Vec::new(),
                mutations: anchor_mutations(),
                reference_image_urls: request.reference_image_urls,
                generation_id,
                source: IdentitySource::Anc,
                base_prompt: ANCHOR_BASE_PROMPT.to_string(),
            },
        )
        .await
    }

    /// Generates five variants of the selected primary anchor.
    #[tracing::instrument(skip(self, request), fields(username = ?request.instagram_username))]
    pub async fn generate_variants(
        &self,
        request: VariantGenerateRequest,
    ) -> Result<BatchSummary, AppError> {
        let username = required_username(request.instagram_username.as_deref())?;
        let primary = request
            .primary_image_url
            .as_deref()
            .map(str::trim)
            .filter(|u| !u.is_empty())
            .map(str::to_string)
            .ok_or_else(|| AppError::InvalidInput("Primary image URL is required".to_string()))?;

        let rule = ConflictRule::InFlightSource(IdentitySource::Var);
        let in_flight = self
            .identities
            .has_in_flight_batch(&username, rule)
            .await
            .map_err(|e| persistence("Failed to check generation status", e))?;
        if in_flight {
            return Err(AppError::Conflict(VARIANT_IN_PROGRESS.to_string()));
        }

        let generation_id = Uuid::new_v4();
        let references = vec![primary];
        let records = batch_records(
            IdentitySource::Var,
            "Variant",
            VARIANT_BATCH_SIZE,
            &username,
            &references,
            generation_id,
        );

        self.claim_and_run(
            &username,
            rule,
            VARIANT_IN_PROGRESS,
            records,
            BatchJob {
                records: Vec::new(),
                mutations: variant_mutations(),
                reference_image_urls: references,
                generation_id,
                source: IdentitySource::Var,
                base_prompt: String::new(),
            },
        )
        .await
    }

    /// Inserts the batch under `rule` and runs it to completion.
    async fn claim_and_run(
        &self,
        username: &str,
        rule: ConflictRule,
        conflict_message: &str,
        records: Vec<NewIdentity>,
        mut job: BatchJob,
    ) -> Result<BatchSummary, AppError> {
        let created = match self
            .identities
            .claim_batch(username, rule, records)
            .await
            .map_err(|e| persistence("Failed to create identity records", e))?
        {
            ClaimOutcome::Created(created) => created,
            ClaimOutcome::Conflict => {
                return Err(AppError::Conflict(conflict_message.to_string()))
            }
        };

        tracing::info!(
            gen_id = %job.generation_id,
            src = %job.source,
            count = created.len(),
            "Batch claimed"
        );

        job.records = created;
        let generation_id = job.generation_id;
        let outcome = self.orchestrator.spawn(job).await.map_err(|e| {
            tracing::error!(gen_id = %generation_id, error = %e, "Batch task aborted");
            AppError::Internal(format!("Batch task failed: {}", e))
        })?;

        Ok(BatchSummary {
            success: true,
            generation_id,
            total: outcome.total,
            completed: outcome.completed,
            failed: outcome.failed,
        })
    }
}
