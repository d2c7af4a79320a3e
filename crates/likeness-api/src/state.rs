//! Application state shared by every handler.
//!
//! Clients are constructed once in `setup::services` and injected here. Pipelines whose
//! credentials are missing stay `None`, and their routes answer 500 "<KEY> not configured"
//! instead of blocking startup.

use likeness_core::{AppError, Config};
use likeness_db::{IdentityStore, MediaItemStore};
use likeness_services::{GenerationService, IntakePipeline, ProgressReconciler, SeedreamStage};
use likeness_storage::Storage;
use sqlx::PgPool;
use std::sync::Arc;

/// Media library store and the object store behind it.
#[derive(Clone)]
pub struct MediaState {
    pub items: Arc<dyn MediaItemStore>,
    pub storage: Arc<dyn Storage>,
}

/// Long-running pipelines, present only when their API keys are configured.
#[derive(Clone, Default)]
pub struct PipelineState {
    pub generation: Option<Arc<GenerationService>>,
    pub seedream: Option<Arc<SeedreamStage>>,
    pub intake: Option<Arc<IntakePipeline>>,
}

pub struct AppState {
    pub config: Config,
    /// `None` when running against in-memory stores.
    pub pool: Option<PgPool>,
    pub identities: Arc<dyn IdentityStore>,
    pub media: MediaState,
    pub pipelines: PipelineState,
    pub progress: Arc<ProgressReconciler>,
    /// Outbound client for the media and video proxies.
    pub http_client: reqwest::Client,
}

impl AppState {
    pub fn generation(&self) -> Result<&Arc<GenerationService>, AppError> {
        self.pipelines
            .generation
            .as_ref()
            .ok_or(AppError::NotConfigured("GEMINI_API_KEY"))
    }

    pub fn seedream(&self) -> Result<&Arc<SeedreamStage>, AppError> {
        self.pipelines
            .seedream
            .as_ref()
            .ok_or(AppError::NotConfigured("WAVESPEED_API_KEY"))
    }

    pub fn intake(&self) -> Result<&Arc<IntakePipeline>, AppError> {
        self.pipelines
            .intake
            .as_ref()
            .ok_or(AppError::NotConfigured("ENSEMBLE_DATA_TOKEN"))
    }
}
