//! Client, repository and pipeline construction.
//!
//! Every outbound client is built here once and handed to the pipelines that use it.

use anyhow::{Context, Result};
use likeness_core::Config;
use likeness_db::{
    spawn_identity_listener, IdentityRepository, IdentityStore, MediaItemRepository,
    MediaItemStore, UsageLogRepository, UsageSink,
};
use likeness_plugins::{
    EnsembleDataClient, GeminiFaceClassifier, GeminiImageClient, ReferenceResolver,
    ReferenceSource, WaveSpeedClient,
};
use likeness_services::{
    BatchOrchestrator, GenerationService, IntakePipeline, ProgressReconciler, SeedreamStage,
};
use likeness_storage::{create_storage, Storage};
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;

use crate::state::{AppState, MediaState, PipelineState};

const PROXY_TIMEOUT_SECS: u64 = 120;

/// Stores and clients the pipelines are assembled from.
pub struct PipelineDeps {
    pub identities: Arc<dyn IdentityStore>,
    pub media_items: Arc<dyn MediaItemStore>,
    pub usage: Arc<dyn UsageSink>,
    pub storage: Arc<dyn Storage>,
    pub references: Arc<dyn ReferenceSource>,
}

/// Builds each pipeline whose credentials are present; the rest stay `None`.
pub fn build_pipelines(config: &Config, deps: PipelineDeps) -> Result<PipelineState> {
    let mut pipelines = PipelineState::default();

    match config.gemini_api_key() {
        Some(key) => {
            let generator = GeminiImageClient::new(
                key,
                config.gemini_model_id(),
                config.gemini_base_url(),
                deps.references.clone(),
            )?;
            let orchestrator = BatchOrchestrator::new(
                deps.identities.clone(),
                deps.storage.clone(),
                Arc::new(generator),
            );
            pipelines.generation = Some(Arc::new(GenerationService::new(
                deps.identities.clone(),
                orchestrator,
            )));
            tracing::info!(model = %config.gemini_model_id(), "Image generation enabled");
        }
        None => tracing::warn!("GEMINI_API_KEY not set - anchor and variant generation disabled"),
    }

    match config.wavespeed_api_key() {
        Some(key) => {
            let enhancer = WaveSpeedClient::new(key, config.wavespeed_base_url())?;
            pipelines.seedream = Some(Arc::new(SeedreamStage::new(
                deps.identities.clone(),
                deps.references.clone(),
                Arc::new(enhancer),
            )));
            tracing::info!("Seedream enhancement enabled");
        }
        None => tracing::warn!("WAVESPEED_API_KEY not set - seedream disabled"),
    }

    match config.ensemble_data_token() {
        Some(token) => {
            let broker = EnsembleDataClient::new(token, config.ensemble_base_url())?;
            // The photo route checks GEMINI_API_KEY itself, so reels work without it.
            let classifier = GeminiFaceClassifier::new(
                config.gemini_api_key().unwrap_or_default(),
                config.gemini_classifier_model(),
                config.gemini_base_url(),
            )?;
            pipelines.intake = Some(Arc::new(IntakePipeline::new(
                Arc::new(broker),
                Arc::new(classifier),
                deps.media_items.clone(),
                deps.usage.clone(),
            )));
            tracing::info!("Profile intake enabled");
        }
        None => tracing::warn!("ENSEMBLE_DATA_TOKEN not set - profile intake disabled"),
    }

    Ok(pipelines)
}

/// Initialize all services and repositories
pub async fn initialize_services(config: &Config, pool: PgPool) -> Result<Arc<AppState>> {
    tracing::info!("Initializing storage...");
    let storage = create_storage(config)
        .await
        .context("Failed to initialize storage")?;
    tracing::info!(
        backend = ?storage.backend_type(),
        public_url = %storage.public_base_url(),
        "Storage initialized"
    );

    let identities: Arc<dyn IdentityStore> = Arc::new(IdentityRepository::new(pool.clone()));
    let media_items: Arc<dyn MediaItemStore> = Arc::new(MediaItemRepository::new(pool.clone()));
    let usage: Arc<dyn UsageSink> = Arc::new(UsageLogRepository::new(pool.clone()));
    let references: Arc<dyn ReferenceSource> = Arc::new(ReferenceResolver::new(
        config.public_base_url(),
        Some(storage.public_base_url()),
    )?);

    let pipelines = build_pipelines(
        config,
        PipelineDeps {
            identities: identities.clone(),
            media_items: media_items.clone(),
            usage,
            storage: storage.clone(),
            references,
        },
    )?;

    let progress = Arc::new(ProgressReconciler::new(
        identities.clone(),
        Duration::from_millis(config.progress_poll_interval_ms()),
    ));
    progress.clone().spawn(spawn_identity_listener(pool.clone()));

    let http_client = reqwest::Client::builder()
        .timeout(Duration::from_secs(PROXY_TIMEOUT_SECS))
        .build()
        .context("Failed to create HTTP client for proxies")?;

    tracing::info!("All services initialized");

    Ok(Arc::new(AppState {
        config: config.clone(),
        pool: Some(pool),
        identities,
        media: MediaState {
            items: media_items,
            storage,
        },
        pipelines,
        progress,
        http_client,
    }))
}
