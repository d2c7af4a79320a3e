//! Test helpers: build AppState and router for integration tests.
//!
//! Every store and client is in memory, so no database or network is needed:
//! `cargo test -p likeness-api`.

#![allow(dead_code)]

use axum_test::TestServer;
use base64::Engine;
use chrono::Utc;
use likeness_api::setup::routes;
use likeness_api::setup::services::{build_pipelines, PipelineDeps};
use likeness_api::state::{AppState, MediaState, PipelineState};
use likeness_core::config::{BaseConfig, ServiceConfig};
use likeness_core::models::{
    GenerationState, Identity, IdentitySource, IdentityStatus, NewIdentity,
};
use likeness_core::{Config, StorageBackend};
use likeness_services::test_helpers::{
    png, FakeBroker, FakeClassifier, InMemoryIdentityStore, InMemoryMediaStore, InMemoryStorage,
    RecordingUsageSink, ScriptedEnhancer, ScriptedGenerator, StaticReferences,
};
use likeness_services::{
    BatchOrchestrator, GenerationService, IntakePipeline, ProgressReconciler, SeedreamStage,
};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

pub const USERNAME: &str = "jane";

/// Configuration with every API key set; handlers never reach the real endpoints.
pub fn test_config() -> Config {
    Config(Box::new(ServiceConfig {
        base: BaseConfig {
            server_port: 4000,
            cors_origins: vec!["*".to_string()],
            db_max_connections: 1,
            db_timeout_seconds: 1,
            environment: "test".to_string(),
            request_timeout_secs: 60,
            http_concurrency_limit: 64,
            max_upload_size_bytes: 10 * 1024 * 1024,
        },
        database_url: String::new(),
        storage_backend: StorageBackend::Local,
        s3_bucket: None,
        s3_region: "auto".to_string(),
        s3_endpoint: None,
        s3_access_key_id: None,
        s3_secret_access_key: None,
        storage_public_url: Some("https://media.test".to_string()),
        local_storage_path: None,
        local_storage_base_url: None,
        gemini_api_key: Some("test-gemini-key".to_string()),
        gemini_model_id: "gemini-test".to_string(),
        gemini_classifier_model: "gemini-test-flash".to_string(),
        gemini_base_url: "http://127.0.0.1:9".to_string(),
        wavespeed_api_key: Some("test-wavespeed-key".to_string()),
        wavespeed_base_url: "http://127.0.0.1:9".to_string(),
        ensemble_data_token: Some("test-token".to_string()),
        ensemble_base_url: "http://127.0.0.1:9".to_string(),
        public_base_url: "http://localhost:4000".to_string(),
        progress_poll_interval_ms: 2500,
    }))
}

/// Base64 payload every scripted generation returns.
pub fn generated_image() -> String {
    base64::engine::general_purpose::STANDARD.encode(png(4, 4))
}

/// Test application: server plus handles on every in-memory collaborator.
pub struct TestApp {
    pub server: TestServer,
    pub identities: Arc<InMemoryIdentityStore>,
    pub media: Arc<InMemoryMediaStore>,
    pub storage: Arc<InMemoryStorage>,
    pub usage: Arc<RecordingUsageSink>,
    pub generator: Arc<ScriptedGenerator>,
    pub enhancer: Arc<ScriptedEnhancer>,
    pub references: Arc<StaticReferences>,
    pub progress: Arc<ProgressReconciler>,
}

impl TestApp {
    pub fn client(&self) -> &TestServer {
        &self.server
    }

    /// Inserts a completed seedream identity and returns its URL.
    pub fn seed_seedream(&self, username: &str) -> String {
        let url = format!("https://media.test/sd_{}.jpg", Uuid::new_v4());
        self.identities.insert(identity(
            username,
            IdentitySource::Sd,
            IdentityStatus::Completed,
            Some(&url),
            Some(GenerationState::Done),
        ));
        url
    }
}

/// Identity row with the given shape.
pub fn identity(
    username: &str,
    src: IdentitySource,
    status: IdentityStatus,
    url: Option<&str>,
    gen_st: Option<GenerationState>,
) -> Identity {
    let mut row = InMemoryIdentityStore::identity(NewIdentity {
        name: format!("{} 1 - {}", src, Utc::now().format("%b %-d, %Y")),
        source_photos: vec![],
        src,
        gen_id: gen_st.map(|_| Uuid::new_v4()),
        gen_st,
        instagram_username: Some(username.to_string()),
    });
    row.status = status;
    row.generated_image_url = url.map(str::to_string);
    row
}

/// Builder for a [`TestApp`]; every pipeline is configured unless disabled.
pub struct TestAppBuilder {
    config: Config,
    broker: FakeBroker,
    classifier: FakeClassifier,
    pipelines: bool,
}

impl Default for TestAppBuilder {
    fn default() -> Self {
        Self {
            config: test_config(),
            broker: FakeBroker::new("1234"),
            classifier: FakeClassifier::passing(&[]),
            pipelines: true,
        }
    }
}

impl TestAppBuilder {
    pub fn broker(mut self, broker: FakeBroker) -> Self {
        self.broker = broker;
        self
    }

    pub fn classifier(mut self, classifier: FakeClassifier) -> Self {
        self.classifier = classifier;
        self
    }

    /// Leaves every pipeline unconfigured, as startup does when no API keys are set.
    pub fn without_pipelines(mut self) -> Self {
        self.pipelines = false;
        self
    }

    pub fn without_gemini_key(mut self) -> Self {
        self.config.0.gemini_api_key = None;
        self
    }

    pub fn build(self) -> TestApp {
        let identities = Arc::new(InMemoryIdentityStore::new());
        let media = Arc::new(InMemoryMediaStore::new());
        let storage = Arc::new(InMemoryStorage::new());
        let usage = Arc::new(RecordingUsageSink::default());
        let generator = Arc::new(ScriptedGenerator::succeeding(&generated_image()));
        let enhancer = Arc::new(ScriptedEnhancer::new());
        let references = Arc::new(StaticReferences::new());

        let pipelines = if self.pipelines {
            PipelineState {
                generation: Some(Arc::new(GenerationService::new(
                    identities.clone(),
                    BatchOrchestrator::new(identities.clone(), storage.clone(), generator.clone()),
                ))),
                seedream: Some(Arc::new(SeedreamStage::new(
                    identities.clone(),
                    references.clone(),
                    enhancer.clone(),
                ))),
                intake: Some(Arc::new(IntakePipeline::new(
                    Arc::new(self.broker),
                    Arc::new(self.classifier),
                    media.clone(),
                    usage.clone(),
                ))),
            }
        } else {
            let mut config = self.config.clone();
            config.0.gemini_api_key = None;
            config.0.wavespeed_api_key = None;
            config.0.ensemble_data_token = None;
            build_pipelines(
                &config,
                PipelineDeps {
                    identities: identities.clone(),
                    media_items: media.clone(),
                    usage: usage.clone(),
                    storage: storage.clone(),
                    references: references.clone(),
                },
            )
            .expect("build pipelines")
        };

        let progress = Arc::new(ProgressReconciler::new(
            identities.clone(),
            Duration::from_millis(50),
        ));

        let state = Arc::new(AppState {
            config: self.config.clone(),
            pool: None,
            identities: identities.clone(),
            media: MediaState {
                items: media.clone(),
                storage: storage.clone(),
            },
            pipelines,
            progress: progress.clone(),
            http_client: reqwest::Client::new(),
        });

        let router = routes::setup_routes(&self.config, state).expect("setup routes");
        let server = TestServer::new(router).expect("Failed to create test server");

        TestApp {
            server,
            identities,
            media,
            storage,
            usage,
            generator,
            enhancer,
            references,
            progress,
        }
    }
}

/// Test app with every pipeline wired to in-memory fakes.
pub fn setup_test_app() -> TestApp {
    TestAppBuilder::default().build()
}

/// Parses an NDJSON body into one JSON value per line.
pub fn ndjson_lines(body: &str) -> Vec<serde_json::Value> {
    body.lines()
        .filter(|l| !l.trim().is_empty())
        .map(|l| serde_json::from_str(l).expect("valid NDJSON line"))
        .collect()
}
