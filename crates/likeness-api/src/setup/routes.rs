//! Route configuration and setup.

use crate::api_doc::ApiDoc;
use crate::handlers::{generation, health, identities, intake, media, progress, proxy, seedream};
use crate::state::AppState;
use axum::{
    extract::DefaultBodyLimit,
    http::{HeaderValue, Method},
    routing::{delete, get, post, put},
    Json, Router,
};
use likeness_core::Config;
use likeness_infra::request_id_middleware;
use std::sync::Arc;
use std::time::Duration;
use tower::limit::ConcurrencyLimitLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;

/// Routes under `/api` plus health checks, with state applied.
pub fn api_routes(state: Arc<AppState>) -> Router {
    Router::new()
        // Generation
        .route("/api/seedream", post(seedream::create_seedream))
        .route("/api/anchor/generate", post(generation::generate_anchors))
        .route("/api/anchor/variants", post(generation::generate_variants))
        // Intake
        .route("/api/instagram/analyze", post(intake::analyze_profile))
        .route("/api/instagram/reels", post(intake::collect_reels))
        // Media library
        .route(
            "/api/media",
            get(media::list_media).delete(media::delete_all_media),
        )
        .route("/api/media/upload", post(media::upload_media))
        .route("/api/media/reels", post(media::save_reel))
        .route("/api/media/frames", post(media::save_frames))
        .route("/api/media/proxy", get(proxy::media_proxy))
        .route("/api/media/{id}", delete(media::delete_media))
        .route("/api/video/proxy", get(proxy::video_proxy))
        // Identities
        .route("/api/identities", get(identities::list_identities))
        .route("/api/identities/primary", get(identities::get_primary))
        .route("/api/identities/{id}", delete(identities::delete_identity))
        .route("/api/identities/{id}/primary", put(identities::set_primary))
        // Progress
        .route("/api/progress", get(progress::get_progress))
        .route("/api/progress/stream", get(progress::stream_progress))
        // Health
        .route("/health", get(health::health_check))
        .route("/health/live", get(health::liveness_check))
        .with_state(state)
}

/// Setup all application routes
pub fn setup_routes(config: &Config, state: Arc<AppState>) -> Result<Router, anyhow::Error> {
    let cors = setup_cors(config)?;

    let http_concurrency_limit = config.http_concurrency_limit().max(1);
    let request_timeout_secs = config.request_timeout_secs().max(1);
    let max_upload_size = config.max_upload_size_bytes();
    tracing::info!(
        http_concurrency_limit,
        request_timeout_secs,
        max_upload_size,
        "HTTP layers configured"
    );

    let app = api_routes(state)
        .route(
            "/api/openapi.json",
            get(|| async { Json(ApiDoc::openapi()) }),
        )
        .merge(utoipa_rapidoc::RapiDoc::new("/api/openapi.json").path("/docs"))
        .layer(ConcurrencyLimitLayer::new(http_concurrency_limit))
        .layer(RequestBodyLimitLayer::new(max_upload_size))
        .layer(DefaultBodyLimit::disable())
        .layer(TimeoutLayer::new(Duration::from_secs(request_timeout_secs)))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .layer(axum::middleware::from_fn(request_id_middleware));

    Ok(app)
}

fn setup_cors(config: &Config) -> Result<CorsLayer, anyhow::Error> {
    let methods = [
        Method::GET,
        Method::POST,
        Method::PUT,
        Method::DELETE,
        Method::OPTIONS,
    ];
    let cors = if config.cors_origins().iter().any(|o| o == "*") {
        tracing::warn!("CORS configured to allow all origins - not recommended for production");
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(methods)
            .allow_headers(Any)
    } else {
        let origins = config
            .cors_origins()
            .iter()
            .map(|o| o.parse::<HeaderValue>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| anyhow::anyhow!("Invalid CORS origin: {}", e))?;
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(methods)
            .allow_headers(Any)
    };
    Ok(cors)
}
