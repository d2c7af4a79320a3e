//! Health check handlers.

use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;
use utoipa::ToSchema;

use crate::state::AppState;

const CHECK_TIMEOUT: Duration = Duration::from_secs(5);

/// Run an async check with timeout; returns "healthy", "timeout", or "{prefix}: {error}".
async fn run_check<F, E>(timeout: Duration, f: F, error_prefix: &str) -> String
where
    F: Future<Output = Result<(), E>>,
    E: Display,
{
    match tokio::time::timeout(timeout, f).await {
        Ok(Ok(())) => "healthy".to_string(),
        Ok(Err(e)) => format!("{}: {}", error_prefix, e),
        Err(_) => "timeout".to_string(),
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct HealthCheckResponse {
    pub status: String,
    pub database: String,
    pub storage: String,
    /// Pipelines whose API keys are configured
    pub pipelines: Vec<String>,
}

/// Liveness check: the process is running.
#[utoipa::path(
    get,
    path = "/health/live",
    tag = "health",
    responses((status = 200, description = "Process is running"))
)]
pub async fn liveness_check() -> impl IntoResponse {
    (StatusCode::OK, Json(serde_json::json!({ "status": "alive" })))
}

/// Database and storage health
#[utoipa::path(
    get,
    path = "/health",
    tag = "health",
    responses(
        (status = 200, description = "All dependencies healthy", body = HealthCheckResponse),
        (status = 503, description = "A dependency is unhealthy", body = HealthCheckResponse)
    )
)]
pub async fn health_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let database = match &state.pool {
        Some(pool) => {
            run_check(
                CHECK_TIMEOUT,
                async { sqlx::query("SELECT 1").execute(pool).await.map(|_| ()) },
                "unhealthy",
            )
            .await
        }
        None => "in-memory".to_string(),
    };

    let storage = run_check(
        CHECK_TIMEOUT,
        async { state.media.storage.exists(".health").await.map(|_| ()) },
        "unhealthy",
    )
    .await;

    let pipelines = [
        ("generation", state.pipelines.generation.is_some()),
        ("seedream", state.pipelines.seedream.is_some()),
        ("intake", state.pipelines.intake.is_some()),
    ]
    .into_iter()
    .filter(|(_, configured)| *configured)
    .map(|(name, _)| name.to_string())
    .collect();

    let healthy = !database.starts_with("unhealthy")
        && database != "timeout"
        && storage == "healthy";
    if !healthy {
        tracing::error!(database = %database, storage = %storage, "Health check failed");
    }

    let status = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (
        status,
        Json(HealthCheckResponse {
            status: if healthy { "healthy" } else { "unhealthy" }.to_string(),
            database,
            storage,
            pipelines,
        }),
    )
}
