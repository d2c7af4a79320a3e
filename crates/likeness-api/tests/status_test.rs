//! Progress snapshot, health and API documentation tests.

mod helpers;

use helpers::{identity, setup_test_app, TestAppBuilder, USERNAME};
use likeness_core::models::{GenerationState, IdentitySource, IdentityStatus};
use serde_json::Value;
use uuid::Uuid;

#[tokio::test]
async fn progress_reports_in_flight_batch() {
    let app = setup_test_app();
    let first = identity(
        USERNAME,
        IdentitySource::Anc,
        IdentityStatus::Completed,
        Some("https://media.test/a1.jpg"),
        Some(GenerationState::Gen),
    );
    let mut second = first.clone();
    second.id = Uuid::new_v4();
    second.status = IdentityStatus::Processing;
    second.generated_image_url = None;
    app.identities.insert(first.clone());
    app.identities.insert(second);

    app.progress.refresh().await.unwrap();
    let response = app.client().get("/api/progress").await;

    response.assert_status_ok();
    let body: Value = response.json();
    let groups = body.as_array().unwrap();
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0]["username"], USERNAME);
    assert_eq!(groups[0]["state"], "generating");
    assert_eq!(groups[0]["src"], "anc");
    assert_eq!(groups[0]["generation_id"], first.gen_id.unwrap().to_string());
    assert_eq!(groups[0]["expected"], 10);
    assert_eq!(groups[0]["total"], 2);
    assert_eq!(groups[0]["completed"], 1);
}

#[tokio::test]
async fn progress_is_empty_before_first_refresh() {
    let app = setup_test_app();
    app.identities.insert(identity(
        USERNAME,
        IdentitySource::Sd,
        IdentityStatus::Completed,
        Some("https://media.test/sd.jpg"),
        Some(GenerationState::Done),
    ));

    let body: Value = app.client().get("/api/progress").await.json();

    assert!(body.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn health_reports_configured_pipelines() {
    let app = setup_test_app();

    let response = app.client().get("/health").await;

    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["database"], "in-memory");
    assert_eq!(body["storage"], "healthy");
    assert_eq!(
        body["pipelines"],
        serde_json::json!(["generation", "seedream", "intake"])
    );

    let bare = TestAppBuilder::default().without_pipelines().build();
    let body: Value = bare.client().get("/health").await.json();
    assert_eq!(body["pipelines"], serde_json::json!([]));
}

#[tokio::test]
async fn liveness_is_always_ok() {
    let app = setup_test_app();

    let response = app.client().get("/health/live").await;

    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["status"], "alive");
}

#[tokio::test]
async fn responses_carry_request_id() {
    let app = setup_test_app();

    let response = app
        .client()
        .get("/health/live")
        .add_header("x-request-id", "req-123")
        .await;

    assert_eq!(response.header("x-request-id"), "req-123");
}

#[tokio::test]
async fn openapi_document_is_served() {
    let app = setup_test_app();

    let response = app.client().get("/api/openapi.json").await;

    response.assert_status_ok();
    let body: Value = response.json();
    assert!(body["paths"]["/api/media/frames"].is_object());
    assert!(body["paths"]["/api/progress/stream"].is_object());
}
