//! Generation endpoint tests: anchors, variants and seedream.

mod helpers;

use axum::http::StatusCode;
use base64::Engine;
use helpers::{identity, setup_test_app, TestAppBuilder, USERNAME};
use likeness_core::models::{GenerationState, IdentitySource, IdentityStatus};
use likeness_services::test_helpers::png;
use serde_json::{json, Value};

#[tokio::test]
async fn anchor_generation_creates_ten_completed_records() {
    let app = setup_test_app();
    let seed_url = app.seed_seedream(USERNAME);

    let response = app
        .client()
        .post("/api/anchor/generate")
        .json(&json!({
            "instagram_username": USERNAME,
            "referenceImageUrls": [seed_url],
        }))
        .await;

    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["success"], true);
    assert_eq!(body["total"], 10);
    assert_eq!(body["completed"], 10);
    assert_eq!(body["failed"], 0);

    let anchors: Vec<_> = app
        .identities
        .rows()
        .into_iter()
        .filter(|r| r.src == IdentitySource::Anc)
        .collect();
    assert_eq!(anchors.len(), 10);
    assert!(anchors.iter().all(|r| r.gen_st == Some(GenerationState::Done)
        && r.status == IdentityStatus::Completed
        && r.generated_image_url.is_some()));
    // Each completed anchor is written to object storage.
    assert_eq!(app.storage.keys().len(), 10);
}

#[tokio::test]
async fn anchor_generation_conflicts_with_in_flight_batch() {
    let app = setup_test_app();
    let seed_url = app.seed_seedream(USERNAME);
    app.identities.insert(identity(
        USERNAME,
        IdentitySource::Var,
        IdentityStatus::Processing,
        None,
        Some(GenerationState::Gen),
    ));
    let before = app.identities.rows().len();

    let response = app
        .client()
        .post("/api/anchor/generate")
        .json(&json!({
            "instagram_username": USERNAME,
            "referenceImageUrls": [seed_url],
        }))
        .await;

    response.assert_status(StatusCode::CONFLICT);
    let body: Value = response.json();
    assert_eq!(body["code"], "CONFLICT");
    assert_eq!(app.identities.rows().len(), before);
    assert!(app.generator.calls().is_empty());
}

#[tokio::test]
async fn anchor_generation_requires_seedream_images() {
    let app = setup_test_app();

    let response = app
        .client()
        .post("/api/anchor/generate")
        .json(&json!({
            "instagram_username": USERNAME,
            "referenceImageUrls": ["https://media.test/sd.jpg"],
        }))
        .await;

    response.assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn anchor_generation_requires_username() {
    let app = setup_test_app();

    let response = app
        .client()
        .post("/api/anchor/generate")
        .json(&json!({ "referenceImageUrls": ["https://media.test/sd.jpg"] }))
        .await;

    response.assert_status_bad_request();
    let body: Value = response.json();
    assert_eq!(body["error"], "Instagram username is required");
}

#[tokio::test]
async fn anchor_generation_rejects_malformed_body() {
    let app = setup_test_app();

    let response = app
        .client()
        .post("/api/anchor/generate")
        .content_type("application/json")
        .text("{not json")
        .await;

    response.assert_status_bad_request();
}

#[tokio::test]
async fn variant_generation_creates_five_records() {
    let app = setup_test_app();

    let response = app
        .client()
        .post("/api/anchor/variants")
        .json(&json!({
            "instagram_username": USERNAME,
            "primaryImageUrl": "https://media.test/anc.jpg",
        }))
        .await;

    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["total"], 5);
    assert_eq!(body["completed"], 5);

    let variants: Vec<_> = app
        .identities
        .rows()
        .into_iter()
        .filter(|r| r.src == IdentitySource::Var)
        .collect();
    assert_eq!(variants.len(), 5);
    assert!(variants
        .iter()
        .all(|r| r.source_photos == vec!["https://media.test/anc.jpg".to_string()]));
}

#[tokio::test]
async fn generation_without_gemini_key_is_not_configured() {
    let app = TestAppBuilder::default().without_pipelines().build();

    let response = app
        .client()
        .post("/api/anchor/generate")
        .json(&json!({ "instagram_username": USERNAME }))
        .await;

    response.assert_status(StatusCode::INTERNAL_SERVER_ERROR);
    let body: Value = response.json();
    assert_eq!(body["error"], "GEMINI_API_KEY not configured");
    assert_eq!(body["code"], "NOT_CONFIGURED");
}

#[tokio::test]
async fn seedream_rejects_empty_photo_list() {
    let app = setup_test_app();

    let response = app
        .client()
        .post("/api/seedream")
        .json(&json!({ "photos": [], "instagram_username": USERNAME }))
        .await;

    response.assert_status_bad_request();
    let body: Value = response.json();
    assert_eq!(body["error"], "No photos provided");
}

#[tokio::test]
async fn seedream_enhances_each_photo() {
    let app = setup_test_app();
    let bytes = png(9, 16);
    let encoded = base64::engine::general_purpose::STANDARD.encode(&bytes);
    app.references.insert("https://cdn.test/1.jpg", bytes);
    app.enhancer
        .script(&encoded, vec![Ok("https://out.test/1.jpg".to_string())]);

    let response = app
        .client()
        .post("/api/seedream")
        .json(&json!({
            "photos": ["https://cdn.test/1.jpg"],
            "instagram_username": USERNAME,
        }))
        .await;

    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["success"], true);
    assert_eq!(body["completed"], 1);
    assert_eq!(body["identities"][0]["generated_image_url"], "https://out.test/1.jpg");

    let rows = app.identities.rows();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].src, IdentitySource::Sd);
    assert_eq!(rows[0].gen_st, Some(GenerationState::Done));
}

#[tokio::test]
async fn seedream_conflicts_with_existing_identity() {
    let app = setup_test_app();
    app.seed_seedream(USERNAME);

    let response = app
        .client()
        .post("/api/seedream")
        .json(&json!({
            "photos": ["https://cdn.test/1.jpg"],
            "instagram_username": USERNAME,
        }))
        .await;

    response.assert_status(StatusCode::CONFLICT);
    assert_eq!(app.identities.rows().len(), 1);
}

#[tokio::test]
async fn seedream_without_wavespeed_key_is_not_configured() {
    let app = TestAppBuilder::default().without_pipelines().build();

    let response = app
        .client()
        .post("/api/seedream")
        .json(&json!({ "photos": ["https://cdn.test/1.jpg"] }))
        .await;

    response.assert_status(StatusCode::INTERNAL_SERVER_ERROR);
    let body: Value = response.json();
    assert_eq!(body["error"], "WAVESPEED_API_KEY not configured");
}
