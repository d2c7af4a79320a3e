//! Identity listing, deletion and primary-selection tests.

mod helpers;

use axum::http::StatusCode;
use helpers::{identity, setup_test_app, USERNAME};
use likeness_core::models::{GenerationState, IdentitySource, IdentityStatus};
use serde_json::{json, Value};

fn anchor(username: &str, url: &str) -> likeness_core::models::Identity {
    identity(
        username,
        IdentitySource::Anc,
        IdentityStatus::Completed,
        Some(url),
        Some(GenerationState::Done),
    )
}

#[tokio::test]
async fn list_returns_newest_first_and_filters_by_username() {
    let app = setup_test_app();
    let first = anchor(USERNAME, "https://media.test/a1.jpg");
    let second = anchor(USERNAME, "https://media.test/a2.jpg");
    let other = anchor("someone_else", "https://media.test/b1.jpg");
    app.identities.insert(first.clone());
    app.identities.insert(second.clone());
    app.identities.insert(other);

    let all: Value = app.client().get("/api/identities").await.json();
    assert_eq!(all.as_array().unwrap().len(), 3);

    let response = app
        .client()
        .get("/api/identities")
        .add_query_param("instagram_username", USERNAME)
        .await;
    response.assert_status_ok();
    let body: Value = response.json();
    let ids: Vec<String> = body
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["id"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(ids, vec![second.id.to_string(), first.id.to_string()]);
}

#[tokio::test]
async fn delete_identity_outcomes() {
    let app = setup_test_app();
    let completed = anchor(USERNAME, "https://media.test/a1.jpg");
    let failed = identity(
        USERNAME,
        IdentitySource::Anc,
        IdentityStatus::Failed,
        None,
        Some(GenerationState::Done),
    );
    app.identities.insert(completed.clone());
    app.identities.insert(failed.clone());

    app.client()
        .delete(&format!("/api/identities/{}", completed.id))
        .await
        .assert_status(StatusCode::NO_CONTENT);

    let missing = app
        .client()
        .delete(&format!("/api/identities/{}", completed.id))
        .await;
    missing.assert_status_not_found();
    let body: Value = missing.json();
    assert_eq!(body["error"], "Identity not found");

    app.client()
        .delete(&format!("/api/identities/{}", failed.id))
        .await
        .assert_status(StatusCode::CONFLICT);

    let remaining = app.identities.rows();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].id, failed.id);
}

#[tokio::test]
async fn set_primary_moves_the_flag_within_the_profile() {
    let app = setup_test_app();
    let a = anchor(USERNAME, "https://media.test/a1.jpg");
    let b = anchor(USERNAME, "https://media.test/a2.jpg");
    app.identities.insert(a.clone());
    app.identities.insert(b.clone());

    let response = app
        .client()
        .put(&format!("/api/identities/{}/primary", a.id))
        .json(&json!({ "instagram_username": USERNAME }))
        .await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["id"], a.id.to_string());
    assert_eq!(body["is_primary"], true);

    app.client()
        .put(&format!("/api/identities/{}/primary", b.id))
        .json(&json!({ "instagram_username": USERNAME }))
        .await
        .assert_status_ok();

    let primaries: Vec<_> = app
        .identities
        .rows()
        .into_iter()
        .filter(|r| r.is_primary)
        .collect();
    assert_eq!(primaries.len(), 1);
    assert_eq!(primaries[0].id, b.id);

    let current: Value = app
        .client()
        .get("/api/identities/primary")
        .add_query_param("instagram_username", USERNAME)
        .await
        .json();
    assert_eq!(current["primary"]["id"], b.id.to_string());
}

#[tokio::test]
async fn set_primary_rejects_uncategorized_group() {
    let app = setup_test_app();
    let a = anchor(USERNAME, "https://media.test/a1.jpg");
    app.identities.insert(a.clone());

    let response = app
        .client()
        .put(&format!("/api/identities/{}/primary", a.id))
        .json(&json!({ "instagram_username": "uncategorized" }))
        .await;

    response.assert_status_bad_request();
    assert!(app.identities.rows().iter().all(|r| !r.is_primary));
}

#[tokio::test]
async fn set_primary_for_another_profile_is_not_found() {
    let app = setup_test_app();
    let a = anchor(USERNAME, "https://media.test/a1.jpg");
    app.identities.insert(a.clone());

    let response = app
        .client()
        .put(&format!("/api/identities/{}/primary", a.id))
        .json(&json!({ "instagram_username": "someone_else" }))
        .await;

    response.assert_status_not_found();
    let body: Value = response.json();
    assert_eq!(body["error"], "Identity not found for this profile");
}

#[tokio::test]
async fn set_primary_requires_username() {
    let app = setup_test_app();
    let a = anchor(USERNAME, "https://media.test/a1.jpg");
    app.identities.insert(a.clone());

    let response = app
        .client()
        .put(&format!("/api/identities/{}/primary", a.id))
        .json(&json!({ "instagram_username": "  " }))
        .await;

    response.assert_status_bad_request();
    let body: Value = response.json();
    assert_eq!(body["error"], "Instagram username is required");
}

#[tokio::test]
async fn get_primary_without_selection_is_null() {
    let app = setup_test_app();
    app.identities
        .insert(anchor(USERNAME, "https://media.test/a1.jpg"));

    let response = app
        .client()
        .get("/api/identities/primary")
        .add_query_param("instagram_username", USERNAME)
        .await;

    response.assert_status_ok();
    let body: Value = response.json();
    assert!(body["primary"].is_null());

    app.client()
        .get("/api/identities/primary")
        .await
        .assert_status_bad_request();
}
