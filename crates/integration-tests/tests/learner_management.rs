//! Admin management of learners: listing, toggling, confirmed deletion.

#![allow(clippy::unwrap_used)]

use reqwest::StatusCode;
use serde_json::json;

use studyforge_core::AdminPermissions;
use studyforge_integration_tests::{PASSWORD, TestApp};

#[tokio::test]
async fn test_delete_requires_matching_confirmation() {
    let app = TestApp::spawn().await;
    app.seed_admin("root", AdminPermissions::super_admin()).await;
    let bob = app.seed_learner("bob").await;
    let client = app.client();
    app.login(&client, "root", PASSWORD).await;

    let (status, body) = app
        .post_json(
            &client,
            "/api/admin/learners/delete",
            &json!({ "learner_id": bob.id, "confirm_username": "bobby" }),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["success"], false);
    assert!(app.learner_exists(bob.id).await);

    let (status, body) = app
        .post_json(
            &client,
            "/api/admin/learners/delete",
            &json!({ "learner_id": bob.id, "confirm_username": "bob" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["deleted_data"]["curricula"], 0);
    assert!(!app.learner_exists(bob.id).await);

    let (status, _) = app
        .post_json(
            &client,
            "/api/admin/learners/delete",
            &json!({ "learner_id": bob.id, "confirm_username": "bob" }),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_delete_requires_delete_users() {
    let app = TestApp::spawn().await;
    app.seed_admin("jane", AdminPermissions::default()).await;
    let bob = app.seed_learner("bob").await;
    let client = app.client();
    app.login(&client, "jane", PASSWORD).await;

    let (status, _) = app
        .post_json(
            &client,
            "/api/admin/learners/delete",
            &json!({ "learner_id": bob.id, "confirm_username": "bob" }),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert!(app.learner_exists(bob.id).await);
}

#[tokio::test]
async fn test_list_and_toggle_learners() {
    let app = TestApp::spawn().await;
    app.seed_admin("jane", AdminPermissions::default()).await;
    let ann = app.seed_learner("ann").await;
    let admin = app.client();
    app.login(&admin, "jane", PASSWORD).await;

    let (status, body) = app.get_json(&admin, "/api/admin/learners").await;
    assert_eq!(status, StatusCode::OK);
    let rows = body.as_array().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["username"], "ann");
    assert_eq!(rows[0]["is_active"], true);
    assert_eq!(rows[0]["verified"], true);

    let (status, body) = app
        .post_json(
            &admin,
            "/api/admin/learners/toggle",
            &json!({ "learner_id": ann.id }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["is_active"], false);

    let learner = app.client();
    let (status, _) = app.login(&learner, "ann", PASSWORD).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_deactivation_ends_existing_learner_session() {
    let app = TestApp::spawn().await;
    app.seed_admin("jane", AdminPermissions::default()).await;
    let ann = app.seed_learner("ann").await;

    let learner = app.client();
    app.login(&learner, "ann", PASSWORD).await;
    let (status, _) = app.get_json(&learner, "/api/curricula").await;
    assert_eq!(status, StatusCode::OK);

    let admin = app.client();
    app.login(&admin, "jane", PASSWORD).await;
    app.post_json(
        &admin,
        "/api/admin/learners/toggle",
        &json!({ "learner_id": ann.id }),
    )
    .await;

    let (status, _) = app.get_json(&learner, "/api/curricula").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}
