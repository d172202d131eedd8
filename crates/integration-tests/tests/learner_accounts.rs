//! Learner registration, verification and login over HTTP.

#![allow(clippy::unwrap_used)]

use reqwest::StatusCode;
use serde_json::{Value, json};

use studyforge_integration_tests::{PASSWORD, TestApp};

fn registration(username: &str) -> Value {
    json!({
        "username": username,
        "email": format!("{username}@example.com"),
        "password": PASSWORD,
        "password_confirm": PASSWORD,
        "first_name": "Ann",
        "last_name": "Lee",
    })
}

#[tokio::test]
async fn test_register_verify_login() {
    let app = TestApp::spawn().await;
    let client = app.client();

    let (status, body) = app
        .post_json(&client, "/api/auth/register", &registration("ann"))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["requires_verification"], true);
    assert_eq!(body["verification_email_sent"], true);

    // Strict mode: unverified learners are refused.
    let (status, body) = app.login(&client, "ann", PASSWORD).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["unverified"], true);
    assert_eq!(body["ticket_expired"], false);

    let token = app.last_verification_token();
    let (status, body) = app
        .get_json(&client, &format!("/api/auth/verify/{token}"))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["already_verified"], false);

    let (status, body) = app
        .get_json(&client, &format!("/api/auth/verify/{token}"))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["already_verified"], true);

    let (status, body) = app.login(&client, "ann@example.com", PASSWORD).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user_type"], "learner");
    assert_eq!(body["learner"]["username"], "ann");
}

#[tokio::test]
async fn test_register_rejects_duplicates_and_weak_passwords() {
    let app = TestApp::spawn().await;
    let client = app.client();

    let (status, _) = app
        .post_json(&client, "/api/auth/register", &registration("ann"))
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, _) = app
        .post_json(&client, "/api/auth/register", &registration("ann"))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let mut weak = registration("bob");
    weak["password"] = json!("short");
    weak["password_confirm"] = json!("short");
    let (status, body) = app.post_json(&client, "/api/auth/register", &weak).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn test_registration_survives_mail_failure() {
    let app = TestApp::spawn().await;
    app.outbox.set_failing(true);
    let client = app.client();

    let (status, body) = app
        .post_json(&client, "/api/auth/register", &registration("ann"))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["verification_email_sent"], false);

    let (status, _) = app
        .post_json(
            &client,
            "/api/auth/verify/resend",
            &json!({ "email": "ann@example.com" }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);

    app.outbox.set_failing(false);
    let (status, _) = app
        .post_json(
            &client,
            "/api/auth/verify/resend",
            &json!({ "email": "ann@example.com" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(app.outbox.sent().len(), 1);
}

#[tokio::test]
async fn test_resend_does_not_reveal_accounts() {
    let app = TestApp::spawn().await;
    let client = app.client();

    let (status, body) = app
        .post_json(
            &client,
            "/api/auth/verify/resend",
            &json!({ "email": "nobody@example.com" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert!(app.outbox.sent().is_empty());
}

#[tokio::test]
async fn test_unknown_verification_token() {
    let app = TestApp::spawn().await;
    let client = app.client();

    let (status, _) = app
        .get_json(
            &client,
            "/api/auth/verify/6f1c2b1e-2c9a-4c2e-9a57-0f3f0f7b9d11",
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = app.get_json(&client, "/api/auth/verify/not-a-uuid").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_unknown_user_gets_generic_message() {
    let app = TestApp::spawn().await;
    let client = app.client();

    let (status, body) = app.login(&client, "ghost", PASSWORD).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(!body["error"].as_str().unwrap().contains("remaining"));
}

#[tokio::test]
async fn test_learner_cannot_reach_admin_endpoints() {
    let app = TestApp::spawn().await;
    app.seed_learner("ann").await;
    let client = app.client();

    let (status, _) = app.login(&client, "ann", PASSWORD).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = app.get_json(&client, "/api/admin/me").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}
