//! Tests for the account routes and the auth middleware.

use axum::http::StatusCode;
use serde_json::json;

use super::test_helpers::test_app;
use crate::storage::Role;

fn alice() -> serde_json::Value {
    json!({"email": "Alice@Example.com", "password": "password123", "name": "Alice"})
}

#[tokio::test]
async fn register_and_login() {
    let app = test_app().await;

    let (status, body) = app.post("/api/auth/register", None, alice()).await;
    assert_eq!(status, StatusCode::CREATED);
    assert!(body["accessToken"].as_str().is_some_and(|t| !t.is_empty()));
    assert_eq!(body["expiresInSecs"], 3600);
    assert_eq!(body["user"]["email"], "alice@example.com");
    assert_eq!(body["user"]["tier"], "FREE");
    assert_eq!(body["user"]["remainingCredits"], 1);
    assert!(body["user"].get("passwordHash").is_none());

    let (status, login) = app
        .post(
            "/api/auth/login",
            None,
            json!({"email": "alice@example.com", "password": "password123"}),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(login["user"]["id"], body["user"]["id"]);
}

#[tokio::test]
async fn duplicate_email_conflicts() {
    let app = test_app().await;
    app.post("/api/auth/register", None, alice()).await;

    let (status, _) = app.post("/api/auth/register", None, alice()).await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn register_validates_input() {
    let app = test_app().await;

    let (status, _) = app
        .post(
            "/api/auth/register",
            None,
            json!({"email": "not-an-email", "password": "password123"}),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = app
        .post(
            "/api/auth/register",
            None,
            json!({"email": "bob@example.com", "password": "short"}),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("at least 8"));
}

#[tokio::test]
async fn login_wrong_password() {
    let app = test_app().await;
    app.post("/api/auth/register", None, alice()).await;

    let (status, body) = app
        .post(
            "/api/auth/login",
            None,
            json!({"email": "alice@example.com", "password": "wrongpassword"}),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Invalid credentials");
}

#[tokio::test]
async fn login_unknown_user_matches_wrong_password() {
    let app = test_app().await;
    let (status, body) = app
        .post(
            "/api/auth/login",
            None,
            json!({"email": "nobody@example.com", "password": "password123"}),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Invalid credentials");
}

#[tokio::test]
async fn refresh_rotates_token() {
    let app = test_app().await;
    let (_, session) = app.post("/api/auth/register", None, alice()).await;
    let refresh_token = session["refreshToken"].as_str().unwrap().to_string();

    let (status, rotated) = app
        .post(
            "/api/auth/refresh",
            None,
            json!({"refreshToken": refresh_token}),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_ne!(rotated["refreshToken"], session["refreshToken"]);

    // The old token was revoked by the rotation.
    let (status, _) = app
        .post(
            "/api/auth/refresh",
            None,
            json!({"refreshToken": refresh_token}),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn refresh_rejects_access_token() {
    let app = test_app().await;
    let (_, session) = app.post("/api/auth/register", None, alice()).await;

    let (status, _) = app
        .post(
            "/api/auth/refresh",
            None,
            json!({"refreshToken": session["accessToken"]}),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn logout_revokes_refresh_token() {
    let app = test_app().await;
    let (_, session) = app.post("/api/auth/register", None, alice()).await;
    let refresh_token = session["refreshToken"].clone();

    let (status, _) = app
        .post("/api/auth/logout", None, json!({"refreshToken": refresh_token}))
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = app
        .post("/api/auth/refresh", None, json!({"refreshToken": refresh_token}))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn me_requires_access_token() {
    let app = test_app().await;

    let (status, _) = app.get("/api/me", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app.get("/api/me", Some("garbage")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (user, token) = app.user("u1", Role::User, 1).await;
    let (status, body) = app.get("/api/me", Some(&token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"], user.id);
}

#[tokio::test]
async fn me_rejects_refresh_token() {
    let app = test_app().await;
    let (_, session) = app.post("/api/auth/register", None, alice()).await;

    let (status, _) = app
        .get("/api/me", session["refreshToken"].as_str())
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn oauth_routes_unavailable_without_client() {
    let app = test_app().await;
    let (status, _) = app.get("/api/auth/oauth/google", None).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}
