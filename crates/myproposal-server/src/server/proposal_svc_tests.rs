//! Tests for proposal, credit and cron routes.

use std::sync::atomic::Ordering;

use axum::http::{Method, StatusCode};
use myproposal_core::config::CreditPolicy;
use myproposal_core::db::unix_timestamp;
use serde_json::{Value, json};

use super::test_helpers::{CRON_SECRET, TestApp, test_app, test_app_with};
use crate::storage::Role;

fn generate_body() -> Value {
    json!({"recipientName": "Sam", "tone": "POETIC", "memories": "Paris, 2019"})
}

fn draft_body() -> Value {
    json!({
        "recipientName": "Sam",
        "recipientEmail": "sam@example.com",
        "message": "Will you marry me?",
        "tone": "romantic"
    })
}

async fn create_draft(app: &TestApp, token: &str) -> String {
    let (status, body) = app.post("/api/proposals", Some(token), draft_body()).await;
    assert_eq!(status, StatusCode::CREATED);
    body["id"].as_str().unwrap().to_string()
}

async fn send_email(app: &TestApp, token: &str, id: &str) -> (StatusCode, Value) {
    app.post(
        "/api/proposals/send",
        Some(token),
        json!({"proposalId": id, "channel": "EMAIL"}),
    )
    .await
}

async fn remaining(app: &TestApp, id: &str) -> i64 {
    app.state.db.get_user(id).await.unwrap().remaining_credits
}

// === Generation ===

#[tokio::test]
async fn generate_consumes_a_credit() {
    let app = test_app().await;
    let (_, token) = app.user("u1", Role::User, 1).await;

    let (status, body) = app
        .post("/api/proposals/generate", Some(&token), generate_body())
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["text"], "Will you marry me?");
    assert_eq!(body["provider"], "openai");
    assert_eq!(body["remaining"], 0);

    let (status, body) = app
        .post("/api/proposals/generate", Some(&token), generate_body())
        .await;
    assert_eq!(status, StatusCode::PAYMENT_REQUIRED);
    assert_eq!(body["remaining"], 0);
    assert_eq!(app.model.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn generate_rejects_missing_recipient_without_charging() {
    let app = test_app().await;
    let (_, token) = app.user("u1", Role::User, 1).await;

    let (status, _) = app
        .post("/api/proposals/generate", Some(&token), json!({"tone": "FUNNY"}))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(remaining(&app, "u1").await, 1);
}

#[tokio::test]
async fn generate_failure_refunds() {
    let app = test_app_with(CreditPolicy::default(), true).await;
    let (_, token) = app.user("u1", Role::User, 1).await;

    let (status, body) = app
        .post("/api/proposals/generate", Some(&token), generate_body())
        .await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["error"], "Upstream provider failed");
    assert_eq!(remaining(&app, "u1").await, 1);
}

#[tokio::test]
async fn generate_falls_back_to_default_provider() {
    let app = test_app().await;
    let (_, token) = app.user("u1", Role::User, 1).await;

    // Gemini is not registered, so the default (OpenAI) answers.
    let mut body = generate_body();
    body["provider"] = json!("gemini");
    let (status, body) = app
        .post("/api/proposals/generate", Some(&token), body)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["provider"], "openai");
}

// === Drafts ===

#[tokio::test]
async fn create_list_get_and_edit_draft() {
    let app = test_app().await;
    let (_, token) = app.user("u1", Role::User, 1).await;
    let id = create_draft(&app, &token).await;

    let (status, list) = app.get("/api/proposals", Some(&token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list.as_array().unwrap().len(), 1);

    let (status, body) = app
        .call(
            Method::PUT,
            &format!("/api/proposals/{id}"),
            Some(&token),
            Some(json!({"message": "  Marry me?  "})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Marry me?");
    assert_eq!(body["recipientName"], "Sam");
    assert_eq!(body["tone"], "ROMANTIC");

    let (status, thread) = app.get(&format!("/api/proposals/{id}"), Some(&token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(thread["proposal"]["status"], "DRAFT");
    assert!(thread["messages"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn create_validates_recipient() {
    let app = test_app().await;
    let (_, token) = app.user("u1", Role::User, 1).await;

    let mut body = draft_body();
    body["recipientPhone"] = json!("0044 123");
    let (status, _) = app.post("/api/proposals", Some(&token), body).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let mut body = draft_body();
    body["message"] = json!("   ");
    let (status, _) = app.post("/api/proposals", Some(&token), body).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn other_users_proposals_are_hidden() {
    let app = test_app().await;
    let (_, alice) = app.user("alice", Role::User, 1).await;
    let (_, bob) = app.user("bob", Role::User, 1).await;
    let id = create_draft(&app, &alice).await;

    let (status, _) = app.get(&format!("/api/proposals/{id}"), Some(&bob)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

// === Delivery ===

#[tokio::test]
async fn send_delivers_and_charges() {
    let app = test_app().await;
    let (_, token) = app.user("u1", Role::User, 1).await;
    let id = create_draft(&app, &token).await;

    let (status, body) = send_email(&app, &token, &id).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["proposal"]["status"], "SENT");
    assert_eq!(body["proposal"]["channel"], "EMAIL");
    assert_eq!(body["receipt"]["reference"], "msg_1");
    assert_eq!(body["remaining"], 0);

    let sent = app.email.sent.lock().unwrap().clone();
    assert_eq!(sent[0].to, "sam@example.com");
    assert!(sent[0].text.contains(&format!("https://myproposal.love/proposal/{id}")));

    // Sent proposals are no longer editable.
    let (status, _) = app
        .call(
            Method::PUT,
            &format!("/api/proposals/{id}"),
            Some(&token),
            Some(json!({"message": "changed"})),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn send_checks_address_and_channel_before_charging() {
    let app = test_app().await;
    let (_, token) = app.user("u1", Role::User, 1).await;
    let id = create_draft(&app, &token).await;

    // No phone number on the proposal.
    let (status, _) = app
        .post(
            "/api/proposals/send",
            Some(&token),
            json!({"proposalId": id, "channel": "SMS"}),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    app.call(
        Method::PUT,
        &format!("/api/proposals/{id}"),
        Some(&token),
        Some(json!({"recipientPhone": "+14155552671"})),
    )
    .await;
    // Valid number, but no SMS sender is configured.
    let (status, _) = app
        .post(
            "/api/proposals/send",
            Some(&token),
            json!({"proposalId": id, "channel": "SMS"}),
        )
        .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

    assert_eq!(remaining(&app, "u1").await, 1);
}

#[tokio::test]
async fn failed_delivery_refunds() {
    let app = test_app_with(CreditPolicy::default(), true).await;
    let (_, token) = app.user("u1", Role::User, 1).await;
    let id = create_draft(&app, &token).await;

    let (status, _) = send_email(&app, &token, &id).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(remaining(&app, "u1").await, 1);

    let (_, thread) = app.get(&format!("/api/proposals/{id}"), Some(&token)).await;
    assert_eq!(thread["proposal"]["status"], "DRAFT");
}

#[tokio::test]
async fn send_without_credits_is_refused() {
    let app = test_app().await;
    let (_, token) = app.user("u1", Role::User, 0).await;
    // Keep the period open so no lazy refill happens.
    app.state.ledger.check_user_credits("u1").await.unwrap();
    app.state.db.decrement_credits_unguarded("u1", 1, unix_timestamp()).await.unwrap();
    let id = create_draft(&app, &token).await;

    let (status, _) = send_email(&app, &token, &id).await;
    assert_eq!(status, StatusCode::PAYMENT_REQUIRED);
    assert_eq!(app.email.sent_count(), 0);
}

// === Recipient ===

#[tokio::test]
async fn recipient_accepts_once() {
    let app = test_app().await;
    let (_, token) = app.user("u1", Role::User, 1).await;
    let id = create_draft(&app, &token).await;

    // Drafts are not visible publicly.
    let (status, _) = app.get(&format!("/api/public/proposals/{id}"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    send_email(&app, &token, &id).await;

    let (status, view) = app.get(&format!("/api/public/proposals/{id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(view["senderName"], "Alex");
    assert!(view.get("recipientEmail").is_none());

    let uri = format!("/api/public/proposals/{id}/respond");
    let (status, body) = app.post(&uri, None, json!({"answer": "ACCEPTED"})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ACCEPTED");

    let (status, _) = app.post(&uri, None, json!({"answer": "REJECTED"})).await;
    assert_eq!(status, StatusCode::CONFLICT);

    // Answered proposals cannot be re-sent.
    let (status, _) = send_email(&app, &token, &id).await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn respond_rejects_non_answers() {
    let app = test_app().await;
    let (_, token) = app.user("u1", Role::User, 1).await;
    let id = create_draft(&app, &token).await;
    send_email(&app, &token, &id).await;

    let (status, _) = app
        .post(
            &format!("/api/public/proposals/{id}/respond"),
            None,
            json!({"answer": "DRAFT"}),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn expired_proposal_is_gone() {
    let app = test_app().await;
    let (_, token) = app.user("u1", Role::User, 1).await;
    let id = create_draft(&app, &token).await;
    send_email(&app, &token, &id).await;

    sqlx::query("UPDATE proposals SET expires_at = ? WHERE id = ?")
        .bind(unix_timestamp() - 1)
        .bind(&id)
        .execute(app.state.db.pool())
        .await
        .unwrap();

    let (status, _) = app
        .post(
            &format!("/api/public/proposals/{id}/respond"),
            None,
            json!({"answer": "ACCEPTED"}),
        )
        .await;
    assert_eq!(status, StatusCode::GONE);

    let (_, view) = app.get(&format!("/api/public/proposals/{id}"), None).await;
    assert_eq!(view["status"], "EXPIRED");
}

#[tokio::test]
async fn reply_thread_between_sender_and_recipient() {
    let app = test_app().await;
    let (_, token) = app.user("u1", Role::User, 1).await;
    let id = create_draft(&app, &token).await;

    let (status, _) = app
        .post(&format!("/api/proposals/{id}/messages"), Some(&token), json!({"body": "hi"}))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    send_email(&app, &token, &id).await;

    let (status, _) = app
        .post(
            &format!("/api/public/proposals/{id}/messages"),
            None,
            json!({"body": "Is this real?"}),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let (status, _) = app
        .post(
            &format!("/api/proposals/{id}/messages"),
            Some(&token),
            json!({"body": "Yes!"}),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (_, thread) = app.get(&format!("/api/proposals/{id}"), Some(&token)).await;
    let messages = thread["messages"].as_array().unwrap();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0]["author"], "RECIPIENT");
    assert_eq!(messages[1]["author"], "SENDER");
}

// === Credits ===

#[tokio::test]
async fn credit_check_opens_first_period() {
    let app = test_app().await;
    let (_, token) = app.user("u1", Role::User, 1).await;

    let (status, body) = app.get("/api/credits", Some(&token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["allowed"], true);
    assert_eq!(body["remaining"], 1);
    assert_eq!(body["tier"], "FREE");
    assert!(body["periodEnd"].as_i64().unwrap() > unix_timestamp());
}

#[tokio::test]
async fn consume_floor_and_overdraft() {
    let app = test_app().await;
    let (_, token) = app.user("u1", Role::User, 1).await;

    let (status, body) = app.post("/api/credits/consume", Some(&token), json!({})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["remaining"], 0);
    let (status, _) = app.post("/api/credits/consume", Some(&token), json!({})).await;
    assert_eq!(status, StatusCode::PAYMENT_REQUIRED);

    let overdraft = test_app_with(
        CreditPolicy {
            allow_overdraft: true,
            ..CreditPolicy::default()
        },
        false,
    )
    .await;
    let (_, token) = overdraft.user("u1", Role::User, 1).await;
    overdraft.post("/api/credits/consume", Some(&token), json!({})).await;
    let (status, body) = overdraft
        .post("/api/credits/consume", Some(&token), json!({"cost": 1}))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["remaining"], -1);
}

#[tokio::test]
async fn consume_rejects_non_positive_cost() {
    let app = test_app().await;
    let (_, token) = app.user("u1", Role::User, 1).await;
    let (status, _) = app
        .post("/api/credits/consume", Some(&token), json!({"cost": 0}))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn overdraft_consume_rejects_oversized_cost() {
    let app = test_app_with(
        CreditPolicy {
            allow_overdraft: true,
            ..CreditPolicy::default()
        },
        false,
    )
    .await;
    let (_, token) = app.user("u1", Role::User, 1).await;
    app.post("/api/credits/consume", Some(&token), json!({"cost": 3}))
        .await;

    let (status, _) = app
        .post("/api/credits/consume", Some(&token), json!({"cost": i64::MAX}))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = app.get("/api/credits", Some(&token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["remaining"], -2);
}

// === Cron ===

#[tokio::test]
async fn cron_requires_secret() {
    let app = test_app().await;

    let (status, _) = app.get("/api/cron/reset-credits", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, _) = app.get("/api/cron/reset-credits", Some("wrong")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = app.get("/api/cron/reset-credits", Some(CRON_SECRET)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["expiredProposals"], 0);
}

#[tokio::test]
async fn cron_resets_stale_free_users() {
    let app = test_app().await;
    app.user("u1", Role::User, 0).await;
    sqlx::query("UPDATE users SET last_credit_reset = ? WHERE id = 'u1'")
        .bind(unix_timestamp() - 8 * 86_400)
        .execute(app.state.db.pool())
        .await
        .unwrap();

    let (status, body) = app.get("/api/cron/reset-credits", Some(CRON_SECRET)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["reset"]["free"], 1);
    assert_eq!(remaining(&app, "u1").await, 1);
}
