use axum::http::StatusCode;
use serde_json::json;

use super::test_helpers::test_app;
use crate::storage::{NewTransaction, Role, TransactionKind};

#[tokio::test]
async fn admin_routes_require_admin_role() {
    let app = test_app().await;
    let (_, user) = app.user("u1", Role::User, 1).await;

    let (status, _) = app.get("/api/admin/users", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app.get("/api/admin/users", Some(&user)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn list_users_with_total() {
    let app = test_app().await;
    let (_, admin) = app.user("admin", Role::Admin, 1).await;
    app.user("u1", Role::User, 1).await;
    app.user("u2", Role::User, 1).await;

    let (status, body) = app.get("/api/admin/users?limit=2", Some(&admin)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 3);
    assert_eq!(body["users"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn grant_credits_is_audited() {
    let app = test_app().await;
    let (_, admin) = app.user("admin", Role::Admin, 1).await;
    app.user("u1", Role::User, 1).await;

    let (status, body) = app
        .post("/api/admin/users/u1/credits", Some(&admin), json!({"amount": 4}))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["remaining"], 5);

    let (status, _) = app
        .post("/api/admin/users/u1/credits", Some(&admin), json!({"amount": -3}))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .post(
            "/api/admin/users/u1/credits",
            Some(&admin),
            json!({"amount": i64::MAX}),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let user = app.state.db.get_user("u1").await.unwrap();
    assert_eq!(user.remaining_credits, 5);

    let (status, _) = app
        .post("/api/admin/users/ghost/credits", Some(&admin), json!({"amount": 1}))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, logs) = app.get("/api/admin/audit-logs", Some(&admin)).await;
    let logs = logs.as_array().unwrap();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0]["action"], "credits.grant");
    assert_eq!(logs[0]["actorId"], "admin");
    assert_eq!(logs[0]["targetId"], "u1");
}

#[tokio::test]
async fn role_change_takes_effect_immediately() {
    let app = test_app().await;
    let (_, admin) = app.user("admin", Role::Admin, 1).await;
    let (_, user) = app.user("u1", Role::User, 1).await;

    let (status, body) = app
        .post("/api/admin/users/u1/role", Some(&admin), json!({"role": "ADMIN"}))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["role"], "ADMIN");

    // The token was issued as USER, but the role is read from the database.
    let (status, _) = app.get("/api/admin/users", Some(&user)).await;
    assert_eq!(status, StatusCode::OK);

    app.post("/api/admin/users/admin/role", Some(&user), json!({"role": "USER"}))
        .await;
    let (status, _) = app.get("/api/admin/users", Some(&admin)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (_, logs) = app.get("/api/admin/audit-logs", Some(&user)).await;
    let detail: serde_json::Value =
        serde_json::from_str(logs[0]["detail"].as_str().unwrap()).unwrap();
    assert_eq!(detail, json!({"from": "ADMIN", "to": "USER"}));
}

#[tokio::test]
async fn transactions_filter_by_user() {
    let app = test_app().await;
    let (_, admin) = app.user("admin", Role::Admin, 1).await;
    app.user("u1", Role::User, 1).await;
    app.user("u2", Role::User, 1).await;

    for (id, user) in [("t1", "u1"), ("t2", "u2"), ("t3", "u1")] {
        app.state
            .db
            .record_transaction(&NewTransaction {
                id,
                user_id: user,
                kind: TransactionKind::InvoicePaid,
                amount_cents: 999,
                currency: "usd",
                stripe_ref: Some("in_1"),
            })
            .await
            .unwrap();
    }

    let (status, all) = app.get("/api/admin/transactions", Some(&admin)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(all.as_array().unwrap().len(), 3);

    let (_, mine) = app
        .get("/api/admin/transactions?userId=u1&limit=1", Some(&admin))
        .await;
    let mine = mine.as_array().unwrap();
    assert_eq!(mine.len(), 1);
    assert_eq!(mine[0]["id"], "t3");
    assert_eq!(mine[0]["kind"], "INVOICE_PAID");
}
