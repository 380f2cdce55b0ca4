// src/tests/api_tests.rs

use super::{TEST_SECRET, create_test_app_service};
use crate::api::app;
use crate::api::handlers::AppService;
use crate::auth::jwt::issue_token;
use crate::core::models::balance::{BalanceView, Direction};
use crate::core::models::group::Group;
use crate::core::money::Money;
use crate::core::services::ServiceOptions;
use axum::http::StatusCode;
use axum_test::TestServer;
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;

fn token(user_id: &str) -> String {
    issue_token(TEST_SECRET, user_id, Duration::from_secs(3600))
}

fn test_server(service: Arc<AppService>) -> TestServer {
    TestServer::try_new(app(service)).expect("Could not create test server.")
}

async fn create_trip(server: &TestServer, owner_token: &str) -> Group {
    let response = server
        .post("/api/groups")
        .authorization_bearer(owner_token)
        .json(&json!({ "name": "Trip", "member_ids": ["bob", "carol"] }))
        .await;
    response.assert_status(StatusCode::CREATED);
    response.json::<Group>()
}

#[tokio::test]
async fn health_check_needs_no_token() {
    let server = test_server(create_test_app_service(ServiceOptions::default()));

    let response = server.get("/").await;

    response.assert_status_ok();
    assert_eq!(response.json::<Value>()["status"], "ok");
}

#[tokio::test]
async fn api_rejects_missing_and_invalid_tokens() {
    let server = test_server(create_test_app_service(ServiceOptions::default()));

    let response = server.get("/api/balances").await;
    response.assert_status(StatusCode::UNAUTHORIZED);
    let body = response.json::<Value>();
    assert_eq!(body["kind"], "authentication");
    assert_eq!(body["code"], "UNAUTHENTICATED");

    server
        .get("/api/balances")
        .authorization_bearer("not-a-jwt")
        .await
        .assert_status(StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn expense_and_settlement_flow() {
    let service = create_test_app_service(ServiceOptions::default());
    let alice = token("alice");
    let bob = token("bob");
    let server = test_server(service);
    let group = create_trip(&server, &alice).await;

    let response = server
        .post(&format!("/api/groups/{}/expenses", group.id))
        .authorization_bearer(&alice)
        .json(&json!({ "title": "Dinner", "total_amount": "30.00", "split_kind": "EQUAL" }))
        .await;
    response.assert_status(StatusCode::CREATED);
    let expense = response.json::<Value>();
    assert_eq!(expense["splits"].as_array().map(Vec::len), Some(3));
    assert_eq!(expense["can_edit"], true);

    let response = server
        .post(&format!("/api/groups/{}/settlements", group.id))
        .authorization_bearer(&bob)
        .json(&json!({ "paid_to": "alice", "amount": "10.00" }))
        .await;
    response.assert_status(StatusCode::CREATED);

    let balances = server
        .get(&format!("/api/groups/{}/balances", group.id))
        .authorization_bearer(&alice)
        .await
        .json::<Vec<BalanceView>>();
    assert_eq!(balances.len(), 1);
    assert_eq!(balances[0].other_user_id, "carol");
    assert_eq!(balances[0].net_amount, Money::from_cents(1000));
    assert_eq!(balances[0].direction, Direction::OwesYou);

    let all = server
        .get("/api/balances")
        .authorization_bearer(&bob)
        .await
        .json::<Vec<BalanceView>>();
    assert!(all.is_empty());
}

#[tokio::test]
async fn ledger_errors_use_their_own_statuses() {
    let service = create_test_app_service(ServiceOptions::default());
    let alice = token("alice");
    let bob = token("bob");
    let server = test_server(service);
    let group = create_trip(&server, &alice).await;

    let response = server
        .post(&format!("/api/groups/{}/settlements", group.id))
        .authorization_bearer(&bob)
        .json(&json!({ "paid_to": "alice", "amount": "5.00" }))
        .await;
    response.assert_status(StatusCode::NOT_FOUND);
    assert_eq!(response.json::<Value>()["code"], "NO_BALANCE_FOUND");

    server
        .post(&format!("/api/groups/{}/expenses", group.id))
        .authorization_bearer(&alice)
        .json(&json!({ "title": "Dinner", "total_amount": "30.00", "split_kind": "EQUAL" }))
        .await
        .assert_status(StatusCode::CREATED);

    let response = server
        .post(&format!("/api/groups/{}/settlements", group.id))
        .authorization_bearer(&bob)
        .json(&json!({ "paid_to": "alice", "amount": "10.01" }))
        .await;
    response.assert_status(StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(response.json::<Value>()["code"], "AMOUNT_EXCEEDS_DEBT");

    let response = server
        .post(&format!("/api/groups/{}/expenses", group.id))
        .authorization_bearer(&alice)
        .json(&json!({
            "title": "Hotel",
            "total_amount": "50.00",
            "split_kind": "CUSTOM",
            "splits": [
                { "user_id": "alice", "amount": "25.00" },
                { "user_id": "bob", "amount": "24.99" }
            ]
        }))
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
    let body = response.json::<Value>();
    assert_eq!(body["kind"], "validation");
    assert_eq!(body["code"], "SPLIT_MISMATCH");
}

#[tokio::test]
async fn non_creator_cannot_delete_expense() {
    let service = create_test_app_service(ServiceOptions::default());
    let alice = token("alice");
    let bob = token("bob");
    let server = test_server(service);
    let group = create_trip(&server, &alice).await;

    let expense = server
        .post(&format!("/api/groups/{}/expenses", group.id))
        .authorization_bearer(&alice)
        .json(&json!({ "title": "Dinner", "total_amount": "30.00", "split_kind": "EQUAL" }))
        .await
        .json::<Value>();
    let path = format!(
        "/api/groups/{}/expenses/{}",
        group.id,
        expense["expense"]["id"].as_str().unwrap_or_default()
    );

    server
        .delete(&path)
        .authorization_bearer(&bob)
        .await
        .assert_status(StatusCode::FORBIDDEN);
    server
        .delete(&path)
        .authorization_bearer(&alice)
        .await
        .assert_status(StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn attachments_round_trip_over_http() {
    let service = create_test_app_service(ServiceOptions {
        max_attachment_bytes: 16,
        ..Default::default()
    });
    let alice = token("alice");
    let server = test_server(service);
    let group = create_trip(&server, &alice).await;
    let expense = server
        .post(&format!("/api/groups/{}/expenses", group.id))
        .authorization_bearer(&alice)
        .json(&json!({ "title": "Dinner", "total_amount": "30.00", "split_kind": "EQUAL" }))
        .await
        .json::<Value>();
    let expense_id = expense["expense"]["id"].as_str().unwrap_or_default().to_string();

    let response = server
        .post(&format!("/api/expenses/{}/attachments", expense_id))
        .authorization_bearer(&alice)
        .add_query_param("filename", "receipt.txt")
        .content_type("text/plain")
        .bytes("paid in cash".into())
        .await;
    response.assert_status(StatusCode::CREATED);
    let attachment = response.json::<Value>();
    let attachment_id = attachment["id"].as_str().unwrap_or_default().to_string();

    let response = server
        .get(&format!("/api/expenses/{}/attachments/{}", expense_id, attachment_id))
        .authorization_bearer(&alice)
        .await;
    response.assert_status_ok();
    assert_eq!(response.header("content-type"), "text/plain");
    assert_eq!(response.as_bytes().as_ref(), b"paid in cash");

    let response = server
        .post(&format!("/api/expenses/{}/attachments", expense_id))
        .authorization_bearer(&alice)
        .add_query_param("filename", "big.bin")
        .bytes(vec![0u8; 17].into())
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
    assert_eq!(response.json::<Value>()["code"], "ATTACHMENT_TOO_LARGE");

    server
        .delete(&format!("/api/expenses/{}/attachments/{}", expense_id, attachment_id))
        .authorization_bearer(&alice)
        .await
        .assert_status(StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn openapi_document_is_served() {
    let server = test_server(create_test_app_service(ServiceOptions::default()));

    let response = server.get("/api-docs/openapi.json").await;

    response.assert_status_ok();
    let doc = response.json::<Value>();
    assert_eq!(doc["info"]["title"], "Tripsplit API");
    assert!(doc["paths"]["/api/groups/{group_id}/settlements"].is_object());
}
