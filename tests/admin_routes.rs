// Route-level tests over the full router with in-memory stores.
// Run with: cargo test --test admin_routes

mod common;

use common::*;

use axum_test::TestServer;
use serde_json::{json, Value};

use bling_sync::models::bling_config::BlingConfig;
use bling_sync::services::webhook_security::compute_signature;
use bling_sync::create_app;

async fn server_with(config: Option<BlingConfig>) -> (TestServer, TestHarness) {
    let harness = build_harness(config, Vec::new(), Vec::new()).await;
    let server = TestServer::new(create_app(harness.state.clone())).unwrap();
    (server, harness)
}

#[tokio::test]
async fn config_post_coerces_empty_client_id_to_null() {
    let (server, harness) = server_with(None).await;

    let response = server
        .post("/admin/bling/config")
        .json(&json!({"client_id": "", "client_secret": "x"}))
        .await;
    response.assert_status_ok();

    let stored = harness.config_store.snapshot().unwrap();
    assert_eq!(stored.client_id, None);
    assert_eq!(stored.client_secret.as_deref(), Some("x"));
}

#[tokio::test]
async fn config_get_never_echoes_secrets() {
    let (server, _harness) = server_with(Some(connected_config(0))).await;

    let response = server.get("/admin/bling/config").await;
    response.assert_status_ok();

    let body: Value = response.json();
    assert_eq!(body["client_id"], json!("client-id"));
    assert_eq!(body["has_client_secret"], json!(true));
    assert_eq!(body["has_webhook_secret"], json!(false));
    assert_eq!(body["is_connected"], json!(true));
    assert!(body.get("client_secret").is_none());
    assert!(body["sync_preferences"]["products"]["enabled"].as_bool().unwrap());
}

#[tokio::test]
async fn config_post_merges_partial_preferences() {
    let (server, harness) = server_with(None).await;

    let response = server
        .post("/admin/bling/config")
        .json(&json!({
            "client_id": "cid",
            "sync_preferences": {
                "products": {"import_images": false},
                "inventory": {"locations": [
                    {"stock_location_id": "sloc_main", "bling_deposit_id": "7"}
                ]}
            }
        }))
        .await;
    response.assert_status_ok();

    let stored = harness.config_store.snapshot().unwrap();
    let prefs = &stored.sync_preferences;
    assert!(!prefs.products.import_images);
    assert!(prefs.products.enabled);
    assert_eq!(prefs.inventory.locations.len(), 1);
    // Sole mapping is promoted to default.
    assert!(prefs.inventory.locations[0].is_default);
}

#[tokio::test]
async fn health_reports_not_connected_without_token() {
    let (server, _harness) = server_with(None).await;

    let response = server.get("/admin/bling/health").await;
    response.assert_status_ok();
    assert_eq!(response.json::<Value>()["status"], json!("not_connected"));
}

#[tokio::test]
async fn health_reports_ok_with_fresh_token() {
    let (server, _harness) = server_with(Some(connected_config(0))).await;

    let response = server.get("/admin/bling/health").await;
    response.assert_status_ok();
    assert_eq!(response.json::<Value>()["status"], json!("ok"));
}

#[tokio::test]
async fn health_reports_error_when_refresh_is_impossible() {
    let mut config = connected_config(7200);
    config.refresh_token = None;
    let (server, _harness) = server_with(Some(config)).await;

    let response = server.get("/admin/bling/health").await;
    response.assert_status_ok();

    let body: Value = response.json();
    assert_eq!(body["status"], json!("error"));
    assert!(body["message"].as_str().unwrap().contains("refresh token"));
}

#[tokio::test]
async fn stock_locations_are_listed_for_the_mapping_ui() {
    let (server, _harness) = server_with(None).await;

    let response = server.get("/admin/bling/inventory/locations").await;
    response.assert_status_ok();

    let body: Value = response.json();
    let locations = body["locations"].as_array().unwrap();
    assert_eq!(locations.len(), 2);
    assert_eq!(locations[0]["id"], json!("sloc_main"));
}

#[tokio::test]
async fn order_sync_route_returns_404_for_unknown_order() {
    let (server, _harness) = server_with(Some(connected_config(0))).await;

    let response = server.post("/admin/bling/orders/missing/sync").await;
    response.assert_status(axum::http::StatusCode::NOT_FOUND);

    let body: Value = response.json();
    assert!(body["message"].as_str().unwrap().contains("missing"));
}

// ============================================================================
// Webhook
// ============================================================================

fn webhook_config() -> BlingConfig {
    let mut config = connected_config(0);
    config.webhook_secret = Some("hook-secret".to_string());
    config
}

#[tokio::test]
async fn webhook_with_wrong_signature_is_rejected_and_does_not_sync() {
    let (server, harness) = server_with(Some(webhook_config())).await;

    let body = br#"{"topic":"estoque","event":"updated"}"#;
    let response = server
        .post("/webhooks/bling")
        .add_header(
            axum::http::HeaderName::from_static("x-bling-signature"),
            axum::http::HeaderValue::from_static("deadbeef"),
        )
        .bytes(body.as_slice().into())
        .await;

    response.assert_status(axum::http::StatusCode::UNAUTHORIZED);
    assert_eq!(harness.mock.lock().await.product_requests, 0);
}

#[tokio::test]
async fn webhook_without_signature_is_rejected_when_secret_configured() {
    let (server, harness) = server_with(Some(webhook_config())).await;

    let response = server
        .post("/webhooks/bling")
        .bytes(br#"{"topic":"produto","event":"updated"}"#.as_slice().into())
        .await;

    response.assert_status(axum::http::StatusCode::UNAUTHORIZED);
    assert_eq!(harness.mock.lock().await.product_requests, 0);
}

#[tokio::test]
async fn webhook_with_valid_signature_triggers_resync() {
    let (server, harness) = server_with(Some(webhook_config())).await;

    let body = br#"{"topic":"estoque","event":"updated"}"#;
    let signature = compute_signature("hook-secret", body);

    let response = server
        .post("/webhooks/bling")
        .add_header(
            axum::http::HeaderName::from_static("x-bling-signature"),
            axum::http::HeaderValue::from_str(&signature).unwrap(),
        )
        .bytes(body.as_slice().into())
        .await;

    response.assert_status_ok();
    assert_eq!(response.json::<Value>()["received"], json!(true));
    assert_eq!(harness.mock.lock().await.product_requests, 1);
}

#[tokio::test]
async fn webhook_without_configured_secret_skips_verification() {
    // Trust-on-first-use: no secret stored means no signature check.
    let (server, harness) = server_with(Some(connected_config(0))).await;

    let response = server
        .post("/webhooks/bling")
        .bytes(br#"{"topic":"produto","event":"created"}"#.as_slice().into())
        .await;

    response.assert_status_ok();
    assert_eq!(harness.mock.lock().await.product_requests, 1);
}
