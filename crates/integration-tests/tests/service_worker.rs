//! Integration tests for the offline worker and the storefront HTTP surface.
//!
//! Covers precaching, the network-first and catalog strategies behind the
//! proxy fallback, push and notification clicks, the event stream, and the
//! plain pages.

#![allow(clippy::unwrap_used)]

use pwa_commerce_core::WorkerState;
use pwa_commerce_integration_tests::{MockRemote, TestApp, TestOptions, eventually};
use pwa_commerce_storefront::events::ClientMessage;
use reqwest::StatusCode;
use serde_json::Value;

const SOURCE: &str = "x-served-from";

fn source(response: &reqwest::Response) -> &str {
    response
        .headers()
        .get(SOURCE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
}

// =============================================================================
// Lifecycle Tests
// =============================================================================

#[tokio::test]
async fn test_worker_activates_after_precache() {
    let app = TestApp::spawn().await;
    assert_eq!(app.state.worker().state(), WorkerState::Activated);
}

#[tokio::test]
async fn test_failed_precache_leaves_worker_redundant_and_passes_through() {
    let remote = MockRemote::spawn().await;
    remote.remove_asset("/vite.svg");
    let app = TestApp::spawn_with(remote, TestOptions::default()).await;

    assert_eq!(app.state.worker().state(), WorkerState::Redundant);

    let response = app.get("/index.html").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(source(&response), "network");

    // Nothing was cached, so a down origin is visible as-is
    app.remote.set_down(true);
    let response = app.get("/index.html").await;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_restart_while_origin_down_serves_existing_cache() {
    let app = TestApp::spawn().await;
    app.remote.set_down(true);

    let restarted = app.restart(TestOptions::default()).await;
    assert_eq!(restarted.state.worker().state(), WorkerState::Activated);

    let response = restarted.get("/index.html").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(source(&response), "cache");

    let products = restarted.get("/api/products").await;
    assert_eq!(products.status(), StatusCode::OK);
}

// =============================================================================
// Fetch Strategy Tests
// =============================================================================

#[tokio::test]
async fn test_precached_asset_served_from_cache_when_origin_down() {
    let app = TestApp::spawn().await;
    app.remote.set_down(true);

    let response = app.get("/vite.svg").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(source(&response), "cache");
    assert!(response.text().await.unwrap().contains("<svg"));
}

#[tokio::test]
async fn test_network_first_caches_fresh_responses() {
    let app = TestApp::spawn().await;

    let response = app.get("/about.html").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(source(&response), "network");

    app.remote.set_down(true);
    let app_ref = &app;
    assert!(
        eventually(|| async move { source(&app_ref.get("/about.html").await) == "cache" }).await
    );

    let body = app.get("/about.html").await.text().await.unwrap();
    assert!(body.contains("About us"));
}

#[tokio::test]
async fn test_uncached_page_while_down_is_synthetic_offline() {
    let app = TestApp::spawn().await;
    app.remote.set_down(true);

    let response = app.get("/never-seen.html").await;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(source(&response), "offline");
}

#[tokio::test]
async fn test_missing_asset_is_not_masked() {
    let app = TestApp::spawn().await;

    let response = app.get("/missing.png").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

// =============================================================================
// Catalog Tests
// =============================================================================

#[tokio::test]
async fn test_products_listed_from_origin_catalog() {
    let app = TestApp::spawn().await;

    let products: Vec<Value> = app.get("/api/products").await.json().await.unwrap();
    let names: Vec<&str> = products
        .iter()
        .map(|p| p["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, ["Brake Pad", "Oil Filter", "Spark Plug"]);
    assert_eq!(products[0]["product_id"], "1");
}

#[tokio::test]
async fn test_products_survive_origin_outage() {
    let app = TestApp::spawn().await;
    app.remote.set_down(true);

    let response = app.get("/api/products").await;
    assert_eq!(response.status(), StatusCode::OK);
    let products: Vec<Value> = response.json().await.unwrap();
    assert_eq!(products.len(), 3);
}

#[tokio::test]
async fn test_products_unavailable_without_any_copy() {
    let remote = MockRemote::spawn().await;
    remote.set_down(true);
    let options = TestOptions {
        start: false,
        ..TestOptions::default()
    };
    let app = TestApp::spawn_with(remote, options).await;

    let response = app.get("/api/products").await;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

    let page = app.get("/").await;
    assert_eq!(page.status(), StatusCode::OK);
    assert!(page.text().await.unwrap().contains("unavailable"));
}

// =============================================================================
// Page Tests
// =============================================================================

#[tokio::test]
async fn test_home_lists_products_and_cart() {
    let app = TestApp::spawn().await;

    let body = app.get("/").await.text().await.unwrap();
    assert!(body.contains("Brake Pad"));
    assert!(body.contains("Cart (0 items)"));
    assert!(body.contains("Your cart is empty"));

    app.add_to_cart("1", 2).await;
    let body = app.get("/").await.text().await.unwrap();
    assert!(body.contains("Cart (1 items)"));
    assert!(!body.contains("Your cart is empty"));
}

#[tokio::test]
async fn test_manifest_describes_app() {
    let app = TestApp::spawn().await;

    let manifest: Value = app.get("/manifest.webmanifest").await.json().await.unwrap();
    assert_eq!(manifest["name"], "PWA Commerce");
    assert_eq!(manifest["start_url"], "/");
    assert!(!manifest["icons"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_health_and_request_id() {
    let app = TestApp::spawn().await;

    let response = app.get("/health").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("x-request-id"));

    let ready = app.get("/health/ready").await;
    assert_eq!(ready.status(), StatusCode::OK);
}

// =============================================================================
// Push Tests
// =============================================================================

async fn push(app: &TestApp, body: &str) -> Value {
    app.client
        .post(app.url("/api/push"))
        .body(body.to_owned())
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap()
}

#[tokio::test]
async fn test_push_without_pages_is_not_shown() {
    let app = TestApp::spawn().await;

    let reply = push(&app, r#"{"title":"Sale","body":"20% off brakes"}"#).await;
    assert_eq!(reply["shown"], false);
    assert_eq!(reply["notification"]["title"], "Sale");
}

#[tokio::test]
async fn test_push_reaches_live_page() {
    let app = TestApp::spawn().await;
    let mut page = app.state.bus().connect("http://127.0.0.1/");

    let reply = push(&app, "").await;
    assert_eq!(reply["shown"], true);
    assert_eq!(reply["notification"]["title"], "PWA Commerce");

    let message = page.next_message().await.unwrap();
    assert!(matches!(message, ClientMessage::Notification { .. }));
}

#[tokio::test]
async fn test_push_options_need_vapid_key() {
    let app = TestApp::spawn().await;

    let response = app.get("/api/push/options").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_notification_click_focuses_matching_page() {
    let app = TestApp::spawn().await;
    let page = app.state.bus().connect("http://127.0.0.1/sale");

    let action: Value = app
        .client
        .post(app.url("/api/notifications/click"))
        .json(&serde_json::json!({ "url": "http://127.0.0.1/sale" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(action["action"], "focus");
    assert_eq!(action["client_id"], page.id().to_string());
}

#[tokio::test]
async fn test_notification_click_opens_window_without_match() {
    let app = TestApp::spawn().await;

    let action: Value = app
        .client
        .post(app.url("/api/notifications/click"))
        .json(&serde_json::json!({ "url": "http://127.0.0.1/new" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(action["action"], "open_window");
    assert_eq!(action["url"], "http://127.0.0.1/new");
}

// =============================================================================
// Event Stream Tests
// =============================================================================

#[tokio::test]
async fn test_event_stream_registers_client() {
    let app = TestApp::spawn().await;

    let mut response = app.get("/api/events?url=http://127.0.0.1/cart").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(
        response.headers()["content-type"]
            .to_str()
            .unwrap()
            .starts_with("text/event-stream")
    );

    let first = response.chunk().await.unwrap().unwrap();
    assert!(String::from_utf8_lossy(&first).contains("event: connected"));

    let clients = app.state.bus().clients();
    assert_eq!(clients.len(), 1);
    assert_eq!(clients[0].url, "http://127.0.0.1/cart");
}
