//! HTTP-level tests: routing, DTO validation and error mapping through the
//! axum layer.

mod common;

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use common::TestHarness;
use serde_json::{json, Value};
use tower::ServiceExt;

async fn request(
    router: &axum::Router,
    method: Method,
    uri: &str,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json");
    let request = match body {
        Some(json) => builder.body(Body::from(json.to_string())).unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

#[tokio::test]
async fn create_and_fetch_session() {
    let h = TestHarness::new().await;
    let app = h.router();

    let (status, body) = request(
        &app,
        Method::POST,
        "/api/v1/checkout/sessions",
        Some(json!({ "scope": "device-1" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["scope"], "device-1");
    assert_eq!(body["step"], "item_selection");

    let id = body["id"].as_str().unwrap().to_string();
    let (status, body) = request(
        &app,
        Method::GET,
        &format!("/api/v1/checkout/sessions/{}", id),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"], id.as_str());
}

#[tokio::test]
async fn unknown_session_maps_to_not_found() {
    let h = TestHarness::new().await;
    let app = h.router();

    let (status, body) = request(
        &app,
        Method::GET,
        "/api/v1/checkout/sessions/00000000-0000-0000-0000-000000000000",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Not Found");
}

#[tokio::test]
async fn add_item_then_quote_over_http() {
    let h = TestHarness::new().await;
    let app = h.router();

    let (_, body) = request(
        &app,
        Method::POST,
        "/api/v1/checkout/sessions",
        Some(json!({ "scope": null })),
    )
    .await;
    let id = body["id"].as_str().unwrap().to_string();

    let item = json!({
        "service_id": "deep",
        "display_name": "Deep Cleaning",
        "unit_price": "75.00",
        "room_type_slug": "full-home",
        "property_type_slug": "apartment",
        "category_slug": "cleaning"
    });
    for _ in 0..2 {
        let (status, _) = request(
            &app,
            Method::POST,
            &format!("/api/v1/checkout/sessions/{}/items", id),
            Some(item.clone()),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }

    let (status, body) = request(
        &app,
        Method::GET,
        &format!("/api/v1/checkout/sessions/{}/quote", id),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["subtotal"], "150.00");
    assert_eq!(body["discount_amount"], "0");
    assert_eq!(body["total_to_pay"], "157.50");
}

#[tokio::test]
async fn invalid_item_payload_is_rejected() {
    let h = TestHarness::new().await;
    let app = h.router();

    let (_, body) = request(
        &app,
        Method::POST,
        "/api/v1/checkout/sessions",
        Some(json!({ "scope": null })),
    )
    .await;
    let id = body["id"].as_str().unwrap().to_string();

    let (status, _) = request(
        &app,
        Method::POST,
        &format!("/api/v1/checkout/sessions/{}/items", id),
        Some(json!({
            "service_id": "",
            "display_name": "Nameless",
            "unit_price": "10.00",
            "room_type_slug": "x",
            "property_type_slug": "x",
            "category_slug": "x"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn next_on_empty_cart_is_a_validation_error() {
    let h = TestHarness::new().await;
    let app = h.router();

    let (_, body) = request(
        &app,
        Method::POST,
        "/api/v1/checkout/sessions",
        Some(json!({ "scope": null })),
    )
    .await;
    let id = body["id"].as_str().unwrap().to_string();

    let (status, body) = request(
        &app,
        Method::POST,
        &format!("/api/v1/checkout/sessions/{}/next", id),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["message"]
        .as_str()
        .unwrap()
        .to_lowercase()
        .contains("cart"));
}

#[tokio::test]
async fn goto_ahead_is_rejected_over_http() {
    let h = TestHarness::new().await;
    let app = h.router();

    let (_, body) = request(
        &app,
        Method::POST,
        "/api/v1/checkout/sessions",
        Some(json!({ "scope": null })),
    )
    .await;
    let id = body["id"].as_str().unwrap().to_string();

    let (status, _) = request(
        &app,
        Method::POST,
        &format!("/api/v1/checkout/sessions/{}/goto/3", id),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn health_endpoint_reports_ok() {
    let h = TestHarness::new().await;
    let app = h.router();

    let (status, body) = request(&app, Method::GET, "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}
