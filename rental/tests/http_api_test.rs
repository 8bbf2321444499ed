//! HTTP contract tests: probes, authentication, envelopes and the
//! reservation, payment, tracking and notification endpoints.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod common;

use axum::http::StatusCode;
use carhire_web::CORRELATION_ID_HEADER;
use carhire_testing::at;
use common::{TestApp, customer, driver, manager, money, other_customer, text};
use rust_decimal_macros::dec;
use serde_json::{Value, json};

const MODEL: &str = "00000000-0000-0000-0000-00000000a001";
const VEHICLE: &str = "00000000-0000-0000-0000-00000000c001";
const BRANCH: &str = "00000000-0000-0000-0000-00000000b001";

fn reservation_body(pickup: &str, dropoff: &str) -> Value {
    json!({
        "vehicle_model_id": MODEL,
        "vehicle_id": VEHICLE,
        "pickup": { "branch_id": BRANCH, "at": pickup },
        "dropoff": { "branch_id": BRANCH, "at": dropoff },
        "daily_rate": "45.00",
        "currency": "USD",
        "fees": "10.00",
    })
}

#[tokio::test]
async fn probes_answer_without_authentication() {
    let app = TestApp::start().await;
    let server = app.server();

    let health = server.get("/health").await;
    assert_eq!(health.status_code(), StatusCode::OK);
    assert_eq!(health.json::<Value>()["status"], json!("ok"));
    assert!(health.headers().contains_key(CORRELATION_ID_HEADER));

    let ready = server.get("/ready").await;
    assert_eq!(ready.status_code(), StatusCode::OK);
    let body = ready.json::<Value>();
    assert_eq!(body["status"], json!("ready"));
    assert_eq!(body["components"][0]["component"], json!("store"));
}

#[tokio::test]
async fn api_requires_a_valid_bearer_token() {
    let app = TestApp::start().await;
    let server = app.server();

    let missing = server.get("/api/v1/reservations").await;
    assert_eq!(missing.status_code(), StatusCode::UNAUTHORIZED);
    let body = missing.json::<Value>();
    assert_eq!(body["success"], json!(false));
    assert_eq!(body["code"], json!("UNAUTHENTICATED"));

    let forged = server
        .get("/api/v1/reservations")
        .authorization_bearer("not.a.token")
        .await;
    assert_eq!(forged.status_code(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn reservation_lifecycle_and_availability() {
    let app = TestApp::start().await;
    let server = app.server();
    let token = app.token(&customer());

    let created = server
        .post("/api/v1/reservations")
        .authorization_bearer(token.clone())
        .json(&reservation_body("2025-03-10T09:00:00Z", "2025-03-12T12:00:00Z"))
        .await;
    assert_eq!(created.status_code(), StatusCode::CREATED);
    let reservation = created.json::<Value>()["data"].clone();
    assert_eq!(reservation["status"], json!("pending"));
    assert!(text(&reservation["code"]).starts_with("RSV-"));
    assert_eq!(reservation["pricing"]["days"], json!(3));
    assert_eq!(money(&reservation["pricing"]["total"]), dec!(145));
    let id = text(&reservation["id"]).to_string();

    let clash = server
        .post("/api/v1/reservations")
        .authorization_bearer(app.token(&other_customer()))
        .json(&reservation_body("2025-03-12T08:00:00Z", "2025-03-13T08:00:00Z"))
        .await;
    assert_eq!(clash.status_code(), StatusCode::CONFLICT);
    assert_eq!(clash.json::<Value>()["code"], json!("VEHICLE_TIME_CONFLICT"));

    let busy = server
        .get("/api/v1/reservations/availability")
        .authorization_bearer(token.clone())
        .add_query_param("vehicle_id", VEHICLE)
        .add_query_param("start", "2025-03-11T00:00:00Z")
        .add_query_param("end", "2025-03-11T12:00:00Z")
        .await
        .json::<Value>();
    assert_eq!(busy["data"]["available"], json!(false));
    assert_eq!(busy["data"]["conflicts"].as_array().unwrap().len(), 1);

    let itself = server
        .get("/api/v1/reservations/availability")
        .authorization_bearer(token.clone())
        .add_query_param("vehicle_id", VEHICLE)
        .add_query_param("start", "2025-03-11T00:00:00Z")
        .add_query_param("end", "2025-03-11T12:00:00Z")
        .add_query_param("exclude_id", &id)
        .await
        .json::<Value>();
    assert_eq!(itself["data"]["available"], json!(true));

    let inverted = server
        .get("/api/v1/reservations/availability")
        .authorization_bearer(token.clone())
        .add_query_param("vehicle_id", VEHICLE)
        .add_query_param("start", "2025-03-11T12:00:00Z")
        .add_query_param("end", "2025-03-11T00:00:00Z")
        .await;
    assert_eq!(inverted.status_code(), StatusCode::BAD_REQUEST);
    assert_eq!(inverted.json::<Value>()["code"], json!("INVALID_TIME_WINDOW"));

    let listed = server
        .get("/api/v1/reservations")
        .authorization_bearer(token.clone())
        .await
        .json::<Value>();
    assert_eq!(listed["data"].as_array().unwrap().len(), 1);

    let foreign = server
        .get(&format!("/api/v1/reservations/{id}"))
        .authorization_bearer(app.token(&other_customer()))
        .await;
    assert_eq!(foreign.status_code(), StatusCode::FORBIDDEN);

    let cancelled = server
        .delete(&format!("/api/v1/reservations/{id}"))
        .authorization_bearer(token.clone())
        .await
        .json::<Value>();
    assert_eq!(cancelled["data"]["status"], json!("cancelled"));

    let freed = server
        .get("/api/v1/reservations/availability")
        .authorization_bearer(token)
        .add_query_param("vehicle_id", VEHICLE)
        .add_query_param("start", "2025-03-11T00:00:00Z")
        .add_query_param("end", "2025-03-11T12:00:00Z")
        .await
        .json::<Value>();
    assert_eq!(freed["data"]["available"], json!(true));
}

#[tokio::test]
async fn webhook_always_acknowledges() {
    let app = TestApp::start().await;
    let server = app.server();

    let unknown = server
        .post("/api/v1/payments/webhook/paynow")
        .form(&[("reference", "PAY-nothing"), ("status", "Paid")])
        .await;
    assert_eq!(unknown.status_code(), StatusCode::OK);
    assert_eq!(unknown.json::<Value>()["data"]["outcome"], json!("unknown_payment"));

    let garbage = server
        .post("/api/v1/payments/webhook/paynow")
        .content_type("application/json")
        .bytes("{oops".into())
        .await;
    assert_eq!(garbage.status_code(), StatusCode::OK);
    assert_eq!(garbage.json::<Value>()["data"]["outcome"], json!("rejected"));
}

#[tokio::test]
async fn cash_payments_ignore_gateway_callbacks() {
    let app = TestApp::start().await;
    let server = app.server();
    let token = app.token(&customer());

    let created = server
        .post("/api/v1/reservations")
        .authorization_bearer(token.clone())
        .json(&reservation_body("2025-03-20T09:00:00Z", "2025-03-21T09:00:00Z"))
        .await;
    assert_eq!(created.status_code(), StatusCode::CREATED);
    let reservation_id = text(&created.json::<Value>()["data"]["id"]).to_string();

    let receipt = server
        .post("/api/v1/payments/initiate")
        .authorization_bearer(token.clone())
        .json(&json!({
            "reservation_id": reservation_id,
            "amount": "55.00",
            "currency": "USD",
            "method": "cash",
        }))
        .await
        .json::<Value>();
    let payment_id = text(&receipt["data"]["payment"]["id"]).to_string();
    let reference = text(&receipt["data"]["payment"]["merchant_reference"]).to_string();

    let forged = server
        .post("/api/v1/payments/webhook/paynow")
        .form(&[("reference", reference.as_str()), ("status", "Paid")])
        .await;
    assert_eq!(forged.status_code(), StatusCode::OK);
    assert_eq!(forged.json::<Value>()["data"]["outcome"], json!("rejected"));

    let status = server
        .get(&format!("/api/v1/payments/{payment_id}/status"))
        .authorization_bearer(token)
        .await
        .json::<Value>();
    assert_eq!(status["data"]["status"], json!("pending"));
}

#[tokio::test]
async fn mobile_payments_need_a_wallet_method() {
    let app = TestApp::start().await;
    let server = app.server();

    let response = server
        .post("/api/v1/payments/mobile")
        .authorization_bearer(app.token(&customer()))
        .json(&json!({
            "reservation_id": "00000000-0000-0000-0000-00000000d001",
            "amount": "10.00",
            "currency": "USD",
            "method": "card",
        }))
        .await;
    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
    assert_eq!(response.json::<Value>()["code"], json!("VALIDATION_ERROR"));
}

#[tokio::test]
async fn device_reports_reach_the_vehicle_location() {
    let app = TestApp::start().await;
    let server = app.server();

    let registered = server
        .post("/api/v1/vehicle-trackers")
        .authorization_bearer(app.token(&manager()))
        .json(&json!({ "device_id": "imei-3550001", "label": "Unit 7" }))
        .await;
    assert_eq!(registered.status_code(), StatusCode::CREATED);

    let denied = server
        .post("/api/v1/vehicle-trackers")
        .authorization_bearer(app.token(&customer()))
        .json(&json!({ "device_id": "imei-3550002" }))
        .await;
    assert_eq!(denied.status_code(), StatusCode::FORBIDDEN);

    let login = server
        .post("/api/v1/device/login")
        .json(&json!({ "device_id": "imei-3550001" }))
        .await
        .json::<Value>();
    let device_token = text(&login["data"]["token"]).to_string();
    assert_eq!(login["data"]["tracker"]["status"], json!("active"));

    let attached = server
        .post("/api/v1/device/attach")
        .authorization_bearer(device_token.clone())
        .json(&json!({ "vehicle_id": VEHICLE }))
        .await
        .json::<Value>();
    assert_eq!(attached["data"]["vehicle_id"], json!(VEHICLE));

    app.clock.set(at("2025-03-01T09:10:00Z"));
    let reported = server
        .post("/api/v1/device/location")
        .authorization_bearer(device_token.clone())
        .json(&json!({ "lat": -17.8292, "lng": 31.0522, "speed": 42.5 }))
        .await;
    assert_eq!(reported.status_code(), StatusCode::OK);

    let bad = server
        .post("/api/v1/device/location")
        .authorization_bearer(device_token.clone())
        .json(&json!({ "lat": 123.0, "lon": 31.0 }))
        .await;
    assert_eq!(bad.status_code(), StatusCode::BAD_REQUEST);
    assert_eq!(bad.json::<Value>()["code"], json!("INVALID_LOCATION"));

    let user_token_on_device_route = server
        .post("/api/v1/device/location")
        .authorization_bearer(app.token(&driver()))
        .json(&json!({ "lat": 1.0, "lon": 1.0 }))
        .await;
    assert_eq!(user_token_on_device_route.status_code(), StatusCode::FORBIDDEN);

    let location = server
        .get(&format!("/api/v1/vehicle/{VEHICLE}/location"))
        .authorization_bearer(app.token(&customer()))
        .await
        .json::<Value>();
    let snapshot = &location["data"]["location"];
    assert_eq!(snapshot["lat"], json!(-17.8292));
    assert_eq!(snapshot["lon"], json!(31.0522));
    assert_eq!(common::time(&snapshot["at"]), at("2025-03-01T09:10:00Z"));
}

#[tokio::test]
async fn notifications_reach_their_audience() {
    let app = TestApp::start().await;
    let server = app.server();
    let admin_token = app.token(&manager());

    let created = server
        .post("/api/v1/notifications")
        .authorization_bearer(admin_token.clone())
        .json(&json!({
            "title": "Driver briefing",
            "body": "New airport pickup procedure from Monday.",
            "audience": { "scope": "roles", "roles": ["driver"] },
        }))
        .await;
    assert_eq!(created.status_code(), StatusCode::CREATED);
    let id = text(&created.json::<Value>()["data"]["id"]).to_string();

    let sent = server
        .post(&format!("/api/v1/notifications/{id}/send"))
        .authorization_bearer(admin_token.clone())
        .await
        .json::<Value>();
    assert_eq!(sent["data"]["status"], json!("sent"));

    let driver_feed = server
        .get("/api/v1/notifications/mine")
        .authorization_bearer(app.token(&driver()))
        .await
        .json::<Value>();
    assert_eq!(driver_feed["data"].as_array().unwrap().len(), 1);

    let customer_feed = server
        .get("/api/v1/notifications/mine")
        .authorization_bearer(app.token(&customer()))
        .await
        .json::<Value>();
    assert_eq!(customer_feed["data"], json!([]));

    let unread = server
        .get("/api/v1/notifications/unread-count")
        .authorization_bearer(app.token(&driver()))
        .await
        .json::<Value>();
    assert_eq!(unread["data"]["unread"], json!(1));

    for _ in 0..2 {
        let read = server
            .post(&format!("/api/v1/notifications/{id}/read"))
            .authorization_bearer(app.token(&driver()))
            .await;
        assert_eq!(read.status_code(), StatusCode::OK);
    }
    let unread = server
        .get("/api/v1/notifications/unread-count")
        .authorization_bearer(app.token(&driver()))
        .await
        .json::<Value>();
    assert_eq!(unread["data"]["unread"], json!(0));

    let cancel_sent = server
        .post(&format!("/api/v1/notifications/{id}/cancel"))
        .authorization_bearer(admin_token)
        .await;
    assert_eq!(cancel_sent.status_code(), StatusCode::CONFLICT);
}
