//! End-to-end booking and payment scenarios driven through the HTTP API.
//!
//! Every test starts from the same seeded application at 2025-03-01T09:00Z
//! and moves the manual clock explicitly.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![allow(clippy::too_many_lines)]

mod common;

use axum::http::StatusCode;
use axum_test::TestServer;
use carhire_core::error::{ErrorKind, codes};
use carhire_core::repository::PaymentRepository;
use carhire_core::types::{PaymentId, PaymentStatus, User};
use carhire_testing::at;
use carhire_testing::gateway::ScriptedGateway;
use common::{TestApp, customer, driver, money, other_customer, text, time};
use rust_decimal_macros::dec;
use serde_json::{Value, json};

async fn request_driver(server: &TestServer, app: &TestApp, who: &User, start: &str, hours: u32) -> Value {
    let response = server
        .post("/api/v1/driver-bookings/customer")
        .authorization_bearer(app.token(who))
        .json(&json!({
            "driver_id": driver().id,
            "pickup_location": "Harare CBD",
            "start_at": start,
            "hours_requested": hours,
        }))
        .await;
    response.json::<Value>()
}

async fn accept(server: &TestServer, app: &TestApp, booking_id: &str) -> Value {
    server
        .post(&format!("/api/v1/driver-bookings/driver/{booking_id}/accept"))
        .authorization_bearer(app.token(&driver()))
        .await
        .json::<Value>()
}

async fn initiate_for_booking(server: &TestServer, app: &TestApp, who: &User, booking_id: &str, amount: &str) -> Value {
    server
        .post("/api/v1/payments/initiate")
        .authorization_bearer(app.token(who))
        .json(&json!({
            "driver_booking_id": booking_id,
            "amount": amount,
            "currency": "USD",
            "method": "card",
        }))
        .await
        .json::<Value>()
}

/// Request, accept, pay by poll, confirm, complete.
#[tokio::test]
async fn driver_booking_happy_path() {
    let app = TestApp::start().await;
    let server = app.server();

    let created = request_driver(&server, &app, &customer(), "2025-03-01T10:00:00Z", 4).await;
    assert_eq!(created["success"], json!(true));
    let booking = &created["data"];
    assert_eq!(booking["status"], json!("requested"));
    assert_eq!(money(&booking["pricing"]["estimated_total"]), dec!(80.00));
    assert!(text(&booking["code"]).starts_with("DRV-"));
    let booking_id = text(&booking["id"]).to_string();

    app.clock.set(at("2025-03-01T10:15:00Z"));
    let accepted = accept(&server, &app, &booking_id).await;
    assert_eq!(accepted["data"]["status"], json!("accepted_by_driver"));
    assert_eq!(time(&accepted["data"]["payment_deadline_at"]), at("2025-03-01T10:45:00Z"));

    let receipt = initiate_for_booking(&server, &app, &customer(), &booking_id, "80.00").await;
    let payment = &receipt["data"]["payment"];
    assert_eq!(payment["status"], json!("pending"));
    let reference = text(&payment["merchant_reference"]).to_string();
    let poll_url = ScriptedGateway::poll_url_for(&reference);
    assert_eq!(receipt["data"]["poll_url"], json!(poll_url));
    let payment_id = text(&payment["id"]).to_string();

    app.clock.set(at("2025-03-01T10:20:00Z"));
    app.gateway.set_status(&poll_url, "Paid");
    let polled = server
        .post(&format!("/api/v1/payments/{payment_id}/poll"))
        .authorization_bearer(app.token(&customer()))
        .await
        .json::<Value>();
    assert_eq!(polled["data"]["status"], json!("paid"));
    assert_eq!(money(&polled["data"]["captured_amount"]), dec!(80));

    let details = server
        .get(&format!("/api/v1/driver-bookings/{booking_id}"))
        .authorization_bearer(app.token(&customer()))
        .await
        .json::<Value>();
    let confirmed = &details["data"]["booking"];
    assert_eq!(confirmed["status"], json!("confirmed"));
    assert_eq!(time(&confirmed["paid_at"]), at("2025-03-01T10:20:00Z"));
    assert_eq!(confirmed["payment_id"], json!(payment_id));

    let completed = server
        .post(&format!("/api/v1/driver-bookings/driver/{booking_id}/complete"))
        .authorization_bearer(app.token(&driver()))
        .await
        .json::<Value>();
    assert_eq!(completed["data"]["status"], json!("completed"));
}

/// An accepted booking blocks overlapping requests.
#[tokio::test]
async fn overlapping_driver_request_is_rejected() {
    let app = TestApp::start().await;
    let server = app.server();

    let created = request_driver(&server, &app, &customer(), "2025-03-01T10:00:00Z", 4).await;
    let booking_id = text(&created["data"]["id"]).to_string();
    app.clock.set(at("2025-03-01T10:15:00Z"));
    accept(&server, &app, &booking_id).await;

    let response = server
        .post("/api/v1/driver-bookings/customer")
        .authorization_bearer(app.token(&other_customer()))
        .json(&json!({
            "driver_id": driver().id,
            "pickup_location": "Avondale",
            "start_at": "2025-03-01T13:00:00Z",
            "end_at": "2025-03-01T15:00:00Z",
            "hours_requested": 2,
        }))
        .await;
    assert_eq!(response.status_code(), StatusCode::CONFLICT);
    let body = response.json::<Value>();
    assert_eq!(body["success"], json!(false));
    assert_eq!(body["code"], json!(codes::DRIVER_TIME_CONFLICT));

    let mine = server
        .get("/api/v1/driver-bookings/customer")
        .authorization_bearer(app.token(&other_customer()))
        .await
        .json::<Value>();
    assert_eq!(mine["data"], json!([]));

    // Back to back is fine.
    let after = request_driver(&server, &app, &other_customer(), "2025-03-01T14:00:00Z", 2).await;
    assert_eq!(after["data"]["status"], json!("requested"));
}

/// The sweeper expires an unpaid booking; capture can no
/// longer confirm it.
#[tokio::test]
async fn unpaid_booking_expires_after_payment_window() {
    let app = TestApp::start().await;
    let server = app.server();

    let created = request_driver(&server, &app, &customer(), "2025-03-01T10:00:00Z", 4).await;
    let booking_id = text(&created["data"]["id"]).to_string();
    app.clock.set(at("2025-03-01T10:15:00Z"));
    accept(&server, &app, &booking_id).await;
    let receipt = initiate_for_booking(&server, &app, &customer(), &booking_id, "80.00").await;
    let payment_id: PaymentId = serde_json::from_value(receipt["data"]["payment"]["id"].clone()).unwrap();

    app.clock.set(at("2025-03-01T10:46:00Z"));
    let expired = app.state.drivers.expire_overdue(at("2025-03-01T10:46:00Z")).await.unwrap();
    assert_eq!(expired, 1);

    let details = server
        .get(&format!("/api/v1/driver-bookings/{booking_id}"))
        .authorization_bearer(app.token(&customer()))
        .await
        .json::<Value>();
    assert_eq!(details["data"]["booking"]["status"], json!("expired"));

    // The gateway still reports a late capture.
    let mut payment = PaymentRepository::get(app.store.as_ref(), payment_id)
        .await
        .unwrap()
        .unwrap();
    app.gateway
        .set_status(payment.poll_url.as_deref().unwrap(), "Paid");
    payment = app.state.payments.reconcile(payment).await.unwrap();
    assert_eq!(payment.status, PaymentStatus::Paid);

    let booking_id = serde_json::from_value(json!(booking_id)).unwrap();
    let err = app
        .state
        .drivers
        .confirm_payment(booking_id, &payment)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidState);

    let retry = server
        .post("/api/v1/payments/initiate")
        .authorization_bearer(app.token(&customer()))
        .json(&json!({
            "driver_booking_id": booking_id,
            "amount": "80.00",
            "currency": "USD",
            "method": "card",
        }))
        .await;
    assert_eq!(retry.status_code(), StatusCode::CONFLICT);
    assert_eq!(retry.json::<Value>()["code"], json!(codes::INVALID_BOOKING_STATUS));
}

/// Replaying a paid webhook changes nothing and still answers 200.
#[tokio::test]
async fn webhook_replay_is_idempotent() {
    let app = TestApp::start().await;
    let server = app.server();

    let created = request_driver(&server, &app, &other_customer(), "2025-03-02T08:00:00Z", 3).await;
    let booking_id = text(&created["data"]["id"]).to_string();
    accept(&server, &app, &booking_id).await;
    let receipt = initiate_for_booking(&server, &app, &other_customer(), &booking_id, "60.00").await;
    let payment_id = text(&receipt["data"]["payment"]["id"]).to_string();
    let reference = text(&receipt["data"]["payment"]["merchant_reference"]).to_string();
    app.gateway
        .set_status(&ScriptedGateway::poll_url_for(&reference), "Paid");

    let callback = [
        ("reference", reference.clone()),
        ("paynowreference", ScriptedGateway::provider_ref_for(&reference)),
        ("amount", "60.00".to_string()),
        ("status", "Paid".to_string()),
        ("hash", "5F1A".to_string()),
    ];

    let t1 = at("2025-03-01T09:05:00Z");
    app.clock.set(t1);
    let first = server
        .post("/api/v1/payments/webhook/paynow")
        .form(&callback)
        .await;
    assert_eq!(first.status_code(), StatusCode::OK);
    assert_eq!(first.json::<Value>()["data"]["outcome"], json!("applied"));

    let status_path = format!("/api/v1/payments/{payment_id}/status");
    let paid = server
        .get(&status_path)
        .authorization_bearer(app.token(&other_customer()))
        .await
        .json::<Value>();
    assert_eq!(paid["data"]["status"], json!("paid"));
    assert_eq!(time(&paid["data"]["captured_at"]), t1);

    app.clock.set(at("2025-03-01T09:30:00Z"));
    let replay = server
        .post("/api/v1/payments/webhook/paynow")
        .form(&callback)
        .await;
    assert_eq!(replay.status_code(), StatusCode::OK);
    assert_eq!(replay.json::<Value>()["data"]["outcome"], json!("unchanged"));

    let after = server
        .get(&status_path)
        .authorization_bearer(app.token(&other_customer()))
        .await
        .json::<Value>();
    assert_eq!(after["data"], paid["data"]);

    let details = server
        .get(&format!("/api/v1/driver-bookings/{booking_id}"))
        .authorization_bearer(app.token(&other_customer()))
        .await
        .json::<Value>();
    assert_eq!(details["data"]["booking"]["status"], json!("confirmed"));
}

/// Apply, remove and reapply promos on a pending payment.
#[tokio::test]
async fn promo_application_on_pending_payment() {
    let app = TestApp::start().await;
    let server = app.server();
    let token = app.token(&customer());

    let reservation = server
        .post("/api/v1/reservations")
        .authorization_bearer(token.clone())
        .json(&json!({
            "vehicle_model_id": "00000000-0000-0000-0000-00000000a001",
            "pickup": { "branch_id": "00000000-0000-0000-0000-00000000b001", "at": "2025-03-05T09:00:00Z" },
            "dropoff": { "branch_id": "00000000-0000-0000-0000-00000000b001", "at": "2025-03-06T09:00:00Z" },
            "daily_rate": "100.00",
            "currency": "USD",
        }))
        .await
        .json::<Value>();
    assert_eq!(money(&reservation["data"]["pricing"]["total"]), dec!(100));
    let reservation_id = text(&reservation["data"]["id"]).to_string();

    let receipt = server
        .post("/api/v1/payments/initiate")
        .authorization_bearer(token.clone())
        .json(&json!({
            "reservation_id": reservation_id,
            "amount": "100.00",
            "currency": "USD",
            "method": "bank",
        }))
        .await
        .json::<Value>();
    let payment_id = text(&receipt["data"]["payment"]["id"]).to_string();

    let applied = server
        .post(&format!("/api/v1/payments/{payment_id}/apply-promo"))
        .authorization_bearer(token.clone())
        .json(&json!({ "code": "welcome10" }))
        .await
        .json::<Value>();
    assert_eq!(applied["data"]["promo_warning"], Value::Null);
    assert_eq!(money(&applied["data"]["payment"]["amount"]), dec!(90));
    assert_eq!(applied["data"]["payment"]["promo"]["code"], json!("WELCOME10"));

    let removed = server
        .delete(&format!("/api/v1/payments/{payment_id}/promo"))
        .authorization_bearer(token.clone())
        .await
        .json::<Value>();
    assert_eq!(money(&removed["data"]["amount"]), dec!(100));
    assert_eq!(removed["data"]["promo"], Value::Null);

    let expired = server
        .post(&format!("/api/v1/payments/{payment_id}/apply-promo"))
        .authorization_bearer(token)
        .json(&json!({ "code": "OLD10" }))
        .await
        .json::<Value>();
    assert_eq!(expired["data"]["promo_warning"], json!("EXPIRED"));
    assert_eq!(expired["data"]["payment"], removed["data"]);
}

/// A promo that covers the whole amount captures the payment at once.
#[tokio::test]
async fn fully_discounted_payment_is_paid_immediately() {
    use carhire_core::repository::PromoRepository;
    use carhire_testing::fixtures;

    let app = TestApp::start().await;
    PromoRepository::insert(app.store.as_ref(), fixtures::percent_promo("FREERIDE", dec!(100)))
        .await
        .unwrap();
    let server = app.server();

    let created = request_driver(&server, &app, &customer(), "2025-03-03T10:00:00Z", 2).await;
    let booking_id = text(&created["data"]["id"]).to_string();
    accept(&server, &app, &booking_id).await;

    let receipt = server
        .post("/api/v1/payments/initiate")
        .authorization_bearer(app.token(&customer()))
        .json(&json!({
            "driver_booking_id": booking_id,
            "amount": "40.00",
            "currency": "USD",
            "method": "card",
            "promo_code": "FREERIDE",
        }))
        .await
        .json::<Value>();
    let payment = &receipt["data"]["payment"];
    assert_eq!(payment["status"], json!("paid"));
    assert_eq!(money(&payment["amount"]), dec!(0));
    assert_eq!(payment["provider"], json!("manual"));
    assert!(app.gateway.initiated().is_empty());

    let details = server
        .get(&format!("/api/v1/driver-bookings/{booking_id}"))
        .authorization_bearer(app.token(&driver()))
        .await
        .json::<Value>();
    assert_eq!(details["data"]["booking"]["status"], json!("confirmed"));
}
