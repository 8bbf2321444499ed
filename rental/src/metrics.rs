//! Business metrics for the carhire services.
//!
//! # Exported Metrics
//!
//! ## Counters
//! - `carhire_reservations_total{status}` - Reservation transitions by resulting status
//! - `carhire_driver_bookings_total{status}` - Driver booking transitions by resulting status
//! - `carhire_payments_total{status}` - Payment status changes
//! - `carhire_refunds_total` - Refunds recorded
//! - `carhire_webhooks_total{outcome}` - Gateway callbacks by outcome
//! - `carhire_chat_messages_total` - Chat messages stored
//! - `carhire_location_updates_total` - Tracker fixes stored
//! - `carhire_notifications_sent_total` - Notifications released
//!
//! ## Gauges
//! - `carhire_realtime_sessions{namespace}` - Connected websocket sessions

use carhire_core::broadcast::Namespace;
use metrics::{describe_counter, describe_gauge};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};
use std::net::SocketAddr;

/// Register all metric descriptions.
///
/// This should be called once at application startup, before any metrics are recorded.
pub fn register_business_metrics() {
    describe_counter!(
        "carhire_reservations_total",
        "Reservation transitions by resulting status"
    );
    describe_counter!(
        "carhire_driver_bookings_total",
        "Driver booking transitions by resulting status"
    );
    describe_counter!("carhire_payments_total", "Payment status changes by status");
    describe_counter!("carhire_refunds_total", "Refunds recorded against captured payments");
    describe_counter!(
        "carhire_webhooks_total",
        "Gateway callbacks by outcome (applied, unchanged, unknown, rejected)"
    );
    describe_counter!("carhire_chat_messages_total", "Chat messages stored");
    describe_counter!("carhire_location_updates_total", "Tracker location fixes stored");
    describe_counter!("carhire_notifications_sent_total", "Notifications released to audiences");
    describe_gauge!(
        "carhire_realtime_sessions",
        "Connected websocket sessions per namespace"
    );

    tracing::info!("Business metrics registered");
}

/// Install the Prometheus recorder with its own HTTP listener.
///
/// # Errors
///
/// Fails when a recorder is already installed or the listener cannot bind.
pub fn install_exporter(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(%addr, "Prometheus exporter listening");
    Ok(())
}

/// A reservation reached `status`.
pub fn record_reservation(status: &'static str) {
    metrics::counter!("carhire_reservations_total", "status" => status).increment(1);
}

/// A driver booking reached `status`.
pub fn record_driver_booking(status: &'static str) {
    metrics::counter!("carhire_driver_bookings_total", "status" => status).increment(1);
}

/// A payment reached `status`.
pub fn record_payment(status: &'static str) {
    metrics::counter!("carhire_payments_total", "status" => status).increment(1);
}

/// A refund was recorded.
pub fn record_refund() {
    metrics::counter!("carhire_refunds_total").increment(1);
}

/// A gateway callback was processed.
pub fn record_webhook(outcome: &'static str) {
    metrics::counter!("carhire_webhooks_total", "outcome" => outcome).increment(1);
}

/// A chat message was stored.
pub fn record_chat_message() {
    metrics::counter!("carhire_chat_messages_total").increment(1);
}

/// A location fix was stored.
pub fn record_location_update() {
    metrics::counter!("carhire_location_updates_total").increment(1);
}

/// A notification was released.
pub fn record_notification_sent() {
    metrics::counter!("carhire_notifications_sent_total").increment(1);
}

/// Session count changed by `delta`.
#[allow(clippy::cast_precision_loss)]
pub fn record_session_delta(namespace: Namespace, delta: i64) {
    let gauge = metrics::gauge!("carhire_realtime_sessions", "namespace" => namespace.as_str());
    if delta >= 0 {
        gauge.increment(delta as f64);
    } else {
        gauge.decrement(delta.unsigned_abs() as f64);
    }
}
