//! Periodic background sweepers.
//!
//! - `driver-booking-expiry`: overdue accepted and stale requested bookings
//! - `payment-reconcile`: polls every non-terminal payment with a poll URL
//! - `notification-dispatch`: releases scheduled notifications that are due
//!
//! A failed run is logged and retried on the next tick.

use std::sync::Arc;
use std::time::Duration;

use carhire_core::environment::Clock;
use carhire_runtime::{Shutdown, spawn_periodic};
use tokio::task::JoinHandle;

use crate::server::AppState;

/// Start every sweeper; each stops when `shutdown` fires.
pub fn spawn_all(
    state: &AppState,
    clock: Arc<dyn Clock>,
    interval: Duration,
    shutdown: &Shutdown,
) -> Vec<(&'static str, JoinHandle<()>)> {
    let drivers = state.drivers.clone();
    let expiry_clock = clock.clone();
    let expiry = spawn_periodic("driver-booking-expiry", interval, shutdown, move || {
        let drivers = drivers.clone();
        let now = expiry_clock.now();
        async move {
            match drivers.expire_overdue(now).await {
                Ok(0) => {}
                Ok(expired) => tracing::info!(expired, "Expired overdue driver bookings"),
                Err(e) => tracing::error!(error = %e, "Driver booking expiry sweep failed"),
            }
        }
    });

    let payments = state.payments.clone();
    let reconcile = spawn_periodic("payment-reconcile", interval, shutdown, move || {
        let payments = payments.clone();
        async move {
            match payments.reconcile_pending().await {
                Ok(0) => {}
                Ok(advanced) => tracing::info!(advanced, "Reconciled pending payments"),
                Err(e) => tracing::error!(error = %e, "Payment reconciliation sweep failed"),
            }
        }
    });

    let notifications = state.notifications.clone();
    let dispatch = spawn_periodic("notification-dispatch", interval, shutdown, move || {
        let notifications = notifications.clone();
        let now = clock.now();
        async move {
            match notifications.dispatch_due(now).await {
                Ok(0) => {}
                Ok(sent) => tracing::info!(sent, "Dispatched scheduled notifications"),
                Err(e) => tracing::error!(error = %e, "Notification dispatch sweep failed"),
            }
        }
    });

    vec![
        ("driver-booking-expiry", expiry),
        ("payment-reconcile", reconcile),
        ("notification-dispatch", dispatch),
    ]
}
