//! HTTP handlers under `/api/v1`, organized by domain:
//! - Reservations: vehicle rental CRUD, status and availability
//! - Driver bookings: customer, driver and admin sub-trees
//! - Payments: initiate, reconcile, promo, refund and the gateway webhook
//! - Chat: REST parity for conversations and messages
//! - Tracking: tracker administration and device endpoints
//! - Notifications: authoring, delivery and acknowledgements
//!
//! Handlers stay thin: extract, call the service with the caller's
//! [`Principal`](carhire_core::types::Principal), wrap the result in
//! [`ApiResponse`](carhire_web::ApiResponse). Authorization lives in the
//! services.

pub mod chat;
pub mod driver_bookings;
pub mod notifications;
pub mod payments;
pub mod reservations;
pub mod tracking;

use serde::Deserialize;

/// Optional free-text reason body used by cancel and decline endpoints.
#[derive(Debug, Default, Deserialize)]
pub struct ReasonBody {
    /// Why.
    pub reason: Option<String>,
}
