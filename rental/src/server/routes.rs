//! Router configuration for the carhire platform.
//!
//! Builds the complete Axum router with all endpoints.

use axum::{
    Router, middleware,
    routing::{delete, get, patch, post},
};
use carhire_web::{correlation_id, health::health_check};
use tower_http::trace::TraceLayer;

use super::health::readiness_check;
use super::state::AppState;
use crate::api::{chat, driver_bookings, notifications, payments, reservations, tracking};
use crate::realtime::socket::{chat_socket, tracking_socket};

/// Build the complete Axum router.
///
/// - `/health`, `/ready`: probes, no authentication
/// - `/ws/chat`, `/ws/tracking`: websocket namespaces, token in header or `?token=`
/// - `/api/v1/...`: REST endpoints
pub fn build_router(state: AppState) -> Router {
    let reservation_routes = Router::new()
        .route(
            "/",
            post(reservations::create_reservation).get(reservations::list_reservations),
        )
        .route("/availability", get(reservations::check_availability))
        .route(
            "/:id",
            get(reservations::get_reservation).delete(reservations::cancel_reservation),
        )
        .route("/:id/status", patch(reservations::update_status))
        .route("/:id/vehicle", patch(reservations::assign_vehicle));

    let driver_booking_routes = Router::new()
        .route(
            "/customer",
            post(driver_bookings::request_driver).get(driver_bookings::list_for_customer),
        )
        .route("/customer/:id/cancel", post(driver_bookings::cancel_by_customer))
        .route("/driver", get(driver_bookings::list_for_driver))
        .route("/driver/:id/accept", post(driver_bookings::accept))
        .route("/driver/:id/decline", post(driver_bookings::decline))
        .route("/driver/:id/cancel", post(driver_bookings::cancel_by_driver))
        .route("/driver/:id/complete", post(driver_bookings::complete))
        .route("/admin", get(driver_bookings::list_all))
        .route("/:id", get(driver_bookings::details));

    let payment_routes = Router::new()
        .route("/initiate", post(payments::initiate))
        .route("/mobile", post(payments::initiate_mobile))
        .route("/webhook/paynow", post(payments::paynow_webhook))
        .route("/:id/status", get(payments::status))
        .route("/:id/poll", post(payments::poll))
        .route("/:id/apply-promo", post(payments::apply_promo))
        .route("/:id/promo", delete(payments::remove_promo))
        .route("/:id/refund", post(payments::refund))
        .route("/:id/cancel", post(payments::cancel))
        .route("/:id/cash-received", post(payments::cash_received));

    let chat_routes = Router::new()
        .route(
            "/conversations",
            post(chat::create_conversation).get(chat::list_conversations),
        )
        .route("/conversations/:id", get(chat::get_conversation))
        .route("/conversations/:id/archive", post(chat::archive_conversation))
        .route(
            "/conversations/:id/messages",
            get(chat::list_messages).post(chat::send_message),
        )
        .route("/messages/:id/read", post(chat::mark_read))
        .route("/messages/:id", delete(chat::delete_message));

    let notification_routes = Router::new()
        .route("/", post(notifications::create).get(notifications::list))
        .route("/mine", get(notifications::mine))
        .route("/unread-count", get(notifications::unread_count))
        .route(
            "/:id",
            get(notifications::get)
                .patch(notifications::update)
                .delete(notifications::deactivate),
        )
        .route("/:id/schedule", post(notifications::schedule))
        .route("/:id/send", post(notifications::send))
        .route("/:id/cancel", post(notifications::cancel))
        .route("/:id/read", post(notifications::mark_read))
        .route("/:id/action", post(notifications::mark_action));

    let api_routes = Router::new()
        .nest("/reservations", reservation_routes)
        .nest("/driver-bookings", driver_booking_routes)
        .nest("/payments", payment_routes)
        .nest("/chats", chat_routes)
        .nest("/notifications", notification_routes)
        .route(
            "/vehicle-trackers",
            post(tracking::register_tracker).get(tracking::list_trackers),
        )
        .route(
            "/vehicle-trackers/:id",
            get(tracking::get_tracker)
                .patch(tracking::update_tracker)
                .delete(tracking::delete_tracker),
        )
        .route("/device/login", post(tracking::device_login))
        .route("/device/attach", post(tracking::device_attach))
        .route("/device/detach", post(tracking::device_detach))
        .route("/device/location", post(tracking::device_location))
        .route("/vehicle/:id/location", get(tracking::vehicle_location));

    Router::new()
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .route("/ws/chat", get(chat_socket))
        .route("/ws/tracking", get(tracking_socket))
        .nest("/api/v1", api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(correlation_id))
        .with_state(state)
}
