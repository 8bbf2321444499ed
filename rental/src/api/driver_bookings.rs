//! Driver booking endpoints.
//!
//! Customer sub-tree:
//! - POST /api/v1/driver-bookings/customer - Request a driver
//! - GET /api/v1/driver-bookings/customer - Own bookings
//! - POST /api/v1/driver-bookings/customer/:id/cancel - Cancel
//!
//! Driver sub-tree:
//! - GET /api/v1/driver-bookings/driver - Assigned bookings
//! - POST /api/v1/driver-bookings/driver/:id/{accept,decline,cancel,complete}
//!
//! Shared:
//! - GET /api/v1/driver-bookings/admin - Every booking (manager/admin)
//! - GET /api/v1/driver-bookings/:id - Booking with both parties
//!
//! Status filters accept `awaiting_payment` as an alias of accepted bookings.

use axum::{
    Json,
    extract::{Path, Query, State},
};
use carhire_core::types::{DriverBooking, DriverBookingId};
use carhire_web::{ApiResponse, WebResult};

use super::ReasonBody;
use crate::auth::AuthUser;
use crate::booking::{DriverBookingDetails, DriverBookingRequest, DriverListQuery};
use crate::server::AppState;

fn reason(body: Option<Json<ReasonBody>>) -> Option<String> {
    body.and_then(|Json(b)| b.reason)
}

/// Request a driver.
pub async fn request_driver(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    Json(request): Json<DriverBookingRequest>,
) -> WebResult<ApiResponse<DriverBooking>> {
    let booking = state.drivers.request(&principal, request).await?;
    Ok(ApiResponse::created(booking))
}

/// The caller's bookings as a customer.
pub async fn list_for_customer(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    Query(query): Query<DriverListQuery>,
) -> WebResult<ApiResponse<Vec<DriverBooking>>> {
    Ok(ApiResponse::ok(
        state.drivers.list_for_customer(&principal, query).await?,
    ))
}

/// Customer cancellation.
pub async fn cancel_by_customer(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    Path(id): Path<DriverBookingId>,
    body: Option<Json<ReasonBody>>,
) -> WebResult<ApiResponse<DriverBooking>> {
    let booking = state
        .drivers
        .cancel_by_customer(&principal, id, reason(body))
        .await?;
    Ok(ApiResponse::ok(booking))
}

/// Bookings assigned to the calling driver.
pub async fn list_for_driver(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    Query(query): Query<DriverListQuery>,
) -> WebResult<ApiResponse<Vec<DriverBooking>>> {
    Ok(ApiResponse::ok(
        state.drivers.list_for_driver(&principal, query).await?,
    ))
}

/// Driver accepts; the payment window opens.
pub async fn accept(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    Path(id): Path<DriverBookingId>,
) -> WebResult<ApiResponse<DriverBooking>> {
    Ok(ApiResponse::ok(state.drivers.accept(&principal, id).await?))
}

/// Driver declines.
pub async fn decline(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    Path(id): Path<DriverBookingId>,
    body: Option<Json<ReasonBody>>,
) -> WebResult<ApiResponse<DriverBooking>> {
    let booking = state.drivers.decline(&principal, id, reason(body)).await?;
    Ok(ApiResponse::ok(booking))
}

/// Driver cancels a confirmed booking.
pub async fn cancel_by_driver(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    Path(id): Path<DriverBookingId>,
    body: Option<Json<ReasonBody>>,
) -> WebResult<ApiResponse<DriverBooking>> {
    let booking = state
        .drivers
        .cancel_by_driver(&principal, id, reason(body))
        .await?;
    Ok(ApiResponse::ok(booking))
}

/// Driver marks the trip done.
pub async fn complete(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    Path(id): Path<DriverBookingId>,
) -> WebResult<ApiResponse<DriverBooking>> {
    Ok(ApiResponse::ok(state.drivers.complete(&principal, id).await?))
}

/// Every booking, for managers and admins.
pub async fn list_all(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    Query(query): Query<DriverListQuery>,
) -> WebResult<ApiResponse<Vec<DriverBooking>>> {
    Ok(ApiResponse::ok(state.drivers.list_all(&principal, query).await?))
}

/// A booking with driver profile and both parties.
pub async fn details(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    Path(id): Path<DriverBookingId>,
) -> WebResult<ApiResponse<DriverBookingDetails>> {
    Ok(ApiResponse::ok(state.drivers.details(&principal, id).await?))
}
