//! Reservation endpoints.
//!
//! - POST /api/v1/reservations - Create a pending reservation
//! - GET /api/v1/reservations - List (own for customers, filterable for staff)
//! - GET /api/v1/reservations/availability - Check a vehicle window
//! - GET /api/v1/reservations/:id - Get one reservation
//! - PATCH /api/v1/reservations/:id/status - Staff status transition
//! - PATCH /api/v1/reservations/:id/vehicle - Staff vehicle assignment
//! - DELETE /api/v1/reservations/:id - Cancel
//!
//! # Example
//!
//! ```bash
//! curl -X POST http://localhost:8080/api/v1/reservations \
//!   -H "Authorization: Bearer <token>" \
//!   -H "Content-Type: application/json" \
//!   -d '{
//!     "vehicle_model_id": "550e8400-e29b-41d4-a716-446655440000",
//!     "vehicle_id": null,
//!     "pickup": {"branch_id": "<branch uuid>", "at": "2025-03-10T09:00:00Z"},
//!     "dropoff": {"branch_id": "<branch uuid>", "at": "2025-03-12T09:00:00Z"},
//!     "daily_rate": "45.00",
//!     "currency": "USD"
//!   }'
//! ```

use axum::{
    Json,
    extract::{Path, Query, State},
};
use carhire_core::types::{Reservation, ReservationId, ReservationStatus, TimeWindow, VehicleId};
use carhire_web::{ApiResponse, WebResult};
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::auth::AuthUser;
use crate::booking::reservation::AvailabilityReport;
use crate::booking::{NewReservation, ReservationListQuery};
use crate::server::AppState;

/// Query string of the availability check.
#[derive(Debug, Deserialize)]
pub struct AvailabilityQuery {
    /// Vehicle to check.
    pub vehicle_id: VehicleId,
    /// Window start.
    pub start: DateTime<Utc>,
    /// Window end (exclusive).
    pub end: DateTime<Utc>,
    /// Reservation to ignore, when rescheduling.
    pub exclude_id: Option<ReservationId>,
}

/// Body of a status transition.
#[derive(Debug, Deserialize)]
pub struct StatusRequest {
    /// Target status.
    pub status: ReservationStatus,
}

/// Body of a vehicle assignment.
#[derive(Debug, Deserialize)]
pub struct AssignVehicleRequest {
    /// Unit to allocate.
    pub vehicle_id: VehicleId,
}

/// Create a reservation.
pub async fn create_reservation(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    Json(request): Json<NewReservation>,
) -> WebResult<ApiResponse<Reservation>> {
    let reservation = state.reservations.create(&principal, request).await?;
    Ok(ApiResponse::created(reservation))
}

/// List reservations visible to the caller.
pub async fn list_reservations(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    Query(query): Query<ReservationListQuery>,
) -> WebResult<ApiResponse<Vec<Reservation>>> {
    Ok(ApiResponse::ok(state.reservations.list(&principal, query).await?))
}

/// Whether a vehicle is free for a window.
pub async fn check_availability(
    State(state): State<AppState>,
    AuthUser(_): AuthUser,
    Query(query): Query<AvailabilityQuery>,
) -> WebResult<ApiResponse<AvailabilityReport>> {
    let window = TimeWindow::new(query.start, query.end)?;
    let report = state
        .reservations
        .check_availability(query.vehicle_id, window, query.exclude_id)
        .await?;
    Ok(ApiResponse::ok(report))
}

/// One reservation.
pub async fn get_reservation(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    Path(id): Path<ReservationId>,
) -> WebResult<ApiResponse<Reservation>> {
    Ok(ApiResponse::ok(state.reservations.get(&principal, id).await?))
}

/// Move a reservation to another status.
pub async fn update_status(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    Path(id): Path<ReservationId>,
    Json(request): Json<StatusRequest>,
) -> WebResult<ApiResponse<Reservation>> {
    let reservation = state
        .reservations
        .update_status(&principal, id, request.status)
        .await?;
    Ok(ApiResponse::ok(reservation))
}

/// Allocate a specific vehicle.
pub async fn assign_vehicle(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    Path(id): Path<ReservationId>,
    Json(request): Json<AssignVehicleRequest>,
) -> WebResult<ApiResponse<Reservation>> {
    let reservation = state
        .reservations
        .assign_vehicle(&principal, id, request.vehicle_id)
        .await?;
    Ok(ApiResponse::ok(reservation))
}

/// Cancel a pending or confirmed reservation.
pub async fn cancel_reservation(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    Path(id): Path<ReservationId>,
) -> WebResult<ApiResponse<Reservation>> {
    Ok(ApiResponse::ok(state.reservations.cancel(&principal, id).await?))
}
