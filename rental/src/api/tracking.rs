//! Tracker administration and device endpoints.
//!
//! Admin (manager/admin):
//! - POST /api/v1/vehicle-trackers - Register a tracker
//! - GET /api/v1/vehicle-trackers - List
//! - GET/PATCH/DELETE /api/v1/vehicle-trackers/:id
//!
//! Device (device token, except login):
//! - POST /api/v1/device/login - Exchange a device id for a token
//! - POST /api/v1/device/attach - Bind to a vehicle
//! - POST /api/v1/device/detach - Unbind
//! - POST /api/v1/device/location - Report a fix over REST
//!
//! Readers:
//! - GET /api/v1/vehicle/:id/location - Last known location

use axum::{
    Json,
    extract::{Path, State},
};
use carhire_core::types::{TrackerId, VehicleId, VehicleTracker};
use carhire_web::{ApiResponse, WebResult};
use serde::{Deserialize, Serialize};

use crate::auth::{AuthTracker, AuthUser};
use crate::tracking::{DeviceSession, LocationReport, NewTracker, TrackerUpdate, VehicleLocation};
use crate::server::AppState;

/// Device login body.
#[derive(Debug, Deserialize)]
pub struct DeviceLogin {
    /// Hardware id.
    pub device_id: String,
}

/// Device attach body.
#[derive(Debug, Deserialize)]
pub struct AttachRequest {
    /// Vehicle to bind to.
    pub vehicle_id: VehicleId,
}

/// Result of a detach.
#[derive(Debug, Serialize)]
pub struct Detached {
    /// The tracker after the change.
    pub tracker: VehicleTracker,
    /// Vehicle it left, if it was attached.
    pub vehicle_id: Option<VehicleId>,
}

/// Register a tracker.
pub async fn register_tracker(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    Json(input): Json<NewTracker>,
) -> WebResult<ApiResponse<VehicleTracker>> {
    let tracker = state.realtime.tracking.register(&principal, input).await?;
    Ok(ApiResponse::created(tracker))
}

/// Every tracker.
pub async fn list_trackers(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
) -> WebResult<ApiResponse<Vec<VehicleTracker>>> {
    Ok(ApiResponse::ok(state.realtime.tracking.list(&principal).await?))
}

/// One tracker.
pub async fn get_tracker(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    Path(id): Path<TrackerId>,
) -> WebResult<ApiResponse<VehicleTracker>> {
    Ok(ApiResponse::ok(state.realtime.tracking.get(&principal, id).await?))
}

/// Change label or status.
pub async fn update_tracker(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    Path(id): Path<TrackerId>,
    Json(input): Json<TrackerUpdate>,
) -> WebResult<ApiResponse<VehicleTracker>> {
    let tracker = state.realtime.tracking.update(&principal, id, input).await?;
    Ok(ApiResponse::ok(tracker))
}

/// Remove a tracker.
pub async fn delete_tracker(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    Path(id): Path<TrackerId>,
) -> WebResult<ApiResponse<TrackerId>> {
    state.realtime.tracking.delete(&principal, id).await?;
    state.realtime.fabric.move_device(id, None);
    Ok(ApiResponse::ok(id))
}

/// Device login.
pub async fn device_login(
    State(state): State<AppState>,
    Json(login): Json<DeviceLogin>,
) -> WebResult<ApiResponse<DeviceSession>> {
    Ok(ApiResponse::ok(
        state.realtime.tracking.login(&login.device_id).await?,
    ))
}

/// Bind the calling tracker to a vehicle.
pub async fn device_attach(
    State(state): State<AppState>,
    AuthTracker(tracker): AuthTracker,
    Json(request): Json<AttachRequest>,
) -> WebResult<ApiResponse<VehicleTracker>> {
    let tracker = state
        .realtime
        .attach_tracker(tracker, request.vehicle_id)
        .await?;
    Ok(ApiResponse::ok(tracker))
}

/// Unbind the calling tracker.
pub async fn device_detach(
    State(state): State<AppState>,
    AuthTracker(tracker): AuthTracker,
) -> WebResult<ApiResponse<Detached>> {
    let (tracker, vehicle_id) = state.realtime.detach_tracker(tracker).await?;
    Ok(ApiResponse::ok(Detached {
        tracker,
        vehicle_id,
    }))
}

/// Report a fix.
pub async fn device_location(
    State(state): State<AppState>,
    AuthTracker(tracker): AuthTracker,
    Json(report): Json<LocationReport>,
) -> WebResult<ApiResponse<VehicleTracker>> {
    let tracker = state
        .realtime
        .tracking
        .record_location(tracker, report)
        .await?;
    Ok(ApiResponse::ok(tracker))
}

/// Last known location of a vehicle.
pub async fn vehicle_location(
    State(state): State<AppState>,
    AuthUser(_): AuthUser,
    Path(vehicle): Path<VehicleId>,
) -> WebResult<ApiResponse<VehicleLocation>> {
    Ok(ApiResponse::ok(
        state.realtime.tracking.last_known(vehicle).await?,
    ))
}
