//! Notification endpoints.
//!
//! Staff:
//! - POST /api/v1/notifications - Author (draft, scheduled or sent now)
//! - GET /api/v1/notifications?status&include_inactive - List
//! - PATCH /api/v1/notifications/:id - Edit a draft or scheduled notification
//! - DELETE /api/v1/notifications/:id - Deactivate
//! - POST /api/v1/notifications/:id/{schedule,send,cancel}
//!
//! Any user:
//! - GET /api/v1/notifications/mine - Visible notifications with the caller's ack
//! - GET /api/v1/notifications/unread-count
//! - GET /api/v1/notifications/:id
//! - POST /api/v1/notifications/:id/{read,action}

use axum::{
    Json,
    extract::{Path, Query, State},
};
use carhire_core::repository::NotificationFilter;
use carhire_core::types::{Notification, NotificationId, NotificationStatus};
use carhire_web::{ApiResponse, WebResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::auth::AuthUser;
use crate::notification::{NewNotification, NotificationUpdate, NotificationView};
use crate::server::AppState;

/// Staff listing filter.
#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    /// Only this status.
    pub status: Option<NotificationStatus>,
    /// Include deactivated notifications.
    #[serde(default)]
    pub include_inactive: bool,
}

/// Body of a schedule request.
#[derive(Debug, Deserialize)]
pub struct ScheduleRequest {
    /// Release time.
    pub send_at: DateTime<Utc>,
}

/// Body of an action acknowledgement.
#[derive(Debug, Default, Deserialize)]
pub struct ActionRequest {
    /// Action the user took, e.g. `opened_booking`.
    pub action: Option<String>,
}

/// Unread counter.
#[derive(Debug, Serialize)]
pub struct UnreadCount {
    /// Visible notifications without a read receipt.
    pub unread: usize,
}

/// Author a notification.
pub async fn create(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    Json(input): Json<NewNotification>,
) -> WebResult<ApiResponse<Notification>> {
    let notification = state.notifications.create(&principal, input).await?;
    Ok(ApiResponse::created(notification))
}

/// Staff listing.
pub async fn list(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    Query(query): Query<ListQuery>,
) -> WebResult<ApiResponse<Vec<Notification>>> {
    let filter = NotificationFilter {
        status: query.status,
        include_inactive: query.include_inactive,
    };
    Ok(ApiResponse::ok(state.notifications.list(&principal, filter).await?))
}

/// What the caller can see now.
pub async fn mine(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
) -> WebResult<ApiResponse<Vec<NotificationView>>> {
    Ok(ApiResponse::ok(
        state.notifications.list_for_user(&principal).await?,
    ))
}

/// How many visible notifications are unread.
pub async fn unread_count(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
) -> WebResult<ApiResponse<UnreadCount>> {
    let unread = state.notifications.unread_count(&principal).await?;
    Ok(ApiResponse::ok(UnreadCount { unread }))
}

/// One notification.
pub async fn get(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    Path(id): Path<NotificationId>,
) -> WebResult<ApiResponse<NotificationView>> {
    Ok(ApiResponse::ok(state.notifications.get(&principal, id).await?))
}

/// Edit a draft or scheduled notification.
pub async fn update(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    Path(id): Path<NotificationId>,
    Json(changes): Json<NotificationUpdate>,
) -> WebResult<ApiResponse<Notification>> {
    let notification = state.notifications.update(&principal, id, changes).await?;
    Ok(ApiResponse::ok(notification))
}

/// Soft delete.
pub async fn deactivate(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    Path(id): Path<NotificationId>,
) -> WebResult<ApiResponse<Notification>> {
    Ok(ApiResponse::ok(
        state.notifications.deactivate(&principal, id).await?,
    ))
}

/// Schedule for later.
pub async fn schedule(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    Path(id): Path<NotificationId>,
    Json(request): Json<ScheduleRequest>,
) -> WebResult<ApiResponse<Notification>> {
    let notification = state
        .notifications
        .schedule(&principal, id, request.send_at)
        .await?;
    Ok(ApiResponse::ok(notification))
}

/// Deliver now.
pub async fn send(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    Path(id): Path<NotificationId>,
) -> WebResult<ApiResponse<Notification>> {
    Ok(ApiResponse::ok(state.notifications.send_now(&principal, id).await?))
}

/// Withdraw before delivery.
pub async fn cancel(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    Path(id): Path<NotificationId>,
) -> WebResult<ApiResponse<Notification>> {
    Ok(ApiResponse::ok(state.notifications.cancel(&principal, id).await?))
}

/// Read receipt.
pub async fn mark_read(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    Path(id): Path<NotificationId>,
) -> WebResult<ApiResponse<NotificationView>> {
    Ok(ApiResponse::ok(
        state.notifications.mark_read(&principal, id).await?,
    ))
}

/// Action acknowledgement.
pub async fn mark_action(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    Path(id): Path<NotificationId>,
    body: Option<Json<ActionRequest>>,
) -> WebResult<ApiResponse<NotificationView>> {
    let action = body.and_then(|Json(b)| b.action);
    Ok(ApiResponse::ok(
        state.notifications.mark_action(&principal, id, action).await?,
    ))
}
