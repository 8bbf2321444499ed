//! Health check endpoints.
//!
//! These endpoints are used by load balancers and monitoring systems
//! to verify service health.

use axum::{Json, http::StatusCode};
use serde::Serialize;

/// Liveness probe.
///
/// ```text
/// GET /health  ->  200 {"status":"ok"}
/// ```
#[allow(clippy::unused_async)]
pub async fn health_check() -> (StatusCode, Json<serde_json::Value>) {
    (StatusCode::OK, Json(serde_json::json!({ "status": "ok" })))
}

/// Result of one readiness check.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ComponentHealth {
    /// Component name.
    pub component: &'static str,
    /// Whether it is usable.
    pub healthy: bool,
    /// Optional detail.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Aggregate readiness report.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ReadinessReport {
    /// `ready` or `not_ready`.
    pub status: &'static str,
    /// Individual checks.
    pub components: Vec<ComponentHealth>,
}

/// Build the readiness response: 200 when every component is healthy, else 503.
#[must_use]
pub fn readiness(components: Vec<ComponentHealth>) -> (StatusCode, Json<ReadinessReport>) {
    let ready = components.iter().all(|c| c.healthy);
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (
        status,
        Json(ReadinessReport {
            status: if ready { "ready" } else { "not_ready" },
            components,
        }),
    )
}
