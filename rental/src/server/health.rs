//! Readiness for the carhire server.
//!
//! Liveness is [`carhire_web::health::health_check`]; readiness checks the
//! repositories.

use axum::{Json, extract::State, http::StatusCode};
use carhire_web::health::{ComponentHealth, ReadinessReport, readiness};

use super::state::AppState;

/// Readiness check endpoint.
///
/// ```bash
/// curl http://localhost:8080/ready
/// # {"status":"ready","components":[{"component":"store","healthy":true}]}
/// ```
pub async fn readiness_check(State(state): State<AppState>) -> (StatusCode, Json<ReadinessReport>) {
    let store_ok = state.store.is_healthy();
    readiness(vec![ComponentHealth {
        component: "store",
        healthy: store_ok,
        message: (!store_ok).then(|| "a table lock is poisoned".to_string()),
    }])
}
