//! Axum middleware for request tracking.
//!
//! # Flow
//!
//! 1. **Extract** correlation ID from `X-Correlation-ID` header (or generate new UUID)
//! 2. **Store** it in request extensions for handler access
//! 3. **Run** the request inside an `http_request` span carrying the id
//! 4. **Inject** the id into the response `X-Correlation-ID` header
//!
//! # Example
//!
//! ```ignore
//! use axum::{Router, middleware};
//! use carhire_web::middleware::correlation_id;
//!
//! let app = Router::new()
//!     .route("/api/v1/reservations", get(list))
//!     .layer(middleware::from_fn(correlation_id));
//! ```

use axum::{extract::Request, http::HeaderValue, middleware::Next, response::Response};
use tracing::Instrument;
use uuid::Uuid;

use crate::extractors::CorrelationId;

/// Header name for correlation ID.
pub const CORRELATION_ID_HEADER: &str = "X-Correlation-ID";

/// Correlation-id middleware, for `axum::middleware::from_fn`.
pub async fn correlation_id(mut req: Request, next: Next) -> Response {
    let id = req
        .headers()
        .get(CORRELATION_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| Uuid::parse_str(s).ok())
        .unwrap_or_else(Uuid::new_v4);

    req.extensions_mut().insert(CorrelationId(id));

    let span = tracing::info_span!(
        "http_request",
        correlation_id = %id,
        method = %req.method(),
        uri = %req.uri().path(),
    );

    let mut response = next.run(req).instrument(span).await;

    if let Ok(value) = HeaderValue::from_str(&id.to_string()) {
        response.headers_mut().insert(CORRELATION_ID_HEADER, value);
    }
    response
}
