//! Axum integration for the carhire services.
//!
//! # Request Flow
//!
//! 1. **Correlation** middleware assigns an id and opens the `http_request` span
//! 2. **Extract** data from the request (JSON, path, bearer token)
//! 3. **Call** a domain service
//! 4. **Map** the result: `Ok` into [`ApiResponse`], `Err(DomainError)` into [`AppError`]
//!
//! # Example
//!
//! ```ignore
//! use carhire_web::{ApiResponse, WebResult};
//!
//! async fn get_reservation(
//!     State(state): State<AppState>,
//!     caller: Caller,
//!     Path(id): Path<ReservationId>,
//! ) -> WebResult<ApiResponse<Reservation>> {
//!     let reservation = state.reservations.get(&caller.principal, id).await?;
//!     Ok(ApiResponse::ok(reservation))
//! }
//! ```

#![allow(clippy::module_name_repetitions)]

pub mod error;
pub mod extractors;
pub mod health;
pub mod middleware;
pub mod response;
pub mod token;

// Re-export key types for convenience
pub use error::AppError;
pub use extractors::{BearerToken, CorrelationId};
pub use middleware::{CORRELATION_ID_HEADER, correlation_id};
pub use response::ApiResponse;
pub use token::{Authenticated, TokenError, TokenService};

/// Result type alias for web handlers.
pub type WebResult<T> = Result<T, AppError>;
