//! Domain error taxonomy.
//!
//! Every failure that crosses a service boundary is a [`DomainError`]: a coarse
//! [`ErrorKind`] (which the web layer maps to an HTTP status), a stable
//! machine-readable `code`, a human message and optional structured details.

use serde::Serialize;
use serde_json::Value;
use std::fmt;
use thiserror::Error;

/// Result alias used across the domain.
pub type DomainResult<T> = Result<T, DomainError>;

/// Coarse error classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Missing or ill-typed input, or a violated entity invariant.
    Validation,
    /// No valid credentials.
    Unauthenticated,
    /// Authenticated but not allowed.
    Forbidden,
    /// Referenced entity does not exist.
    NotFound,
    /// Overlap, lost compare-and-set or duplicate unique key.
    Conflict,
    /// Operation illegal from the entity's current status.
    InvalidState,
    /// Storage or gateway unavailable; the caller may retry.
    Transient,
    /// Bug or unexpected condition.
    Internal,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Validation => "validation",
            Self::Unauthenticated => "unauthenticated",
            Self::Forbidden => "forbidden",
            Self::NotFound => "not_found",
            Self::Conflict => "conflict",
            Self::InvalidState => "invalid_state",
            Self::Transient => "transient",
            Self::Internal => "internal",
        };
        f.write_str(name)
    }
}

/// Stable error codes returned to clients.
pub mod codes {
    #![allow(missing_docs)]

    pub const VALIDATION_ERROR: &str = "VALIDATION_ERROR";
    pub const INVALID_TIME_WINDOW: &str = "INVALID_TIME_WINDOW";
    pub const INVALID_PAYMENT_TARGET: &str = "INVALID_PAYMENT_TARGET";
    pub const INVALID_AMOUNT: &str = "INVALID_AMOUNT";
    pub const INVALID_LOCATION: &str = "INVALID_LOCATION";
    pub const MESSAGE_TOO_LONG: &str = "MESSAGE_TOO_LONG";
    pub const EMPTY_MESSAGE: &str = "EMPTY_MESSAGE";

    pub const DRIVER_TIME_CONFLICT: &str = "DRIVER_TIME_CONFLICT";
    pub const VEHICLE_TIME_CONFLICT: &str = "VEHICLE_TIME_CONFLICT";
    pub const DUPLICATE_BOOKING_CODE: &str = "DUPLICATE_BOOKING_CODE";
    pub const DUPLICATE_DEVICE: &str = "DUPLICATE_DEVICE";
    pub const DUPLICATE_EMAIL: &str = "DUPLICATE_EMAIL";
    pub const DUPLICATE_PROMO_CODE: &str = "DUPLICATE_PROMO_CODE";
    pub const PAYMENT_ALREADY_ACTIVE: &str = "PAYMENT_ALREADY_ACTIVE";
    pub const PROMO_USAGE_EXCEEDED: &str = "PROMO_USAGE_EXCEEDED";
    pub const CONCURRENT_UPDATE: &str = "CONCURRENT_UPDATE";

    pub const INVALID_BOOKING_STATUS: &str = "INVALID_BOOKING_STATUS";
    pub const INVALID_RESERVATION_STATUS: &str = "INVALID_RESERVATION_STATUS";
    pub const INVALID_PAYMENT_STATUS: &str = "INVALID_PAYMENT_STATUS";
    pub const INVALID_NOTIFICATION_STATUS: &str = "INVALID_NOTIFICATION_STATUS";
    pub const PAYMENT_WINDOW_EXPIRED: &str = "PAYMENT_WINDOW_EXPIRED";
    pub const REFUND_EXCEEDS_CAPTURED: &str = "REFUND_EXCEEDS_CAPTURED";
    pub const DRIVER_UNAVAILABLE: &str = "DRIVER_UNAVAILABLE";
    pub const TRACKER_DISABLED: &str = "TRACKER_DISABLED";
    pub const CONVERSATION_ARCHIVED: &str = "CONVERSATION_ARCHIVED";

    pub const NOT_A_PARTICIPANT: &str = "NOT_A_PARTICIPANT";
    pub const FORBIDDEN: &str = "FORBIDDEN";
    pub const UNAUTHENTICATED: &str = "UNAUTHENTICATED";

    pub const NOT_FOUND: &str = "NOT_FOUND";
    pub const TRACKER_NOT_FOUND: &str = "TRACKER_NOT_FOUND";

    pub const GATEWAY_UNAVAILABLE: &str = "GATEWAY_UNAVAILABLE";
    pub const STORAGE_UNAVAILABLE: &str = "STORAGE_UNAVAILABLE";
    pub const INTERNAL_ERROR: &str = "INTERNAL_ERROR";
}

/// A classified domain failure.
#[derive(Debug, Clone, Error, PartialEq)]
#[error("[{code}] {message}")]
pub struct DomainError {
    kind: ErrorKind,
    code: String,
    message: String,
    details: Option<Value>,
}

impl DomainError {
    /// Create an error from its parts.
    #[must_use]
    pub fn new(kind: ErrorKind, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            code: code.into(),
            message: message.into(),
            details: None,
        }
    }

    /// Attach structured details.
    #[must_use]
    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Validation failure with a specific code.
    #[must_use]
    pub fn validation(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, code, message)
    }

    /// Generic validation failure.
    #[must_use]
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::validation(codes::VALIDATION_ERROR, message)
    }

    /// Missing entity.
    #[must_use]
    pub fn not_found(resource: impl fmt::Display, id: impl fmt::Display) -> Self {
        Self::new(
            ErrorKind::NotFound,
            codes::NOT_FOUND,
            format!("{resource} with id {id} not found"),
        )
    }

    /// Conflict with a specific code.
    #[must_use]
    pub fn conflict(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Conflict, code, message)
    }

    /// Lost compare-and-set.
    #[must_use]
    pub fn concurrent_update(resource: impl fmt::Display, id: impl fmt::Display) -> Self {
        Self::conflict(
            codes::CONCURRENT_UPDATE,
            format!("{resource} {id} was modified concurrently"),
        )
    }

    /// Illegal transition.
    #[must_use]
    pub fn invalid_state(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidState, code, message)
    }

    /// Caller lacks permission.
    #[must_use]
    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Forbidden, codes::FORBIDDEN, message)
    }

    /// Caller is not authenticated.
    #[must_use]
    pub fn unauthenticated(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unauthenticated, codes::UNAUTHENTICATED, message)
    }

    /// Temporary failure of a collaborator.
    #[must_use]
    pub fn transient(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Transient, code, message)
    }

    /// Storage unavailable.
    #[must_use]
    pub fn storage(message: impl Into<String>) -> Self {
        Self::transient(codes::STORAGE_UNAVAILABLE, message)
    }

    /// Unexpected condition.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, codes::INTERNAL_ERROR, message)
    }

    /// Error kind.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Stable code.
    #[must_use]
    pub fn code(&self) -> &str {
        &self.code
    }

    /// Human-readable message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Structured details, if any.
    #[must_use]
    pub const fn details(&self) -> Option<&Value> {
        self.details.as_ref()
    }

    /// Whether retrying the same call may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self.kind, ErrorKind::Transient)
    }
}
