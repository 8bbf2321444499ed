//! External payment gateway seam.
//!
//! The orchestrator only sees this trait. The application crate provides the
//! Paynow HTTP client; tests script responses.

use crate::types::{Currency, PaymentMethod};
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Gateway result
pub type GatewayResult<T> = Result<T, GatewayError>;

/// Boxed gateway future.
pub type GatewayFuture<'a, T> = Pin<Box<dyn Future<Output = GatewayResult<T>> + Send + 'a>>;

/// Gateway error
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GatewayError {
    /// Network failure or 5xx.
    #[error("gateway unavailable: {0}")]
    Unavailable(String),
    /// Call exceeded its time budget.
    #[error("gateway timeout")]
    Timeout,
    /// Gateway refused the request.
    #[error("gateway rejected request: {0}")]
    Rejected(String),
    /// Response could not be understood.
    #[error("invalid gateway response: {0}")]
    InvalidResponse(String),
    /// Response integrity hash did not match.
    #[error("gateway response hash mismatch")]
    HashMismatch,
}

impl GatewayError {
    /// Worth retrying.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_) | Self::Timeout)
    }
}

/// Outbound initiate request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitiateRequest {
    /// Our merchant reference.
    pub reference: String,
    /// Amount to charge.
    pub amount: Decimal,
    /// Currency.
    pub currency: Currency,
    /// Line description shown to the payer.
    pub description: String,
    /// Instrument; `Wallet` selects the mobile flow.
    pub method: PaymentMethod,
    /// Payer email.
    pub payer_email: Option<String>,
    /// Payer phone for mobile flows.
    pub payer_phone: Option<String>,
}

/// Gateway answer to initiate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitiateResponse {
    /// Gateway's reference, when returned.
    pub provider_ref: Option<String>,
    /// URL for status polls.
    pub poll_url: String,
    /// Browser redirect (redirect flow).
    pub redirect_url: Option<String>,
    /// Payer instructions (mobile flow).
    pub instructions: Option<String>,
}

/// Gateway answer to a status poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollResponse {
    /// Raw status text.
    pub status_text: String,
    /// Merchant reference echoed back.
    pub reference: Option<String>,
    /// Gateway reference.
    pub provider_ref: Option<String>,
    /// Amount reported by the gateway.
    pub amount: Option<Decimal>,
}

/// Payment gateway trait
pub trait PaymentGateway: Send + Sync {
    /// Start a payment.
    ///
    /// # Errors
    ///
    /// Returns error if the gateway is unreachable or rejects the request.
    fn initiate(&self, request: InitiateRequest) -> GatewayFuture<'_, InitiateResponse>;

    /// Query current status.
    ///
    /// # Errors
    ///
    /// Returns error if the gateway is unreachable or the response is malformed.
    fn poll(&self, poll_url: String) -> GatewayFuture<'_, PollResponse>;

    /// Verify the integrity hash of a callback payload.
    ///
    /// Returns `None` when the payload carries no hash.
    fn verify_callback(&self, fields: &BTreeMap<String, String>) -> Option<bool>;
}
