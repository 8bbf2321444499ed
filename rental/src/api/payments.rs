//! Payment endpoints.
//!
//! - POST /api/v1/payments/initiate - Start a card, bank or cash payment
//! - POST /api/v1/payments/mobile - Start a wallet (push to phone) payment
//! - GET /api/v1/payments/:id/status - Stored status
//! - POST /api/v1/payments/:id/poll - Ask the gateway, then apply
//! - POST /api/v1/payments/:id/apply-promo - Apply a promo to a pending payment
//! - DELETE /api/v1/payments/:id/promo - Remove it again
//! - POST /api/v1/payments/:id/refund - Record a refund (manager/admin)
//! - POST /api/v1/payments/:id/cancel - Local cancel
//! - POST /api/v1/payments/:id/cash-received - Staff confirm counter cash
//! - POST /api/v1/payments/webhook/paynow - Gateway callback (public)
//!
//! # Payment Flow
//!
//! 1. **Initiate**: the booking must be awaiting payment; a promo may reduce the amount
//! 2. **Gateway**: the payer follows `redirect_url` or confirms on the phone
//! 3. **Reconcile**: webhook, explicit poll or the periodic sweep moves the status
//! 4. **Capture**: `paid` confirms the booking and redeems the promo

use std::collections::BTreeMap;

use axum::{
    Json,
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, header},
};
use carhire_core::error::DomainError;
use carhire_core::types::{Payment, PaymentId};
use carhire_web::{ApiResponse, WebResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::auth::AuthUser;
use crate::payment::{
    InitiatePayment, PaymentReceipt, PromoApplication, RefundRequest, WebhookOutcome,
};
use crate::server::AppState;

/// Body of a promo application.
#[derive(Debug, Deserialize)]
pub struct PromoRequest {
    /// Promo code, matched case-insensitively.
    pub code: String,
}

/// Webhook acknowledgement.
#[derive(Debug, Serialize)]
pub struct WebhookAck {
    /// What intake did.
    pub outcome: WebhookOutcome,
}

/// Start a payment.
pub async fn initiate(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    Json(request): Json<InitiatePayment>,
) -> WebResult<ApiResponse<PaymentReceipt>> {
    let receipt = state.payments.initiate(&principal, request).await?;
    Ok(ApiResponse::created(receipt))
}

/// Start a wallet payment; the payer phone is mandatory for these.
pub async fn initiate_mobile(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    Json(request): Json<InitiatePayment>,
) -> WebResult<ApiResponse<PaymentReceipt>> {
    if !request.method.is_mobile() {
        return Err(DomainError::invalid_input("mobile payments need a wallet method").into());
    }
    let receipt = state.payments.initiate(&principal, request).await?;
    Ok(ApiResponse::created(receipt))
}

/// Stored payment.
pub async fn status(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    Path(id): Path<PaymentId>,
) -> WebResult<ApiResponse<Payment>> {
    Ok(ApiResponse::ok(state.payments.get(&principal, id).await?))
}

/// Poll the gateway for a fresh status.
pub async fn poll(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    Path(id): Path<PaymentId>,
) -> WebResult<ApiResponse<Payment>> {
    Ok(ApiResponse::ok(state.payments.poll(&principal, id).await?))
}

/// Apply a promo to a pending payment.
pub async fn apply_promo(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    Path(id): Path<PaymentId>,
    Json(request): Json<PromoRequest>,
) -> WebResult<ApiResponse<PromoApplication>> {
    let applied = state
        .payments
        .apply_promo(&principal, id, &request.code)
        .await?;
    Ok(ApiResponse::ok(applied))
}

/// Drop the promo from a pending payment.
pub async fn remove_promo(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    Path(id): Path<PaymentId>,
) -> WebResult<ApiResponse<Payment>> {
    Ok(ApiResponse::ok(state.payments.remove_promo(&principal, id).await?))
}

/// Record a refund against a paid payment.
pub async fn refund(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    Path(id): Path<PaymentId>,
    Json(request): Json<RefundRequest>,
) -> WebResult<ApiResponse<Payment>> {
    Ok(ApiResponse::ok(state.payments.refund(&principal, id, request).await?))
}

/// Cancel locally; the gateway is not told.
pub async fn cancel(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    Path(id): Path<PaymentId>,
) -> WebResult<ApiResponse<Payment>> {
    Ok(ApiResponse::ok(state.payments.cancel(&principal, id).await?))
}

/// Staff confirm a cash payment.
pub async fn cash_received(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    Path(id): Path<PaymentId>,
) -> WebResult<ApiResponse<Payment>> {
    Ok(ApiResponse::ok(
        state.payments.mark_cash_received(&principal, id).await?,
    ))
}

/// Gateway status callback. Always answers 200 so the gateway stops
/// retrying; what happened is in the outcome and the logs.
pub async fn paynow_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResponse<WebhookAck> {
    let outcome = match webhook_fields(&headers, &body) {
        Some(fields) => state.webhook.handle(fields).await,
        None => {
            tracing::warn!(bytes = body.len(), "Unreadable webhook body");
            WebhookOutcome::Rejected
        }
    };
    ApiResponse::ok(WebhookAck { outcome })
}

/// Flatten a form or JSON body into string fields.
fn webhook_fields(headers: &HeaderMap, body: &[u8]) -> Option<BTreeMap<String, String>> {
    let is_json = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("application/json"));
    if is_json {
        let object: BTreeMap<String, Value> = serde_json::from_slice(body).ok()?;
        Some(
            object
                .into_iter()
                .map(|(k, v)| {
                    let text = match v {
                        Value::String(s) => s,
                        Value::Null => String::new(),
                        other => other.to_string(),
                    };
                    (k, text)
                })
                .collect(),
        )
    } else {
        serde_urlencoded::from_bytes::<Vec<(String, String)>>(body)
            .ok()
            .map(|pairs| pairs.into_iter().collect())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn form_bodies_are_decoded() {
        let fields = webhook_fields(
            &HeaderMap::new(),
            b"reference=RSV-1&paynowreference=991&status=Paid&hash=ABC",
        )
        .unwrap();
        assert_eq!(fields["status"], "Paid");
        assert_eq!(fields["paynowreference"], "991");
    }

    #[test]
    fn json_bodies_stringify_scalars() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json; charset=utf-8"),
        );
        let fields = webhook_fields(
            &headers,
            br#"{"reference":"RSV-1","amount":45.5,"status":"Paid","pollurl":null}"#,
        )
        .unwrap();
        assert_eq!(fields["amount"], "45.5");
        assert_eq!(fields["pollurl"], "");
    }

    #[test]
    fn malformed_json_is_unreadable() {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
        assert!(webhook_fields(&headers, b"{not json").is_none());
    }
}
