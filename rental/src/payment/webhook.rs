//! Gateway status callbacks.
//!
//! The gateway retries until it sees a success response, so intake never
//! fails outward: every discrepancy is logged and classified as a
//! [`WebhookOutcome`]. When the payment has a poll URL a fresh poll decides
//! the status; the payload's own status is used only as a fallback and only
//! when its hash verifies. Payments settled by staff are never moved by a
//! callback.

use std::collections::BTreeMap;
use std::sync::Arc;

use carhire_core::error::DomainResult;
use carhire_core::gateway::PaymentGateway;
use carhire_core::types::{Payment, PaymentProvider, PaymentStatus, StatusChange};
use serde::Serialize;

use super::orchestrator::PaymentOrchestrator;
use crate::metrics;

/// What intake did with a callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WebhookOutcome {
    /// The payment moved forward.
    Applied,
    /// Known payment, nothing to change.
    Unchanged,
    /// No payment matches the references.
    UnknownPayment,
    /// Untrusted payload and no way to verify by polling, or a manual payment.
    Rejected,
}

impl WebhookOutcome {
    /// Metric label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Applied => "applied",
            Self::Unchanged => "unchanged",
            Self::UnknownPayment => "unknown_payment",
            Self::Rejected => "rejected",
        }
    }
}

/// Applies gateway callbacks through the orchestrator.
#[derive(Clone)]
pub struct WebhookIntake {
    orchestrator: PaymentOrchestrator,
    gateway: Arc<dyn PaymentGateway>,
}

impl WebhookIntake {
    /// Intake over the orchestrator and the gateway that signs callbacks.
    #[must_use]
    pub fn new(orchestrator: PaymentOrchestrator, gateway: Arc<dyn PaymentGateway>) -> Self {
        Self {
            orchestrator,
            gateway,
        }
    }

    /// Handle one callback payload. Keys are matched case-insensitively.
    pub async fn handle(&self, fields: BTreeMap<String, String>) -> WebhookOutcome {
        let fields: BTreeMap<String, String> = fields
            .into_iter()
            .map(|(k, v)| (k.to_ascii_lowercase(), v.trim().to_string()))
            .collect();
        let outcome = match self.process(&fields).await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!(error = %e, code = e.code(), "Webhook processing failed");
                WebhookOutcome::Unchanged
            }
        };
        metrics::record_webhook(outcome.as_str());
        outcome
    }

    async fn process(&self, fields: &BTreeMap<String, String>) -> DomainResult<WebhookOutcome> {
        let provider_ref = fields.get("paynowreference").map(String::as_str);
        let reference = fields.get("reference").map(String::as_str);
        let reported = fields.get("status").map(String::as_str);

        let signed = self.gateway.verify_callback(fields);
        match signed {
            Some(false) => {
                tracing::warn!(?provider_ref, ?reference, "Webhook hash mismatch, payload status ignored");
            }
            None => tracing::warn!(?provider_ref, ?reference, "Unsigned webhook"),
            Some(true) => {}
        }

        let Some(payment) = self
            .orchestrator
            .find_by_reference(provider_ref, reference)
            .await?
        else {
            tracing::warn!(?provider_ref, ?reference, ?reported, "Webhook for unknown payment");
            return Ok(WebhookOutcome::UnknownPayment);
        };

        if payment.provider == PaymentProvider::Manual {
            tracing::warn!(payment_id = %payment.id, ?reported, "Webhook for a manually settled payment");
            return Ok(WebhookOutcome::Rejected);
        }

        if payment.status.is_terminal() {
            tracing::debug!(payment_id = %payment.id, status = %payment.status, "Webhook for settled payment");
            return Ok(WebhookOutcome::Unchanged);
        }

        if payment.poll_url.is_some() {
            let before = payment.status;
            let id = payment.id;
            match self.orchestrator.reconcile(payment.clone()).await {
                Ok(after) => return Ok(advanced(before, &after)),
                Err(e) => {
                    tracing::warn!(payment_id = %id, error = %e, "Webhook poll failed, using payload status");
                }
            }
        }

        if signed != Some(true) {
            return Ok(WebhookOutcome::Rejected);
        }
        let Some(text) = reported else {
            return Ok(WebhookOutcome::Unchanged);
        };
        let next = PaymentStatus::from_provider_text(text);
        if next == PaymentStatus::Pending && !text.to_ascii_lowercase().contains("unpaid") {
            tracing::warn!(payment_id = %payment.id, status = text, "Unrecognised webhook status");
        }
        let (_, change) = self.orchestrator.apply_status(payment.id, next).await?;
        Ok(match change {
            StatusChange::Advanced { .. } => WebhookOutcome::Applied,
            StatusChange::Unchanged => WebhookOutcome::Unchanged,
        })
    }
}

fn advanced(before: PaymentStatus, after: &Payment) -> WebhookOutcome {
    if after.status == before {
        WebhookOutcome::Unchanged
    } else {
        WebhookOutcome::Applied
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::availability::AvailabilityIndex;
    use crate::booking::{
        BookingCodeGenerator, Bookings, DriverBookingCoordinator, DriverBookingRequest,
        ReservationCoordinator,
    };
    use crate::config::BookingConfig;
    use crate::payment::{GatewayTimeouts, InitiatePayment};
    use crate::promo::PromoEvaluator;
    use crate::store::MemoryStore;
    use carhire_core::gateway::GatewayError;
    use carhire_core::repository::{PaymentRepository, UserRepository};
    use carhire_core::types::{Currency, DriverBookingId, PaymentMethod, Principal, Role};
    use carhire_runtime::RetryPolicy;
    use carhire_testing::gateway::ScriptedGateway;
    use carhire_testing::recorders::RecordingBroadcaster;
    use carhire_testing::{ManualClock, SequentialIdGenerator, at, fixtures};
    use rust_decimal_macros::dec;

    struct Harness {
        intake: WebhookIntake,
        store: Arc<MemoryStore>,
        gateway: ScriptedGateway,
        clock: Arc<ManualClock>,
        customer: Principal,
        booking: DriverBookingId,
        payment: Payment,
    }

    fn callback(payment: &Payment, status: &str) -> BTreeMap<String, String> {
        BTreeMap::from([
            ("Reference".to_string(), payment.merchant_reference.clone()),
            ("PaynowReference".to_string(), ScriptedGateway::provider_ref_for(&payment.merchant_reference)),
            ("Amount".to_string(), payment.amount.to_string()),
            ("Status".to_string(), status.to_string()),
            ("Hash".to_string(), "ABC".to_string()),
        ])
    }

    async fn harness() -> Harness {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(at("2025-03-01T09:00:00Z")));
        let ids = Arc::new(SequentialIdGenerator::new());
        let broadcaster = Arc::new(RecordingBroadcaster::new());
        let gateway = ScriptedGateway::new();

        let customer = fixtures::user(1, &[Role::Customer]);
        let driver = fixtures::user(2, &[Role::Driver]);
        UserRepository::insert(store.as_ref(), customer.clone()).await.unwrap();
        UserRepository::insert(store.as_ref(), driver.clone()).await.unwrap();
        store
            .upsert_driver_profile(fixtures::driver_profile(&driver, dec!(20)))
            .await
            .unwrap();

        let availability = AvailabilityIndex::new(store.clone(), store.clone());
        let codes = Arc::new(BookingCodeGenerator::with_seed(0));
        let bookings = Bookings {
            reservations: ReservationCoordinator::new(
                store.clone(),
                availability.clone(),
                codes.clone(),
                clock.clone(),
                ids.clone(),
                broadcaster.clone(),
            ),
            drivers: DriverBookingCoordinator::new(
                store.clone(),
                store.clone(),
                availability,
                codes,
                clock.clone(),
                ids.clone(),
                broadcaster.clone(),
                BookingConfig::default(),
            ),
        };
        let orchestrator = PaymentOrchestrator::new(
            store.clone(),
            Arc::new(bookings.clone()),
            PromoEvaluator::new(store.clone()),
            Arc::new(gateway.clone()),
            clock.clone(),
            ids,
            broadcaster,
            GatewayTimeouts::default(),
        )
        .with_poll_policy(RetryPolicy::none());

        let customer = fixtures::principal(&customer);
        let booking = bookings
            .drivers
            .request(
                &customer,
                DriverBookingRequest {
                    driver_id: fixtures::user_id(2),
                    pickup_location: "Airport".into(),
                    dropoff_location: None,
                    start_at: at("2025-03-01T10:00:00Z"),
                    end_at: None,
                    hours_requested: 4,
                    notes: None,
                },
            )
            .await
            .unwrap();
        bookings
            .drivers
            .accept(&fixtures::principal(&driver), booking.id)
            .await
            .unwrap();
        let payment = orchestrator
            .initiate(&customer, pay(booking.id))
            .await
            .unwrap()
            .payment;

        Harness {
            intake: WebhookIntake::new(orchestrator, Arc::new(gateway.clone())),
            store,
            gateway,
            clock,
            customer,
            booking: booking.id,
            payment,
        }
    }

    async fn stored(h: &Harness) -> Payment {
        PaymentRepository::get(h.store.as_ref(), h.payment.id)
            .await
            .unwrap()
            .unwrap()
    }

    fn pay(id: DriverBookingId) -> InitiatePayment {
        InitiatePayment {
            reservation_id: None,
            driver_booking_id: Some(id),
            amount: dec!(80),
            currency: Currency::Usd,
            method: PaymentMethod::Card,
            promo_code: None,
            payer_email: None,
            payer_phone: None,
            replace_active: false,
        }
    }

    #[tokio::test]
    async fn replayed_paid_webhook_is_idempotent() {
        let h = harness().await;
        let poll_url = ScriptedGateway::poll_url_for(&h.payment.merchant_reference);
        h.gateway.set_status(&poll_url, "Paid");

        h.clock.set(at("2025-03-01T09:10:00Z"));
        let first = h.intake.handle(callback(&h.payment, "Paid")).await;
        assert_eq!(first, WebhookOutcome::Applied);
        let paid = stored(&h).await;
        assert_eq!(paid.status, PaymentStatus::Paid);
        assert_eq!(paid.captured_at, Some(at("2025-03-01T09:10:00Z")));

        h.clock.set(at("2025-03-01T09:20:00Z"));
        let replay = h.intake.handle(callback(&h.payment, "Paid")).await;
        assert_eq!(replay, WebhookOutcome::Unchanged);
        let after = stored(&h).await;
        assert_eq!(after, paid);
    }

    #[tokio::test]
    async fn poll_wins_over_payload() {
        let h = harness().await;
        let outcome = h.intake.handle(callback(&h.payment, "Paid")).await;
        assert_eq!(outcome, WebhookOutcome::Applied);
        let payment = stored(&h).await;
        assert_eq!(payment.status, PaymentStatus::Sent);
    }

    #[tokio::test]
    async fn payload_status_used_when_poll_fails() {
        let h = harness().await;
        h.gateway.fail_next_poll(GatewayError::Timeout);
        let outcome = h.intake.handle(callback(&h.payment, "Cancelled")).await;
        assert_eq!(outcome, WebhookOutcome::Applied);
        let payment = stored(&h).await;
        assert_eq!(payment.status, PaymentStatus::Cancelled);
    }

    #[tokio::test]
    async fn tampered_payload_is_not_trusted() {
        let h = harness().await;
        h.gateway.set_callback_verdict(Some(false));
        h.gateway.fail_next_poll(GatewayError::Unavailable("down".into()));
        let outcome = h.intake.handle(callback(&h.payment, "Paid")).await;
        assert_eq!(outcome, WebhookOutcome::Rejected);
        let payment = stored(&h).await;
        assert_eq!(payment.status, PaymentStatus::Pending);
    }

    #[tokio::test]
    async fn unsigned_payload_is_not_trusted() {
        let h = harness().await;
        h.gateway.fail_next_poll(GatewayError::Timeout);
        let mut fields = callback(&h.payment, "Paid");
        fields.remove("Hash");
        assert_eq!(h.intake.handle(fields).await, WebhookOutcome::Rejected);
        assert_eq!(stored(&h).await.status, PaymentStatus::Pending);
    }

    #[tokio::test]
    async fn cash_payment_cannot_be_settled_by_callback() {
        let h = harness().await;
        let mut cash = pay(h.booking);
        cash.method = PaymentMethod::Cash;
        cash.replace_active = true;
        let cash = h
            .intake
            .orchestrator
            .initiate(&h.customer, cash)
            .await
            .unwrap()
            .payment;
        assert_eq!(cash.provider, PaymentProvider::Manual);

        let unsigned = BTreeMap::from([
            ("Reference".to_string(), cash.merchant_reference.clone()),
            ("Status".to_string(), "Paid".to_string()),
        ]);
        assert_eq!(h.intake.handle(unsigned).await, WebhookOutcome::Rejected);
        let signed = callback(&cash, "Paid");
        assert_eq!(h.intake.handle(signed).await, WebhookOutcome::Rejected);

        let after = PaymentRepository::get(h.store.as_ref(), cash.id).await.unwrap().unwrap();
        assert_eq!(after.status, PaymentStatus::Pending);
        assert!(after.captured_at.is_none());
    }

    #[tokio::test]
    async fn unknown_reference_is_acknowledged() {
        let h = harness().await;
        let mut fields = callback(&h.payment, "Paid");
        fields.insert("Reference".into(), "PAY-missing".into());
        fields.insert("PaynowReference".into(), "PN-missing".into());
        assert_eq!(h.intake.handle(fields).await, WebhookOutcome::UnknownPayment);
    }
}
