//! Payment lifecycle: initiate, reconcile, promo, refund and cancel.
//!
//! Status only moves forward (see [`Payment::apply_status`]) and every write
//! is a versioned update, retried on `CONCURRENT_UPDATE`. Side effects of a
//! capture (booking confirmation, promo redemption) run after the write and
//! are logged rather than propagated, so a replayed status never fails.

use std::sync::Arc;
use std::time::Duration;

use carhire_core::broadcast::{Broadcaster, Namespace, RealtimeEvent, rooms};
use carhire_core::environment::{Clock, IdGenerator};
use carhire_core::error::{DomainError, DomainResult, ErrorKind, codes};
use carhire_core::gateway::{GatewayError, InitiateRequest, PaymentGateway};
use carhire_core::repository::PaymentRepository;
use carhire_core::types::{
    Currency, DriverBookingId, Payment, PaymentId, PaymentMethod, PaymentProvider, PaymentStatus,
    PaymentTarget, Principal, PromoScope, Refund, ReservationId, StatusChange, round_money,
};
use carhire_runtime::{RetryPolicy, bounded_try, retry_with_predicate};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::booking::BookingLedger;
use crate::config::PaynowConfig;
use crate::metrics;
use crate::promo::{PromoContext, PromoEvaluator, PromoOutcome, PromoWarning, payable};

/// A request to pay for one booking.
#[derive(Debug, Clone, Deserialize)]
pub struct InitiatePayment {
    /// Reservation to pay for.
    pub reservation_id: Option<ReservationId>,
    /// Driver booking to pay for.
    pub driver_booking_id: Option<DriverBookingId>,
    /// Amount before any promo.
    pub amount: Decimal,
    /// Currency, which must match the booking.
    pub currency: Currency,
    /// Instrument.
    pub method: PaymentMethod,
    /// Promo code to try.
    pub promo_code: Option<String>,
    /// Payer email passed to the gateway.
    pub payer_email: Option<String>,
    /// Payer phone, required for wallet payments.
    pub payer_phone: Option<String>,
    /// Cancel an active payment on the same booking first.
    #[serde(default)]
    pub replace_active: bool,
}

/// What the payer needs to continue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PaymentReceipt {
    /// The stored payment.
    pub payment: Payment,
    /// Browser redirect for card and bank flows.
    pub redirect_url: Option<String>,
    /// Instructions for wallet and cash flows.
    pub instructions: Option<String>,
    /// Gateway status URL.
    pub poll_url: Option<String>,
    /// Set when the promo code was not applied.
    pub promo_warning: Option<PromoWarning>,
}

/// Result of applying a promo to a pending payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PromoApplication {
    /// The payment after the attempt.
    pub payment: Payment,
    /// Set when the promo code was not applied.
    pub promo_warning: Option<PromoWarning>,
}

/// A refund request.
#[derive(Debug, Clone, Deserialize)]
pub struct RefundRequest {
    /// Amount to refund.
    pub amount: Decimal,
    /// Free-text reason.
    pub reason: Option<String>,
    /// Gateway refund reference, when refunded out of band.
    pub provider_ref: Option<String>,
}

/// Time budgets for gateway calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GatewayTimeouts {
    /// Per call.
    pub call: Duration,
    /// Initiate, end to end.
    pub initiate: Duration,
}

impl Default for GatewayTimeouts {
    fn default() -> Self {
        Self {
            call: Duration::from_secs(10),
            initiate: Duration::from_secs(30),
        }
    }
}

impl From<&PaynowConfig> for GatewayTimeouts {
    fn from(config: &PaynowConfig) -> Self {
        Self {
            call: config.call_timeout,
            initiate: config.initiate_timeout,
        }
    }
}

fn gateway_failure(error: &GatewayError) -> DomainError {
    DomainError::transient(codes::GATEWAY_UNAVAILABLE, error.to_string())
        .with_details(json!({ "retryable": error.is_transient() }))
}

fn is_cas_loss(e: &DomainError) -> bool {
    e.code() == codes::CONCURRENT_UPDATE
}

const fn scope_of(target: PaymentTarget) -> PromoScope {
    match target {
        PaymentTarget::Reservation(_) => PromoScope::Reservation,
        PaymentTarget::DriverBooking(_) => PromoScope::DriverBooking,
    }
}

fn require_pending(payment: &Payment) -> DomainResult<()> {
    if payment.status == PaymentStatus::Pending {
        Ok(())
    } else {
        Err(DomainError::invalid_state(
            codes::INVALID_PAYMENT_STATUS,
            format!("payment is {}, promos only change pending payments", payment.status),
        ))
    }
}

/// Orchestrates payments against the gateway and the booking side.
#[derive(Clone)]
pub struct PaymentOrchestrator {
    payments: Arc<dyn PaymentRepository>,
    ledger: Arc<dyn BookingLedger>,
    promos: PromoEvaluator,
    gateway: Arc<dyn PaymentGateway>,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
    broadcaster: Arc<dyn Broadcaster>,
    timeouts: GatewayTimeouts,
    poll_policy: RetryPolicy,
}

impl PaymentOrchestrator {
    /// Orchestrator over its collaborators.
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        payments: Arc<dyn PaymentRepository>,
        ledger: Arc<dyn BookingLedger>,
        promos: PromoEvaluator,
        gateway: Arc<dyn PaymentGateway>,
        clock: Arc<dyn Clock>,
        ids: Arc<dyn IdGenerator>,
        broadcaster: Arc<dyn Broadcaster>,
        timeouts: GatewayTimeouts,
    ) -> Self {
        Self {
            payments,
            ledger,
            promos,
            gateway,
            clock,
            ids,
            broadcaster,
            timeouts,
            poll_policy: RetryPolicy::gateway_poll(),
        }
    }

    /// Replace the backoff used for gateway polls.
    #[must_use]
    pub fn with_poll_policy(mut self, policy: RetryPolicy) -> Self {
        self.poll_policy = policy;
        self
    }

    async fn load(&self, id: PaymentId) -> DomainResult<Payment> {
        self.payments
            .get(id)
            .await?
            .ok_or_else(|| DomainError::not_found("Payment", id))
    }

    async fn load_owned(&self, actor: &Principal, id: PaymentId) -> DomainResult<Payment> {
        let payment = self.load(id).await?;
        if payment.payer_id != actor.user_id && !actor.is_staff() {
            return Err(DomainError::forbidden("not your payment"));
        }
        Ok(payment)
    }

    /// Start a payment for one booking.
    ///
    /// An unusable promo code never fails the call; the receipt carries the
    /// warning instead. Cash payments stay local and wait for staff to
    /// confirm receipt. A payment discounted to zero is captured at once.
    ///
    /// # Errors
    ///
    /// - `INVALID_PAYMENT_TARGET`, `INVALID_AMOUNT`, `VALIDATION_ERROR`
    /// - whatever the booking side reports for the target
    /// - `PAYMENT_ALREADY_ACTIVE` unless `replace_active` is set
    /// - `GATEWAY_UNAVAILABLE` when the gateway call fails or times out
    pub async fn initiate(
        &self,
        actor: &Principal,
        request: InitiatePayment,
    ) -> DomainResult<PaymentReceipt> {
        let target = PaymentTarget::from_parts(request.reservation_id, request.driver_booking_id)
            .ok_or_else(|| {
                DomainError::validation(
                    codes::INVALID_PAYMENT_TARGET,
                    "exactly one of reservation_id and driver_booking_id is required",
                )
            })?;
        if request.amount <= Decimal::ZERO {
            return Err(DomainError::validation(codes::INVALID_AMOUNT, "amount must be positive"));
        }
        let phone = request
            .payer_phone
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(str::to_string);
        if request.method.is_mobile() && phone.is_none() {
            return Err(DomainError::invalid_input("payer_phone is required for wallet payments"));
        }

        let payable_target = self.ledger.prepare_payment(actor, target).await?;
        if payable_target.currency != request.currency {
            return Err(DomainError::invalid_input(format!(
                "booking is priced in {}, not {}",
                payable_target.currency, request.currency
            )));
        }

        let replaced = match self.payments.find_active_for_target(target).await? {
            Some(active) if !request.replace_active => {
                return Err(DomainError::conflict(
                    codes::PAYMENT_ALREADY_ACTIVE,
                    format!("{target} already has active payment {}", active.id),
                )
                .with_details(json!({ "payment_id": active.id })));
            }
            active => active.map(|p| p.id),
        };

        let now = self.clock.now();
        let outcome = match request.promo_code.as_deref().map(str::trim) {
            Some(code) if !code.is_empty() => {
                let ctx = PromoContext {
                    amount: request.amount,
                    currency: request.currency,
                    scope: payable_target.scope,
                    now,
                };
                Some(self.promos.evaluate_code(code, &ctx).await?)
            }
            _ => None,
        };
        let discount = outcome.as_ref().map_or(Decimal::ZERO, PromoOutcome::discount);
        let amount = payable(request.amount, discount);

        let id = PaymentId::from_uuid(self.ids.next_uuid());
        let mut payment = Payment {
            id,
            target,
            payer_id: payable_target.customer_id,
            provider: PaymentProvider::Paynow,
            method: request.method,
            amount,
            currency: request.currency,
            status: PaymentStatus::Pending,
            merchant_reference: format!("PAY-{}", id.as_uuid().simple()),
            provider_ref: None,
            poll_url: None,
            redirect_url: None,
            instructions: None,
            payer_phone: phone,
            payer_email: request.payer_email.clone(),
            promo: outcome.as_ref().and_then(PromoOutcome::snapshot),
            captured_at: None,
            captured_amount: None,
            refunds: Vec::new(),
            version: 0,
            created_at: now,
            updated_at: now,
        };

        let settled_at_once = amount.is_zero();
        if settled_at_once {
            payment.provider = PaymentProvider::Manual;
        } else if request.method == PaymentMethod::Cash {
            payment.provider = PaymentProvider::Manual;
            payment.instructions = Some(format!(
                "Pay {} {} at the counter quoting {}",
                round_money(amount),
                payment.currency,
                payment.merchant_reference
            ));
        } else {
            let gateway_request = InitiateRequest {
                reference: payment.merchant_reference.clone(),
                amount,
                currency: payment.currency,
                description: payable_target.description.clone(),
                method: payment.method,
                payer_email: payment.payer_email.clone(),
                payer_phone: payment.payer_phone.clone(),
            };
            let response = bounded_try(
                self.timeouts.initiate,
                self.gateway.initiate(gateway_request),
                || GatewayError::Timeout,
            )
            .await
            .map_err(|e| {
                tracing::error!(%target, error = %e, "Gateway initiate failed");
                gateway_failure(&e)
            })?;
            payment.provider_ref = response.provider_ref;
            payment.poll_url = Some(response.poll_url);
            payment.redirect_url = response.redirect_url;
            payment.instructions = response.instructions;
        }

        // The replaced payment stays active until the gateway has accepted its successor.
        if let Some(previous) = replaced {
            self.apply_status(previous, PaymentStatus::Cancelled).await?;
            tracing::info!(payment_id = %previous, %target, "Replaced active payment");
        }

        let mut stored = self.payments.insert_exclusive(payment).await?;
        metrics::record_payment(stored.status.as_str());
        tracing::info!(
            payment_id = %stored.id,
            %target,
            amount = %stored.amount,
            method = ?stored.method,
            "Payment initiated"
        );

        if settled_at_once {
            let (paid, _) = self.apply_status(stored.id, PaymentStatus::Paid).await?;
            stored = paid;
        }

        Ok(PaymentReceipt {
            redirect_url: stored.redirect_url.clone(),
            instructions: stored.instructions.clone(),
            poll_url: stored.poll_url.clone(),
            promo_warning: outcome.as_ref().and_then(PromoOutcome::warning),
            payment: stored,
        })
    }

    /// Current state of a payment.
    ///
    /// # Errors
    ///
    /// `NOT_FOUND`, `FORBIDDEN`.
    pub async fn get(&self, actor: &Principal, id: PaymentId) -> DomainResult<Payment> {
        self.load_owned(actor, id).await
    }

    /// Poll the gateway for `id` and apply what it reports.
    ///
    /// # Errors
    ///
    /// `NOT_FOUND`, `FORBIDDEN`, `GATEWAY_UNAVAILABLE`.
    pub async fn poll(&self, actor: &Principal, id: PaymentId) -> DomainResult<Payment> {
        let payment = self.load_owned(actor, id).await?;
        self.reconcile(payment).await
    }

    /// Bring `payment` up to date with the gateway.
    ///
    /// Terminal payments and payments without a poll URL are returned as is.
    ///
    /// # Errors
    ///
    /// `GATEWAY_UNAVAILABLE` once transient failures exhaust the retries.
    pub async fn reconcile(&self, payment: Payment) -> DomainResult<Payment> {
        if payment.status.is_terminal() {
            return Ok(payment);
        }
        let Some(poll_url) = payment.poll_url.clone() else {
            return Ok(payment);
        };

        let response = retry_with_predicate(
            &self.poll_policy,
            || {
                bounded_try(
                    self.timeouts.call,
                    self.gateway.poll(poll_url.clone()),
                    || GatewayError::Timeout,
                )
            },
            GatewayError::is_transient,
        )
        .await
        .map_err(|e| {
            tracing::warn!(payment_id = %payment.id, error = %e, "Gateway poll failed");
            gateway_failure(&e)
        })?;

        let next = PaymentStatus::from_provider_text(&response.status_text);
        tracing::debug!(payment_id = %payment.id, reported = %response.status_text, mapped = %next, "Polled payment");
        if let Some(reported) = response.amount.filter(|a| round_money(*a) != round_money(payment.amount)) {
            tracing::warn!(payment_id = %payment.id, %reported, expected = %payment.amount, "Gateway reports a different amount");
        }
        let (updated, _) = self
            .apply_reported(payment.id, next, response.provider_ref)
            .await?;
        Ok(updated)
    }

    /// Apply `next` under the monotonic rule.
    ///
    /// # Errors
    ///
    /// `NOT_FOUND`, or `CONCURRENT_UPDATE` after retries.
    pub async fn apply_status(
        &self,
        id: PaymentId,
        next: PaymentStatus,
    ) -> DomainResult<(Payment, StatusChange)> {
        self.apply_reported(id, next, None).await
    }

    async fn apply_reported(
        &self,
        id: PaymentId,
        next: PaymentStatus,
        provider_ref: Option<String>,
    ) -> DomainResult<(Payment, StatusChange)> {
        let (payment, change) = retry_with_predicate(
            &RetryPolicy::compare_and_set(),
            || self.try_apply(id, next, provider_ref.clone()),
            is_cas_loss,
        )
        .await?;
        if let StatusChange::Advanced { from, to } = change {
            self.on_advanced(&payment, from, to).await;
        }
        Ok((payment, change))
    }

    async fn try_apply(
        &self,
        id: PaymentId,
        next: PaymentStatus,
        provider_ref: Option<String>,
    ) -> DomainResult<(Payment, StatusChange)> {
        let current = self.load(id).await?;
        let mut updated = current.clone();
        let change = updated.apply_status(next, self.clock.now());
        let learned_ref = updated.provider_ref.is_none() && provider_ref.is_some();
        if learned_ref {
            updated.provider_ref = provider_ref;
        }
        if change == StatusChange::Unchanged && !learned_ref {
            return Ok((current, change));
        }
        let stored = self.payments.update(updated).await?;
        Ok((stored, change))
    }

    async fn on_advanced(&self, payment: &Payment, from: PaymentStatus, to: PaymentStatus) {
        metrics::record_payment(to.as_str());
        tracing::info!(payment_id = %payment.id, %from, %to, "Payment status advanced");
        self.announce(payment, from);

        if to != PaymentStatus::Paid {
            return;
        }
        if let Err(e) = self.ledger.payment_captured(payment).await {
            tracing::warn!(
                payment_id = %payment.id,
                target = %payment.target,
                code = e.code(),
                error = %e,
                "Captured payment could not confirm its booking"
            );
        }
        if let Some(promo) = &payment.promo {
            if let Err(e) = self.promos.redeem(promo.promo_id).await {
                tracing::warn!(payment_id = %payment.id, promo = %promo.code, error = %e, "Promo redemption not counted");
            }
        }
    }

    fn announce(&self, payment: &Payment, previous: PaymentStatus) {
        let event = RealtimeEvent::new(
            "payment:status_changed",
            json!({
                "payment_id": payment.id,
                "target": payment.target,
                "status": payment.status,
                "previous_status": previous,
                "amount": payment.amount,
                "currency": payment.currency,
            }),
        );
        self.broadcaster
            .publish(Namespace::Chat, &rooms::user(payment.payer_id), event, None);
    }

    /// Apply a promo to a pending payment.
    ///
    /// The discount is computed on the amount before any previous promo. An
    /// unusable code leaves the payment untouched and returns a warning.
    ///
    /// # Errors
    ///
    /// `NOT_FOUND`, `FORBIDDEN`, `INVALID_PAYMENT_STATUS`, `CONCURRENT_UPDATE`.
    pub async fn apply_promo(
        &self,
        actor: &Principal,
        id: PaymentId,
        code: &str,
    ) -> DomainResult<PromoApplication> {
        let payment = self.load_owned(actor, id).await?;
        require_pending(&payment)?;

        let base = payment.base_amount();
        let ctx = PromoContext {
            amount: base,
            currency: payment.currency,
            scope: scope_of(payment.target),
            now: self.clock.now(),
        };
        let outcome = self.promos.evaluate_code(code, &ctx).await?;
        if let Some(warning) = outcome.warning() {
            return Ok(PromoApplication {
                payment,
                promo_warning: Some(warning),
            });
        }

        let mut updated = payment;
        updated.amount = payable(base, outcome.discount());
        updated.promo = outcome.snapshot();
        updated.updated_at = ctx.now;
        let stored = self.payments.update(updated).await?;
        tracing::info!(payment_id = %stored.id, amount = %stored.amount, "Promo applied");
        Ok(PromoApplication {
            payment: stored,
            promo_warning: None,
        })
    }

    /// Remove the promo from a pending payment, restoring the base amount.
    ///
    /// # Errors
    ///
    /// `NOT_FOUND`, `FORBIDDEN`, `INVALID_PAYMENT_STATUS`, `CONCURRENT_UPDATE`.
    pub async fn remove_promo(&self, actor: &Principal, id: PaymentId) -> DomainResult<Payment> {
        let payment = self.load_owned(actor, id).await?;
        require_pending(&payment)?;
        if payment.promo.is_none() {
            return Ok(payment);
        }
        let mut updated = payment;
        updated.amount = round_money(updated.base_amount());
        updated.promo = None;
        updated.updated_at = self.clock.now();
        self.payments.update(updated).await
    }

    /// Record a refund on a paid payment.
    ///
    /// The payment becomes `refunded` once the captured amount is fully
    /// refunded.
    ///
    /// # Errors
    ///
    /// `FORBIDDEN` for non-managers, `INVALID_AMOUNT`, `INVALID_PAYMENT_STATUS`,
    /// `REFUND_EXCEEDS_CAPTURED`, `CONCURRENT_UPDATE`.
    pub async fn refund(
        &self,
        actor: &Principal,
        id: PaymentId,
        request: RefundRequest,
    ) -> DomainResult<Payment> {
        if !actor.is_manager_or_admin() {
            return Err(DomainError::forbidden("refunds require a manager or admin"));
        }
        if request.amount <= Decimal::ZERO {
            return Err(DomainError::validation(codes::INVALID_AMOUNT, "refund amount must be positive"));
        }
        let payment = self.load(id).await?;
        if payment.status != PaymentStatus::Paid {
            return Err(DomainError::invalid_state(
                codes::INVALID_PAYMENT_STATUS,
                format!("payment is {}, only paid payments can be refunded", payment.status),
            ));
        }
        let refundable = payment.refundable();
        if request.amount > refundable {
            return Err(DomainError::invalid_state(
                codes::REFUND_EXCEEDS_CAPTURED,
                format!("refund of {} exceeds the refundable {refundable}", request.amount),
            )
            .with_details(json!({ "refundable": refundable })));
        }

        let now = self.clock.now();
        let mut updated = payment;
        updated.refunds.push(Refund {
            amount: round_money(request.amount),
            provider_ref: request.provider_ref,
            reason: request.reason.map(|r| r.trim().to_string()).filter(|r| !r.is_empty()),
            at: now,
        });
        let fully_refunded = updated.refundable() <= Decimal::ZERO;
        if fully_refunded {
            updated.status = PaymentStatus::Refunded;
        }
        updated.updated_at = now;
        let stored = self.payments.update(updated).await?;

        metrics::record_refund();
        tracing::info!(payment_id = %stored.id, amount = %request.amount, fully_refunded, "Refund recorded");
        if fully_refunded {
            metrics::record_payment(PaymentStatus::Refunded.as_str());
            self.announce(&stored, PaymentStatus::Paid);
        }
        Ok(stored)
    }

    /// Cancel a payment locally. The gateway is not told.
    ///
    /// # Errors
    ///
    /// `NOT_FOUND`, `FORBIDDEN`, `INVALID_PAYMENT_STATUS` when already terminal.
    pub async fn cancel(&self, actor: &Principal, id: PaymentId) -> DomainResult<Payment> {
        let payment = self.load_owned(actor, id).await?;
        if payment.status.is_terminal() {
            return Err(DomainError::invalid_state(
                codes::INVALID_PAYMENT_STATUS,
                format!("payment is already {}", payment.status),
            ));
        }
        let (payment, change) = self.apply_status(id, PaymentStatus::Cancelled).await?;
        if change == StatusChange::Unchanged {
            return Err(DomainError::invalid_state(
                codes::INVALID_PAYMENT_STATUS,
                format!("payment moved to {} first", payment.status),
            ));
        }
        Ok(payment)
    }

    /// Staff confirm that a cash payment was received.
    ///
    /// # Errors
    ///
    /// `FORBIDDEN`, `NOT_FOUND`, `INVALID_PAYMENT_STATUS`.
    pub async fn mark_cash_received(&self, actor: &Principal, id: PaymentId) -> DomainResult<Payment> {
        if !actor.is_staff() {
            return Err(DomainError::forbidden("only staff confirm cash payments"));
        }
        let payment = self.load(id).await?;
        if payment.method != PaymentMethod::Cash {
            return Err(DomainError::invalid_state(
                codes::INVALID_PAYMENT_STATUS,
                "not a cash payment",
            ));
        }
        if payment.status == PaymentStatus::Paid {
            return Ok(payment);
        }
        let (payment, change) = self.apply_status(id, PaymentStatus::Paid).await?;
        if change == StatusChange::Unchanged {
            return Err(DomainError::invalid_state(
                codes::INVALID_PAYMENT_STATUS,
                format!("payment is {}", payment.status),
            ));
        }
        Ok(payment)
    }

    /// Resolve a payment by gateway reference, falling back to our own
    /// merchant reference.
    ///
    /// # Errors
    ///
    /// Transient storage failure.
    pub async fn find_by_reference(
        &self,
        provider_ref: Option<&str>,
        merchant_reference: Option<&str>,
    ) -> DomainResult<Option<Payment>> {
        if let Some(found) = match provider_ref {
            Some(r) => self.payments.find_by_provider_ref(r).await?,
            None => None,
        } {
            return Ok(Some(found));
        }
        match merchant_reference {
            Some(r) => self.payments.find_by_merchant_reference(r).await,
            None => Ok(None),
        }
    }

    /// Poll every non-terminal payment that has a poll URL. Returns how many
    /// changed status.
    ///
    /// # Errors
    ///
    /// Transient storage failure while listing.
    pub async fn reconcile_pending(&self) -> DomainResult<usize> {
        let mut advanced = 0;
        for payment in self.payments.list_non_terminal().await? {
            if payment.poll_url.is_none() {
                continue;
            }
            let (id, before) = (payment.id, payment.status);
            match self.reconcile(payment).await {
                Ok(after) if after.status != before => advanced += 1,
                Ok(_) => {}
                Err(e) if e.kind() == ErrorKind::Transient => {
                    tracing::warn!(payment_id = %id, error = %e, "Reconciliation deferred");
                }
                Err(e) => tracing::error!(payment_id = %id, error = %e, "Reconciliation failed"),
            }
        }
        Ok(advanced)
    }
}
