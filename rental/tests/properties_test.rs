//! Property tests over the coordinators: driver schedules never overlap,
//! refunds stay within the capture, payment status only moves forward and
//! promo arithmetic never goes negative.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod common;

use carhire::booking::driver::DriverBookingRequest;
use carhire::booking::reservation::NewReservation;
use carhire::payment::{InitiatePayment, RefundRequest};
use carhire::promo::{PromoContext, evaluate, payable};
use carhire_core::error::codes;
use carhire_core::repository::{DriverBookingFilter, DriverBookingRepository};
use carhire_core::types::{
    BranchId, Currency, Payment, PaymentMethod, PaymentStatus, Place, PromoScope, TimeWindow,
    VehicleModelId,
};
use carhire_testing::fixtures;
use carhire_testing::properties::{arb_amount, arb_slot};
use chrono::Duration;
use common::{TestApp, customer, driver, manager, other_customer};
use proptest::prelude::*;
use rust_decimal::Decimal;
use uuid::Uuid;

fn block_on<F: std::future::Future>(future: F) -> F::Output {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
        .block_on(future)
}

fn arb_status() -> impl Strategy<Value = PaymentStatus> {
    prop_oneof![
        Just(PaymentStatus::Pending),
        Just(PaymentStatus::Sent),
        Just(PaymentStatus::AwaitingConfirmation),
        Just(PaymentStatus::AwaitingDelivery),
        Just(PaymentStatus::Paid),
        Just(PaymentStatus::Failed),
        Just(PaymentStatus::Cancelled),
        Just(PaymentStatus::Refunded),
        Just(PaymentStatus::Void),
    ]
}

fn rank(status: PaymentStatus) -> u8 {
    match status {
        PaymentStatus::Pending => 0,
        PaymentStatus::Sent => 1,
        PaymentStatus::AwaitingConfirmation => 2,
        PaymentStatus::AwaitingDelivery => 3,
        _ => 4,
    }
}

/// A pending reservation for `amount` USD and a payment for it.
async fn pending_payment(app: &TestApp, amount: Decimal, method: PaymentMethod) -> Payment {
    let actor = fixtures::principal(&customer());
    let pickup = carhire_testing::at("2025-04-01T09:00:00Z");
    let reservation = app
        .state
        .reservations
        .create(
            &actor,
            NewReservation {
                customer_id: None,
                vehicle_model_id: VehicleModelId::from_uuid(Uuid::from_u128(0xa001)),
                vehicle_id: None,
                pickup: Place {
                    branch_id: BranchId::from_uuid(Uuid::from_u128(0xb001)),
                    at: pickup,
                },
                dropoff: Place {
                    branch_id: BranchId::from_uuid(Uuid::from_u128(0xb001)),
                    at: pickup + Duration::days(1),
                },
                daily_rate: amount,
                currency: Currency::Usd,
                fees: None,
                notes: None,
            },
        )
        .await
        .unwrap();
    app.state
        .payments
        .initiate(
            &actor,
            InitiatePayment {
                reservation_id: Some(reservation.id),
                driver_booking_id: None,
                amount,
                currency: Currency::Usd,
                method,
                promo_code: None,
                payer_email: None,
                payer_phone: None,
                replace_active: false,
            },
        )
        .await
        .unwrap()
        .payment
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn driver_schedule_never_overlaps(
        requests in prop::collection::vec((arb_slot(), any::<bool>(), any::<bool>()), 1..12),
    ) {
        block_on(async {
            let app = TestApp::start().await;
            let driver_principal = fixtures::principal(&driver());
            for ((start, hours), second_customer, accept) in requests {
                let who = if second_customer { other_customer() } else { customer() };
                let requested = app
                    .state
                    .drivers
                    .request(
                        &fixtures::principal(&who),
                        DriverBookingRequest {
                            driver_id: driver().id,
                            pickup_location: "Borrowdale".to_string(),
                            dropoff_location: None,
                            start_at: start,
                            end_at: None,
                            hours_requested: hours,
                            notes: None,
                        },
                    )
                    .await;
                match requested {
                    Ok(booking) if accept => {
                        if let Err(e) = app.state.drivers.accept(&driver_principal, booking.id).await {
                            assert_eq!(e.code(), codes::DRIVER_TIME_CONFLICT);
                        }
                    }
                    Ok(_) => {}
                    Err(e) => assert_eq!(e.code(), codes::DRIVER_TIME_CONFLICT),
                }
            }

            let filter = DriverBookingFilter {
                driver_id: Some(driver().id),
                ..DriverBookingFilter::default()
            };
            let blocking: Vec<TimeWindow> = DriverBookingRepository::list(app.store.as_ref(), filter)
                .await
                .unwrap()
                .into_iter()
                .filter(|b| b.status.is_blocking())
                .map(|b| b.window().unwrap())
                .collect();
            for (i, a) in blocking.iter().enumerate() {
                for b in &blocking[i + 1..] {
                    assert!(!a.overlaps(b), "{a:?} overlaps {b:?}");
                }
            }
        });
    }

    #[test]
    fn refunds_never_exceed_the_capture(
        captured in arb_amount(),
        refunds in prop::collection::vec(arb_amount(), 1..6),
    ) {
        block_on(async {
            let app = TestApp::start().await;
            let staff = fixtures::principal(&manager());
            let payment = pending_payment(&app, captured, PaymentMethod::Cash).await;
            let paid = app
                .state
                .payments
                .mark_cash_received(&staff, payment.id)
                .await
                .unwrap();
            assert_eq!(paid.captured_amount, Some(captured));

            for amount in refunds {
                let before = app.state.payments.get(&staff, payment.id).await.unwrap();
                let result = app
                    .state
                    .payments
                    .refund(&staff, payment.id, RefundRequest { amount, reason: None, provider_ref: None })
                    .await;
                let after = app.state.payments.get(&staff, payment.id).await.unwrap();
                match result {
                    Ok(_) => {
                        assert_eq!(after.refunded_total(), before.refunded_total() + amount);
                    }
                    Err(e) => {
                        assert!(
                            e.code() == codes::REFUND_EXCEEDS_CAPTURED
                                || e.code() == codes::INVALID_PAYMENT_STATUS,
                            "unexpected {e}"
                        );
                        assert_eq!(after, before);
                    }
                }
                assert!(after.refunded_total() <= captured);
                assert_eq!(
                    after.status == PaymentStatus::Refunded,
                    after.refunded_total() == captured
                );
            }
        });
    }

    #[test]
    fn payment_status_only_moves_forward(
        reports in prop::collection::vec(arb_status(), 1..10),
    ) {
        block_on(async {
            let app = TestApp::start().await;
            let payment = pending_payment(&app, Decimal::new(4500, 2), PaymentMethod::Card).await;
            let mut current = payment.status;
            for next in reports {
                let (updated, _) = app.state.payments.apply_status(payment.id, next).await.unwrap();
                if current.is_terminal() {
                    assert_eq!(updated.status, current);
                } else {
                    assert!(rank(updated.status) >= rank(current));
                }
                assert_ne!(updated.status, PaymentStatus::Refunded);
                current = updated.status;
            }
        });
    }

    #[test]
    fn fixed_promos_never_make_the_amount_negative(
        base in arb_amount(),
        value in arb_amount(),
    ) {
        let promo = fixtures::fixed_promo("FLAT", value, Currency::Usd);
        let ctx = PromoContext {
            amount: base,
            currency: Currency::Usd,
            scope: PromoScope::Reservation,
            now: carhire_testing::at("2025-03-01T09:00:00Z"),
        };
        let outcome = evaluate(Some(&promo), &ctx);
        let due = payable(base, outcome.discount());
        prop_assert_eq!(due, (base - value).max(Decimal::ZERO));
        prop_assert_eq!(due + outcome.discount(), base);
    }
}
