//! Application state for the carhire HTTP server.
//!
//! Contains every service the handlers call, wired over one repository
//! implementation, one gateway and one mailer. Cloning is cheap: services
//! hold `Arc`s.

use std::sync::Arc;

use axum::extract::FromRef;
use carhire_core::broadcast::Broadcaster;
use carhire_core::environment::{Clock, IdGenerator};
use carhire_core::gateway::PaymentGateway;
use carhire_core::mail::Mailer;
use carhire_web::TokenService;

use crate::auth::Authenticator;
use crate::availability::AvailabilityIndex;
use crate::booking::{BookingCodeGenerator, Bookings, DriverBookingCoordinator, ReservationCoordinator};
use crate::chat::ChatService;
use crate::config::Config;
use crate::notification::NotificationService;
use crate::payment::{GatewayTimeouts, PaymentOrchestrator, WebhookIntake};
use crate::promo::PromoEvaluator;
use crate::realtime::{Realtime, SessionFabric};
use crate::store::MemoryStore;
use crate::tracking::TrackingService;

/// Collaborators chosen by the binary (or a test).
#[derive(Clone)]
pub struct Dependencies {
    /// Repositories.
    pub store: Arc<MemoryStore>,
    /// Payment gateway.
    pub gateway: Arc<dyn PaymentGateway>,
    /// Outbound mail.
    pub mailer: Arc<dyn Mailer>,
    /// Time source.
    pub clock: Arc<dyn Clock>,
    /// Id source.
    pub ids: Arc<dyn IdGenerator>,
}

/// Application state shared across all HTTP handlers.
#[derive(Clone)]
pub struct AppState {
    /// Repositories, for readiness.
    pub store: Arc<MemoryStore>,
    /// Vehicle reservations.
    pub reservations: ReservationCoordinator,
    /// Driver bookings.
    pub drivers: DriverBookingCoordinator,
    /// Payment lifecycle.
    pub payments: PaymentOrchestrator,
    /// Gateway callbacks.
    pub webhook: WebhookIntake,
    /// Notification authoring and delivery.
    pub notifications: NotificationService,
    /// Sessions, chat and tracking.
    pub realtime: Realtime,
    /// Bearer token resolution.
    pub authenticator: Authenticator,
}

impl AppState {
    /// Wire every service from `config` and `deps`.
    #[must_use]
    pub fn build(config: &Config, deps: Dependencies) -> Self {
        let Dependencies {
            store,
            gateway,
            mailer,
            clock,
            ids,
        } = deps;

        let fabric = SessionFabric::new(config.realtime.session_queue);
        let broadcaster: Arc<dyn Broadcaster> = Arc::new(fabric.clone());
        let tokens = TokenService::new(
            config.auth.jwt_secret.as_bytes(),
            seconds(config.auth.jwt_ttl, chrono::Duration::days(1)),
            seconds(config.auth.device_token_ttl, chrono::Duration::days(30)),
        );

        let availability = AvailabilityIndex::new(store.clone(), store.clone());
        let codes = Arc::new(BookingCodeGenerator::new());
        let reservations = ReservationCoordinator::new(
            store.clone(),
            availability.clone(),
            codes.clone(),
            clock.clone(),
            ids.clone(),
            broadcaster.clone(),
        );
        let drivers = DriverBookingCoordinator::new(
            store.clone(),
            store.clone(),
            availability,
            codes,
            clock.clone(),
            ids.clone(),
            broadcaster.clone(),
            config.booking,
        );
        let ledger = Arc::new(Bookings {
            reservations: reservations.clone(),
            drivers: drivers.clone(),
        });

        let payments = PaymentOrchestrator::new(
            store.clone(),
            ledger,
            PromoEvaluator::new(store.clone()),
            gateway.clone(),
            clock.clone(),
            ids.clone(),
            broadcaster.clone(),
            GatewayTimeouts::from(&config.paynow),
        );
        let webhook = WebhookIntake::new(payments.clone(), gateway);

        let notifications = NotificationService::new(
            store.clone(),
            store.clone(),
            broadcaster.clone(),
            mailer,
            clock.clone(),
            ids.clone(),
        );

        let chat = ChatService::new(
            store.clone(),
            store.clone(),
            store.clone(),
            broadcaster.clone(),
            clock.clone(),
            ids.clone(),
        );
        let tracking = TrackingService::new(
            store.clone(),
            tokens.clone(),
            broadcaster,
            clock.clone(),
            ids.clone(),
        );
        let authenticator = Authenticator::new(tokens, store.clone(), store.clone(), clock);

        Self {
            store,
            reservations,
            drivers,
            payments,
            webhook,
            notifications,
            realtime: Realtime {
                fabric,
                chat,
                tracking,
                ids,
                config: config.realtime,
            },
            authenticator,
        }
    }
}

fn seconds(secs: u64, fallback: chrono::Duration) -> chrono::Duration {
    chrono::Duration::from_std(std::time::Duration::from_secs(secs)).unwrap_or(fallback)
}

impl FromRef<AppState> for Realtime {
    fn from_ref(state: &AppState) -> Self {
        state.realtime.clone()
    }
}

impl FromRef<AppState> for Authenticator {
    fn from_ref(state: &AppState) -> Self {
        state.authenticator.clone()
    }
}
