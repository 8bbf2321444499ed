//! Payment orchestration, the Paynow client and webhook intake.

pub mod orchestrator;
pub mod paynow;
pub mod webhook;

pub use orchestrator::{
    GatewayTimeouts, InitiatePayment, PaymentOrchestrator, PaymentReceipt, PromoApplication,
    RefundRequest,
};
pub use paynow::PaynowClient;
pub use webhook::{WebhookIntake, WebhookOutcome};
