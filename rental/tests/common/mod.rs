//! Shared harness: the full application over the in-memory store, a
//! scripted gateway and a manual clock.

#![allow(dead_code)]
#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

use axum::Router;
use axum_test::TestServer;
use carhire::store::MemoryStore;
use carhire::{AppState, Config, Dependencies, build_router};
use carhire_core::repository::{PromoRepository, UserRepository};
use carhire_core::types::{PromoCode, Role, User};
use carhire_testing::gateway::ScriptedGateway;
use carhire_testing::recorders::RecordingMailer;
use carhire_testing::{ManualClock, SequentialIdGenerator, at, fixtures};
use carhire_web::token::TokenService;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::Value;

pub const JWT_SECRET: &str = "integration-test-secret";

pub const CUSTOMER: u128 = 1;
pub const OTHER_CUSTOMER: u128 = 2;
pub const DRIVER: u128 = 3;
pub const MANAGER: u128 = 4;

pub fn config() -> Config {
    let vars: HashMap<&str, &str> = HashMap::from([
        ("PAYNOW_INTEGRATION_ID", "1201"),
        ("PAYNOW_INTEGRATION_KEY", "integration-key"),
        ("PAYNOW_RESULT_URL", "https://carhire.test/api/v1/payments/webhook/paynow"),
        ("PAYNOW_RETURN_URL", "https://carhire.test/payments/return"),
        ("JWT_SECRET", JWT_SECRET),
        ("WS_IDLE_TIMEOUT_SECS", "30"),
    ]);
    Config::from_lookup(|key| vars.get(key).map(|v| (*v).to_string())).expect("test config")
}

pub fn customer() -> User {
    fixtures::user(CUSTOMER, &[Role::Customer])
}

pub fn other_customer() -> User {
    fixtures::user(OTHER_CUSTOMER, &[Role::Customer])
}

pub fn driver() -> User {
    fixtures::user(DRIVER, &[Role::Driver])
}

pub fn manager() -> User {
    fixtures::user(MANAGER, &[Role::Manager])
}

/// `WELCOME10` with the validity window already over.
pub fn expired_promo() -> PromoCode {
    PromoCode {
        valid_until: Some(at("2025-02-01T00:00:00Z")),
        ..fixtures::percent_promo("OLD10", dec!(10))
    }
}

pub struct TestApp {
    pub state: AppState,
    pub store: Arc<MemoryStore>,
    pub gateway: ScriptedGateway,
    pub mailer: Arc<RecordingMailer>,
    pub clock: Arc<ManualClock>,
    tokens: TokenService,
}

impl TestApp {
    /// Application at 2025-03-01T09:00Z with customers, a USD 20/h driver,
    /// a manager and the `WELCOME10` and `OLD10` promos.
    pub async fn start() -> Self {
        carhire_testing::init_tracing();
        let config = config();
        let store = Arc::new(MemoryStore::new());
        let gateway = ScriptedGateway::new();
        let mailer = Arc::new(RecordingMailer::new());
        let clock = Arc::new(ManualClock::new(at("2025-03-01T09:00:00Z")));

        let state = AppState::build(
            &config,
            Dependencies {
                store: store.clone(),
                gateway: Arc::new(gateway.clone()),
                mailer: mailer.clone(),
                clock: clock.clone(),
                ids: Arc::new(SequentialIdGenerator::new()),
            },
        );

        for user in [customer(), other_customer(), driver(), manager()] {
            UserRepository::insert(store.as_ref(), user).await.unwrap();
        }
        store
            .upsert_driver_profile(fixtures::driver_profile(&driver(), dec!(20)))
            .await
            .unwrap();
        PromoRepository::insert(store.as_ref(), fixtures::percent_promo("WELCOME10", dec!(10)))
            .await
            .unwrap();
        PromoRepository::insert(store.as_ref(), expired_promo()).await.unwrap();

        Self {
            state,
            store,
            gateway,
            mailer,
            clock,
            tokens: TokenService::new(
                JWT_SECRET.as_bytes(),
                chrono::Duration::days(1),
                chrono::Duration::days(30),
            ),
        }
    }

    pub fn router(&self) -> Router {
        build_router(self.state.clone())
    }

    pub fn server(&self) -> TestServer {
        TestServer::new(self.router()).expect("test server")
    }

    /// Bearer token for `user`, issued now.
    pub fn token(&self, user: &User) -> String {
        use carhire_core::environment::Clock;
        self.tokens
            .issue_user(&fixtures::principal(user), self.clock.now())
            .unwrap()
    }
}

/// Money fields serialize as strings; compare them numerically.
pub fn money(value: &Value) -> Decimal {
    match value {
        Value::String(s) => Decimal::from_str(s).unwrap(),
        Value::Number(n) => Decimal::from_str(&n.to_string()).unwrap(),
        other => panic!("not a money value: {other}"),
    }
}

pub fn text(value: &Value) -> &str {
    value.as_str().unwrap()
}

pub fn time(value: &Value) -> chrono::DateTime<chrono::Utc> {
    at(text(value))
}
