//! Carhire HTTP server.
//!
//! This binary:
//! - Loads configuration from the environment (and `.env`)
//! - Installs the Prometheus exporter
//! - Wires the services over the in-memory store, the Paynow client and a mailer
//! - Starts the background sweepers
//! - Serves HTTP and websockets until Ctrl+C or SIGTERM
//!
//! # Usage
//!
//! ```bash
//! PAYNOW_INTEGRATION_ID=... PAYNOW_INTEGRATION_KEY=... \
//! PAYNOW_RESULT_URL=... PAYNOW_RETURN_URL=... JWT_SECRET=... \
//! cargo run --bin server
//! ```

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use carhire::mail::{LogMailer, SmtpMailer};
use carhire::payment::PaynowClient;
use carhire::store::MemoryStore;
use carhire::{AppState, Config, Dependencies, build_router, metrics, sweepers};
use carhire_core::environment::{Clock, SystemClock, UuidV4Generator};
use carhire_core::mail::Mailer;
use carhire_runtime::{Shutdown, await_all, shutdown_signal};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,carhire=debug,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting carhire server");

    let config = Arc::new(Config::from_env().context("invalid configuration")?);
    info!(
        bind = %config.bind_address(),
        metrics = %config.metrics_address(),
        paynow = %config.paynow.base_url,
        smtp = config.smtp.is_some(),
        "Configuration loaded"
    );

    let metrics_addr: SocketAddr = config
        .metrics_address()
        .parse()
        .context("invalid metrics address")?;
    metrics::install_exporter(metrics_addr).context("failed to install metrics exporter")?;
    metrics::register_business_metrics();

    let gateway = Arc::new(PaynowClient::new(config.paynow.clone()).context("failed to build gateway client")?);
    let mailer: Arc<dyn Mailer> = match &config.smtp {
        Some(smtp) => Arc::new(SmtpMailer::new(smtp)),
        None => Arc::new(LogMailer),
    };
    let clock: Arc<dyn Clock> = Arc::new(SystemClock::new());

    let state = AppState::build(
        &config,
        Dependencies {
            store: Arc::new(MemoryStore::new()),
            gateway,
            mailer,
            clock: clock.clone(),
            ids: Arc::new(UuidV4Generator),
        },
    );

    let shutdown = Shutdown::new();
    let jobs = sweepers::spawn_all(&state, clock, config.jobs.sweep_interval, &shutdown);
    info!(jobs = jobs.len(), "Background sweepers started");

    let app = build_router(state);
    let addr = config.bind_address();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(address = %addr, "Server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("HTTP server stopped, stopping background jobs");
    shutdown.trigger();
    await_all(jobs, Duration::from_secs(config.server.shutdown_timeout)).await;

    info!("Server stopped");
    Ok(())
}
