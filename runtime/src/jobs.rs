//! Periodic background jobs with graceful shutdown.
//!
//! Sweepers (payment deadlines, reconciliation, scheduled notifications) run
//! on a fixed interval until the shutdown signal fires. A run in progress is
//! allowed to finish; the next tick is never started after shutdown.

use std::future::Future;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Shutdown signal shared by background tasks.
#[derive(Debug, Clone)]
pub struct Shutdown {
    tx: broadcast::Sender<()>,
}

impl Shutdown {
    /// Create a new signal.
    #[must_use]
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1);
        Self { tx }
    }

    /// Subscribe before spawning a task.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.tx.subscribe()
    }

    /// Notify all subscribers.
    pub fn trigger(&self) {
        let receivers = self.tx.send(()).unwrap_or(0);
        tracing::info!(receivers, "Shutdown signal sent to background jobs");
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

/// Spawn `job` every `interval` until `shutdown` fires.
///
/// The first run happens after one interval. Ticks missed while a run is
/// still going are skipped, never queued.
pub fn spawn_periodic<F, Fut>(
    name: &'static str,
    interval: Duration,
    shutdown: &Shutdown,
    mut job: F,
) -> JoinHandle<()>
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send,
{
    let mut stop = shutdown.subscribe();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        ticker.tick().await;
        tracing::info!(job = name, interval_secs = interval.as_secs(), "Background job started");

        loop {
            tokio::select! {
                _ = stop.recv() => {
                    tracing::info!(job = name, "Background job stopping");
                    break;
                }
                _ = ticker.tick() => {
                    job().await;
                }
            }
        }
    })
}

/// Wait for background tasks, giving each `timeout` to finish.
pub async fn await_all(handles: Vec<(&'static str, JoinHandle<()>)>, timeout: Duration) {
    for (name, handle) in handles {
        match tokio::time::timeout(timeout, handle).await {
            Ok(Ok(())) => tracing::info!(job = name, "Background job stopped gracefully"),
            Ok(Err(e)) => tracing::warn!(job = name, error = %e, "Background job failed"),
            Err(_) => tracing::warn!(job = name, "Background job shutdown timed out"),
        }
    }
}

/// Wait for Ctrl+C or SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => tracing::info!("Received Ctrl+C"),
        () = terminate => tracing::info!("Received SIGTERM"),
    }
}
