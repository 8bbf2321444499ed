//! Periodic job runner behaviour under paused time.

use carhire_runtime::{Shutdown, await_all, spawn_periodic};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

#[tokio::test(start_paused = true)]
async fn runs_every_interval_until_shutdown() {
    let shutdown = Shutdown::new();
    let runs = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&runs);

    let handle = spawn_periodic("counter", Duration::from_secs(60), &shutdown, move || {
        let c = Arc::clone(&counter);
        async move {
            c.fetch_add(1, Ordering::SeqCst);
        }
    });

    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(runs.load(Ordering::SeqCst), 0, "first run waits one interval");

    tokio::time::sleep(Duration::from_secs(155)).await;
    assert_eq!(runs.load(Ordering::SeqCst), 3);

    shutdown.trigger();
    await_all(vec![("counter", handle)], Duration::from_secs(1)).await;

    tokio::time::sleep(Duration::from_secs(600)).await;
    assert_eq!(runs.load(Ordering::SeqCst), 3, "no runs after shutdown");
}

#[tokio::test(start_paused = true)]
async fn shutdown_without_runs_completes() {
    let shutdown = Shutdown::new();
    let handle = spawn_periodic("idle", Duration::from_secs(3600), &shutdown, || async {});
    tokio::task::yield_now().await;
    shutdown.trigger();
    let joined = tokio::time::timeout(Duration::from_secs(1), handle).await;
    assert!(matches!(joined, Ok(Ok(()))));
}
