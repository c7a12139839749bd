//! Background tasks on the async runtime: periodic saves, OS signal
//! handling and the ordered shutdown sequence.

use crate::error::{TrackerError, TrackerResult};
use crate::store::UsageStore;
use crate::tracker::{AttributionEngine, EventSource};
use log::{debug, error, info, warn};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// Snapshots the ledger and writes it on the blocking pool.
pub async fn persist_usage(
    engine: Arc<AttributionEngine>,
    store: Arc<UsageStore>,
    archive: bool,
) -> TrackerResult<PathBuf> {
    tokio::task::spawn_blocking(move || store.save(&engine.usage_snapshot(), archive))
        .await
        .map_err(|e| TrackerError::Task(e.to_string()))?
}

pub async fn autosave_loop(
    engine: Arc<AttributionEngine>,
    store: Arc<UsageStore>,
    every: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick fires immediately; nothing to save yet
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let saved = persist_usage(Arc::clone(&engine), Arc::clone(&store), false).await;
                if let Err(e) = saved {
                    error!("Autosave failed: {e}");
                }
            }
            () = cancel.cancelled() => {
                debug!("Autosave loop shutting down");
                break;
            }
        }
    }
}

/// Cancels `requested` on Ctrl+C or SIGTERM. Returns early once shutdown was
/// requested some other way.
pub async fn watch_signals(requested: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("Received Ctrl+C, initiating graceful shutdown"),
        () = terminate => info!("Received terminate signal, initiating graceful shutdown"),
        () = requested.cancelled() => return,
    }
    requested.cancel();
}

/// What the shutdown sequence tears down.
pub struct ShutdownPlan {
    pub source: Arc<EventSource>,
    pub engine: Arc<AttributionEngine>,
    pub store: Arc<UsageStore>,
    pub stop_timeout: Duration,
}

/// Waits for `requested`, then stops the listener, writes the final ledger
/// and finally cancels `server_stop`. A failed save does not block exit.
pub async fn shutdown_sequence(
    plan: ShutdownPlan,
    requested: CancellationToken,
    server_stop: CancellationToken,
) {
    requested.cancelled().await;
    info!("Shutting down");

    let ShutdownPlan {
        source,
        engine,
        store,
        stop_timeout,
    } = plan;

    match tokio::task::spawn_blocking(move || source.stop(stop_timeout)).await {
        Ok(true) => {}
        Ok(false) => warn!("Listener left running after {stop_timeout:?}"),
        Err(e) => error!("Listener stop task failed: {e}"),
    }

    match persist_usage(engine, store, false).await {
        Ok(path) => info!("Final usage saved to {}", path.display()),
        Err(e) => error!("Could not save usage data on shutdown: {e}"),
    }

    server_stop.cancel();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::WindowHandle;
    use crate::test_utils::{setup_engine, setup_store, ScriptedSource};
    use crate::tracker::TrackerConfig;
    use std::collections::HashMap;

    fn plan(store: Arc<UsageStore>) -> (ShutdownPlan, Arc<EventSource>) {
        let (engine, _, _) = setup_engine(TrackerConfig::default());
        engine.merge_usage(HashMap::from([("Editor".to_string(), 42.0)]));
        let source = Arc::new(EventSource::new(
            Arc::clone(&engine),
            ScriptedSource::windows(&[WindowHandle(1)]),
        ));
        source.start().unwrap();

        let plan = ShutdownPlan {
            source: Arc::clone(&source),
            engine,
            store,
            stop_timeout: Duration::from_secs(2),
        };
        (plan, source)
    }

    #[tokio::test]
    async fn test_shutdown_stops_listener_then_saves() {
        let (store, _dir) = setup_store();
        let (plan, source) = plan(Arc::clone(&store));
        let requested = CancellationToken::new();
        let server_stop = CancellationToken::new();

        let task = tokio::spawn(shutdown_sequence(plan, requested.clone(), server_stop.clone()));
        assert!(!server_stop.is_cancelled());

        requested.cancel();
        task.await.unwrap();

        assert!(server_stop.is_cancelled());
        assert!(!source.is_running());
        assert_eq!(store.load().get("Editor"), Some(&42.0));
    }

    #[tokio::test]
    async fn test_shutdown_survives_failed_save() {
        let (_, dir) = setup_store();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, "").unwrap();
        let store = Arc::new(UsageStore::new(blocker.join("data")));

        let (plan, _source) = plan(store);
        let requested = CancellationToken::new();
        let server_stop = CancellationToken::new();

        requested.cancel();
        shutdown_sequence(plan, requested, server_stop.clone()).await;

        assert!(server_stop.is_cancelled());
    }

    #[tokio::test]
    async fn test_autosave_writes_until_cancelled() {
        let (store, _dir) = setup_store();
        let (engine, _, _) = setup_engine(TrackerConfig::default());
        engine.merge_usage(HashMap::from([("Browser".to_string(), 9.5)]));
        let cancel = CancellationToken::new();

        let task = tokio::spawn(autosave_loop(
            engine,
            Arc::clone(&store),
            Duration::from_millis(20),
            cancel.clone(),
        ));
        tokio::time::sleep(Duration::from_millis(120)).await;
        cancel.cancel();
        task.await.unwrap();

        assert_eq!(store.load().get("Browser"), Some(&9.5));
    }

    #[tokio::test]
    async fn test_signal_watcher_exits_on_request() {
        let requested = CancellationToken::new();
        let watcher = tokio::spawn(watch_signals(requested.clone()));

        requested.cancel();
        tokio::time::timeout(Duration::from_secs(2), watcher)
            .await
            .unwrap()
            .unwrap();
    }
}
