pub mod app_names;
pub mod config;
pub mod constants;
pub mod error;
pub mod lifecycle;
pub mod models;
pub mod platform;
pub mod server;
pub mod store;
#[cfg(test)]
mod test_utils;
pub mod tracker;

use crate::app_names::AppNameTable;
use crate::config::{AppConfig, SourceMode};
use crate::error::{TrackerError, TrackerResult};
use crate::lifecycle::{autosave_loop, shutdown_sequence, watch_signals, ShutdownPlan};
use crate::platform::WindowEventSource;
use crate::server::ControlState;
use crate::store::UsageStore;
use crate::tracker::{AttributionEngine, EventSource, PollingSource};
use log::{error, info, warn};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

fn load_app_names(config: &AppConfig) -> AppNameTable {
    let mut names = AppNameTable::builtin();
    if let Some(path) = &config.app_names {
        if let Err(e) = names.extend_from_file(path) {
            warn!("Ignoring app name overrides from {}: {e}", path.display());
        }
    }
    names
}

/// Runs the tracker and its control surface until shutdown is requested over
/// HTTP or by a signal.
pub async fn run(config: AppConfig) -> TrackerResult<()> {
    config.validate()?;
    info!("dwell starting up...");

    let platform = platform::native(Arc::new(load_app_names(&config)));
    info!("Using {} platform backend", platform.name);

    let engine = Arc::new(AttributionEngine::new(
        config.tracker,
        Arc::clone(&platform.resolver),
        Arc::clone(&platform.idle),
    ));
    let store = Arc::new(UsageStore::new(config.data_dir.clone()));
    engine.merge_usage(store.load());

    let listener: Arc<dyn WindowEventSource> = match config.mode {
        SourceMode::Hook => Arc::clone(&platform.listener),
        SourceMode::Polling => Arc::new(PollingSource::new(
            Arc::clone(&platform.resolver),
            config.poll_interval,
        )),
    };
    let source = Arc::new(EventSource::new(Arc::clone(&engine), listener));
    if let Err(e) = source.start() {
        // The control surface stays useful without live tracking
        error!("Could not start foreground listener: {e}");
    }

    let tcp = TcpListener::bind(config.listen).await?;
    let requested = CancellationToken::new();
    let server_stop = CancellationToken::new();

    let autosave = config.autosave_interval.map(|every| {
        tokio::spawn(autosave_loop(
            Arc::clone(&engine),
            Arc::clone(&store),
            every,
            requested.clone(),
        ))
    });
    let signals = tokio::spawn(watch_signals(requested.clone()));
    let sequence = tokio::spawn(shutdown_sequence(
        ShutdownPlan {
            source,
            engine: Arc::clone(&engine),
            store: Arc::clone(&store),
            stop_timeout: config.stop_timeout,
        },
        requested.clone(),
        server_stop.clone(),
    ));

    let state = ControlState {
        engine,
        store,
        shutdown: requested.clone(),
    };
    let served = server::serve(tcp, state, server_stop).await;

    // Runs the remaining shutdown steps if the server stopped on its own
    requested.cancel();
    sequence
        .await
        .map_err(|e| TrackerError::Task(e.to_string()))?;
    if let Some(task) = autosave {
        if let Err(e) = task.await {
            warn!("Autosave task ended abnormally: {e}");
        }
    }
    if let Err(e) = signals.await {
        warn!("Signal watcher ended abnormally: {e}");
    }

    served
}
