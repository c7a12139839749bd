use super::AttributionEngine;
use crate::constants::EVENT_QUEUE_CAPACITY;
use crate::error::{TrackerError, TrackerResult};
use crate::platform::{EventSink, StopSignal, WindowEventSource};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError};
use log::{debug, error, info, warn};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

const LISTENER_THREAD: &str = "foreground-listener";
const DISPATCH_THREAD: &str = "attribution-dispatch";

struct Running {
    stop: StopSignal,
    listener: JoinHandle<()>,
    dispatcher: JoinHandle<()>,
    /// Signalled by the dispatcher once the queue is drained and closed.
    drained: Receiver<()>,
}

impl Running {
    fn is_alive(&self) -> bool {
        !self.listener.is_finished()
    }

    fn join(self) {
        if self.listener.join().is_err() {
            error!("{LISTENER_THREAD} thread panicked");
        }
        if self.dispatcher.join().is_err() {
            error!("{DISPATCH_THREAD} thread panicked");
        }
    }
}

/// Owns the native listener thread and the dispatcher that feeds its events
/// to the engine, one at a time and in arrival order.
///
/// The native loop only stamps and enqueues; all attribution work happens on
/// the dispatcher so the OS callback never waits on the engine lock.
pub struct EventSource {
    engine: Arc<AttributionEngine>,
    listener: Arc<dyn WindowEventSource>,
    queue_capacity: usize,
    running: Mutex<Option<Running>>,
    /// Switches lost to a full queue, across restarts.
    dropped: Arc<AtomicU64>,
}

impl EventSource {
    pub fn new(engine: Arc<AttributionEngine>, listener: Arc<dyn WindowEventSource>) -> Self {
        Self {
            engine,
            listener,
            queue_capacity: EVENT_QUEUE_CAPACITY,
            running: Mutex::new(None),
            dropped: Arc::default(),
        }
    }

    #[must_use]
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity.max(1);
        self
    }

    fn lock_running(&self) -> MutexGuard<'_, Option<Running>> {
        self.running.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Starts listening. A no-op while the listener is alive; a listener that
    /// died on its own is reaped and started again.
    pub fn start(&self) -> TrackerResult<()> {
        let mut running = self.lock_running();
        if running.as_ref().is_some_and(Running::is_alive) {
            debug!("Foreground listener already running");
            return Ok(());
        }
        if let Some(stale) = running.take() {
            info!("Restarting foreground listener");
            stale.join();
        }

        // Baseline before the first event can reach the engine
        self.engine.rebaseline();

        let (tx, rx) = bounded(self.queue_capacity);
        let (drained_tx, drained_rx) = bounded::<()>(1);
        let stop = StopSignal::new();

        let dispatcher = {
            let engine = Arc::clone(&self.engine);
            thread::Builder::new()
                .name(DISPATCH_THREAD.into())
                .spawn(move || {
                    for event in rx {
                        engine.handle_foreground_change(event);
                    }
                    debug!("Event queue drained");
                    let _ = drained_tx.send(());
                })
                .map_err(|source| TrackerError::Thread {
                    name: DISPATCH_THREAD,
                    source,
                })?
        };

        let listener = {
            let listener = Arc::clone(&self.listener);
            let sink = EventSink::new(tx).with_drop_counter(Arc::clone(&self.dropped));
            let stop = stop.clone();
            thread::Builder::new()
                .name(LISTENER_THREAD.into())
                .spawn(move || match listener.listen(sink, &stop) {
                    Ok(()) => debug!("Foreground listener returned"),
                    Err(e) => error!("Foreground listener failed, switches are lost: {e}"),
                })
                .map_err(|source| TrackerError::Thread {
                    name: LISTENER_THREAD,
                    source,
                })?
        };

        *running = Some(Running {
            stop,
            listener,
            dispatcher,
            drained: drained_rx,
        });
        info!("Foreground listener started");
        Ok(())
    }

    /// Asks the native loop to quit and waits up to `timeout` for the queue to
    /// drain. Returns false when the threads had to be left behind.
    pub fn stop(&self, timeout: Duration) -> bool {
        let Some(running) = self.lock_running().take() else {
            return true;
        };

        running.stop.request();
        let stopped = match running.drained.recv_timeout(timeout) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                running.join();
                info!("Foreground listener stopped");
                true
            }
            Err(RecvTimeoutError::Timeout) => {
                warn!("Foreground listener did not stop within {timeout:?}; detaching it");
                false
            }
        };

        let dropped = self.dropped_switches();
        if dropped > 0 {
            warn!("{dropped} foreground switches were dropped on a full event queue");
        }
        stopped
    }

    pub fn is_running(&self) -> bool {
        self.lock_running().as_ref().is_some_and(Running::is_alive)
    }

    pub fn dropped_switches(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl Drop for EventSource {
    fn drop(&mut self) {
        if let Some(running) = self.lock_running().take() {
            running.stop.request();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::WindowHandle;
    use crate::test_utils::{setup_engine, wait_until, ScriptedSource};
    use crate::tracker::TrackerConfig;

    const WAIT: Duration = Duration::from_secs(2);

    fn eager() -> TrackerConfig {
        TrackerConfig {
            debounce: Duration::ZERO,
            ..TrackerConfig::default()
        }
    }

    #[test]
    fn test_events_reach_engine_in_order() {
        let (engine, resolver, _) = setup_engine(eager());
        resolver.insert(WindowHandle(1), "Editor");
        resolver.insert(WindowHandle(2), "Browser");
        resolver.insert(WindowHandle(3), "Terminal");
        resolver.set_foreground(Some(WindowHandle(1)));

        let source = EventSource::new(
            Arc::clone(&engine),
            ScriptedSource::windows(&[WindowHandle(2), WindowHandle(3)]),
        );
        source.start().unwrap();

        assert!(wait_until(WAIT, || {
            engine.state().last_active_app.as_deref() == Some("Terminal")
        }));
        assert!(source.stop(WAIT));

        // The app in front has not been credited yet
        assert!(!engine.usage_snapshot().contains_key("Terminal"));
    }

    #[test]
    fn test_start_is_idempotent() {
        let (engine, _, _) = setup_engine(eager());
        let source = EventSource::new(engine, ScriptedSource::windows(&[]));

        source.start().unwrap();
        source.start().unwrap();
        assert!(source.is_running());

        assert!(source.stop(WAIT));
        assert!(!source.is_running());
        assert!(source.stop(WAIT));
    }

    #[test]
    fn test_start_takes_baseline_from_foreground() {
        let (engine, resolver, _) = setup_engine(eager());
        resolver.insert(WindowHandle(7), "Mail");
        resolver.set_foreground(Some(WindowHandle(7)));

        let source = EventSource::new(Arc::clone(&engine), ScriptedSource::windows(&[]));
        source.start().unwrap();

        assert_eq!(engine.state().last_active_app.as_deref(), Some("Mail"));
        assert!(source.stop(WAIT));
    }

    #[test]
    fn test_stop_times_out_on_stuck_listener() {
        let (engine, _, _) = setup_engine(eager());
        let source = EventSource::new(engine, ScriptedSource::stubborn(Duration::from_millis(500)));

        source.start().unwrap();
        assert!(!source.stop(Duration::from_millis(20)));
        assert!(!source.is_running());
    }

    #[test]
    fn test_failed_listener_leaves_engine_usable() {
        let (engine, resolver, _) = setup_engine(eager());
        resolver.insert(WindowHandle(1), "Editor");
        resolver.set_foreground(Some(WindowHandle(1)));

        let source = EventSource::new(Arc::clone(&engine), ScriptedSource::failing());
        source.start().unwrap();

        assert!(wait_until(WAIT, || !source.is_running()));
        assert!(engine.top_apps(5).len() <= 1);
        engine.pause().unwrap();
        engine.resume().unwrap();

        // A dead listener is reaped and started again
        source.start().unwrap();
        assert!(source.stop(WAIT));
    }

    #[test]
    fn test_restart_after_stop_delivers_events() {
        let (engine, resolver, _) = setup_engine(eager());
        resolver.insert(WindowHandle(4), "Notes");

        let source = EventSource::new(
            Arc::clone(&engine),
            ScriptedSource::windows(&[WindowHandle(4)]),
        );
        source.start().unwrap();
        assert!(source.stop(WAIT));

        engine.pause().unwrap();
        engine.resume().unwrap();
        assert_eq!(engine.state().last_active_app, None);

        source.start().unwrap();
        assert!(wait_until(WAIT, || {
            engine.state().last_active_app.as_deref() == Some("Notes")
        }));
        assert!(source.stop(WAIT));
    }

    #[test]
    fn test_full_queue_does_not_block_listener() {
        let (engine, _, _) = setup_engine(eager());
        let windows: Vec<WindowHandle> = (0..64).map(WindowHandle).collect();
        let source = EventSource::new(engine, ScriptedSource::windows(&windows))
            .with_queue_capacity(1);

        source.start().unwrap();
        assert!(source.stop(WAIT));
    }

    #[test]
    fn test_dropped_switches_are_counted() {
        let (engine, resolver, _) = setup_engine(eager());
        let windows: Vec<WindowHandle> = (1..=10).map(WindowHandle).collect();
        let source = EventSource::new(engine, ScriptedSource::windows(&windows))
            .with_queue_capacity(1);

        let stalled = resolver.stall();
        source.start().unwrap();
        // One switch may be held by the dispatcher, one sits in the queue
        assert!(wait_until(WAIT, || source.dropped_switches() >= 8));
        drop(stalled);

        assert!(source.stop(WAIT));
        assert!((8..=9).contains(&source.dropped_switches()));
    }
}
