//! Shared test utilities for dwell.
//!
//! Scriptable stand-ins for the platform traits, plus setup helpers used
//! across test modules.

#![cfg(test)]

use crate::constants::UNKNOWN_APP;
use crate::error::PlatformError;
use crate::models::WindowHandle;
use crate::platform::{EventSink, IdleProbe, ProcessResolver, StopSignal, WindowEventSource};
use crate::store::UsageStore;
use crate::tracker::{AttributionEngine, TrackerConfig};
use crossbeam_channel::bounded;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::{Duration, Instant};
use tempfile::{tempdir, TempDir};

/// Idle probe returning whatever the test last set.
#[derive(Default)]
pub struct FakeIdle {
    secs: Mutex<f64>,
    failing: AtomicBool,
}

impl FakeIdle {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set(&self, secs: f64) {
        *self.secs.lock().unwrap() = secs;
    }

    pub fn fail(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

impl IdleProbe for FakeIdle {
    fn idle_seconds(&self) -> Result<f64, PlatformError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(PlatformError::Native("idle probe unplugged".into()));
        }
        Ok(*self.secs.lock().unwrap())
    }
}

/// Resolver backed by a fixed window → app table.
#[derive(Default)]
pub struct FakeResolver {
    apps: Mutex<HashMap<WindowHandle, String>>,
    foreground: Mutex<Option<WindowHandle>>,
}

impl FakeResolver {
    pub fn with_apps(apps: &[(WindowHandle, &str)]) -> Arc<Self> {
        let resolver = Self::default();
        for (window, app) in apps {
            resolver.insert(*window, app);
        }
        Arc::new(resolver)
    }

    pub fn insert(&self, window: WindowHandle, app: &str) {
        self.apps.lock().unwrap().insert(window, app.to_string());
    }

    pub fn set_foreground(&self, window: Option<WindowHandle>) {
        *self.foreground.lock().unwrap() = window;
    }

    /// Blocks every `resolve` call until the guard is dropped.
    pub fn stall(&self) -> MutexGuard<'_, HashMap<WindowHandle, String>> {
        self.apps.lock().unwrap()
    }
}

impl ProcessResolver for FakeResolver {
    fn resolve(&self, window: WindowHandle) -> String {
        self.apps
            .lock()
            .unwrap()
            .get(&window)
            .cloned()
            .unwrap_or_else(|| UNKNOWN_APP.to_string())
    }

    fn foreground_window(&self) -> Option<WindowHandle> {
        *self.foreground.lock().unwrap()
    }
}

enum Script {
    /// Push the windows, then block until stopped.
    Windows(Vec<WindowHandle>),
    /// Fail straight away.
    Failing,
    /// Ignore the stop request and return after the given time.
    Stubborn(Duration),
}

/// Listener that replays a fixed script instead of watching a display.
pub struct ScriptedSource {
    script: Script,
}

impl ScriptedSource {
    pub fn windows(windows: &[WindowHandle]) -> Arc<Self> {
        Arc::new(Self {
            script: Script::Windows(windows.to_vec()),
        })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            script: Script::Failing,
        })
    }

    pub fn stubborn(lifetime: Duration) -> Arc<Self> {
        Arc::new(Self {
            script: Script::Stubborn(lifetime),
        })
    }
}

impl WindowEventSource for ScriptedSource {
    fn listen(&self, sink: EventSink, stop: &StopSignal) -> Result<(), PlatformError> {
        match &self.script {
            Script::Windows(windows) => {
                for window in windows {
                    if !sink.push(*window) {
                        return Ok(());
                    }
                }
                let (wake_tx, wake_rx) = bounded::<()>(1);
                stop.on_request(move || {
                    let _ = wake_tx.try_send(());
                });
                let _ = wake_rx.recv();
                Ok(())
            }
            Script::Failing => Err(PlatformError::Unavailable("scripted failure".into())),
            Script::Stubborn(lifetime) => {
                thread::sleep(*lifetime);
                Ok(())
            }
        }
    }
}

/// Engine wired to fresh fakes.
pub fn setup_engine(
    config: TrackerConfig,
) -> (Arc<AttributionEngine>, Arc<FakeResolver>, Arc<FakeIdle>) {
    let resolver = FakeResolver::with_apps(&[]);
    let idle = FakeIdle::new();
    let engine = AttributionEngine::new(
        config,
        Arc::<FakeResolver>::clone(&resolver),
        Arc::<FakeIdle>::clone(&idle),
    );
    (Arc::new(engine), resolver, idle)
}

/// Store rooted in a temporary directory. Keep the `TempDir` alive for the
/// duration of the test.
pub fn setup_store() -> (Arc<UsageStore>, TempDir) {
    let dir = tempdir().expect("Failed to create temp directory for test store");
    let store = UsageStore::new(dir.path());
    (Arc::new(store), dir)
}

/// Polls `condition` until it holds or `timeout` passes.
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    condition()
}
