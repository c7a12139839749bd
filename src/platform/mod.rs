pub mod types;

pub use types::{EventSink, IdleProbe, Platform, ProcessResolver, StopSignal, WindowEventSource};

#[cfg(target_os = "linux")]
pub mod linux;

#[cfg(target_os = "windows")]
pub mod win32;

use crate::app_names::AppNameTable;
use crate::error::PlatformError;
use crate::models::WindowHandle;
use crossbeam_channel::bounded;
use std::sync::Arc;

/// Builds the native platform bundle, falling back to [`Headless`] when the
/// display cannot be reached.
#[cfg(target_os = "linux")]
pub fn native(names: Arc<AppNameTable>) -> Platform {
    match linux::X11Platform::connect(names) {
        Ok(x11) => {
            let x11 = Arc::new(x11);
            let resolver = Arc::clone(&x11);
            let idle = Arc::clone(&x11);
            Platform {
                name: "x11",
                resolver,
                idle,
                listener: x11,
            }
        }
        Err(e) => {
            log::warn!("X11 unavailable ({e}); window tracking disabled");
            headless()
        }
    }
}

#[cfg(target_os = "windows")]
pub fn native(names: Arc<AppNameTable>) -> Platform {
    let win = Arc::new(win32::WindowsPlatform::new(names));
    let resolver = Arc::clone(&win);
    let idle = Arc::clone(&win);
    Platform {
        name: "win32",
        resolver,
        idle,
        listener: win,
    }
}

// Stub for development on other platforms
#[cfg(not(any(target_os = "linux", target_os = "windows")))]
pub fn native(_names: Arc<AppNameTable>) -> Platform {
    log::warn!("No window tracking backend for this platform; running headless");
    headless()
}

pub fn headless() -> Platform {
    let stub = Arc::new(Headless);
    let resolver = Arc::clone(&stub);
    let idle = Arc::clone(&stub);
    Platform {
        name: "headless",
        resolver,
        idle,
        listener: stub,
    }
}

/// Platform without a display: no foreground window, no events, never idle.
pub struct Headless;

impl ProcessResolver for Headless {
    fn resolve(&self, _window: WindowHandle) -> String {
        crate::constants::UNKNOWN_APP.to_string()
    }

    fn foreground_window(&self) -> Option<WindowHandle> {
        None
    }
}

impl IdleProbe for Headless {
    fn idle_seconds(&self) -> Result<f64, PlatformError> {
        Ok(0.0)
    }
}

impl WindowEventSource for Headless {
    fn listen(&self, _sink: EventSink, stop: &StopSignal) -> Result<(), PlatformError> {
        let (wake_tx, wake_rx) = bounded::<()>(1);
        stop.on_request(move || {
            let _ = wake_tx.try_send(());
        });
        // Either a wake-up or a dropped sender ends the wait
        let _ = wake_rx.recv();
        Ok(())
    }
}
