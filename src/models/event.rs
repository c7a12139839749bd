use std::fmt;
use std::time::Instant;

/// Opaque native window identifier (HWND on Windows, XID on X11).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WindowHandle(pub u64);

impl fmt::Display for WindowHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// A foreground change observed by the listener, stamped with a monotonic clock.
#[derive(Debug, Clone, Copy)]
pub struct SwitchEvent {
    pub window: WindowHandle,
    pub observed_at: Instant,
}

impl SwitchEvent {
    pub fn new(window: WindowHandle, observed_at: Instant) -> Self {
        Self { window, observed_at }
    }

    pub fn now(window: WindowHandle) -> Self {
        Self::new(window, Instant::now())
    }
}
