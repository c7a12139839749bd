use crate::error::PlatformError;
use crate::models::{SwitchEvent, WindowHandle};
use crossbeam_channel::{Sender, TrySendError};
use log::warn;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// Seconds since the last keyboard or mouse input.
pub trait IdleProbe: Send + Sync {
    fn idle_seconds(&self) -> Result<f64, PlatformError>;
}

/// Maps native windows to application identities.
pub trait ProcessResolver: Send + Sync {
    /// Never fails: unresolvable windows map to a fallback identity.
    fn resolve(&self, window: WindowHandle) -> String;

    fn foreground_window(&self) -> Option<WindowHandle>;

    fn foreground_app(&self) -> Option<String> {
        self.foreground_window().map(|window| self.resolve(window))
    }
}

/// A native source of foreground-change notifications.
pub trait WindowEventSource: Send + Sync {
    /// Runs the native loop on the calling thread, pushing every foreground
    /// change into `sink` until `stop` is requested.
    fn listen(&self, sink: EventSink, stop: &StopSignal) -> Result<(), PlatformError>;
}

/// Producer half of the listener → engine queue.
#[derive(Clone)]
pub struct EventSink {
    tx: Sender<SwitchEvent>,
    dropped: Arc<AtomicU64>,
}

impl EventSink {
    pub fn new(tx: Sender<SwitchEvent>) -> Self {
        Self {
            tx,
            dropped: Arc::default(),
        }
    }

    /// Counts dropped switches into a counter the caller keeps.
    #[must_use]
    pub fn with_drop_counter(mut self, counter: Arc<AtomicU64>) -> Self {
        self.dropped = counter;
        self
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Stamps and enqueues a switch without blocking the native loop.
    /// Returns false once the consumer is gone.
    ///
    /// A full queue drops the newest switch and counts it: the app that was
    /// in front keeps being credited until a later switch gets through.
    pub fn push(&self, window: WindowHandle) -> bool {
        match self.tx.try_send(SwitchEvent::now(window)) {
            Ok(()) => true,
            Err(TrySendError::Full(event)) => {
                let total = self
                    .dropped
                    .fetch_add(1, Ordering::Relaxed)
                    .saturating_add(1);
                warn!(
                    "Event queue full, dropped switch to {} ({total} dropped so far)",
                    event.window
                );
                true
            }
            Err(TrySendError::Disconnected(_)) => false,
        }
    }
}

type Waker = Box<dyn FnOnce() + Send>;

/// Cross-thread quit request for a native listener loop.
///
/// The loop registers how it is woken (a posted quit message, a client
/// message, a channel send); `request` runs that action exactly once.
#[derive(Clone, Default)]
pub struct StopSignal {
    inner: Arc<StopInner>,
}

#[derive(Default)]
struct StopInner {
    requested: AtomicBool,
    waker: Mutex<Option<Waker>>,
}

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_requested(&self) -> bool {
        self.inner.requested.load(Ordering::SeqCst)
    }

    pub fn request(&self) {
        let waker = {
            let mut slot = self
                .inner
                .waker
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            self.inner.requested.store(true, Ordering::SeqCst);
            slot.take()
        };
        if let Some(wake) = waker {
            wake();
        }
    }

    /// Registers the wake-up action. Runs it immediately if a stop was
    /// already requested.
    pub fn on_request(&self, wake: impl FnOnce() + Send + 'static) {
        let mut slot = self
            .inner
            .waker
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if self.inner.requested.load(Ordering::SeqCst) {
            drop(slot);
            wake();
        } else {
            *slot = Some(Box::new(wake));
        }
    }
}

/// Everything the tracker needs from the host platform.
pub struct Platform {
    pub name: &'static str,
    pub resolver: Arc<dyn ProcessResolver>,
    pub idle: Arc<dyn IdleProbe>,
    pub listener: Arc<dyn WindowEventSource>,
}
