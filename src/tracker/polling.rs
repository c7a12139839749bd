use crate::error::PlatformError;
use crate::platform::{EventSink, ProcessResolver, StopSignal, WindowEventSource};
use crossbeam_channel::{bounded, RecvTimeoutError};
use log::info;
use std::sync::Arc;
use std::time::Duration;

/// Fallback listener for hosts without foreground notifications: samples the
/// foreground window on a fixed tick and reports each sample as a switch.
///
/// Pair it with [`TrackerConfig::polling`](super::TrackerConfig::polling) so
/// back-to-back samples are not debounced away.
pub struct PollingSource {
    resolver: Arc<dyn ProcessResolver>,
    interval: Duration,
}

impl PollingSource {
    pub fn new(resolver: Arc<dyn ProcessResolver>, interval: Duration) -> Self {
        Self { resolver, interval }
    }
}

impl WindowEventSource for PollingSource {
    fn listen(&self, sink: EventSink, stop: &StopSignal) -> Result<(), PlatformError> {
        let (wake_tx, wake_rx) = bounded::<()>(1);
        stop.on_request(move || {
            let _ = wake_tx.try_send(());
        });

        info!("Polling foreground window every {:?}", self.interval);
        loop {
            match wake_rx.recv_timeout(self.interval) {
                Err(RecvTimeoutError::Timeout) => {}
                Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            }
            if let Some(window) = self.resolver.foreground_window() {
                if !sink.push(window) {
                    break;
                }
            }
        }

        info!("Polling stopped");
        Ok(())
    }
}
