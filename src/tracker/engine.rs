use super::TrackerConfig;
use crate::error::{TrackerError, TrackerResult};
use crate::models::{SwitchEvent, TopAppEntry, UsageLedger};
use crate::platform::{IdleProbe, ProcessResolver};
use log::{debug, info, warn};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// Attribution state between two foreground changes.
///
/// `last_switch == None` means no baseline has been taken yet: the next event
/// seeds the state instead of attributing anything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EngineState {
    pub last_active_app: Option<String>,
    pub last_switch: Option<Instant>,
    pub paused: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineStatus {
    pub paused: bool,
    pub active_app: Option<String>,
    pub tracked_apps: usize,
}

#[derive(Debug, Default)]
struct Tracked {
    ledger: UsageLedger,
    state: EngineState,
}

/// Turns foreground switches into per-application active seconds.
///
/// Every switch credits the time since the previous one to the application
/// that was in front, minus any trailing idle stretch. The ledger and the
/// attribution state share one lock so a switch, a pause and a report never
/// interleave.
pub struct AttributionEngine {
    config: TrackerConfig,
    resolver: Arc<dyn ProcessResolver>,
    idle: Arc<dyn IdleProbe>,
    inner: Mutex<Tracked>,
}

impl AttributionEngine {
    pub fn new(
        config: TrackerConfig,
        resolver: Arc<dyn ProcessResolver>,
        idle: Arc<dyn IdleProbe>,
    ) -> Self {
        Self {
            config,
            resolver,
            idle,
            inner: Mutex::new(Tracked::default()),
        }
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    // The event path and reads keep running on a poisoned lock; a panic in
    // one handler must not stop attribution for the rest of the session.
    fn lock(&self) -> MutexGuard<'_, Tracked> {
        self.inner.lock().unwrap_or_else(|poisoned: PoisonError<_>| {
            warn!("Tracker state lock was poisoned; continuing with last state");
            poisoned.into_inner()
        })
    }

    fn lock_checked(&self) -> TrackerResult<MutexGuard<'_, Tracked>> {
        self.inner.lock().map_err(|_| TrackerError::LockPoisoned)
    }

    pub fn handle_foreground_change(&self, event: SwitchEvent) {
        let mut tracked = self.lock();
        self.apply(&mut tracked, event);
    }

    fn apply(&self, tracked: &mut Tracked, event: SwitchEvent) {
        let Tracked { ledger, state } = tracked;
        let now = event.observed_at;

        if state.paused {
            debug!("[paused] ignoring switch to {}", event.window);
            return;
        }

        let Some(last_switch) = state.last_switch else {
            let app = self.resolver.resolve(event.window);
            info!("Tracking started with {app}");
            state.last_active_app = Some(app);
            state.last_switch = Some(now);
            return;
        };

        let elapsed = now.saturating_duration_since(last_switch);
        if elapsed.is_zero() {
            // Out-of-order or duplicate stamp; keep the later baseline
            state.last_switch = Some(last_switch.max(now));
            return;
        }

        let idle = self.idle_duration();
        if idle >= self.config.idle_threshold {
            let active = elapsed.saturating_sub(idle);
            if let Some(app) = state.last_active_app.take() {
                credit(ledger, &app, active);
                info!(
                    "[idle] {app} credited {:.1}s, {:.0}s idle excluded",
                    active.as_secs_f64(),
                    idle.as_secs_f64()
                );
            }
            state.last_switch = Some(now);
            return;
        }

        if elapsed < self.config.debounce {
            debug!(
                "[debounce] switch to {} ignored after {:.3}s",
                event.window,
                elapsed.as_secs_f64()
            );
            return;
        }

        if let Some(app) = state.last_active_app.as_deref() {
            credit(ledger, app, elapsed);
        }

        let app = self.resolver.resolve(event.window);
        if state.last_active_app.as_deref() != Some(app.as_str()) {
            debug!(
                "[switch] {} -> {app}",
                state.last_active_app.as_deref().unwrap_or("(none)")
            );
        }
        state.last_active_app = Some(app);
        state.last_switch = Some(now);
    }

    /// Credits the dwell of the current application up to `now` without
    /// changing which application is in front.
    fn settle(&self, tracked: &mut Tracked, now: Instant) {
        let Tracked { ledger, state } = tracked;
        if state.paused {
            return;
        }
        let (Some(app), Some(since)) = (state.last_active_app.as_deref(), state.last_switch) else {
            return;
        };

        let elapsed = now.saturating_duration_since(since);
        if elapsed.is_zero() {
            return;
        }

        let idle = self.idle_duration();
        let active = if idle >= self.config.idle_threshold {
            elapsed.saturating_sub(idle)
        } else {
            elapsed
        };
        credit(ledger, app, active);
    }

    fn seed(&self, state: &mut EngineState, now: Instant) {
        match self.resolver.foreground_app() {
            Some(app) => {
                debug!("Baseline taken with {app} in front");
                state.last_active_app = Some(app);
                state.last_switch = Some(now);
            }
            None => {
                debug!("No foreground window; waiting for the first switch");
                state.last_active_app = None;
                state.last_switch = None;
            }
        }
    }

    fn idle_duration(&self) -> Duration {
        match self.idle.idle_seconds() {
            Ok(secs) => Duration::try_from_secs_f64(secs).unwrap_or_else(|_| {
                warn!("Idle probe returned {secs}; treating as active");
                Duration::ZERO
            }),
            Err(e) => {
                warn!("Idle probe failed, treating as active: {e}");
                Duration::ZERO
            }
        }
    }

    pub fn pause(&self) -> TrackerResult<()> {
        self.pause_at(Instant::now())
    }

    pub fn pause_at(&self, now: Instant) -> TrackerResult<()> {
        let mut tracked = self.lock_checked()?;
        if tracked.state.paused {
            debug!("Tracking already paused");
            return Ok(());
        }

        self.settle(&mut tracked, now);
        tracked.state = EngineState {
            last_active_app: None,
            last_switch: Some(now),
            paused: true,
        };
        info!("Tracking paused");
        Ok(())
    }

    pub fn resume(&self) -> TrackerResult<()> {
        self.resume_at(Instant::now())
    }

    /// Clears the pause and takes a fresh baseline from whatever is in front.
    /// Resuming a running engine settles the pending dwell first.
    pub fn resume_at(&self, now: Instant) -> TrackerResult<()> {
        let mut tracked = self.lock_checked()?;
        if !tracked.state.paused {
            self.settle(&mut tracked, now);
        }
        tracked.state.paused = false;
        self.seed(&mut tracked.state, now);
        info!("Tracking resumed");
        Ok(())
    }

    /// Synthetic resume issued when the listener (re)starts. Does nothing
    /// while paused.
    pub fn rebaseline(&self) {
        self.rebaseline_at(Instant::now());
    }

    pub fn rebaseline_at(&self, now: Instant) {
        let mut tracked = self.lock();
        if tracked.state.paused {
            debug!("Paused; keeping current baseline");
            return;
        }
        self.settle(&mut tracked, now);
        self.seed(&mut tracked.state, now);
    }

    /// Empties the ledger. The baseline and the current application stay.
    pub fn reset(&self) -> TrackerResult<()> {
        let mut tracked = self.lock_checked()?;
        tracked.ledger.clear();
        info!("Tracking data reset");
        Ok(())
    }

    pub fn merge_usage(&self, loaded: HashMap<String, f64>) {
        if loaded.is_empty() {
            return;
        }
        let count = loaded.len();
        self.lock().ledger.merge(loaded);
        info!("Merged {count} persisted usage entries");
    }

    pub fn usage_snapshot(&self) -> HashMap<String, f64> {
        self.lock().ledger.snapshot()
    }

    pub fn top_apps(&self, limit: usize) -> Vec<TopAppEntry> {
        self.lock().ledger.top(limit)
    }

    pub fn status(&self) -> EngineStatus {
        let tracked = self.lock();
        EngineStatus {
            paused: tracked.state.paused,
            active_app: tracked.state.last_active_app.clone(),
            tracked_apps: tracked.ledger.len(),
        }
    }

    pub fn state(&self) -> EngineState {
        self.lock().state.clone()
    }
}

fn credit(ledger: &mut UsageLedger, app: &str, active: Duration) {
    if active.is_zero() {
        return;
    }
    let secs = active.as_secs_f64();
    ledger.add(app, secs);
    debug!("[attributed] +{secs:.2}s -> {app}");
}
