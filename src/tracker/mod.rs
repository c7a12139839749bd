mod engine;
mod polling;
mod source;

pub use engine::{AttributionEngine, EngineState, EngineStatus};
pub use polling::PollingSource;
pub use source::EventSource;

use crate::constants::{HOOK_DEBOUNCE_SECS, IDLE_THRESHOLD_SECS, POLL_DEBOUNCE_SECS, TOP_APP_LIMIT};
use crate::error::{TrackerError, TrackerResult};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackerConfig {
    /// Input idleness at or beyond which time stops being attributed.
    pub idle_threshold: Duration,
    /// Switches arriving sooner than this after the last one are ignored.
    pub debounce: Duration,
    pub top_app_limit: usize,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            idle_threshold: Duration::from_secs(IDLE_THRESHOLD_SECS),
            debounce: Duration::from_secs(HOOK_DEBOUNCE_SECS),
            top_app_limit: TOP_APP_LIMIT,
        }
    }
}

impl TrackerConfig {
    /// Defaults for the polling source, where every tick is a synthetic switch.
    pub fn polling() -> Self {
        Self {
            debounce: Duration::from_secs(POLL_DEBOUNCE_SECS),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> TrackerResult<()> {
        if self.idle_threshold.is_zero() {
            return Err(TrackerError::InvalidConfig {
                field: "idle_threshold",
                reason: "must be positive".into(),
            });
        }
        if self.debounce >= self.idle_threshold {
            return Err(TrackerError::InvalidConfig {
                field: "debounce",
                reason: format!(
                    "must be shorter than the idle threshold ({}s)",
                    self.idle_threshold.as_secs_f64()
                ),
            });
        }
        if self.top_app_limit == 0 {
            return Err(TrackerError::InvalidConfig {
                field: "top_app_limit",
                reason: "must be at least 1".into(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_hook_variant() {
        let config = TrackerConfig::default();
        assert_eq!(config.idle_threshold, Duration::from_secs(90));
        assert_eq!(config.debounce, Duration::from_secs(1));
        assert_eq!(config.top_app_limit, 5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_polling_uses_longer_debounce() {
        let config = TrackerConfig::polling();
        assert_eq!(config.debounce, Duration::from_secs(5));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_threshold() {
        let config = TrackerConfig {
            idle_threshold: Duration::ZERO,
            debounce: Duration::ZERO,
            ..TrackerConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(TrackerError::InvalidConfig { field: "idle_threshold", .. })
        ));
    }

    #[test]
    fn test_validate_rejects_debounce_beyond_idle() {
        let config = TrackerConfig {
            debounce: Duration::from_secs(120),
            ..TrackerConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(TrackerError::InvalidConfig { field: "debounce", .. })
        ));
    }

    #[test]
    fn test_validate_rejects_empty_report() {
        let config = TrackerConfig {
            top_app_limit: 0,
            ..TrackerConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
