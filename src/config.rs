use crate::constants::{
    AUTOSAVE_INTERVAL_SECS, DEFAULT_LISTEN_ADDR, LISTENER_STOP_TIMEOUT_MS, TRACKING_INTERVAL_SECS,
};
use crate::error::{TrackerError, TrackerResult};
use crate::tracker::TrackerConfig;
use directories::ProjectDirs;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Where foreground switches come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum SourceMode {
    /// Native foreground-change notifications
    #[default]
    Hook,
    /// Sample the foreground window on a fixed tick
    Polling,
}

/// Everything `run` needs, resolved from the command line.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub listen: SocketAddr,
    pub data_dir: PathBuf,
    pub mode: SourceMode,
    pub poll_interval: Duration,
    /// `None` disables periodic saves.
    pub autosave_interval: Option<Duration>,
    pub stop_timeout: Duration,
    pub app_names: Option<PathBuf>,
    pub tracker: TrackerConfig,
}

impl AppConfig {
    pub fn new(data_dir: PathBuf) -> Self {
        Self {
            listen: SocketAddr::from(([127, 0, 0, 1], 5000)),
            data_dir,
            mode: SourceMode::Hook,
            poll_interval: Duration::from_secs(TRACKING_INTERVAL_SECS),
            autosave_interval: Some(Duration::from_secs(AUTOSAVE_INTERVAL_SECS)),
            stop_timeout: Duration::from_millis(LISTENER_STOP_TIMEOUT_MS),
            app_names: None,
            tracker: TrackerConfig::default(),
        }
    }

    pub fn validate(&self) -> TrackerResult<()> {
        self.tracker.validate()?;

        if self.mode == SourceMode::Polling && self.poll_interval.is_zero() {
            return Err(TrackerError::InvalidConfig {
                field: "poll_interval",
                reason: "must be positive in polling mode".into(),
            });
        }
        if self.stop_timeout.is_zero() {
            return Err(TrackerError::InvalidConfig {
                field: "stop_timeout",
                reason: "must be positive".into(),
            });
        }
        if self.autosave_interval.is_some_and(|every| every.is_zero()) {
            return Err(TrackerError::InvalidConfig {
                field: "autosave_interval",
                reason: "use None to disable autosave".into(),
            });
        }
        if let Some(path) = &self.app_names {
            if !path.is_file() {
                return Err(TrackerError::InvalidConfig {
                    field: "app_names",
                    reason: format!("{} is not a file", path.display()),
                });
            }
        }
        Ok(())
    }
}

/// Platform data directory, e.g. `~/.local/share/dwell` on Linux.
pub fn default_data_dir() -> TrackerResult<PathBuf> {
    let proj_dirs = ProjectDirs::from("com", "dwell", "Dwell").ok_or(TrackerError::NoDataDir)?;
    Ok(proj_dirs.data_dir().to_path_buf())
}

/// Parses a listen address, naming the field on failure.
pub fn parse_listen_addr(raw: &str) -> TrackerResult<SocketAddr> {
    raw.parse().map_err(|e| TrackerError::InvalidConfig {
        field: "listen",
        reason: format!(
            "'{raw}' is not a socket address ({e}); expected e.g. {DEFAULT_LISTEN_ADDR}"
        ),
    })
}

/// Converts user-facing seconds into a `Duration`.
pub fn seconds(field: &'static str, secs: f64) -> TrackerResult<Duration> {
    Duration::try_from_secs_f64(secs).map_err(|e| TrackerError::InvalidConfig {
        field,
        reason: format!("{secs} is not a valid number of seconds ({e})"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn config() -> AppConfig {
        AppConfig::new(PathBuf::from("data"))
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = config();
        assert_eq!(config.listen, parse_listen_addr(DEFAULT_LISTEN_ADDR).unwrap());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_polling_requires_interval() {
        let mut config = config();
        config.mode = SourceMode::Polling;
        config.poll_interval = Duration::ZERO;

        assert!(matches!(
            config.validate(),
            Err(TrackerError::InvalidConfig { field: "poll_interval", .. })
        ));

        // Ignored in hook mode
        config.mode = SourceMode::Hook;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_tracker_errors_surface() {
        let mut config = config();
        config.tracker.top_app_limit = 0;
        assert!(matches!(
            config.validate(),
            Err(TrackerError::InvalidConfig { field: "top_app_limit", .. })
        ));
    }

    #[test]
    fn test_zero_timeouts_rejected() {
        let mut config = config();
        config.stop_timeout = Duration::ZERO;
        assert!(config.validate().is_err());

        let mut config = self::config();
        config.autosave_interval = Some(Duration::ZERO);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_missing_app_names_file_rejected() {
        let dir = tempdir().unwrap();
        let mut config = config();
        config.app_names = Some(dir.path().join("absent.json"));
        assert!(matches!(
            config.validate(),
            Err(TrackerError::InvalidConfig { field: "app_names", .. })
        ));
    }

    #[test]
    fn test_listen_addr_parsing() {
        assert!(parse_listen_addr("0.0.0.0:8080").is_ok());
        assert!(matches!(
            parse_listen_addr("localhost"),
            Err(TrackerError::InvalidConfig { field: "listen", .. })
        ));
    }

    #[test]
    fn test_seconds_rejects_negative() {
        assert_eq!(seconds("debounce", 1.5).unwrap(), Duration::from_millis(1500));
        assert!(seconds("debounce", -1.0).is_err());
        assert!(seconds("debounce", f64::NAN).is_err());
    }
}
