use thiserror::Error;

/// Errors raised by the native platform shims.
#[derive(Debug, Error)]
pub enum PlatformError {
    #[error("Platform integration unavailable: {0}")]
    Unavailable(String),

    #[error("Native call failed: {0}")]
    Native(String),

    #[cfg(target_os = "linux")]
    #[error("Could not connect to X server: {0}")]
    X11Connect(#[from] x11rb::errors::ConnectError),

    #[cfg(target_os = "linux")]
    #[error("X11 connection error: {0}")]
    X11Connection(#[from] x11rb::errors::ConnectionError),

    #[cfg(target_os = "linux")]
    #[error("X11 reply error: {0}")]
    X11Reply(#[from] x11rb::errors::ReplyError),

    #[cfg(target_os = "linux")]
    #[error("X11 id allocation error: {0}")]
    X11Id(#[from] x11rb::errors::ReplyOrIdError),
}

/// Application error type
#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("Invalid {field}: {reason}")]
    InvalidConfig { field: &'static str, reason: String },

    #[error("Could not determine a data directory; pass --data-dir")]
    NoDataDir,

    #[error("Tracker state lock poisoned")]
    LockPoisoned,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Platform error: {0}")]
    Platform(#[from] PlatformError),

    #[error("Failed to spawn {name} thread: {source}")]
    Thread {
        name: &'static str,
        source: std::io::Error,
    },

    #[error("Background task failed: {0}")]
    Task(String),
}

pub type TrackerResult<T> = Result<T, TrackerError>;
