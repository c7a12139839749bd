// src/constants.rs

/// Idle time after which the user is considered away (seconds)
pub const IDLE_THRESHOLD_SECS: u64 = 90;

/// Minimum dwell before a hook-delivered switch is accepted (seconds)
pub const HOOK_DEBOUNCE_SECS: u64 = 1;

/// Minimum dwell before a polled switch is accepted (seconds)
pub const POLL_DEBOUNCE_SECS: u64 = 5;

/// Tick of the polling event source (seconds)
pub const TRACKING_INTERVAL_SECS: u64 = 10;

/// Number of entries returned by the usage endpoint
pub const TOP_APP_LIMIT: usize = 5;

/// Capacity of the listener → engine event queue
pub const EVENT_QUEUE_CAPACITY: usize = 256;

/// How long shutdown waits for the listener threads
pub const LISTENER_STOP_TIMEOUT_MS: u64 = 2000;

/// Interval between automatic saves (seconds); 0 disables autosave
pub const AUTOSAVE_INTERVAL_SECS: u64 = 300;

/// Default control surface address
pub const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:5000";

/// Name of the current usage record inside the data directory
pub const DATA_FILE: &str = "usage_data.json";

/// Prefix of archived usage records
pub const ARCHIVE_PREFIX: &str = "archive_usage_";

/// Identity recorded when a window cannot be mapped to a process
pub const UNKNOWN_APP: &str = "Unknown";
