use clap::Parser;
use dwell_lib::config::{self, AppConfig, SourceMode};
use dwell_lib::constants::{
    AUTOSAVE_INTERVAL_SECS, DEFAULT_LISTEN_ADDR, IDLE_THRESHOLD_SECS, LISTENER_STOP_TIMEOUT_MS,
    TOP_APP_LIMIT, TRACKING_INTERVAL_SECS,
};
use dwell_lib::error::TrackerResult;
use dwell_lib::tracker::TrackerConfig;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

/// Foreground application usage tracker
#[derive(Parser)]
#[command(name = "dwell")]
#[command(
    about = "Tracks time spent in each foreground application and serves it over HTTP",
    long_about = None
)]
#[command(version)]
struct Cli {
    /// Control surface address
    #[arg(long, env = "DWELL_LISTEN", default_value = DEFAULT_LISTEN_ADDR)]
    listen: String,

    /// Directory for usage_data.json and archives
    #[arg(long, env = "DWELL_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Where foreground switches come from
    #[arg(long, env = "DWELL_MODE", value_enum, default_value_t = SourceMode::Hook)]
    mode: SourceMode,

    /// Sampling tick in polling mode
    #[arg(long, env = "DWELL_POLL_INTERVAL_SECS", default_value_t = TRACKING_INTERVAL_SECS)]
    poll_interval_secs: u64,

    /// Input idleness after which time is no longer attributed
    #[arg(long, env = "DWELL_IDLE_THRESHOLD_SECS", default_value_t = IDLE_THRESHOLD_SECS)]
    idle_threshold_secs: u64,

    /// Minimum dwell before a switch counts [default: 1 in hook mode, 5 in polling mode]
    #[arg(long, env = "DWELL_DEBOUNCE_SECS")]
    debounce_secs: Option<f64>,

    /// Entries returned by /api/app-usage
    #[arg(long, env = "DWELL_TOP_APPS", default_value_t = TOP_APP_LIMIT)]
    top_apps: usize,

    /// Autosave interval, 0 disables
    #[arg(long, env = "DWELL_AUTOSAVE_SECS", default_value_t = AUTOSAVE_INTERVAL_SECS)]
    autosave_secs: u64,

    /// How long shutdown waits for the listener threads
    #[arg(long, env = "DWELL_STOP_TIMEOUT_MS", default_value_t = LISTENER_STOP_TIMEOUT_MS)]
    stop_timeout_ms: u64,

    /// JSON object of extra friendly names, e.g. {"obsidian.exe": "Obsidian"}
    #[arg(long, env = "DWELL_APP_NAMES")]
    app_names: Option<PathBuf>,

    /// Log level when RUST_LOG is unset
    #[arg(long, env = "DWELL_LOG_LEVEL", default_value = "info")]
    log_level: String,
}

impl Cli {
    fn into_config(self) -> TrackerResult<AppConfig> {
        let data_dir = match self.data_dir {
            Some(dir) => dir,
            None => config::default_data_dir()?,
        };

        let base = match self.mode {
            SourceMode::Hook => TrackerConfig::default(),
            SourceMode::Polling => TrackerConfig::polling(),
        };
        let debounce = match self.debounce_secs {
            Some(secs) => config::seconds("debounce", secs)?,
            None => base.debounce,
        };

        Ok(AppConfig {
            listen: config::parse_listen_addr(&self.listen)?,
            data_dir,
            mode: self.mode,
            poll_interval: Duration::from_secs(self.poll_interval_secs),
            autosave_interval: (self.autosave_secs > 0)
                .then(|| Duration::from_secs(self.autosave_secs)),
            stop_timeout: Duration::from_millis(self.stop_timeout_ms),
            app_names: self.app_names,
            tracker: TrackerConfig {
                idle_threshold: Duration::from_secs(self.idle_threshold_secs),
                debounce,
                top_app_limit: self.top_apps,
            },
        })
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // RUST_LOG wins over --log-level
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&cli.log_level))
        .init();

    let config = match cli.into_config() {
        Ok(config) => config,
        Err(e) => {
            log::error!("{e}");
            return ExitCode::FAILURE;
        }
    };

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            log::error!("Failed to start async runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(dwell_lib::run(config)) {
        Ok(()) => {
            log::info!("Server has been shut down gracefully.");
            ExitCode::SUCCESS
        }
        Err(e) => {
            log::error!("dwell failed: {e}");
            ExitCode::FAILURE
        }
    }
}
