use crate::constants::{ARCHIVE_PREFIX, DATA_FILE};
use crate::error::TrackerResult;
use chrono::{DateTime, Local};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::PathBuf;
use std::sync::{Mutex, PoisonError};

const RECORD_DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";
const ARCHIVE_STAMP_FORMAT: &str = "%Y-%m-%d_%H-%M-%S";

#[derive(Serialize)]
struct RecordOut<'a> {
    date: String,
    usage: &'a HashMap<String, f64>,
}

#[derive(Deserialize)]
struct RecordIn {
    #[serde(default)]
    date: Option<String>,
    #[serde(default)]
    usage: HashMap<String, f64>,
}

/// JSON snapshots of the usage ledger inside one data directory.
///
/// Saves are serialized: autosave, on-demand saves and the final save on
/// shutdown share one temporary file for the current record.
pub struct UsageStore {
    dir: PathBuf,
    write_lock: Mutex<()>,
}

impl UsageStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn current_path(&self) -> PathBuf {
        self.dir.join(DATA_FILE)
    }

    /// Writes `usage` as the current record, or as a new archive file.
    pub fn save(&self, usage: &HashMap<String, f64>, archive: bool) -> TrackerResult<PathBuf> {
        fs::create_dir_all(&self.dir)?;

        let now = Local::now();
        let record = RecordOut {
            date: now.format(RECORD_DATE_FORMAT).to_string(),
            usage,
        };
        let json = serde_json::to_string_pretty(&record)?;

        let _guard = self
            .write_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let path = if archive {
            self.write_archive(&json, now)?
        } else {
            self.write_current(&json)?
        };
        info!("Saved usage for {} apps to {}", usage.len(), path.display());
        Ok(path)
    }

    fn write_current(&self, json: &str) -> TrackerResult<PathBuf> {
        let path = self.current_path();
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &path)?;
        Ok(path)
    }

    fn write_archive(&self, json: &str, now: DateTime<Local>) -> TrackerResult<PathBuf> {
        let stamp = now.format(ARCHIVE_STAMP_FORMAT);
        let mut attempt: u32 = 0;
        loop {
            let name = if attempt == 0 {
                format!("{ARCHIVE_PREFIX}{stamp}.json")
            } else {
                format!("{ARCHIVE_PREFIX}{stamp}_{attempt}.json")
            };
            let path = self.dir.join(name);

            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(mut file) => {
                    file.write_all(json.as_bytes())?;
                    file.sync_all()?;
                    return Ok(path);
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => attempt += 1,
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Reads the current record. Never fails: a missing or unreadable file
    /// yields an empty map.
    pub fn load(&self) -> HashMap<String, f64> {
        let path = self.current_path();
        let contents = match fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                info!("No previous usage data at {}", path.display());
                return HashMap::new();
            }
            Err(e) => {
                warn!("Failed to read {}: {e}", path.display());
                return HashMap::new();
            }
        };

        match serde_json::from_str::<RecordIn>(&contents) {
            Ok(record) => {
                info!(
                    "Loaded usage for {} apps (saved {})",
                    record.usage.len(),
                    record.date.as_deref().unwrap_or("at an unknown time")
                );
                record.usage
            }
            Err(e) => {
                warn!("Ignoring malformed usage data in {}: {e}", path.display());
                HashMap::new()
            }
        }
    }
}
