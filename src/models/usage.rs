use log::warn;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;

/// One row of the usage report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopAppEntry {
    pub name: String,
    /// Whole minutes, rounded to nearest.
    #[serde(rename = "timeUsed")]
    pub time_used: u64,
}

/// Accumulated active seconds per application identity.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UsageLedger {
    seconds: HashMap<String, f64>,
}

impl UsageLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `secs` to `app`. Non-positive and non-finite amounts are ignored,
    /// which keeps every entry non-negative.
    pub fn add(&mut self, app: &str, secs: f64) {
        if !secs.is_finite() || secs <= 0.0 {
            return;
        }
        *self.seconds.entry(app.to_string()).or_insert(0.0) += secs;
    }

    pub fn get(&self, app: &str) -> Option<f64> {
        self.seconds.get(app).copied()
    }

    pub fn len(&self) -> usize {
        self.seconds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seconds.is_empty()
    }

    pub fn clear(&mut self) {
        self.seconds.clear();
    }

    /// Merges persisted values: loaded keys overwrite or extend, nothing is removed.
    pub fn merge(&mut self, loaded: HashMap<String, f64>) {
        for (app, secs) in loaded {
            if !secs.is_finite() || secs < 0.0 {
                warn!("Ignoring invalid persisted usage for '{app}': {secs}");
                continue;
            }
            self.seconds.insert(app, secs);
        }
    }

    pub fn snapshot(&self) -> HashMap<String, f64> {
        self.seconds.clone()
    }

    /// Entries sorted by seconds descending, ties by name, truncated to `limit`.
    pub fn top(&self, limit: usize) -> Vec<TopAppEntry> {
        let mut sorted: Vec<(&String, &f64)> = self.seconds.iter().collect();
        sorted.sort_by(|a, b| {
            b.1.partial_cmp(a.1)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.0.cmp(b.0))
        });

        sorted
            .into_iter()
            .take(limit)
            .map(|(name, secs)| TopAppEntry {
                name: name.clone(),
                time_used: seconds_to_minutes(*secs),
            })
            .collect()
    }
}

fn seconds_to_minutes(secs: f64) -> u64 {
    let minutes = (secs / 60.0).round_ties_even();
    if minutes.is_finite() && minutes > 0.0 {
        #[allow(
            clippy::as_conversions,
            clippy::cast_possible_truncation,
            clippy::cast_sign_loss,
            reason = "finite, positive and already rounded; the saturating cast is intended"
        )]
        let whole = minutes as u64;
        whole
    } else {
        0
    }
}
