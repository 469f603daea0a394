//! Scheduler settings singleton.

use std::path::PathBuf;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Default hours between scheduled scans.
pub const DEFAULT_SCAN_INTERVAL_HOURS: u32 = 24;

/// Default root path for scheduled scans.
pub const DEFAULT_SCAN_ROOT: &str = "/mnt";

/// Process-wide settings controlling the scan scheduler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Hours between scheduled scans.
    pub scan_interval_hours: u32,
    /// Whether the scheduler may start scans on its own.
    pub auto_scan_enabled: bool,
    /// Path handed to the engine for scheduled scans.
    pub scan_root_path: PathBuf,
    /// When the last scheduled scan finished.
    pub last_scan_time: Option<DateTime<Utc>>,
    /// When the next scheduled scan becomes due.
    pub next_scan_time: Option<DateTime<Utc>>,
}

impl Default for Settings {
    fn default() -> Self {
        Self::with_root(DEFAULT_SCAN_ROOT)
    }
}

impl Settings {
    /// Default settings scanning `root`.
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            scan_interval_hours: DEFAULT_SCAN_INTERVAL_HOURS,
            auto_scan_enabled: true,
            scan_root_path: root.into(),
            last_scan_time: None,
            next_scan_time: None,
        }
    }

    /// Interval between scheduled scans.
    pub fn interval(&self) -> Duration {
        Duration::hours(i64::from(self.scan_interval_hours))
    }

    /// Check whether a scheduled scan is due at `now`.
    ///
    /// A scan is due if none has ever been recorded, or if the next scheduled
    /// time has been reached.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        match (self.last_scan_time, self.next_scan_time) {
            (None, _) => true,
            (Some(_), Some(next)) => now >= next,
            (Some(_), None) => false,
        }
    }

    /// Record a finished scheduled run and plan the next one.
    pub fn record_scan(&mut self, now: DateTime<Utc>) {
        self.last_scan_time = Some(now);
        self.next_scan_time = Some(now + self.interval());
    }
}
