//! Scan progress reporting.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use diskstrata_core::{Scan, ScanId};

/// Progress information during a scan.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanProgress {
    /// Scan being reported on.
    pub scan_id: ScanId,
    /// Directory that was just recorded.
    pub current_path: PathBuf,
    /// Number of directories recorded so far.
    pub folders_scanned: u64,
    /// Number of files counted so far.
    pub files_scanned: u64,
    /// Total bytes counted so far.
    pub total_bytes: u64,
    /// Number of recovered errors so far.
    pub warnings_count: u64,
    /// Time elapsed since scan started.
    pub elapsed: Duration,
}

impl ScanProgress {
    /// Calculate scan rate in files per second.
    pub fn files_per_second(&self) -> f64 {
        if self.elapsed.as_secs_f64() > 0.0 {
            self.files_scanned as f64 / self.elapsed.as_secs_f64()
        } else {
            0.0
        }
    }

    /// Calculate scan rate in bytes per second.
    pub fn bytes_per_second(&self) -> f64 {
        if self.elapsed.as_secs_f64() > 0.0 {
            self.total_bytes as f64 / self.elapsed.as_secs_f64()
        } else {
            0.0
        }
    }
}

/// Notification published by the scan engine.
#[derive(Debug, Clone)]
pub enum ScanEvent {
    /// One directory was recorded.
    Progress(ScanProgress),
    /// The scan reached a terminal status (completed, failed or cancelled).
    Finished(Scan),
}

/// Internal progress tracker with timing.
#[derive(Debug)]
pub(crate) struct ProgressTracker {
    start_time: Instant,
    warnings_count: u64,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            warnings_count: 0,
        }
    }

    pub fn record_warning(&mut self) {
        self.warnings_count += 1;
    }

    pub fn snapshot(&self, scan: &Scan, current_path: PathBuf) -> ScanProgress {
        ScanProgress {
            scan_id: scan.id,
            current_path,
            folders_scanned: scan.folders_scanned,
            files_scanned: scan.files_scanned,
            total_bytes: scan.total_bytes,
            warnings_count: self.warnings_count,
            elapsed: self.start_time.elapsed(),
        }
    }
}
