//! Scan records and their lifecycle.

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

use crate::BYTES_PER_GB;
use crate::error::StatusError;

/// Unique identifier of a scan, assigned by the snapshot store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ScanId(pub u64);

impl ScanId {
    /// Create a new ScanId from a u64.
    pub fn new(id: u64) -> Self {
        Self(id)
    }
}

impl fmt::Display for ScanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle status of a scan.
///
/// `Pending -> Running -> {Completed | Failed | Cancelled}`. The last three
/// are terminal: nothing transitions out of them.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ScanStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl ScanStatus {
    /// Check if this status is final.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Statuses a scan is left in when its process dies mid-walk.
    pub const UNFINISHED: [ScanStatus; 2] = [Self::Pending, Self::Running];

    /// Check whether moving from `self` to `next` is allowed.
    pub fn can_transition_to(self, next: ScanStatus) -> bool {
        match self {
            Self::Pending => matches!(next, Self::Running | Self::Failed | Self::Cancelled),
            Self::Running => next.is_terminal(),
            Self::Completed | Self::Failed | Self::Cancelled => false,
        }
    }
}

/// One version of a full-tree snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scan {
    /// Store-assigned identity.
    pub id: ScanId,
    /// When the walk began.
    pub start_time: DateTime<Utc>,
    /// When the scan reached a terminal state.
    pub end_time: Option<DateTime<Utc>>,
    /// Current lifecycle status.
    pub status: ScanStatus,
    /// Failure description, set only for `Failed` scans.
    pub error_message: Option<String>,
    /// Directories visited so far.
    pub folders_scanned: u64,
    /// Files counted so far.
    pub files_scanned: u64,
    /// Bytes counted so far.
    pub total_bytes: u64,
}

impl Scan {
    /// Create a fresh scan record with zeroed counters.
    pub fn new(id: ScanId, start_time: DateTime<Utc>, status: ScanStatus) -> Self {
        Self {
            id,
            start_time,
            end_time: None,
            status,
            error_message: None,
            folders_scanned: 0,
            files_scanned: 0,
            total_bytes: 0,
        }
    }

    /// Add one directory's own contribution to the running counters.
    pub fn record_folder(&mut self, file_count: u64, bytes: u64) {
        self.folders_scanned += 1;
        self.files_scanned += file_count;
        self.total_bytes += bytes;
    }

    /// Move to `Running`.
    pub fn start(&mut self) -> Result<(), StatusError> {
        self.transition(ScanStatus::Running)
    }

    /// Mark the scan as completed at `at`.
    pub fn complete(&mut self, at: DateTime<Utc>) -> Result<(), StatusError> {
        self.transition(ScanStatus::Completed)?;
        self.end_time = Some(at);
        Ok(())
    }

    /// Mark the scan as cancelled at `at`.
    pub fn cancel(&mut self, at: DateTime<Utc>) -> Result<(), StatusError> {
        self.transition(ScanStatus::Cancelled)?;
        self.end_time = Some(at);
        Ok(())
    }

    /// Mark the scan as failed at `at`, recording the failure.
    pub fn fail(&mut self, message: impl Into<String>, at: DateTime<Utc>) -> Result<(), StatusError> {
        self.transition(ScanStatus::Failed)?;
        self.error_message = Some(message.into());
        self.end_time = Some(at);
        Ok(())
    }

    fn transition(&mut self, next: ScanStatus) -> Result<(), StatusError> {
        if !self.status.can_transition_to(next) {
            return Err(StatusError::InvalidTransition {
                scan: self.id,
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(())
    }

    /// Check if the scan reached a final state.
    pub fn is_finished(&self) -> bool {
        self.status.is_terminal()
    }

    /// Wall-clock duration, once the scan has ended.
    pub fn duration(&self) -> Option<Duration> {
        self.end_time.map(|end| end - self.start_time)
    }

    /// Total bytes expressed in gigabytes.
    pub fn total_gb(&self) -> f64 {
        self.total_bytes as f64 / BYTES_PER_GB
    }
}
