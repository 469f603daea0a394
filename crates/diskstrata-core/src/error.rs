//! Lifecycle errors and non-fatal scan warnings.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::scan::{ScanId, ScanStatus};

/// Errors raised by scan status transitions.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StatusError {
    /// The requested transition is not part of the lifecycle.
    #[error("scan {scan} cannot move from {from} to {to}")]
    InvalidTransition {
        scan: ScanId,
        from: ScanStatus,
        to: ScanStatus,
    },
}

/// Kind of scan warning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WarningKind {
    /// Permission was denied.
    PermissionDenied,
    /// Error listing a directory.
    ReadError,
    /// Error reading a file's metadata.
    MetadataError,
    /// The folder's path was already recorded in this scan.
    DuplicatePath,
}

/// Non-fatal problem recovered from during a walk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanWarning {
    /// Path where the warning occurred.
    pub path: PathBuf,
    /// Human-readable message.
    pub message: String,
    /// Kind of warning.
    pub kind: WarningKind,
}

impl ScanWarning {
    /// Create a new scan warning.
    pub fn new(path: impl Into<PathBuf>, message: impl Into<String>, kind: WarningKind) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
            kind,
        }
    }

    /// Classify an I/O error hit while listing `path`.
    pub fn from_io(path: impl Into<PathBuf>, error: &std::io::Error) -> Self {
        let path = path.into();
        match error.kind() {
            std::io::ErrorKind::PermissionDenied => Self::permission_denied(path),
            _ => Self {
                message: format!("Read error: {error}"),
                path,
                kind: WarningKind::ReadError,
            },
        }
    }

    /// Create a permission denied warning.
    pub fn permission_denied(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        Self {
            message: format!("Permission denied: {}", path.display()),
            path,
            kind: WarningKind::PermissionDenied,
        }
    }

    /// Create a metadata warning for a file whose size could not be read.
    pub fn metadata_error(path: impl Into<PathBuf>, error: &std::io::Error) -> Self {
        Self {
            path: path.into(),
            message: format!("Metadata error: {error}"),
            kind: WarningKind::MetadataError,
        }
    }

    /// Create a warning for a folder the store already holds in this scan.
    pub fn duplicate_path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        Self {
            message: format!("Already recorded: {}", path.display()),
            path,
            kind: WarningKind::DuplicatePath,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_io_permission_denied() {
        let err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let warning = ScanWarning::from_io("/test/path", &err);
        assert_eq!(warning.kind, WarningKind::PermissionDenied);
        assert!(warning.message.contains("Permission denied"));
    }

    #[test]
    fn test_from_io_other() {
        let err = std::io::Error::other("bad sector");
        let warning = ScanWarning::from_io("/test/path", &err);
        assert_eq!(warning.kind, WarningKind::ReadError);
        assert!(warning.message.contains("bad sector"));
    }

    #[test]
    fn test_invalid_transition_message() {
        let err = StatusError::InvalidTransition {
            scan: ScanId::new(7),
            from: ScanStatus::Completed,
            to: ScanStatus::Running,
        };
        assert_eq!(err.to_string(), "scan 7 cannot move from completed to running");
    }
}
