//! Core types for diskstrata.
//!
//! This crate provides the data model shared by every other diskstrata crate:
//! versioned scans and their lifecycle, per-scan folder nodes, the scheduler
//! settings singleton, and configuration.

mod config;
mod error;
mod node;
mod scan;
mod settings;

pub use config::{
    AppConfig, ConfigError, ScanConfig, ScanConfigBuilder, SchedulerConfig,
    SchedulerConfigBuilder,
};
pub use error::{ScanWarning, StatusError, WarningKind};
pub use node::{FolderNode, NewFolderNode, NodeId, display_name};
pub use scan::{Scan, ScanId, ScanStatus};
pub use settings::Settings;

/// Number of bytes in one gigabyte, as used for all GB figures.
pub const BYTES_PER_GB: f64 = 1024.0 * 1024.0 * 1024.0;
