//! Directory walking and scan orchestration for diskstrata.
//!
//! # Overview
//!
//! `diskstrata-scan` turns a directory tree into a versioned snapshot:
//!
//! - **Sequential depth-first walk** that persists one node per folder
//! - **Single-flight engine**: a second `start_scan` fails with
//!   [`EngineError::AlreadyScanning`] instead of queueing
//! - **Cooperative cancellation** checked as each directory is entered
//! - **Progress updates** via broadcast channels
//! - **Crash recovery** for scans a dead process left `Running`
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use diskstrata_scan::ScanEngine;
//! use diskstrata_store::MemoryStore;
//!
//! let engine = ScanEngine::new(Arc::new(MemoryStore::new()));
//! let report = engine.start_scan("/mnt").unwrap();
//!
//! println!("Scan {} is {}", report.scan.id, report.scan.status);
//! println!("Total size: {} bytes", report.scan.total_bytes);
//! ```
//!
//! # Progress Monitoring
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use diskstrata_scan::{ScanEngine, ScanEvent};
//! use diskstrata_store::MemoryStore;
//!
//! let engine = ScanEngine::new(Arc::new(MemoryStore::new()));
//! let mut events = engine.subscribe();
//!
//! tokio::spawn(async move {
//!     while let Ok(ScanEvent::Progress(progress)) = events.recv().await {
//!         println!("Scanned {} folders", progress.folders_scanned);
//!     }
//! });
//! ```

mod engine;
mod fs;
mod progress;
mod recovery;
mod walker;

pub use engine::{EngineError, ScanEngine, ScanReport};
pub use fs::{FileEntry, FileSystem, StdFileSystem};
pub use progress::{ScanEvent, ScanProgress};
pub use recovery::recover_stale_scans;
pub use walker::{DirectoryWalker, WalkError};

// Re-export core types for convenience
pub use diskstrata_core::{Scan, ScanConfig, ScanId, ScanStatus, ScanWarning, WarningKind};
