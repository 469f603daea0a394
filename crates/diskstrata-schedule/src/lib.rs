//! Interval-based scan scheduling for diskstrata.
//!
//! [`ScanScheduler`] wakes up on a fixed tick, reads the persisted
//! [`Settings`] and starts a scan through the shared [`ScanEngine`] when one
//! is due. The scan itself runs on a blocking thread; the loop only waits.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use diskstrata_core::SchedulerConfig;
//! use diskstrata_scan::ScanEngine;
//! use diskstrata_schedule::ScanScheduler;
//! use diskstrata_store::MemoryStore;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() {
//! let engine = Arc::new(ScanEngine::new(Arc::new(MemoryStore::new())));
//! let scheduler = ScanScheduler::new(engine, SchedulerConfig::default());
//!
//! let shutdown = CancellationToken::new();
//! scheduler.run(shutdown.clone()).await;
//! # }
//! ```

mod scheduler;

pub use scheduler::{ScanScheduler, ScheduleError, TickOutcome};

// Re-export core types for convenience
pub use diskstrata_core::{SchedulerConfig, Settings};
