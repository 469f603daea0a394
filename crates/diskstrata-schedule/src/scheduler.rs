//! The scheduler loop.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use diskstrata_core::{Scan, ScanStatus, SchedulerConfig, Settings};
use diskstrata_scan::{EngineError, ScanEngine};
use diskstrata_store::{SnapshotStore, StoreError};
use thiserror::Error;
use tokio::task::JoinError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Errors from one scheduler tick.
#[derive(Debug, Error)]
pub enum ScheduleError {
    /// Settings could not be read or written.
    #[error("Settings store error: {0}")]
    Store(#[from] StoreError),

    /// The scan could not be started or recorded.
    #[error("Scan engine error: {0}")]
    Engine(#[from] EngineError),

    /// The blocking scan task panicked.
    #[error("Scan task failed: {0}")]
    Join(#[from] JoinError),
}

/// What a single tick did.
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    /// Automatic scanning is switched off.
    Disabled,
    /// The next scan is not due yet.
    NotDue,
    /// A scan is already running.
    Busy,
    /// A scan ran and reached this terminal state.
    Ran(Scan),
}

/// Starts scans on the interval stored in [`Settings`].
pub struct ScanScheduler<S: ?Sized> {
    engine: Arc<ScanEngine<S>>,
    config: SchedulerConfig,
}

impl<S> ScanScheduler<S>
where
    S: SnapshotStore + ?Sized + 'static,
{
    pub fn new(engine: Arc<ScanEngine<S>>, config: SchedulerConfig) -> Self {
        Self { engine, config }
    }

    /// Read the settings, writing the configured defaults on first use.
    pub fn load_or_init_settings(&self) -> Result<Settings, ScheduleError> {
        let store = self.engine.store();
        if let Some(settings) = store.get_settings()? {
            return Ok(settings);
        }
        let settings = self.config.default_settings.clone();
        store.update_settings(&settings)?;
        info!(
            "Initialized default settings (root {}, every {}h)",
            settings.scan_root_path.display(),
            settings.scan_interval_hours
        );
        Ok(settings)
    }

    /// Run until `shutdown` is cancelled.
    ///
    /// A scan in flight when shutdown arrives is cancelled and awaited, so
    /// its terminal status is recorded before this returns.
    pub async fn run(&self, shutdown: CancellationToken) {
        info!("Scan scheduler started");

        while !shutdown.is_cancelled() {
            let delay = match self.tick(Utc::now(), &shutdown).await {
                Ok(outcome) => {
                    debug!("Scheduler tick: {:?}", outcome);
                    self.config.tick
                }
                Err(e) => {
                    error!("Error in scan scheduler: {}", e);
                    self.config.error_backoff
                }
            };

            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        info!("Scan scheduler stopped");
    }

    /// Check the schedule once at `now` and scan if due.
    ///
    /// Only a `Completed` scan advances the schedule. A `Failed` or
    /// `Cancelled` scan leaves it untouched so the next due check scans again.
    pub async fn tick(
        &self,
        now: DateTime<Utc>,
        shutdown: &CancellationToken,
    ) -> Result<TickOutcome, ScheduleError> {
        let mut settings = self.load_or_init_settings()?;

        if !settings.auto_scan_enabled {
            return Ok(TickOutcome::Disabled);
        }
        if !settings.is_due(now) {
            return Ok(TickOutcome::NotDue);
        }
        if self.engine.is_scanning() {
            debug!("Scan due but another scan is running");
            return Ok(TickOutcome::Busy);
        }

        info!(
            "Starting scheduled scan of {}",
            settings.scan_root_path.display()
        );
        let engine = Arc::clone(&self.engine);
        let root = settings.scan_root_path.clone();
        let mut handle = tokio::task::spawn_blocking(move || engine.start_scan(root));

        let joined = tokio::select! {
            joined = &mut handle => joined,
            _ = shutdown.cancelled() => {
                info!("Shutdown requested, cancelling scheduled scan");
                self.engine.cancel_scan();
                handle.await
            }
        };

        let report = match joined? {
            Ok(report) => report,
            Err(EngineError::AlreadyScanning) => return Ok(TickOutcome::Busy),
            Err(e) => return Err(e.into()),
        };

        match report.scan.status {
            ScanStatus::Completed => {
                settings.record_scan(report.scan.end_time.unwrap_or_else(Utc::now));
                self.engine.store().update_settings(&settings)?;
                if let Some(next) = settings.next_scan_time {
                    info!("Scheduled scan {} finished. Next scan at {}", report.scan.id, next);
                }
            }
            status => {
                warn!(
                    "Scheduled scan {} ended {}; schedule unchanged",
                    report.scan.id, status
                );
            }
        }

        Ok(TickOutcome::Ran(report.scan))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use diskstrata_store::MemoryStore;

    fn scheduler_for(root: &std::path::Path) -> ScanScheduler<MemoryStore> {
        let engine = Arc::new(ScanEngine::new(Arc::new(MemoryStore::new())));
        let config = SchedulerConfig::builder()
            .default_settings(Settings::with_root(root))
            .build()
            .unwrap();
        ScanScheduler::new(engine, config)
    }

    #[test]
    fn test_settings_initialized_once() {
        let temp = tempfile::TempDir::new().unwrap();
        let scheduler = scheduler_for(temp.path());

        let first = scheduler.load_or_init_settings().unwrap();
        assert_eq!(first.scan_root_path, temp.path());
        assert!(first.last_scan_time.is_none());

        let mut changed = first.clone();
        changed.scan_interval_hours = 2;
        scheduler.engine.store().update_settings(&changed).unwrap();
        assert_eq!(scheduler.load_or_init_settings().unwrap(), changed);
    }

    #[tokio::test]
    async fn test_disabled_does_nothing() {
        let temp = tempfile::TempDir::new().unwrap();
        let scheduler = scheduler_for(temp.path());
        let mut settings = scheduler.load_or_init_settings().unwrap();
        settings.auto_scan_enabled = false;
        scheduler.engine.store().update_settings(&settings).unwrap();

        let outcome = scheduler
            .tick(Utc::now(), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(outcome, TickOutcome::Disabled);
        assert!(scheduler.engine.store().list_scans(None).unwrap().is_empty());
    }
}
