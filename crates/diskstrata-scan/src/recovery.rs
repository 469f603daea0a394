//! Startup cleanup of scans left unfinished by a previous process.

use chrono::{DateTime, Utc};
use diskstrata_core::ScanStatus;
use diskstrata_store::{SnapshotStore, StoreResult};
use tracing::{info, warn};

/// Mark every `Pending` or `Running` scan as `Cancelled` at `now`.
///
/// Must run before any scan starts, with the database's
/// [`ScanLock`](diskstrata_store::ScanLock) held; a scan in flight would be
/// caught too.
///
/// Returns the number of scans updated.
pub fn recover_stale_scans<S>(store: &S, now: DateTime<Utc>) -> StoreResult<usize>
where
    S: SnapshotStore + ?Sized,
{
    let stale = store.scans_with_status(&ScanStatus::UNFINISHED)?;
    let mut recovered = 0;

    for mut scan in stale {
        if let Err(e) = scan.cancel(now) {
            warn!("Cannot recover scan {}: {}", scan.id, e);
            continue;
        }
        store.update_scan(&scan)?;
        recovered += 1;
    }

    if recovered > 0 {
        info!("Marked {recovered} interrupted scan(s) as cancelled");
    }
    Ok(recovered)
}
