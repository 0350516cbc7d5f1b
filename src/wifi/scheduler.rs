//! Periodic background scans.

use super::connection::{ConnectionManager, Radio};
use crate::timing::sleep_unless_cancelled;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Spawn a thread that requests a scan every `interval`.
///
/// Scans are skipped while a connect call is running. The thread exits
/// once `cancel` fires.
pub fn spawn_scan_scheduler<R>(
    manager: Arc<ConnectionManager<R>>,
    interval: Duration,
    cancel: CancellationToken,
) -> std::io::Result<JoinHandle<()>>
where
    R: Radio + 'static,
{
    thread::Builder::new()
        .name("wifi-scan".into())
        .spawn(move || {
            log::info!("Scan scheduler started ({:?} interval)", interval);
            loop {
                if let Err(e) = manager.request_scan() {
                    log::warn!("Background scan failed: {}", e);
                }
                if !sleep_unless_cancelled(interval, &cancel) {
                    break;
                }
            }
            log::info!("Scan scheduler stopped");
        })
}
