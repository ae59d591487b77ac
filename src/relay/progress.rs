//! Download progress reporting.

use crate::registry::JobRegistry;
use crate::types::{Event, JobId};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Interval between progress update emissions
const PROGRESS_UPDATE_INTERVAL: Duration = Duration::from_millis(500);

/// Parameters for spawning a progress reporter background task
pub(crate) struct ProgressReporterParams {
    /// Job ID
    pub id: JobId,
    /// Declared size of the stream, if known
    pub total_bytes: Option<u64>,
    /// Counter the downloader updates as it writes
    pub downloaded_bytes: Arc<AtomicU64>,
    /// Event broadcast sender
    pub event_tx: tokio::sync::broadcast::Sender<Event>,
    /// Registry to record progress in
    pub registry: Arc<JobRegistry>,
    /// Stops the reporter
    pub cancel_token: tokio_util::sync::CancellationToken,
}

/// Spawn a background task that periodically reports download progress.
///
/// Only changes are reported; an idle interval emits nothing.
pub(crate) fn spawn_progress_reporter(
    params: ProgressReporterParams,
) -> tokio::task::JoinHandle<()> {
    let ProgressReporterParams {
        id,
        total_bytes,
        downloaded_bytes,
        event_tx,
        registry,
        cancel_token,
    } = params;
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(PROGRESS_UPDATE_INTERVAL);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        let mut last_reported = 0;

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let current = downloaded_bytes.load(Ordering::Relaxed);
                    if current == last_reported {
                        continue;
                    }
                    last_reported = current;

                    if let Err(e) = registry.set_progress(id, current).await {
                        tracing::debug!(job_id = %id, error = %e, "Failed to record progress");
                    }

                    event_tx
                        .send(Event::Downloading {
                            id,
                            bytes: current,
                            total: total_bytes,
                        })
                        .ok();
                }
                _ = cancel_token.cancelled() => {
                    break;
                }
            }
        }
    })
}
