//! Shutdown coordination.

use crate::types::Event;
use std::sync::atomic::Ordering;
use std::time::Duration;

use super::MediaRelay;

/// Upper bound on how long shutdown waits for running jobs
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

impl MediaRelay {
    /// Gracefully shut down the relay
    ///
    /// 1. Stops accepting new jobs
    /// 2. Cancels every running job
    /// 3. Waits (at most 30 seconds) for their tasks to release their files
    ///    and record a terminal status
    /// 4. Stops the eviction sweeper
    /// 5. Emits [`Event::Shutdown`]
    ///
    /// Jobs already in the `sending` stage finish their delivery before they
    /// stop.
    pub async fn shutdown(&self) {
        tracing::info!("Initiating graceful shutdown");

        self.tracking.accepting_new.store(false, Ordering::SeqCst);
        tracing::info!("Stopped accepting new jobs");

        self.cancel_all().await;

        match tokio::time::timeout(SHUTDOWN_TIMEOUT, self.wait_for_active_jobs()).await {
            Ok(()) => tracing::info!("All active jobs finished"),
            Err(_) => {
                tracing::warn!("Timeout waiting for jobs to finish, proceeding with shutdown")
            }
        }

        self.tracking.shutdown.cancel();
        self.emit_event(Event::Shutdown);
        tracing::info!("Graceful shutdown complete");
    }

    /// Whether [`shutdown`](Self::shutdown) has started
    pub fn is_shutting_down(&self) -> bool {
        !self.tracking.accepting_new.load(Ordering::SeqCst)
    }

    async fn cancel_all(&self) {
        let active = self.tracking.active.lock().await;
        tracing::debug!(active_count = active.len(), "Cancelling all active jobs");

        for (id, token) in active.iter() {
            tracing::debug!(job_id = %id, "Signaling cancellation");
            token.cancel();
        }
    }

    async fn wait_for_active_jobs(&self) {
        loop {
            let active_count = self.tracking.active.lock().await.len();
            if active_count == 0 {
                return;
            }

            tracing::debug!(active_count, "Waiting for active jobs to finish");
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }
}
