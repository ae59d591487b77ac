//! Waiting helpers and custom assertions

use media_relay::{Event, JobId, JobInfo, JobStatus, MediaRelay};
use std::path::Path;
use std::time::Duration;

/// Result of waiting for a job to finish
#[derive(Debug)]
pub enum WaitResult {
    /// Job delivered, with the sink's confirmation
    Done(String),
    /// Job failed in `stage` with `error`
    Failed {
        /// Status the job was in when it failed
        stage: JobStatus,
        /// Error message
        error: String,
    },
    /// Timeout waiting for a terminal event
    Timeout,
    /// Channel closed unexpectedly
    ChannelClosed,
}

/// Wait for the `Done` or `Failed` event of job `id`
///
/// Subscribe with `events` before submitting so no event is missed.
pub async fn wait_for_outcome(
    events: &mut tokio::sync::broadcast::Receiver<Event>,
    id: JobId,
    timeout: Duration,
) -> WaitResult {
    let result = tokio::time::timeout(timeout, async {
        loop {
            match events.recv().await {
                Ok(Event::Done {
                    id: event_id,
                    confirmation,
                }) if event_id == id => return WaitResult::Done(confirmation),
                Ok(Event::Failed {
                    id: event_id,
                    stage,
                    error,
                }) if event_id == id => return WaitResult::Failed { stage, error },
                Ok(_) => continue,
                Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                Err(tokio::sync::broadcast::error::RecvError::Closed) => {
                    return WaitResult::ChannelClosed;
                }
            }
        }
    })
    .await;

    result.unwrap_or(WaitResult::Timeout)
}

/// Status snapshot of a job that must still be in the registry
pub async fn job_info(relay: &MediaRelay, id: JobId) -> JobInfo {
    relay
        .status(id)
        .await
        .unwrap_or_else(|e| panic!("job {id} should be known: {e}"))
}

/// Assert that no job left anything in the scratch root
pub fn assert_scratch_empty(temp_dir: &Path) {
    let leftovers: Vec<_> = match std::fs::read_dir(temp_dir) {
        Ok(entries) => entries.filter_map(|e| e.ok()).map(|e| e.path()).collect(),
        Err(_) => Vec::new(),
    };
    assert!(
        leftovers.is_empty(),
        "scratch storage should be empty, found {leftovers:?}"
    );
}
