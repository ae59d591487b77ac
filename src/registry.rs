//! In-memory job registry
//!
//! The registry owns every [`JobRecord`]. Job tasks change records only
//! through [`JobRegistry::transition`] and friends, which enforce the status
//! state machine; readers get [`JobInfo`] snapshots. Terminal records are
//! evicted by [`JobRegistry::sweep`] once their retention window has passed.

use crate::error::{Error, Result};
use crate::types::{JobId, JobInfo, JobStatus};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::debug;

/// A job as tracked by the registry
#[derive(Clone, Debug)]
pub struct JobRecord {
    /// Job ID
    pub id: JobId,
    /// Source reference
    pub source: String,
    /// Current status
    pub status: JobStatus,
    /// Failure message, set together with [`JobStatus::Error`]
    pub error: Option<String>,
    /// Title reported by the provider
    pub title: Option<String>,
    /// Provider that resolved the stream
    pub provider: Option<String>,
    /// Bytes downloaded so far
    pub downloaded_bytes: u64,
    /// Submission time
    pub created_at: DateTime<Utc>,
    /// Last change
    pub updated_at: DateTime<Utc>,
    /// Monotonic time the job became terminal
    finished_at: Option<Instant>,
}

impl JobRecord {
    fn new(id: JobId, source: String) -> Self {
        let now = Utc::now();
        Self {
            id,
            source,
            status: JobStatus::Queued,
            error: None,
            title: None,
            provider: None,
            downloaded_bytes: 0,
            created_at: now,
            updated_at: now,
            finished_at: None,
        }
    }

    /// Snapshot for status polling
    pub fn info(&self) -> JobInfo {
        JobInfo {
            id: self.id,
            source: self.source.clone(),
            status: self.status,
            error: self.error.clone(),
            title: self.title.clone(),
            provider: self.provider.clone(),
            downloaded_bytes: self.downloaded_bytes,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// Concurrent map from job id to job record
#[derive(Debug)]
pub struct JobRegistry {
    jobs: RwLock<HashMap<JobId, JobRecord>>,
    retention: Duration,
}

impl JobRegistry {
    /// Create an empty registry that keeps terminal jobs for `retention`
    pub fn new(retention: Duration) -> Self {
        Self {
            jobs: RwLock::new(HashMap::new()),
            retention,
        }
    }

    /// Retention window for terminal jobs
    pub fn retention(&self) -> Duration {
        self.retention
    }

    /// Insert a new job in the `queued` state and return its id
    pub async fn insert(&self, source: impl Into<String>) -> JobId {
        let id = JobId::new();
        let record = JobRecord::new(id, source.into());
        self.jobs.write().await.insert(id, record);
        id
    }

    /// Snapshot of one job
    pub async fn get(&self, id: JobId) -> Result<JobInfo> {
        self.jobs
            .read()
            .await
            .get(&id)
            .map(JobRecord::info)
            .ok_or(Error::JobNotFound(id))
    }

    /// Snapshots of every job, oldest first
    pub async fn list(&self) -> Vec<JobInfo> {
        let mut jobs: Vec<JobInfo> = self.jobs.read().await.values().map(JobRecord::info).collect();
        jobs.sort_by_key(|job| job.created_at);
        jobs
    }

    /// Number of records currently held
    pub async fn len(&self) -> usize {
        self.jobs.read().await.len()
    }

    /// Whether the registry holds no records
    pub async fn is_empty(&self) -> bool {
        self.jobs.read().await.is_empty()
    }

    /// Move a job to `next`, returning the status it left
    ///
    /// Use [`fail`](Self::fail) to enter [`JobStatus::Error`], so the message
    /// is recorded in the same update.
    pub async fn transition(&self, id: JobId, next: JobStatus) -> Result<JobStatus> {
        let mut jobs = self.jobs.write().await;
        let record = jobs.get_mut(&id).ok_or(Error::JobNotFound(id))?;
        let from = record.status;
        if next == JobStatus::Error || !from.can_transition_to(next) {
            return Err(Error::InvalidTransition { id, from, to: next });
        }

        record.status = next;
        record.touch();
        if next.is_terminal() {
            record.finished_at = Some(Instant::now());
        }
        debug!(job_id = %id, %from, to = %next, "job transitioned");
        Ok(from)
    }

    /// Move a job to `error` with the given message, returning the status it left
    pub async fn fail(&self, id: JobId, message: impl Into<String>) -> Result<JobStatus> {
        let mut jobs = self.jobs.write().await;
        let record = jobs.get_mut(&id).ok_or(Error::JobNotFound(id))?;
        let from = record.status;
        if !from.can_transition_to(JobStatus::Error) {
            return Err(Error::InvalidTransition {
                id,
                from,
                to: JobStatus::Error,
            });
        }

        record.status = JobStatus::Error;
        record.error = Some(message.into());
        record.finished_at = Some(Instant::now());
        record.touch();
        debug!(job_id = %id, %from, "job failed");
        Ok(from)
    }

    /// Record which provider resolved the job and the media title
    pub async fn set_resolved(&self, id: JobId, provider: &str, title: &str) -> Result<()> {
        let mut jobs = self.jobs.write().await;
        let record = jobs.get_mut(&id).ok_or(Error::JobNotFound(id))?;
        record.provider = Some(provider.to_string());
        record.title = Some(title.to_string());
        record.touch();
        Ok(())
    }

    /// Record download progress
    pub async fn set_progress(&self, id: JobId, bytes: u64) -> Result<()> {
        let mut jobs = self.jobs.write().await;
        let record = jobs.get_mut(&id).ok_or(Error::JobNotFound(id))?;
        record.downloaded_bytes = bytes;
        record.touch();
        Ok(())
    }

    /// Remove terminal jobs whose retention window has passed
    ///
    /// Returns the ids that were evicted. Non-terminal jobs are never evicted.
    pub async fn sweep(&self) -> Vec<JobId> {
        let now = Instant::now();
        let mut jobs = self.jobs.write().await;
        let expired: Vec<JobId> = jobs
            .values()
            .filter(|record| {
                record
                    .finished_at
                    .is_some_and(|finished| now.duration_since(finished) >= self.retention)
            })
            .map(|record| record.id)
            .collect();

        for id in &expired {
            jobs.remove(id);
        }
        expired
    }
}
