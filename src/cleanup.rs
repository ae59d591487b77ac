//! Guaranteed removal of a job's transient files
//!
//! Every file a job writes lives in its own scratch directory,
//! `temp_dir/<job-id>/`, and is registered with the job's [`ArtifactGuard`]
//! *before* it is created. The guard is the only thing that deletes those
//! files: [`ArtifactGuard::release`] on normal exit paths, `Drop` when the
//! job's task panics or is aborted.

use crate::error::Result;
use crate::types::JobId;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Outcome of a cleanup pass
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CleanupReport {
    /// Registered files that were deleted
    pub removed: usize,
    /// Registered files that did not exist (never created, or already gone)
    pub missing: usize,
    /// Files or directories that could not be deleted
    pub failed: usize,
}

/// Owns the scratch directory and every registered artifact of one job
#[derive(Debug)]
pub struct ArtifactGuard {
    job_id: JobId,
    dir: PathBuf,
    paths: Vec<PathBuf>,
    released: bool,
}

impl ArtifactGuard {
    /// Create the job's scratch directory under `temp_root`
    pub async fn create(temp_root: &Path, job_id: JobId) -> Result<Self> {
        let dir = temp_root.join(job_id.simple());
        tokio::fs::create_dir_all(&dir).await?;
        debug!(job_id = %job_id, ?dir, "created scratch directory");
        Ok(Self {
            job_id,
            dir,
            paths: Vec::new(),
            released: false,
        })
    }

    /// The job's scratch directory
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Reserve a path inside the scratch directory and register it for cleanup
    ///
    /// `stem` must already be a safe file name (see [`crate::utils::safe_filename`]).
    pub fn reserve(&mut self, stem: &str, extension: &str) -> PathBuf {
        let name = if extension.is_empty() {
            stem.to_string()
        } else {
            format!("{stem}.{extension}")
        };
        let path = self.dir.join(name);
        self.register(path.clone());
        path
    }

    /// Register an arbitrary path for cleanup
    pub fn register(&mut self, path: PathBuf) {
        if !self.paths.contains(&path) {
            self.paths.push(path);
        }
    }

    /// Paths registered so far, in registration order
    pub fn registered(&self) -> &[PathBuf] {
        &self.paths
    }

    /// Whether [`release`](Self::release) has already run
    pub fn is_released(&self) -> bool {
        self.released
    }

    /// Delete every registered artifact, then the scratch directory
    ///
    /// Best-effort: failures are logged and counted, never returned. Runs at
    /// most once; later calls return an empty report.
    pub async fn release(&mut self) -> CleanupReport {
        if self.released {
            return CleanupReport::default();
        }
        self.released = true;

        let mut report = CleanupReport::default();
        for path in &self.paths {
            match tokio::fs::remove_file(path).await {
                Ok(()) => {
                    debug!(job_id = %self.job_id, ?path, "deleted artifact");
                    report.removed += 1;
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    debug!(job_id = %self.job_id, ?path, "artifact already absent");
                    report.missing += 1;
                }
                Err(e) => {
                    warn!(job_id = %self.job_id, ?path, error = %e, "failed to delete artifact");
                    report.failed += 1;
                }
            }
        }

        match tokio::fs::remove_dir_all(&self.dir).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(job_id = %self.job_id, dir = ?self.dir, "scratch directory already absent");
            }
            Err(e) => {
                warn!(job_id = %self.job_id, dir = ?self.dir, error = %e, "failed to remove scratch directory");
                report.failed += 1;
            }
        }

        info!(
            job_id = %self.job_id,
            removed = report.removed,
            missing = report.missing,
            failed = report.failed,
            "cleanup complete"
        );
        report
    }
}

impl Drop for ArtifactGuard {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        warn!(job_id = %self.job_id, "artifact guard dropped without release, cleaning up");

        for path in &self.paths {
            match std::fs::remove_file(path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!(job_id = %self.job_id, ?path, error = %e, "failed to delete artifact"),
            }
        }
        if let Err(e) = std::fs::remove_dir_all(&self.dir)
            && e.kind() != std::io::ErrorKind::NotFound
        {
            warn!(job_id = %self.job_id, dir = ?self.dir, error = %e, "failed to remove scratch directory");
        }
    }
}
