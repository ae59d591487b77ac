//! Per-job pipeline: resolve, download, optional transform, deliver, clean up.

use crate::cleanup::ArtifactGuard;
use crate::delivery::DeliveryRequest;
use crate::error::{Error, Result};
use crate::types::{
    ArtifactKind, DeliveryReceipt, Event, JobId, JobStatus, StreamDescriptor, TransientArtifact,
    UNKNOWN_EXTENSION,
};
use crate::utils::safe_filename;
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio_util::sync::CancellationToken;

use super::MediaRelay;
use super::progress::{ProgressReporterParams, spawn_progress_reporter};

impl MediaRelay {
    /// Spawn the task for one job, wrapped in a supervising task
    ///
    /// The supervisor turns a panic in the job task into a failed job. The
    /// job's [`ArtifactGuard`] is dropped while the panic unwinds, so its
    /// files are gone before the failure is recorded.
    pub(crate) fn spawn_job(
        &self,
        id: JobId,
        source: String,
        recipient: String,
        token: CancellationToken,
    ) {
        let relay = self.clone();
        tokio::spawn(async move {
            let worker = relay.clone();
            let handle =
                tokio::spawn(async move { worker.run_job(id, &source, &recipient, &token).await });

            let outcome = match handle.await {
                Ok(outcome) => outcome,
                Err(e) if e.is_panic() => {
                    tracing::error!(job_id = %id, "job task panicked");
                    Err(Error::Other("job task panicked".to_string()))
                }
                Err(e) => Err(Error::Other(format!("job task aborted: {e}"))),
            };

            relay.finish_job(id, outcome).await;
        });
    }

    /// Run the pipeline inside the job's scratch directory, then release it
    async fn run_job(
        &self,
        id: JobId,
        source: &str,
        recipient: &str,
        token: &CancellationToken,
    ) -> Result<DeliveryReceipt> {
        let mut guard = ArtifactGuard::create(self.config.temp_dir(), id).await?;
        let outcome = self.execute(id, source, recipient, token, &mut guard).await;
        guard.release().await;
        outcome
    }

    async fn execute(
        &self,
        id: JobId,
        source: &str,
        recipient: &str,
        token: &CancellationToken,
        guard: &mut ArtifactGuard,
    ) -> Result<DeliveryReceipt> {
        self.advance(id, JobStatus::Downloading).await?;

        let resolution = cancellable(token, self.chain.resolve(source)).await?;
        let descriptor = resolution.descriptor;
        self.registry
            .set_resolved(id, &resolution.provider, &descriptor.title)
            .await?;
        tracing::info!(
            job_id = %id,
            provider = %resolution.provider,
            attempts = resolution.attempts,
            title = %descriptor.title,
            "stream resolved"
        );
        self.emit_event(Event::Resolved {
            id,
            provider: resolution.provider,
            title: descriptor.title.clone(),
        });

        let container = descriptor.container_extension();
        let extension = container
            .clone()
            .unwrap_or_else(|| UNKNOWN_EXTENSION.to_string());
        let download_path = guard.reserve("source", &extension);
        let downloaded = self.download(id, &descriptor, &download_path, token).await?;

        let thumbnail_path = match &descriptor.thumbnail_url {
            Some(url) if self.config.download.fetch_thumbnail => {
                let path = guard.reserve("thumbnail", "jpg");
                let fetch = async {
                    self.downloader
                        .fetch_thumbnail(url, &path)
                        .await
                        .map_err(Error::from)
                };
                match cancellable(token, fetch).await {
                    Ok(thumbnail) => Some(thumbnail.path),
                    Err(Error::Cancelled) => return Err(Error::Cancelled),
                    Err(e) => {
                        tracing::warn!(job_id = %id, error = %e, "thumbnail fetch failed, continuing without it");
                        None
                    }
                }
            }
            _ => None,
        };

        let delivered = if self.config.transform.needs_transform(container.as_deref()) {
            self.advance(id, JobStatus::Transforming).await?;
            self.emit_event(Event::Transforming { id });

            let target = self.config.transform.target_extension.clone();
            let output = guard.reserve("output", &target);
            self.transform(id, &downloaded, &output, token).await?
        } else {
            tracing::debug!(job_id = %id, %extension, "container accepted as is, skipping transform");
            downloaded
        };

        if token.is_cancelled() {
            return Err(Error::Cancelled);
        }

        self.advance(id, JobStatus::Sending).await?;
        self.emit_event(Event::Sending { id });

        let delivered_extension = delivered
            .path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or(UNKNOWN_EXTENSION);
        let request = DeliveryRequest {
            recipient: recipient.to_string(),
            file_name: format!("{}.{}", safe_filename(&descriptor.title), delivered_extension),
            artifact_path: delivered.path.clone(),
            title: descriptor.title.clone(),
            performer: descriptor.uploader.clone(),
            duration_secs: descriptor.duration_secs,
            thumbnail_path,
        };

        tracing::debug!(job_id = %id, sink = self.sink.name(), file = %request.file_name, "delivering artifact");
        let receipt = self.sink.deliver(&request).await?;
        Ok(receipt)
    }

    /// Stream the descriptor to `destination` while reporting progress
    async fn download(
        &self,
        id: JobId,
        descriptor: &StreamDescriptor,
        destination: &Path,
        token: &CancellationToken,
    ) -> Result<TransientArtifact> {
        let downloaded_bytes = Arc::new(AtomicU64::new(0));
        let reporter_token = token.child_token();
        let reporter = spawn_progress_reporter(ProgressReporterParams {
            id,
            total_bytes: descriptor.size,
            downloaded_bytes: downloaded_bytes.clone(),
            event_tx: self.event_tx.clone(),
            registry: self.registry.clone(),
            cancel_token: reporter_token.clone(),
        });

        let fetch = async {
            self.downloader
                .fetch(descriptor, destination, &downloaded_bytes)
                .await
                .map_err(Error::from)
        };
        let result = cancellable(token, fetch).await;

        reporter_token.cancel();
        reporter.await.ok();
        self.registry
            .set_progress(id, downloaded_bytes.load(Ordering::Relaxed))
            .await?;

        let artifact = result?;
        tracing::info!(job_id = %id, size = artifact.size, path = ?artifact.path, "download complete");
        Ok(artifact)
    }

    /// Convert `input` into `output` with the configured transcoder
    async fn transform(
        &self,
        id: JobId,
        input: &TransientArtifact,
        output: &Path,
        token: &CancellationToken,
    ) -> Result<TransientArtifact> {
        tracing::info!(job_id = %id, transcoder = self.transcoder.name(), input = ?input.path, "transforming artifact");

        let run = async {
            self.transcoder
                .transform(&input.path, output)
                .await
                .map_err(Error::from)
        };
        cancellable(token, run).await?;

        let size = tokio::fs::metadata(output).await?.len();
        Ok(TransientArtifact {
            path: output.to_path_buf(),
            size,
            kind: ArtifactKind::Transformed,
        })
    }

    async fn advance(&self, id: JobId, next: JobStatus) -> Result<()> {
        self.registry.transition(id, next).await.map(|_| ())
    }

    /// Record the job's terminal state and stop tracking it
    ///
    /// Runs after the job's files were released.
    pub(crate) async fn finish_job(&self, id: JobId, outcome: Result<DeliveryReceipt>) {
        match outcome {
            Ok(receipt) => match self.registry.transition(id, JobStatus::Done).await {
                Ok(_) => {
                    tracing::info!(job_id = %id, confirmation = %receipt.confirmation, "job done");
                    self.emit_event(Event::Done {
                        id,
                        confirmation: receipt.confirmation,
                    });
                }
                Err(e) => {
                    tracing::error!(job_id = %id, error = %e, "failed to mark job done");
                }
            },
            Err(error) => {
                let message = error.to_string();
                match self.registry.fail(id, message.clone()).await {
                    Ok(stage) => {
                        if matches!(error, Error::Cancelled) {
                            tracing::info!(job_id = %id, %stage, "job cancelled");
                        } else {
                            tracing::error!(job_id = %id, %stage, error = %message, "job failed");
                        }
                        self.emit_event(Event::Failed {
                            id,
                            stage,
                            error: message,
                        });
                    }
                    Err(e) => {
                        tracing::error!(job_id = %id, error = %e, "failed to record job failure");
                    }
                }
            }
        }

        self.tracking.active.lock().await.remove(&id);
    }
}

/// Run `fut` unless `token` is cancelled first
async fn cancellable<T>(
    token: &CancellationToken,
    fut: impl Future<Output = Result<T>>,
) -> Result<T> {
    tokio::select! {
        biased;
        _ = token.cancelled() => Err(Error::Cancelled),
        result = fut => result,
    }
}
