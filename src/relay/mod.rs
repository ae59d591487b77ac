//! The relay: job submission, pipeline execution and lifecycle, split into
//! focused submodules.
//!
//! - [`pipeline`] - Per-job task: resolve, download, transform, deliver
//! - [`lifecycle`] - Graceful shutdown
//! - [`services`] - Registry eviction sweeper
//! - [`progress`] - Download progress reporting
//! - [`upload`] - Same-request conversion of uploaded files

mod lifecycle;
mod pipeline;
mod progress;
mod services;
mod upload;

pub use upload::ConvertedUpload;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod test_helpers;

use crate::config::Config;
use crate::delivery::{DeliverySink, TelegramSink};
use crate::error::{Error, Result};
use crate::fetch::StreamingDownloader;
use crate::provider::{ProviderChain, Resolution};
use crate::registry::JobRegistry;
use crate::transform::{self, Transcoder};
use crate::types::{Capabilities, Event, JobId, JobInfo, JobStatus, SubmitRequest};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio_util::sync::CancellationToken;

/// Active job tracking
#[derive(Clone)]
pub(crate) struct JobTracking {
    /// Map of running jobs to their cancellation tokens
    pub(crate) active: Arc<tokio::sync::Mutex<HashMap<JobId, CancellationToken>>>,
    /// Whether new submissions are accepted (false once shutdown starts)
    pub(crate) accepting_new: Arc<AtomicBool>,
    /// Cancelled at the end of shutdown to stop background services
    pub(crate) shutdown: CancellationToken,
}

/// Pluggable stages of the pipeline
///
/// [`MediaRelay::new`] builds these from the configuration;
/// [`MediaRelay::with_components`] accepts them directly, which is how tests
/// and embedders substitute their own providers, transcoder or sink.
#[derive(Clone)]
pub struct RelayComponents {
    /// Provider fallback chain
    pub chain: ProviderChain,
    /// Transcoder used when the downloaded container needs conversion
    pub transcoder: Arc<dyn Transcoder>,
    /// Final destination of every artifact
    pub sink: Arc<dyn DeliverySink>,
}

/// Main relay instance (cloneable - all fields are Arc-wrapped)
#[derive(Clone)]
pub struct MediaRelay {
    /// Job registry, shared with every job task
    pub registry: Arc<JobRegistry>,
    /// Event broadcast channel sender (multiple subscribers supported)
    pub(crate) event_tx: tokio::sync::broadcast::Sender<Event>,
    /// Configuration
    pub(crate) config: Arc<Config>,
    pub(crate) chain: Arc<ProviderChain>,
    pub(crate) downloader: Arc<StreamingDownloader>,
    pub(crate) transcoder: Arc<dyn Transcoder>,
    pub(crate) sink: Arc<dyn DeliverySink>,
    pub(crate) tracking: JobTracking,
    /// External tool versions, queried on first use
    pub(crate) tool_versions: Arc<tokio::sync::OnceCell<BTreeMap<String, String>>>,
}

impl std::fmt::Debug for MediaRelay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaRelay")
            .field("chain", &self.chain)
            .finish_non_exhaustive()
    }
}

impl MediaRelay {
    /// Create a relay with the providers, transcoder and Telegram sink the
    /// configuration describes
    ///
    /// # Errors
    ///
    /// [`Error::Config`] for invalid settings or a missing bot token, and
    /// [`Error::Io`] if the temp directory cannot be created.
    pub async fn new(config: Config) -> Result<Self> {
        config.validate()?;

        let chain = ProviderChain::from_config(&config)?;
        let transcoder = transform::from_config(&config.transform);
        let sink: Arc<dyn DeliverySink> = Arc::new(TelegramSink::from_config(&config.delivery)?);

        Self::with_components(
            config,
            RelayComponents {
                chain,
                transcoder,
                sink,
            },
        )
        .await
    }

    /// Create a relay from explicit pipeline components
    ///
    /// Starts the registry eviction sweeper; it stops on [`shutdown`](Self::shutdown).
    pub async fn with_components(config: Config, components: RelayComponents) -> Result<Self> {
        config.validate()?;

        tokio::fs::create_dir_all(config.temp_dir())
            .await
            .map_err(|e| {
                Error::Io(std::io::Error::new(
                    e.kind(),
                    format!(
                        "Failed to create temp directory '{}': {}",
                        config.temp_dir().display(),
                        e
                    ),
                ))
            })?;

        let downloader = StreamingDownloader::new(&config.download)?;

        // Create broadcast channel with buffer size of 1000 events
        let (event_tx, _rx) = tokio::sync::broadcast::channel(1000);

        let transform_caps = components.transcoder.capabilities();
        tracing::info!(
            providers = ?components.chain.names(),
            transcoder = components.transcoder.name(),
            can_transform = transform_caps.can_transform,
            sink = components.sink.name(),
            "Relay pipeline initialized"
        );

        let relay = Self {
            registry: Arc::new(JobRegistry::new(config.registry.retention)),
            event_tx,
            config: Arc::new(config),
            chain: Arc::new(components.chain),
            downloader: Arc::new(downloader),
            transcoder: components.transcoder,
            sink: components.sink,
            tracking: JobTracking {
                active: Arc::new(tokio::sync::Mutex::new(HashMap::new())),
                accepting_new: Arc::new(AtomicBool::new(true)),
                shutdown: CancellationToken::new(),
            },
            tool_versions: Arc::new(tokio::sync::OnceCell::new()),
        };

        relay.start_sweeper();
        Ok(relay)
    }

    /// Accept a job and start it in the background
    ///
    /// Returns as soon as the job is registered in the `queued` state; no
    /// network I/O happens before this returns.
    ///
    /// # Errors
    ///
    /// - [`Error::ShuttingDown`] once [`shutdown`](Self::shutdown) has started
    /// - [`Error::InvalidSource`] if `url` is not an absolute http(s) URL
    /// - [`Error::InvalidSource`] if `recipient` is empty
    ///
    /// # Examples
    ///
    /// ```no_run
    /// # use media_relay::{MediaRelay, SubmitRequest};
    /// # async fn example(relay: MediaRelay) -> media_relay::Result<()> {
    /// let id = relay
    ///     .submit(SubmitRequest {
    ///         url: "https://example.com/track.mp3".into(),
    ///         recipient: "123456".into(),
    ///     })
    ///     .await?;
    /// println!("status: {}", relay.status(id).await?.status);
    /// # Ok(())
    /// # }
    /// ```
    pub async fn submit(&self, request: SubmitRequest) -> Result<JobId> {
        if !self.tracking.accepting_new.load(Ordering::SeqCst) {
            return Err(Error::ShuttingDown);
        }

        let source = validate_source(&request.url)?;
        let recipient = request.recipient.trim().to_string();
        if recipient.is_empty() {
            return Err(Error::InvalidSource {
                source_ref: request.url,
                reason: "recipient is empty".to_string(),
            });
        }

        let id = self.registry.insert(source.clone()).await;
        let token = CancellationToken::new();
        self.tracking.active.lock().await.insert(id, token.clone());

        tracing::info!(job_id = %id, %source, "job queued");
        self.emit_event(Event::Queued {
            id,
            source: source.clone(),
        });

        self.spawn_job(id, source, recipient, token);
        Ok(id)
    }

    /// Snapshot of one job
    ///
    /// # Errors
    ///
    /// [`Error::JobNotFound`] if the id was never issued or has been evicted.
    pub async fn status(&self, id: JobId) -> Result<JobInfo> {
        self.registry.get(id).await
    }

    /// Snapshots of every job still in the registry, oldest first
    pub async fn list_jobs(&self) -> Vec<JobInfo> {
        self.registry.list().await
    }

    /// Request cancellation of a running job
    ///
    /// The job observes the request at its next resolve, download or
    /// transform blocking point and ends in `error` after its files are
    /// removed. Delivery already in progress is not interrupted.
    ///
    /// # Errors
    ///
    /// - [`Error::JobNotFound`] for an unknown id
    /// - [`Error::InvalidTransition`] if the job is already terminal
    pub async fn cancel(&self, id: JobId) -> Result<()> {
        let info = self.registry.get(id).await?;
        if info.status.is_terminal() {
            return Err(Error::InvalidTransition {
                id,
                from: info.status,
                to: JobStatus::Error,
            });
        }

        if let Some(token) = self.tracking.active.lock().await.get(&id) {
            tracing::info!(job_id = %id, status = %info.status, "cancelling job");
            token.cancel();
        }
        Ok(())
    }

    /// Run the provider chain for `url` without creating a job
    ///
    /// # Errors
    ///
    /// [`Error::InvalidSource`] for a malformed URL, otherwise whatever the
    /// chain returns.
    pub async fn resolve(&self, url: &str) -> Result<Resolution> {
        let source = validate_source(url)?;
        self.chain.resolve(&source).await
    }

    /// Subscribe to job events
    ///
    /// Each subscriber receives all events independently. A subscriber that
    /// falls more than 1000 events behind gets `RecvError::Lagged`.
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Get the current configuration
    pub fn get_config(&self) -> Arc<Config> {
        Arc::clone(&self.config)
    }

    /// Providers, transcoder and sink this relay runs with
    ///
    /// The first call runs each external tool's version query; later calls
    /// reuse the result.
    pub async fn capabilities(&self) -> Capabilities {
        let tool_versions = self
            .tool_versions
            .get_or_init(|| async {
                let mut versions = self.chain.tool_versions().await;
                if let Some(version) = self.transcoder.version().await {
                    versions.insert(self.transcoder.name().to_string(), version);
                }
                versions
            })
            .await
            .clone();

        Capabilities {
            providers: self.chain.names(),
            transcoder: self.transcoder.name().to_string(),
            can_transform: self.can_transform(),
            sink: self.sink.name().to_string(),
            tool_versions,
        }
    }

    /// Whether the transcoder can actually convert files
    pub fn can_transform(&self) -> bool {
        self.transcoder.capabilities().can_transform
    }

    /// Number of jobs whose task has not finished yet
    pub async fn active_jobs(&self) -> usize {
        self.tracking.active.lock().await.len()
    }

    /// Emit an event to all subscribers
    ///
    /// With no subscribers the event is dropped.
    pub(crate) fn emit_event(&self, event: Event) {
        self.event_tx.send(event).ok();
    }

    /// Spawn the REST API server in a background task
    pub fn spawn_api_server(self: &Arc<Self>) -> tokio::task::JoinHandle<Result<()>> {
        let relay = self.clone();
        let config = self.config.clone();

        tokio::spawn(async move { crate::api::start_api_server(relay, config).await })
    }
}

/// Check that a source reference is an absolute http(s) URL with a host
fn validate_source(url: &str) -> Result<String> {
    let trimmed = url.trim();
    let invalid = |reason: &str| Error::InvalidSource {
        source_ref: url.to_string(),
        reason: reason.to_string(),
    };

    let parsed = url::Url::parse(trimmed).map_err(|e| invalid(&e.to_string()))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(invalid("only http and https URLs are accepted"));
    }
    if parsed.host_str().is_none_or(str::is_empty) {
        return Err(invalid("URL has no host"));
    }
    Ok(trimmed.to_string())
}
