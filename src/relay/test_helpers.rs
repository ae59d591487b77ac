//! Shared test helpers for building MediaRelay instances with scripted stages.

use crate::config::Config;
use crate::delivery::{DeliveryRequest, DeliverySink};
use crate::error::{DeliveryError, ProviderError, ProviderErrorKind, TransformError};
use crate::provider::{ProviderChain, ProviderStrategy};
use crate::relay::{MediaRelay, RelayComponents};
use crate::transform::{TransformCapabilities, Transcoder};
use crate::types::{DeliveryReceipt, JobId, JobInfo, StreamDescriptor};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Config rooted in a fresh temp dir
pub(crate) fn test_config(dir: &TempDir) -> Config {
    let mut config = Config::default();
    config.download.temp_dir = dir.path().join("temp");
    config.download.min_artifact_bytes = 16;
    config.resolve.provider_timeout = Duration::from_secs(5);
    config
}

/// Provider that always returns the same descriptor
pub(crate) struct StaticProvider {
    pub name: &'static str,
    pub descriptor: StreamDescriptor,
    pub calls: AtomicUsize,
}

impl StaticProvider {
    pub fn new(name: &'static str, descriptor: StreamDescriptor) -> Arc<Self> {
        Arc::new(Self {
            name,
            descriptor,
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl ProviderStrategy for StaticProvider {
    fn name(&self) -> &str {
        self.name
    }

    async fn resolve(&self, _source: &str) -> Result<StreamDescriptor, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.descriptor.clone())
    }
}

/// Provider that always fails without touching the network
pub(crate) struct FailingProvider {
    pub name: &'static str,
    pub calls: AtomicUsize,
}

impl FailingProvider {
    pub fn new(name: &'static str) -> Arc<Self> {
        Arc::new(Self {
            name,
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl ProviderStrategy for FailingProvider {
    fn name(&self) -> &str {
        self.name
    }

    async fn resolve(&self, _source: &str) -> Result<StreamDescriptor, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(ProviderError::new(self.name, ProviderErrorKind::HttpStatus(503)))
    }
}

/// Provider that never answers
pub(crate) struct HangingProvider;

#[async_trait]
impl ProviderStrategy for HangingProvider {
    fn name(&self) -> &str {
        "hanging"
    }

    async fn resolve(&self, _source: &str) -> Result<StreamDescriptor, ProviderError> {
        std::future::pending().await
    }
}

/// Provider that panics inside the job task
pub(crate) struct PanickingProvider;

#[async_trait]
impl ProviderStrategy for PanickingProvider {
    fn name(&self) -> &str {
        "panicking"
    }

    async fn resolve(&self, _source: &str) -> Result<StreamDescriptor, ProviderError> {
        panic!("provider exploded");
    }
}

/// What a sink saw when it was called
#[derive(Clone, Debug)]
pub(crate) struct Delivered {
    pub request: DeliveryRequest,
    /// Artifact content at delivery time
    pub content: Vec<u8>,
    /// Thumbnail content at delivery time, if one was passed and readable
    pub thumbnail: Option<Vec<u8>>,
}

/// Sink that records every request
#[derive(Default)]
pub(crate) struct RecordingSink {
    pub delivered: std::sync::Mutex<Vec<Delivered>>,
    pub reject: bool,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn rejecting() -> Arc<Self> {
        Arc::new(Self {
            reject: true,
            ..Default::default()
        })
    }

    pub fn deliveries(&self) -> Vec<Delivered> {
        self.delivered.lock().unwrap().clone()
    }
}

#[async_trait]
impl DeliverySink for RecordingSink {
    async fn deliver(&self, request: &DeliveryRequest) -> Result<DeliveryReceipt, DeliveryError> {
        let content = tokio::fs::read(&request.artifact_path)
            .await
            .map_err(|e| DeliveryError::Transport(e.to_string()))?;
        let thumbnail = match &request.thumbnail_path {
            Some(path) => tokio::fs::read(path).await.ok(),
            None => None,
        };
        let mut delivered = self.delivered.lock().unwrap();
        delivered.push(Delivered {
            request: request.clone(),
            content,
            thumbnail,
        });
        if self.reject {
            return Err(DeliveryError::Rejected("chat not found".into()));
        }
        Ok(DeliveryReceipt {
            confirmation: format!("msg-{}", delivered.len()),
        })
    }

    fn name(&self) -> &'static str {
        "recording"
    }
}

/// Transcoder that copies its input, or fails like a broken ffmpeg
pub(crate) struct FakeTranscoder {
    pub fail: bool,
    pub delay: Option<Duration>,
    pub inputs: std::sync::Mutex<Vec<PathBuf>>,
    pub outputs: std::sync::Mutex<Vec<PathBuf>>,
}

impl FakeTranscoder {
    pub fn copying() -> Arc<Self> {
        Arc::new(Self {
            fail: false,
            delay: None,
            inputs: Default::default(),
            outputs: Default::default(),
        })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            fail: true,
            delay: None,
            inputs: Default::default(),
            outputs: Default::default(),
        })
    }

    pub fn slow(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            fail: false,
            delay: Some(delay),
            inputs: Default::default(),
            outputs: Default::default(),
        })
    }
}

#[async_trait]
impl Transcoder for FakeTranscoder {
    async fn transform(&self, input: &Path, output: &Path) -> Result<(), TransformError> {
        self.inputs.lock().unwrap().push(input.to_path_buf());
        self.outputs.lock().unwrap().push(output.to_path_buf());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail {
            return Err(TransformError::Failed {
                exit_code: Some(1),
                diagnostic: "Invalid data found when processing input".into(),
            });
        }
        tokio::fs::copy(input, output).await.unwrap();
        Ok(())
    }

    fn capabilities(&self) -> TransformCapabilities {
        TransformCapabilities {
            can_transform: true,
        }
    }

    async fn version(&self) -> Option<String> {
        Some("fake 1.0".into())
    }

    fn name(&self) -> &'static str {
        "fake"
    }
}

/// Build a relay from scripted stages
pub(crate) async fn relay_with(
    config: Config,
    providers: Vec<Arc<dyn ProviderStrategy>>,
    transcoder: Arc<dyn Transcoder>,
    sink: Arc<dyn DeliverySink>,
) -> MediaRelay {
    let chain = ProviderChain::new(providers, config.resolve.provider_timeout);
    MediaRelay::with_components(
        config,
        RelayComponents {
            chain,
            transcoder,
            sink,
        },
    )
    .await
    .unwrap()
}

/// Poll until the job is terminal
pub(crate) async fn wait_terminal(relay: &MediaRelay, id: JobId) -> JobInfo {
    tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            let info = relay.status(id).await.unwrap();
            if info.status.is_terminal() {
                return info;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("job did not reach a terminal state")
}

/// Poll until no job task is running
pub(crate) async fn wait_idle(relay: &MediaRelay) {
    tokio::time::timeout(Duration::from_secs(10), async {
        while relay.active_jobs().await > 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("job tasks did not finish");
}

/// Serve `body` at `route` on the mock server
pub(crate) async fn serve_bytes(server: &MockServer, route: &str, body: Vec<u8>) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(body))
        .mount(server)
        .await;
}

/// Descriptor pointing at `route` on the mock server
pub(crate) fn descriptor_at(server: &MockServer, route: &str, title: &str) -> StreamDescriptor {
    StreamDescriptor::new(format!("{}{}", server.uri(), route), title)
}

/// Entries left under the scratch root
pub(crate) fn scratch_entries(config: &Config) -> Vec<PathBuf> {
    match std::fs::read_dir(config.temp_dir()) {
        Ok(entries) => entries.map(|e| e.unwrap().path()).collect(),
        Err(_) => Vec::new(),
    }
}
