//! Stream resolution through an ordered chain of providers
//!
//! A [`ProviderStrategy`] turns a source reference (the URL a user submitted)
//! into a [`StreamDescriptor`] that can be fetched directly. Several
//! strategies are configured in order; the [`ProviderChain`] tries each one
//! once, bounded by a per-strategy timeout, and moves to the next on any
//! failure.
//!
//! ## Architecture
//!
//! - [`DirectLinkProvider`]: source already points at a media file
//! - [`ScraperApiProvider`]: HTTP scraping API returning JSON
//! - [`YtDlpProvider`]: local `yt-dlp` metadata dump and format selection
//!
//! Strategies hold no mutable state, so one chain is shared by every job.

mod direct;
mod scraper_api;
mod ytdlp;

pub use direct::DirectLinkProvider;
pub use scraper_api::ScraperApiProvider;
pub use ytdlp::{YtDlpFormat, YtDlpInfo, YtDlpOptions, YtDlpProvider, descriptor_from_info};

use crate::config::{Config, ProviderConfig};
use crate::error::{Error, ProviderError, ProviderErrorKind, Result};
use crate::types::StreamDescriptor;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// One way of resolving a source reference into a fetchable stream
#[async_trait]
pub trait ProviderStrategy: Send + Sync {
    /// Short name for logs and job records (e.g. "yt-dlp")
    fn name(&self) -> &str;

    /// Resolve `source` into a stream descriptor
    ///
    /// Any error means "try the next provider"; it is never retried.
    async fn resolve(&self, source: &str) -> std::result::Result<StreamDescriptor, ProviderError>;

    /// Version of the external tool behind this provider, if any
    async fn version(&self) -> Option<String> {
        None
    }
}

/// Successful chain resolution
#[derive(Clone, Debug)]
pub struct Resolution {
    /// Name of the provider that succeeded
    pub provider: String,
    /// Descriptor it produced
    pub descriptor: StreamDescriptor,
    /// How many providers were tried, including the successful one
    pub attempts: usize,
}

/// Ordered list of provider strategies
#[derive(Clone)]
pub struct ProviderChain {
    strategies: Vec<Arc<dyn ProviderStrategy>>,
    timeout: Duration,
}

impl std::fmt::Debug for ProviderChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderChain")
            .field("strategies", &self.names())
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl ProviderChain {
    /// Create a chain from explicit strategies, tried in the given order
    pub fn new(strategies: Vec<Arc<dyn ProviderStrategy>>, timeout: Duration) -> Self {
        Self {
            strategies,
            timeout,
        }
    }

    /// Build the chain described by `config.providers`
    pub fn from_config(config: &Config) -> Result<Self> {
        let mut strategies: Vec<Arc<dyn ProviderStrategy>> = Vec::with_capacity(config.providers.len());
        for provider in &config.providers {
            let strategy: Arc<dyn ProviderStrategy> = match provider {
                ProviderConfig::DirectLink { extensions } => {
                    Arc::new(DirectLinkProvider::new(extensions.clone()))
                }
                ProviderConfig::ScraperApi {
                    endpoint,
                    api_key,
                    params,
                } => Arc::new(ScraperApiProvider::new(
                    endpoint,
                    api_key.clone(),
                    params.clone(),
                    config.download.connect_timeout,
                )?),
                ProviderConfig::YtDlp {
                    binary,
                    cookies_file,
                    user_agent,
                    extractor_args,
                    geo_bypass,
                    preferred_extension,
                } => Arc::new(YtDlpProvider::new(YtDlpOptions {
                    binary: binary.clone(),
                    cookies_file: cookies_file.clone(),
                    user_agent: user_agent.clone(),
                    extractor_args: extractor_args.clone(),
                    geo_bypass: *geo_bypass,
                    preferred_extension: preferred_extension.clone(),
                })),
            };
            strategies.push(strategy);
        }
        Ok(Self::new(strategies, config.resolve.provider_timeout))
    }

    /// Provider names, in fallback order
    pub fn names(&self) -> Vec<String> {
        self.strategies.iter().map(|s| s.name().to_string()).collect()
    }

    /// Versions reported by providers that wrap an external tool, keyed by provider name
    pub async fn tool_versions(&self) -> BTreeMap<String, String> {
        let mut versions = BTreeMap::new();
        for strategy in &self.strategies {
            if let Some(version) = strategy.version().await {
                versions.insert(strategy.name().to_string(), version);
            }
        }
        versions
    }

    /// Number of strategies
    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    /// Whether the chain has no strategies
    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }

    /// Try each strategy in order until one produces a descriptor
    ///
    /// # Errors
    ///
    /// [`Error::AllProvidersExhausted`] carrying the number of attempts and the
    /// last strategy's error. An empty chain fails with zero attempts.
    pub async fn resolve(&self, source: &str) -> Result<Resolution> {
        let mut last_error = None;

        for (index, strategy) in self.strategies.iter().enumerate() {
            let name = strategy.name();
            debug!(provider = name, source, "trying provider");

            let outcome = match tokio::time::timeout(self.timeout, strategy.resolve(source)).await {
                Ok(outcome) => outcome,
                Err(_) => Err(ProviderError::new(name, ProviderErrorKind::Timeout(self.timeout))),
            };

            match outcome {
                Ok(descriptor) => {
                    info!(provider = name, title = %descriptor.title, attempts = index + 1, "stream resolved");
                    return Ok(Resolution {
                        provider: name.to_string(),
                        descriptor,
                        attempts: index + 1,
                    });
                }
                Err(e) => {
                    warn!(provider = name, error = %e, "provider failed, trying next");
                    last_error = Some(e);
                }
            }
        }

        Err(Error::AllProvidersExhausted {
            attempts: self.strategies.len(),
            last_error,
        })
    }
}
