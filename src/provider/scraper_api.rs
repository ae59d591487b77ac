//! Provider backed by an HTTP scraping API

use super::ProviderStrategy;
use crate::error::{Error, ProviderError, ProviderErrorKind};
use crate::types::StreamDescriptor;
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::debug;

/// JSON payload returned by the scraping API
///
/// Field aliases cover the common spellings used by hosted scrapers.
#[derive(Debug, Deserialize)]
struct ScraperResponse {
    #[serde(default, alias = "link", alias = "download_url")]
    url: Option<String>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    headers: BTreeMap<String, String>,
    #[serde(default, alias = "filesize")]
    size: Option<u64>,
    #[serde(default, alias = "mime")]
    mime_type: Option<String>,
    #[serde(default, alias = "ext")]
    extension: Option<String>,
    #[serde(default, alias = "author")]
    uploader: Option<String>,
    #[serde(default, alias = "duration")]
    duration_secs: Option<f64>,
    #[serde(default, alias = "thumbnail")]
    thumbnail_url: Option<String>,
}

/// Resolves sources by asking a scraping API for a direct stream URL
///
/// Sends `GET <endpoint>?url=<source>&<params...>` with the optional API key in
/// `X-Api-Key`, and expects a JSON object with at least a `url` field.
#[derive(Clone, Debug)]
pub struct ScraperApiProvider {
    client: reqwest::Client,
    endpoint: url::Url,
    api_key: Option<String>,
    params: BTreeMap<String, String>,
}

impl ScraperApiProvider {
    /// Create a provider for `endpoint`
    ///
    /// # Errors
    ///
    /// [`Error::Config`] if the endpoint is not a valid URL, or
    /// [`Error::Network`] if the HTTP client cannot be built.
    pub fn new(
        endpoint: &str,
        api_key: Option<String>,
        params: BTreeMap<String, String>,
        connect_timeout: Duration,
    ) -> crate::Result<Self> {
        let endpoint = url::Url::parse(endpoint).map_err(|e| Error::Config {
            message: format!("invalid scraper endpoint '{endpoint}': {e}"),
            key: Some("providers.endpoint".to_string()),
        })?;
        let client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .build()?;

        Ok(Self {
            client,
            endpoint,
            api_key,
            params,
        })
    }

    fn fail(&self, kind: ProviderErrorKind) -> ProviderError {
        ProviderError::new(self.name(), kind)
    }
}

#[async_trait]
impl ProviderStrategy for ScraperApiProvider {
    fn name(&self) -> &str {
        "scraper-api"
    }

    async fn resolve(&self, source: &str) -> Result<StreamDescriptor, ProviderError> {
        let mut request_url = self.endpoint.clone();
        {
            let mut query = request_url.query_pairs_mut();
            query.append_pair("url", source);
            for (key, value) in &self.params {
                query.append_pair(key, value);
            }
        }

        let mut request = self.client.get(request_url);
        if let Some(key) = &self.api_key {
            request = request.header("X-Api-Key", key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| self.fail(ProviderErrorKind::Transport(e.to_string())))?;

        let status = response.status();
        if !status.is_success() {
            return Err(self.fail(ProviderErrorKind::HttpStatus(status.as_u16())));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| self.fail(ProviderErrorKind::Transport(e.to_string())))?;
        let payload: ScraperResponse = serde_json::from_slice(&body)
            .map_err(|e| self.fail(ProviderErrorKind::Malformed(e.to_string())))?;
        debug!(provider = self.name(), has_url = payload.url.is_some(), "scraper response parsed");

        let url = payload
            .url
            .filter(|u| u.starts_with("http://") || u.starts_with("https://"))
            .ok_or_else(|| self.fail(ProviderErrorKind::NoStream))?;

        Ok(StreamDescriptor {
            url,
            headers: payload.headers.into_iter().collect(),
            size: payload.size,
            mime_type: payload.mime_type,
            extension: payload.extension,
            title: payload
                .title
                .filter(|t| !t.trim().is_empty())
                .unwrap_or_else(|| "media".to_string()),
            uploader: payload.uploader,
            duration_secs: payload.duration_secs,
            thumbnail_url: payload.thumbnail_url,
        })
    }
}
