//! Streaming downloader with manual redirect handling
//!
//! Redirects are followed by hand instead of by reqwest so the bound is exact
//! and every hop carries the descriptor's headers. Credential headers
//! (`Cookie`, `Authorization`, `Proxy-Authorization`) only go to the origin the
//! descriptor names; a hop to another scheme, host or port gets the rest.
//! Bytes are streamed to disk chunk by chunk; the file is validated once the
//! body ends.
//!
//! The downloader never deletes what it wrote. The destination path belongs to
//! the job's [`ArtifactGuard`](crate::cleanup::ArtifactGuard), which removes
//! it on every exit path.

use crate::config::DownloadConfig;
use crate::error::{DownloadError, Result};
use crate::types::{ArtifactKind, StreamDescriptor, TransientArtifact};
use futures::StreamExt;
use reqwest::StatusCode;
use reqwest::header::{AUTHORIZATION, COOKIE, LOCATION, PROXY_AUTHORIZATION};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

/// Fetches stream descriptors into local files
#[derive(Clone, Debug)]
pub struct StreamingDownloader {
    client: reqwest::Client,
    max_redirects: usize,
    connect_timeout: Duration,
    timeout: Duration,
    read_timeout: Duration,
    min_artifact_bytes: u64,
}

impl StreamingDownloader {
    /// Build a downloader from the download settings
    pub fn new(config: &DownloadConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .connect_timeout(config.connect_timeout)
            .build()?;

        Ok(Self {
            client,
            max_redirects: config.max_redirects,
            connect_timeout: config.connect_timeout,
            timeout: config.timeout,
            read_timeout: config.read_timeout,
            min_artifact_bytes: config.min_artifact_bytes,
        })
    }

    /// Maximum redirects followed per download
    pub fn max_redirects(&self) -> usize {
        self.max_redirects
    }

    /// Download `descriptor` into `destination`
    ///
    /// `progress` is updated with the number of bytes written so far, so a
    /// caller can report progress without being called back.
    ///
    /// # Errors
    ///
    /// - [`DownloadError::TooManyRedirects`] past `max_redirects`
    /// - [`DownloadError::Timeout`] on connect, idle read or overall expiry
    /// - [`DownloadError::HttpStatus`] for a non-2xx final response
    /// - [`DownloadError::EmptyOrCorrupt`] below `min_artifact_bytes`, or
    ///   shorter than the server's `Content-Length`
    ///
    /// `descriptor.size` is a provider estimate and is not checked here.
    pub async fn fetch(
        &self,
        descriptor: &StreamDescriptor,
        destination: &Path,
        progress: &AtomicU64,
    ) -> std::result::Result<TransientArtifact, DownloadError> {
        self.fetch_kind(
            descriptor,
            destination,
            ArtifactKind::Downloaded,
            self.min_artifact_bytes,
            progress,
        )
        .await
    }

    /// Download a thumbnail image
    ///
    /// Same redirect and timeout handling as [`fetch`](Self::fetch); only an
    /// empty body is rejected, since small images are legitimate.
    pub async fn fetch_thumbnail(
        &self,
        url: &str,
        destination: &Path,
    ) -> std::result::Result<TransientArtifact, DownloadError> {
        let descriptor = StreamDescriptor::new(url, "thumbnail");
        let progress = AtomicU64::new(0);
        self.fetch_kind(&descriptor, destination, ArtifactKind::Thumbnail, 1, &progress)
            .await
    }

    async fn fetch_kind(
        &self,
        descriptor: &StreamDescriptor,
        destination: &Path,
        kind: ArtifactKind,
        min_bytes: u64,
        progress: &AtomicU64,
    ) -> std::result::Result<TransientArtifact, DownloadError> {
        let attempt = self.stream_to_file(descriptor, destination, min_bytes, progress);
        match tokio::time::timeout(self.timeout, attempt).await {
            Ok(Ok(size)) => {
                info!(url = %descriptor.url, ?destination, size, "download complete");
                Ok(TransientArtifact {
                    path: destination.to_path_buf(),
                    size,
                    kind,
                })
            }
            Ok(Err(e)) => Err(e),
            Err(_) => Err(DownloadError::Timeout {
                elapsed: self.timeout,
                url: descriptor.url.clone(),
            }),
        }
    }

    /// Send the request and follow redirects, returning the final success response
    async fn open(
        &self,
        descriptor: &StreamDescriptor,
    ) -> std::result::Result<reqwest::Response, DownloadError> {
        let origin = url::Url::parse(&descriptor.url).map_err(|e| DownloadError::Transport {
            url: descriptor.url.clone(),
            reason: format!("invalid URL: {e}"),
        })?;
        let mut current = origin.clone();
        let mut redirects = 0;

        loop {
            let trusted = same_origin(&origin, &current);
            let mut request = self.client.get(current.clone());
            for (name, value) in &descriptor.headers {
                if !trusted && is_credential_header(name) {
                    debug!(header = %name, url = %current, "dropping credential header on cross-origin hop");
                    continue;
                }
                request = request.header(name.as_str(), value.as_str());
            }

            let response = request.send().await.map_err(|e| {
                if e.is_timeout() {
                    DownloadError::Timeout {
                        elapsed: self.connect_timeout,
                        url: current.to_string(),
                    }
                } else {
                    DownloadError::Transport {
                        url: current.to_string(),
                        reason: e.to_string(),
                    }
                }
            })?;

            let status = response.status();
            if is_redirect(status) {
                if redirects >= self.max_redirects {
                    return Err(DownloadError::TooManyRedirects {
                        limit: self.max_redirects,
                        url: current.to_string(),
                    });
                }
                let next = redirect_target(&current, &response)?;
                redirects += 1;
                debug!(from = %current, to = %next, redirects, "following redirect");
                current = next;
                continue;
            }

            if !status.is_success() {
                return Err(DownloadError::HttpStatus {
                    status: status.as_u16(),
                    url: current.to_string(),
                });
            }
            return Ok(response);
        }
    }

    async fn stream_to_file(
        &self,
        descriptor: &StreamDescriptor,
        destination: &Path,
        min_bytes: u64,
        progress: &AtomicU64,
    ) -> std::result::Result<u64, DownloadError> {
        let response = self.open(descriptor).await?;
        let final_url = response.url().to_string();
        let content_length = response.content_length();

        let io_error = |e: std::io::Error| DownloadError::Transport {
            url: final_url.clone(),
            reason: format!("failed to write {}: {e}", destination.display()),
        };

        let mut file = tokio::fs::File::create(destination).await.map_err(io_error)?;
        let mut stream = response.bytes_stream();
        let mut written: u64 = 0;

        loop {
            let chunk = match tokio::time::timeout(self.read_timeout, stream.next()).await {
                Err(_) => {
                    return Err(DownloadError::Timeout {
                        elapsed: self.read_timeout,
                        url: final_url.clone(),
                    });
                }
                Ok(None) => break,
                Ok(Some(Err(e))) => {
                    return Err(DownloadError::Transport {
                        url: final_url.clone(),
                        reason: e.to_string(),
                    });
                }
                Ok(Some(Ok(chunk))) => chunk,
            };

            file.write_all(&chunk).await.map_err(io_error)?;
            written += chunk.len() as u64;
            progress.store(written, Ordering::Relaxed);
        }
        file.flush().await.map_err(io_error)?;

        if written < min_bytes {
            return Err(DownloadError::EmptyOrCorrupt {
                path: destination.to_path_buf(),
                size: written,
                reason: format!("below minimum of {min_bytes} bytes"),
            });
        }
        if let Some(expected) = content_length
            && written < expected
        {
            return Err(DownloadError::EmptyOrCorrupt {
                path: destination.to_path_buf(),
                size: written,
                reason: format!("short body, expected {expected} bytes"),
            });
        }

        Ok(written)
    }
}

fn is_redirect(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::MOVED_PERMANENTLY
            | StatusCode::FOUND
            | StatusCode::SEE_OTHER
            | StatusCode::TEMPORARY_REDIRECT
            | StatusCode::PERMANENT_REDIRECT
    )
}

/// Whether two URLs share scheme, host and port
fn same_origin(a: &url::Url, b: &url::Url) -> bool {
    a.scheme() == b.scheme()
        && a.host_str() == b.host_str()
        && a.port_or_known_default() == b.port_or_known_default()
}

fn is_credential_header(name: &str) -> bool {
    [COOKIE, AUTHORIZATION, PROXY_AUTHORIZATION]
        .iter()
        .any(|sensitive| sensitive.as_str().eq_ignore_ascii_case(name))
}

/// Resolve a redirect's `Location` against the URL that produced it
fn redirect_target(
    current: &url::Url,
    response: &reqwest::Response,
) -> std::result::Result<url::Url, DownloadError> {
    let invalid = |reason: String| DownloadError::InvalidRedirect {
        url: current.to_string(),
        reason,
    };

    let location = response
        .headers()
        .get(LOCATION)
        .ok_or_else(|| invalid("missing Location header".to_string()))?
        .to_str()
        .map_err(|e| invalid(format!("unreadable Location header: {e}")))?;

    let next = current
        .join(location)
        .map_err(|e| invalid(format!("bad Location '{location}': {e}")))?;
    if !matches!(next.scheme(), "http" | "https") {
        return Err(invalid(format!("unsupported scheme '{}'", next.scheme())));
    }
    Ok(next)
}
