//! Provider that asks a local yt-dlp for metadata and picks a format itself
//!
//! yt-dlp only resolves here (`--dump-json`); the bytes are fetched by the
//! streaming downloader like every other provider's descriptor, so redirects,
//! timeouts and validation behave the same regardless of where a stream came
//! from.

use super::ProviderStrategy;
use crate::error::{ProviderError, ProviderErrorKind};
use crate::types::StreamDescriptor;
use crate::utils::{binary_version, tail_utf8};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use tokio::process::Command;
use tracing::debug;

/// Stderr bytes kept when yt-dlp fails
const STDERR_TAIL_BYTES: usize = 500;

/// Settings for [`YtDlpProvider`]
#[derive(Clone, Debug, Default)]
pub struct YtDlpOptions {
    /// Explicit binary path (searched in PATH when None)
    pub binary: Option<PathBuf>,
    /// Cookies file passed with `--cookies`
    pub cookies_file: Option<PathBuf>,
    /// User-Agent passed with `--add-header`
    pub user_agent: String,
    /// Value for `--extractor-args`
    pub extractor_args: Option<String>,
    /// Pass `--geo-bypass`
    pub geo_bypass: bool,
    /// Preferred container when several audio formats qualify
    pub preferred_extension: Option<String>,
}

/// Resolves sources with `yt-dlp --dump-json`
#[derive(Clone, Debug)]
pub struct YtDlpProvider {
    options: YtDlpOptions,
}

impl YtDlpProvider {
    /// Create a provider with the given options
    pub fn new(options: YtDlpOptions) -> Self {
        Self { options }
    }

    /// Binary to run: the configured path, else whatever `which` finds
    pub fn binary(&self) -> Option<PathBuf> {
        self.options
            .binary
            .clone()
            .or_else(|| which::which("yt-dlp").ok())
    }

    /// Command-line arguments for resolving `source`
    pub fn args(&self, source: &str) -> Vec<String> {
        let mut args = Vec::new();
        if let Some(cookies) = &self.options.cookies_file {
            args.push("--cookies".to_string());
            args.push(cookies.display().to_string());
        }
        if !self.options.user_agent.is_empty() {
            args.push("--add-header".to_string());
            args.push(format!("User-Agent: {}", self.options.user_agent));
        }
        if let Some(extractor_args) = &self.options.extractor_args {
            args.push("--extractor-args".to_string());
            args.push(extractor_args.clone());
        }
        if self.options.geo_bypass {
            args.push("--geo-bypass".to_string());
        }
        args.extend(
            ["--no-playlist", "--no-warnings", "--dump-json"]
                .into_iter()
                .map(String::from),
        );
        args.push(source.to_string());
        args
    }

    fn fail(&self, kind: ProviderErrorKind) -> ProviderError {
        ProviderError::new(self.name(), kind)
    }
}

#[async_trait]
impl ProviderStrategy for YtDlpProvider {
    fn name(&self) -> &str {
        "yt-dlp"
    }

    async fn resolve(&self, source: &str) -> Result<StreamDescriptor, ProviderError> {
        let binary = self
            .binary()
            .ok_or_else(|| self.fail(ProviderErrorKind::Transport("yt-dlp not found in PATH".into())))?;

        debug!(provider = self.name(), ?binary, source, "running yt-dlp");
        let output = Command::new(&binary)
            .args(self.args(source))
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| {
                self.fail(ProviderErrorKind::Transport(format!(
                    "failed to execute {}: {e}",
                    binary.display()
                )))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(self.fail(ProviderErrorKind::Transport(format!(
                "yt-dlp exited with {}: {}",
                output.status,
                tail_utf8(&stderr, STDERR_TAIL_BYTES)
            ))));
        }

        let info: YtDlpInfo = serde_json::from_slice(&output.stdout)
            .map_err(|e| self.fail(ProviderErrorKind::Malformed(e.to_string())))?;
        descriptor_from_info(info, self.options.preferred_extension.as_deref())
            .ok_or_else(|| self.fail(ProviderErrorKind::NoStream))
    }

    async fn version(&self) -> Option<String> {
        binary_version(&self.binary()?, "--version").await
    }
}

/// The subset of yt-dlp's `--dump-json` output the provider reads
#[derive(Clone, Debug, Default, Deserialize)]
pub struct YtDlpInfo {
    /// Media title
    #[serde(default)]
    pub title: Option<String>,
    /// Uploader / channel name
    #[serde(default)]
    pub uploader: Option<String>,
    /// Duration in seconds
    #[serde(default)]
    pub duration: Option<f64>,
    /// Thumbnail URL
    #[serde(default)]
    pub thumbnail: Option<String>,
    /// Direct URL when yt-dlp already picked a single format
    #[serde(default)]
    pub url: Option<String>,
    /// Extension of that single format
    #[serde(default)]
    pub ext: Option<String>,
    /// Headers required for the single format
    #[serde(default)]
    pub http_headers: BTreeMap<String, String>,
    /// Every available format
    #[serde(default)]
    pub formats: Vec<YtDlpFormat>,
}

/// One entry of yt-dlp's `formats` list
#[derive(Clone, Debug, Default, Deserialize)]
pub struct YtDlpFormat {
    /// Direct URL
    #[serde(default)]
    pub url: Option<String>,
    /// Container extension
    #[serde(default)]
    pub ext: Option<String>,
    /// Audio codec ("none" for video-only)
    #[serde(default)]
    pub acodec: Option<String>,
    /// Video codec ("none" for audio-only)
    #[serde(default)]
    pub vcodec: Option<String>,
    /// Download protocol ("https", "m3u8_native", ...)
    #[serde(default)]
    pub protocol: Option<String>,
    /// Exact size in bytes
    #[serde(default)]
    pub filesize: Option<u64>,
    /// Audio bitrate in kbit/s
    #[serde(default)]
    pub abr: Option<f64>,
    /// Total bitrate in kbit/s
    #[serde(default)]
    pub tbr: Option<f64>,
    /// Headers required to fetch this format
    #[serde(default)]
    pub http_headers: BTreeMap<String, String>,
}

impl YtDlpFormat {
    fn has_audio(&self) -> bool {
        self.acodec.as_deref().is_some_and(|codec| codec != "none")
    }

    fn is_audio_only(&self) -> bool {
        self.has_audio() && self.vcodec.as_deref().is_none_or(|codec| codec == "none")
    }

    fn is_direct_http(&self) -> bool {
        let url_ok = self
            .url
            .as_deref()
            .is_some_and(|u| u.starts_with("https://") || u.starts_with("http://"));
        let protocol_ok = self
            .protocol
            .as_deref()
            .is_none_or(|p| p == "https" || p == "http");
        url_ok && protocol_ok
    }

    fn bitrate(&self) -> f64 {
        self.abr.or(self.tbr).unwrap_or(0.0)
    }
}

/// Pick the best audio-bearing direct format and build a descriptor for it
///
/// Audio-only formats beat muxed ones; among those, the preferred container
/// wins, then the highest bitrate. Streaming-manifest formats (HLS, DASH) are
/// skipped because the downloader fetches plain HTTP bodies. Falls back to the
/// top-level `url` when there is no `formats` list.
pub fn descriptor_from_info(
    info: YtDlpInfo,
    preferred_extension: Option<&str>,
) -> Option<StreamDescriptor> {
    let prefers = |format: &YtDlpFormat| match (preferred_extension, format.ext.as_deref()) {
        (Some(preferred), Some(ext)) => preferred.eq_ignore_ascii_case(ext),
        _ => false,
    };

    let best = info
        .formats
        .iter()
        .filter(|f| f.has_audio() && f.is_direct_http())
        .max_by(|a, b| {
            (a.is_audio_only(), prefers(a))
                .cmp(&(b.is_audio_only(), prefers(b)))
                .then(a.bitrate().total_cmp(&b.bitrate()))
        });

    let (url, ext, size, headers) = match best {
        Some(format) => (
            format.url.clone()?,
            format.ext.clone(),
            format.filesize,
            format.http_headers.clone(),
        ),
        None if info.formats.is_empty() => {
            let url = info.url.clone().filter(|u| u.starts_with("http"))?;
            (url, info.ext.clone(), None, info.http_headers.clone())
        }
        None => return None,
    };

    Some(StreamDescriptor {
        url,
        headers: headers.into_iter().collect(),
        size,
        mime_type: None,
        extension: ext,
        title: info
            .title
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| "media".to_string()),
        uploader: info.uploader,
        duration_secs: info.duration,
        thumbnail_url: info.thumbnail,
    })
}
