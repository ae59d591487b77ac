//! Configuration types for media-relay

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, net::SocketAddr, path::PathBuf, time::Duration};
use utoipa::ToSchema;

/// One entry in the ordered provider list
///
/// Providers are tried in the order they appear in [`Config::providers`].
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProviderConfig {
    /// Source URLs that already point at a media file are used as-is
    DirectLink {
        /// File extensions recognised as direct media links
        #[serde(default = "default_direct_extensions")]
        extensions: Vec<String>,
    },

    /// HTTP scraping API that returns a JSON stream descriptor
    ScraperApi {
        /// Endpoint URL; the source reference is passed as the `url` query parameter
        endpoint: String,
        /// Optional API key, sent in the `X-Api-Key` header
        #[serde(default)]
        api_key: Option<String>,
        /// Extra query parameters appended to every request
        #[serde(default)]
        params: BTreeMap<String, String>,
    },

    /// Local yt-dlp executable (metadata dump + format selection)
    YtDlp {
        /// Path to yt-dlp (auto-detected from PATH if None)
        #[serde(default)]
        binary: Option<PathBuf>,
        /// Netscape-format cookies file passed with `--cookies`
        #[serde(default)]
        cookies_file: Option<PathBuf>,
        /// User-Agent passed with `--add-header`
        #[serde(default = "default_user_agent")]
        user_agent: String,
        /// Value for `--extractor-args` (e.g. "youtube:player_client=web")
        #[serde(default)]
        extractor_args: Option<String>,
        /// Pass `--geo-bypass`
        #[serde(default = "default_true")]
        geo_bypass: bool,
        /// Preferred container for format selection (e.g. "m4a")
        #[serde(default)]
        preferred_extension: Option<String>,
    },
}

impl ProviderConfig {
    /// Name used in logs and job records
    pub fn name(&self) -> &'static str {
        match self {
            ProviderConfig::DirectLink { .. } => "direct-link",
            ProviderConfig::ScraperApi { .. } => "scraper-api",
            ProviderConfig::YtDlp { .. } => "yt-dlp",
        }
    }
}

/// Smallest redirect bound a download may be configured with
pub const MIN_REDIRECT_BOUND: usize = 5;

/// Streaming download settings
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct DownloadConfig {
    /// Scratch directory; each job gets its own subdirectory (default: "./temp")
    #[serde(default = "default_temp_dir")]
    pub temp_dir: PathBuf,

    /// Maximum redirects followed per download (default and minimum: 5)
    #[serde(default = "default_max_redirects")]
    pub max_redirects: usize,

    /// TCP/TLS connect timeout (default: 15 seconds)
    #[serde(default = "default_connect_timeout", with = "duration_serde")]
    pub connect_timeout: Duration,

    /// Overall time budget for one download attempt (default: 180 seconds)
    #[serde(default = "default_download_timeout", with = "duration_serde")]
    pub timeout: Duration,

    /// Maximum time without receiving a single body chunk (default: 60 seconds)
    #[serde(default = "default_read_timeout", with = "duration_serde")]
    pub read_timeout: Duration,

    /// Files smaller than this are treated as error pages or stubs (default: 1024)
    #[serde(default = "default_min_artifact_bytes")]
    pub min_artifact_bytes: u64,

    /// Also fetch the thumbnail when the provider reports one (default: true)
    #[serde(default = "default_true")]
    pub fetch_thumbnail: bool,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            temp_dir: default_temp_dir(),
            max_redirects: default_max_redirects(),
            connect_timeout: default_connect_timeout(),
            timeout: default_download_timeout(),
            read_timeout: default_read_timeout(),
            min_artifact_bytes: default_min_artifact_bytes(),
            fetch_thumbnail: true,
        }
    }
}

/// Provider chain settings
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct ResolveConfig {
    /// Time budget for a single provider attempt (default: 15 seconds)
    #[serde(default = "default_provider_timeout", with = "duration_serde")]
    pub provider_timeout: Duration,
}

impl Default for ResolveConfig {
    fn default() -> Self {
        Self {
            provider_timeout: default_provider_timeout(),
        }
    }
}

/// Transcoding settings and the delivery contract it enforces
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct TransformConfig {
    /// Path to ffmpeg (auto-detected from PATH if None)
    #[serde(default)]
    pub ffmpeg_path: Option<PathBuf>,

    /// Whether to search PATH for ffmpeg if no explicit path is set (default: true)
    #[serde(default = "default_true")]
    pub search_path: bool,

    /// Containers the delivery sink accepts without transcoding (default: ["mp3"])
    #[serde(default = "default_accepted_extensions")]
    pub accepted_extensions: Vec<String>,

    /// Output container extension (default: "mp3")
    #[serde(default = "default_target_extension")]
    pub target_extension: String,

    /// Audio codec passed to `-acodec` (default: "libmp3lame")
    #[serde(default = "default_audio_codec")]
    pub audio_codec: String,

    /// Bitrate passed to `-b:a` (default: "192k")
    #[serde(default = "default_audio_bitrate")]
    pub audio_bitrate: String,

    /// Time budget for one transcoder run (default: 300 seconds)
    #[serde(default = "default_transform_timeout", with = "duration_serde")]
    pub timeout: Duration,

    /// Bytes of stderr kept as the failure diagnostic (default: 500)
    #[serde(default = "default_diagnostic_tail_bytes")]
    pub diagnostic_tail_bytes: usize,
}

impl Default for TransformConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: None,
            search_path: true,
            accepted_extensions: default_accepted_extensions(),
            target_extension: default_target_extension(),
            audio_codec: default_audio_codec(),
            audio_bitrate: default_audio_bitrate(),
            timeout: default_transform_timeout(),
            diagnostic_tail_bytes: default_diagnostic_tail_bytes(),
        }
    }
}

impl TransformConfig {
    /// Whether an artifact with this extension must be transcoded before delivery
    pub fn needs_transform(&self, extension: Option<&str>) -> bool {
        match extension {
            Some(ext) => !self
                .accepted_extensions
                .iter()
                .any(|accepted| accepted.eq_ignore_ascii_case(ext)),
            None => true,
        }
    }
}

/// Job registry settings
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct RegistryConfig {
    /// How long a finished job stays pollable (default: 600 seconds)
    #[serde(default = "default_retention", with = "duration_serde")]
    pub retention: Duration,

    /// How often the eviction sweep runs (default: 60 seconds)
    #[serde(default = "default_sweep_interval", with = "duration_serde")]
    pub sweep_interval: Duration,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            retention: default_retention(),
            sweep_interval: default_sweep_interval(),
        }
    }
}

/// Delivery sink settings
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct DeliveryConfig {
    /// Telegram bot token (required for Telegram delivery)
    #[serde(default)]
    pub bot_token: Option<String>,

    /// Telegram Bot API base URL (default: "https://api.telegram.org")
    #[serde(default = "default_telegram_api_base")]
    pub api_base: String,

    /// Performer / signature appended to captions (e.g. "@my_bot")
    #[serde(default)]
    pub performer: Option<String>,

    /// Time budget for one upload (default: 120 seconds)
    #[serde(default = "default_delivery_timeout", with = "duration_serde")]
    pub timeout: Duration,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            bot_token: None,
            api_base: default_telegram_api_base(),
            performer: None,
            timeout: default_delivery_timeout(),
        }
    }
}

/// API and external server integration
#[derive(Clone, Debug, Default, Serialize, Deserialize, ToSchema)]
pub struct ServerIntegrationConfig {
    /// REST API configuration
    #[serde(default)]
    pub api: ApiConfig,
}

/// REST API configuration
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct ApiConfig {
    /// Address to bind to (default: 127.0.0.1:3000)
    #[serde(default = "default_bind_address")]
    pub bind_address: SocketAddr,

    /// Require a valid Telegram WebApp `X-Telegram-Init-Data` header (default: false)
    #[serde(default)]
    pub require_init_data: bool,

    /// Enable CORS for browser access (default: true)
    #[serde(default = "default_true")]
    pub cors_enabled: bool,

    /// Allowed CORS origins (default: ["*"])
    #[serde(default = "default_cors_origins")]
    pub cors_origins: Vec<String>,

    /// Largest request body accepted by the upload route (default: 200 MiB)
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            require_init_data: false,
            cors_enabled: true,
            cors_origins: default_cors_origins(),
            max_upload_bytes: default_max_upload_bytes(),
        }
    }
}

/// Main configuration for [`MediaRelay`](crate::MediaRelay)
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct Config {
    /// Providers in fallback order (at least one required)
    #[serde(default = "default_providers")]
    pub providers: Vec<ProviderConfig>,

    /// Provider chain settings
    #[serde(default)]
    pub resolve: ResolveConfig,

    /// Streaming download settings
    #[serde(default)]
    pub download: DownloadConfig,

    /// Transcoding settings
    #[serde(default)]
    pub transform: TransformConfig,

    /// Job registry settings
    #[serde(default)]
    pub registry: RegistryConfig,

    /// Delivery sink settings
    #[serde(default)]
    pub delivery: DeliveryConfig,

    /// API and external server integration
    #[serde(default)]
    pub server: ServerIntegrationConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            providers: default_providers(),
            resolve: ResolveConfig::default(),
            download: DownloadConfig::default(),
            transform: TransformConfig::default(),
            registry: RegistryConfig::default(),
            delivery: DeliveryConfig::default(),
            server: ServerIntegrationConfig::default(),
        }
    }
}

impl Config {
    /// Scratch directory
    pub fn temp_dir(&self) -> &PathBuf {
        &self.download.temp_dir
    }

    /// Reject settings the pipeline cannot run with
    ///
    /// The bot token is only required here when the API checks Telegram
    /// WebApp initData. Delivery sinks other than Telegram can be plugged in,
    /// so [`TelegramSink::from_config`](crate::delivery::TelegramSink::from_config)
    /// checks it when that sink is built.
    pub fn validate(&self) -> Result<()> {
        if self.providers.is_empty() {
            return Err(config_error("at least one provider is required", "providers"));
        }
        if self.download.max_redirects < MIN_REDIRECT_BOUND {
            return Err(config_error(
                &format!("max_redirects must be at least {MIN_REDIRECT_BOUND}"),
                "download.max_redirects",
            ));
        }
        let timeouts = [
            (self.resolve.provider_timeout, "resolve.provider_timeout"),
            (self.download.connect_timeout, "download.connect_timeout"),
            (self.download.timeout, "download.timeout"),
            (self.download.read_timeout, "download.read_timeout"),
            (self.transform.timeout, "transform.timeout"),
            (self.delivery.timeout, "delivery.timeout"),
            (self.registry.sweep_interval, "registry.sweep_interval"),
        ];
        for (value, key) in timeouts {
            if value.is_zero() {
                return Err(config_error("duration must be greater than zero", key));
            }
        }
        if self.transform.target_extension.trim().is_empty() {
            return Err(config_error(
                "target_extension must not be empty",
                "transform.target_extension",
            ));
        }
        if self.server.api.require_init_data && self.bot_token().is_none() {
            return Err(config_error(
                "initData validation requires a bot token",
                "delivery.bot_token",
            ));
        }
        Ok(())
    }

    /// Configured bot token, ignoring blank values
    pub fn bot_token(&self) -> Option<&str> {
        self.delivery
            .bot_token
            .as_deref()
            .map(str::trim)
            .filter(|token| !token.is_empty())
    }
}

fn config_error(message: &str, key: &str) -> Error {
    Error::Config {
        message: message.to_string(),
        key: Some(key.to_string()),
    }
}

// Default value functions
fn default_providers() -> Vec<ProviderConfig> {
    vec![
        ProviderConfig::DirectLink {
            extensions: default_direct_extensions(),
        },
        ProviderConfig::YtDlp {
            binary: None,
            cookies_file: None,
            user_agent: default_user_agent(),
            extractor_args: None,
            geo_bypass: true,
            preferred_extension: None,
        },
    ]
}

fn default_direct_extensions() -> Vec<String> {
    ["mp3", "m4a", "aac", "ogg", "opus", "flac", "wav", "webm", "mp4"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_user_agent() -> String {
    "Mozilla/5.0".to_string()
}

fn default_temp_dir() -> PathBuf {
    PathBuf::from("temp")
}

fn default_true() -> bool {
    true
}

fn default_max_redirects() -> usize {
    5
}

fn default_connect_timeout() -> Duration {
    Duration::from_secs(15)
}

fn default_download_timeout() -> Duration {
    Duration::from_secs(180)
}

fn default_read_timeout() -> Duration {
    Duration::from_secs(60)
}

fn default_min_artifact_bytes() -> u64 {
    1024
}

fn default_provider_timeout() -> Duration {
    Duration::from_secs(15)
}

fn default_accepted_extensions() -> Vec<String> {
    vec!["mp3".into()]
}

fn default_target_extension() -> String {
    "mp3".to_string()
}

fn default_audio_codec() -> String {
    "libmp3lame".to_string()
}

fn default_audio_bitrate() -> String {
    "192k".to_string()
}

fn default_transform_timeout() -> Duration {
    Duration::from_secs(300) // 5 minutes
}

fn default_diagnostic_tail_bytes() -> usize {
    500
}

fn default_retention() -> Duration {
    Duration::from_secs(10 * 60) // 10 minutes
}

fn default_sweep_interval() -> Duration {
    Duration::from_secs(60)
}

fn default_telegram_api_base() -> String {
    "https://api.telegram.org".to_string()
}

fn default_delivery_timeout() -> Duration {
    Duration::from_secs(120)
}

fn default_bind_address() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 3000))
}

fn default_cors_origins() -> Vec<String> {
    vec!["*".into()]
}

fn default_max_upload_bytes() -> usize {
    200 * 1024 * 1024
}

// Duration serialization helper
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
