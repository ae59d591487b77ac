//! Error types for media-relay
//!
//! This module provides error handling for the library, including:
//! - Stage-specific error types (provider, download, transform, delivery)
//! - HTTP status code mapping for API integration
//! - Structured error responses with machine-readable error codes
//!
//! A single provider's failure ([`ProviderError`]) never reaches a job record
//! directly: the provider chain absorbs it and only surfaces
//! [`Error::AllProvidersExhausted`] once every strategy has failed. Every other
//! error is written verbatim (its `Display` form) into the failed job's
//! `error` field.

use crate::types::{JobId, JobStatus};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;
use utoipa::ToSchema;

/// Result type alias for media-relay operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for media-relay
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "download.max_redirects")
        key: Option<String>,
    },

    /// Submitted source reference is not a usable http(s) URL
    #[error("invalid source reference '{source_ref}': {reason}")]
    InvalidSource {
        /// The rejected source reference
        source_ref: String,
        /// Why it was rejected
        reason: String,
    },

    /// Every configured provider failed to resolve the source reference
    #[error("all {attempts} providers exhausted: {}", describe_last(.last_error))]
    AllProvidersExhausted {
        /// Number of providers that were tried
        attempts: usize,
        /// The error reported by the last provider in the chain
        last_error: Option<ProviderError>,
    },

    /// Streaming download failed
    #[error("download error: {0}")]
    Download(#[from] DownloadError),

    /// Transcoding failed
    #[error("transform error: {0}")]
    Transform(#[from] TransformError),

    /// Delivery sink rejected or failed to receive the artifact
    #[error("delivery error: {0}")]
    Delivery(#[from] DeliveryError),

    /// Job is unknown: never existed or already evicted
    #[error("job not found: {0}")]
    JobNotFound(JobId),

    /// Attempted a status transition the state machine does not allow
    #[error("invalid transition for job {id}: {from} -> {to}")]
    InvalidTransition {
        /// The job whose transition was rejected
        id: JobId,
        /// Current status
        from: JobStatus,
        /// Requested status
        to: JobStatus,
    },

    /// Job was cancelled before reaching a terminal state
    #[error("job cancelled")]
    Cancelled,

    /// Shutdown in progress - not accepting new jobs
    #[error("shutdown in progress: not accepting new jobs")]
    ShuttingDown,

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Network error
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// API server error
    #[error("API server error: {0}")]
    ApiServerError(String),

    /// Other error
    #[error("{0}")]
    Other(String),
}

fn describe_last(last_error: &Option<ProviderError>) -> String {
    match last_error {
        Some(e) => e.to_string(),
        None => "no providers configured".to_string(),
    }
}

fn describe_exit(exit_code: &Option<i32>) -> String {
    match exit_code {
        Some(code) => format!("code {code}"),
        None => "signal".to_string(),
    }
}

/// Failure of a single provider strategy
///
/// These are absorbed by the provider chain and turned into "try the next
/// provider". Only the last one is kept, inside [`Error::AllProvidersExhausted`].
#[derive(Debug, Clone, Error)]
#[error("provider '{provider}' failed: {kind}")]
pub struct ProviderError {
    /// Name of the provider that failed
    pub provider: String,
    /// What went wrong
    pub kind: ProviderErrorKind,
}

impl ProviderError {
    /// Create a provider error for the named provider
    pub fn new(provider: impl Into<String>, kind: ProviderErrorKind) -> Self {
        Self {
            provider: provider.into(),
            kind,
        }
    }
}

/// Reason a provider strategy failed
#[derive(Debug, Clone, Error)]
pub enum ProviderErrorKind {
    /// Provider did not answer within its timeout
    #[error("timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// Provider answered with a non-success HTTP status
    #[error("HTTP status {0}")]
    HttpStatus(u16),

    /// Provider answered, but the payload could not be understood
    #[error("malformed response: {0}")]
    Malformed(String),

    /// Provider answered with nothing usable
    #[error("no playable stream found")]
    NoStream,

    /// Provider does not handle this kind of source reference
    #[error("source not supported")]
    Unsupported,

    /// Transport or process failure talking to the provider
    #[error("{0}")]
    Transport(String),
}

/// Streaming download errors
#[derive(Debug, Error)]
pub enum DownloadError {
    /// Redirect chain longer than the configured bound
    #[error("too many redirects (limit {limit}) fetching {url}")]
    TooManyRedirects {
        /// The configured redirect bound
        limit: usize,
        /// The URL that produced the redirect past the bound
        url: String,
    },

    /// Connect, read or overall attempt timeout
    #[error("download timed out after {elapsed:?} fetching {url}")]
    Timeout {
        /// The timeout that expired
        elapsed: std::time::Duration,
        /// The URL being fetched
        url: String,
    },

    /// Final response was not a success status
    #[error("HTTP status {status} fetching {url}")]
    HttpStatus {
        /// HTTP status code
        status: u16,
        /// The URL being fetched
        url: String,
    },

    /// Downloaded file is too small or shorter than announced
    #[error("empty or corrupt artifact at {path}: {size} bytes ({reason})")]
    EmptyOrCorrupt {
        /// Path of the downloaded file
        path: PathBuf,
        /// Bytes actually written
        size: u64,
        /// Which validation failed
        reason: String,
    },

    /// Redirect response without a usable Location header
    #[error("invalid redirect from {url}: {reason}")]
    InvalidRedirect {
        /// The URL that produced the redirect
        url: String,
        /// Why the redirect could not be followed
        reason: String,
    },

    /// Transport-level failure
    #[error("request to {url} failed: {reason}")]
    Transport {
        /// The URL being fetched
        url: String,
        /// Underlying failure
        reason: String,
    },
}

/// Transcoding errors
#[derive(Debug, Error)]
pub enum TransformError {
    /// Transcoder exited with a non-zero status
    #[error("transcoder exited with {}: {diagnostic}", describe_exit(.exit_code))]
    Failed {
        /// Process exit code (None if killed by a signal)
        exit_code: Option<i32>,
        /// Tail of the transcoder's stderr
        diagnostic: String,
    },

    /// Transcoder could not be started
    #[error("failed to start transcoder {binary}: {reason}")]
    Spawn {
        /// Binary that failed to start
        binary: PathBuf,
        /// Underlying failure
        reason: String,
    },

    /// Transcoder exceeded its time budget and was killed
    #[error("transcoder timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// No transcoder is available, but the artifact needs one
    #[error("transcoding unavailable: {0}")]
    Unavailable(String),
}

/// Delivery sink errors
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// Sink is not configured correctly (e.g. missing bot token)
    #[error("delivery sink misconfigured: {0}")]
    Misconfigured(String),

    /// Sink refused the artifact
    #[error("delivery rejected: {0}")]
    Rejected(String),

    /// Sink did not answer in time
    #[error("delivery timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// Transport or local file failure
    #[error("delivery failed: {0}")]
    Transport(String),
}

/// API error response format
///
/// # Example JSON Response
///
/// ```json
/// {
///   "error": {
///     "code": "job_not_found",
///     "message": "job not found: 4f7c...",
///     "details": { "job_id": "4f7c..." }
///   }
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ApiError {
    /// The error details
    pub error: ErrorDetail,
}

/// Detailed error information for API responses
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ErrorDetail {
    /// Machine-readable error code (e.g., "job_not_found", "validation_error")
    pub code: String,

    /// Human-readable error message
    pub message: String,

    /// Optional additional context about the error
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    /// Create a new API error with code and message
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: ErrorDetail {
                code: code.into(),
                message: message.into(),
                details: None,
            },
        }
    }

    /// Create a "validation error" error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new("validation_error", message)
    }

    /// Create an "unauthorized" error
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new("unauthorized", message)
    }
}

/// Convert errors to HTTP status codes for API responses
pub trait ToHttpStatus {
    /// Get the HTTP status code for this error
    fn status_code(&self) -> u16;

    /// Get the machine-readable error code
    fn error_code(&self) -> &str;
}

impl ToHttpStatus for Error {
    fn status_code(&self) -> u16 {
        match self {
            Error::Config { .. } => 400,
            Error::InvalidSource { .. } => 400,

            Error::JobNotFound(_) => 404,

            Error::InvalidTransition { .. } => 409,
            Error::Cancelled => 409,

            Error::Transform(_) => 422,
            Error::Download(DownloadError::EmptyOrCorrupt { .. }) => 422,

            // Upstream failures
            Error::AllProvidersExhausted { .. } => 502,
            Error::Download(DownloadError::TooManyRedirects { .. }) => 502,
            Error::Download(DownloadError::HttpStatus { .. }) => 502,
            Error::Download(DownloadError::InvalidRedirect { .. }) => 502,
            Error::Download(DownloadError::Transport { .. }) => 502,
            Error::Delivery(_) => 502,
            Error::Network(_) => 502,

            Error::Download(DownloadError::Timeout { .. }) => 504,

            Error::ShuttingDown => 503,

            Error::Io(_) => 500,
            Error::Serialization(_) => 500,
            Error::ApiServerError(_) => 500,
            Error::Other(_) => 500,
        }
    }

    fn error_code(&self) -> &str {
        match self {
            Error::Config { .. } => "config_error",
            Error::InvalidSource { .. } => "invalid_source",
            Error::AllProvidersExhausted { .. } => "all_providers_exhausted",
            Error::Download(e) => match e {
                DownloadError::TooManyRedirects { .. } => "too_many_redirects",
                DownloadError::Timeout { .. } => "download_timeout",
                DownloadError::HttpStatus { .. } => "download_http_status",
                DownloadError::EmptyOrCorrupt { .. } => "empty_or_corrupt_artifact",
                DownloadError::InvalidRedirect { .. } => "invalid_redirect",
                DownloadError::Transport { .. } => "download_failed",
            },
            Error::Transform(e) => match e {
                TransformError::Failed { .. } => "transform_failed",
                TransformError::Spawn { .. } => "transform_spawn_failed",
                TransformError::Timeout(_) => "transform_timeout",
                TransformError::Unavailable(_) => "transform_unavailable",
            },
            Error::Delivery(_) => "delivery_failed",
            Error::JobNotFound(_) => "job_not_found",
            Error::InvalidTransition { .. } => "invalid_transition",
            Error::Cancelled => "cancelled",
            Error::ShuttingDown => "shutting_down",
            Error::Io(_) => "io_error",
            Error::Network(_) => "network_error",
            Error::Serialization(_) => "serialization_error",
            Error::ApiServerError(_) => "api_server_error",
            Error::Other(_) => "internal_error",
        }
    }
}

impl From<Error> for ApiError {
    fn from(error: Error) -> Self {
        let code = error.error_code().to_string();
        let message = error.to_string();

        let details = match &error {
            Error::JobNotFound(id) => Some(serde_json::json!({
                "job_id": id,
            })),
            Error::InvalidSource { source_ref, .. } => Some(serde_json::json!({
                "source": source_ref,
            })),
            Error::AllProvidersExhausted {
                attempts,
                last_error,
            } => Some(serde_json::json!({
                "attempts": attempts,
                "last_provider": last_error.as_ref().map(|e| e.provider.clone()),
            })),
            Error::Download(DownloadError::TooManyRedirects { limit, url }) => {
                Some(serde_json::json!({
                    "redirect_limit": limit,
                    "url": url,
                }))
            }
            Error::Download(DownloadError::EmptyOrCorrupt { size, .. }) => {
                Some(serde_json::json!({
                    "size_bytes": size,
                }))
            }
            Error::Transform(TransformError::Failed { exit_code, .. }) => {
                Some(serde_json::json!({
                    "exit_code": exit_code,
                }))
            }
            Error::InvalidTransition { id, from, to } => Some(serde_json::json!({
                "job_id": id,
                "from": from,
                "to": to,
            })),
            _ => None,
        };

        ApiError {
            error: ErrorDetail {
                code,
                message,
                details,
            },
        }
    }
}
