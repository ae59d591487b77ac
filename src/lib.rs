//! # media-relay
//!
//! Acquisition-and-delivery pipeline: take a media page or file URL, resolve
//! it to a direct stream through an ordered chain of providers, download it
//! into per-job scratch storage, convert it when the container is not one the
//! destination accepts, and hand the result to a delivery sink (a Telegram
//! chat by default).
//!
//! ## Design
//!
//! - **Pluggable stages** - providers, transcoder and sink are trait objects
//!   built from configuration or supplied directly
//! - **One task per job** - every job runs in its own spawned task with its
//!   own error boundary
//! - **Nothing left behind** - every file a job creates is removed before the
//!   job is reported `done` or `error`
//! - **Event-driven** - consumers subscribe to events or poll job status
//!
//! ## Quick Start
//!
//! ```no_run
//! use media_relay::{Config, MediaRelay, SubmitRequest};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut config = Config::default();
//!     config.delivery.bot_token = Some("123456:bot-token".to_string());
//!
//!     let relay = MediaRelay::new(config).await?;
//!
//!     // Subscribe to events
//!     let mut events = relay.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     let id = relay
//!         .submit(SubmitRequest {
//!             url: "https://example.com/track.mp3".to_string(),
//!             recipient: "123456789".to_string(),
//!         })
//!         .await?;
//!     println!("queued job {id}");
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// REST API module
pub mod api;
/// Per-job scratch directories and their cleanup
pub mod cleanup;
/// Configuration types
pub mod config;
/// Delivery sinks
pub mod delivery;
/// Error types
pub mod error;
/// Streaming HTTP downloader
pub mod fetch;
/// Provider strategies and the fallback chain
pub mod provider;
/// In-memory job registry
pub mod registry;
/// Relay implementation (decomposed into focused submodules)
pub mod relay;
/// Transcoding
pub mod transform;
/// Core types and events
pub mod types;
/// Utility functions
pub mod utils;

// Re-export commonly used types
pub use config::{Config, ProviderConfig};
pub use delivery::{DeliveryRequest, DeliverySink, TelegramSink};
pub use error::{
    ApiError, DeliveryError, DownloadError, Error, ErrorDetail, ProviderError, Result,
    ToHttpStatus, TransformError,
};
pub use provider::{ProviderChain, ProviderStrategy, Resolution};
pub use relay::{ConvertedUpload, MediaRelay, RelayComponents};
pub use transform::{FfmpegTranscoder, NoOpTranscoder, TransformCapabilities, Transcoder};
pub use types::{
    Capabilities, DeliveryReceipt, Event, JobId, JobInfo, JobStatus, StreamDescriptor,
    SubmitRequest,
};

/// Helper function to run the relay with graceful signal handling.
///
/// Waits for a termination signal and then calls the relay's `shutdown()` method.
///
/// - **Unix:** listens for SIGTERM and SIGINT, with fallbacks if signal registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
///
/// # Example
///
/// ```no_run
/// use media_relay::{Config, MediaRelay, run_with_shutdown};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let relay = MediaRelay::new(Config::default()).await?;
///
///     // Run with automatic signal handling
///     run_with_shutdown(relay).await;
///
///     Ok(())
/// }
/// ```
pub async fn run_with_shutdown(relay: MediaRelay) {
    wait_for_signal().await;
    relay.shutdown().await;
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Set up signal handlers - these may fail in restricted environments (containers, tests)
    let sigterm_result = signal(SignalKind::terminate());
    let sigint_result = signal(SignalKind::interrupt());

    match (sigterm_result, sigint_result) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM signal");
                }
                _ = sigint.recv() => {
                    tracing::info!("Received SIGINT signal (Ctrl+C)");
                }
            }
        }
        (Err(e), _) => {
            tracing::warn!(error = %e, "Could not register SIGTERM handler, waiting for SIGINT only");
            if let Ok(mut sigint) = signal(SignalKind::interrupt()) {
                sigint.recv().await;
                tracing::info!("Received SIGINT signal (Ctrl+C)");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
        (_, Err(e)) => {
            tracing::warn!(error = %e, "Could not register SIGINT handler, waiting for SIGTERM only");
            if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
                sigterm.recv().await;
                tracing::info!("Received SIGTERM signal");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("Received Ctrl+C signal");
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
        }
    }
}
