//! Traits and types for transcoding

use crate::error::TransformError;
use async_trait::async_trait;
use std::path::Path;

/// Capabilities of a transcoder implementation
#[derive(Debug, Clone, Copy)]
pub struct TransformCapabilities {
    /// Can actually convert files
    pub can_transform: bool,
}

/// Trait for converting a downloaded artifact into the delivery format
///
/// Implementations can wrap an external binary or provide stub
/// functionality for graceful degradation.
///
/// # Examples
///
/// ```no_run
/// use media_relay::config::TransformConfig;
/// use media_relay::transform::{FfmpegTranscoder, Transcoder};
/// use std::path::Path;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let transcoder = FfmpegTranscoder::from_path(&TransformConfig::default())
///     .expect("ffmpeg not found in PATH");
///
/// transcoder
///     .transform(Path::new("track.webm"), Path::new("track.mp3"))
///     .await?;
/// # Ok(())
/// # }
/// ```
#[async_trait]
pub trait Transcoder: Send + Sync {
    /// Convert `input` into `output`
    ///
    /// The caller registers `output` for cleanup before calling this, so a
    /// half-written file is removed even when the conversion fails.
    ///
    /// # Errors
    ///
    /// - [`TransformError::Spawn`] if the process cannot start
    /// - [`TransformError::Failed`] on a non-zero exit, with the stderr tail
    /// - [`TransformError::Timeout`] if the time budget runs out
    /// - [`TransformError::Unavailable`] for stub implementations
    async fn transform(&self, input: &Path, output: &Path) -> Result<(), TransformError>;

    /// Query capabilities of this transcoder
    fn capabilities(&self) -> TransformCapabilities;

    /// Version string of the underlying tool, if there is one
    async fn version(&self) -> Option<String> {
        None
    }

    /// Human-readable name for logging
    fn name(&self) -> &'static str;
}
