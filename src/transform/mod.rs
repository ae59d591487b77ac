//! Conversion of downloaded artifacts into the delivery format
//!
//! The core abstraction is the [`Transcoder`] trait. Two implementations are
//! provided:
//!
//! - [`FfmpegTranscoder`]: runs an external `ffmpeg` binary
//! - [`NoOpTranscoder`]: stub used when ffmpeg is unavailable
//!
//! The pipeline only calls a transcoder when the downloaded container is not
//! in [`TransformConfig::accepted_extensions`], so a missing ffmpeg only
//! affects sources that actually need conversion.

mod ffmpeg;
mod noop;
mod traits;

pub use ffmpeg::FfmpegTranscoder;
pub use noop::NoOpTranscoder;
pub use traits::{TransformCapabilities, Transcoder};

use crate::config::TransformConfig;
use std::sync::Arc;
use tracing::{info, warn};

/// Pick the transcoder described by the configuration
///
/// Uses the explicit `ffmpeg_path` if set, otherwise searches PATH when
/// `search_path` is enabled, and falls back to [`NoOpTranscoder`].
pub fn from_config(config: &TransformConfig) -> Arc<dyn Transcoder> {
    if let Some(path) = &config.ffmpeg_path {
        info!(?path, "using configured ffmpeg binary");
        return Arc::new(FfmpegTranscoder::new(path.clone(), config));
    }

    if config.search_path
        && let Some(transcoder) = FfmpegTranscoder::from_path(config)
    {
        info!(path = ?transcoder.binary_path(), "found ffmpeg in PATH");
        return Arc::new(transcoder);
    }

    warn!("ffmpeg not available, sources that need conversion will fail");
    Arc::new(NoOpTranscoder)
}
