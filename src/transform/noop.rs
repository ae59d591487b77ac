//! No-op transcoder for graceful degradation

use super::traits::{TransformCapabilities, Transcoder};
use crate::error::TransformError;
use async_trait::async_trait;
use std::path::Path;

/// Transcoder used when no ffmpeg binary is available
///
/// Jobs whose artifact already satisfies the delivery contract still succeed;
/// jobs that need conversion fail with [`TransformError::Unavailable`].
///
/// # Examples
///
/// ```
/// use media_relay::transform::{NoOpTranscoder, Transcoder};
/// use std::path::Path;
///
/// # #[tokio::main]
/// # async fn main() {
/// let transcoder = NoOpTranscoder;
/// assert!(!transcoder.capabilities().can_transform);
/// assert!(transcoder.transform(Path::new("a.webm"), Path::new("a.mp3")).await.is_err());
/// # }
/// ```
#[derive(Clone, Copy, Debug, Default)]
pub struct NoOpTranscoder;

#[async_trait]
impl Transcoder for NoOpTranscoder {
    async fn transform(&self, _input: &Path, _output: &Path) -> Result<(), TransformError> {
        Err(TransformError::Unavailable(
            "conversion requires an ffmpeg binary. \
             Configure transform.ffmpeg_path or ensure ffmpeg is in PATH."
                .into(),
        ))
    }

    fn capabilities(&self) -> TransformCapabilities {
        TransformCapabilities {
            can_transform: false,
        }
    }

    fn name(&self) -> &'static str {
        "noop"
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn transform_is_unavailable() {
        let result = NoOpTranscoder
            .transform(Path::new("in.webm"), Path::new("out.mp3"))
            .await;
        assert!(matches!(result, Err(TransformError::Unavailable(_))));
    }

    #[test]
    fn reports_no_capability() {
        assert!(!NoOpTranscoder.capabilities().can_transform);
        assert_eq!(NoOpTranscoder.name(), "noop");
    }
}
