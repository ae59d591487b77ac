//! Direct conversion of an uploaded file, answered in the same request.
//!
//! Uploads skip the registry: there is nothing to resolve or deliver, so the
//! caller gets the converted audio back instead of a job id. They still run
//! inside their own [`ArtifactGuard`] scratch directory.

use crate::cleanup::ArtifactGuard;
use crate::error::{Error, Result};
use crate::types::{JobId, UNKNOWN_EXTENSION, audio_mime_for_extension, is_safe_extension};
use crate::utils::safe_filename;
use std::sync::atomic::Ordering;

use super::MediaRelay;

/// Audio produced from an uploaded file
#[derive(Clone, Debug)]
pub struct ConvertedUpload {
    /// Suggested file name: the upload's stem with the target extension
    pub file_name: String,
    /// Mime type of `data`
    pub content_type: &'static str,
    /// Converted audio
    pub data: Vec<u8>,
}

impl MediaRelay {
    /// Convert an uploaded file with the transcoder and return the result
    ///
    /// The upload and the converted output are both deleted before this
    /// returns, on success and on failure.
    ///
    /// # Errors
    ///
    /// - [`Error::ShuttingDown`] once shutdown has started
    /// - [`Error::InvalidSource`] for an empty upload
    /// - [`Error::Transform`] if the transcoder fails or is unavailable
    pub async fn convert_upload(&self, file_name: &str, data: &[u8]) -> Result<ConvertedUpload> {
        if !self.tracking.accepting_new.load(Ordering::SeqCst) {
            return Err(Error::ShuttingDown);
        }
        if data.is_empty() {
            return Err(Error::InvalidSource {
                source_ref: file_name.to_string(),
                reason: "uploaded file is empty".to_string(),
            });
        }

        let (stem, extension) = split_upload_name(file_name);
        let target = self.config.transform.target_extension.clone();

        let mut guard = ArtifactGuard::create(self.config.temp_dir(), JobId::new()).await?;
        let outcome = self.convert_in(&mut guard, &extension, &target, data).await;
        guard.release().await;

        let data = outcome?;
        tracing::info!(file = %file_name, size = data.len(), "upload converted");
        Ok(ConvertedUpload {
            file_name: format!("{stem}.{target}"),
            content_type: audio_mime_for_extension(&target),
            data,
        })
    }

    async fn convert_in(
        &self,
        guard: &mut ArtifactGuard,
        extension: &str,
        target: &str,
        data: &[u8],
    ) -> Result<Vec<u8>> {
        let input = guard.reserve("upload", extension);
        tokio::fs::write(&input, data).await?;
        let output = guard.reserve("output", target);

        tracing::debug!(transcoder = self.transcoder.name(), size = data.len(), ?input, "converting upload");
        self.transcoder.transform(&input, &output).await?;
        Ok(tokio::fs::read(&output).await?)
    }
}

/// Split a client-supplied file name into a safe stem and extension
fn split_upload_name(file_name: &str) -> (String, String) {
    let base = file_name.rsplit(['/', '\\']).next().unwrap_or(file_name);
    let (stem, extension) = match base.rsplit_once('.') {
        Some((stem, extension)) if !stem.is_empty() => (stem, extension.to_ascii_lowercase()),
        _ => (base, String::new()),
    };
    let extension = if is_safe_extension(&extension) {
        extension
    } else {
        UNKNOWN_EXTENSION.to_string()
    };
    (safe_filename(stem), extension)
}
