//! Hand-off of finished artifacts to their recipient
//!
//! A [`DeliverySink`] receives the final file of a job. The pipeline calls it
//! exactly once per job; any failure is terminal for the job and is never
//! retried, so a sink sees at most one attempt per job.

mod telegram;

pub use telegram::TelegramSink;

use crate::error::DeliveryError;
use crate::types::DeliveryReceipt;
use async_trait::async_trait;
use std::path::PathBuf;

/// Everything a sink needs to deliver one artifact
#[derive(Clone, Debug)]
pub struct DeliveryRequest {
    /// Recipient identifier (e.g. a Telegram chat id)
    pub recipient: String,
    /// File to deliver
    pub artifact_path: PathBuf,
    /// File name presented to the recipient
    pub file_name: String,
    /// Media title
    pub title: String,
    /// Performer / signature line
    pub performer: Option<String>,
    /// Duration in seconds, if known
    pub duration_secs: Option<f64>,
    /// Thumbnail image, if one was fetched
    pub thumbnail_path: Option<PathBuf>,
}

/// Final destination of a job's artifact
#[async_trait]
pub trait DeliverySink: Send + Sync {
    /// Deliver the artifact described by `request`
    async fn deliver(&self, request: &DeliveryRequest) -> Result<DeliveryReceipt, DeliveryError>;

    /// Human-readable name for logging
    fn name(&self) -> &'static str;
}
