//! Route handlers for the REST API
//!
//! Handlers are organized by domain:
//! - [`jobs`] - Job submission, status, cancellation and dry-run resolution
//! - [`system`] - Health, capabilities, events, OpenAPI
//! - [`upload`] - Same-request conversion of uploaded files

use crate::types::{JobId, JobStatus};
use serde::{Deserialize, Serialize};

mod jobs;
mod system;
mod upload;

// Re-export all handlers so `routes::function_name` works
pub use jobs::*;
pub use system::*;
pub use upload::*;

// ============================================================================
// Query/Request Types (shared across handlers)
// ============================================================================

/// Telegram chat id, accepted as a number or a string (`@channel` usernames)
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, utoipa::ToSchema)]
#[serde(untagged)]
pub enum ChatId {
    /// Numeric chat id
    Id(i64),
    /// Channel username or numeric id as text
    Name(String),
}

impl std::fmt::Display for ChatId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChatId::Id(id) => write!(f, "{id}"),
            ChatId::Name(name) => f.write_str(name),
        }
    }
}

/// Request body for POST /jobs
#[derive(Debug, Deserialize, Serialize, utoipa::ToSchema)]
pub struct SubmitJobRequest {
    /// Media page or file URL (http or https)
    pub url: String,
    /// Chat to deliver to. Defaults to the initData user when omitted.
    #[serde(default)]
    pub chat_id: Option<ChatId>,
}

/// Response body for POST /jobs
#[derive(Debug, Deserialize, Serialize, utoipa::ToSchema)]
pub struct SubmitJobResponse {
    /// ID of the accepted job
    pub job_id: JobId,
    /// Always `queued`
    pub status: JobStatus,
}

/// Query parameters for GET /resolve
#[derive(Debug, Deserialize, Serialize, utoipa::IntoParams, utoipa::ToSchema)]
#[into_params(parameter_in = Query)]
pub struct ResolveQuery {
    /// Media page or file URL to resolve
    pub url: String,
}

/// Response body for GET /resolve
#[derive(Debug, Deserialize, Serialize, utoipa::ToSchema)]
pub struct ResolveResponse {
    /// Provider that resolved the stream
    pub provider: String,
    /// Providers tried, including the successful one
    pub attempts: usize,
    /// Media title
    pub title: String,
    /// Uploader, if known
    pub uploader: Option<String>,
    /// Duration in seconds, if known
    pub duration_secs: Option<f64>,
    /// Thumbnail URL, if known
    pub thumbnail_url: Option<String>,
    /// Best guess at the container extension
    pub extension: Option<String>,
}
