//! Core types for media-relay

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use utoipa::ToSchema;

/// Unique identifier for a job
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(transparent)]
pub struct JobId(pub uuid::Uuid);

impl JobId {
    /// Create a new random JobId
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }

    /// Get the inner UUID
    pub fn get(&self) -> uuid::Uuid {
        self.0
    }

    /// Short form used for scratch directory names and log lines
    pub fn simple(&self) -> String {
        self.0.simple().to_string()
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for JobId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.parse()?))
    }
}

/// Job status
///
/// Statuses only move forward through
/// `queued → downloading → [transforming →] sending → done`; `error` can be
/// entered from any non-terminal status. `done` and `error` are terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// Accepted, background task not started yet
    Queued,
    /// Resolving a stream and fetching it
    Downloading,
    /// Running the transcoder
    Transforming,
    /// Handing the artifact to the delivery sink
    Sending,
    /// Delivered successfully
    Done,
    /// Failed; see the job's error message
    Error,
}

impl JobStatus {
    /// Position in the forward sequence
    fn rank(self) -> u8 {
        match self {
            JobStatus::Queued => 0,
            JobStatus::Downloading => 1,
            JobStatus::Transforming => 2,
            JobStatus::Sending => 3,
            JobStatus::Done => 4,
            JobStatus::Error => 4,
        }
    }

    /// Whether this status is terminal (`done` or `error`)
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Done | JobStatus::Error)
    }

    /// Whether the state machine allows moving from `self` to `next`
    ///
    /// Transforming is optional, so `downloading → sending` is allowed.
    /// `sending → done` is the only way into `done`.
    pub fn can_transition_to(self, next: JobStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        match next {
            JobStatus::Error => true,
            JobStatus::Queued => false,
            JobStatus::Done => self == JobStatus::Sending,
            _ => next.rank() > self.rank(),
        }
    }

    /// Lowercase name, as serialized
    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Downloading => "downloading",
            JobStatus::Transforming => "transforming",
            JobStatus::Sending => "sending",
            JobStatus::Done => "done",
            JobStatus::Error => "error",
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot of a job, as returned by status polling
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct JobInfo {
    /// Job ID
    pub id: JobId,
    /// Source reference the job was submitted with
    pub source: String,
    /// Current status
    pub status: JobStatus,
    /// Error message (only set when status is `error`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Media title, once a provider resolved it
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Name of the provider that resolved the stream
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    /// Bytes downloaded so far
    pub downloaded_bytes: u64,
    /// When the job was submitted
    pub created_at: DateTime<Utc>,
    /// When the job last changed
    pub updated_at: DateTime<Utc>,
}

/// A resolved, fetchable stream for one media item
///
/// Produced by a provider strategy, consumed by exactly one download attempt.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StreamDescriptor {
    /// Direct URL to fetch
    pub url: String,
    /// Headers the upstream requires, sent in order on every request
    #[serde(default)]
    pub headers: Vec<(String, String)>,
    /// Declared size in bytes, if the provider knows it
    #[serde(default)]
    pub size: Option<u64>,
    /// Declared mime type (e.g. "audio/mpeg")
    #[serde(default)]
    pub mime_type: Option<String>,
    /// Container extension without the dot (e.g. "m4a")
    #[serde(default)]
    pub extension: Option<String>,
    /// Human-readable title
    pub title: String,
    /// Uploader / performer, if known
    #[serde(default)]
    pub uploader: Option<String>,
    /// Duration in seconds, if known
    #[serde(default)]
    pub duration_secs: Option<f64>,
    /// Thumbnail image URL, if known
    #[serde(default)]
    pub thumbnail_url: Option<String>,
}

impl StreamDescriptor {
    /// Create a descriptor with just a URL and title
    pub fn new(url: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            headers: Vec::new(),
            size: None,
            mime_type: None,
            extension: None,
            title: title.into(),
            uploader: None,
            duration_secs: None,
            thumbnail_url: None,
        }
    }

    /// Best guess at the container extension
    ///
    /// Uses the declared extension, then the mime type, then the URL path.
    /// Only short lowercase alphanumeric extensions are returned; anything
    /// else is skipped so it never reaches a file name.
    pub fn container_extension(&self) -> Option<String> {
        let declared = self.extension.as_deref().map(str::to_ascii_lowercase);
        let from_mime = self
            .mime_type
            .as_deref()
            .and_then(extension_for_mime)
            .map(str::to_string);
        let from_url = url::Url::parse(&self.url).ok().and_then(|u| {
            let last = u.path_segments()?.next_back()?.to_string();
            let (_, ext) = last.rsplit_once('.')?;
            Some(ext.to_ascii_lowercase())
        });

        [declared, from_mime, from_url]
            .into_iter()
            .flatten()
            .find(|ext| is_safe_extension(ext))
    }
}

/// Extension used when no safe container extension is known
///
/// It is never in the accepted list, so such a file is always transformed.
pub const UNKNOWN_EXTENSION: &str = "bin";

/// Whether `ext` can be used verbatim as a file extension: 1 to 5 of `[a-z0-9]`
pub fn is_safe_extension(ext: &str) -> bool {
    (1..=5).contains(&ext.len())
        && ext
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit())
}

/// Mime type to send an audio file with, by extension
pub fn audio_mime_for_extension(ext: &str) -> &'static str {
    match ext.to_ascii_lowercase().as_str() {
        "m4a" => "audio/mp4",
        "ogg" | "opus" => "audio/ogg",
        "flac" => "audio/flac",
        _ => "audio/mpeg",
    }
}

/// Map a mime type to its usual file extension
pub fn extension_for_mime(mime: &str) -> Option<&'static str> {
    let essence = mime.split(';').next().unwrap_or(mime).trim();
    match essence.to_ascii_lowercase().as_str() {
        "audio/mpeg" | "audio/mp3" => Some("mp3"),
        "audio/mp4" | "audio/x-m4a" => Some("m4a"),
        "audio/webm" => Some("webm"),
        "audio/ogg" | "audio/opus" => Some("ogg"),
        "audio/aac" => Some("aac"),
        "audio/flac" | "audio/x-flac" => Some("flac"),
        "audio/wav" | "audio/x-wav" => Some("wav"),
        "video/mp4" => Some("mp4"),
        "video/webm" => Some("webm"),
        "video/x-matroska" => Some("mkv"),
        "image/jpeg" => Some("jpg"),
        "image/png" => Some("png"),
        "image/webp" => Some("webp"),
        _ => None,
    }
}

/// Which pipeline stage produced a transient artifact
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactKind {
    /// Raw download from the resolved stream
    Downloaded,
    /// Transcoder output
    Transformed,
    /// Thumbnail image
    Thumbnail,
}

/// A file in scratch storage that lives only as long as its job
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransientArtifact {
    /// Location on disk
    pub path: PathBuf,
    /// Size in bytes
    pub size: u64,
    /// Which stage produced it
    pub kind: ArtifactKind,
}

/// Inbound job submission
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct SubmitRequest {
    /// Source reference (http or https URL of the media page or file)
    pub url: String,
    /// Recipient identifier handed to the delivery sink (e.g. a Telegram chat id)
    pub recipient: String,
}

/// Confirmation returned by a delivery sink
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct DeliveryReceipt {
    /// Sink-assigned identifier (e.g. Telegram message id)
    pub confirmation: String,
}

/// Runtime capabilities, reported by the health endpoint
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct Capabilities {
    /// Configured providers, in fallback order
    pub providers: Vec<String>,
    /// Transcoder implementation name
    pub transcoder: String,
    /// Whether the transcoder can actually run
    pub can_transform: bool,
    /// Delivery sink implementation name
    pub sink: String,
    /// Version line of each external tool found (e.g. "ffmpeg", "yt-dlp")
    #[serde(default)]
    pub tool_versions: BTreeMap<String, String>,
}

/// Event emitted during a job's lifecycle
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// Job accepted
    Queued {
        /// Job ID
        id: JobId,
        /// Source reference
        source: String,
    },

    /// A provider resolved the source reference
    Resolved {
        /// Job ID
        id: JobId,
        /// Provider that succeeded
        provider: String,
        /// Resolved title
        title: String,
    },

    /// Download progress update
    Downloading {
        /// Job ID
        id: JobId,
        /// Bytes written so far
        bytes: u64,
        /// Total bytes, if known
        #[serde(skip_serializing_if = "Option::is_none")]
        total: Option<u64>,
    },

    /// Transcoding started
    Transforming {
        /// Job ID
        id: JobId,
    },

    /// Delivery started
    Sending {
        /// Job ID
        id: JobId,
    },

    /// Job delivered
    Done {
        /// Job ID
        id: JobId,
        /// Sink confirmation
        confirmation: String,
    },

    /// Job failed
    Failed {
        /// Job ID
        id: JobId,
        /// Status the job was in when it failed
        stage: JobStatus,
        /// Error message
        error: String,
    },

    /// Job record evicted after its retention window
    Evicted {
        /// Job ID
        id: JobId,
    },

    /// Relay is shutting down
    Shutdown,
}
